use std::path::PathBuf;

/// Per-user cache directory (HTTP cache, health checks).
pub fn pharmyrus_cache_dir() -> PathBuf {
    match dirs::cache_dir() {
        Some(dir) => dir.join("pharmyrus"),
        None => std::env::temp_dir().join("pharmyrus"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_dir_is_namespaced() {
        assert!(pharmyrus_cache_dir().ends_with("pharmyrus"));
    }
}
