use std::sync::atomic::{AtomicUsize, Ordering};

/// Supplies API keys to a client, one per request.
pub(crate) trait KeyProvider: Send + Sync {
    fn next(&self) -> &str;
}

/// Round-robin rotation over a fixed, non-empty key list.
#[derive(Debug)]
pub(crate) struct RotatingKeys {
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl RotatingKeys {
    /// Returns `None` when no usable key remains after trimming.
    pub fn new(keys: Vec<String>) -> Option<Self> {
        let keys: Vec<String> = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            return None;
        }
        Some(Self {
            keys,
            cursor: AtomicUsize::new(0),
        })
    }
}

impl KeyProvider for RotatingKeys {
    fn next(&self) -> &str {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.keys.len();
        &self.keys[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotates_round_robin() {
        let keys = RotatingKeys::new(vec!["a".into(), " b ".into(), "".into()]).unwrap();
        let seen: Vec<&str> = (0..5).map(|_| keys.next()).collect();
        assert_eq!(seen, vec!["a", "b", "a", "b", "a"]);
    }

    #[test]
    fn empty_key_list_is_rejected() {
        assert!(RotatingKeys::new(Vec::new()).is_none());
        assert!(RotatingKeys::new(vec!["  ".into()]).is_none());
    }
}
