#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum PharmyrusError {
    #[error("HTTP client initialization failed: {0}")]
    HttpClientInit(reqwest::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP middleware error: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    #[error("API error from {api}: {message}")]
    Api { api: String, message: String },

    #[error("API JSON error from {api}: {source}")]
    ApiJson {
        api: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{entity} '{id}' not found.\n\n{suggestion}")]
    NotFound {
        entity: String,
        id: String,
        suggestion: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Upstream timeout: {api} did not answer within {timeout_ms}ms")]
    UpstreamTimeout { api: String, timeout_ms: u64 },

    #[error("Upstream unavailable: {api} could not be reached. {reason}")]
    UpstreamUnavailable { api: String, reason: String },

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PharmyrusError {
    /// True for failures of an upstream service (as opposed to bad input or a
    /// missing entity), i.e. the errors an optional pipeline stage absorbs.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Http(_)
                | Self::HttpMiddleware(_)
                | Self::Api { .. }
                | Self::ApiJson { .. }
                | Self::UpstreamTimeout { .. }
                | Self::UpstreamUnavailable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::PharmyrusError;

    #[test]
    fn not_found_display_includes_suggestion() {
        let err = PharmyrusError::NotFound {
            entity: "molecule".to_string(),
            id: "Darolutamid".to_string(),
            suggestion: "Check the spelling or try the brand name.".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("molecule 'Darolutamid' not found"));
        assert!(msg.contains("Check the spelling"));
    }

    #[test]
    fn upstream_timeout_display_includes_budget() {
        let err = PharmyrusError::UpstreamTimeout {
            api: "epo-ops".to_string(),
            timeout_ms: 15_000,
        };

        let msg = err.to_string();
        assert!(msg.contains("epo-ops"));
        assert!(msg.contains("15000ms"));
    }

    #[test]
    fn upstream_unavailable_display_includes_reason() {
        let err = PharmyrusError::UpstreamUnavailable {
            api: "pubchem".to_string(),
            reason: "HTTP 503 after 3 attempts".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("Upstream unavailable: pubchem"));
        assert!(msg.contains("HTTP 503 after 3 attempts"));
    }

    #[test]
    fn upstream_classification_excludes_input_errors() {
        assert!(
            PharmyrusError::Api {
                api: "inpi".into(),
                message: "HTTP 500".into(),
            }
            .is_upstream()
        );
        assert!(!PharmyrusError::InvalidArgument("empty".into()).is_upstream());
        assert!(
            !PharmyrusError::NotFound {
                entity: "molecule".into(),
                id: "x".into(),
                suggestion: String::new(),
            }
            .is_upstream()
        );
    }
}
