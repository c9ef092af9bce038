use thiserror::Error;

/// Errors from fetching chunks, counts, or chunk lists from the backend.
///
/// `Clone` because a single failed fetch is shared by every caller that
/// was coalesced onto it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("not found: {key}")]
    NotFound { key: String },

    #[error("unauthorized")]
    Unauthorized,

    #[error("rate limited")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("http error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl FetchError {
    /// Whether a retry of the same request could plausibly succeed.
    ///
    /// Transient/backend-side failures are retryable; missing data, auth
    /// failures, and malformed bodies are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::RateLimited { .. } | FetchError::Server { .. } | FetchError::Network(..)
        )
    }
}

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(String),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::NotFound {
            key: "pins/chunk:4".to_string(),
        };
        assert_eq!(err.to_string(), "not found: pins/chunk:4");

        let err = FetchError::Server {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "server error 503: unavailable");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(FetchError::Network("reset".to_string()).is_retryable());
        assert!(FetchError::RateLimited { retry_after_ms: None }.is_retryable());
        assert!(
            FetchError::Server {
                status: 500,
                message: String::new()
            }
            .is_retryable()
        );

        assert!(!FetchError::Unauthorized.is_retryable());
        assert!(!FetchError::Decode("bad json".to_string()).is_retryable());
        assert!(
            !FetchError::NotFound {
                key: "x".to_string()
            }
            .is_retryable()
        );
        assert!(
            !FetchError::Http {
                status: 400,
                message: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Invalid("max_attempts must be at least 1".to_string());
        assert_eq!(err.to_string(), "invalid config: max_attempts must be at least 1");
    }
}
