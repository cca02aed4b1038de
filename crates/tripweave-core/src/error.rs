use thiserror::Error;

#[derive(Debug, Error)]
pub enum TripError {
    // Caller-facing planning errors
    #[error("Could not understand trip request: {0}")]
    InputParse(String),

    #[error("Upstream service unavailable: {service}: {message}")]
    UpstreamUnavailable { service: String, message: String },

    #[error("Planning timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Planning cancelled")]
    Cancelled,

    #[error("Internal invariant violated: {0}")]
    InvariantViolation(String),

    // Collaborator errors
    #[error("{service}: not found: {what}")]
    NotFound { service: String, what: String },

    #[error("{service}: rate limited")]
    RateLimited { service: String },

    #[error("{service}: timed out after {secs}s")]
    UpstreamTimeout { service: String, secs: u64 },

    #[error("{service}: request failed: {message}")]
    Http { service: String, message: String },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TripError>;

impl TripError {
    pub fn upstream(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            service: service.into(),
            message: message.into(),
        }
    }

    /// A 2xx reply whose body could not be decoded, e.g. a proxy error page.
    pub fn malformed_body(service: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Http {
            service: service.into(),
            message: format!("malformed response body: {}", err),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    /// Whether the engine may retry the failing stage once.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TripError::UpstreamUnavailable { .. }
                | TripError::NotFound { .. }
                | TripError::RateLimited { .. }
                | TripError::UpstreamTimeout { .. }
                | TripError::Http { .. }
        )
    }

    /// Collapse collaborator-level errors into the kinds a caller of
    /// `plan_trip` is promised to see.
    pub fn into_terminal(self) -> Self {
        match self {
            TripError::NotFound { service, what } => TripError::UpstreamUnavailable {
                service,
                message: format!("not found: {}", what),
            },
            TripError::RateLimited { service } => TripError::UpstreamUnavailable {
                service,
                message: "rate limited".into(),
            },
            TripError::UpstreamTimeout { service, secs } => TripError::UpstreamUnavailable {
                service,
                message: format!("timed out after {}s", secs),
            },
            TripError::Http { service, message } => {
                TripError::UpstreamUnavailable { service, message }
            }
            TripError::Json(e) => TripError::upstream("response", e.to_string()),
            TripError::Io(e) => TripError::upstream("io", e.to_string()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(TripError::upstream("weather", "down").is_retryable());
        assert!(TripError::RateLimited {
            service: "search".into()
        }
        .is_retryable());
        assert!(TripError::UpstreamTimeout {
            service: "weather".into(),
            secs: 10
        }
        .is_retryable());
        assert!(!TripError::InputParse("no city".into()).is_retryable());
        assert!(!TripError::invariant("bad order").is_retryable());
        assert!(!TripError::Timeout { secs: 5 }.is_retryable());
    }

    #[test]
    fn test_malformed_body_is_retryable() {
        let decode = serde_json::from_str::<serde_json::Value>("<html>").unwrap_err();
        let err = TripError::malformed_body("weather", decode);
        assert!(err.is_retryable());
        assert!(err.to_string().starts_with("weather: request failed: malformed response body"));
    }

    #[test]
    fn test_into_terminal_maps_collaborator_errors() {
        let err = TripError::NotFound {
            service: "weather".into(),
            what: "city 'Atlantis'".into(),
        }
        .into_terminal();
        match err {
            TripError::UpstreamUnavailable { service, message } => {
                assert_eq!(service, "weather");
                assert!(message.contains("Atlantis"));
            }
            other => panic!("unexpected: {other:?}"),
        }

        let err = TripError::UpstreamTimeout {
            service: "reasoning".into(),
            secs: 60,
        }
        .into_terminal();
        assert!(matches!(err, TripError::UpstreamUnavailable { .. }));
    }

    #[test]
    fn test_into_terminal_keeps_caller_kinds() {
        assert!(matches!(
            TripError::InputParse("x".into()).into_terminal(),
            TripError::InputParse(_)
        ));
        assert!(matches!(
            TripError::Timeout { secs: 3 }.into_terminal(),
            TripError::Timeout { secs: 3 }
        ));
        assert!(matches!(
            TripError::Cancelled.into_terminal(),
            TripError::Cancelled
        ));
    }
}
