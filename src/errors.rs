use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while constructing an adapter.
///
/// These are always fatal to that construction attempt and are never
/// retried internally.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("missing required parameter `{0}`")]
    MissingParameter(&'static str),

    #[error("parameter `{key}` is invalid: expected {expected}")]
    InvalidParameter {
        key: &'static str,
        expected: &'static str,
    },

    #[error("certificate {} does not exist", .path.display())]
    MissingCredential { path: PathBuf },
}

/// Errors raised during `push` or `feedback`.
///
/// Variants are structured so callers can tell retryable provider
/// conditions (5xx, connection failures) from permanent ones (400/401)
/// without matching on message text.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("push request failed: {0}")]
    Transport(String),

    #[error("500 Internal Server Error")]
    ServerError,

    #[error("503 Service Unavailable{}", .retry_after.as_ref().map(|r| format!("; retry after: {r}")).unwrap_or_default())]
    Unavailable { retry_after: Option<String> },

    #[error("401 Unauthorized; authentication error")]
    AuthenticationError,

    #[error("400 Bad Request; invalid message")]
    InvalidRequest,

    #[error("unexpected status {0}")]
    UnexpectedStatus(u16),

    #[error("response body did not contain a valid JSON response: {0}")]
    MalformedResponse(String),

    #[error("failed to sign provider token: {0}")]
    Signing(String),

    #[error("failed to load credential: {0}")]
    Credential(String),
}

impl DispatchError {
    /// Whether retrying the same call later could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::Transport(_)
                | DispatchError::ServerError
                | DispatchError::Unavailable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_display_includes_retry_after() {
        let err = DispatchError::Unavailable {
            retry_after: Some("30".to_string()),
        };
        assert_eq!(err.to_string(), "503 Service Unavailable; retry after: 30");

        let err = DispatchError::Unavailable { retry_after: None };
        assert_eq!(err.to_string(), "503 Service Unavailable");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(DispatchError::ServerError.is_retryable());
        assert!(DispatchError::Unavailable { retry_after: None }.is_retryable());
        assert!(DispatchError::Transport("connection reset".into()).is_retryable());

        assert!(!DispatchError::AuthenticationError.is_retryable());
        assert!(!DispatchError::InvalidRequest.is_retryable());
        assert!(!DispatchError::UnexpectedStatus(302).is_retryable());
        assert!(!DispatchError::MalformedResponse("not json".into()).is_retryable());
    }

    #[test]
    fn test_missing_credential_display() {
        let err = ConfigurationError::MissingCredential {
            path: PathBuf::from("/etc/apns/key.p8"),
        };
        assert_eq!(err.to_string(), "certificate /etc/apns/key.p8 does not exist");
    }
}
