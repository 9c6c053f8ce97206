use async_trait::async_trait;
use tracing::debug;

use crate::errors::DispatchError;
use crate::fcm::payload::{FcmPayload, FcmResponse};

const SERVER_URI: &str = "https://fcm.googleapis.com/fcm/send";

/// Low-level FCM transport: one multicast POST per batch.
#[async_trait]
pub trait FcmClient: Send + Sync {
    async fn send(&self, payload: &FcmPayload) -> Result<FcmResponse, DispatchError>;
}

/// Maps a provider HTTP status to the dispatch error it stands for.
/// Returns `None` for 2xx statuses, whose body is then decoded.
fn classify_status(status: u16, retry_after: Option<String>) -> Option<DispatchError> {
    match status {
        200..=299 => None,
        500 => Some(DispatchError::ServerError),
        503 => Some(DispatchError::Unavailable { retry_after }),
        401 => Some(DispatchError::AuthenticationError),
        400 => Some(DispatchError::InvalidRequest),
        other => Some(DispatchError::UnexpectedStatus(other)),
    }
}

/// reqwest-backed FCM transport authenticated with the server API key.
pub struct HttpFcmClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl HttpFcmClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            endpoint: SERVER_URI.to_string(),
        }
    }

    /// Overrides the provider endpoint. Used for self-hosted gateways.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl FcmClient for HttpFcmClient {
    async fn send(&self, payload: &FcmPayload) -> Result<FcmResponse, DispatchError> {
        debug!(
            "Posting FCM multicast for {} registration ids",
            payload.registration_ids.len()
        );

        let response = self
            .http
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.api_key))
            .json(payload)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(format!("FCM request failed: {e}")))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        if let Some(err) = classify_status(status, retry_after) {
            return Err(err);
        }

        response
            .json::<FcmResponse>()
            .await
            .map_err(|e| DispatchError::MalformedResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_statuses_pass_through() {
        assert!(classify_status(200, None).is_none());
        assert!(classify_status(201, None).is_none());
    }

    #[test]
    fn test_server_errors_map_to_retryable_variants() {
        let err = classify_status(500, None).unwrap();
        assert!(matches!(err, DispatchError::ServerError));
        assert!(err.is_retryable());

        let err = classify_status(503, Some("30".to_string())).unwrap();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("30"));
    }

    #[test]
    fn test_client_errors_map_to_permanent_variants() {
        assert!(matches!(
            classify_status(401, None).unwrap(),
            DispatchError::AuthenticationError
        ));
        assert!(matches!(
            classify_status(400, None).unwrap(),
            DispatchError::InvalidRequest
        ));
        assert!(matches!(
            classify_status(418, None).unwrap(),
            DispatchError::UnexpectedStatus(418)
        ));
    }
}
