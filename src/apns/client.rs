use std::fs;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::apns::payload::ApnsPayload;
use crate::apns::ApnsSettings;
use crate::errors::DispatchError;

/// One notification in a batch: the shared payload bound to a device
/// token.
#[derive(Debug, Clone)]
pub struct ApnsNotification {
    pub device_token: String,
    pub payload: ApnsPayload,
}

/// Per-notification outcome, positionally correlated with the
/// submitted batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApnsOutcome {
    pub status: u16,
    pub apns_id: Option<String>,
}

/// A token APNs reported as invalidated, with the provider timestamp in
/// epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackRecord {
    pub token: String,
    pub timestamp: i64,
}

/// Low-level APNs transport: send a batch, get per-item outcomes, and
/// fetch invalidated tokens.
#[async_trait]
pub trait ApnsClient: Send + Sync {
    async fn send_batch(
        &self,
        notifications: &[ApnsNotification],
    ) -> Result<Vec<ApnsOutcome>, DispatchError>;

    async fn fetch_feedback(&self) -> Result<Vec<FeedbackRecord>, DispatchError>;
}

/// Claims of the APNs provider authentication token.
#[derive(Debug, Serialize)]
struct ProviderTokenClaims {
    iss: String,
    iat: i64,
}

#[derive(Debug, Clone)]
struct TokenCache {
    token: String,
    issued_at: i64,
}

/// Error body APNs returns on non-200 responses. `timestamp` (epoch
/// milliseconds) accompanies `410 Unregistered`.
#[derive(Debug, Deserialize)]
struct ApnsErrorBody {
    reason: Option<String>,
    timestamp: Option<i64>,
}

// Apple requires provider tokens to be refreshed between 20 and 60
// minutes after issue.
const TOKEN_REFRESH_SECS: i64 = 3000;

/// HTTP/2 APNs transport authenticated with an ES256 provider token.
///
/// Invalidated tokens are what the modern APNs reports inline as `410
/// Unregistered` responses; they are buffered here and drained by
/// `fetch_feedback`.
pub struct HttpApnsClient {
    http: reqwest::Client,
    base_url: String,
    topic: String,
    key_id: String,
    team_id: String,
    encoding_key: EncodingKey,
    token_cache: Mutex<Option<TokenCache>>,
    invalidated: Mutex<Vec<FeedbackRecord>>,
}

impl HttpApnsClient {
    pub fn new(settings: &ApnsSettings) -> Result<Self, DispatchError> {
        let pem = fs::read(&settings.private_key_path).map_err(|e| {
            DispatchError::Credential(format!(
                "failed to read private key {}: {e}",
                settings.private_key_path.display()
            ))
        })?;

        let encoding_key = EncodingKey::from_ec_pem(&pem)
            .map_err(|e| DispatchError::Credential(format!("failed to parse private key: {e}")))?;

        let http = reqwest::Client::builder()
            .http2_prior_knowledge()
            .build()
            .map_err(|e| DispatchError::Transport(format!("failed to build http client: {e}")))?;

        let base_url = if settings.production {
            "https://api.push.apple.com".to_string()
        } else {
            "https://api.sandbox.push.apple.com".to_string()
        };

        info!(
            "Initialized APNs client for topic={}, production={}",
            settings.app_bundle_id, settings.production
        );

        Ok(Self {
            http,
            base_url,
            topic: settings.app_bundle_id.clone(),
            key_id: settings.key_id.clone(),
            team_id: settings.team_id.clone(),
            encoding_key,
            token_cache: Mutex::new(None),
            invalidated: Mutex::new(Vec::new()),
        })
    }

    /// Returns the cached provider token, signing a fresh one when the
    /// cached token is due for refresh.
    fn provider_token(&self) -> Result<String, DispatchError> {
        let now = Utc::now().timestamp();

        {
            let cache = self.token_cache.lock().expect("token cache lock poisoned");
            if let Some(cached) = cache.as_ref() {
                if now - cached.issued_at < TOKEN_REFRESH_SECS {
                    return Ok(cached.token.clone());
                }
            }
        }

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.key_id.clone());

        let claims = ProviderTokenClaims {
            iss: self.team_id.clone(),
            iat: now,
        };

        let token = encode(&header, &claims, &self.encoding_key)
            .map_err(|e| DispatchError::Signing(e.to_string()))?;

        {
            let mut cache = self.token_cache.lock().expect("token cache lock poisoned");
            *cache = Some(TokenCache {
                token: token.clone(),
                issued_at: now,
            });
        }

        Ok(token)
    }
}

#[async_trait]
impl ApnsClient for HttpApnsClient {
    async fn send_batch(
        &self,
        notifications: &[ApnsNotification],
    ) -> Result<Vec<ApnsOutcome>, DispatchError> {
        let bearer = self.provider_token()?;
        let mut outcomes = Vec::with_capacity(notifications.len());

        for notification in notifications {
            let token_prefix = notification
                .device_token
                .chars()
                .take(8)
                .collect::<String>();

            let response = self
                .http
                .post(format!(
                    "{}/3/device/{}",
                    self.base_url, notification.device_token
                ))
                .bearer_auth(&bearer)
                .header("apns-topic", &self.topic)
                .header("apns-push-type", "alert")
                .header("apns-priority", "10")
                .json(&notification.payload)
                .send()
                .await
                .map_err(|e| DispatchError::Transport(format!("APNs request failed: {e}")))?;

            let status = response.status().as_u16();
            let apns_id = response
                .headers()
                .get("apns-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);

            if status == 200 {
                debug!("APNs accepted notification for token {}", token_prefix);
            } else {
                let body: Option<ApnsErrorBody> = response.json().await.ok();
                let reason = body
                    .as_ref()
                    .and_then(|b| b.reason.clone())
                    .unwrap_or_else(|| "unknown".to_string());

                warn!(
                    "APNs rejected notification for token {}: status={}, reason={}",
                    token_prefix, status, reason
                );

                if status == 410 {
                    let timestamp = body
                        .and_then(|b| b.timestamp)
                        .map(|ms| ms / 1000)
                        .unwrap_or_else(|| Utc::now().timestamp());

                    let mut invalidated =
                        self.invalidated.lock().expect("feedback buffer lock poisoned");
                    invalidated.push(FeedbackRecord {
                        token: notification.device_token.clone(),
                        timestamp,
                    });
                }
            }

            outcomes.push(ApnsOutcome { status, apns_id });
        }

        Ok(outcomes)
    }

    async fn fetch_feedback(&self) -> Result<Vec<FeedbackRecord>, DispatchError> {
        let mut invalidated = self.invalidated.lock().expect("feedback buffer lock poisoned");
        Ok(std::mem::take(&mut *invalidated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_decodes_unregistered() {
        let body: ApnsErrorBody =
            serde_json::from_str(r#"{"reason":"Unregistered","timestamp":1356021300000}"#)
                .unwrap();
        assert_eq!(body.reason.as_deref(), Some("Unregistered"));
        assert_eq!(body.timestamp, Some(1_356_021_300_000));
    }

    #[test]
    fn test_error_body_tolerates_missing_fields() {
        let body: ApnsErrorBody = serde_json::from_str("{}").unwrap();
        assert!(body.reason.is_none());
        assert!(body.timestamp.is_none());
    }
}
