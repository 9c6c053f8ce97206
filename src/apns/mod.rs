//! Apple Push Notification service adapter.

mod client;
mod payload;

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::adapter::Adapter;
use crate::errors::{ConfigurationError, DispatchError};
use crate::models::{DeviceCollection, FeedbackEntry, Platform, ProviderResponse, Push};
use crate::params::AdapterParameters;

pub use client::{ApnsClient, ApnsNotification, ApnsOutcome, FeedbackRecord, HttpApnsClient};
pub use payload::{ApnsAlert, ApnsPayload, Aps};

/// Validated APNs configuration.
#[derive(Debug, Clone)]
pub struct ApnsSettings {
    pub key_id: String,
    pub team_id: String,
    pub app_bundle_id: String,
    pub private_key_path: PathBuf,
    pub private_key_secret: String,
    pub production: bool,
}

impl ApnsSettings {
    fn from_parameters(params: &AdapterParameters) -> Result<Self, ConfigurationError> {
        Ok(Self {
            key_id: params.require_str("key_id")?.to_owned(),
            team_id: params.require_str("team_id")?.to_owned(),
            app_bundle_id: params.require_str("app_bundle_id")?.to_owned(),
            private_key_path: PathBuf::from(params.require_str("private_key_path")?),
            private_key_secret: params.require_str("private_key_secret")?.to_owned(),
            production: params.bool_or("production", false),
        })
    }
}

/// Adapter for Apple's token-authenticated push service.
///
/// The transport client is created lazily on the first `push` or
/// `feedback` call and reused for the adapter's lifetime.
pub struct ApnsAdapter {
    settings: ApnsSettings,
    client: OnceCell<Box<dyn ApnsClient>>,
}

impl std::fmt::Debug for ApnsAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApnsAdapter")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ApnsAdapter {
    /// Validates the parameters and checks that the referenced private
    /// key exists on disk. No network access happens here.
    pub fn new(params: &AdapterParameters) -> Result<Self, ConfigurationError> {
        let settings = ApnsSettings::from_parameters(params)?;

        if !settings.private_key_path.exists() {
            return Err(ConfigurationError::MissingCredential {
                path: settings.private_key_path,
            });
        }

        if !settings.private_key_secret.is_empty() {
            // Apple-issued .p8 keys are not passphrase protected; the
            // secret is accepted for interface parity but cannot be
            // applied to the key itself.
            warn!("private_key_secret is set but encrypted keys are not supported");
        }

        Ok(Self {
            settings,
            client: OnceCell::new(),
        })
    }

    /// Builds the adapter around a caller-supplied transport. The
    /// parameters are still validated, but the on-disk credential check
    /// is skipped since the supplied client owns its own credentials.
    pub fn with_client(
        params: &AdapterParameters,
        client: Box<dyn ApnsClient>,
    ) -> Result<Self, ConfigurationError> {
        let settings = ApnsSettings::from_parameters(params)?;
        let cell = OnceCell::new();
        cell.set(client).ok();

        Ok(Self {
            settings,
            client: cell,
        })
    }

    pub fn settings(&self) -> &ApnsSettings {
        &self.settings
    }

    async fn client(&self) -> Result<&dyn ApnsClient, DispatchError> {
        let client = self
            .client
            .get_or_try_init(|| async {
                let client = HttpApnsClient::new(&self.settings)?;
                Ok::<Box<dyn ApnsClient>, DispatchError>(Box::new(client))
            })
            .await?;

        Ok(client.as_ref())
    }
}

#[async_trait]
impl Adapter for ApnsAdapter {
    fn platform(&self) -> Platform {
        Platform::Apns
    }

    fn supports(&self, token: &str) -> bool {
        token.len() >= 64 && token.chars().all(|c| c.is_ascii_hexdigit())
    }

    async fn push(&self, push: &mut Push) -> Result<DeviceCollection, DispatchError> {
        let client = self.client().await?;

        let payload = ApnsPayload::from_message(push.message());
        let notifications: Vec<ApnsNotification> = push
            .devices()
            .iter()
            .map(|device| ApnsNotification {
                device_token: device.token().to_owned(),
                payload: payload.clone(),
            })
            .collect();

        let outcomes = client.send_batch(&notifications).await?;

        // Outcomes are correlated with devices by position; a count
        // mismatch makes that correlation meaningless.
        if outcomes.len() != push.devices().len() {
            return Err(DispatchError::MalformedResponse(format!(
                "expected {} outcomes, got {}",
                push.devices().len(),
                outcomes.len()
            )));
        }

        let mut confirmed = DeviceCollection::new();
        for (device, outcome) in push.devices().iter().zip(&outcomes) {
            if outcome.status == 200 {
                confirmed.add(device.clone());
            }
        }

        info!(
            "APNs batch dispatched: {} of {} devices confirmed",
            confirmed.len(),
            push.devices().len()
        );

        push.set_response(ProviderResponse::Apns(outcomes));
        Ok(confirmed)
    }

    async fn feedback(&self) -> Result<Vec<FeedbackEntry>, DispatchError> {
        let client = self.client().await?;
        let records = client.fetch_feedback().await?;

        Ok(records
            .into_iter()
            .map(|r| FeedbackEntry::from_epoch_seconds(r.token, r.timestamp))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Device, Message};
    use std::sync::{Arc, Mutex};

    fn params() -> AdapterParameters {
        AdapterParameters::new()
            .with("key_id", "ABC123DEFG")
            .with("team_id", "TEAM456789")
            .with("app_bundle_id", "com.example.app")
            .with("private_key_path", "/nonexistent/key.p8")
            .with("private_key_secret", "")
    }

    fn params_with_secret() -> AdapterParameters {
        params().with("private_key_secret", "secret")
    }

    struct FakeApnsClient {
        outcomes: Vec<ApnsOutcome>,
        feedback: Vec<FeedbackRecord>,
        batch_sizes: Arc<Mutex<Vec<usize>>>,
    }

    impl FakeApnsClient {
        fn with_outcomes(outcomes: Vec<ApnsOutcome>) -> Self {
            Self {
                outcomes,
                feedback: Vec::new(),
                batch_sizes: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn with_feedback(feedback: Vec<FeedbackRecord>) -> Self {
            Self {
                outcomes: Vec::new(),
                feedback,
                batch_sizes: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl ApnsClient for FakeApnsClient {
        async fn send_batch(
            &self,
            notifications: &[ApnsNotification],
        ) -> Result<Vec<ApnsOutcome>, DispatchError> {
            self.batch_sizes.lock().unwrap().push(notifications.len());
            Ok(self.outcomes.clone())
        }

        async fn fetch_feedback(&self) -> Result<Vec<FeedbackRecord>, DispatchError> {
            Ok(self.feedback.clone())
        }
    }

    fn outcome(status: u16) -> ApnsOutcome {
        ApnsOutcome {
            status,
            apns_id: Some("id".to_string()),
        }
    }

    fn devices(tokens: &[&str]) -> DeviceCollection {
        tokens
            .iter()
            .map(|t| Device::new(*t, Platform::Apns))
            .collect()
    }

    #[test]
    fn test_construction_fails_on_missing_parameter() {
        let params = AdapterParameters::new()
            .with("team_id", "TEAM456789")
            .with("app_bundle_id", "com.example.app")
            .with("private_key_path", "/nonexistent/key.p8")
            .with("private_key_secret", "x");

        let err = ApnsAdapter::new(&params).unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingParameter("key_id")));
    }

    #[test]
    fn test_construction_fails_on_missing_certificate() {
        let err = ApnsAdapter::new(&params_with_secret()).unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingCredential { .. }));
        assert!(err.to_string().contains("/nonexistent/key.p8"));
    }

    #[test]
    fn test_construction_succeeds_with_existing_key_file() {
        let key_file = tempfile::NamedTempFile::new().unwrap();
        let params = params_with_secret().with(
            "private_key_path",
            key_file.path().to_str().unwrap(),
        );

        let adapter = ApnsAdapter::new(&params).unwrap();
        assert_eq!(adapter.platform(), Platform::Apns);
        assert!(!adapter.settings().production);
    }

    #[tokio::test]
    async fn test_push_returns_devices_with_accepted_status() {
        let client =
            FakeApnsClient::with_outcomes(vec![outcome(200), outcome(404), outcome(200)]);
        let adapter = ApnsAdapter::with_client(&params_with_secret(), Box::new(client)).unwrap();

        let mut push = Push::new(Message::new("hello"), devices(&["A", "B", "C"]));
        let confirmed = adapter.push(&mut push).await.unwrap();

        assert_eq!(confirmed.tokens(), vec!["A", "C"]);
        assert!(confirmed.is_subset_of(push.devices()));
        match push.response() {
            Some(ProviderResponse::Apns(outcomes)) => assert_eq!(outcomes.len(), 3),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_push_confirmed_count_matches_accepted_outcomes() {
        let outcomes = vec![
            outcome(200),
            outcome(410),
            outcome(200),
            outcome(500),
            outcome(200),
        ];
        let accepted = outcomes.iter().filter(|o| o.status == 200).count();

        let client = FakeApnsClient::with_outcomes(outcomes);
        let adapter = ApnsAdapter::with_client(&params_with_secret(), Box::new(client)).unwrap();

        let mut push = Push::new(
            Message::new("hello"),
            devices(&["d1", "d2", "d3", "d4", "d5"]),
        );
        let confirmed = adapter.push(&mut push).await.unwrap();

        assert_eq!(confirmed.len(), accepted);
        assert!(confirmed.is_subset_of(push.devices()));
    }

    #[tokio::test]
    async fn test_push_sends_one_batch_with_all_devices() {
        let client = FakeApnsClient::with_outcomes(vec![outcome(200), outcome(200)]);
        let batch_sizes = client.batch_sizes.clone();
        let adapter = ApnsAdapter::with_client(&params_with_secret(), Box::new(client)).unwrap();

        let mut push = Push::new(Message::new("hello"), devices(&["A", "B"]));
        adapter.push(&mut push).await.unwrap();

        // One batched call carrying the full device set; the input
        // collection is never mutated by dispatch.
        assert_eq!(*batch_sizes.lock().unwrap(), vec![2]);
        assert_eq!(push.devices().len(), 2);
    }

    #[tokio::test]
    async fn test_push_rejects_outcome_count_mismatch() {
        let client = FakeApnsClient::with_outcomes(vec![outcome(200)]);
        let adapter = ApnsAdapter::with_client(&params_with_secret(), Box::new(client)).unwrap();

        let mut push = Push::new(Message::new("hello"), devices(&["A", "B", "C"]));
        let err = adapter.push(&mut push).await.unwrap_err();

        assert!(matches!(err, DispatchError::MalformedResponse(_)));
        assert!(err.to_string().contains("expected 3 outcomes, got 1"));
        assert!(push.response().is_none());
    }

    #[tokio::test]
    async fn test_feedback_decodes_epoch_seconds() {
        let client = FakeApnsClient::with_feedback(vec![FeedbackRecord {
            token: "dead-token".to_string(),
            timestamp: 1_356_021_300,
        }]);
        let adapter = ApnsAdapter::with_client(&params_with_secret(), Box::new(client)).unwrap();

        let entries = adapter.feedback().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].token, "dead-token");
        assert_eq!(
            entries[0],
            FeedbackEntry::from_epoch_seconds("dead-token", 1_356_021_300)
        );
    }

    #[test]
    fn test_supports_checks_token_syntax() {
        let key_file = tempfile::NamedTempFile::new().unwrap();
        let params = params_with_secret().with(
            "private_key_path",
            key_file.path().to_str().unwrap(),
        );
        let adapter = ApnsAdapter::new(&params).unwrap();

        assert!(adapter.supports(&"ab".repeat(32)));
        assert!(adapter.supports(&"0123456789abcdef".repeat(4)));
        assert!(!adapter.supports(""));
        assert!(!adapter.supports("short"));
        assert!(!adapter.supports(&"zz".repeat(32)));
    }
}
