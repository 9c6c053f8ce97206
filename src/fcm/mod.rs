//! Firebase Cloud Messaging multicast adapter.

mod client;
mod payload;

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::info;

use crate::adapter::Adapter;
use crate::errors::{ConfigurationError, DispatchError};
use crate::models::{DeviceCollection, FeedbackEntry, Platform, ProviderResponse, Push};
use crate::params::AdapterParameters;

pub use client::{FcmClient, HttpFcmClient};
pub use payload::{FcmPayload, FcmResponse, FcmResult};

const DEFAULT_TTL_SECS: u32 = 600;

/// Result errors that mean the registration token is gone for good.
const INVALID_TOKEN_ERRORS: [&str; 3] =
    ["NotRegistered", "InvalidRegistration", "MissingRegistration"];

/// Validated FCM configuration: the API key plus delivery-control
/// defaults, resolved once at adapter construction.
#[derive(Debug, Clone)]
pub struct FcmSettings {
    pub api_key: String,
    pub collapse_key: Option<String>,
    pub restricted_package_name: Option<String>,
    pub delay_while_idle: bool,
    pub time_to_live: u32,
    pub dry_run: bool,
    pub priority: Option<String>,
}

impl FcmSettings {
    fn from_parameters(params: &AdapterParameters) -> Result<Self, ConfigurationError> {
        Ok(Self {
            api_key: params.require_str("apiKey")?.to_owned(),
            collapse_key: params.string_opt("collapseKey"),
            restricted_package_name: params.string_opt("restrictedPackageName"),
            delay_while_idle: params.bool_or("delayWhileIdle", false),
            time_to_live: params.u32_or("ttl", DEFAULT_TTL_SECS),
            dry_run: params.bool_or("dryRun", false),
            priority: params.string_opt("priority"),
        })
    }
}

/// The most recent batch, kept so `feedback` can correlate result
/// errors back to the tokens they belong to.
#[derive(Debug, Clone)]
struct BatchRecord {
    tokens: Vec<String>,
    response: FcmResponse,
    received_at: DateTime<Utc>,
}

/// Adapter for Firebase's HTTP multicast push service.
pub struct FcmAdapter {
    settings: FcmSettings,
    client: OnceCell<Box<dyn FcmClient>>,
    last_batch: Mutex<Option<BatchRecord>>,
}

impl std::fmt::Debug for FcmAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FcmAdapter")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl FcmAdapter {
    /// Validates the parameters. No network access happens here.
    pub fn new(params: &AdapterParameters) -> Result<Self, ConfigurationError> {
        Ok(Self {
            settings: FcmSettings::from_parameters(params)?,
            client: OnceCell::new(),
            last_batch: Mutex::new(None),
        })
    }

    /// Builds the adapter around a caller-supplied transport.
    pub fn with_client(
        params: &AdapterParameters,
        client: Box<dyn FcmClient>,
    ) -> Result<Self, ConfigurationError> {
        let settings = FcmSettings::from_parameters(params)?;
        let cell = OnceCell::new();
        cell.set(client).ok();

        Ok(Self {
            settings,
            client: cell,
            last_batch: Mutex::new(None),
        })
    }

    pub fn settings(&self) -> &FcmSettings {
        &self.settings
    }

    async fn client(&self) -> Result<&dyn FcmClient, DispatchError> {
        let client = self
            .client
            .get_or_try_init(|| async {
                Ok::<Box<dyn FcmClient>, DispatchError>(Box::new(HttpFcmClient::new(
                    self.settings.api_key.clone(),
                )))
            })
            .await?;

        Ok(client.as_ref())
    }
}

#[async_trait]
impl Adapter for FcmAdapter {
    fn platform(&self) -> Platform {
        Platform::Fcm
    }

    fn supports(&self, token: &str) -> bool {
        (10..=1000).contains(&token.len()) && !token.contains(char::is_whitespace)
    }

    async fn push(&self, push: &mut Push) -> Result<DeviceCollection, DispatchError> {
        let client = self.client().await?;

        let tokens = push.devices().tokens();
        let payload = FcmPayload::build(push.message(), tokens.clone(), &self.settings);

        let response = client.send(&payload).await?;

        // Results are correlated with registration ids by position; a
        // count mismatch makes that correlation meaningless.
        if response.results.len() != push.devices().len() {
            return Err(DispatchError::MalformedResponse(format!(
                "expected {} results, got {}",
                push.devices().len(),
                response.results.len()
            )));
        }

        let mut confirmed = DeviceCollection::new();
        for (device, result) in push.devices().iter().zip(&response.results) {
            if result.is_delivered() {
                confirmed.add(device.clone());
            }
        }

        info!(
            "FCM multicast dispatched: {} of {} devices confirmed",
            confirmed.len(),
            push.devices().len()
        );

        {
            let mut last_batch = self.last_batch.lock().expect("batch record lock poisoned");
            *last_batch = Some(BatchRecord {
                tokens,
                response: response.clone(),
                received_at: Utc::now(),
            });
        }

        push.set_response(ProviderResponse::Fcm(response));
        Ok(confirmed)
    }

    /// Tokens the provider reported as invalid in the most recent
    /// batch, stamped at response receipt. Empty when no batch has been
    /// dispatched yet.
    async fn feedback(&self) -> Result<Vec<FeedbackEntry>, DispatchError> {
        // Feedback works without a prior push; the client just has
        // nothing to report yet.
        self.client().await?;

        let last_batch = self.last_batch.lock().expect("batch record lock poisoned");
        let Some(batch) = last_batch.as_ref() else {
            return Ok(Vec::new());
        };

        Ok(batch
            .tokens
            .iter()
            .zip(&batch.response.results)
            .filter(|(_, result)| {
                result
                    .error
                    .as_deref()
                    .is_some_and(|e| INVALID_TOKEN_ERRORS.contains(&e))
            })
            .map(|(token, _)| FeedbackEntry {
                token: token.clone(),
                invalidated_at: batch.received_at,
            })
            .collect())
    }
}
