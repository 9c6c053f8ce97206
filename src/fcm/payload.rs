use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::fcm::FcmSettings;
use crate::models::Message;

/// Multicast request body for the FCM HTTP API.
///
/// One payload carries the whole batch: every device token in
/// `registration_ids` and a single flat `data` map holding the message
/// text and all custom options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FcmPayload {
    pub registration_ids: Vec<String>,
    pub data: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collapse_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restricted_package_name: Option<String>,
    pub delay_while_idle: bool,
    pub time_to_live: u32,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

impl FcmPayload {
    /// Builds the multicast payload: `data` is a shallow copy of the
    /// message options with a `message` key added for the text.
    /// Delivery-control keys are consumed out of the options into their
    /// top-level fields, falling back to the adapter settings when a
    /// message does not override them.
    pub fn build(message: &Message, tokens: Vec<String>, settings: &FcmSettings) -> Self {
        let mut options = message.options().clone();

        let collapse_key =
            take_string(&mut options, "collapseKey").or_else(|| settings.collapse_key.clone());
        let restricted_package_name = take_string(&mut options, "restrictedPackageName")
            .or_else(|| settings.restricted_package_name.clone());
        let delay_while_idle =
            take_bool(&mut options, "delayWhileIdle").unwrap_or(settings.delay_while_idle);
        let time_to_live = take_u32(&mut options, "ttl").unwrap_or(settings.time_to_live);
        let dry_run = take_bool(&mut options, "dryRun").unwrap_or(settings.dry_run);
        let priority = take_string(&mut options, "priority").or_else(|| settings.priority.clone());

        let mut data: Map<String, Value> = options.into_iter().collect();
        data.insert("message".to_string(), Value::from(message.text()));

        Self {
            registration_ids: tokens,
            data,
            collapse_key,
            restricted_package_name,
            delay_while_idle,
            time_to_live,
            dry_run,
            priority,
        }
    }
}

fn take_string(options: &mut BTreeMap<String, Value>, key: &str) -> Option<String> {
    options
        .remove(key)
        .and_then(|v| v.as_str().map(str::to_owned))
}

fn take_bool(options: &mut BTreeMap<String, Value>, key: &str) -> Option<bool> {
    options.remove(key).and_then(|v| v.as_bool())
}

fn take_u32(options: &mut BTreeMap<String, Value>, key: &str) -> Option<u32> {
    options
        .remove(key)
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
}

/// Decoded multicast response body of the FCM HTTP API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FcmResponse {
    #[serde(default)]
    pub multicast_id: Option<i64>,
    #[serde(default)]
    pub success: u32,
    #[serde(default)]
    pub failure: u32,
    #[serde(default)]
    pub canonical_ids: u32,
    #[serde(default)]
    pub results: Vec<FcmResult>,
}

/// Per-registration result, positionally correlated with
/// `registration_ids`. An entry with no `error` is a confirmed
/// delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FcmResult {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub registration_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl FcmResult {
    pub fn is_delivered(&self) -> bool {
        self.error.is_none()
    }
}
