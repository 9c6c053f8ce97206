use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::Message;

/// Alert dictionary of the APNs JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApnsAlert {
    pub title: String,
    pub body: String,
}

/// The `aps` dictionary: structured, provider-interpreted fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aps {
    pub alert: ApnsAlert,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    #[serde(
        rename = "content-available",
        skip_serializing_if = "Option::is_none"
    )]
    pub content_available: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(rename = "thread-id", skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// Full APNs payload: the `aps` dictionary plus top-level custom data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApnsPayload {
    pub aps: Aps,
    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

impl ApnsPayload {
    /// Builds the payload from a provider-agnostic message.
    ///
    /// The message text fills both alert title and body (the message
    /// model has no separate title). Recognized structured options are
    /// consumed into the `aps` dictionary; every remaining option
    /// becomes a custom field, so structured keys never leak into the
    /// custom-data section.
    pub fn from_message(message: &Message) -> Self {
        let mut options = message.options().clone();

        let badge = options
            .remove("badge")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32);
        let sound = options
            .remove("sound")
            .and_then(|v| v.as_str().map(str::to_owned));
        let content_available = options.remove("contentAvailable").and_then(|v| match v {
            Value::Bool(true) => Some(1),
            Value::Bool(false) => None,
            Value::Number(n) => n.as_u64().map(|n| n.min(1) as u8),
            _ => None,
        });
        let category = options
            .remove("category")
            .and_then(|v| v.as_str().map(str::to_owned));
        let thread_id = options
            .remove("threadId")
            .and_then(|v| v.as_str().map(str::to_owned));

        let custom: Map<String, Value> = options.into_iter().collect();

        Self {
            aps: Aps {
                alert: ApnsAlert {
                    title: message.text().to_owned(),
                    body: message.text().to_owned(),
                },
                badge,
                sound,
                content_available,
                category,
                thread_id,
            },
            custom,
        }
    }
}
