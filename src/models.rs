use std::collections::BTreeMap;
use std::slice;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::apns::ApnsOutcome;
use crate::fcm::FcmResponse;

/// Push provider a device token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "APNs")]
    Apns,
    #[serde(rename = "FCM")]
    Fcm,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Apns => "APNs",
            Platform::Fcm => "FCM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "APNS" => Some(Platform::Apns),
            "FCM" => Some(Platform::Fcm),
            _ => None,
        }
    }
}

/// A push target. Identity is the token; two devices with the same token
/// are the same device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    token: String,
    platform: Platform,
}

impl Device {
    pub fn new(token: impl Into<String>, platform: Platform) -> Self {
        Self {
            token: token.into(),
            platform,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }
}

/// An insertion-ordered set of devices, unique by token.
///
/// Adapters never mutate the collection handed to `push`; confirmed
/// deliveries come back as a new collection that is always a subset of
/// the input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCollection {
    devices: Vec<Device>,
}

impl DeviceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a device, ignoring it when a device with the same token is
    /// already present. Returns whether the device was inserted.
    pub fn add(&mut self, device: Device) -> bool {
        if self.contains_token(device.token()) {
            return false;
        }
        self.devices.push(device);
        true
    }

    pub fn remove(&mut self, token: &str) -> Option<Device> {
        let idx = self.devices.iter().position(|d| d.token() == token)?;
        Some(self.devices.remove(idx))
    }

    pub fn contains_token(&self, token: &str) -> bool {
        self.devices.iter().any(|d| d.token() == token)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, Device> {
        self.devices.iter()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.token().to_owned()).collect()
    }

    pub fn is_subset_of(&self, other: &DeviceCollection) -> bool {
        self.devices.iter().all(|d| other.contains_token(d.token()))
    }
}

impl FromIterator<Device> for DeviceCollection {
    fn from_iter<I: IntoIterator<Item = Device>>(iter: I) -> Self {
        let mut collection = DeviceCollection::new();
        for device in iter {
            collection.add(device);
        }
        collection
    }
}

impl<'a> IntoIterator for &'a DeviceCollection {
    type Item = &'a Device;
    type IntoIter = slice::Iter<'a, Device>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.iter()
    }
}

/// A provider-agnostic notification: text plus an options bag.
///
/// Recognized option keys (`badge`, `sound`, `contentAvailable`,
/// `category`, `threadId` for APNs; `collapseKey`,
/// `restrictedPackageName`, `delayWhileIdle`, `ttl`, `dryRun`,
/// `priority` for FCM) are lifted into structured payload fields during
/// payload building; everything else rides along as custom data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    text: String,
    #[serde(default)]
    options: BTreeMap<String, Value>,
}

impl Message {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            options: BTreeMap::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    pub fn options(&self) -> &BTreeMap<String, Value> {
        &self.options
    }
}

/// Provider-native result of one dispatch attempt, kept raw on the Push.
#[derive(Debug, Clone)]
pub enum ProviderResponse {
    /// Ordered per-notification outcomes, positionally correlated with
    /// the submitted device list.
    Apns(Vec<ApnsOutcome>),
    /// Decoded multicast response body.
    Fcm(FcmResponse),
}

/// One dispatch attempt: a message bound to a device batch, and after a
/// successful transport call, the raw provider response.
#[derive(Debug, Clone)]
pub struct Push {
    message: Message,
    devices: DeviceCollection,
    response: Option<ProviderResponse>,
}

impl Push {
    pub fn new(message: Message, devices: DeviceCollection) -> Self {
        Self {
            message,
            devices,
            response: None,
        }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn devices(&self) -> &DeviceCollection {
        &self.devices
    }

    pub fn response(&self) -> Option<&ProviderResponse> {
        self.response.as_ref()
    }

    pub(crate) fn set_response(&mut self, response: ProviderResponse) {
        self.response = Some(response);
    }
}

/// A token the provider reports as no longer deliverable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub token: String,
    pub invalidated_at: DateTime<Utc>,
}

impl FeedbackEntry {
    /// Builds an entry from the provider's epoch-seconds invalidation
    /// timestamp. Out-of-range timestamps collapse to the epoch.
    pub fn from_epoch_seconds(token: impl Into<String>, secs: i64) -> Self {
        Self {
            token: token.into(),
            invalidated_at: DateTime::from_timestamp(secs, 0).unwrap_or_default(),
        }
    }
}
