/// push-dispatch
///
/// Dispatches push notifications to mobile devices through APNs and FCM
/// behind one uniform send/receive contract.
///
/// It handles:
/// - Provider-agnostic messages with structured and custom options
/// - Per-provider payload shaping and batched dispatch
/// - Correlating provider responses back to confirmed-delivery device sets
/// - Invalidated-token feedback with invalidation timestamps
/// - Structured configuration/dispatch errors with retryable classification
///
/// Delivery guarantees, retry scheduling, rate limiting and token
/// persistence are the caller's concern.
pub mod adapter;
pub mod apns;
pub mod errors;
pub mod fcm;
pub mod models;
pub mod params;

pub use adapter::{Adapter, DynAdapter};
pub use apns::ApnsAdapter;
pub use errors::{ConfigurationError, DispatchError};
pub use fcm::FcmAdapter;
pub use models::{
    Device, DeviceCollection, FeedbackEntry, Message, Platform, ProviderResponse, Push,
};
pub use params::AdapterParameters;
