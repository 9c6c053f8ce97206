use async_trait::async_trait;

use crate::errors::DispatchError;
use crate::models::{DeviceCollection, FeedbackEntry, Platform, Push};

/// Uniform send/receive contract over the provider adapters.
///
/// Both adapters resolve a dispatch the same way: `push` returns the
/// subset of the input devices the provider confirmed, and `feedback`
/// returns tokens the provider reports as no longer deliverable. The
/// raw provider result stays available on the `Push` for callers that
/// need per-recipient detail.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Provider this adapter dispatches to.
    fn platform(&self) -> Platform;

    /// Cheap syntactic check of whether a token is plausibly valid for
    /// this provider. Not a deliverability guarantee.
    fn supports(&self, token: &str) -> bool;

    /// Sends the push's message to every device in its collection as a
    /// single batched call and returns the devices whose delivery the
    /// provider confirmed. Stores the raw provider response on the
    /// push. Devices the provider rejected individually are omitted
    /// from the result, not reported as errors; only batch-level
    /// transport failures surface as `DispatchError`.
    async fn push(&self, push: &mut Push) -> Result<DeviceCollection, DispatchError>;

    /// Queries the provider's invalidated-token channel. Does not
    /// require a prior `push` call.
    async fn feedback(&self) -> Result<Vec<FeedbackEntry>, DispatchError>;
}

/// Boxed adapter for callers that pick the provider at runtime.
pub type DynAdapter = Box<dyn Adapter>;
