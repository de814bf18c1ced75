use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::SdkError;
use crate::types::SdkFrame;

/// A release notification emitted by the SDK after a published frame's raw
/// data is no longer needed downstream (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReleased {
    pub sequence_number: u64,
    /// True if any channel's allocator reported `is_memory_shared`; the
    /// publisher adapter uses this to decide whether a `ReleaseFrame`
    /// request must be sent upstream.
    pub any_channel_shared: bool,
}

/// A publisher resource, symmetric to [`crate::stream::Stream`] but on the
/// receiving end of client-sent frames (spec §4.7).
#[async_trait]
pub trait Publisher: Send + Sync {
    fn resource_id(&self) -> u64;

    async fn publish_frames(&self, frames: Vec<SdkFrame>) -> Result<(), SdkError>;

    /// Signalled when the SDK has finished with a previously published
    /// frame's raw data.
    fn release_ready(&self) -> Arc<Notify>;

    /// Pop the oldest pending release notification, if any.
    async fn take_release(&self) -> Option<FrameReleased>;
}
