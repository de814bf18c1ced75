use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::SdkError;
use crate::types::{SdkEvent, SdkFrame};

/// A resource's opaque lock handle, returned by `LockProperty` and consumed
/// by `UnlockProperty` (spec §4.6).
pub type LockResourceId = u64;

/// One open stream resource, owned exclusively by the client adapter that
/// opened it (spec §3 "Resource entities"). All methods are async to leave
/// room for a real SDK binding that crosses a process or hardware boundary;
/// the in-memory mock in this crate completes them synchronously.
#[async_trait]
pub trait Stream: Send + Sync {
    fn resource_id(&self) -> u64;

    async fn start(&self) -> Result<(), SdkError>;
    async fn stop(&self) -> Result<(), SdkError>;

    async fn get_property(&self, key: &str) -> Result<Vec<u8>, SdkError>;
    async fn set_property(&self, key: &str, value: Vec<u8>) -> Result<Vec<u8>, SdkError>;
    async fn property_keys(&self) -> Vec<String>;

    async fn lock_properties(
        &self,
        keys: &[String],
        timeout_msec: i32,
    ) -> Result<LockResourceId, SdkError>;
    async fn unlock_properties(&self, resource_id: LockResourceId) -> Result<(), SdkError>;

    async fn register_event(&self, event_type: &str);
    async fn unregister_event(&self, event_type: &str);

    /// Signalled whenever a registered event becomes available for delivery
    /// (mirrors `frame_ready`/`take_frame` for the event-publishing path,
    /// spec §4.6 "Event publishing").
    fn event_ready(&self) -> Arc<Notify>;

    /// Pop the oldest queued event, if any.
    async fn take_event(&self) -> Option<SdkEvent>;

    /// Signalled whenever new frames become available (mirrors the SDK's
    /// frame-arrival callback under the tokio-task concurrency model — see
    /// the REDESIGN section of SPEC_FULL.md).
    fn frame_ready(&self) -> Arc<Notify>;

    /// Number of frames currently buffered and not yet drained, mirroring
    /// `CurrentFrameNumProperty` polling in the original.
    async fn arrived_frame_count(&self) -> usize;

    /// Pop the oldest buffered frame, if any (`get_frame(polling)`).
    async fn take_frame(&self) -> Option<SdkFrame>;

    /// Drop any buffered-but-undelivered frames, e.g. on Stop (spec §4.6).
    async fn clear_arrived_frames(&self);

    /// Release a previously delivered frame's raw data. `unused` distinguishes
    /// `release_frame_unused` (no channel in the frame was ever read) from a
    /// normal release — both just drop bookkeeping in the mock, but keeping
    /// them distinct matches the SDK contract adapters rely on.
    async fn release_frame(&self, sequence_number: u64, unused: bool) -> Result<(), SdkError>;
}
