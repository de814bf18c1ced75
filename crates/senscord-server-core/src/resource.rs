use std::sync::Arc;

use async_trait::async_trait;
use senscord_proto::{Channel, Message, RawDataInfo};
use senscord_sdk::SensorCore;
use senscord_transport::TransportError;

use crate::error::AdapterError;

/// What a resource adapter uses to get a message to its owning client (spec
/// §4.4 "Outbound fan-in"): frame messages prefer an attached secondary
/// connection, falling back to primary on failure; everything else always
/// goes over primary. Implemented by the primary client adapter.
#[async_trait]
pub trait OutboundSink: Send + Sync {
    async fn send_message_to_client(&self, msg: Message) -> Result<(), TransportError>;

    /// Delegates to the primary transport's `get_channel_raw_data` hook
    /// (spec §4.1/§4.6) to pick a channel's delivery mode.
    fn raw_data_for_channel(&self, channel_hint: &Channel, bytes: Vec<u8>) -> RawDataInfo;
}

/// Worker-loop discriminant (spec §4.5 `monitor(kind)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    Standard,
    LockUnlock,
}

/// Public contract every resource adapter (stream or publisher) implements
/// (spec §4.5).
#[async_trait]
pub trait ResourceAdapter: Send + Sync {
    fn resource_id(&self) -> u64;

    /// Releases the underlying SDK resource (`core.close_stream` /
    /// `core.close_publisher`).
    async fn close(&self, core: &dyn SensorCore) -> Result<(), AdapterError>;

    /// Spawns the adapter's worker task(s).
    async fn start_monitoring(self: Arc<Self>, outbound: Arc<dyn OutboundSink>);

    /// Signals end, joins workers, and drains+releases anything left queued.
    async fn stop_monitoring(&self);

    /// Enqueues an inbound message, classifying Lock/Unlock into their own
    /// queue. If the adapter is already ending, the message is dropped
    /// immediately rather than enqueued (our transports own message memory
    /// through normal Rust ownership, so "release" here is simply not
    /// retaining it).
    async fn push_message(&self, msg: Message);
}
