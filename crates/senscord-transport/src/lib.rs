//! The transport abstraction every listener, client adapter, and client
//! component programs against (spec §4.1), plus a TCP implementation for
//! real connections and a loopback implementation for same-process tests.

mod error;
pub mod loopback;
pub mod tcp;

pub use error::TransportError;

use async_trait::async_trait;
use senscord_proto::{Channel, Message, RawDataInfo};

/// A bound/connected endpoint. Implementors decide their own framing;
/// `send`/`recv` only need to preserve header and payload identity.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Free-form backend-specific setup, e.g. socket options. Most
    /// implementations treat this as a no-op.
    async fn open(&mut self, arguments: &[(String, String)]) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;

    async fn connect(&mut self, address: &str) -> Result<(), TransportError>;

    async fn bind(&mut self, address: &str) -> Result<(), TransportError>;

    async fn listen(&mut self) -> Result<(), TransportError>;

    /// Accept one inbound connection. The returned `bool` is the
    /// "same system" flag: true when the accepted peer shares this
    /// process's host (and, for the loopback transport, its address
    /// space) — this is the signal `get_channel_raw_data` uses to offer
    /// shared-memory descriptors instead of inline bytes.
    async fn accept(&mut self) -> Result<(Box<dyn Transport>, bool), TransportError>;

    async fn send(&mut self, message: &Message) -> Result<(), TransportError>;

    /// Blocks until a full message is available and returns it. Any memory
    /// the implementation allocated while assembling the message must be
    /// released via [`Transport::release_message`] once the caller is done
    /// with it.
    async fn recv(&mut self) -> Result<Message, TransportError>;

    /// Release resources retained for a message returned by `recv`. Most
    /// implementations (this crate's included) own their message memory
    /// through normal Rust ownership and treat this as a no-op; it exists so
    /// transports backed by pooled buffers have a place to return them.
    fn release_message(&mut self, _message: &Message) {}

    /// Waits up to `timeout_nanos` for the connection to become readable.
    /// `0` means "return immediately if not already readable".
    async fn wait_readable(&mut self, timeout_nanos: u64) -> Result<(), TransportError>;

    /// Chooses how a channel's raw data should be delivered: inline
    /// (`AllData`) or by shared-memory descriptor (`AddressSizeOnly`).
    /// Transports with a same-system shared allocator should prefer the
    /// descriptor form; this default always inlines.
    fn get_channel_raw_data(&self, _channel_hint: &Channel, bytes: Vec<u8>) -> RawDataInfo {
        RawDataInfo::AllData(bytes)
    }

    /// Enumerate reachable peer addresses, for transports that support
    /// discovery. Most implementations return `NotSupported`.
    async fn search(&self) -> Result<Vec<String>, TransportError> {
        Err(TransportError::NotSupported("search"))
    }
}
