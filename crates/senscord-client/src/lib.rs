//! The symmetric client component (spec §4.10): opens a remote stream on
//! demand, forwards local SDK-shaped operations as requests, waits for
//! replies, and rehydrates inbound frames into local memory.

mod allocator_cache;
mod connection;
mod error;
mod fetch;
mod frame;
mod messenger;
mod port;

pub use allocator_cache::AllocatorCache;
pub use connection::ClientConnection;
pub use error::ClientError;
pub use fetch::{fetch_server_config, fetch_version};
pub use frame::{ReconstructedChannel, ReconstructedFrame};
pub use messenger::{secondary_connect, InboundSink, Messenger, DEFAULT_REPLY_TIMEOUT};
pub use port::ClientPort;
