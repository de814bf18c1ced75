//! The server's stream-multiplexing engine: client adapters, resource
//! adapters, the manager that owns them, and the listener that feeds it.

mod allocator_cache;
mod client_adapter;
mod error;
mod ids;
mod listener;
mod manager;
mod publisher_adapter;
mod queue;
mod resource;
mod secondary;
mod stream_adapter;

pub use client_adapter::ClientAdapter;
pub use error::AdapterError;
pub use ids::IdAllocator;
pub use listener::{Listener, ListenerRole};
pub use manager::{ClientAdapterManager, FrameSink, ManagedAdapter};
pub use publisher_adapter::PublisherResourceAdapter;
pub use queue::ResourceQueue;
pub use resource::{OutboundSink, ResourceAdapter, WorkerKind};
pub use secondary::SecondaryClientAdapter;
pub use stream_adapter::StreamResourceAdapter;
