//! The sensor SDK seam: the `SensorCore`/`Stream`/`Publisher` contracts the
//! server core programs against, plus an in-memory mock implementation.

mod core;
mod error;
pub mod mock;
mod publisher;
mod stream;
mod types;

pub use core::SensorCore;
pub use error::SdkError;
pub use publisher::{FrameReleased, Publisher};
pub use stream::{LockResourceId, Stream};
pub use types::{
    Arguments, SdkChannel, SdkEvent, SdkEventArgValue, SdkFrame, StreamCatalogEntry,
    StreamVersionRecord, VersionRecord,
};
