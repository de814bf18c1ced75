//! Shared-memory allocator and wire address descriptor for senscord streams.
//!
//! Leaf crate: depends only on `thiserror`, `tracing`, and the OS-level
//! shared-memory primitives (`memmap2`, `libc`). Ported from the first-fit
//! allocator in `lib/core/allocator/` of the original implementation.

mod address;
mod allocator;
mod crc32;
mod firstfit;
mod region;

pub use address::{SharedAddressInfo, WIRE_SIZE};
pub use allocator::{recommended_region_size, AllocatorRegistry, MappedBlock, SharedMemoryAllocator};
pub use firstfit::{BlockRange, FirstFitAllocation};
pub use region::{round_up_to_block, SharedRegion};

/// Errors raised by the allocator and shared-memory region layer.
///
/// Maps onto a subset of the wire `Cause` taxonomy (see `senscord-proto`):
/// `InvalidArgument` -> `Cause::InvalidArgument`, `ResourceExhausted` ->
/// `Cause::ResourceExhausted`, `NotFound` -> `Cause::NotFound`, `Io` ->
/// `Cause::HardwareError`.
#[derive(Debug, thiserror::Error)]
pub enum AllocatorError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("no free block large enough for the request")]
    ResourceExhausted,

    #[error("not found: {0}")]
    NotFound(&'static str),

    #[error("shared-memory io error: {0}")]
    Io(String),
}
