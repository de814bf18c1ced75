//! Per-publisher allocator cache (spec §4.7/§4.10): maps a channel's
//! allocator key to a shared-memory allocator, opened lazily on first use.
//! Mirrors `senscord-client`'s `AllocatorCache`, which does the same job for
//! the symmetric client-side reconstruction path.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use senscord_shmem::{AllocatorError, SharedMemoryAllocator};

const DEFAULT_REGION_SIZE: usize = 16 * 1024 * 1024;

/// Allocator key used for channels that declare none.
pub const DEFAULT_ALLOCATOR_KEY: &str = "default";

pub struct AllocatorCache {
    base_dir: PathBuf,
    allocators: Mutex<HashMap<String, std::sync::Arc<SharedMemoryAllocator>>>,
}

impl AllocatorCache {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            allocators: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_open(&self, allocator_key: &str) -> Result<std::sync::Arc<SharedMemoryAllocator>, AllocatorError> {
        if let Some(existing) = self.allocators.lock().expect("allocator cache mutex poisoned").get(allocator_key) {
            return Ok(existing.clone());
        }
        let allocator = std::sync::Arc::new(SharedMemoryAllocator::open(
            &self.base_dir,
            allocator_key,
            senscord_shmem::recommended_region_size(DEFAULT_REGION_SIZE),
        )?);
        self.allocators
            .lock()
            .expect("allocator cache mutex poisoned")
            .insert(allocator_key.to_owned(), allocator.clone());
        Ok(allocator)
    }
}
