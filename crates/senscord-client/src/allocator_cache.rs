//! Per-port allocator cache (spec §4.10 step 1): "if the channel declares an
//! allocator key, look it up in the allocator cache; create and initialize
//! on first use." Torn down only when the port frame manager observes
//! `stop()` plus an empty outstanding set (spec §4.10 "port frame manager").

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use senscord_shmem::{AllocatorError, SharedMemoryAllocator};

const DEFAULT_REGION_SIZE: usize = 16 * 1024 * 1024;

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

    /// Looks up (or opens) the named allocator. Empty allocator keys are not
    /// cached by this layer's caller — the client only consults the cache
    /// when a channel names one.
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

    /// Releases every cached allocator handle (spec §4.10: "the only place
    /// the allocator cache is torn down").
    pub fn close_all(&self) {
        self.allocators.lock().expect("allocator cache mutex poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_lookups_return_the_same_allocator() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AllocatorCache::new(dir.path());
        let a = cache.get_or_open("camera_0").unwrap();
        let b = cache.get_or_open("camera_0").unwrap();
        assert!(std::sync::Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn close_all_drops_every_cached_allocator() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AllocatorCache::new(dir.path());
        cache.get_or_open("camera_0").unwrap();
        cache.close_all();
        assert!(cache.allocators.lock().unwrap().is_empty());
    }
}
