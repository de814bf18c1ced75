//! `SharedMemoryAllocator`: the server/client-facing allocator façade.
//!
//! Composes a [`SharedRegion`], a [`FirstFitAllocation`] free list (in block
//! units), and the [`SharedAddressInfo`] wire codec. Ported from
//! `SharedMemoryAllocator` in `shared_memory_allocator.cpp`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::address::SharedAddressInfo;
use crate::firstfit::FirstFitAllocation;
use crate::region::{round_up_to_block, SharedRegion};
use crate::AllocatorError;

const BLOCK_SIZE: usize = 4096;

/// A block of memory handed back from [`SharedMemoryAllocator::allocate`] or
/// [`SharedMemoryAllocator::map`].
#[derive(Debug, Clone, Copy)]
pub struct MappedBlock {
    pub physical_address: i32,
    pub allocated_size: i32,
    pub offset: i32,
    pub size: i32,
    /// True when this block was obtained by mapping a peer's descriptor
    /// rather than allocating fresh (affects whether `free` releases the
    /// backing blocks or only drops the mapping).
    owns_allocation: bool,
}

struct Inner {
    region: SharedRegion,
    method: FirstFitAllocation,
    /// offset (in blocks) -> block count, for blocks this process allocated
    /// (as opposed to merely mapped from a peer descriptor).
    owned: HashMap<i32, i32>,
}

pub struct SharedMemoryAllocator {
    name: String,
    inner: Mutex<Inner>,
}

impl SharedMemoryAllocator {
    /// Create or attach to the named region under `base_dir`, sized to hold
    /// at least `total_size` bytes (rounded up to a block multiple).
    pub fn open(base_dir: &Path, name: &str, total_size: usize) -> Result<Self, AllocatorError> {
        let region = SharedRegion::open(base_dir, name, total_size)?;
        let total_blocks = (region.total_size() / BLOCK_SIZE) as i32;
        let method = FirstFitAllocation::new(total_blocks)?;
        Ok(Self {
            name: name.to_owned(),
            inner: Mutex::new(Inner {
                region,
                method,
                owned: HashMap::new(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_memory_shared(&self) -> bool {
        true
    }

    /// Allocate a fresh block of `size` bytes and return its handle.
    pub fn allocate(&self, size: usize) -> Result<MappedBlock, AllocatorError> {
        if size == 0 {
            return Err(AllocatorError::InvalidArgument("size == 0"));
        }
        let mut inner = self.inner.lock().expect("allocator mutex poisoned");
        if size > inner.region.total_size() {
            return Err(AllocatorError::InvalidArgument("size is too large"));
        }
        let blocks = size.div_ceil(BLOCK_SIZE) as i32;
        let range = inner.method.allocate(blocks)?;
        inner.owned.insert(range.offset, range.size);
        Ok(MappedBlock {
            physical_address: range.offset * BLOCK_SIZE as i32,
            allocated_size: range.size * BLOCK_SIZE as i32,
            offset: 0,
            size: size as i32,
            owns_allocation: true,
        })
    }

    /// Write `data` into a previously allocated block at its own offset 0.
    pub fn write(&self, block: &MappedBlock, data: &[u8]) {
        let mut inner = self.inner.lock().expect("allocator mutex poisoned");
        let phys = block.physical_address as usize;
        inner.region.write(phys, data);
    }

    pub fn read(&self, block: &MappedBlock) -> Vec<u8> {
        let inner = self.inner.lock().expect("allocator mutex poisoned");
        let phys = (block.physical_address + block.offset) as usize;
        inner.region.read(phys, block.size as usize).to_vec()
    }

    /// Serialize a block's address for the wire (`ServerSerialize`).
    pub fn serialize(&self, block: &MappedBlock) -> [u8; crate::address::WIRE_SIZE] {
        SharedAddressInfo {
            physical_address: block.physical_address,
            allocated_size: block.allocated_size,
            offset: block.offset,
            size: block.size,
        }
        .encode()
    }

    /// Map a serialized descriptor (`ClientMapping`). If `data` does not
    /// decode as a valid descriptor, falls back to a private allocation of
    /// `data.len()` bytes — per spec.md §4.11, a checksum mismatch is not an
    /// error at this layer.
    pub fn map(&self, data: &[u8]) -> Result<MappedBlock, AllocatorError> {
        match SharedAddressInfo::decode(data) {
            Some(info) => Ok(MappedBlock {
                physical_address: info.physical_address,
                allocated_size: info.allocated_size,
                offset: info.offset,
                size: info.size,
                owns_allocation: false,
            }),
            None => {
                let mut block = self.allocate(data.len().max(1))?;
                block.size = data.len() as i32;
                Ok(block)
            }
        }
    }

    /// Release a block obtained from `allocate` or `map`.
    pub fn free(&self, block: &MappedBlock) -> Result<(), AllocatorError> {
        if !block.owns_allocation {
            return Ok(());
        }
        let mut inner = self.inner.lock().expect("allocator mutex poisoned");
        let block_offset = block.physical_address / BLOCK_SIZE as i32;
        inner.owned.remove(&block_offset);
        inner.method.free(block_offset)
    }

    pub fn region_total_size(&self) -> usize {
        self.inner.lock().expect("allocator mutex poisoned").region.total_size()
    }
}

/// Process-wide registry of allocator names, scoped to one server instance —
/// per spec.md §9, modeled as an owned registry rather than a global static.
/// Duplicate names within the registry are an `InvalidArgument`.
#[derive(Default)]
pub struct AllocatorRegistry {
    base_dir: PathBuf,
    allocators: HashMap<String, std::sync::Arc<SharedMemoryAllocator>>,
}

impl AllocatorRegistry {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            allocators: HashMap::new(),
        }
    }

    pub fn create(
        &mut self,
        name: &str,
        total_size: usize,
    ) -> Result<std::sync::Arc<SharedMemoryAllocator>, AllocatorError> {
        if self.allocators.contains_key(name) {
            return Err(AllocatorError::InvalidArgument("duplicate allocator name"));
        }
        let allocator = std::sync::Arc::new(SharedMemoryAllocator::open(
            &self.base_dir,
            name,
            total_size,
        )?);
        self.allocators.insert(name.to_owned(), allocator.clone());
        Ok(allocator)
    }

    pub fn get(&self, name: &str) -> Option<std::sync::Arc<SharedMemoryAllocator>> {
        self.allocators.get(name).cloned()
    }

    pub fn get_or_create(
        &mut self,
        name: &str,
        total_size: usize,
    ) -> Result<std::sync::Arc<SharedMemoryAllocator>, AllocatorError> {
        if let Some(existing) = self.allocators.get(name) {
            return Ok(existing.clone());
        }
        let allocator =
            std::sync::Arc::new(SharedMemoryAllocator::open(&self.base_dir, name, total_size)?);
        self.allocators.insert(name.to_owned(), allocator.clone());
        Ok(allocator)
    }

    pub fn drain(&mut self) {
        self.allocators.clear();
    }
}

pub fn recommended_region_size(requested: usize) -> usize {
    round_up_to_block(requested, BLOCK_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_write_serialize_map_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let server = SharedMemoryAllocator::open(dir.path(), "unit", 8192).unwrap();
        let block = server.allocate(64).unwrap();
        server.write(&block, &[0xDEu8; 64]);
        let wire = server.serialize(&block);

        let client = SharedMemoryAllocator::open(dir.path(), "unit", 8192).unwrap();
        let mapped = client.map(&wire).unwrap();
        assert_eq!(client.read(&mapped), vec![0xDEu8; 64]);
    }

    #[test]
    fn invalid_descriptor_falls_back_to_private_allocation() {
        let dir = tempfile::tempdir().unwrap();
        let client = SharedMemoryAllocator::open(dir.path(), "fallback", 8192).unwrap();
        let garbage = vec![1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20];
        let mapped = client.map(&garbage).unwrap();
        assert_eq!(mapped.size as usize, garbage.len());
        assert!(client.free(&mapped).is_ok());
    }

    #[test]
    fn registry_rejects_duplicate_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = AllocatorRegistry::new(dir.path());
        registry.create("dup", 4096).unwrap();
        assert!(matches!(
            registry.create("dup", 4096),
            Err(AllocatorError::InvalidArgument(_))
        ));
    }
}
