//! A named shared-memory region backed by a file under a shared directory.
//!
//! The first process to open a name creates the backing file (size rounded
//! up to a block-size multiple); later opens attach without resizing. On
//! POSIX the region is unlinked only by the last holder, using an
//! `fcntl`-based write-lock upgrade on the file's first byte — ported from
//! the "last holder unlinks" discipline in `shared_memory_object_linux.h`.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};

use crate::AllocatorError;

/// Rounds `size` up to a multiple of `block_size` (minimum 4096, matching
/// `kMinBlockSize` in the original allocator).
pub fn round_up_to_block(size: usize, block_size: usize) -> usize {
    let block_size = block_size.max(4096);
    size.div_ceil(block_size) * block_size
}

pub struct SharedRegion {
    name: String,
    path: PathBuf,
    file: File,
    mmap: MmapMut,
    total_size: usize,
    is_creator: bool,
}

impl SharedRegion {
    /// Open (creating if absent) the named region under `base_dir`.
    pub fn open(base_dir: &Path, name: &str, requested_size: usize) -> Result<Self, AllocatorError> {
        std::fs::create_dir_all(base_dir)
            .map_err(|e| AllocatorError::Io(format!("creating {}: {e}", base_dir.display())))?;
        let path = base_dir.join(format!("senscord.{name}"));
        let size = round_up_to_block(requested_size.max(1), 4096);

        let is_creator = !path.exists();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| AllocatorError::Io(format!("opening {}: {e}", path.display())))?;

        let existing_len = file
            .metadata()
            .map_err(|e| AllocatorError::Io(e.to_string()))?
            .len() as usize;

        let total_size = if is_creator {
            file.set_len(size as u64)
                .map_err(|e| AllocatorError::Io(e.to_string()))?;
            size
        } else {
            if existing_len != size {
                tracing::warn!(
                    name,
                    requested = size,
                    existing = existing_len,
                    "shared region advertised size differs from existing"
                );
            }
            existing_len.max(size)
        };

        let mmap = unsafe {
            MmapOptions::new()
                .len(total_size)
                .map_mut(&file)
                .map_err(|e| AllocatorError::Io(e.to_string()))?
        };

        Ok(Self {
            name: name.to_owned(),
            path,
            file,
            mmap,
            total_size,
            is_creator,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    pub fn read(&self, offset: usize, len: usize) -> &[u8] {
        &self.mmap[offset..offset + len]
    }

    pub fn write(&mut self, offset: usize, data: &[u8]) {
        self.mmap[offset..offset + data.len()].copy_from_slice(data);
    }

    /// True if this handle was the one that created the backing file.
    pub fn is_creator(&self) -> bool {
        self.is_creator
    }
}

#[cfg(unix)]
impl Drop for SharedRegion {
    fn drop(&mut self) {
        use std::os::unix::io::AsRawFd;

        let fd = self.file.as_raw_fd();
        // Try to take an exclusive write lock on byte 0; success means we are
        // the last holder and may unlink the backing file.
        let lock = libc::flock {
            l_type: libc::F_WRLCK as i16,
            l_whence: libc::SEEK_SET as i16,
            l_start: 0,
            l_len: 1,
            l_pid: 0,
        };
        let can_unlink = unsafe { libc::fcntl(fd, libc::F_SETLK, &lock) } == 0;
        if can_unlink {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(not(unix))]
impl Drop for SharedRegion {
    fn drop(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_up_respects_minimum_block_size() {
        assert_eq!(round_up_to_block(1, 0), 4096);
        assert_eq!(round_up_to_block(4096, 4096), 4096);
        assert_eq!(round_up_to_block(4097, 4096), 8192);
    }

    #[test]
    fn second_open_attaches_without_resizing() {
        let dir = tempfile::tempdir().unwrap();
        let first = SharedRegion::open(dir.path(), "unit", 8192).unwrap();
        assert!(first.is_creator());
        assert_eq!(first.total_size(), 8192);
        drop(first);

        // Recreate the backing file manually to simulate a second process
        // attaching to an already-created region without unlinking.
        let path = dir.path().join("senscord.unit");
        std::fs::write(&path, vec![0u8; 8192]).unwrap();
        let second = SharedRegion::open(dir.path(), "unit", 8192).unwrap();
        assert!(!second.is_creator());
        assert_eq!(second.total_size(), 8192);
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut region = SharedRegion::open(dir.path(), "rw", 4096).unwrap();
        region.write(0, &[1, 2, 3, 4]);
        assert_eq!(region.read(0, 4), &[1, 2, 3, 4]);
    }
}
