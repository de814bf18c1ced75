use std::sync::atomic::{AtomicU64, Ordering};

/// Allocates opaque 64-bit resource/adapter identifiers from a monotonic
/// counter (spec §9: "Resource-id as raw handle" — the source uses a raw
/// pointer, a portable implementation allocates an opaque counter instead).
/// `0` is reserved for "no resource / global" and is never handed out.
pub struct IdAllocator {
    next: AtomicU64,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next: AtomicU64::new(1) }
    }

    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_hands_out_the_reserved_zero_id() {
        let alloc = IdAllocator::new();
        assert_ne!(alloc.next(), 0);
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let alloc = IdAllocator::new();
        let a = alloc.next();
        let b = alloc.next();
        assert!(b > a);
    }
}
