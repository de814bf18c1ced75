//! First-fit block allocator over an ordered free list, in block units.
//!
//! Ported from `FirstFitAllocation` in
//! `lib/core/allocator/shared_allocation_firstfit.h`. Free and used entries
//! are kept strictly sorted by offset; `free` merges with both neighbors.

use std::collections::BTreeMap;

use crate::AllocatorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub offset: i32,
    pub size: i32,
}

pub struct FirstFitAllocation {
    total_blocks: i32,
    used: BTreeMap<i32, BlockRange>,
    free: Vec<BlockRange>,
}

impl FirstFitAllocation {
    pub fn new(total_blocks: i32) -> Result<Self, AllocatorError> {
        if total_blocks <= 0 {
            return Err(AllocatorError::InvalidArgument("total size is too small"));
        }
        Ok(Self {
            total_blocks,
            used: BTreeMap::new(),
            free: vec![BlockRange {
                offset: 0,
                size: total_blocks,
            }],
        })
    }

    pub fn total_blocks(&self) -> i32 {
        self.total_blocks
    }

    /// Allocate `size` blocks from the first free range large enough to hold
    /// them.
    pub fn allocate(&mut self, size: i32) -> Result<BlockRange, AllocatorError> {
        if size <= 0 {
            return Err(AllocatorError::InvalidArgument("size == 0"));
        }
        for (idx, range) in self.free.iter_mut().enumerate() {
            if size <= range.size {
                let allocated = BlockRange {
                    offset: range.offset,
                    size,
                };
                range.offset += size;
                range.size -= size;
                let exhausted = range.size == 0;
                if exhausted {
                    self.free.remove(idx);
                }
                self.used.insert(allocated.offset, allocated);
                return Ok(allocated);
            }
        }
        Err(AllocatorError::ResourceExhausted)
    }

    /// Return a used range to the free list, merging with adjacent neighbors.
    pub fn free(&mut self, offset: i32) -> Result<(), AllocatorError> {
        let range = self
            .used
            .remove(&offset)
            .ok_or(AllocatorError::NotFound("offset not in used list"))?;

        let prev_idx = self
            .free
            .iter()
            .enumerate()
            .filter(|(_, f)| f.offset < range.offset)
            .last()
            .map(|(i, _)| i);
        let next_idx = self.free.iter().position(|f| f.offset > range.offset);

        let merges_prev = prev_idx
            .map(|i| self.free[i].offset + self.free[i].size == range.offset)
            .unwrap_or(false);
        let merges_next = next_idx
            .map(|i| range.offset + range.size == self.free[i].offset)
            .unwrap_or(false);

        match (merges_prev, merges_next) {
            (true, true) => {
                let next_size = self.free[next_idx.unwrap()].size;
                self.free.remove(next_idx.unwrap());
                self.free[prev_idx.unwrap()].size += range.size + next_size;
            }
            (true, false) => {
                self.free[prev_idx.unwrap()].size += range.size;
            }
            (false, true) => {
                let next = &mut self.free[next_idx.unwrap()];
                next.offset = range.offset;
                next.size += range.size;
            }
            (false, false) => {
                let insert_at = next_idx.unwrap_or(self.free.len());
                self.free.insert(insert_at, range);
            }
        }
        Ok(())
    }

    #[cfg(test)]
    fn free_ranges(&self) -> &[BlockRange] {
        &self.free
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_zero_is_invalid_argument() {
        let mut a = FirstFitAllocation::new(16).unwrap();
        assert!(matches!(
            a.allocate(0),
            Err(AllocatorError::InvalidArgument(_))
        ));
    }

    #[test]
    fn allocate_more_than_total_is_exhausted() {
        let mut a = FirstFitAllocation::new(16).unwrap();
        assert!(matches!(
            a.allocate(17),
            Err(AllocatorError::ResourceExhausted)
        ));
    }

    #[test]
    fn reuses_freed_offset_for_equal_or_smaller_request() {
        let mut a = FirstFitAllocation::new(100).unwrap();
        let block_a = a.allocate(10).unwrap();
        let _block_b = a.allocate(20).unwrap();
        a.free(block_a.offset).unwrap();

        let reused = a.allocate(5).unwrap();
        assert_eq!(reused.offset, block_a.offset);
    }

    #[test]
    fn free_merges_both_neighbors() {
        let mut a = FirstFitAllocation::new(30).unwrap();
        let x = a.allocate(10).unwrap();
        let y = a.allocate(10).unwrap();
        let z = a.allocate(10).unwrap();
        a.free(x.offset).unwrap();
        a.free(z.offset).unwrap();
        a.free(y.offset).unwrap();
        let free = a.free_ranges();
        assert_eq!(free.len(), 1);
        assert_eq!(free[0], BlockRange { offset: 0, size: 30 });
    }

    #[test]
    fn free_unknown_offset_is_not_found() {
        let mut a = FirstFitAllocation::new(10).unwrap();
        assert!(matches!(a.free(5), Err(AllocatorError::NotFound(_))));
    }
}
