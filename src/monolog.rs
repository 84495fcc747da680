//! Monolog: an append-only log of `T`, addressed by element index rather
//! than byte offset (the data log, `data_log.rs`, is the byte-offset
//! specialization of the same idea). Blocks are allocated lazily and never
//! freed, the way `rpglot-core`'s `storage/chunk.rs` lazily grows its chunk
//! index rather than pre-allocating; `push_back`/`reserve` are a single
//! fetch-add against an atomic tail (`read_tail.h`'s advance-by-CAS shape),
//! and `size()` is an acquire load of that same tail.
//!
//! Two block-size schedules are supported (spec.md §3):
//!   - `Linear`: every block is the same fixed size; used for the data log
//!     and aggregate logs.
//!   - `Exponential`: block sizes double from an initial size up to a
//!     threshold, then stay fixed; used where small logs must stay dense
//!     (e.g. a filter's per-time-block aggregated reflog).

use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};
use std::cell::UnsafeCell;

use crate::error::{ConfluoError, Result};

/// Block-size schedule for a [`Monolog`].
#[derive(Debug, Clone, Copy)]
pub enum Schedule {
    Linear { block_size: usize },
    Exponential { initial: usize, threshold: usize },
}

impl Schedule {
    fn block_size(&self, block_id: usize) -> usize {
        match self {
            Schedule::Linear { block_size } => *block_size,
            Schedule::Exponential { initial, threshold } => {
                let exp = initial.checked_shl(block_id.min(62) as u32).unwrap_or(usize::MAX);
                exp.clamp(*initial, *threshold)
            }
        }
    }

    /// Returns (block_id, offset_within_block) for global index `i`.
    fn locate(&self, i: usize) -> (usize, usize) {
        if let Schedule::Linear { block_size } = self {
            return (i / block_size, i % block_size);
        }
        let mut block_id = 0usize;
        let mut consumed = 0usize;
        loop {
            let bs = self.block_size(block_id);
            if i < consumed + bs {
                return (block_id, i - consumed);
            }
            consumed += bs;
            block_id += 1;
        }
    }
}

struct Block<T> {
    storage: Box<[UnsafeCell<T>]>,
}

unsafe impl<T: Send> Send for Block<T> {}
unsafe impl<T: Send> Sync for Block<T> {}

/// An append-only log of `T`, element-indexed, with lazily-allocated blocks
/// that are never freed (matching the lifecycle rules in spec.md §3).
pub struct Monolog<T> {
    blocks: Vec<AtomicPtr<Block<T>>>,
    schedule: Schedule,
    tail: AtomicU64,
    max_elements: usize,
}

unsafe impl<T: Send> Send for Monolog<T> {}
unsafe impl<T: Send> Sync for Monolog<T> {}

impl<T: Copy + Default> Monolog<T> {
    pub fn new(schedule: Schedule, max_blocks: usize) -> Monolog<T> {
        let mut blocks = Vec::with_capacity(max_blocks);
        blocks.resize_with(max_blocks, || AtomicPtr::new(std::ptr::null_mut()));
        let max_elements = (0..max_blocks).map(|b| schedule.block_size(b)).sum();
        Monolog { blocks, schedule, tail: AtomicU64::new(0), max_elements }
    }

    /// Highest published index (acquire load of the tail).
    pub fn size(&self) -> u64 {
        self.tail.load(Ordering::Acquire)
    }

    /// Claims `n` contiguous indices, returning the first. Fails with
    /// `Overflow` if the claim would exceed the configured block count.
    pub fn reserve(&self, n: u64) -> Result<u64> {
        if n == 0 {
            return Ok(self.tail.load(Ordering::Acquire));
        }
        let start = self.tail.fetch_add(n, Ordering::SeqCst);
        if (start + n) as usize > self.max_elements {
            return Err(ConfluoError::Overflow(format!(
                "monolog exhausted: requested up to index {}, capacity {}",
                start + n - 1,
                self.max_elements
            )));
        }
        Ok(start)
    }

    /// Claims one index and writes `value` into it, returning the index.
    pub fn push_back(&self, value: T) -> Result<u64> {
        let idx = self.reserve(1)?;
        self.set(idx, value)?;
        Ok(idx)
    }

    fn ensure_block(&self, block_id: usize) -> Result<&Block<T>> {
        let slot = self
            .blocks
            .get(block_id)
            .ok_or_else(|| ConfluoError::Overflow(format!("block {block_id} beyond max_blocks")))?;
        let existing = slot.load(Ordering::Acquire);
        if !existing.is_null() {
            return Ok(unsafe { &*existing });
        }
        let size = self.schedule.block_size(block_id);
        let storage: Box<[UnsafeCell<T>]> = (0..size).map(|_| UnsafeCell::new(T::default())).collect();
        let candidate = Box::into_raw(Box::new(Block { storage }));
        match slot.compare_exchange(std::ptr::null_mut(), candidate, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => Ok(unsafe { &*candidate }),
            Err(winner) => {
                // Lost the race: free our draft, use the winner's block.
                unsafe { drop(Box::from_raw(candidate)) };
                Ok(unsafe { &*winner })
            }
        }
    }

    /// Writes `value` at index `i`, lazily allocating that index's block.
    pub fn set(&self, i: u64, value: T) -> Result<()> {
        let (block_id, offset) = self.schedule.locate(i as usize);
        let block = self.ensure_block(block_id)?;
        unsafe {
            *block.storage[offset].get() = value;
        }
        Ok(())
    }

    /// Reads the value at index `i`. Callers are responsible for only
    /// reading indices known to be published (i.e. `< size()`), mirroring
    /// the read-tail visibility contract.
    pub fn get(&self, i: u64) -> Result<T> {
        let (block_id, offset) = self.schedule.locate(i as usize);
        let slot = self
            .blocks
            .get(block_id)
            .ok_or_else(|| ConfluoError::IllegalState(format!("index {i} has no block")))?;
        let ptr = slot.load(Ordering::Acquire);
        if ptr.is_null() {
            return Err(ConfluoError::IllegalState(format!("index {i} was never written")));
        }
        Ok(unsafe { *(*ptr).storage[offset].get() })
    }

    /// Writes a contiguous run of values starting at `offset`.
    pub fn write(&self, offset: u64, values: &[T]) -> Result<()> {
        for (i, v) in values.iter().enumerate() {
            self.set(offset + i as u64, *v)?;
        }
        Ok(())
    }

    /// In-memory logs have nothing to flush; durable modes call this to
    /// signal "these bytes are now safe to read after a crash" (see
    /// `multilog.rs`'s storage-mode handling).
    pub fn flush(&self, _offset: u64, _n: u64) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_back_and_get_round_trip() {
        let log: Monolog<u64> = Monolog::new(Schedule::Linear { block_size: 4 }, 8);
        for i in 0..10u64 {
            let idx = log.push_back(i * 10).unwrap();
            assert_eq!(idx, i);
        }
        for i in 0..10u64 {
            assert_eq!(log.get(i).unwrap(), i * 10);
        }
        assert_eq!(log.size(), 10);
    }

    #[test]
    fn reserve_past_capacity_overflows() {
        let log: Monolog<u8> = Monolog::new(Schedule::Linear { block_size: 2 }, 2);
        assert!(log.reserve(3).is_err());
        assert!(log.reserve(4).is_ok());
        assert!(log.reserve(1).is_err());
    }

    #[test]
    fn exponential_schedule_crosses_blocks() {
        let log: Monolog<u32> =
            Monolog::new(Schedule::Exponential { initial: 2, threshold: 8 }, 16);
        for i in 0..40u32 {
            log.push_back(i).unwrap();
        }
        for i in 0..40u32 {
            assert_eq!(log.get(i as u64).unwrap(), i);
        }
    }

    #[test]
    fn write_fills_a_run() {
        let log: Monolog<u8> = Monolog::new(Schedule::Linear { block_size: 16 }, 4);
        let off = log.reserve(5).unwrap();
        log.write(off, &[1, 2, 3, 4, 5]).unwrap();
        for i in 0..5u64 {
            assert_eq!(log.get(off + i).unwrap(), (i + 1) as u8);
        }
    }
}
