//! Data log: the byte-offset specialization of [`Monolog`], and the home of
//! the read tail (spec.md §3). Record offsets returned by `reserve`/`append`
//! are stable forever; `ptr`/`read` only expose bytes below the tail.

use crate::error::{ConfluoError, Result};
use crate::monolog::{Monolog, Schedule};

/// Append-only byte store. Conceptually an unbounded array of bytes,
/// physically a fixed number of large blocks lazily allocated on first
/// write (default 64 MiB, see `EngineConfig::linear_block_size`).
pub struct DataLog {
    bytes: Monolog<u8>,
}

impl DataLog {
    pub fn new(block_size: usize, max_blocks: usize) -> DataLog {
        DataLog { bytes: Monolog::new(Schedule::Linear { block_size }, max_blocks) }
    }

    /// Highest published byte offset (the read tail, loaded with acquire
    /// ordering). Offsets `< size()` are visible to readers.
    pub fn size(&self) -> u64 {
        self.bytes.size()
    }

    /// Claims `n` contiguous bytes, returning the first offset.
    pub fn reserve(&self, n: u64) -> Result<u64> {
        self.bytes.reserve(n)
    }

    pub fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.bytes.write(offset, data)
    }

    /// Reads `len` bytes starting at `offset`. Callers must have already
    /// checked `offset + len <= tail` (the atomic multilog's `read` does
    /// this before calling through).
    pub fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len);
        for i in 0..len as u64 {
            out.push(self.bytes.get(offset + i)?);
        }
        Ok(out)
    }

    pub fn flush(&self, offset: u64, n: u64) {
        self.bytes.flush(offset, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_write_read_round_trip() {
        let log = DataLog::new(64, 8);
        let off = log.reserve(4).unwrap();
        log.write(off, b"abcd").unwrap();
        assert_eq!(log.read(off, 4).unwrap(), b"abcd");
    }

    #[test]
    fn offsets_are_stable_across_many_appends() {
        let log = DataLog::new(16, 16);
        let mut offsets = vec![];
        for i in 0..40u8 {
            let off = log.reserve(1).unwrap();
            log.write(off, &[i]).unwrap();
            offsets.push(off);
        }
        for (i, off) in offsets.iter().enumerate() {
            assert_eq!(log.read(*off, 1).unwrap(), vec![i as u8]);
        }
    }

    #[test]
    fn overflow_is_reported() {
        let log = DataLog::new(4, 1);
        assert!(matches!(log.reserve(5), Err(ConfluoError::Overflow(_))));
    }
}
