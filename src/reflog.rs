//! Reflog: a monolog of 64-bit record offsets, the "posting list" primitive
//! used by every radix index leaf and every filter bucket (spec.md §3/§GLOSSARY).
//! Uses the exponential-then-linear schedule so small, commonly-created
//! leaves stay dense in memory.

use crate::error::Result;
use crate::monolog::{Monolog, Schedule};
use crate::radix_index::ApproxSized;

/// Default schedule for a reflog: starts at 4 offsets, doubles up to 256,
/// then stays fixed.
fn default_schedule() -> Schedule {
    Schedule::Exponential { initial: 4, threshold: 256 }
}

pub struct Reflog {
    offsets: Monolog<u64>,
}

impl Reflog {
    pub fn new(max_blocks: usize) -> Reflog {
        Reflog { offsets: Monolog::new(default_schedule(), max_blocks) }
    }

    pub fn push_back(&self, offset: u64) -> Result<u64> {
        self.offsets.push_back(offset)
    }

    pub fn size(&self) -> u64 {
        self.offsets.size()
    }

    pub fn get(&self, i: u64) -> Result<u64> {
        self.offsets.get(i)
    }

    /// All offsets currently visible (callers filter by read-tail themselves).
    pub fn iter_all(&self) -> Vec<u64> {
        let n = self.size();
        (0..n).filter_map(|i| self.offsets.get(i).ok()).collect()
    }
}

impl ApproxSized for Reflog {
    fn approx_len(&self) -> u64 {
        self.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_and_reads_in_order() {
        let r = Reflog::new(8);
        for off in [10u64, 20, 30] {
            r.push_back(off).unwrap();
        }
        assert_eq!(r.iter_all(), vec![10, 20, 30]);
    }
}
