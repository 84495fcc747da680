//! Aggregate store: a per-thread version-chain list of partial aggregates,
//! linearizable at a read version (spec.md §3/§4.4), grounded directly on
//! the original `aggregate/aggregate.h`. Each thread only ever appends to
//! its own list (no cross-thread contention on the hot update path); a
//! read folds every thread's most-recent node with version `<= V` using the
//! aggregator's parallel-combine.

use std::sync::atomic::{AtomicPtr, Ordering};

use crate::error::{ConfluoError, Result};
use crate::types::{DataType, Numeric};

/// The four built-in aggregators (spec.md §3). Id 0 is reserved as "invalid"
/// in the aggregator registry, matching the convention used for index ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Aggregator {
    Sum,
    Min,
    Max,
    Count,
}

impl Aggregator {
    pub fn parse(name: &str) -> Result<Aggregator> {
        match name.to_ascii_uppercase().as_str() {
            "SUM" => Ok(Aggregator::Sum),
            "MIN" => Ok(Aggregator::Min),
            "MAX" => Ok(Aggregator::Max),
            "COUNT" => Ok(Aggregator::Count),
            other => Err(ConfluoError::ParseError(format!("unknown aggregator {other}"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Aggregator::Sum => "SUM",
            Aggregator::Min => "MIN",
            Aggregator::Max => "MAX",
            Aggregator::Count => "COUNT",
        }
    }

    /// The identity element this aggregator folds from, for a field of `field_type`.
    pub fn identity(&self, field_type: DataType) -> Numeric {
        match self {
            Aggregator::Sum => Numeric::zero(field_type),
            Aggregator::Min => Numeric::max(field_type),
            Aggregator::Max => Numeric::min(field_type),
            Aggregator::Count => Numeric::zero(DataType::ULong),
        }
    }

    /// Folds a new per-record value into a running aggregate (sequential-combine).
    pub fn combine_seq(&self, running: &Numeric, new_value: &Numeric) -> Result<Numeric> {
        self.combine_parallel(running, new_value)
    }

    /// Merges two partial aggregates (parallel-combine). For these four
    /// built-ins, sequential and parallel combine coincide: sum/count are
    /// associative addition, min/max are associative selection.
    pub fn combine_parallel(&self, a: &Numeric, b: &Numeric) -> Result<Numeric> {
        match self {
            Aggregator::Sum | Aggregator::Count => a.add(b),
            Aggregator::Min => a.min_of(b),
            Aggregator::Max => a.max_of(b),
        }
    }

    /// The per-record contribution for this aggregator applied to `field_value`.
    pub fn contribution(&self, field_value: &Numeric) -> Numeric {
        match self {
            Aggregator::Count => Numeric::count_one(),
            _ => *field_value,
        }
    }

    pub fn result_type(&self, field_type: DataType) -> DataType {
        match self {
            Aggregator::Count => DataType::ULong,
            _ => field_type,
        }
    }
}

struct Node {
    value: Numeric,
    version: u64,
    next: AtomicPtr<Node>,
}

/// One thread's version chain: head is the most recently published node.
/// Older nodes remain reachable (no GC is required for correctness, spec.md §3).
pub struct AggregateList {
    head: AtomicPtr<Node>,
}

impl AggregateList {
    fn new() -> AggregateList {
        AggregateList { head: AtomicPtr::new(std::ptr::null_mut()) }
    }

    fn current(&self, identity: Numeric) -> (Numeric, u64) {
        let head = self.head.load(Ordering::Acquire);
        if head.is_null() {
            (identity, 0)
        } else {
            let node = unsafe { &*head };
            (node.value, node.version)
        }
    }

    fn prepend(&self, value: Numeric, version: u64) {
        let old_head = self.head.load(Ordering::Acquire);
        let node = Box::into_raw(Box::new(Node { value, version, next: AtomicPtr::new(old_head) }));
        // Single-writer-per-list: no CAS race is possible here because only
        // the owning thread ever appends to its own list.
        self.head.store(node, Ordering::Release);
    }

    /// Greatest-version-`<=` node's value, or `identity` if none exists.
    fn get(&self, version: u64, identity: Numeric) -> Numeric {
        let mut cur = self.head.load(Ordering::Acquire);
        while !cur.is_null() {
            let node = unsafe { &*cur };
            if node.version <= version {
                return node.value;
            }
            cur = node.next.load(Ordering::Acquire);
        }
        identity
    }
}

impl Drop for AggregateList {
    fn drop(&mut self) {
        let mut cur = *self.head.get_mut();
        while !cur.is_null() {
            let node = unsafe { Box::from_raw(cur) };
            cur = node.next.load(Ordering::Relaxed);
        }
    }
}

/// Owns one `AggregateList` per registered-thread slot.
pub struct Aggregate {
    aggregator: Aggregator,
    field_type: DataType,
    lists: Vec<AggregateList>,
}

impl Aggregate {
    pub fn new(aggregator: Aggregator, field_type: DataType, max_concurrency: usize) -> Aggregate {
        Aggregate {
            aggregator,
            field_type,
            lists: (0..max_concurrency).map(|_| AggregateList::new()).collect(),
        }
    }

    pub fn aggregator(&self) -> Aggregator {
        self.aggregator
    }

    fn identity(&self) -> Numeric {
        self.aggregator.identity(self.field_type)
    }

    fn list(&self, tid: usize) -> Result<&AggregateList> {
        self.lists
            .get(tid)
            .ok_or_else(|| ConfluoError::IllegalState(format!("thread id {tid} beyond max_concurrency")))
    }

    /// Single-record update path: folds `value` into thread `tid`'s running total.
    pub fn seq_update(&self, tid: usize, value: &Numeric, version: u64) -> Result<()> {
        let list = self.list(tid)?;
        let (cur, _) = list.current(self.identity());
        let next = self.aggregator.combine_seq(&cur, value)?;
        list.prepend(next, version);
        Ok(())
    }

    /// Batch-block update path: merges an already parallel-combined partial
    /// `value` into thread `tid`'s running total (§4.5's `update_batch`).
    pub fn comb_update(&self, tid: usize, value: &Numeric, version: u64) -> Result<()> {
        let list = self.list(tid)?;
        let (cur, _) = list.current(self.identity());
        let next = self.aggregator.combine_parallel(&cur, value)?;
        list.prepend(next, version);
        Ok(())
    }

    /// Linearizable read: fold every thread's most-recent node with
    /// `version <= V` (I3).
    pub fn get(&self, version: u64) -> Numeric {
        let identity = self.identity();
        let mut acc = identity;
        for list in &self.lists {
            let v = list.get(version, identity);
            acc = self.aggregator.combine_parallel(&acc, &v).unwrap_or(acc);
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_update_accumulates_sum() {
        let agg = Aggregate::new(Aggregator::Sum, DataType::Long, 4);
        agg.seq_update(0, &Numeric::from_long(10), 1).unwrap();
        agg.seq_update(0, &Numeric::from_long(22), 2).unwrap();
        assert_eq!(agg.get(2).format(), "32");
    }

    #[test]
    fn cross_thread_fold_at_version() {
        let agg = Aggregate::new(Aggregator::Sum, DataType::Long, 4);
        agg.seq_update(0, &Numeric::from_long(5), 1).unwrap();
        agg.seq_update(1, &Numeric::from_long(7), 1).unwrap();
        agg.seq_update(0, &Numeric::from_long(100), 5).unwrap();
        // At version 1, thread 0's later update (version 5) must not be visible.
        assert_eq!(agg.get(1).format(), "12");
        assert_eq!(agg.get(5).format(), "112");
    }

    #[test]
    fn count_uses_ulong_regardless_of_field_type() {
        let agg = Aggregate::new(Aggregator::Count, DataType::Bool, 2);
        for _ in 0..8 {
            agg.seq_update(0, &Aggregator::Count.contribution(&Numeric::from_bool(1)), 1).unwrap();
        }
        assert_eq!(agg.get(1).data_type(), DataType::ULong);
        assert_eq!(agg.get(1).format(), "8");
    }

    #[test]
    fn max_aggregator_tracks_peak() {
        let agg = Aggregate::new(Aggregator::Max, DataType::Int, 2);
        for v in [3, 9, 1, 7] {
            agg.seq_update(0, &Numeric::from_int(v), 1).unwrap();
        }
        assert_eq!(agg.get(1).format(), "9");
    }
}
