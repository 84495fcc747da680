//! Alert + alert index: a radix index keyed by millisecond time bucket, each
//! leaf a small deduplicated list (spec.md §3/§4.9, P6). Grounded on
//! `original_source/.../alert.h`/`alert_index.h`; reuses `radix_index.rs`
//! rather than hand-rolling a second trie — the index id space here is
//! disjoint from the per-column index arena in `multilog.rs`.

use std::sync::Mutex;

use crate::error::Result;
use crate::radix_index::{ApproxSized, RadixIndex};
use crate::types::Numeric;

#[derive(Debug, Clone)]
pub struct Alert {
    pub time_block: u64,
    pub trigger_name: String,
    pub trigger_expr: String,
    pub value: Numeric,
    pub version: u64,
}

struct Bucket {
    alerts: Mutex<Vec<Alert>>,
}

impl Bucket {
    fn new() -> Bucket {
        Bucket { alerts: Mutex::new(Vec::new()) }
    }
}

impl ApproxSized for Bucket {
    fn approx_len(&self) -> u64 {
        self.alerts.lock().unwrap().len() as u64
    }
}

/// Single writer (the monitor task), many readers (spec.md §5).
pub struct AlertIndex {
    index: RadixIndex<Bucket>,
}

impl AlertIndex {
    pub fn new(depth: usize, width: usize) -> AlertIndex {
        AlertIndex { index: RadixIndex::new(depth, width) }
    }

    /// Inserts an alert, deduping on (time_block, trigger_name, value) — P6.
    pub fn add(&self, time_block: u64, trigger_name: &str, trigger_expr: &str, value: Numeric, version: u64) -> Result<()> {
        let leaf = self.index.get_or_create_leaf(&time_block.to_be_bytes(), Bucket::new)?;
        let mut alerts = leaf.alerts.lock().unwrap();
        if alerts.iter().any(|a| a.trigger_name == trigger_name && a.value == value) {
            return Ok(());
        }
        alerts.push(Alert {
            time_block,
            trigger_name: trigger_name.to_string(),
            trigger_expr: trigger_expr.to_string(),
            value,
            version,
        });
        Ok(())
    }

    pub fn range(&self, lo_block: u64, hi_block: u64) -> Result<Vec<Alert>> {
        let lo = lo_block.to_be_bytes();
        let hi = hi_block.to_be_bytes();
        let mut out = Vec::new();
        for (_, bucket) in self.index.range(&lo, &hi)? {
            out.extend(bucket.alerts.lock().unwrap().iter().cloned());
        }
        out.sort_by(|a, b| {
            (a.time_block, &a.trigger_name, a.value.as_f64_value())
                .partial_cmp(&(b.time_block, &b.trigger_name, b.value.as_f64_value()))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_alerts_are_deduped() {
        let idx = AlertIndex::new(8, 256);
        idx.add(5, "t1", "agg1>=10", Numeric::from_long(32), 1).unwrap();
        idx.add(5, "t1", "agg1>=10", Numeric::from_long(32), 2).unwrap();
        let alerts = idx.range(0, 10).unwrap();
        assert_eq!(alerts.len(), 1);
    }

    #[test]
    fn distinct_values_both_recorded() {
        let idx = AlertIndex::new(8, 256);
        idx.add(5, "t1", "agg1>=10", Numeric::from_long(32), 1).unwrap();
        idx.add(5, "t1", "agg1>=10", Numeric::from_long(40), 2).unwrap();
        let alerts = idx.range(0, 10).unwrap();
        assert_eq!(alerts.len(), 2);
    }

    #[test]
    fn range_is_ordered_by_time_block() {
        let idx = AlertIndex::new(8, 256);
        idx.add(9, "t1", "e", Numeric::from_long(1), 1).unwrap();
        idx.add(2, "t1", "e", Numeric::from_long(1), 1).unwrap();
        let alerts = idx.range(0, 100).unwrap();
        assert_eq!(alerts[0].time_block, 2);
        assert_eq!(alerts[1].time_block, 9);
    }
}
