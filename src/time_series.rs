//! Time-series view: a thin wrapper owning a [`Multilog`] plus the two
//! convenience reads spec.md's design notes call out (`get_range`,
//! `get_nearest`). Composition, not inheritance (spec.md §9): "atomic
//! multilog is the only subclass in the source ... spec it as
//! composition." There is no dedicated index here — it walks the data log
//! directly via the implicit `TIMESTAMP` column, assuming records are
//! appended in non-decreasing timestamp order (true of streaming telemetry
//! ingest), which lets range/nearest lookups binary-search the tail instead
//! of scanning it.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::multilog::Multilog;
use crate::types::DataType;

/// A multilog specialized for timestamp-ordered access.
pub struct TimeSeries {
    log: Multilog,
}

impl TimeSeries {
    pub fn new(name: impl Into<String>, fields: Vec<(String, DataType)>, config: EngineConfig) -> TimeSeries {
        TimeSeries { log: Multilog::new(name, fields, config) }
    }

    /// Wraps an existing multilog (e.g. one rebuilt from a metadata checkpoint).
    pub fn wrap(log: Multilog) -> TimeSeries {
        TimeSeries { log }
    }

    pub fn multilog(&self) -> &Multilog {
        &self.log
    }

    fn record_count(&self) -> u64 {
        self.log.tail() / self.log.record_size() as u64
    }

    fn timestamp_of(bytes: &[u8]) -> u64 {
        u64::from_ne_bytes(bytes[0..8].try_into().unwrap())
    }

    fn read_index(&self, idx: u64) -> Result<Vec<u8>> {
        self.log.read(idx * self.log.record_size() as u64)
    }

    /// First record index whose timestamp is `>= target_ns`, or `record_count()`
    /// if none. O(log n) under the non-decreasing-timestamp assumption above.
    fn lower_bound(&self, target_ns: u64) -> Result<u64> {
        let (mut lo, mut hi) = (0u64, self.record_count());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let rec = self.read_index(mid)?;
            if Self::timestamp_of(&rec) < target_ns {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    /// All committed records with `t1_ns <= timestamp <= t2_ns`, in order.
    pub fn get_range(&self, t1_ns: u64, t2_ns: u64) -> Result<Vec<Vec<u8>>> {
        let n = self.record_count();
        let mut out = Vec::new();
        let mut idx = self.lower_bound(t1_ns)?;
        while idx < n {
            let rec = self.read_index(idx)?;
            if Self::timestamp_of(&rec) > t2_ns {
                break;
            }
            out.push(rec);
            idx += 1;
        }
        Ok(out)
    }

    /// The single committed record whose timestamp is closest to `target_ns`
    /// (ties broken toward the earlier record), or `None` if the log is empty.
    pub fn get_nearest(&self, target_ns: u64) -> Result<Option<Vec<u8>>> {
        let n = self.record_count();
        if n == 0 {
            return Ok(None);
        }
        let idx = self.lower_bound(target_ns)?;
        let at_or_after = if idx < n { Some(self.read_index(idx)?) } else { None };
        let before = if idx > 0 { Some(self.read_index(idx - 1)?) } else { None };

        Ok(match (before, at_or_after) {
            (None, after) => after,
            (before, None) => before,
            (Some(before), Some(after)) => {
                let d_before = target_ns.abs_diff(Self::timestamp_of(&before));
                let d_after = Self::timestamp_of(&after).abs_diff(target_ns);
                if d_before <= d_after { Some(before) } else { Some(after) }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ts: u64) -> Vec<u8> {
        ts.to_ne_bytes().to_vec()
    }

    #[test]
    fn get_range_returns_records_within_bounds() {
        let ts = TimeSeries::new("ts", vec![], EngineConfig::default());
        for t in [0u64, 10, 20, 30, 40] {
            ts.multilog().append(&record(t)).unwrap();
        }
        let got = ts.get_range(15, 35).unwrap();
        let stamps: Vec<u64> = got.iter().map(|r| TimeSeries::timestamp_of(r)).collect();
        assert_eq!(stamps, vec![20, 30]);
    }

    #[test]
    fn get_nearest_picks_closer_neighbor() {
        let ts = TimeSeries::new("ts", vec![], EngineConfig::default());
        for t in [0u64, 10, 20] {
            ts.multilog().append(&record(t)).unwrap();
        }
        let nearest = ts.get_nearest(14).unwrap().unwrap();
        assert_eq!(TimeSeries::timestamp_of(&nearest), 10);
        let nearest = ts.get_nearest(16).unwrap().unwrap();
        assert_eq!(TimeSeries::timestamp_of(&nearest), 20);
    }

    #[test]
    fn get_nearest_on_empty_log_is_none() {
        let ts = TimeSeries::new("ts", vec![], EngineConfig::default());
        assert!(ts.get_nearest(0).unwrap().is_none());
    }
}
