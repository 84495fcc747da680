//! Filter: a compiled boolean expression gating a time-bucketed radix index,
//! with an attached list of aggregate definitions (spec.md §3/§4.5),
//! grounded directly on the original `filter.h`. Filters are never deleted,
//! only invalidated (an atomic CAS on a validity flag); invalidated filters
//! are skipped on the append fast path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::aggregate::Aggregator;
use crate::aggregated_reflog::AggregatedReflog;
use crate::error::{ConfluoError, Result};
use crate::expr::CompiledExpression;
use crate::radix_index::RadixIndex;
use crate::schema::RecordView;
use crate::types::DataType;

/// One attached aggregate definition (spec.md §3).
pub struct AggregateDef {
    pub name: String,
    pub aggregator: Aggregator,
    pub field_idx: usize,
    pub field_type: DataType,
    valid: AtomicBool,
}

impl AggregateDef {
    pub fn new(name: String, aggregator: Aggregator, field_idx: usize, field_type: DataType) -> AggregateDef {
        AggregateDef { name, aggregator, field_idx, field_type, valid: AtomicBool::new(true) }
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

const REFLOG_BLOCKS: usize = 4096;

pub struct Filter {
    pub name: String,
    compiled: CompiledExpression,
    valid: AtomicBool,
    index: RadixIndex<AggregatedReflog>,
    aggregate_defs: RwLock<Vec<AggregateDef>>,
    time_resolution_ns: u64,
    max_concurrency: usize,
}

impl Filter {
    pub fn new(
        name: String,
        compiled: CompiledExpression,
        time_resolution_ns: u64,
        radix_depth: usize,
        radix_width: usize,
        max_concurrency: usize,
    ) -> Filter {
        Filter {
            name,
            compiled,
            valid: AtomicBool::new(true),
            index: RadixIndex::new(radix_depth, radix_width),
            aggregate_defs: RwLock::new(Vec::new()),
            time_resolution_ns,
            max_concurrency,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub fn invalidate(&self) -> Result<()> {
        self.valid
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| ConfluoError::ManagementError(format!("filter {} is already invalid", self.name)))
    }

    pub fn attach_aggregate(&self, def: AggregateDef) -> usize {
        let mut defs = self.aggregate_defs.write().unwrap();
        defs.push(def);
        defs.len() - 1
    }

    pub fn aggregate_index(&self, name: &str) -> Result<usize> {
        let defs = self.aggregate_defs.read().unwrap();
        defs.iter()
            .position(|d| d.name == name)
            .ok_or_else(|| ConfluoError::NotFound(format!("aggregate {name}")))
    }

    pub fn aggregate_valid(&self, aid: usize) -> bool {
        self.aggregate_defs
            .read()
            .unwrap()
            .get(aid)
            .map(|d| d.is_valid())
            .unwrap_or(false)
    }

    pub fn aggregate_name(&self, aid: usize) -> Option<String> {
        self.aggregate_defs.read().unwrap().get(aid).map(|d| d.name.clone())
    }

    pub fn aggregate_snapshot(&self) -> Vec<(Aggregator, DataType)> {
        self.aggregate_defs
            .read()
            .unwrap()
            .iter()
            .map(|d| (d.aggregator, d.field_type))
            .collect()
    }

    fn time_block(&self, timestamp_ns: u64) -> u64 {
        timestamp_ns / self.time_resolution_ns
    }

    fn get_or_create_leaf(&self, time_block: u64) -> Result<&AggregatedReflog> {
        let defs_snapshot = self.aggregate_snapshot();
        let max_concurrency = self.max_concurrency;
        self.index
            .get_or_create_leaf(&time_block.to_be_bytes(), move || {
                AggregatedReflog::new(REFLOG_BLOCKS, &defs_snapshot, max_concurrency)
            })
    }

    /// Single-record ingest path (spec.md §4.5). Evaluates the compiled
    /// expression; on a match, buckets the offset and `seq_update`s every
    /// valid attached aggregate.
    pub fn update(&self, record: &RecordView, record_offset: u64, tid: usize, version: u64) -> Result<()> {
        if !self.is_valid() || !self.compiled.test(record)? {
            return Ok(());
        }
        let time_block = self.time_block(record.timestamp()?);
        let leaf = self.get_or_create_leaf(time_block)?;
        leaf.push_offset(record_offset)?;
        let defs = self.aggregate_defs.read().unwrap();
        for (aid, def) in defs.iter().enumerate() {
            if !def.is_valid() {
                continue;
            }
            let field_value = record.field(def.field_idx)?;
            let contribution = def.aggregator.contribution(&field_value);
            leaf.seq_update_aggregate(aid, tid, &contribution, version)?;
        }
        Ok(())
    }

    /// Batch ingest path: amortizes leaf lookup across a time-block-aligned
    /// batch and performs one `comb_update` per aggregate per block, folding
    /// intra-block contributions locally first (spec.md §4.5).
    pub fn update_batch(
        &self,
        records: &[(RecordView, u64)],
        tid: usize,
        version: u64,
    ) -> Result<()> {
        if !self.is_valid() {
            return Ok(());
        }
        use std::collections::BTreeMap;
        let mut by_block: BTreeMap<u64, Vec<(&RecordView, u64)>> = BTreeMap::new();
        for (record, offset) in records {
            if !self.compiled.test(record)? {
                continue;
            }
            let block = self.time_block(record.timestamp()?);
            by_block.entry(block).or_default().push((record, *offset));
        }
        let defs = self.aggregate_defs.read().unwrap();
        for (block, entries) in by_block {
            let leaf = self.get_or_create_leaf(block)?;
            for (record, offset) in &entries {
                leaf.push_offset(*offset)?;
            }
            for (aid, def) in defs.iter().enumerate() {
                if !def.is_valid() {
                    continue;
                }
                let mut local = def.aggregator.identity(def.field_type);
                for (record, _) in &entries {
                    let field_value = record.field(def.field_idx)?;
                    let contribution = def.aggregator.contribution(&field_value);
                    local = def.aggregator.combine_parallel(&local, &contribution)?;
                }
                leaf.comb_update_aggregate(aid, tid, &local, version)?;
            }
        }
        Ok(())
    }

    pub fn lookup(&self, time_block: u64) -> Result<Option<&AggregatedReflog>> {
        self.index.get(&time_block.to_be_bytes())
    }

    pub fn lookup_range(&self, t1_block: u64, t2_block: u64) -> Result<Vec<(u64, &AggregatedReflog)>> {
        let lo = t1_block.to_be_bytes();
        let hi = t2_block.to_be_bytes();
        Ok(self
            .index
            .range(&lo, &hi)?
            .into_iter()
            .map(|(key, leaf)| (u64::from_be_bytes(key.try_into().unwrap()), leaf))
            .collect())
    }

    pub fn test_expr(&self, record: &RecordView) -> Result<bool> {
        self.compiled.test(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ast::Expr;
    use crate::expr::compiler::compile;
    use crate::expr::RelOp;
    use crate::schema::{Schema, SchemaSnapshot};
    use crate::types::Numeric;

    fn make_record_bytes(schema: &Schema, ts: u64, a: bool, d: i32) -> Vec<u8> {
        let mut bytes = vec![0u8; schema.record_size];
        bytes[0..8].copy_from_slice(&ts.to_ne_bytes());
        bytes[8..9].copy_from_slice(&(a as u8).to_ne_bytes());
        bytes[9..13].copy_from_slice(&d.to_ne_bytes());
        bytes
    }

    #[test]
    fn update_buckets_and_aggregates_matching_records() {
        let schema = Schema::new(vec![("a".into(), DataType::Bool), ("d".into(), DataType::Int)]);
        let snap = SchemaSnapshot::of(&schema);
        let ast = Expr::predicate("a", RelOp::Eq, "true");
        let compiled = compile(&ast, &snap).unwrap();
        let filter = Filter::new("f1".into(), compiled, 1_000_000, 8, 256, 4);
        filter.attach_aggregate(AggregateDef::new("agg1".into(), Aggregator::Sum, 2, DataType::Int));

        let values = [(0u64, false, 0), (1, true, 2), (2, false, 4), (3, true, 6)];
        for (i, (ts, a, d)) in values.iter().enumerate() {
            let bytes = make_record_bytes(&schema, *ts, *a, *d);
            let view = RecordView::new(&bytes, &snap);
            filter.update(&view, i as u64, 0, (i + 1) as u64).unwrap();
        }
        let leaf = filter.lookup(0).unwrap().unwrap();
        assert_eq!(leaf.get_aggregate(0, 10).unwrap().format(), "8"); // 2 + 6
    }

    #[test]
    fn invalidate_is_idempotent_failure_on_second_call() {
        let schema = Schema::new(vec![("a".into(), DataType::Bool)]);
        let snap = SchemaSnapshot::of(&schema);
        let compiled = compile(&Expr::predicate("a", RelOp::Eq, "true"), &snap).unwrap();
        let filter = Filter::new("f".into(), compiled, 1, 8, 256, 4);
        filter.invalidate().unwrap();
        assert!(filter.invalidate().is_err());
    }
}
