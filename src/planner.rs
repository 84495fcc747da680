//! Query planner: per minterm, picks the cheapest viable indexed predicate
//! group and turns it into an index range scan plus a residual filter
//! (spec.md §4.7). Grounded directly on spec.md's own pseudocode — none of
//! the pack's example repos plan multi-index queries this way; the closest
//! analogue is `rpglot-core`'s `provider/history.rs` range-window lookups,
//! generalized here to pick among several candidate indexes by an
//! approximate cost.

use std::collections::HashMap;

use crate::error::{ConfluoError, Result};
use crate::expr::ast::RelOp;
use crate::expr::compiler::{CompiledExpression, CompiledMinterm};
use crate::schema::Schema;
use crate::schema::IndexState;
use crate::types::{DataType, Numeric};

/// Per-index planning metadata: which field it covers and its bucket scale.
#[derive(Debug, Clone, Copy)]
pub struct IndexMeta {
    pub field_idx: usize,
    pub bucket_size: f64,
}

/// Abstraction the planner needs over the multilog's live indexes, so this
/// module stays free of any direct dependency on `multilog.rs`.
pub trait IndexLookup {
    fn approx_count(&self, index_id: usize, lo: &[u8], hi: &[u8]) -> Result<u64>;
    fn range_offsets(&self, index_id: usize, lo: &[u8], hi: &[u8]) -> Result<Vec<u64>>;
}

/// One planned step: scan `index_id` over `ranges` (more than one only for
/// `!=`, which splits into two half-open ranges), then apply `minterm` as a
/// residual filter over the candidates.
pub struct MintermStep {
    pub minterm: CompiledMinterm,
    pub index_id: usize,
    pub ranges: Vec<(Vec<u8>, Vec<u8>)>,
}

type Range = (Vec<u8>, Vec<u8>);

fn increment(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut out = bytes.to_vec();
    for b in out.iter_mut().rev() {
        if *b == 0xFF {
            *b = 0;
            continue;
        }
        *b += 1;
        return Some(out);
    }
    None // overflowed past the maximum representable key
}

fn decrement(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut out = bytes.to_vec();
    for b in out.iter_mut().rev() {
        if *b == 0x00 {
            *b = 0xFF;
            continue;
        }
        *b -= 1;
        return Some(out);
    }
    None // underflowed past the minimum representable key
}

/// Derives the key range(s) a single predicate constrains its index to
/// (spec.md §4.7 step 1). `!=` yields two ranges (below and above the value).
fn derive_ranges(op: RelOp, value: &Numeric, bucket_size: f64, field_type: DataType) -> Result<Vec<Range>> {
    let k = |n: &Numeric| n.key_transform(bucket_size);
    let kv = k(value)?;
    let kmin = k(&Numeric::min(field_type))?;
    let kmax = k(&Numeric::max(field_type))?;
    Ok(match op {
        RelOp::Eq => vec![(kv.clone(), kv)],
        RelOp::Ge => vec![(kv, kmax)],
        RelOp::Le => vec![(kmin, kv)],
        RelOp::Gt => match increment(&kv) {
            Some(lo) => vec![(lo, kmax)],
            None => vec![],
        },
        RelOp::Lt => match decrement(&kv) {
            Some(hi) => vec![(kmin, hi)],
            None => vec![],
        },
        RelOp::Neq => {
            let mut ranges = vec![];
            if let Some(hi) = decrement(&kv) {
                ranges.push((kmin, hi));
            }
            if let Some(lo) = increment(&kv) {
                ranges.push((lo, kmax));
            }
            ranges
        }
    })
}

fn intersect_ranges(existing: &[Range], incoming: &[Range]) -> Vec<Range> {
    let mut out = Vec::new();
    for (lo_a, hi_a) in existing {
        for (lo_b, hi_b) in incoming {
            let lo = if lo_a > lo_b { lo_a.clone() } else { lo_b.clone() };
            let hi = if hi_a < hi_b { hi_a.clone() } else { hi_b.clone() };
            if lo <= hi {
                out.push((lo, hi));
            }
        }
    }
    out
}

fn plan_minterm(
    minterm: &CompiledMinterm,
    schema: &Schema,
    index_meta: &[IndexMeta],
    lookup: &dyn IndexLookup,
) -> Result<Option<MintermStep>> {
    let mut groups: HashMap<usize, Vec<Range>> = HashMap::new();
    for p in minterm.predicates() {
        let col = schema.column(p.field_idx)?;
        if col.index_state() != IndexState::Indexed {
            continue;
        }
        let index_id = match col.index_id() {
            Some(id) => id,
            None => continue,
        };
        let meta = index_meta
            .get(index_id)
            .ok_or_else(|| ConfluoError::IllegalState(format!("no metadata for index {index_id}")))?;
        let ranges = derive_ranges(p.op, &p.value, meta.bucket_size, col.data_type)?;
        groups
            .entry(index_id)
            .and_modify(|existing| *existing = intersect_ranges(existing, &ranges))
            .or_insert(ranges);
    }

    let mut best: Option<(usize, Vec<Range>, u64)> = None;
    for (index_id, ranges) in groups {
        let ranges: Vec<Range> = ranges.into_iter().filter(|(lo, hi)| lo <= hi).collect();
        if ranges.is_empty() {
            continue;
        }
        let mut total = 0u64;
        for (lo, hi) in &ranges {
            total += lookup.approx_count(index_id, lo, hi)?;
        }
        if best.as_ref().map_or(true, |(_, _, cost)| total < *cost) {
            best = Some((index_id, ranges, total));
        }
    }

    Ok(best.map(|(index_id, ranges, _)| MintermStep { minterm: minterm.clone(), index_id, ranges }))
}

/// Plans every minterm of `expr` against `schema`'s currently-indexed
/// columns. Fails with `InvalidOp` if no minterm has any indexed predicate —
/// per spec.md §4.7 the core never implicitly full-scans.
pub fn plan(
    expr: &CompiledExpression,
    schema: &Schema,
    index_meta: &[IndexMeta],
    lookup: &dyn IndexLookup,
) -> Result<Vec<MintermStep>> {
    let mut steps = Vec::new();
    for minterm in expr.minterms() {
        if let Some(step) = plan_minterm(minterm, schema, index_meta, lookup)? {
            steps.push(step);
        }
    }
    if steps.is_empty() {
        return Err(ConfluoError::InvalidOp(
            "no minterm has an indexed predicate; caller must decide whether to full-scan".into(),
        ));
    }
    Ok(steps)
}

/// Executes a plan against `lookup`, returning deduplicated candidate
/// offsets. Residual filtering (applying each step's full minterm to each
/// candidate record) is the caller's responsibility — it needs the data log.
pub fn collect_candidates(steps: &[MintermStep], lookup: &dyn IndexLookup) -> Result<Vec<(u64, usize)>> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for (step_idx, step) in steps.iter().enumerate() {
        for (lo, hi) in &step.ranges {
            for offset in lookup.range_offsets(step.index_id, lo, hi)? {
                if seen.insert((offset, step_idx)) {
                    out.push((offset, step_idx));
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_decrement_handle_boundaries() {
        assert_eq!(increment(&[0x00]), Some(vec![0x01]));
        assert_eq!(increment(&[0xFF]), None);
        assert_eq!(decrement(&[0x01]), Some(vec![0x00]));
        assert_eq!(decrement(&[0x00]), None);
    }

    #[test]
    fn eq_range_is_a_single_point() {
        let ranges = derive_ranges(RelOp::Eq, &Numeric::from_int(5), 1.0, DataType::Int).unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].0, ranges[0].1);
    }

    #[test]
    fn neq_splits_into_two_ranges() {
        let ranges = derive_ranges(RelOp::Neq, &Numeric::from_uchar(5), 1.0, DataType::UChar).unwrap();
        assert_eq!(ranges.len(), 2);
    }
}
