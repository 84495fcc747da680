//! Schema, columns, and record views (spec.md §3/§4, component 4).
//!
//! A multilog's schema is fixed at creation: a leading 8-byte `TIMESTAMP`
//! column (implicit unless user-supplied) followed by the declared fields.
//! Only a column's *indexing state* changes after creation, and only via
//! CAS (`unindexed -> indexing -> indexed`, and `indexed -> unindexed`),
//! matching `rpglot-core/src/storage/model/mod.rs`'s pattern of a small
//! typed model plus narrowly-scoped mutable state.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::{ConfluoError, Result};
use crate::types::{DataType, Numeric};

pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// A column's indexing lifecycle (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Unindexed,
    IndexingInProgress,
    Indexed,
}

impl IndexState {
    fn to_u8(self) -> u8 {
        match self {
            IndexState::Unindexed => 0,
            IndexState::IndexingInProgress => 1,
            IndexState::Indexed => 2,
        }
    }
    fn from_u8(v: u8) -> IndexState {
        match v {
            1 => IndexState::IndexingInProgress,
            2 => IndexState::Indexed,
            _ => IndexState::Unindexed,
        }
    }
}

/// One column's static metadata plus its (only) mutable field, indexing state.
pub struct Column {
    pub name: String,
    pub idx: usize,
    pub offset: usize,
    pub data_type: DataType,
    state: AtomicU8,
    /// Set once the column transitions to `Indexed`; the id into the
    /// multilog's index arena (see `multilog.rs`).
    index_id: std::sync::atomic::AtomicUsize,
}

const NO_INDEX: usize = usize::MAX;

impl Column {
    fn new(name: &str, idx: usize, offset: usize, data_type: DataType) -> Column {
        Column {
            name: name.to_ascii_lowercase(),
            idx,
            offset,
            data_type,
            state: AtomicU8::new(IndexState::Unindexed.to_u8()),
            index_id: std::sync::atomic::AtomicUsize::new(NO_INDEX),
        }
    }

    pub fn index_state(&self) -> IndexState {
        IndexState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn index_id(&self) -> Option<usize> {
        let id = self.index_id.load(Ordering::Acquire);
        if id == NO_INDEX {
            None
        } else {
            Some(id)
        }
    }

    /// CAS `unindexed -> indexing-in-progress`. Fails if already indexing or indexed.
    pub fn begin_indexing(&self) -> Result<()> {
        self.state
            .compare_exchange(
                IndexState::Unindexed.to_u8(),
                IndexState::IndexingInProgress.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|_| ConfluoError::ManagementError(format!("column {} is already indexed", self.name)))
    }

    /// CAS `indexing-in-progress -> indexed`, recording the index id.
    pub fn finish_indexing(&self, index_id: usize) -> Result<()> {
        self.state
            .compare_exchange(
                IndexState::IndexingInProgress.to_u8(),
                IndexState::Indexed.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| ConfluoError::IllegalState(format!("column {} not in indexing state", self.name)))?;
        self.index_id.store(index_id, Ordering::Release);
        Ok(())
    }

    /// CAS `indexed -> unindexed`. The built index's contents are left
    /// intact (I5); only visibility to the planner is withdrawn.
    pub fn remove_index(&self) -> Result<()> {
        self.state
            .compare_exchange(
                IndexState::Indexed.to_u8(),
                IndexState::Unindexed.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|_| ConfluoError::ManagementError(format!("column {} is not indexed", self.name)))
    }
}

/// Immutable list of columns plus the derived fixed record size. Schemas
/// never change shape after construction.
pub struct Schema {
    pub columns: Vec<Column>,
    pub record_size: usize,
}

impl Schema {
    /// Builds a schema from user-declared `(name, type)` pairs, prepending
    /// the implicit `TIMESTAMP: ulong` column if the caller didn't supply one.
    pub fn new(fields: Vec<(String, DataType)>) -> Schema {
        let mut all = Vec::with_capacity(fields.len() + 1);
        let has_ts = fields
            .iter()
            .any(|(n, _)| n.eq_ignore_ascii_case(TIMESTAMP_COLUMN));
        if !has_ts {
            all.push((TIMESTAMP_COLUMN.to_string(), DataType::ULong));
        }
        all.extend(fields);

        let mut columns = Vec::with_capacity(all.len());
        let mut offset = 0;
        for (i, (name, ty)) in all.into_iter().enumerate() {
            let size = ty.byte_size();
            columns.push(Column::new(&name, i, offset, ty));
            offset += size;
        }
        let record_size = offset;
        Schema { columns, record_size }
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        let lower = name.to_ascii_lowercase();
        self.columns
            .iter()
            .position(|c| c.name == lower)
            .ok_or_else(|| ConfluoError::NotFound(format!("column {name}")))
    }

    pub fn column(&self, idx: usize) -> Result<&Column> {
        self.columns
            .get(idx)
            .ok_or_else(|| ConfluoError::NotFound(format!("column index {idx}")))
    }

    pub fn timestamp_index(&self) -> usize {
        0
    }
}

/// An immutable snapshot of schema shape, safe to hand to background readers
/// (the monitor task, the planner) without touching the per-column atomics.
#[derive(Clone)]
pub struct SchemaSnapshot {
    pub record_size: usize,
    pub columns: Vec<(String, usize, DataType)>,
}

impl SchemaSnapshot {
    pub fn of(schema: &Schema) -> SchemaSnapshot {
        SchemaSnapshot {
            record_size: schema.record_size,
            columns: schema
                .columns
                .iter()
                .map(|c| (c.name.clone(), c.offset, c.data_type))
                .collect(),
        }
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        let lower = name.to_ascii_lowercase();
        self.columns
            .iter()
            .position(|(n, _, _)| *n == lower)
            .ok_or_else(|| ConfluoError::NotFound(format!("column {name}")))
    }
}

/// A read-only view over one record's raw bytes, decoded field-by-field on demand.
pub struct RecordView<'a> {
    pub data: &'a [u8],
    pub schema: &'a SchemaSnapshot,
}

impl<'a> RecordView<'a> {
    pub fn new(data: &'a [u8], schema: &'a SchemaSnapshot) -> RecordView<'a> {
        RecordView { data, schema }
    }

    pub fn field(&self, idx: usize) -> Result<Numeric> {
        let (_, offset, ty) = self
            .schema
            .columns
            .get(idx)
            .ok_or_else(|| ConfluoError::NotFound(format!("column index {idx}")))?;
        if ty.is_string() {
            return Err(ConfluoError::UnsupportedOp("field() on string column; use field_bytes()".into()));
        }
        Numeric::deserialize(*ty, &self.data[*offset..*offset + ty.byte_size()])
    }

    pub fn field_bytes(&self, idx: usize) -> Result<&'a [u8]> {
        let (_, offset, ty) = self
            .schema
            .columns
            .get(idx)
            .ok_or_else(|| ConfluoError::NotFound(format!("column index {idx}")))?;
        Ok(&self.data[*offset..*offset + ty.byte_size()])
    }

    pub fn timestamp(&self) -> Result<u64> {
        Ok(self.field(0)?.as_u64_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn implicit_timestamp_is_prepended() {
        let schema = Schema::new(vec![("a".into(), DataType::Bool), ("d".into(), DataType::Int)]);
        assert_eq!(schema.columns[0].name, "timestamp");
        assert_eq!(schema.columns[0].data_type, DataType::ULong);
        assert_eq!(schema.record_size, 8 + 1 + 4);
    }

    #[test]
    fn index_state_transitions_are_cas_guarded() {
        let schema = Schema::new(vec![("a".into(), DataType::Bool)]);
        let col = &schema.columns[1];
        assert_eq!(col.index_state(), IndexState::Unindexed);
        col.begin_indexing().unwrap();
        assert!(col.begin_indexing().is_err());
        col.finish_indexing(7).unwrap();
        assert_eq!(col.index_state(), IndexState::Indexed);
        assert_eq!(col.index_id(), Some(7));
        col.remove_index().unwrap();
        assert_eq!(col.index_state(), IndexState::Unindexed);
        assert!(col.remove_index().is_err());
    }

    #[test]
    fn record_view_decodes_fields() {
        let schema = Schema::new(vec![("d".into(), DataType::Int)]);
        let snap = SchemaSnapshot::of(&schema);
        let mut bytes = vec![0u8; schema.record_size];
        bytes[0..8].copy_from_slice(&42u64.to_ne_bytes());
        bytes[8..12].copy_from_slice(&7i32.to_ne_bytes());
        let view = RecordView::new(&bytes, &snap);
        assert_eq!(view.timestamp().unwrap(), 42);
        assert_eq!(view.field(1).unwrap().format(), "7");
    }
}
