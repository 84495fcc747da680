//! Persisted metadata checkpoint log (spec.md §6): a append-only, tagged
//! record stream describing a multilog's *structure* (schema, indexes,
//! filters, aggregates, triggers, storage/archival mode) so it can be
//! rebuilt after a restart without replaying the data log itself.
//!
//! Framing is grounded on `storage/manager.rs`'s WAL: each record is
//! `bincode`-serialized and the file is a flat concatenation of records,
//! scanned on reopen exactly like `recover_from_wal` scans `wal.log` —
//! deserialize until it fails, then truncate any trailing garbage. On top
//! of that we add a length prefix and a `crc32fast` checksum per record,
//! since metadata corruption (unlike a dropped telemetry sample) silently
//! loses an index or a trigger, so get to fail loudly instead.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfluoError, Result};

/// One persisted structural fact, in the exact tag order spec.md §6 assigns
/// (SCHEMA=0 .. ARCHIVAL_MODE=6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataRecord {
    /// `(name, type_id, type_size)` per column, in schema order.
    Schema { columns: Vec<(String, usize, usize)> },
    Index { field: String, bucket_size: f64 },
    Filter { name: String, expr: String },
    Aggregate { name: String, filter_name: String, expr: String },
    Trigger { name: String, expr: String, periodicity_ms: u64 },
    StorageMode { mode: u32 },
    ArchivalMode { mode: u32 },
}

impl MetadataRecord {
    /// The stable tag this record persists as (spec.md §6).
    pub fn tag(&self) -> u32 {
        match self {
            MetadataRecord::Schema { .. } => 0,
            MetadataRecord::Index { .. } => 1,
            MetadataRecord::Filter { .. } => 2,
            MetadataRecord::Aggregate { .. } => 3,
            MetadataRecord::Trigger { .. } => 4,
            MetadataRecord::StorageMode { .. } => 5,
            MetadataRecord::ArchivalMode { .. } => 6,
        }
    }
}

fn io_err(e: std::io::Error) -> ConfluoError {
    ConfluoError::IllegalState(format!("metadata log I/O error: {e}"))
}

fn encode_err(e: bincode::Error) -> ConfluoError {
    ConfluoError::IllegalState(format!("metadata record encode/decode error: {e}"))
}

/// An append-only checkpoint log, one file per multilog.
pub struct MetadataLog {
    path: PathBuf,
    file: File,
}

impl MetadataLog {
    /// Opens (creating if absent) the checkpoint file at `path`. Does not
    /// itself replay; call [`MetadataLog::replay`] to recover prior state.
    pub fn open(path: impl Into<PathBuf>) -> Result<MetadataLog> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        Ok(MetadataLog { path, file })
    }

    /// Appends one record, framed as `len:u64, crc32:u32, body:bytes`.
    pub fn append(&mut self, record: &MetadataRecord) -> Result<()> {
        let body = bincode::serialize(record).map_err(encode_err)?;
        let crc = crc32fast::hash(&body);
        self.file.write_all(&(body.len() as u64).to_le_bytes()).map_err(io_err)?;
        self.file.write_all(&crc.to_le_bytes()).map_err(io_err)?;
        self.file.write_all(&body).map_err(io_err)?;
        self.file.sync_all().map_err(io_err)?;
        Ok(())
    }

    /// Replays every valid record in file order. On trailing corruption
    /// (a truncated or bit-flipped final record), truncates the file to
    /// the last valid record boundary and returns the records read so far,
    /// mirroring `recover_from_wal`'s "truncate garbage at the end" policy.
    pub fn replay(&mut self) -> Result<Vec<MetadataRecord>> {
        replay_path(&self.path)
    }
}

fn replay_path(path: &Path) -> Result<Vec<MetadataRecord>> {
    let data = std::fs::read(path).map_err(io_err)?;
    let mut records = Vec::new();
    let mut pos = 0usize;
    let mut valid_end = 0usize;

    loop {
        if pos + 12 > data.len() {
            break;
        }
        let len = u64::from_le_bytes(data[pos..pos + 8].try_into().unwrap()) as usize;
        let crc = u32::from_le_bytes(data[pos + 8..pos + 12].try_into().unwrap());
        let body_start = pos + 12;
        let body_end = body_start + len;
        if body_end > data.len() {
            break;
        }
        let body = &data[body_start..body_end];
        if crc32fast::hash(body) != crc {
            tracing::warn!(
                "metadata checkpoint corruption detected at byte {pos}, truncating remainder"
            );
            break;
        }
        let record: MetadataRecord = bincode::deserialize(body).map_err(encode_err)?;
        records.push(record);
        pos = body_end;
        valid_end = pos;
    }

    if valid_end < data.len() {
        let mut f = OpenOptions::new().write(true).open(path).map_err(io_err)?;
        f.seek(SeekFrom::Start(valid_end as u64)).map_err(io_err)?;
        f.set_len(valid_end as u64).map_err(io_err)?;
        f.sync_all().map_err(io_err)?;
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corrupt_last_byte(path: &Path) {
        let mut f = OpenOptions::new().read(true).write(true).open(path).unwrap();
        let mut data = Vec::new();
        f.read_to_end(&mut data).unwrap();
        *data.last_mut().unwrap() ^= 0xFF;
        f.seek(SeekFrom::Start(0)).unwrap();
        f.write_all(&data).unwrap();
    }

    #[test]
    fn append_and_replay_round_trips_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.log");
        {
            let mut log = MetadataLog::open(&path).unwrap();
            log.append(&MetadataRecord::Schema {
                columns: vec![("timestamp".into(), 9, 8), ("d".into(), 6, 4)],
            })
            .unwrap();
            log.append(&MetadataRecord::Index { field: "d".into(), bucket_size: 1.0 }).unwrap();
            log.append(&MetadataRecord::Filter { name: "f".into(), expr: "d > 0".into() }).unwrap();
        }
        let mut log = MetadataLog::open(&path).unwrap();
        let records = log.replay().unwrap();
        assert_eq!(records.len(), 3);
        assert!(matches!(records[0], MetadataRecord::Schema { .. }));
        assert!(matches!(records[1], MetadataRecord::Index { .. }));
        assert!(matches!(records[2], MetadataRecord::Filter { .. }));
    }

    #[test]
    fn trailing_corruption_is_truncated_and_earlier_records_survive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.log");
        {
            let mut log = MetadataLog::open(&path).unwrap();
            log.append(&MetadataRecord::StorageMode { mode: 0 }).unwrap();
            log.append(&MetadataRecord::ArchivalMode { mode: 1 }).unwrap();
        }
        corrupt_last_byte(&path);

        let mut log = MetadataLog::open(&path).unwrap();
        let records = log.replay().unwrap();
        assert_eq!(records.len(), 1);
        assert!(matches!(records[0], MetadataRecord::StorageMode { mode: 0 }));

        // A second replay sees the file already truncated to the valid prefix.
        let records_again = log.replay().unwrap();
        assert_eq!(records_again.len(), 1);
    }

    #[test]
    fn tags_match_persisted_order() {
        assert_eq!(MetadataRecord::Schema { columns: vec![] }.tag(), 0);
        assert_eq!(MetadataRecord::Index { field: "x".into(), bucket_size: 1.0 }.tag(), 1);
        assert_eq!(MetadataRecord::Filter { name: "x".into(), expr: "x".into() }.tag(), 2);
        assert_eq!(
            MetadataRecord::Aggregate { name: "x".into(), filter_name: "f".into(), expr: "SUM(x)".into() }
                .tag(),
            3
        );
        assert_eq!(
            MetadataRecord::Trigger { name: "x".into(), expr: "a>1".into(), periodicity_ms: 10 }.tag(),
            4
        );
        assert_eq!(MetadataRecord::StorageMode { mode: 0 }.tag(), 5);
        assert_eq!(MetadataRecord::ArchivalMode { mode: 0 }.tag(), 6);
    }
}
