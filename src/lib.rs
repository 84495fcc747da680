//! `confluo`: an embedded real-time analytics engine for high-throughput
//! streaming telemetry. A multilog is an append-only, schema-typed stream
//! of records with attached indexes, boolean filters, streaming
//! aggregates, and threshold triggers, all wait-free on the ingest path.
//!
//! Module map:
//!   - [`atomics`] — shared CAS helper primitives.
//!   - [`error`] — the [`error::ConfluoError`] kind returned by every fallible op.
//!   - [`types`] — the scalar type registry ([`types::DataType`], [`types::Numeric`]).
//!   - [`config`] — [`config::EngineConfig`] and [`config::StorageMode`].
//!   - [`schema`] — column layout and [`schema::RecordView`].
//!   - [`monolog`] — the exponential-then-linear block schedule shared by logs.
//!   - [`data_log`] — the append-only byte store (record offsets are identities).
//!   - [`reflog`] — an append-only offset log, the "posting list" primitive.
//!   - [`radix_index`] — the fixed-depth trie keyed by fixed-width byte strings.
//!   - [`swappable_ptr`] — the two-counter swap used by re-encodable cell arrays.
//!   - [`aggregate`] — aggregator definitions and per-thread version chains.
//!   - [`aggregated_reflog`] — a reflog paired with a swappable aggregate cell array.
//!   - [`filter`] — a compiled expression gating a time-bucketed index.
//!   - [`expr`] — AST, DNF compiler, and text grammar for filter/trigger expressions.
//!   - [`planner`] — picks the cheapest indexed predicate per minterm.
//!   - [`task_pool`] — the single-writer management queue.
//!   - [`alert`] — the deduplicated alert index.
//!   - [`trigger`] — threshold comparisons evaluated by the monitor tick.
//!   - [`thread_reg`] — the process-wide thread-id registration singleton.
//!   - [`multilog`] — the orchestrator tying all of the above together.
//!   - [`metadata`] — the persisted structural checkpoint log.
//!   - [`time_series`] — a thin timestamp-ordered view over a multilog.

pub mod atomics;
pub mod error;
pub mod types;
pub mod config;
pub mod schema;
pub mod monolog;
pub mod data_log;
pub mod reflog;
pub mod radix_index;
pub mod swappable_ptr;
pub mod aggregate;
pub mod aggregated_reflog;
pub mod filter;
pub mod expr;
pub mod planner;
pub mod task_pool;
pub mod alert;
pub mod trigger;
pub mod thread_reg;
pub mod multilog;
pub mod metadata;
pub mod time_series;

pub use config::{EngineConfig, StorageMode};
pub use error::{ConfluoError, Result};
pub use metadata::{MetadataLog, MetadataRecord};
pub use multilog::Multilog;
pub use time_series::TimeSeries;
pub use types::{DataType, Numeric};
