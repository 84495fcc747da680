//! Atomic multilog: the single entry point composing a data log, a radix
//! index arena, filters, triggers, and the alert index into one schema-typed
//! stream (spec.md §4.8). Grounded on the original `atomic_multilog.h` for
//! the operation surface, and on `rpglot-web/src/background.rs` for routing
//! every schema-mutating call through one serializing worker ([`TaskPool`])
//! so `append`/`read`/queries never block on a management-queue lock.
//!
//! `Multilog` is a thin `Arc<Inner>` handle — cheap to clone, so every
//! thread that appends or queries holds its own handle. Management methods
//! move a cloned `Arc<Inner>` into the task pool's closure rather than
//! borrowing `self`, since `TaskPool::submit` requires `'static`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::aggregate::Aggregator;
use crate::alert::{Alert, AlertIndex};
use crate::config::EngineConfig;
use crate::data_log::DataLog;
use crate::error::{ConfluoError, Result};
use crate::expr::ast::Expr;
use crate::expr::{compiler, grammar};
use crate::filter::{AggregateDef, Filter};
use crate::planner::{self, IndexLookup, IndexMeta};
use crate::radix_index::RadixIndex;
use crate::reflog::Reflog;
use crate::schema::{IndexState, RecordView, Schema, SchemaSnapshot};
use crate::task_pool::TaskPool;
use crate::thread_reg;
use crate::trigger::{self, Trigger};
use crate::types::{DataType, Numeric};

thread_local! {
    static TID: std::cell::Cell<Option<usize>> = std::cell::Cell::new(None);
}

/// Caches this thread's registered id for the lifetime of the thread.
fn current_tid() -> Result<usize> {
    TID.with(|cell| {
        if let Some(id) = cell.get() {
            return Ok(id);
        }
        let id = thread_reg::register_thread()?;
        cell.set(Some(id));
        Ok(id)
    })
}

struct Inner {
    name: String,
    config: EngineConfig,
    schema: Schema,
    data_log: DataLog,
    read_tail: AtomicU64,
    indexes: RwLock<Vec<RadixIndex<Reflog>>>,
    index_meta: RwLock<Vec<IndexMeta>>,
    filters: RwLock<Vec<Arc<Filter>>>,
    filter_ids: RwLock<HashMap<String, usize>>,
    triggers: RwLock<Vec<Trigger>>,
    trigger_ids: RwLock<HashMap<String, usize>>,
    alerts: AlertIndex,
    task_pool: TaskPool,
    monitoring: AtomicBool,
}

struct MultilogIndexLookup<'a> {
    indexes: &'a [RadixIndex<Reflog>],
}

impl<'a> IndexLookup for MultilogIndexLookup<'a> {
    fn approx_count(&self, index_id: usize, lo: &[u8], hi: &[u8]) -> Result<u64> {
        self.indexes
            .get(index_id)
            .ok_or_else(|| ConfluoError::IllegalState(format!("no index {index_id}")))?
            .approx_count(lo, hi)
    }

    fn range_offsets(&self, index_id: usize, lo: &[u8], hi: &[u8]) -> Result<Vec<u64>> {
        let index = self
            .indexes
            .get(index_id)
            .ok_or_else(|| ConfluoError::IllegalState(format!("no index {index_id}")))?;
        let mut out = Vec::new();
        for (_, leaf) in index.range(lo, hi)? {
            out.extend(leaf.iter_all());
        }
        Ok(out)
    }
}

/// Splits an `AGG(field)` aggregate expression into its aggregator and operand.
fn parse_agg_expr(expr: &str) -> Result<(Aggregator, String)> {
    let open = expr
        .find('(')
        .ok_or_else(|| ConfluoError::ParseError(format!("malformed aggregate expression '{expr}'")))?;
    let close = expr
        .rfind(')')
        .ok_or_else(|| ConfluoError::ParseError(format!("malformed aggregate expression '{expr}'")))?;
    if close <= open {
        return Err(ConfluoError::ParseError(format!("malformed aggregate expression '{expr}'")));
    }
    let aggregator = Aggregator::parse(expr[..open].trim())?;
    let field = expr[open + 1..close].trim().to_string();
    Ok((aggregator, field))
}

fn find_aggregate(inner: &Inner, agg_name: &str) -> Result<(usize, usize)> {
    let filters = inner.filters.read().unwrap();
    for (fid, filter) in filters.iter().enumerate() {
        if let Ok(aid) = filter.aggregate_index(agg_name) {
            return Ok((fid, aid));
        }
    }
    Err(ConfluoError::ManagementError(format!("Aggregate {agg_name} does not exist.")))
}

fn add_index_sync(inner: &Inner, field: &str, bucket_size: f64) -> Result<usize> {
    let idx = inner.schema.column_index(field)?;
    let col = inner.schema.column(idx)?;
    col.begin_indexing()?;
    let index_id = {
        let mut indexes = inner.indexes.write().unwrap();
        let id = indexes.len();
        indexes.push(RadixIndex::new(inner.config.radix_depth, inner.config.radix_width));
        id
    };
    inner.index_meta.write().unwrap().push(IndexMeta { field_idx: idx, bucket_size });
    col.finish_indexing(index_id)?;
    tracing::info!(multilog = %inner.name, field, index_id, "index built");
    Ok(index_id)
}

fn remove_index_sync(inner: &Inner, field: &str) -> Result<()> {
    let idx = inner.schema.column_index(field)?;
    inner.schema.column(idx)?.remove_index()
}

fn add_filter_sync(inner: &Inner, name: String, expr_text: String) -> Result<usize> {
    {
        let ids = inner.filter_ids.read().unwrap();
        if ids.contains_key(&name) {
            return Err(ConfluoError::ManagementError(format!("Filter {name} already exists.")));
        }
    }
    let ast = grammar::parse(&expr_text)?;
    let snapshot = SchemaSnapshot::of(&inner.schema);
    let compiled = compiler::compile(&ast, &snapshot)?;
    let filter = Filter::new(
        name.clone(),
        compiled,
        inner.config.time_resolution_ns,
        inner.config.radix_depth,
        inner.config.radix_width,
        inner.config.max_concurrency,
    );
    let id = {
        let mut filters = inner.filters.write().unwrap();
        let id = filters.len();
        filters.push(Arc::new(filter));
        id
    };
    inner.filter_ids.write().unwrap().insert(name.clone(), id);
    tracing::info!(multilog = %inner.name, filter = %name, id, "filter installed");
    Ok(id)
}

/// The name->id mapping is removed outright (not merely re-invalidated), so
/// a second call fails the lookup itself with the same message as a filter
/// that never existed. The underlying `Filter` persists, only invalidated —
/// filters are never physically removed (spec.md's Lifecycle principle).
fn remove_filter_sync(inner: &Inner, name: &str) -> Result<()> {
    let id = {
        let mut ids = inner.filter_ids.write().unwrap();
        ids.remove(name)
            .ok_or_else(|| ConfluoError::ManagementError(format!("Filter {name} does not exist.")))?
    };
    let filters = inner.filters.read().unwrap();
    filters[id].invalidate()?;
    tracing::info!(multilog = %inner.name, filter = name, "filter removed");
    Ok(())
}

fn add_aggregate_sync(inner: &Inner, name: String, filter_name: String, agg_expr: String) -> Result<usize> {
    let (aggregator, field) = parse_agg_expr(&agg_expr)?;
    let field_idx = inner.schema.column_index(&field)?;
    let field_type = inner.schema.column(field_idx)?.data_type;
    let filter_id = *inner
        .filter_ids
        .read()
        .unwrap()
        .get(&filter_name)
        .ok_or_else(|| ConfluoError::ManagementError(format!("Filter {filter_name} does not exist.")))?;
    let filters = inner.filters.read().unwrap();
    let filter = &filters[filter_id];
    if filter.aggregate_index(&name).is_ok() {
        return Err(ConfluoError::ManagementError(format!("Aggregate {name} already exists.")));
    }
    let aid = filter.attach_aggregate(AggregateDef::new(name.clone(), aggregator, field_idx, field_type));
    tracing::info!(multilog = %inner.name, aggregate = %name, filter = %filter_name, aid, "aggregate attached");
    Ok(aid)
}

fn install_trigger_sync(inner: &Inner, name: String, trigger_expr: String, periodicity_ms: u64) -> Result<usize> {
    trigger::validate_periodicity(periodicity_ms, inner.config.monitor_tick_ms)?;
    {
        let ids = inner.trigger_ids.read().unwrap();
        if ids.contains_key(&name) {
            return Err(ConfluoError::ManagementError(format!("Trigger {name} already exists.")));
        }
    }
    let ast = grammar::parse(&trigger_expr)?;
    let (agg_name, op, threshold_text) = match ast {
        Expr::Predicate { attr, op, value } => (attr, op, value),
        _ => {
            return Err(ConfluoError::ParseError(format!(
                "trigger expression '{trigger_expr}' must be a single predicate"
            )))
        }
    };
    let (filter_id, aggregate_id) = find_aggregate(inner, &agg_name)?;
    let (aggregator, field_type) = {
        let filters = inner.filters.read().unwrap();
        filters[filter_id].aggregate_snapshot()[aggregate_id]
    };
    let result_type = aggregator.result_type(field_type);
    let threshold = Numeric::parse(&threshold_text, result_type)?;
    let trig = Trigger::new(name.clone(), filter_id, aggregate_id, agg_name, op, threshold, periodicity_ms);
    let id = {
        let mut triggers = inner.triggers.write().unwrap();
        let id = triggers.len();
        triggers.push(trig);
        id
    };
    inner.trigger_ids.write().unwrap().insert(name.clone(), id);
    tracing::info!(multilog = %inner.name, trigger = %name, id, "trigger installed");
    Ok(id)
}

impl Inner {
    fn append(&self, record_bytes: &[u8]) -> Result<u64> {
        if record_bytes.len() != self.schema.record_size {
            return Err(ConfluoError::InvalidOp(format!(
                "record of {} bytes does not match schema size {}",
                record_bytes.len(),
                self.schema.record_size
            )));
        }
        let offset = self.data_log.reserve(self.schema.record_size as u64)?;
        self.data_log.write(offset, record_bytes)?;

        let snapshot = SchemaSnapshot::of(&self.schema);
        let view = RecordView::new(record_bytes, &snapshot);
        let tid = current_tid()?;
        let new_tail = offset + self.schema.record_size as u64;

        let filters = self.filters.read().unwrap().clone();
        for filter in &filters {
            if filter.is_valid() {
                filter.update(&view, offset, tid, new_tail)?;
            }
        }
        self.index_record(&view, offset)?;

        self.data_log.flush(offset, self.schema.record_size as u64);
        crate::atomics::advance_max_u64(&self.read_tail, new_tail);
        tracing::trace!(multilog = %self.name, offset, "record appended");
        Ok(offset)
    }

    fn append_batch(&self, records: &[Vec<u8>]) -> Result<u64> {
        if records.is_empty() {
            return Ok(self.read_tail.load(Ordering::Acquire));
        }
        for r in records {
            if r.len() != self.schema.record_size {
                return Err(ConfluoError::InvalidOp(format!(
                    "record of {} bytes does not match schema size {}",
                    r.len(),
                    self.schema.record_size
                )));
            }
        }
        let record_size = self.schema.record_size as u64;
        let total = records.len() as u64 * record_size;
        let base_offset = self.data_log.reserve(total)?;
        let offsets: Vec<u64> = (0..records.len() as u64).map(|i| base_offset + i * record_size).collect();
        for (r, offset) in records.iter().zip(&offsets) {
            self.data_log.write(*offset, r)?;
        }

        let snapshot = SchemaSnapshot::of(&self.schema);
        let views: Vec<(RecordView, u64)> = records
            .iter()
            .zip(&offsets)
            .map(|(r, off)| (RecordView::new(r, &snapshot), *off))
            .collect();
        let tid = current_tid()?;
        let new_tail = base_offset + total;

        let filters = self.filters.read().unwrap().clone();
        for filter in &filters {
            if filter.is_valid() {
                filter.update_batch(&views, tid, new_tail)?;
            }
        }
        for (view, offset) in &views {
            self.index_record(view, *offset)?;
        }

        self.data_log.flush(base_offset, total);
        crate::atomics::advance_max_u64(&self.read_tail, new_tail);
        tracing::trace!(multilog = %self.name, base_offset, count = records.len(), "batch appended");
        Ok(base_offset)
    }

    fn index_record(&self, view: &RecordView, offset: u64) -> Result<()> {
        let indexes = self.indexes.read().unwrap();
        let index_meta = self.index_meta.read().unwrap();
        for col in &self.schema.columns {
            if col.index_state() != IndexState::Indexed {
                continue;
            }
            let index_id = match col.index_id() {
                Some(id) => id,
                None => continue,
            };
            let bucket_size = index_meta[index_id].bucket_size;
            let value = view.field(col.idx)?;
            let key = value.key_transform(bucket_size)?;
            indexes[index_id]
                .get_or_create_leaf(&key, || Reflog::new(self.config.max_blocks))?
                .push_back(offset)?;
        }
        Ok(())
    }

    fn read(&self, offset: u64) -> Result<Vec<u8>> {
        let tail = self.read_tail.load(Ordering::Acquire);
        if offset + self.schema.record_size as u64 > tail {
            return Err(ConfluoError::NotYetCommitted { offset, tail });
        }
        self.data_log.read(offset, self.schema.record_size)
    }

    fn ms_to_block(&self, ms: u64) -> u64 {
        (ms as u128 * 1_000_000 / self.config.time_resolution_ns as u128) as u64
    }

    fn execute_filter(&self, expr_text: &str) -> Result<Vec<Vec<u8>>> {
        let ast = grammar::parse(expr_text)?;
        let snapshot = SchemaSnapshot::of(&self.schema);
        let compiled = compiler::compile(&ast, &snapshot)?;
        let version = self.read_tail.load(Ordering::Acquire);
        let record_size = self.schema.record_size as u64;

        let index_meta = self.index_meta.read().unwrap().clone();
        let indexes = self.indexes.read().unwrap();
        let lookup = MultilogIndexLookup { indexes: &indexes };
        match planner::plan(&compiled, &self.schema, &index_meta, &lookup) {
            Ok(steps) => {
                let candidates = planner::collect_candidates(&steps, &lookup)?;
                drop(indexes);
                // `collect_candidates` dedups only per (offset, step_idx) — an
                // offset that is a range-candidate of more than one minterm
                // must be tried against *every* one of its candidate steps
                // until one passes, not dropped the first time one fails.
                let mut by_offset: std::collections::BTreeMap<u64, Vec<usize>> = std::collections::BTreeMap::new();
                for (offset, step_idx) in candidates {
                    if offset + record_size > version {
                        continue;
                    }
                    by_offset.entry(offset).or_default().push(step_idx);
                }
                let mut out = Vec::new();
                for (offset, step_indices) in by_offset {
                    let bytes = self.data_log.read(offset, self.schema.record_size)?;
                    let view = RecordView::new(&bytes, &snapshot);
                    let mut matched = false;
                    for step_idx in step_indices {
                        if steps[step_idx].minterm.test(&view)? {
                            matched = true;
                            break;
                        }
                    }
                    if matched {
                        out.push(bytes);
                    }
                }
                Ok(out)
            }
            // No minterm had an indexed predicate: execute_filter still owes
            // P7's exact semantics, so it falls back to a full scan here —
            // `planner::plan` itself never does this implicitly.
            Err(ConfluoError::InvalidOp(_)) => {
                drop(indexes);
                let mut out = Vec::new();
                let mut offset = 0u64;
                while offset + record_size <= version {
                    let bytes = self.data_log.read(offset, self.schema.record_size)?;
                    let view = RecordView::new(&bytes, &snapshot);
                    if compiled.test(&view)? {
                        out.push(bytes);
                    }
                    offset += record_size;
                }
                Ok(out)
            }
            Err(e) => Err(e),
        }
    }

    fn query_filter(&self, filter_name: &str, t1_ms: u64, t2_ms: u64, additional_expr: Option<&str>) -> Result<Vec<Vec<u8>>> {
        let filter = {
            let id = *self
                .filter_ids
                .read()
                .unwrap()
                .get(filter_name)
                .ok_or_else(|| ConfluoError::ManagementError(format!("Filter {filter_name} does not exist.")))?;
            self.filters.read().unwrap()[id].clone()
        };
        let snapshot = SchemaSnapshot::of(&self.schema);
        let additional = match additional_expr {
            Some(text) => Some(compiler::compile(&grammar::parse(text)?, &snapshot)?),
            None => None,
        };
        let version = self.read_tail.load(Ordering::Acquire);
        let record_size = self.schema.record_size as u64;
        let t1_block = self.ms_to_block(t1_ms);
        let t2_block = self.ms_to_block(t2_ms);

        let mut out = Vec::new();
        for (_, leaf) in filter.lookup_range(t1_block, t2_block)? {
            for offset in leaf.reflog().iter_all() {
                if offset + record_size > version {
                    continue;
                }
                let bytes = self.data_log.read(offset, self.schema.record_size)?;
                if let Some(expr) = &additional {
                    let view = RecordView::new(&bytes, &snapshot);
                    if !expr.test(&view)? {
                        continue;
                    }
                }
                out.push(bytes);
            }
        }
        Ok(out)
    }

    fn get_aggregate(&self, agg_name: &str, t1_ms: u64, t2_ms: u64) -> Result<Numeric> {
        let (filter_id, aggregate_id) = find_aggregate(self, agg_name)?;
        let filter = self.filters.read().unwrap()[filter_id].clone();
        let (aggregator, field_type) = filter.aggregate_snapshot()[aggregate_id];
        let version = self.read_tail.load(Ordering::Acquire);
        let t1_block = self.ms_to_block(t1_ms);
        let t2_block = self.ms_to_block(t2_ms);

        let mut acc = aggregator.identity(field_type);
        for (_, leaf) in filter.lookup_range(t1_block, t2_block)? {
            if let Some(v) = leaf.get_aggregate(aggregate_id, version) {
                acc = aggregator.combine_parallel(&acc, &v)?;
            }
        }
        Ok(acc)
    }

    /// One monitor pass (spec.md §4.9's pseudocode, preserved literally):
    /// for every millisecond in the rolling window, for every live trigger
    /// whose periodicity divides that millisecond, look up the owning
    /// filter's bucket at that millisecond directly (valid only at the
    /// default 1ms `time_resolution_ns`, which is what the pseudocode
    /// assumes) and fire an alert if the aggregate crosses threshold.
    fn run_monitor_tick(&self, now_ms: u64) {
        let version = self.read_tail.load(Ordering::Acquire);
        let window_start = now_ms.saturating_sub(self.config.monitor_window_ms);
        let filters = self.filters.read().unwrap().clone();
        let triggers = self.triggers.read().unwrap();
        for (fid, filter) in filters.iter().enumerate() {
            if !filter.is_valid() {
                continue;
            }
            for trig in triggers.iter() {
                if !trig.is_valid() || trig.filter_id != fid || !filter.aggregate_valid(trig.aggregate_id) {
                    continue;
                }
                for ms in window_start..=now_ms {
                    if ms % trig.periodicity_ms != 0 {
                        continue;
                    }
                    if let Err(e) = self.check_bucket(filter, trig, ms, version) {
                        tracing::warn!(multilog = %self.name, trigger = %trig.name, error = %e, "monitor tick failed");
                    }
                }
            }
        }
    }

    fn check_bucket(&self, filter: &Filter, trig: &Trigger, ms: u64, version: u64) -> Result<()> {
        let leaf = match filter.lookup(ms)? {
            Some(l) => l,
            None => return Ok(()),
        };
        let value = match leaf.get_aggregate(trig.aggregate_id, version) {
            Some(v) => v,
            None => return Ok(()),
        };
        if trig.fires(&value)? {
            self.alerts.add(ms, &trig.name, &trig.expr_string(), value, version)?;
            tracing::info!(multilog = %self.name, trigger = %trig.name, ms, value = %value.format(), "trigger fired");
        }
        Ok(())
    }
}

/// A handle to one schema-typed stream of records (spec.md §3/§4.8). Cheap
/// to clone; every clone shares the same underlying log, indexes, filters,
/// triggers, and management queue.
#[derive(Clone)]
pub struct Multilog {
    inner: Arc<Inner>,
}

impl Multilog {
    pub fn new(name: impl Into<String>, fields: Vec<(String, DataType)>, config: EngineConfig) -> Multilog {
        let schema = Schema::new(fields);
        let data_log = DataLog::new(config.linear_block_size, config.max_blocks);
        let alerts = AlertIndex::new(config.radix_depth, config.radix_width);
        let inner = Arc::new(Inner {
            name: name.into(),
            config,
            schema,
            data_log,
            read_tail: AtomicU64::new(0),
            indexes: RwLock::new(Vec::new()),
            index_meta: RwLock::new(Vec::new()),
            filters: RwLock::new(Vec::new()),
            filter_ids: RwLock::new(HashMap::new()),
            triggers: RwLock::new(Vec::new()),
            trigger_ids: RwLock::new(HashMap::new()),
            alerts,
            task_pool: TaskPool::new(),
            monitoring: AtomicBool::new(true),
        });
        Multilog { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn schema_snapshot(&self) -> SchemaSnapshot {
        SchemaSnapshot::of(&self.inner.schema)
    }

    pub fn record_size(&self) -> usize {
        self.inner.schema.record_size
    }

    pub fn tail(&self) -> u64 {
        self.inner.read_tail.load(Ordering::Acquire)
    }

    pub fn append(&self, record_bytes: &[u8]) -> Result<u64> {
        self.inner.append(record_bytes)
    }

    pub fn append_batch(&self, records: &[Vec<u8>]) -> Result<u64> {
        self.inner.append_batch(records)
    }

    pub fn read(&self, offset: u64) -> Result<Vec<u8>> {
        self.inner.read(offset)
    }

    pub fn add_index(&self, field: &str, bucket_size: f64) -> Result<usize> {
        let inner = self.inner.clone();
        let field = field.to_string();
        self.inner.task_pool.submit(move || add_index_sync(&inner, &field, bucket_size))
    }

    pub fn remove_index(&self, field: &str) -> Result<()> {
        let inner = self.inner.clone();
        let field = field.to_string();
        self.inner.task_pool.submit(move || remove_index_sync(&inner, &field))
    }

    pub fn add_filter(&self, name: &str, expr_text: &str) -> Result<usize> {
        let inner = self.inner.clone();
        let (name, expr_text) = (name.to_string(), expr_text.to_string());
        self.inner.task_pool.submit(move || add_filter_sync(&inner, name, expr_text))
    }

    pub fn remove_filter(&self, name: &str) -> Result<()> {
        let inner = self.inner.clone();
        let name = name.to_string();
        self.inner.task_pool.submit(move || remove_filter_sync(&inner, &name))
    }

    pub fn add_aggregate(&self, name: &str, filter_name: &str, agg_expr: &str) -> Result<usize> {
        let inner = self.inner.clone();
        let (name, filter_name, agg_expr) = (name.to_string(), filter_name.to_string(), agg_expr.to_string());
        self.inner.task_pool.submit(move || add_aggregate_sync(&inner, name, filter_name, agg_expr))
    }

    pub fn install_trigger(&self, name: &str, trigger_expr: &str, periodicity_ms: u64) -> Result<usize> {
        let inner = self.inner.clone();
        let (name, trigger_expr) = (name.to_string(), trigger_expr.to_string());
        self.inner
            .task_pool
            .submit(move || install_trigger_sync(&inner, name, trigger_expr, periodicity_ms))
    }

    pub fn execute_filter(&self, expr_text: &str) -> Result<Vec<Vec<u8>>> {
        self.inner.execute_filter(expr_text)
    }

    pub fn query_filter(&self, filter_name: &str, t1_ms: u64, t2_ms: u64, additional_expr: Option<&str>) -> Result<Vec<Vec<u8>>> {
        self.inner.query_filter(filter_name, t1_ms, t2_ms, additional_expr)
    }

    pub fn get_aggregate(&self, agg_name: &str, t1_ms: u64, t2_ms: u64) -> Result<Numeric> {
        self.inner.get_aggregate(agg_name, t1_ms, t2_ms)
    }

    pub fn get_alerts(&self, t1_ms: u64, t2_ms: u64, trigger_name: Option<&str>) -> Result<Vec<Alert>> {
        let mut out = self.inner.alerts.range(t1_ms, t2_ms)?;
        if let Some(name) = trigger_name {
            out.retain(|a| a.trigger_name == name);
        }
        Ok(out)
    }

    /// Runs one monitor pass synchronously (for tests and manual driving).
    pub fn run_monitor_tick(&self, now_ms: u64) {
        self.inner.run_monitor_tick(now_ms);
    }

    /// Spawns a background thread ticking the monitor at `config.monitor_tick_ms`
    /// until [`Multilog::shutdown_monitor`] is called, mirroring the
    /// `while running.load(...) { tick(); sleep() }` shape of
    /// `rpglotd/src/main.rs`'s collector loop.
    pub fn spawn_monitor(&self) -> std::thread::JoinHandle<()> {
        let inner = self.inner.clone();
        let tick_ms = inner.config.monitor_tick_ms;
        std::thread::Builder::new()
            .name("confluo-monitor".into())
            .spawn(move || {
                while inner.monitoring.load(Ordering::Acquire) {
                    std::thread::sleep(std::time::Duration::from_millis(tick_ms));
                    let now_ms = std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .map(|d| d.as_millis() as u64)
                        .unwrap_or(0);
                    inner.run_monitor_tick(now_ms);
                }
            })
            .expect("failed to spawn monitor thread")
    }

    pub fn shutdown_monitor(&self) {
        self.inner.monitoring.store(false, Ordering::Release);
    }

    /// Rebuilds a multilog from a replayed metadata checkpoint (`metadata.rs`),
    /// applying every record in file order against a fresh engine (spec.md
    /// §6: "records are replayed against an empty engine in file order").
    /// Data bytes are not part of the checkpoint; only structure is restored.
    pub fn rebuild(
        name: impl Into<String>,
        config: EngineConfig,
        records: &[crate::metadata::MetadataRecord],
    ) -> Result<Multilog> {
        use crate::metadata::MetadataRecord;

        let schema_columns = records
            .iter()
            .find_map(|r| match r {
                MetadataRecord::Schema { columns } => Some(columns.clone()),
                _ => None,
            })
            .ok_or_else(|| ConfluoError::IllegalState("metadata checkpoint has no SCHEMA record".into()))?;

        let mut fields = Vec::with_capacity(schema_columns.len());
        for (i, (col_name, type_id, type_size)) in schema_columns.into_iter().enumerate() {
            if i == 0 && col_name.eq_ignore_ascii_case(crate::schema::TIMESTAMP_COLUMN) {
                continue;
            }
            fields.push((col_name, DataType::from_id(type_id, type_size)?));
        }

        let log = Multilog::new(name, fields, config);

        for record in records {
            match record {
                MetadataRecord::Schema { .. } => {}
                MetadataRecord::Index { field, bucket_size } => {
                    log.add_index(field, *bucket_size)?;
                }
                MetadataRecord::Filter { name, expr } => {
                    log.add_filter(name, expr)?;
                }
                MetadataRecord::Aggregate { name, filter_name, expr } => {
                    log.add_aggregate(name, filter_name, expr)?;
                }
                MetadataRecord::Trigger { name, expr, periodicity_ms } => {
                    log.install_trigger(name, expr, *periodicity_ms)?;
                }
                // Mode tags are descriptive; the caller's `EngineConfig` already
                // fixes storage mode at construction, and there is no separate
                // archival subsystem to feed here.
                MetadataRecord::StorageMode { .. } | MetadataRecord::ArchivalMode { .. } => {}
            }
        }

        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    fn fields() -> Vec<(String, DataType)> {
        vec![("a".into(), DataType::Bool), ("d".into(), DataType::Long)]
    }

    fn record(ts: u64, a: bool, d: i64) -> Vec<u8> {
        let mut bytes = vec![0u8; 17];
        bytes[0..8].copy_from_slice(&ts.to_ne_bytes());
        bytes[8] = a as u8;
        bytes[9..17].copy_from_slice(&d.to_ne_bytes());
        bytes
    }

    #[test]
    fn append_and_read_round_trip() {
        let m = Multilog::new("t", fields(), EngineConfig::default());
        let off = m.append(&record(0, true, 42)).unwrap();
        assert_eq!(m.read(off).unwrap(), record(0, true, 42));
    }

    #[test]
    fn read_before_commit_is_not_yet_committed() {
        let m = Multilog::new("t", fields(), EngineConfig::default());
        assert!(matches!(m.read(0), Err(ConfluoError::NotYetCommitted { .. })));
    }

    #[test]
    fn filter_and_aggregate_sum_matches_scenario() {
        let m = Multilog::new("t", fields(), EngineConfig::default());
        m.add_filter("f1", "a == true").unwrap();
        m.add_aggregate("agg1", "f1", "SUM(d)").unwrap();
        for (i, (a, d)) in [(false, 0), (true, 2), (false, 4), (true, 6), (false, 8), (true, 10), (false, 12), (true, 14)]
            .into_iter()
            .enumerate()
        {
            m.append(&record(i as u64, a, d)).unwrap();
        }
        assert_eq!(m.get_aggregate("agg1", 0, u64::MAX).unwrap().format(), "32");
    }

    #[test]
    fn index_range_query_matches_scenario() {
        let m = Multilog::new("t", fields(), EngineConfig::default());
        m.add_index("d", 1.0).unwrap();
        for i in 0..8i64 {
            m.append(&record(i as u64, false, i)).unwrap();
        }
        let results = m.execute_filter("d > 4").unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn execute_filter_tries_every_candidate_minterm_for_a_shared_offset() {
        // `d` is indexed; the expression's two OR'd minterms both range over
        // `d`, so a record with `a=false, d=999` is a range-candidate under
        // both `a==true && d==999` and `d>=0`. The first (sorted) minterm's
        // residual test fails on `a`, but the record still satisfies the
        // second minterm and must not be dropped because its offset was
        // already "seen" by the failing first candidate.
        let m = Multilog::new("t", fields(), EngineConfig::default());
        m.add_index("d", 1.0).unwrap();
        m.append(&record(0, false, 999)).unwrap();
        let results = m.execute_filter("(a == true && d == 999) || (d >= 0)").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0], record(0, false, 999));
    }

    #[test]
    fn execute_filter_without_index_still_full_scans() {
        let m = Multilog::new("t", fields(), EngineConfig::default());
        for i in 0..4i64 {
            m.append(&record(i as u64, false, i)).unwrap();
        }
        let results = m.execute_filter("d >= 2").unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn remove_filter_is_idempotent_failure() {
        let m = Multilog::new("t", fields(), EngineConfig::default());
        m.add_filter("f", "a == true").unwrap();
        m.remove_filter("f").unwrap();
        let err = m.remove_filter("f").unwrap_err();
        assert_eq!(err, ConfluoError::ManagementError("Filter f does not exist.".into()));
    }

    #[test]
    fn trigger_fires_and_alerts_dedup() {
        let cfg = EngineConfig { monitor_tick_ms: 1, monitor_window_ms: 1000, ..EngineConfig::default() };
        let m = Multilog::new("t", fields(), cfg);
        m.add_filter("f1", "a == true").unwrap();
        m.add_aggregate("agg1", "f1", "SUM(d)").unwrap();
        m.install_trigger("t1", "agg1 >= 10", 10).unwrap();
        for (i, (a, d)) in [(false, 0), (true, 2), (false, 4), (true, 6), (false, 8), (true, 10), (false, 12), (true, 14)]
            .into_iter()
            .enumerate()
        {
            m.append(&record(i as u64, a, d)).unwrap();
        }
        m.run_monitor_tick(20);
        let alerts = m.get_alerts(0, 1000, Some("t1")).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].value.format(), "32");
        let alerts_again = m.get_alerts(0, 1000, Some("t1")).unwrap();
        assert_eq!(alerts_again.len(), 1);
    }

    #[test]
    fn rebuild_from_metadata_restores_structure_and_results() {
        use crate::metadata::MetadataRecord;
        let records = vec![
            MetadataRecord::Schema {
                columns: vec![
                    ("timestamp".into(), DataType::ULong.type_id(), DataType::ULong.byte_size()),
                    ("a".into(), DataType::Bool.type_id(), DataType::Bool.byte_size()),
                    ("d".into(), DataType::Long.type_id(), DataType::Long.byte_size()),
                ],
            },
            MetadataRecord::Index { field: "d".into(), bucket_size: 1.0 },
            MetadataRecord::Filter { name: "f1".into(), expr: "a == true".into() },
            MetadataRecord::Aggregate { name: "agg1".into(), filter_name: "f1".into(), expr: "SUM(d)".into() },
        ];
        let m = Multilog::rebuild("t", EngineConfig::default(), &records).unwrap();
        assert_eq!(m.record_size(), 17);
        for (i, (a, d)) in [(false, 0), (true, 2), (false, 4), (true, 6)].into_iter().enumerate() {
            m.append(&record(i as u64, a, d)).unwrap();
        }
        assert_eq!(m.get_aggregate("agg1", 0, u64::MAX).unwrap().format(), "8");
        assert_eq!(m.execute_filter("d > 2").unwrap().len(), 2);
    }
}
