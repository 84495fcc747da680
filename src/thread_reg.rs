//! Thread registration.
//!
//! Aggregate updates need a small per-thread integer id so that writers never
//! contend on the same `AggregateList` slot (see `aggregate.rs`). Per the
//! design notes this is an explicitly-initialized module-level singleton,
//! not thread-local storage: a thread calls [`register_thread`] once and
//! [`deregister_thread`] when done, mirroring the way `rpglot-web`'s
//! `state.rs` keeps its connection counters as plain module statics rather
//! than scattering them across call sites.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use crate::error::{ConfluoError, Result};

const DEFAULT_MAX_CONCURRENCY: usize = 256;

struct ThreadRegistry {
    slots: Vec<AtomicBool>,
    max_concurrency: usize,
}

static REGISTRY: OnceLock<ThreadRegistry> = OnceLock::new();

fn registry() -> &'static ThreadRegistry {
    REGISTRY.get_or_init(|| {
        let max_concurrency = DEFAULT_MAX_CONCURRENCY;
        ThreadRegistry {
            slots: (0..max_concurrency).map(|_| AtomicBool::new(false)).collect(),
            max_concurrency,
        }
    })
}

/// Returns the process-wide maximum number of concurrently registered threads.
pub fn get_max_concurrency() -> usize {
    registry().max_concurrency
}

/// Reserves a thread id for the calling thread. Each thread should call this
/// at most once before performing aggregate updates.
pub fn register_thread() -> Result<usize> {
    let reg = registry();
    for (id, slot) in reg.slots.iter().enumerate() {
        if slot
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::trace!(thread_id = id, "registered thread");
            return Ok(id);
        }
    }
    Err(ConfluoError::Overflow(format!(
        "max_concurrency ({}) exceeded",
        reg.max_concurrency
    )))
}

/// Releases a previously registered thread id, making the slot available again.
pub fn deregister_thread(id: usize) {
    if let Some(slot) = registry().slots.get(id) {
        slot.store(false, Ordering::Release);
        tracing::trace!(thread_id = id, "deregistered thread");
    }
}

/// Test/diagnostic helper: how many slots are currently occupied.
#[cfg(test)]
pub fn occupied_count() -> usize {
    registry()
        .slots
        .iter()
        .filter(|s| s.load(Ordering::Acquire))
        .count()
}
