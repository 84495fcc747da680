//! Thin helpers over `std::sync::atomic`, named after the classic
//! lock-free primitives (`faa`, `cas`) so call sites read close to
//! textbook pseudocode, rather than spelling out
//! `fetch_add`/`compare_exchange` orderings at every use.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Fetch-and-add: returns the value *before* the add, like `faa` in the
/// component design pseudocode.
#[inline]
pub fn faa_u64(a: &AtomicU64, delta: u64) -> u64 {
    a.fetch_add(delta, Ordering::SeqCst)
}

#[inline]
pub fn faa_usize(a: &AtomicUsize, delta: usize) -> usize {
    a.fetch_add(delta, Ordering::SeqCst)
}

/// Acquire-ordered load, the ordering `size()` uses to observe the tail.
#[inline]
pub fn load_acquire_u64(a: &AtomicU64) -> u64 {
    a.load(Ordering::Acquire)
}

#[inline]
pub fn store_release_u64(a: &AtomicU64, v: u64) {
    a.store(v, Ordering::Release)
}

/// One CAS attempt; `Ok(())` on success, `Err(current)` on failure.
#[inline]
pub fn cas_u64(a: &AtomicU64, current: u64, new: u64) -> Result<u64, u64> {
    a.compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
}

/// Advance `tail` to `max(tail, candidate)` via CAS-retry, the pattern used
/// by the read tail (`read_tail.h`'s `advance`) and by monotone counters
/// elsewhere in the engine.
#[inline]
pub fn advance_max_u64(a: &AtomicU64, candidate: u64) {
    let mut cur = a.load(Ordering::Acquire);
    while candidate > cur {
        match a.compare_exchange_weak(cur, candidate, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return,
            Err(observed) => cur = observed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faa_returns_previous_value() {
        let a = AtomicU64::new(5);
        assert_eq!(faa_u64(&a, 3), 5);
        assert_eq!(a.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn advance_max_only_moves_forward() {
        let a = AtomicU64::new(10);
        advance_max_u64(&a, 5);
        assert_eq!(a.load(Ordering::SeqCst), 10);
        advance_max_u64(&a, 20);
        assert_eq!(a.load(Ordering::SeqCst), 20);
    }
}
