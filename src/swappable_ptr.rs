//! Swappable pointer: an owned `T` that can be hot-swapped for a new `T`
//! while readers hold copies, without blocking either side.
//!
//! Each `swap` publishes a freshly allocated bookkeeping `Slot` (payload
//! pointer + reader count) and never reuses one: a slot that stops being
//! `current` is retired in place and its `count` drained by whichever side
//! (owner or reader) releases it last, at which point only its *payload* is
//! freed. The `Slot` itself is deliberately leaked — a few bytes of
//! bookkeeping per swap, forever — so that `current` can always be
//! dereferenced safely no matter how many generations back a reader loaded
//! from, the same way the old two-slot scheme relied on its refcount array
//! never being freed. This is the two-counter idea the aggregate cell array
//! needs for archival re-encoding (`SPEC_FULL.md` §4.2): "readers that
//! loaded before a swap" and "readers that loaded after" each keep their own
//! generation alive, except here there can be more than two generations
//! live at once, since a reader may be held across arbitrarily many swaps.

use std::ops::Deref;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};

struct Slot<T> {
    payload: AtomicPtr<T>,
    count: AtomicU32,
}

pub struct SwappablePtr<T> {
    current: AtomicPtr<Slot<T>>,
}

unsafe impl<T: Send + Sync> Send for SwappablePtr<T> {}
unsafe impl<T: Send + Sync> Sync for SwappablePtr<T> {}

impl<T> SwappablePtr<T> {
    pub fn new(value: T) -> Self {
        let slot = Box::new(Slot { payload: AtomicPtr::new(Box::into_raw(Box::new(value))), count: AtomicU32::new(1) });
        SwappablePtr { current: AtomicPtr::new(Box::leak(slot)) }
    }

    /// Alias for `new`, matching the component design's `atomic_init` name.
    pub fn atomic_init(value: T) -> Self {
        Self::new(value)
    }

    /// Alias for `atomic_copy`, matching the component design's `atomic_load` name.
    pub fn atomic_load(&self) -> ReadOnly<'_, T> {
        self.atomic_copy()
    }

    /// Returns a handle to the current value, bumping its generation's reader count.
    pub fn atomic_copy(&self) -> ReadOnly<'_, T> {
        loop {
            let slot_ptr = self.current.load(Ordering::Acquire);
            let slot = unsafe { &*slot_ptr };
            slot.count.fetch_add(1, Ordering::AcqRel);
            let ptr = slot.payload.load(Ordering::Acquire);
            if ptr.is_null() {
                // Raced a swap that retired and already freed this
                // generation's payload; back off our speculative count and
                // retry against whatever is current now.
                self.release(slot_ptr);
                continue;
            }
            return ReadOnly { owner: self, slot: slot_ptr, ptr };
        }
    }

    /// Publishes `new_value` as a brand new generation, retiring the
    /// previous one once its last reader (owner or otherwise) drops.
    pub fn swap(&self, new_value: T) {
        let new_slot = Box::new(Slot { payload: AtomicPtr::new(Box::into_raw(Box::new(new_value))), count: AtomicU32::new(1) });
        let new_ptr = Box::leak(new_slot) as *mut Slot<T>;
        let old_ptr = self.current.swap(new_ptr, Ordering::AcqRel);
        self.release(old_ptr);
    }

    fn release(&self, slot_ptr: *mut Slot<T>) {
        let slot = unsafe { &*slot_ptr };
        let prev = slot.count.fetch_sub(1, Ordering::AcqRel);
        if prev == 1 && self.current.load(Ordering::Acquire) != slot_ptr {
            let ptr = slot.payload.swap(ptr::null_mut(), Ordering::AcqRel);
            if !ptr.is_null() {
                unsafe { drop(Box::from_raw(ptr)) };
            }
        }
    }
}

impl<T> Drop for SwappablePtr<T> {
    fn drop(&mut self) {
        let slot_ptr = *self.current.get_mut();
        let slot = unsafe { &*slot_ptr };
        let ptr = *slot.payload.get_mut();
        if !ptr.is_null() {
            unsafe { drop(Box::from_raw(ptr)) };
        }
        // `slot` itself is an intentionally leaked bookkeeping node (see `swap`).
    }
}

/// A reader's handle to a [`SwappablePtr`]'s value at the moment it was loaded.
pub struct ReadOnly<'a, T> {
    owner: &'a SwappablePtr<T>,
    slot: *mut Slot<T>,
    ptr: *mut T,
}

impl<'a, T> Deref for ReadOnly<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.ptr }
    }
}

impl<'a, T> Drop for ReadOnly<'a, T> {
    fn drop(&mut self) {
        self.owner.release(self.slot);
    }
}
