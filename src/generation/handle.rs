//! Generation records and shared generation handles.
//!
//! - GenRecord: one per pinned generation, owned by the GenTable.
//!   Holds the live reader counter and a Weak back-reference to the current handle.
//! - GenHandle: shared by every snapshot of the same generation. Its lifetime is the
//!   signal: once the last Arc<GenHandle> is dropped, the weak reference in the record
//!   dies and the next collect may reclaim the record.
//!
//! Drop of GenHandle does not touch the table: the scavenger observes it through Weak.

use log::debug;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};

use crate::metrics::{record_handle_created, record_handle_released};

pub struct GenRecord {
    gen: i64,
    live_readers: AtomicI64,
    handle: Mutex<Weak<GenHandle>>,
}

impl GenRecord {
    pub(crate) fn new(gen: i64) -> Arc<Self> {
        Arc::new(Self {
            gen,
            live_readers: AtomicI64::new(0),
            handle: Mutex::new(Weak::new()),
        })
    }

    pub fn gen(&self) -> i64 {
        self.gen
    }

    pub fn live_readers(&self) -> i64 {
        self.live_readers.load(Ordering::Acquire)
    }

    /// +1 reader; returns the new count.
    pub(crate) fn reference(&self) -> i64 {
        self.live_readers.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// -1 reader; returns the new count.
    pub(crate) fn release(&self) -> i64 {
        let left = self.live_readers.fetch_sub(1, Ordering::AcqRel) - 1;
        debug_assert!(left >= 0, "generation {} released more than referenced", self.gen);
        left
    }

    /// Is any handle for this generation still reachable?
    pub fn handle_alive(&self) -> bool {
        self.handle.lock().strong_count() > 0
    }

    /// Live = somebody reads it right now or somebody still holds the handle.
    /// The record is collectible only when both are gone.
    pub fn is_live(&self) -> bool {
        self.live_readers() > 0 || self.handle_alive()
    }

    /// Shared handle for this generation: reuse the cached one, or create a fresh
    /// handle if every previous holder is gone.
    pub(crate) fn handle(self: &Arc<Self>) -> Arc<GenHandle> {
        let mut slot = self.handle.lock();
        if let Some(h) = slot.upgrade() {
            return h;
        }
        let h = Arc::new(GenHandle {
            record: Arc::clone(self),
        });
        *slot = Arc::downgrade(&h);
        record_handle_created();
        debug!("generation {}: new handle", self.gen);
        h
    }
}

impl fmt::Debug for GenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenRecord")
            .field("gen", &self.gen)
            .field("live_readers", &self.live_readers())
            .field("handle_alive", &self.handle_alive())
            .finish()
    }
}

/// Token for "generation N is still being read by someone".
pub struct GenHandle {
    record: Arc<GenRecord>,
}

impl GenHandle {
    pub fn gen(&self) -> i64 {
        self.record.gen
    }

    pub fn record(&self) -> &Arc<GenRecord> {
        &self.record
    }

    pub fn live_readers(&self) -> i64 {
        self.record.live_readers()
    }
}

impl Drop for GenHandle {
    fn drop(&mut self) {
        record_handle_released();
        debug!("generation {}: handle released", self.record.gen);
    }
}

impl fmt::Debug for GenHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenHandle")
            .field("gen", &self.record.gen)
            .field("live_readers", &self.record.live_readers())
            .finish()
    }
}
