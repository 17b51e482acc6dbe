//! Generation table: process-wide source of truth for generations.
//!
//! State (under one short mutex, never held while walking chains):
//! - live_gen: last generation handed to the writer (monotonic, never reused).
//! - writing: a write session owns live_gen right now; readers get live_gen - 1.
//! - floor_gen: min live generation observed by the last collect (monotonic).
//! - records: gen -> GenRecord for every generation somebody pinned and that was not
//!   reclaimed yet (ordered, oldest first).
//!
//! Pin rules:
//! - pin() always succeeds: it pins the newest committed generation.
//! - pin_at(g) fails for g > committed (causality error) and for g older than the
//!   minimum live generation (its versions may already be trimmed).

use anyhow::{anyhow, Result};
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::handle::{GenHandle, GenRecord};
use crate::metrics::{record_generation_created, record_pin, record_snapshot_open};

#[derive(Debug)]
struct TableState {
    live_gen: i64,
    writing: bool,
    floor_gen: i64,
    records: BTreeMap<i64, Arc<GenRecord>>,
}

impl TableState {
    #[inline]
    fn committed(&self) -> i64 {
        if self.writing {
            self.live_gen - 1
        } else {
            self.live_gen
        }
    }

    fn min_live(&self) -> i64 {
        self.records
            .values()
            .find(|r| r.is_live())
            .map(|r| r.gen())
            .unwrap_or_else(|| self.committed())
    }

    /// Pin `gen` (caller validated it): shared handle + one more reader.
    fn pin_locked(&mut self, gen: i64) -> Arc<GenHandle> {
        let record = self
            .records
            .entry(gen)
            .or_insert_with(|| GenRecord::new(gen));
        let handle = record.handle();
        record.reference();
        record_pin();
        record_snapshot_open();
        handle
    }
}

#[derive(Debug)]
pub struct GenTable {
    state: Mutex<TableState>,
}

impl Default for GenTable {
    fn default() -> Self {
        Self::new()
    }
}

impl GenTable {
    /// Fresh table at generation 0 (the baseline generation).
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TableState {
                live_gen: 0,
                writing: false,
                floor_gen: 0,
                records: BTreeMap::new(),
            }),
        }
    }

    /// Last generation handed to the writer (may be in progress).
    pub fn live_gen(&self) -> i64 {
        self.state.lock().live_gen
    }

    /// Newest generation a reader may pin.
    pub fn committed_gen(&self) -> i64 {
        self.state.lock().committed()
    }

    pub fn floor_gen(&self) -> i64 {
        self.state.lock().floor_gen
    }

    pub fn is_writing(&self) -> bool {
        self.state.lock().writing
    }

    /// Writer-only: open a new generation. Fails if one is already open
    /// (the store's writer mutex prevents this by construction).
    pub fn new_generation(&self) -> Result<i64> {
        let mut st = self.state.lock();
        if st.writing {
            return Err(anyhow!(
                "generation {} is still open: one writer at a time",
                st.live_gen
            ));
        }
        st.live_gen += 1;
        st.writing = true;
        record_generation_created();
        Ok(st.live_gen)
    }

    /// Writer-only, called with the store's writer mutex held. A generation left
    /// open is superseded: it was never published, so readers never saw it.
    pub(crate) fn begin_generation(&self) -> i64 {
        let mut st = self.state.lock();
        debug_assert!(
            !st.writing,
            "generation {} is still open: one writer at a time",
            st.live_gen
        );
        if st.writing {
            warn!(
                "generation table: generation {} still open, superseding it",
                st.live_gen
            );
        }
        st.live_gen += 1;
        st.writing = true;
        record_generation_created();
        st.live_gen
    }

    /// Publish the open generation to readers.
    pub(crate) fn commit_generation(&self) {
        let mut st = self.state.lock();
        st.writing = false;
    }

    /// Abort the open generation. Its number stays burned: it becomes an alias
    /// of the previous committed state once the writer unlinked its nodes.
    pub(crate) fn abort_generation(&self) {
        let mut st = self.state.lock();
        st.writing = false;
    }

    /// Smallest generation still held by a live handle; the committed generation
    /// when nobody reads anything (everything older is collectible).
    pub fn min_live_generation(&self) -> i64 {
        self.state.lock().min_live()
    }

    /// Pin the newest committed generation.
    pub fn pin(&self) -> Arc<GenHandle> {
        let mut st = self.state.lock();
        let gen = st.committed();
        st.pin_locked(gen)
    }

    /// Pin an explicit generation.
    pub fn pin_at(&self, gen: i64) -> Result<Arc<GenHandle>> {
        let mut st = self.state.lock();
        let committed = st.committed();
        if gen > committed {
            return Err(anyhow!(
                "cannot pin future generation {} (newest committed is {})",
                gen,
                committed
            ));
        }
        let min_live = st.min_live();
        if gen < min_live {
            return Err(anyhow!(
                "generation already collected: {} is older than min live generation {}",
                gen,
                min_live
            ));
        }
        Ok(st.pin_locked(gen))
    }

    /// Explicit +1 reader on an existing generation record.
    pub fn reference(&self, gen: i64) -> Result<i64> {
        let st = self.state.lock();
        let rec = st
            .records
            .get(&gen)
            .ok_or_else(|| anyhow!("no record for generation {}", gen))?;
        Ok(rec.reference())
    }

    /// Explicit -1 reader on an existing generation record.
    pub fn release(&self, gen: i64) -> Result<i64> {
        let st = self.state.lock();
        let rec = st
            .records
            .get(&gen)
            .ok_or_else(|| anyhow!("no record for generation {}", gen))?;
        if rec.live_readers() <= 0 {
            return Err(anyhow!("generation {} has no readers to release", gen));
        }
        Ok(rec.release())
    }

    /// Scavenger step: drop dead records from the front (oldest first, stop at the
    /// first live one) and move the floor to the min live generation.
    pub(crate) fn advance_floor(&self) -> i64 {
        let mut st = self.state.lock();
        let mut dropped = 0usize;
        while let Some(entry) = st.records.first_entry() {
            if entry.get().is_live() {
                break;
            }
            entry.remove();
            dropped += 1;
        }
        let floor = st.min_live();
        debug_assert!(floor >= st.floor_gen, "floor must not go back");
        st.floor_gen = st.floor_gen.max(floor);
        if dropped > 0 {
            debug!(
                "generation table: reclaimed {} record(s), floor_gen={}",
                dropped, st.floor_gen
            );
        }
        st.floor_gen
    }

    /// Generation distance that makes a pin request a collect.
    pub(crate) fn needs_collect(&self, min_gen_delta: i64) -> bool {
        let st = self.state.lock();
        st.live_gen - st.floor_gen > min_gen_delta
    }

    /// Generation records not reclaimed yet.
    pub fn gen_count(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Sum of live readers across records.
    pub fn snap_count(&self) -> i64 {
        self.state
            .lock()
            .records
            .values()
            .map(|r| r.live_readers())
            .sum()
    }
}
