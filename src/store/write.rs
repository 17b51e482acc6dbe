//! WriteSession: the single writer.
//!
//! Open: take the writer mutex, open a new generation (GenTable::begin_generation).
//! Every set/delete inside the session writes that generation:
//! - head of an older generation -> prepend a new node (old head stays reachable via next);
//! - head of this generation     -> overwrite its value in place (no reader can see it yet);
//!   a tombstone on such a head without older versions removes the key.
//! Commit: publish the generation to readers.
//! Drop without commit = rollback: unlink every head of this generation, the generation
//! number stays burned (aliases the previous committed state).

use dashmap::mapref::entry::Entry;
use log::{debug, warn};
use parking_lot::MutexGuard;
use std::hash::Hash;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::ContentStore;
use crate::chain::{self, VersionNode};
use crate::metrics::{
    record_depth_valve_trim, record_rollback, record_write, record_write_session,
};

pub struct WriteSession<'a, K, V>
where
    K: Eq + Hash + Clone,
{
    store: &'a ContentStore<K, V>,
    _lock: MutexGuard<'a, ()>,
    gen: i64,
    // Keys whose head may belong to this generation (rollback list).
    touched: Vec<K>,
    writes: u64,
    finished: bool,
}

impl<K, V> ContentStore<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Open a write session; blocks while another session is open.
    pub fn write(&self) -> WriteSession<'_, K, V> {
        let lock = self.shared.writer.lock();
        WriteSession::open(self, lock)
    }

    /// Open a write session unless another one is open right now.
    pub fn try_write(&self) -> Option<WriteSession<'_, K, V>> {
        let lock = self.shared.writer.try_lock()?;
        Some(WriteSession::open(self, lock))
    }
}

impl<K, V> ContentStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// One-shot session: set `key` and commit. Returns the committed generation.
    pub fn set(&self, key: K, value: V) -> i64 {
        let mut w = self.write();
        w.set(key, value);
        w.commit()
    }

    /// One-shot session: delete `key` (tombstone) and commit.
    pub fn delete(&self, key: K) -> i64 {
        let mut w = self.write();
        w.delete(key);
        w.commit()
    }
}

impl<'a, K, V> WriteSession<'a, K, V>
where
    K: Eq + Hash + Clone,
{
    fn open(store: &'a ContentStore<K, V>, lock: MutexGuard<'a, ()>) -> Self {
        let gen = store.shared.table.begin_generation();
        record_write_session();
        debug!("write session: open generation {}", gen);
        Self {
            store,
            _lock: lock,
            gen,
            touched: Vec::new(),
            writes: 0,
            finished: false,
        }
    }

    /// Generation written by this session.
    pub fn gen(&self) -> i64 {
        self.gen
    }

    /// Number of set/delete calls so far.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn set(&mut self, key: K, value: V) {
        self.set_value(key, Some(Arc::new(value)));
    }

    /// Write an already shared value.
    pub fn set_arc(&mut self, key: K, value: Arc<V>) {
        self.set_value(key, Some(value));
    }

    /// Tombstone: readers at this generation and later see the key as absent.
    pub fn delete(&mut self, key: K) {
        self.set_value(key, None);
    }

    /// Core write: `None` is a tombstone.
    pub fn set_value(&mut self, key: K, value: Option<Arc<V>>) {
        record_write();
        self.writes += 1;
        let gen = self.gen;
        let max_depth = self.store.shared.cfg.max_chain_depth;

        // entry() holds the shard write lock: per-key exclusion with the scavenger.
        match self.store.shared.heads.entry(key.clone()) {
            Entry::Occupied(mut e) => {
                if e.get().gen() == gen {
                    if value.is_none() && !e.get().has_next() {
                        e.remove();
                    } else {
                        e.get().set_value(value);
                    }
                    return;
                }
                // Tombstone over tombstone changes nothing.
                if value.is_none() && e.get().is_tombstone() {
                    return;
                }
                let prev = Arc::clone(e.get());
                // The new node takes one slot of the cap. Only the committed chain
                // below it is cut, and at least its head survives.
                let cut = match max_depth {
                    0 => 0,
                    max => chain::trim_to_depth(&prev, max.saturating_sub(1).max(1)),
                };
                let node = Arc::new(VersionNode::new(value, gen, Some(prev)));
                e.insert(node);
                if cut > 0 {
                    record_depth_valve_trim(cut);
                    warn!(
                        "depth valve: dropped {} old version(s) of a key at generation {} (max_chain_depth={})",
                        cut, gen, max_depth
                    );
                }
            }
            Entry::Vacant(e) => {
                if value.is_none() {
                    return;
                }
                e.insert(Arc::new(VersionNode::new(value, gen, None)));
            }
        }
        self.touched.push(key);
    }

    /// Tombstone every key present in the store.
    pub fn clear(&mut self) {
        let keys: Vec<K> = self
            .store
            .shared
            .heads
            .iter()
            .map(|e| e.key().clone())
            .collect();
        for k in keys {
            self.delete(k);
        }
    }

    /// Newest value as seen by this session (includes its own writes).
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.store.get_live(key)
    }

    /// Abort explicitly (same as dropping the session).
    pub fn rollback(mut self) {
        self.rollback_in_place();
    }

    fn rollback_in_place(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let gen = self.gen;
        let heads = &self.store.shared.heads;
        // Heads first, table last: a reader pinning the burned generation must
        // already see the restored chains.
        for key in self.touched.drain(..) {
            if let Entry::Occupied(mut e) = heads.entry(key) {
                if e.get().gen() == gen {
                    match e.get().advance() {
                        Some(prev) => {
                            e.insert(prev);
                        }
                        None => {
                            e.remove();
                        }
                    }
                }
            }
        }
        self.store.shared.table.abort_generation();
        record_rollback();
        debug!("write session: rolled back generation {}", gen);
    }
}

impl<'a, K, V> WriteSession<'a, K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Publish the generation. Returns it.
    pub fn commit(mut self) -> i64 {
        self.finished = true;
        self.store.shared.table.commit_generation();
        let gen = self.gen;
        let writes = self.writes;
        let store = self.store;
        debug!("write session: committed generation {} ({} write(s))", gen, writes);
        // Release the writer mutex before requesting a collect.
        drop(self);

        let total = store
            .shared
            .writes_since_collect
            .fetch_add(writes, Ordering::Relaxed)
            + writes;
        let every = store.shared.cfg.collect_every_writes;
        if every > 0 && total >= every {
            store.request_collect();
        }
        gen
    }
}

impl<'a, K, V> Drop for WriteSession<'a, K, V>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        self.rollback_in_place();
    }
}
