use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use super::ContentStore;
use crate::generation::GenHandle;
use crate::metrics::{record_snapshot_close, record_snapshot_open};

/// Read-only view of the store "as of generation N".
///
/// Every snapshot counts as one live reader of its generation; all snapshots of
/// the same generation share one `GenHandle`. Dropping (or `release`) gives the
/// reader back; once the last one is gone the generation becomes collectible.
pub struct Snapshot<K, V>
where
    K: Eq + Hash + Clone,
{
    store: ContentStore<K, V>,
    handle: Arc<GenHandle>,
}

impl<K, V> Snapshot<K, V>
where
    K: Eq + Hash + Clone,
{
    /// `handle` must already carry the reader reference for this snapshot.
    pub(crate) fn from_pinned(store: ContentStore<K, V>, handle: Arc<GenHandle>) -> Self {
        Self { store, handle }
    }

    /// Pinned generation.
    pub fn gen(&self) -> i64 {
        self.handle.gen()
    }

    pub fn handle(&self) -> &Arc<GenHandle> {
        &self.handle
    }

    /// Value of `key` at the pinned generation.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.store.get_at(key, self.gen())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Every (key, value) visible at the pinned generation, in no particular order.
    pub fn get_all(&self) -> Vec<(K, Arc<V>)> {
        self.store.all_at(self.gen())
    }

    pub fn keys(&self) -> Vec<K> {
        self.get_all().into_iter().map(|(k, _)| k).collect()
    }

    /// No key has a value at the pinned generation.
    pub fn is_empty(&self) -> bool {
        self.store
            .heads_snapshot()
            .iter()
            .all(|(_, head)| match crate::chain::visible_at(head, self.gen()) {
                Some(n) => n.is_tombstone(),
                None => true,
            })
    }

    /// Give the pin back now instead of at scope end.
    pub fn release(self) {
        drop(self);
    }
}

impl<K, V> Clone for Snapshot<K, V>
where
    K: Eq + Hash + Clone,
{
    fn clone(&self) -> Self {
        // We hold a reader already, so the record cannot be reclaimed concurrently.
        self.handle.record().reference();
        record_snapshot_open();
        Self {
            store: self.store.clone(),
            handle: Arc::clone(&self.handle),
        }
    }
}

impl<K, V> Drop for Snapshot<K, V>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        self.handle.record().release();
        record_snapshot_close();
    }
}

impl<K, V> fmt::Debug for Snapshot<K, V>
where
    K: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("gen", &self.gen())
            .field("readers", &self.handle.live_readers())
            .finish()
    }
}
