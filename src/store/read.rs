use anyhow::Result;
use dashmap::DashMap;
use log::debug;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;

use super::{ContentStore, Shared, Snapshot};
use crate::chain::{self, Link, VersionNode};
use crate::config::CacheConfig;
use crate::generation::GenTable;
use crate::metrics::record_read;

/// Point-in-time counters of one store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub live_gen: i64,
    pub committed_gen: i64,
    pub floor_gen: i64,
    pub gen_count: usize,
    pub snap_count: i64,
    pub keys: usize,
    pub nodes: usize,
    pub max_depth: usize,
}

impl<K, V> ContentStore<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Empty store configured from env (GENCACHE_*).
    pub fn new() -> Self {
        Self::with_config(CacheConfig::from_env())
    }

    pub fn with_config(cfg: CacheConfig) -> Self {
        debug!("content store: {}", cfg);
        Self {
            shared: Arc::new(Shared {
                heads: DashMap::new(),
                table: GenTable::new(),
                writer: Mutex::new(()),
                collecting: Mutex::new(()),
                collect_pending: AtomicBool::new(false),
                writes_since_collect: AtomicU64::new(0),
                scavenger: Mutex::new(None),
                cfg,
            }),
        }
    }

    /// Store whose generation 0 holds `items`. Later duplicates win.
    pub fn with_baseline<I>(cfg: CacheConfig, items: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let store = Self::with_config(cfg);
        let mut n = 0usize;
        for (k, v) in items {
            store
                .shared
                .heads
                .insert(k, Arc::new(VersionNode::new(Some(Arc::new(v)), 0, None)));
            n += 1;
        }
        debug!("content store: baseline loaded {} item(s) at generation 0", n);
        store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.shared.cfg
    }

    pub fn table(&self) -> &GenTable {
        &self.shared.table
    }

    pub fn live_gen(&self) -> i64 {
        self.shared.table.live_gen()
    }

    pub fn committed_gen(&self) -> i64 {
        self.shared.table.committed_gen()
    }

    pub fn floor_gen(&self) -> i64 {
        self.shared.table.floor_gen()
    }

    pub fn min_live_generation(&self) -> i64 {
        self.shared.table.min_live_generation()
    }

    // ----------------- pins -----------------

    /// Pin an explicit generation. Fails for generations not committed yet and for
    /// generations older than the minimum live one.
    pub fn pin_at(&self, gen: i64) -> Result<Snapshot<K, V>> {
        let handle = self.shared.table.pin_at(gen)?;
        Ok(Snapshot::from_pinned(self.clone(), handle))
    }

    // ----------------- reads -----------------

    /// Value of `key` as seen by `snapshot`.
    pub fn get(&self, key: &K, snapshot: &Snapshot<K, V>) -> Option<Arc<V>> {
        self.get_at(key, snapshot.gen())
    }

    // Newest version not newer than `gen`. Only for generations pinned by a Snapshot.
    pub(crate) fn get_at(&self, key: &K, gen: i64) -> Option<Arc<V>> {
        record_read();
        let head = self.head(key)?;
        chain::visible_at(&head, gen)?.read()
    }

    /// Newest value including writes of an open session.
    pub fn get_live(&self, key: &K) -> Option<Arc<V>> {
        record_read();
        self.head(key)?.read()
    }

    pub(crate) fn head(&self, key: &K) -> Option<Link<V>> {
        self.shared.heads.get(key).map(|e| Arc::clone(e.value()))
    }

    // Copy of all heads, taken shard by shard; chains are walked outside map locks.
    pub(crate) fn heads_snapshot(&self) -> Vec<(K, Link<V>)> {
        self.shared
            .heads
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect()
    }

    pub(crate) fn all_at(&self, gen: i64) -> Vec<(K, Arc<V>)> {
        self.heads_snapshot()
            .into_iter()
            .filter_map(|(k, head)| {
                chain::visible_at(&head, gen)
                    .and_then(|n| n.read())
                    .map(|v| (k, v))
            })
            .collect()
    }

    // ----------------- diagnostics -----------------

    /// Keys in the map, including tombstone heads not collected yet.
    pub fn len(&self) -> usize {
        self.shared.heads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.heads.is_empty()
    }

    pub fn gen_count(&self) -> usize {
        self.shared.table.gen_count()
    }

    pub fn snap_count(&self) -> i64 {
        self.shared.table.snap_count()
    }

    /// Retained versions of `key`, newest first (empty if the key is absent).
    pub fn versions(&self, key: &K) -> Vec<(i64, Option<Arc<V>>)> {
        self.head(key)
            .map(|h| chain::versions(&h))
            .unwrap_or_default()
    }

    pub fn stats(&self) -> StoreStats {
        let heads = self.heads_snapshot();
        let mut nodes = 0usize;
        let mut max_depth = 0usize;
        for (_, head) in &heads {
            let d = chain::depth(head);
            nodes += d;
            max_depth = max_depth.max(d);
        }
        StoreStats {
            live_gen: self.shared.table.live_gen(),
            committed_gen: self.shared.table.committed_gen(),
            floor_gen: self.shared.table.floor_gen(),
            gen_count: self.shared.table.gen_count(),
            snap_count: self.shared.table.snap_count(),
            keys: heads.len(),
            nodes,
            max_depth,
        }
    }
}

impl<K, V> ContentStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Pin the newest committed generation for the lifetime of the returned snapshot.
    /// May request a collect; the pass never runs on this thread.
    pub fn pin(&self) -> Snapshot<K, V> {
        let handle = self.shared.table.pin();
        let snap = Snapshot::from_pinned(self.clone(), handle);
        let cfg = &self.shared.cfg;
        if cfg.collect_auto && self.shared.table.needs_collect(cfg.collect_min_gen_delta) {
            self.request_collect();
        }
        snap
    }
}

impl<K, V> Default for ContentStore<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for ContentStore<K, V>
where
    K: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentStore")
            .field("live_gen", &self.live_gen())
            .field("floor_gen", &self.floor_gen())
            .field("keys", &self.len())
            .finish()
    }
}
