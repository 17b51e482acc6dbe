//! Content store module split into submodules:
//! - read.rs: constructors, lock-free read path (get/get_live), pins, diagnostics.
//! - write.rs: WriteSession (single writer, one generation per session, commit/rollback).
//! - snapshot.rs: Snapshot (per-consumer pin of a shared GenHandle).
//! - collect.rs: scavenger pass (collect/try_collect), collect triggers (never on the caller's thread).
//!
//! Layout:
//! - heads: DashMap<K, Link<V>>: key -> newest VersionNode. A shard write lock is the
//!   per-key lock taken by the writer and the scavenger; readers only clone the head
//!   Arc and walk the chain without locks.
//! - table: GenTable: generations and pinned records.

mod collect;
mod read;
mod snapshot;
mod write;

pub use collect::CollectReport;
pub use read::StoreStats;
pub use snapshot::Snapshot;
pub use write::WriteSession;

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::chain::Link;
use crate::config::CacheConfig;
use crate::generation::GenTable;
use crate::scavenger::Signal;

pub(crate) struct Shared<K, V> {
    pub(crate) heads: DashMap<K, Link<V>>,
    pub(crate) table: GenTable,
    // Single writer. Held by WriteSession for its whole lifetime.
    pub(crate) writer: Mutex<()>,
    // One collect pass at a time.
    pub(crate) collecting: Mutex<()>,
    // A one-shot collect thread is queued or running.
    pub(crate) collect_pending: AtomicBool,
    pub(crate) writes_since_collect: AtomicU64,
    // Attached background scavenger, if any.
    pub(crate) scavenger: Mutex<Option<Sender<Signal>>>,
    pub(crate) cfg: CacheConfig,
}

/// Generational multi-version key/value store.
///
/// Cheap to clone: all clones share the same state.
pub struct ContentStore<K, V> {
    pub(crate) shared: Arc<Shared<K, V>>,
}

impl<K, V> Clone for ContentStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}
