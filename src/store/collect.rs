//! Scavenger pass.
//!
//! 1) GenTable::advance_floor(): reclaim dead generation records, floor := min live gen.
//! 2) For every key (under its shard write lock, one key at a time):
//!    - tombstone head with nothing older and already committed -> remove the key;
//!    - tombstone head at or below the floor -> remove the key (every live reader sees it absent);
//!    - otherwise keep nodes newer than the floor plus the newest one at or below it,
//!      detach everything older.
//!
//! Readers are never blocked: they keep walking whatever chain they already hold.
//!
//! Triggers (pin / commit) go through request_collect(): the attached scavenger gets a
//! signal, otherwise a one-shot "gencache-collect" thread runs the pass. At most one
//! such thread is queued per store.

use log::{debug, info, warn};
use serde::Serialize;
use std::hash::Hash;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use super::ContentStore;
use crate::chain;
use crate::metrics::record_collect_run;
use crate::scavenger::Signal;

/// Outcome of one collect pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectReport {
    pub floor_gen: i64,
    pub keys_scanned: usize,
    pub keys_removed: usize,
    pub nodes_trimmed: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl CollectReport {
    pub fn reclaimed_anything(&self) -> bool {
        self.keys_removed > 0 || self.nodes_trimmed > 0
    }
}

impl<K, V> ContentStore<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Run a collect pass now; waits for a pass already in progress.
    pub fn collect(&self) -> CollectReport {
        let _guard = self.shared.collecting.lock();
        self.collect_locked()
    }

    /// Run a collect pass unless one is already running.
    pub fn try_collect(&self) -> Option<CollectReport> {
        let _guard = self.shared.collecting.try_lock()?;
        Some(self.collect_locked())
    }

    fn collect_locked(&self) -> CollectReport {
        let t0 = Instant::now();
        self.shared.writes_since_collect.store(0, Ordering::Relaxed);

        let floor = self.shared.table.advance_floor();
        let committed = self.shared.table.committed_gen();

        let keys: Vec<K> = self
            .shared
            .heads
            .iter()
            .map(|e| e.key().clone())
            .collect();

        let mut report = CollectReport {
            floor_gen: floor,
            keys_scanned: keys.len(),
            ..Default::default()
        };

        for key in keys {
            let removed = self.shared.heads.remove_if(&key, |_, head| {
                head.is_tombstone()
                    && ((!head.has_next() && head.gen() <= committed) || head.gen() <= floor)
            });
            if let Some((_, head)) = removed {
                report.nodes_trimmed += chain::depth(&head);
                report.keys_removed += 1;
                head.clear();
                continue;
            }
            if let Some(head) = self.shared.heads.get_mut(&key) {
                report.nodes_trimmed += chain::trim_below(head.value(), floor);
            }
        }

        report.elapsed = t0.elapsed();
        record_collect_run(report.nodes_trimmed, report.keys_removed);
        if report.reclaimed_anything() {
            info!(
                "collect: floor_gen={} scanned={} removed_keys={} trimmed_nodes={} in {:?}",
                report.floor_gen,
                report.keys_scanned,
                report.keys_removed,
                report.nodes_trimmed,
                report.elapsed
            );
        } else {
            debug!(
                "collect: floor_gen={} scanned={} nothing to reclaim",
                report.floor_gen, report.keys_scanned
            );
        }
        report
    }
}

impl<K, V> ContentStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Non-blocking trigger: wake the attached scavenger, or hand the pass to a
    /// one-shot background thread. Returns at once either way.
    pub(crate) fn request_collect(&self) {
        {
            let slot = self.shared.scavenger.lock();
            if let Some(tx) = slot.as_ref() {
                if tx.send(Signal::Collect).is_ok() {
                    return;
                }
            }
        }
        if self.shared.collect_pending.swap(true, Ordering::AcqRel) {
            return;
        }
        let worker = self.clone();
        let spawned = thread::Builder::new()
            .name("gencache-collect".into())
            .spawn(move || {
                worker.collect();
                worker.shared.collect_pending.store(false, Ordering::Release);
            });
        if let Err(e) = spawned {
            self.shared.collect_pending.store(false, Ordering::Release);
            warn!("collect: cannot spawn a background pass, skipped: {}", e);
        }
    }
}
