//! Background scavenger: one named thread per store that runs collect passes
//! every `interval` and whenever the store asks for one (Signal::Collect).
//!
//! While attached, the store's collect triggers (pin / commit) only send a signal;
//! nothing is collected on the caller's thread.

use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use std::fmt;
use std::hash::Hash;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::store::ContentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    Collect,
    Stop,
}

pub struct Scavenger<K, V>
where
    K: Eq + Hash + Clone,
{
    store: ContentStore<K, V>,
    tx: Sender<Signal>,
    thread: Option<JoinHandle<()>>,
}

impl<K, V> Scavenger<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Attach a background scavenger to `store`. One per store.
    pub fn start(store: &ContentStore<K, V>, interval: Duration) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Signal>();
        {
            let mut slot = store.shared.scavenger.lock();
            if slot.is_some() {
                return Err(anyhow!("a scavenger is already attached to this store"));
            }
            *slot = Some(tx.clone());
        }

        let worker = store.clone();
        let spawned = thread::Builder::new()
            .name("gencache-scavenger".into())
            .spawn(move || {
                debug!("scavenger: started, interval={:?}", interval);
                loop {
                    match rx.recv_timeout(interval) {
                        Ok(Signal::Collect) | Err(RecvTimeoutError::Timeout) => {
                            let _ = worker.try_collect();
                        }
                        Ok(Signal::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("scavenger: stopped");
            });

        let thread = match spawned {
            Ok(t) => t,
            Err(e) => {
                *store.shared.scavenger.lock() = None;
                return Err(anyhow!("spawn scavenger thread: {}", e));
            }
        };
        info!("scavenger: attached (interval {:?})", interval);

        Ok(Self {
            store: store.clone(),
            tx,
            thread: Some(thread),
        })
    }

    /// Attach with the store's configured interval (collect_interval_ms).
    pub fn start_default(store: &ContentStore<K, V>) -> Result<Self> {
        let ms = store.config().collect_interval_ms.max(1);
        Self::start(store, Duration::from_millis(ms))
    }

    /// Ask for a pass now.
    pub fn notify(&self) {
        let _ = self.tx.send(Signal::Collect);
    }

    /// Detach and join the thread.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown()
    }
}

impl<K, V> Scavenger<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        // Unregister first so store triggers fall back to one-shot collect threads.
        *self.store.shared.scavenger.lock() = None;
        let _ = self.tx.send(Signal::Stop);
        thread
            .join()
            .map_err(|_| anyhow!("scavenger thread panicked"))?;
        info!("scavenger: detached");
        Ok(())
    }
}

impl<K, V> Drop for Scavenger<K, V>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("scavenger: {:#}", e);
        }
    }
}

impl<K, V> fmt::Debug for Scavenger<K, V>
where
    K: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scavenger")
            .field("running", &self.is_running())
            .finish()
    }
}
