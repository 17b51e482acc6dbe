//! Lightweight global metrics for GenCache.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - Generations / write sessions
//! - Reads / writes
//! - Pins, snapshots, generation handles
//! - Scavenger (collect passes, trimmed nodes, removed keys)
//! - Depth safety valve

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

// ----- Generations / sessions -----
static GENERATIONS_CREATED: AtomicU64 = AtomicU64::new(0);
static WRITE_SESSIONS: AtomicU64 = AtomicU64::new(0);
static ROLLBACKS: AtomicU64 = AtomicU64::new(0);

// ----- Data path -----
static WRITES: AtomicU64 = AtomicU64::new(0);
static READS: AtomicU64 = AtomicU64::new(0);

// ----- Pins / handles -----
static PINS: AtomicU64 = AtomicU64::new(0);
static SNAPSHOTS_ACTIVE: AtomicU64 = AtomicU64::new(0);
static HANDLES_CREATED: AtomicU64 = AtomicU64::new(0);
static HANDLES_RELEASED: AtomicU64 = AtomicU64::new(0);

// ----- Scavenger -----
static COLLECT_RUNS: AtomicU64 = AtomicU64::new(0);
static NODES_TRIMMED: AtomicU64 = AtomicU64::new(0);
static KEYS_REMOVED: AtomicU64 = AtomicU64::new(0);

// ----- Depth valve -----
static DEPTH_VALVE_TRIMS: AtomicU64 = AtomicU64::new(0);
static DEPTH_VALVE_NODES: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    // Generations / sessions
    pub generations_created: u64,
    pub write_sessions: u64,
    pub rollbacks: u64,

    // Data path
    pub writes: u64,
    pub reads: u64,

    // Pins / handles
    pub pins: u64,
    pub snapshots_active: u64,
    pub handles_created: u64,
    pub handles_released: u64,

    // Scavenger
    pub collect_runs: u64,
    pub nodes_trimmed: u64,
    pub keys_removed: u64,

    // Depth valve
    pub depth_valve_trims: u64,
    pub depth_valve_nodes: u64,
}

impl MetricsSnapshot {
    /// Pins served per created handle (how well handles are shared).
    pub fn pins_per_handle(&self) -> f64 {
        if self.handles_created == 0 {
            0.0
        } else {
            self.pins as f64 / self.handles_created as f64
        }
    }

    pub fn avg_trimmed_per_collect(&self) -> f64 {
        if self.collect_runs == 0 {
            0.0
        } else {
            self.nodes_trimmed as f64 / self.collect_runs as f64
        }
    }
}

// ----- Recorders (generations / sessions) -----
pub fn record_generation_created() {
    GENERATIONS_CREATED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_write_session() {
    WRITE_SESSIONS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_rollback() {
    ROLLBACKS.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (data path) -----
pub fn record_write() {
    WRITES.fetch_add(1, Ordering::Relaxed);
}
pub fn record_read() {
    READS.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (pins / handles) -----
pub fn record_pin() {
    PINS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_snapshot_open() {
    SNAPSHOTS_ACTIVE.fetch_add(1, Ordering::Relaxed);
}

pub fn record_snapshot_close() {
    SNAPSHOTS_ACTIVE
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)))
        .ok();
}

pub fn record_handle_created() {
    HANDLES_CREATED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_handle_released() {
    HANDLES_RELEASED.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (scavenger) -----
pub fn record_collect_run(nodes_trimmed: usize, keys_removed: usize) {
    COLLECT_RUNS.fetch_add(1, Ordering::Relaxed);
    NODES_TRIMMED.fetch_add(nodes_trimmed as u64, Ordering::Relaxed);
    KEYS_REMOVED.fetch_add(keys_removed as u64, Ordering::Relaxed);
}

// ----- Recorders (depth valve) -----
pub fn record_depth_valve_trim(nodes: usize) {
    DEPTH_VALVE_TRIMS.fetch_add(1, Ordering::Relaxed);
    DEPTH_VALVE_NODES.fetch_add(nodes as u64, Ordering::Relaxed);
}

// ----- Snapshot / Reset -----
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        generations_created: GENERATIONS_CREATED.load(Ordering::Relaxed),
        write_sessions: WRITE_SESSIONS.load(Ordering::Relaxed),
        rollbacks: ROLLBACKS.load(Ordering::Relaxed),

        writes: WRITES.load(Ordering::Relaxed),
        reads: READS.load(Ordering::Relaxed),

        pins: PINS.load(Ordering::Relaxed),
        snapshots_active: SNAPSHOTS_ACTIVE.load(Ordering::Relaxed),
        handles_created: HANDLES_CREATED.load(Ordering::Relaxed),
        handles_released: HANDLES_RELEASED.load(Ordering::Relaxed),

        collect_runs: COLLECT_RUNS.load(Ordering::Relaxed),
        nodes_trimmed: NODES_TRIMMED.load(Ordering::Relaxed),
        keys_removed: KEYS_REMOVED.load(Ordering::Relaxed),

        depth_valve_trims: DEPTH_VALVE_TRIMS.load(Ordering::Relaxed),
        depth_valve_nodes: DEPTH_VALVE_NODES.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    GENERATIONS_CREATED.store(0, Ordering::Relaxed);
    WRITE_SESSIONS.store(0, Ordering::Relaxed);
    ROLLBACKS.store(0, Ordering::Relaxed);

    WRITES.store(0, Ordering::Relaxed);
    READS.store(0, Ordering::Relaxed);

    PINS.store(0, Ordering::Relaxed);
    SNAPSHOTS_ACTIVE.store(0, Ordering::Relaxed);
    HANDLES_CREATED.store(0, Ordering::Relaxed);
    HANDLES_RELEASED.store(0, Ordering::Relaxed);

    COLLECT_RUNS.store(0, Ordering::Relaxed);
    NODES_TRIMMED.store(0, Ordering::Relaxed);
    KEYS_REMOVED.store(0, Ordering::Relaxed);

    DEPTH_VALVE_TRIMS.store(0, Ordering::Relaxed);
    DEPTH_VALVE_NODES.store(0, Ordering::Relaxed);
}
