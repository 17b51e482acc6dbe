// tests/metrics_counters.rs
//
// Глобальные счётчики: один тест на бинарь, чтобы параллельные тесты не мешали.

use anyhow::Result;

use GenCache::metrics;
use GenCache::{ContentStore, StoreBuilder};

#[test]
fn counters_follow_store_activity() -> Result<()> {
    metrics::reset();
    let store: ContentStore<u32, u32> = StoreBuilder::from_default()
        .collect_auto(false)
        .collect_every_writes(0)
        .max_chain_depth(0)
        .build();

    store.set(1, 1);
    store.set(1, 2);
    {
        let mut w = store.write();
        w.set(2, 2);
        w.rollback();
    }

    let a = store.pin();
    let b = store.pin();
    let _ = a.get(&1);
    let _ = b.get(&2);

    let m = metrics::snapshot();
    assert_eq!(m.generations_created, 3);
    assert_eq!(m.write_sessions, 3);
    assert_eq!(m.rollbacks, 1);
    assert_eq!(m.writes, 3);
    assert_eq!(m.reads, 2);
    assert_eq!(m.pins, 2);
    assert_eq!(m.snapshots_active, 2);
    assert_eq!(m.handles_created, 1);
    assert!((m.pins_per_handle() - 2.0).abs() < 1e-9);

    drop(a);
    drop(b);
    let rep = store.collect();
    let m = metrics::snapshot();
    assert_eq!(m.snapshots_active, 0);
    assert_eq!(m.handles_released, 1);
    assert_eq!(m.collect_runs, 1);
    assert_eq!(m.nodes_trimmed, rep.nodes_trimmed as u64);
    assert_eq!(m.nodes_trimmed, 1);

    let json = serde_json::to_string(&m)?;
    assert!(json.contains("\"collect_runs\":1"), "{json}");
    Ok(())
}
