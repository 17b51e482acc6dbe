// tests/collect.rs
//
// Сборка старых версий:
// - без читателей остаётся только новейшая версия каждого ключа;
// - пока читатель держит поколение, нужная ему версия не трогается;
// - tombstone-ключи удаляются целиком, когда их не видит ни один живой читатель;
// - floor_gen монотонен;
// - авто-триггеры: pin() при большом разрыве поколений, commit() по счётчику записей;
//   проход идёт в фоне, не в потоке читателя.

use anyhow::Result;
use std::time::{Duration, Instant};

use GenCache::{ContentStore, StoreBuilder};

fn manual() -> ContentStore<u32, u64> {
    StoreBuilder::from_default()
        .collect_auto(false)
        .collect_every_writes(0)
        .max_chain_depth(0)
        .build()
}

/// Poll until `cond` holds or the deadline passes.
fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn bump(store: &ContentStore<u32, u64>, key: u32, rounds: u64) {
    for i in 0..rounds {
        store.set(key, i);
    }
}

#[test]
fn collect_without_readers_keeps_newest_only() -> Result<()> {
    let store = manual();
    bump(&store, 1, 10);
    bump(&store, 2, 3);
    assert_eq!(store.versions(&1).len(), 10);

    let rep = store.collect();
    assert_eq!(rep.floor_gen, 13);
    assert_eq!(rep.keys_scanned, 2);
    assert_eq!(rep.nodes_trimmed, 9 + 2);
    assert!(rep.reclaimed_anything());

    assert_eq!(store.versions(&1).len(), 1);
    assert_eq!(store.versions(&2).len(), 1);
    assert_eq!(store.pin().get(&1).as_deref(), Some(&9));

    // nothing left: second pass is a no-op
    let rep = store.collect();
    assert!(!rep.reclaimed_anything());
    Ok(())
}

#[test]
fn collect_keeps_what_live_readers_need() -> Result<()> {
    let store = manual();
    store.set(7, 100); // gen 1
    store.set(7, 101); // gen 2
    let s2 = store.pin();
    store.set(8, 1); // gen 3, key 7 untouched
    store.set(7, 102); // gen 4
    store.set(7, 103); // gen 5

    store.collect();
    // gen 2 reader needs node 2; nodes 4 and 5 are newer than the floor
    let gens: Vec<i64> = store.versions(&7).into_iter().map(|(g, _)| g).collect();
    assert_eq!(gens, vec![5, 4, 2]);
    assert_eq!(s2.get(&7).as_deref(), Some(&101));
    assert!(s2.get(&8).is_none());
    assert_eq!(store.floor_gen(), 2);

    drop(s2);
    store.collect();
    let gens: Vec<i64> = store.versions(&7).into_iter().map(|(g, _)| g).collect();
    assert_eq!(gens, vec![5]);
    Ok(())
}

#[test]
fn reader_between_versions_keeps_older_node() -> Result<()> {
    let store = manual();
    store.set(1, 10); // gen 1
    store.set(2, 0); // gen 2
    let s = store.pin(); // gen 2: key 1 resolves to node 1
    store.set(1, 30); // gen 3

    store.collect();
    assert_eq!(s.get(&1).as_deref(), Some(&10));
    assert_eq!(store.versions(&1).len(), 2);
    Ok(())
}

#[test]
fn deleted_keys_disappear_once_unobserved() -> Result<()> {
    let store = manual();
    store.set(1, 1); // gen 1
    let s1 = store.pin();
    store.delete(1); // gen 2

    let rep = store.collect();
    assert_eq!(rep.keys_removed, 0, "gen 1 reader still sees the value");
    assert_eq!(s1.get(&1).as_deref(), Some(&1));
    assert_eq!(store.len(), 1);

    drop(s1);
    let rep = store.collect();
    assert_eq!(rep.keys_removed, 1);
    assert_eq!(rep.nodes_trimmed, 2);
    assert!(store.is_empty());
    assert!(store.pin().get(&1).is_none());
    Ok(())
}

#[test]
fn floor_never_moves_back() -> Result<()> {
    let store = manual();
    bump(&store, 1, 4);
    store.collect();
    assert_eq!(store.floor_gen(), 4);

    // min live is the committed generation when nobody reads
    assert_eq!(store.min_live_generation(), 4);
    assert!(store.pin_at(2).is_err());

    let s = store.pin_at(4)?;
    bump(&store, 1, 4);
    store.collect();
    assert_eq!(store.floor_gen(), 4);
    drop(s);
    store.collect();
    assert_eq!(store.floor_gen(), 8);
    Ok(())
}

#[test]
fn try_collect_skips_when_busy_is_not_an_error() -> Result<()> {
    let store = manual();
    bump(&store, 1, 3);
    let rep = store.try_collect();
    assert!(rep.is_some());
    assert_eq!(store.versions(&1).len(), 1);
    Ok(())
}

#[test]
fn pin_triggers_collect_when_generations_pile_up() -> Result<()> {
    let store: ContentStore<u32, u64> = StoreBuilder::from_default()
        .collect_auto(true)
        .collect_min_gen_delta(2)
        .collect_every_writes(0)
        .build();
    bump(&store, 1, 5);
    assert_eq!(store.versions(&1).len(), 5);

    let s = store.pin();
    assert_eq!(s.gen(), 5);
    // the pass runs in the background
    assert!(wait_for(Duration::from_secs(5), || store.versions(&1).len() == 1));
    assert_eq!(store.floor_gen(), 5);
    assert_eq!(s.get(&1).as_deref(), Some(&4));
    Ok(())
}

#[test]
fn commit_triggers_collect_by_write_count() -> Result<()> {
    let store: ContentStore<u32, u64> = StoreBuilder::from_default()
        .collect_auto(false)
        .collect_every_writes(4)
        .build();
    bump(&store, 1, 3);
    assert_eq!(store.versions(&1).len(), 3);

    store.set(1, 3);
    assert!(wait_for(Duration::from_secs(5), || store.versions(&1).len() == 1));
    assert_eq!(store.floor_gen(), 4);
    Ok(())
}
