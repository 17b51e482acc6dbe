// tests/generations.rs
//
// Таблица поколений через API хранилища:
// - pin_at в будущее: ошибка причинности;
// - pin_at старше минимального живого поколения: ошибка;
// - явные reference/release;
// - min_live_generation следует за самым старым живым читателем.

use anyhow::Result;
use std::sync::Arc;

use GenCache::{ContentStore, StoreBuilder};

fn store() -> ContentStore<u16, u16> {
    StoreBuilder::from_default()
        .collect_auto(false)
        .collect_every_writes(0)
        .build()
}

#[test]
fn pin_at_future_generation_fails_fast() -> Result<()> {
    let store = store();
    store.set(1, 1);
    let err = store.pin_at(store.committed_gen() + 1).unwrap_err();
    assert!(err.to_string().contains("future generation"), "{err:#}");

    let w = store.write();
    let err = store.pin_at(w.gen()).unwrap_err();
    assert!(err.to_string().contains("future generation"), "{err:#}");
    drop(w);
    Ok(())
}

#[test]
fn pin_at_collected_generation_fails() -> Result<()> {
    let store = store();
    for v in 0..3 {
        store.set(1, v);
    }
    store.collect();
    let err = store.pin_at(1).unwrap_err();
    assert!(err.to_string().contains("already collected"), "{err:#}");
    Ok(())
}

#[test]
fn pin_at_live_generation_shares_the_handle() -> Result<()> {
    let store = store();
    store.set(1, 10); // gen 1
    let a = store.pin();
    store.set(1, 20); // gen 2

    let b = store.pin_at(1)?;
    assert!(Arc::ptr_eq(a.handle(), b.handle()));
    assert_eq!(b.get(&1).as_deref(), Some(&10));
    assert_eq!(a.handle().live_readers(), 2);
    Ok(())
}

#[test]
fn min_live_tracks_oldest_reader() -> Result<()> {
    let store = store();
    store.set(1, 1);
    let s1 = store.pin();
    store.set(1, 2);
    let s2 = store.pin();
    store.set(1, 3);

    assert_eq!(store.min_live_generation(), 1);
    drop(s1);
    assert_eq!(store.min_live_generation(), 2);
    drop(s2);
    assert_eq!(store.min_live_generation(), store.committed_gen());
    Ok(())
}

#[test]
fn explicit_reference_release_pairs() -> Result<()> {
    let store = store();
    let s = store.pin();
    let gen = s.gen();
    let table = store.table();

    assert_eq!(table.reference(gen)?, 2);
    assert_eq!(table.release(gen)?, 1);
    assert!(table.reference(gen + 100).is_err());
    drop(s);
    assert!(table.release(gen).is_err(), "no readers left");
    Ok(())
}

#[test]
fn released_handle_is_recreated_on_next_pin() -> Result<()> {
    let store = store();
    let h1 = {
        let s = store.pin();
        Arc::downgrade(s.handle())
    };
    assert!(h1.upgrade().is_none());
    // record not reclaimed yet; a fresh handle takes over
    let s = store.pin();
    assert_eq!(s.handle().live_readers(), 1);
    assert_eq!(store.gen_count(), 1);
    Ok(())
}
