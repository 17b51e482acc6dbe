// tests/depth_valve.rs
//
// Предохранитель глубины цепочки: не более max_chain_depth версий на ключ,
// даже если старый читатель не отпускает поколение.

use anyhow::Result;

use GenCache::{ContentStore, StoreBuilder};

#[test]
fn chain_never_exceeds_max_depth() -> Result<()> {
    let store: ContentStore<&'static str, u32> = StoreBuilder::from_default()
        .collect_auto(false)
        .collect_every_writes(0)
        .max_chain_depth(3)
        .build();

    store.set("k", 1); // gen 1
    let old = store.pin();
    for v in 2..=6 {
        store.set("k", v);
        assert!(store.versions(&"k").len() <= 3);
    }
    let gens: Vec<i64> = store.versions(&"k").into_iter().map(|(g, _)| g).collect();
    assert_eq!(gens, vec![6, 5, 4]);

    // the oldest retained version answers for everything older
    assert_eq!(old.get(&"k").as_deref(), Some(&4));
    assert!(store.stats().max_depth <= 3);

    let m = GenCache::metrics::snapshot();
    assert!(m.depth_valve_trims >= 3);
    assert!(m.depth_valve_nodes >= 3);
    Ok(())
}

#[test]
fn zero_depth_means_unlimited() -> Result<()> {
    let store: ContentStore<&'static str, u32> = StoreBuilder::from_default()
        .collect_auto(false)
        .collect_every_writes(0)
        .max_chain_depth(0)
        .build();
    let s = store.pin();
    for v in 1..=200 {
        store.set("k", v);
    }
    assert_eq!(store.versions(&"k").len(), 200);
    assert!(s.get(&"k").is_none());
    Ok(())
}

#[test]
fn valve_does_not_touch_keys_below_the_cap() -> Result<()> {
    let store: ContentStore<u8, u8> = StoreBuilder::from_default()
        .collect_auto(false)
        .collect_every_writes(0)
        .max_chain_depth(4)
        .build();
    let s0 = store.pin();
    for v in 0..3 {
        store.set(1, v);
    }
    assert_eq!(store.versions(&1).len(), 3);
    assert!(s0.get(&1).is_none());
    let st = store.stats();
    assert_eq!(st.keys, 1);
    assert_eq!(st.nodes, 3);
    Ok(())
}

#[test]
fn valve_never_cuts_through_an_open_session() -> Result<()> {
    // Глубина 1 поднимается до 2: новой записи нужно место над закоммиченной.
    let store: ContentStore<u8, u32> = StoreBuilder::from_default()
        .collect_auto(false)
        .collect_every_writes(0)
        .max_chain_depth(1)
        .build();
    assert_eq!(store.config().max_chain_depth, 2);

    store.set(1, 10); // gen 1
    store.set(1, 11); // gen 2
    let r = store.pin();
    assert_eq!(r.gen(), 2);

    let mut w = store.write();
    w.set(1, 99);
    assert_eq!(store.versions(&1).len(), 2);
    assert_eq!(r.get(&1).as_deref(), Some(&11), "uncommitted write leaked");
    assert_eq!(store.pin().get(&1).as_deref(), Some(&11));
    w.rollback();

    assert_eq!(r.get(&1).as_deref(), Some(&11));
    let fresh = store.pin();
    assert_eq!(fresh.get(&1).as_deref(), Some(&11), "committed value lost");
    assert_eq!(store.versions(&1)[0], (2, Some(std::sync::Arc::new(11))));
    Ok(())
}

#[test]
fn valve_keeps_committed_head_when_capped_at_two() -> Result<()> {
    let store: ContentStore<u8, u32> = StoreBuilder::from_default()
        .collect_auto(false)
        .collect_every_writes(0)
        .max_chain_depth(2)
        .build();
    let s0 = store.pin();
    for v in 1..=4 {
        store.set(1, v);
    }
    let gens: Vec<i64> = store.versions(&1).into_iter().map(|(g, _)| g).collect();
    assert_eq!(gens, vec![4, 3]);
    // the floor node answers for the trimmed history
    assert_eq!(s0.get(&1).as_deref(), Some(&3));

    let w = {
        let mut w = store.write();
        w.delete(1);
        w
    };
    assert_eq!(store.pin().get(&1).as_deref(), Some(&4));
    drop(w);
    assert_eq!(store.pin().get(&1).as_deref(), Some(&4));
    Ok(())
}
