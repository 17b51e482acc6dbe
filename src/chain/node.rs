//! chain/node: один узел версионной цепочки ключа.
//!
//! Узел хранит значение (или tombstone = None) и поколение, в котором оно записано.
//! Поколение неизменяемо; `value`/`next` читаются одной атомарной загрузкой (arc-swap),
//! поэтому читатель никогда не видит «половину» записи и никогда не берёт lock.
//!
//! Мутации (`set_value`, `cut`, `mark_floor`) делает только writer или scavenger,
//! и только под per-key lock (шард DashMap).

use arc_swap::ArcSwapOption;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One version of one key.
pub struct VersionNode<V> {
    gen: i64,
    value: ArcSwapOption<V>,
    next: ArcSwapOption<VersionNode<V>>,
    // Set when the depth valve cut an older tail right below this node.
    floor: AtomicBool,
}

impl<V> VersionNode<V> {
    pub fn new(value: Option<Arc<V>>, gen: i64, next: Option<Arc<VersionNode<V>>>) -> Self {
        Self {
            gen,
            value: ArcSwapOption::new(value),
            next: ArcSwapOption::new(next),
            floor: AtomicBool::new(false),
        }
    }

    /// Generation that produced this version.
    #[inline]
    pub fn gen(&self) -> i64 {
        self.gen
    }

    /// Current value; `None` means tombstone.
    #[inline]
    pub fn read(&self) -> Option<Arc<V>> {
        self.value.load_full()
    }

    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.value.load().is_none()
    }

    /// Previous (older) version, if it is still retained.
    #[inline]
    pub fn advance(&self) -> Option<Arc<VersionNode<V>>> {
        self.next.load_full()
    }

    #[inline]
    pub fn has_next(&self) -> bool {
        self.next.load().is_some()
    }

    /// True when older versions of this key were dropped by the depth valve:
    /// the node then answers every older-or-equal generation query.
    #[inline]
    pub fn is_floor(&self) -> bool {
        self.floor.load(Ordering::Acquire)
    }

    pub(crate) fn set_value(&self, value: Option<Arc<V>>) {
        self.value.store(value);
    }

    /// Detach the older tail and return it.
    pub(crate) fn cut(&self) -> Option<Arc<VersionNode<V>>> {
        self.next.swap(None)
    }

    pub(crate) fn mark_floor(&self) {
        self.floor.store(true, Ordering::Release);
    }

    /// Drop both the value and the tail.
    pub(crate) fn clear(&self) {
        self.value.store(None);
        self.next.store(None);
    }
}

// Длинная цепочка Arc<VersionNode> при рекурсивном drop может переполнить стек:
// разматываем хвост итеративно, пока мы единственный владелец следующего узла.
impl<V> Drop for VersionNode<V> {
    fn drop(&mut self) {
        let mut next = self.next.swap(None);
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(owned) => next = owned.next.swap(None),
                Err(_) => break,
            }
        }
    }
}

impl<V> fmt::Debug for VersionNode<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionNode")
            .field("gen", &self.gen)
            .field("tombstone", &self.is_tombstone())
            .field("has_next", &self.has_next())
            .field("floor", &self.is_floor())
            .finish()
    }
}
