//! Version chains: per-key singly linked lists of [`VersionNode`], newest first.
//!
//! - node.rs: VersionNode (value + generation + atomic `next`).
//! - this file: chain walking helpers used by the store read path and the scavenger.
//!
//! Invariant: generations strictly decrease from head to tail.

mod node;

pub use node::VersionNode;

use std::sync::Arc;

/// Shared pointer to a chain node (the head of a key is a `Link`).
pub type Link<V> = Arc<VersionNode<V>>;

/// Newest node visible to a reader pinned at `gen`: the first node whose
/// generation is `<= gen`. A node marked as floor by the depth valve answers
/// any older query as well.
pub fn visible_at<V>(head: &Link<V>, gen: i64) -> Option<Link<V>> {
    let mut cur = Some(Arc::clone(head));
    while let Some(node) = cur {
        if node.gen() <= gen || node.is_floor() {
            return Some(node);
        }
        cur = node.advance();
    }
    None
}

/// Number of retained versions.
pub fn depth<V>(head: &Link<V>) -> usize {
    let mut n = 1usize;
    let mut cur = head.advance();
    while let Some(node) = cur {
        n += 1;
        cur = node.advance();
    }
    n
}

/// Dump (generation, value) pairs newest first.
pub fn versions<V>(head: &Link<V>) -> Vec<(i64, Option<Arc<V>>)> {
    let mut out = Vec::new();
    let mut cur = Some(Arc::clone(head));
    while let Some(node) = cur {
        out.push((node.gen(), node.read()));
        cur = node.advance();
    }
    out
}

/// Check the ordering invariant of a chain.
pub fn is_ordered<V>(head: &Link<V>) -> bool {
    let mut prev = head.gen();
    let mut cur = head.advance();
    while let Some(node) = cur {
        if node.gen() >= prev {
            return false;
        }
        prev = node.gen();
        cur = node.advance();
    }
    true
}

/// Keep every node newer than `floor` plus the newest node with `gen <= floor`,
/// detach the rest. Returns how many nodes were detached.
pub(crate) fn trim_below<V>(head: &Link<V>, floor: i64) -> usize {
    let mut cur = Arc::clone(head);
    loop {
        if cur.gen() <= floor {
            return count_nodes(cur.cut());
        }
        match cur.advance() {
            Some(next) => cur = next,
            None => return 0,
        }
    }
}

/// Depth safety valve: keep at most `max` nodes, mark the last kept one as floor.
/// `max == 0` means unlimited.
pub(crate) fn trim_to_depth<V>(head: &Link<V>, max: usize) -> usize {
    if max == 0 {
        return 0;
    }
    let mut cur = Arc::clone(head);
    let mut kept = 1usize;
    while kept < max {
        match cur.advance() {
            Some(next) => {
                cur = next;
                kept += 1;
            }
            None => return 0,
        }
    }
    let tail = cur.cut();
    if tail.is_some() {
        cur.mark_floor();
    }
    count_nodes(tail)
}

fn count_nodes<V>(start: Option<Link<V>>) -> usize {
    let mut n = 0usize;
    let mut cur = start;
    while let Some(node) = cur {
        n += 1;
        cur = node.advance();
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(gens: &[i64]) -> Link<String> {
        // gens newest first
        let mut next: Option<Link<String>> = None;
        for &g in gens.iter().rev() {
            next = Some(Arc::new(VersionNode::new(
                Some(Arc::new(format!("v{g}"))),
                g,
                next,
            )));
        }
        next.expect("non-empty chain")
    }

    #[test]
    fn visible_at_picks_newest_not_newer() {
        let head = chain(&[7, 4, 1]);
        assert_eq!(visible_at(&head, 9).map(|n| n.gen()), Some(7));
        assert_eq!(visible_at(&head, 7).map(|n| n.gen()), Some(7));
        assert_eq!(visible_at(&head, 6).map(|n| n.gen()), Some(4));
        assert_eq!(visible_at(&head, 1).map(|n| n.gen()), Some(1));
        assert!(visible_at(&head, 0).is_none());
        assert!(is_ordered(&head));
    }

    #[test]
    fn trim_below_keeps_floor_node() {
        let head = chain(&[9, 6, 3, 1]);
        // readers at >= 5 need node 3 for gen 5
        assert_eq!(trim_below(&head, 5), 1);
        assert_eq!(depth(&head), 3);
        assert_eq!(visible_at(&head, 5).map(|n| n.gen()), Some(3));

        // floor above head: only head remains
        assert_eq!(trim_below(&head, 10), 2);
        assert_eq!(depth(&head), 1);
    }

    #[test]
    fn trim_to_depth_marks_floor() {
        let head = chain(&[5, 4, 3, 2, 1]);
        assert_eq!(trim_to_depth(&head, 0), 0);
        assert_eq!(trim_to_depth(&head, 3), 2);
        assert_eq!(depth(&head), 3);
        // gen 1 is gone: the oldest retained (3) answers older queries
        let n = visible_at(&head, 1).expect("floor answers");
        assert_eq!(n.gen(), 3);
        assert!(n.is_floor());
    }

    #[test]
    fn trim_to_depth_one_keeps_the_head() {
        let head = chain(&[3, 2, 1]);
        assert_eq!(trim_to_depth(&head, 1), 2);
        assert_eq!(depth(&head), 1);
        assert!(head.is_floor());
        assert_eq!(visible_at(&head, 1).map(|n| n.gen()), Some(3));
    }
}
