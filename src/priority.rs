// Copyright 2026 Hypermesh Foundation. All rights reserved.
// APFlow Wireless Balancing Engine - Stable Priority Queue

//! Binary heap with an injected key comparator.
//!
//! Entries that compare equal come out in insertion order: every push stamps
//! a monotonically increasing sequence number that acts as the secondary key.
//! Re-pushing an item already in the heap replaces its key and re-stamps it,
//! which gives decrease-key (and increase-key) semantics via remove+reinsert.
//! An item is present at most once and is never dropped except by `pop`,
//! `remove` or `clear`.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
struct Entry<T, K> {
    item: T,
    key: K,
    seq: u64,
}

pub struct StableHeap<T, K, F>
where
    F: Fn(&K, &K) -> Ordering,
{
    entries: Vec<Entry<T, K>>,
    positions: HashMap<T, usize>,
    compare: F,
    next_seq: u64,
}

/// Min-heap over `f64` keys in IEEE total order.
pub type ScoreHeap<T> = StableHeap<T, f64, fn(&f64, &f64) -> Ordering>;

impl<T: Clone + Eq + Hash> ScoreHeap<T> {
    pub fn by_score() -> Self {
        Self::new(f64::total_cmp as fn(&f64, &f64) -> Ordering)
    }
}

impl<T, K, F> StableHeap<T, K, F>
where
    T: Clone + Eq + Hash,
    F: Fn(&K, &K) -> Ordering,
{
    /// `compare` orders keys; the smallest key is popped first.
    pub fn new(compare: F) -> Self {
        Self {
            entries: Vec::new(),
            positions: HashMap::new(),
            compare,
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.positions.contains_key(item)
    }

    pub fn key_of(&self, item: &T) -> Option<&K> {
        self.positions.get(item).map(|&i| &self.entries[i].key)
    }

    /// Insert `item`, or re-key it if present. Returns the replaced key.
    pub fn push(&mut self, item: T, key: K) -> Option<K> {
        let previous = self.remove(&item);
        let seq = self.next_seq;
        self.next_seq += 1;
        let idx = self.entries.len();
        self.positions.insert(item.clone(), idx);
        self.entries.push(Entry { item, key, seq });
        self.sift_up(idx);
        previous
    }

    pub fn peek(&self) -> Option<(&T, &K)> {
        self.entries.first().map(|e| (&e.item, &e.key))
    }

    pub fn pop(&mut self) -> Option<(T, K)> {
        if self.entries.is_empty() {
            return None;
        }
        let entry = self.take(0);
        Some((entry.item, entry.key))
    }

    pub fn remove(&mut self, item: &T) -> Option<K> {
        let idx = *self.positions.get(item)?;
        Some(self.take(idx).key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.positions.clear();
    }

    /// Drain in priority order.
    pub fn into_sorted_vec(mut self) -> Vec<(T, K)> {
        let mut out = Vec::with_capacity(self.len());
        while let Some(entry) = self.pop() {
            out.push(entry);
        }
        out
    }

    // -- internals --

    fn take(&mut self, idx: usize) -> Entry<T, K> {
        let last = self.entries.len() - 1;
        self.swap(idx, last);
        let entry = self.entries.swap_remove(last);
        self.positions.remove(&entry.item);
        if idx < self.entries.len() {
            self.sift_down(idx);
            self.sift_up(idx);
        }
        entry
    }

    fn less(&self, a: usize, b: usize) -> bool {
        let (ea, eb) = (&self.entries[a], &self.entries[b]);
        match (self.compare)(&ea.key, &eb.key) {
            Ordering::Equal => ea.seq < eb.seq,
            ord => ord == Ordering::Less,
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.entries.swap(a, b);
        if let Some(p) = self.positions.get_mut(&self.entries[a].item) {
            *p = a;
        }
        if let Some(p) = self.positions.get_mut(&self.entries[b].item) {
            *p = b;
        }
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if !self.less(idx, parent) {
                break;
            }
            self.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.entries.len();
        loop {
            let left = 2 * idx + 1;
            let right = left + 1;
            let mut best = idx;
            if left < len && self.less(left, best) {
                best = left;
            }
            if right < len && self.less(right, best) {
                best = right;
            }
            if best == idx {
                break;
            }
            self.swap(idx, best);
            idx = best;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn equal_keys_pop_in_insertion_order() {
        let mut heap = ScoreHeap::by_score();
        for (item, key) in [(5_u32, 1.0), (3, 0.5), (9, 1.0), (1, 1.0), (2, 0.5)] {
            heap.push(item, key);
        }
        let order: Vec<u32> = heap.into_sorted_vec().into_iter().map(|(i, _)| i).collect();
        assert_eq!(order, vec![3, 2, 5, 9, 1]);
    }

    #[test]
    fn repush_updates_key_without_duplicating() {
        let mut heap = ScoreHeap::by_score();
        heap.push("a", 3.0);
        heap.push("b", 2.0);
        assert_eq!(heap.push("a", 1.0), Some(3.0));
        assert_eq!(heap.len(), 2);
        assert_eq!(heap.peek(), Some((&"a", &1.0)));
        assert_eq!(heap.push("a", 5.0), Some(1.0));
        assert_eq!(heap.pop(), Some(("b", 2.0)));
        assert_eq!(heap.pop(), Some(("a", 5.0)));
        assert!(heap.pop().is_none());
    }

    #[test]
    fn reinserted_tie_goes_behind_existing_ties() {
        let mut heap = ScoreHeap::by_score();
        heap.push(1_u32, 0.0);
        heap.push(2, 0.0);
        heap.push(1, 0.0);
        assert_eq!(heap.pop().map(|(i, _)| i), Some(2));
    }

    #[test]
    fn injected_comparator_builds_max_heap() {
        let mut heap = StableHeap::new(|a: &i32, b: &i32| b.cmp(a));
        for (item, key) in [('x', 1), ('y', 7), ('z', 7), ('w', 3)] {
            heap.push(item, key);
        }
        let order: Vec<char> = heap.into_sorted_vec().into_iter().map(|(i, _)| i).collect();
        assert_eq!(order, vec!['y', 'z', 'w', 'x']);
    }

    #[test]
    fn remove_from_middle_keeps_heap_valid() {
        let mut heap = ScoreHeap::by_score();
        for i in 0..10_u32 {
            heap.push(i, f64::from(10 - i));
        }
        assert_eq!(heap.remove(&4), Some(6.0));
        assert_eq!(heap.remove(&4), None);
        assert!(!heap.contains(&4));
        let keys: Vec<f64> = heap.into_sorted_vec().into_iter().map(|(_, k)| k).collect();
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(keys.len(), 9);
    }

    proptest! {
        #[test]
        fn pops_are_sorted_and_stable(keys in prop::collection::vec(0_u8..4, 0..40)) {
            let mut heap = StableHeap::new(|a: &u8, b: &u8| a.cmp(b));
            for (i, &k) in keys.iter().enumerate() {
                heap.push(i, k);
            }
            let popped = heap.into_sorted_vec();
            prop_assert_eq!(popped.len(), keys.len());
            let mut expected: Vec<(usize, u8)> = keys.iter().copied().enumerate().collect();
            expected.sort_by_key(|&(i, k)| (k, i));
            prop_assert_eq!(popped, expected);
        }
    }
}
