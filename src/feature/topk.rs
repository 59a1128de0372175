//! Per-key approximate top-k over a sliding window of the last `N` items,
//! grounded on `SamSrc/ActiveWindow.hpp`, `DormantWindow.hpp`, and
//! `SlidingWindow.hpp` (spec.md §4.2).
//!
//! The window of `N` items is split into blocks of `b` items. The most
//! recent block is the *active* window: a raw per-key counter, still being
//! filled. Once it fills, it's snapshotted into a *dormant* block (only its
//! top-`k` keys and counts survive) and pushed onto a fixed-length queue of
//! `N/b - 1` dormant blocks; the oldest dormant block is evicted and its
//! counts subtracted from a running global tally. Global top-k is always
//! read from that tally, so only `O(k)` keys per dormant block are ever
//! retained — an exact top-k would need the full per-key counts.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

struct ActiveBlock {
    counts: HashMap<String, usize>,
    count: usize,
    limit: usize,
}

impl ActiveBlock {
    fn new(limit: usize) -> Self {
        Self { counts: HashMap::new(), count: 0, limit }
    }

    /// Returns `true` if the key was recorded, `false` if the block was
    /// already full.
    fn update(&mut self, key: &str) -> bool {
        if self.count >= self.limit {
            return false;
        }
        *self.counts.entry(key.to_string()).or_insert(0) += 1;
        self.count += 1;
        true
    }

    /// Top-`k` (key, count) pairs by descending count.
    fn topk(&self, k: usize) -> Vec<(String, usize)> {
        let mut pairs: Vec<(String, usize)> = self.counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
        pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        pairs.truncate(k);
        pairs
    }
}

/// An immutable snapshot of an [`ActiveBlock`]'s top-`k` keys, kept after
/// the block closes (`DormantWindow.hpp`).
struct DormantBlock {
    entries: Vec<(String, usize)>,
}

impl DormantBlock {
    fn from_active(k: usize, active: &ActiveBlock) -> Self {
        Self { entries: active.topk(k) }
    }
}

/// Per-key sliding-window top-k state (`SlidingWindow.hpp`). `n` is the
/// total window size in items, `b` the block size, `k` the number of keys
/// tracked exactly within a block.
struct SlidingWindow {
    b: usize,
    k: usize,
    num_dormant: usize,
    counter: usize,
    active: ActiveBlock,
    dormant: VecDeque<DormantBlock>,
    global: HashMap<String, usize>,
}

impl SlidingWindow {
    fn new(n: usize, b: usize, k: usize) -> Self {
        let num_dormant = (n / b).saturating_sub(1);
        assert!(num_dormant > 0, "top-k window size must cover at least two blocks (N/b must exceed 1)");
        Self { b, k, num_dormant, counter: 0, active: ActiveBlock::new(b), dormant: VecDeque::new(), global: HashMap::new() }
    }

    fn add(&mut self, key: &str) {
        if self.counter < self.b {
            self.active.update(key);
            self.counter += 1;
        } else {
            let closed = DormantBlock::from_active(self.k, &self.active);
            self.add_to_global(&closed);
            self.dormant.push_back(closed);
            self.active = ActiveBlock::new(self.b);
            self.active.update(key);
            self.counter = 1;
        }

        if self.dormant.len() > self.num_dormant {
            if let Some(oldest) = self.dormant.pop_front() {
                self.remove_from_global(&oldest);
            }
        }
    }

    fn add_to_global(&mut self, block: &DormantBlock) {
        for (key, value) in &block.entries {
            *self.global.entry(key.clone()).or_insert(0) += value;
        }
    }

    fn remove_from_global(&mut self, block: &DormantBlock) {
        for (key, value) in &block.entries {
            if let Some(existing) = self.global.get_mut(key) {
                *existing = existing.saturating_sub(*value);
                if *existing == 0 {
                    self.global.remove(key);
                }
            }
        }
    }

    fn num_dormant_elements(&self) -> usize {
        self.dormant.len() * self.b
    }

    /// Keys and normalized frequencies, sorted by descending count, as
    /// stored into a [`crate::feature::Feature::TopK`] (`getKeys`/
    /// `getFrequencies` in the original).
    fn keys_and_frequencies(&self) -> (Vec<String>, Vec<f64>) {
        let mut pairs: Vec<(&String, &usize)> = self.global.iter().collect();
        pairs.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        let total = self.num_dormant_elements() as f64;
        let keys = pairs.iter().map(|(k, _)| (*k).clone()).collect();
        let frequencies = if total > 0.0 {
            pairs.iter().map(|(_, v)| **v as f64 / total).collect()
        } else {
            vec![0.0; pairs.len()]
        };
        (keys, frequencies)
    }
}

/// Per-key windowed top-k tracker (spec.md §4.2). One [`SlidingWindow`] per
/// key, guarded by a shared mutex since updates across distinct keys don't
/// conflict in practice but the table itself is shared across threads.
pub struct TopKWindow {
    n: usize,
    b: usize,
    k: usize,
    windows: Mutex<HashMap<String, SlidingWindow>>,
}

impl TopKWindow {
    pub fn new(n: usize, b: usize, k: usize) -> Self {
        Self { n, b, k, windows: Mutex::new(HashMap::new()) }
    }

    /// Feeds `value` into `key`'s window and returns the window's current
    /// top-k keys with normalized frequencies, once at least one dormant
    /// block has closed (empty before that, matching the original's
    /// "nothing to report yet" behavior).
    pub fn add(&self, key: &str, value: &str) -> (Vec<String>, Vec<f64>) {
        let mut windows = self.windows.lock();
        let window = windows.entry(key.to_string()).or_insert_with(|| SlidingWindow::new(self.n, self.b, self.k));
        window.add(value);
        window.keys_and_frequencies()
    }

    pub fn num_keys(&self) -> usize {
        self.windows.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_window_caps_at_limit() {
        let mut active = ActiveBlock::new(2);
        assert!(active.update("a"));
        assert!(active.update("b"));
        assert!(!active.update("c"));
    }

    #[test]
    fn topk_ranks_by_descending_count() {
        let mut active = ActiveBlock::new(10);
        for _ in 0..3 {
            active.update("a");
        }
        for _ in 0..5 {
            active.update("b");
        }
        active.update("c");

        let topk = active.topk(2);
        assert_eq!(topk, vec![("b".to_string(), 5), ("a".to_string(), 3)]);
    }

    #[test]
    fn sliding_window_reports_frequencies_summing_to_one() {
        let mut window = SlidingWindow::new(20, 5, 2);
        for value in ["a", "a", "a", "b", "b", "c", "c", "c", "c", "d"] {
            window.add(value);
        }
        let (keys, freqs) = window.keys_and_frequencies();
        assert!(!keys.is_empty());
        let total: f64 = freqs.iter().sum();
        assert!((total - 1.0).abs() < 1e-9 || total == 0.0);
    }

    #[test]
    fn top_k_window_tracks_separate_keys_independently() {
        let window = TopKWindow::new(20, 5, 2);
        for value in ["x", "x", "x", "y", "y"] {
            window.add("node-a", value);
        }
        let (keys, _) = window.add("node-b", "z");
        assert_eq!(window.num_keys(), 2);
        // node-b's window has not closed its first block yet.
        assert!(keys.is_empty());
    }

    #[test]
    #[should_panic(expected = "at least two blocks")]
    fn rejects_windows_too_small_for_two_blocks() {
        SlidingWindow::new(5, 5, 2);
    }
}
