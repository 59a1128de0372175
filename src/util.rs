//! Small shared building blocks used across the engine: half-open time
//! intervals and a min-priority-queue-backed index with O(log n) key lookup,
//! push, and priority updates.

use std::cmp::Reverse;
use std::fmt;
use std::fmt::Debug;
use std::hash::{BuildHasherDefault, Hash, Hasher};

use hashers::fx_hash::FxHasher;
use priority_queue::PriorityQueue;
use serde::{Deserialize, Serialize};

/// Half-open `[start, end)` interval over seconds-since-epoch.
pub trait HalfOpenInterval {
    fn overlaps(&self, other: &Self) -> bool;
    fn merge_mut(&mut self, other: &Self);
    fn intersect_mut(&mut self, other: &Self);
    fn get_start(&self) -> f64;
    fn get_end(&self) -> f64;
}

/// A `[start, end)` time range, used both for an edge's validity window and
/// for the time constraints attached to a query edge description.
#[derive(Copy, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct HalfOpenTimeRange {
    pub start: f64,
    pub end: f64,
}

impl fmt::Display for HalfOpenTimeRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

impl HalfOpenTimeRange {
    pub const ZERO: Self = Self { start: 0.0, end: 0.0 };

    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }
}

impl HalfOpenInterval for HalfOpenTimeRange {
    fn overlaps(&self, other: &Self) -> bool {
        if self.start > other.start {
            self.start < other.end
        } else if self.start < other.start {
            self.end > other.start
        } else {
            true
        }
    }

    fn merge_mut(&mut self, other: &Self) {
        self.start = self.start.min(other.start);
        self.end = self.end.max(other.end);
    }

    fn intersect_mut(&mut self, other: &Self) {
        self.start = self.start.max(other.start);
        self.end = self.end.min(other.end);
    }

    fn get_start(&self) -> f64 {
        self.start
    }

    fn get_end(&self) -> f64 {
        self.end
    }
}

/// Converts a non-negative f64 priority into a bit pattern that sorts the
/// same way the float would: IEEE-754 preserves numeric order for the bit
/// pattern of non-negative floats, so this lets `f64` expiry timestamps
/// drive a `u64`-keyed priority queue directly.
pub fn priority_bits(value: f64) -> u64 {
    debug_assert!(value >= 0.0, "priority_bits requires a non-negative value");
    value.to_bits()
}

/// custom struct to store entries in PriorityQueue
/// The goal is to enable key-based lookups for complex object stored in a PriorityQueue
#[derive(Clone, Debug)]
struct PQEntry<K: Copy + PartialEq + Clone + Debug + Hash + Default, V: Clone + Debug> {
    key: K,
    entry: Option<V>,
}

impl<K, V> PQEntry<K, V>
where
    K: Copy + PartialEq + Clone + Debug + Hash + Default,
    V: Clone + Debug,
{
    fn create_key(entry_key: K) -> Self {
        Self { key: entry_key, entry: None }
    }

    fn swap_key(&mut self, new_key: K) {
        self.key = new_key
    }

    fn create_entry(entry_key: K, value: V) -> Self {
        Self { key: entry_key, entry: Some(value) }
    }

    fn get_key(&self) -> K {
        self.key
    }

    fn drain(self) -> V {
        self.entry.unwrap()
    }

    fn get_entry(&self) -> &V {
        self.entry.as_ref().unwrap()
    }

    fn get_entry_mut(&mut self) -> &mut V {
        self.entry.as_mut().unwrap()
    }
}

impl<K, V> Default for PQEntry<K, V>
where
    K: Copy + PartialEq + Clone + Debug + Hash + Default,
    V: Clone + Debug,
{
    fn default() -> Self {
        Self { key: K::default(), entry: None }
    }
}

impl<K, V> PartialEq for PQEntry<K, V>
where
    K: Copy + PartialEq + Clone + Debug + Hash + Default,
    V: Clone + Debug,
{
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<K, V> Eq for PQEntry<K, V>
where
    K: Copy + PartialEq + Clone + Debug + Hash + Default,
    V: Clone + Debug,
{
}

impl<K, V> Hash for PQEntry<K, V>
where
    K: Copy + PartialEq + Clone + Debug + Hash + Default,
    V: Clone + Debug,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state)
    }
}

/// Min priority-queue backed index: O(log n) push, key lookup, and
/// priority decrease. Used for the CSR/CSC per-slot edge lists and for the
/// expiry-ordered result ring bookkeeping, where the priority is always a
/// time (expiry) value.
#[derive(Clone, Debug)]
pub struct MinPQIndex<K: Copy + PartialEq + Clone + Debug + Hash + Default, V: Clone + Debug> {
    index: PriorityQueue<PQEntry<K, V>, Reverse<u64>, BuildHasherDefault<FxHasher>>,
    index_key: PQEntry<K, V>,
}

impl<K, V> Default for MinPQIndex<K, V>
where
    K: Copy + PartialEq + Clone + Debug + Hash + Default,
    V: Clone + Debug,
{
    fn default() -> Self {
        Self {
            index: PriorityQueue::with_hasher(BuildHasherDefault::<FxHasher>::default()),
            index_key: PQEntry::default(),
        }
    }
}

impl<K, V> MinPQIndex<K, V>
where
    K: Copy + PartialEq + Clone + Debug + Hash + Default,
    V: Clone + Debug,
{
    pub fn push(&mut self, key: K, value: V, priority: u64) -> Option<u64> {
        let entry = PQEntry::create_entry(key, value);
        self.index.push(entry, Reverse(priority)).map(|Reverse(ts)| ts)
    }

    pub fn get(&self, key: &K) -> Option<(&V, u64)> {
        self.index.get(&PQEntry::create_key(*key)).map(|(val, Reverse(ts))| (val.get_entry(), *ts))
    }

    pub fn get_mut(&mut self, key: &K) -> Option<(&mut V, u64)> {
        self.index_key.swap_key(*key);
        self.index.get_mut(&self.index_key).map(|entry| (entry.0.get_entry_mut(), (entry.1).0))
    }

    pub fn try_decrease_priority(&mut self, key: &K, priority: u64) {
        self.index_key.swap_key(*key);
        if self.index.get_priority(&self.index_key).map_or(false, |Reverse(p)| *p > priority) {
            self.index.change_priority(&self.index_key, Reverse(priority));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &V, u64)> {
        self.index.iter().map(|(entry, Reverse(p))| (entry.get_key(), entry.get_entry(), *p))
    }

    pub fn peek(&self) -> Option<(K, &V, u64)> {
        self.index.peek().map(|(val, Reverse(ts))| (val.get_key(), val.get_entry(), *ts))
    }

    pub fn pop(&mut self) -> Option<(K, V, u64)> {
        self.index.pop().map(|(val, Reverse(ts))| (val.get_key(), val.drain(), ts))
    }

    pub fn remove(&mut self, key: &K) -> Option<(V, u64)> {
        self.index_key.swap_key(*key);
        self.index.remove(&self.index_key).map(|(val, Reverse(ts))| (val.drain(), ts))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
