//! The sharded hash table of in-flight partial matches, plus the
//! capacity-bounded ring of completed ones. Grounded on
//! `SamSrc/SubgraphQueryResultMap.hpp`.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use hashers::fx_hash::FxHasher;
use parking_lot::Mutex;

use crate::edge::Edge;
use crate::feature::map::FeatureMap;
use crate::graph::TemporalGraph;
use crate::query::result::PartialMatch;

fn hash_str(s: &str) -> u64 {
    let mut hasher = FxHasher::default();
    s.hash(&mut hasher);
    hasher.finish()
}

/// One slot's matches, sharded across lanes so concurrent `add`/`process`
/// calls touching the same slot don't all fight over one list (spec.md
/// §4.3: "sharded into per-worker lists to amortize mutex contention").
struct Slot {
    lanes: Vec<Mutex<Vec<PartialMatch>>>,
}

impl Slot {
    fn new(num_lanes: usize) -> Self {
        let mut lanes = Vec::with_capacity(num_lanes);
        lanes.resize_with(num_lanes, || Mutex::new(Vec::new()));
        Self { lanes }
    }

    /// Appends to whichever lane currently holds the fewest matches.
    fn add(&self, partial: PartialMatch) {
        let mut min_index = 0;
        let mut min_len = usize::MAX;
        for (i, lane) in self.lanes.iter().enumerate() {
            let len = lane.lock().len();
            if len < min_len {
                min_len = len;
                min_index = i;
            }
        }
        self.lanes[min_index].lock().push(partial);
    }

    fn len(&self) -> usize {
        self.lanes.iter().map(|lane| lane.lock().len()).sum()
    }
}

/// Hash table of size `T` whose slot index is a function of a partial
/// match's next required edge's bound endpoints, plus a capacity-bounded
/// ring of completed matches that overwrites oldest-first on overflow
/// (spec.md §3 "Result map", §4.3).
pub struct ResultMap {
    table_capacity: usize,
    slots: Vec<Slot>,
    results: Mutex<Vec<Option<PartialMatch>>>,
    results_capacity: usize,
    num_results: AtomicU64,
}

impl ResultMap {
    pub fn new(table_capacity: usize, results_capacity: usize, num_lanes: usize) -> Self {
        assert!(table_capacity > 0, "result map table capacity must be positive");
        assert!(results_capacity > 0, "result map results capacity must be positive");
        let mut slots = Vec::with_capacity(table_capacity);
        slots.resize_with(table_capacity, || Slot::new(num_lanes.max(1)));
        let mut results = Vec::with_capacity(results_capacity);
        results.resize_with(results_capacity, || None);
        Self {
            table_capacity,
            slots,
            results: Mutex::new(results),
            results_capacity,
            num_results: AtomicU64::new(0),
        }
    }

    pub fn num_results(&self) -> u64 {
        self.num_results.load(Ordering::Relaxed)
    }

    pub fn num_intermediate_results(&self) -> usize {
        self.slots.iter().map(Slot::len).sum()
    }

    pub fn results_capacity(&self) -> usize {
        self.results_capacity
    }

    /// Snapshot of completed matches currently held in the ring (empty
    /// slots not yet written are omitted).
    pub fn results(&self) -> Vec<PartialMatch> {
        self.results.lock().iter().filter_map(|slot| slot.clone()).collect()
    }

    fn slot_index(&self, source: Option<&str>, target: Option<&str>) -> usize {
        match (source, target) {
            (None, Some(t)) => (hash_str(t) % self.table_capacity as u64) as usize,
            (Some(s), None) => (hash_str(s) % self.table_capacity as u64) as usize,
            (Some(s), Some(t)) => (hash_str(s).wrapping_mul(hash_str(t)) % self.table_capacity as u64) as usize,
            (None, None) => 0,
        }
    }

    /// Files a brand-new partial match: advances it as far as the local
    /// graph allows, then either places it in the result ring (complete) or
    /// hashes it into the intermediate table on its next required edge
    /// (spec.md §4.5 step 2c). Returns every partial that ended up filed
    /// incomplete, so the caller can decide whether any of them need an
    /// outgoing edge request (spec.md §4.3's `edgeRequests` out-parameter,
    /// expressed here as a return value instead).
    pub fn add(&self, partial: PartialMatch, graph: &TemporalGraph, features: &FeatureMap, on_complete: impl FnMut(&PartialMatch)) -> Vec<PartialMatch> {
        let mut frontier = vec![partial];
        self.process_against_graph(&mut frontier, graph, features);
        self.file_all(frontier, on_complete)
    }

    /// Files every result in `frontier`, reporting each one that completes
    /// to `on_complete` before it's copied into the ring — the caller's
    /// only chance to learn which query a just-completed match belongs to,
    /// since the ring itself only stores `PartialMatch`.
    fn file_all(&self, frontier: Vec<PartialMatch>, mut on_complete: impl FnMut(&PartialMatch)) -> Vec<PartialMatch> {
        let mut filed_incomplete = Vec::new();
        for result in frontier {
            if result.is_complete() {
                on_complete(&result);
                self.push_result(result);
            } else {
                let source = result.current_source().cloned();
                let target = result.current_target().cloned();
                let index = self.slot_index(source.as_deref(), target.as_deref());
                self.slots[index].add(result.clone());
                filed_incomplete.push(result);
            }
        }
        filed_incomplete
    }

    fn push_result(&self, partial: PartialMatch) {
        let index = (self.num_results.fetch_add(1, Ordering::Relaxed) as usize) % self.results_capacity;
        self.results.lock()[index] = Some(partial);
    }

    /// Advancement primitive: inspects the three slots keyed on `edge`'s
    /// source, target, and combined hash, extends every matching live
    /// partial with `edge`, and either completes it or re-hashes it
    /// (spec.md §4.3). Returns how many partials were considered.
    /// Returns `(considered, filed_incomplete)`: how many live partials were
    /// tested against `edge`, and the subset of extended partials that ended
    /// up filed incomplete (candidates for an outgoing edge request).
    pub fn process(
        &self,
        edge: &Edge,
        graph: &TemporalGraph,
        current_time: f64,
        features: &FeatureMap,
        on_complete: impl FnMut(&PartialMatch),
    ) -> (usize, Vec<PartialMatch>) {
        let mut indices = std::collections::HashSet::new();
        indices.insert(self.slot_index(Some(&edge.source), None));
        indices.insert(self.slot_index(None, Some(&edge.target)));
        indices.insert(self.slot_index(Some(&edge.source), Some(&edge.target)));

        let mut considered = 0;
        let mut rehash = Vec::new();
        for index in indices {
            considered += self.process_slot(index, edge, current_time, features, &mut rehash);
        }

        self.process_against_graph(&mut rehash, graph, features);
        let filed_incomplete = self.file_all(rehash, on_complete);
        (considered, filed_incomplete)
    }

    fn process_slot(&self, index: usize, edge: &Edge, current_time: f64, features: &FeatureMap, rehash: &mut Vec<PartialMatch>) -> usize {
        let mut considered = 0;
        for lane in &self.slots[index].lanes {
            let mut matches = lane.lock();
            matches.retain(|partial| !partial.is_expired(current_time));
            let mut i = 0;
            while i < matches.len() {
                considered += 1;
                match matches[i].try_add(edge.clone(), features) {
                    Some(extended) => {
                        // The original partial stays put (it may still
                        // match other future edges); the extended copy goes
                        // back through the graph-advancement/re-hash loop.
                        rehash.push(extended);
                        i += 1;
                    }
                    None => {
                        i += 1;
                    }
                }
            }
        }
        considered
    }

    /// Repeatedly scans CSR/CSC from each partial's current bound
    /// source/target for edges satisfying its current description, folding
    /// any further extensions back into the frontier, until nothing in
    /// `frontier` can be advanced further by the local graph alone (spec.md
    /// §4.3's "process-against-graph" loop).
    fn process_against_graph(&self, frontier: &mut Vec<PartialMatch>, graph: &TemporalGraph, features: &FeatureMap) {
        let mut index = 0;
        while index < frontier.len() {
            if frontier[index].is_complete() {
                index += 1;
                continue;
            }
            let Some((start_range, end_range)) = frontier[index].current_time_windows() else {
                index += 1;
                continue;
            };
            let source = frontier[index].current_source().cloned();
            let target = frontier[index].current_target().cloned();

            let mut found = Vec::new();
            if let Some(source) = &source {
                found.extend(graph.find_by_source(source, target.as_ref(), start_range, end_range));
            } else if let Some(target) = &target {
                found.extend(graph.find_by_target(target, None, start_range, end_range));
            }

            for candidate in found {
                if let Some(extended) = frontier[index].try_add(candidate, features) {
                    frontier.push(extended);
                }
            }
            index += 1;
        }
    }
}
