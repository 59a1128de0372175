//! A partial match against a subgraph query: the data that has satisfied
//! the query so far, and the machinery to try extending it with one more
//! edge. Grounded on `SamSrc/SubgraphQueryResult.hpp`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::edge::{Edge, EdgeFingerprint, SamId, VertexId};
use crate::feature::map::FeatureMap;
use crate::query::subquery::SubgraphQuery;
use crate::util::HalfOpenTimeRange;

/// A single in-progress (or completed) attempt to satisfy a
/// [`SubgraphQuery`]. Immutable once produced: advancing a match clones it
/// (`QueryResult::addEdge` in the original), so concurrent readers never
/// observe a torn update.
#[derive(Clone)]
pub struct PartialMatch {
    query: Arc<SubgraphQuery>,
    var_bindings: HashMap<String, VertexId>,
    result_edges: Vec<Edge>,
    current_edge: usize,
    /// Anchor time for this match's time windows — see spec.md §9 Open
    /// Question (a): the start time of the first edge when that
    /// description's start range is the one the query author actually
    /// bounded, otherwise the first edge's end time.
    t0: f64,
    expire_time: f64,
    seen_fingerprints: HashSet<EdgeFingerprint>,
    seen_sam_ids: HashSet<SamId>,
}

impl PartialMatch {
    /// Creates a new partial match from an edge that has already been
    /// confirmed to satisfy the query's first edge description. Returns
    /// `None` if binding variables from `first_edge` would be inconsistent
    /// — which cannot happen for a brand-new match with no prior bindings,
    /// but is expressed as `Option` for symmetry with `try_add`.
    pub fn new(query: Arc<SubgraphQuery>, first_edge: Edge, features: &FeatureMap) -> Option<Self> {
        let description = query.description(0);
        let t0 = if description.anchor_on_start { first_edge.start } else { first_edge.end_time() };
        let expire_time = t0 + query.max_time_extent();

        let mut partial = Self {
            query,
            var_bindings: HashMap::new(),
            result_edges: Vec::new(),
            current_edge: 0,
            t0,
            expire_time,
            seen_fingerprints: HashSet::new(),
            seen_sam_ids: HashSet::new(),
        };
        if partial.append(first_edge, features) {
            Some(partial)
        } else {
            None
        }
    }

    /// The query this match is attempting to satisfy, used by the graph
    /// store to label metrics and to decide whether a filed-incomplete match
    /// needs an outgoing edge request.
    pub fn query(&self) -> &Arc<SubgraphQuery> {
        &self.query
    }

    pub fn is_complete(&self) -> bool {
        self.current_edge == self.query.len()
    }

    pub fn is_expired(&self, current_time: f64) -> bool {
        current_time > self.expire_time
    }

    pub fn expire_time(&self) -> f64 {
        self.expire_time
    }

    pub fn result_edges(&self) -> &[Edge] {
        &self.result_edges
    }

    /// The bound value for the current (next-to-satisfy) edge description's
    /// source variable, if any.
    pub fn current_source(&self) -> Option<&VertexId> {
        if self.is_complete() {
            return None;
        }
        self.var_bindings.get(&self.query.description(self.current_edge).source_var)
    }

    pub fn current_target(&self) -> Option<&VertexId> {
        if self.is_complete() {
            return None;
        }
        self.var_bindings.get(&self.query.description(self.current_edge).target_var)
    }

    /// The current description's time windows, shifted into absolute time
    /// by this match's anchor `t0`.
    pub fn current_time_windows(&self) -> Option<(HalfOpenTimeRange, HalfOpenTimeRange)> {
        if self.is_complete() {
            return None;
        }
        let description = self.query.description(self.current_edge);
        let start = HalfOpenTimeRange::new(description.start_time_range.start + self.t0, description.start_time_range.end + self.t0);
        let end = HalfOpenTimeRange::new(description.end_time_range.start + self.t0, description.end_time_range.end + self.t0);
        Some((start, end))
    }

    /// Tries to extend this match with `edge` without mutating `self`,
    /// returning a new, independent `PartialMatch` on success (spec.md
    /// §4.3: "clone the partial, append edge, advance"). Rejects `edge` if
    /// it's already been consumed by this match (by sam id or fingerprint),
    /// if it violates the current description's time constraints, or if it
    /// conflicts with already-bound source/target variables.
    pub fn try_add(&self, edge: Edge, features: &FeatureMap) -> Option<PartialMatch> {
        if self.is_complete() {
            return None;
        }
        if self.seen_sam_ids.contains(&edge.id) || self.seen_fingerprints.contains(&edge.fingerprint()) {
            return None;
        }

        let mut candidate = self.clone();
        if candidate.append(edge, features) {
            Some(candidate)
        } else {
            None
        }
    }

    /// In-place extension used both by `new` (for the first edge) and
    /// `try_add` (on a fresh clone). Returns `false` without mutating
    /// anything observable to the caller (the clone is discarded) if
    /// `edge` doesn't satisfy the current description, its bindings, or any
    /// of its vertex constraints (spec.md §4.3 step 2, §4.5 step 2c).
    fn append(&mut self, edge: Edge, features: &FeatureMap) -> bool {
        let description = self.query.description(self.current_edge).clone();
        if !description.satisfies_time_constraints(&edge, self.t0) {
            return false;
        }

        let source_bound = self.var_bindings.get(&description.source_var).cloned();
        let target_bound = self.var_bindings.get(&description.target_var).cloned();

        match (source_bound, target_bound) {
            (Some(bound_source), None) => {
                if edge.source != bound_source {
                    return false;
                }
                self.var_bindings.insert(description.target_var.clone(), edge.target.clone());
            }
            (None, Some(bound_target)) => {
                if edge.target != bound_target {
                    return false;
                }
                self.var_bindings.insert(description.source_var.clone(), edge.source.clone());
            }
            (None, None) => {
                self.var_bindings.insert(description.source_var.clone(), edge.source.clone());
                self.var_bindings.insert(description.target_var.clone(), edge.target.clone());
            }
            (Some(bound_source), Some(bound_target)) => {
                if edge.source != bound_source || edge.target != bound_target {
                    return false;
                }
            }
        }

        for constraint in &description.vertex_constraints {
            let bound_vertex = match self.var_bindings.get(&constraint.variable) {
                Some(vertex) => vertex,
                None => return false,
            };
            if !constraint.evaluate(bound_vertex, features) {
                return false;
            }
        }

        self.seen_sam_ids.insert(edge.id);
        self.seen_fingerprints.insert(edge.fingerprint());
        self.result_edges.push(edge);
        self.current_edge += 1;
        true
    }
}
