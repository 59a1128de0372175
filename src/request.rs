//! An outstanding ask for edges matching a bound endpoint, and the map of
//! such requests a node holds on behalf of its peers. Grounded on
//! `SamSrc/EdgeRequest.hpp` and `SamSrc/EdgeRequestMap.hpp`.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashers::fx_hash::FxHasher;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::edge::{Edge, VertexId};
use crate::metrics::EngineMetrics;
use crate::partition::{NodeId, Partitioner};
use crate::transport::{Channel, Transport};
use crate::util::HalfOpenTimeRange;

fn hash_str(s: &str) -> u64 {
    let mut hasher = FxHasher::default();
    s.hash(&mut hasher);
    hasher.finish()
}

/// A request, issued by `return_node`, for edges matching the given bound
/// endpoint(s) and falling within the given time windows (spec.md §3 "Edge
/// request"). At least one of `source`/`target` is always set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EdgeRequest {
    pub source: Option<VertexId>,
    pub target: Option<VertexId>,
    pub start_range: HalfOpenTimeRange,
    pub end_range: HalfOpenTimeRange,
    pub return_node: NodeId,
}

impl EdgeRequest {
    /// Mirrors the original's `isExpired`: a request is stale once the
    /// current time has passed the far edge of its end-time window.
    pub fn is_expired(&self, current_time: f64) -> bool {
        current_time > self.end_range.end
    }

    /// Whether `edge` matches this request's bound endpoint(s) (spec.md
    /// §4.4's `sourceCheckFunction`/`targetCheckFunction`/combined check).
    fn matches_endpoints(&self, edge: &Edge) -> bool {
        if self.source.is_none() && self.target.is_none() {
            return false;
        }
        let source_ok = self.source.as_ref().map_or(true, |s| *s == edge.source);
        let target_ok = self.target.as_ref().map_or(true, |t| *t == edge.target);
        source_ok && target_ok
    }
}

/// Hash table of outstanding edge requests made of this node by its peers,
/// indexed by the same slot function §4.3 uses for partial matches (the
/// original's own `SubgraphQueryResultMap::hash`/`EdgeRequestMap::addRequest`
/// share this formula; this crate duplicates it in both places the way the
/// original does, rather than forcing a shared abstraction neither needs).
pub struct EdgeRequestMap {
    num_nodes: usize,
    node_id: NodeId,
    table_capacity: usize,
    slots: Vec<Mutex<Vec<EdgeRequest>>>,
    transport: Arc<dyn Transport>,
    metrics: Mutex<EngineMetrics>,
    edge_pushes: AtomicU64,
    send_fails: AtomicU64,
}

impl EdgeRequestMap {
    pub fn new(num_nodes: usize, node_id: NodeId, table_capacity: usize, transport: Arc<dyn Transport>, metrics: EngineMetrics) -> Self {
        assert!(table_capacity > 0, "edge request map table capacity must be positive");
        let mut slots = Vec::with_capacity(table_capacity);
        slots.resize_with(table_capacity, || Mutex::new(Vec::new()));
        Self {
            num_nodes,
            node_id,
            table_capacity,
            slots,
            transport,
            metrics: Mutex::new(metrics),
            edge_pushes: AtomicU64::new(0),
            send_fails: AtomicU64::new(0),
        }
    }

    fn slot_index(&self, source: Option<&str>, target: Option<&str>) -> usize {
        match (source, target) {
            (None, Some(t)) => (hash_str(t) % self.table_capacity as u64) as usize,
            (Some(s), None) => (hash_str(s) % self.table_capacity as u64) as usize,
            (Some(s), Some(t)) => (hash_str(s).wrapping_mul(hash_str(t)) % self.table_capacity as u64) as usize,
            (None, None) => unreachable!("edge requests always bind at least one endpoint"),
        }
    }

    /// Stores `request`, called from the request-pull thread after a peer's
    /// request arrives (spec.md §4.5 step 4).
    pub fn add(&self, request: EdgeRequest) {
        let index = self.slot_index(request.source.as_deref(), request.target.as_deref());
        self.slots[index].lock().push(request);
    }

    pub fn total_edge_pushes(&self) -> u64 {
        self.edge_pushes.load(Ordering::Relaxed)
    }

    pub fn total_send_failures(&self) -> u64 {
        self.send_fails.load(Ordering::Relaxed)
    }

    pub fn num_outstanding(&self) -> usize {
        self.slots.iter().map(|slot| slot.lock().len()).sum()
    }

    /// Satisfies outstanding requests with `edge`: for every live request
    /// whose bound endpoint(s) match, if `edge` would *not* already reach
    /// `request.return_node` via the partitioner's normal routing, forward
    /// it there. Sends at most once per destination node per call, even if
    /// several requests in different slots resolve to the same peer
    /// (spec.md §4.4; see DESIGN.md's Open Question (b) decision). Expired
    /// requests encountered along the way are dropped.
    pub fn process(&self, edge: &Edge, partitioner: &Partitioner) -> usize {
        let mut indices = HashSet::new();
        indices.insert(self.slot_index(Some(&edge.source), None));
        indices.insert(self.slot_index(None, Some(&edge.target)));
        indices.insert(self.slot_index(Some(&edge.source), Some(&edge.target)));

        let mut sent_to: HashSet<NodeId> = HashSet::new();
        let mut seen = 0;
        for index in indices {
            seen += self.process_slot(index, edge, partitioner, &mut sent_to);
        }
        seen
    }

    fn process_slot(&self, index: usize, edge: &Edge, partitioner: &Partitioner, sent_to: &mut HashSet<NodeId>) -> usize {
        let mut requests = self.slots[index].lock();
        requests.retain(|request| !request.is_expired(edge.start));

        let mut seen = 0;
        for request in requests.iter() {
            if !request.matches_endpoints(edge) {
                continue;
            }
            seen += 1;
            if partitioner.routes_here(edge, request.return_node) {
                // The peer already receives this edge through ordinary
                // partitioned routing; fulfilling the request too would be
                // a redundant send.
                continue;
            }
            if sent_to.insert(request.return_node) {
                self.send(request.return_node, edge);
            }
        }
        seen
    }

    fn send(&self, to: NodeId, edge: &Edge) {
        match bincode::serialize(edge) {
            Ok(bytes) if self.transport.push(Channel::Edge, to, bytes) => {
                self.edge_pushes.fetch_add(1, Ordering::Relaxed);
                self.metrics.lock().edge_request_sent();
            }
            _ => {
                self.send_fails.fetch_add(1, Ordering::Relaxed);
                self.metrics.lock().edge_request_send_failed();
            }
        }
    }

    /// Sends the terminate sentinel to every peer's edge channel (spec.md
    /// §4.5 step 5): once this node has stopped consuming, it can no longer
    /// fulfill requests, so its peers should stop waiting on it.
    pub fn terminate(&self) {
        for node in 0..self.num_nodes {
            if node != self.node_id {
                self.transport.push(Channel::Edge, node, Vec::new());
            }
        }
    }
}
