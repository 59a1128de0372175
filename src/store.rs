//! The graph store: the per-node orchestrator that ties the temporal
//! graph, the result map, the edge-request map, and the transport fabric
//! together into the engine's `consume`/pull-thread lifecycle. Grounded on
//! `SamSrc/GraphStore.hpp`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Mutex, RwLock};

use crate::config::EngineConfig;
use crate::edge::{restamp, Edge, SamId};
use crate::error::{EngineError, Result};
use crate::feature::map::FeatureMap;
use crate::graph::TemporalGraph;
use crate::metrics::EngineMetrics;
use crate::partition::{NodeId, Partitioner};
use crate::query::result::PartialMatch;
use crate::query::result_map::ResultMap;
use crate::query::subquery::SubgraphQuery;
use crate::request::{EdgeRequest, EdgeRequestMap};
use crate::transport::{is_terminate, Channel, Transport};

/// A subgraph query registered under a name, used to label completed-match
/// metrics and for callers to find their own registrations back.
struct RegisteredQuery {
    name: String,
    query: Arc<SubgraphQuery>,
}

/// Per-node orchestrator (spec.md §4.5): owns the CSR/CSC, the result map,
/// the edge-request map, the registered queries, and the transport, and
/// implements the `consume`/pull-thread/`terminate` lifecycle.
pub struct GraphStore {
    node_id: NodeId,
    partitioner: Partitioner,
    graph: TemporalGraph,
    result_map: ResultMap,
    edge_request_map: EdgeRequestMap,
    feature_map: Arc<FeatureMap>,
    queries: RwLock<Vec<RegisteredQuery>>,
    transport: Arc<dyn Transport>,
    config: EngineConfig,
    metrics: Mutex<EngineMetrics>,
    next_id: AtomicU64,
    terminated: AtomicBool,
    pull_handles: Mutex<Option<Vec<JoinHandle<()>>>>,
}

impl GraphStore {
    /// Validates `config` and builds a fresh, query-free store. `transport`
    /// must already be wired to every peer named by `config.num_nodes`.
    pub fn new(config: EngineConfig, transport: Arc<dyn Transport>, metrics: EngineMetrics, feature_map: Arc<FeatureMap>) -> Result<Self> {
        config.validate()?;
        let partitioner = Partitioner::new(config.num_nodes);
        let graph = TemporalGraph::new(config.graph_capacity, config.time_window);
        let result_map = ResultMap::new(config.table_capacity, config.results_capacity, config.num_pull_threads.max(1));
        let edge_request_map = EdgeRequestMap::new(config.num_nodes, config.node_id, config.table_capacity, transport.clone(), metrics.clone());

        Ok(Self {
            node_id: config.node_id,
            partitioner,
            graph,
            result_map,
            edge_request_map,
            feature_map,
            queries: RwLock::new(Vec::new()),
            transport,
            config,
            metrics: Mutex::new(metrics),
            next_id: AtomicU64::new(0),
            terminated: AtomicBool::new(false),
            pull_handles: Mutex::new(None),
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn graph(&self) -> &TemporalGraph {
        &self.graph
    }

    pub fn feature_map(&self) -> &Arc<FeatureMap> {
        &self.feature_map
    }

    pub fn result_map(&self) -> &ResultMap {
        &self.result_map
    }

    pub fn edge_request_map(&self) -> &EdgeRequestMap {
        &self.edge_request_map
    }

    /// Every node in the cluster must call this with the same `name` and an
    /// equivalently-built `query` before any edge that could match it is
    /// consumed (spec.md §4.5 step 1: "broadcast-register on all nodes;
    /// each node holds an identical copy"). Broadcasting itself is left to
    /// the caller, who is assumed to be calling this once per node.
    pub fn register_query(&self, name: impl Into<String>, query: SubgraphQuery) {
        self.queries.write().push(RegisteredQuery { name: name.into(), query: Arc::new(query) });
    }

    fn next_local_id(&self) -> SamId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Entry point for freshly ingested edges (spec.md §4.5 step 2). Stamps
    /// a local id, then routes to every node the partitioner says must hold
    /// this edge — itself included, if it's one of the owners.
    pub fn consume(&self, edge: Edge) -> Result<()> {
        if self.terminated.load(Ordering::Acquire) {
            return Err(EngineError::Terminated);
        }
        for destination in self.partitioner.destinations(&edge) {
            if destination == self.node_id {
                let local_edge = restamp(edge.clone(), self.next_local_id());
                self.process_local(local_edge);
            } else {
                self.forward_edge(destination, &edge);
            }
        }
        Ok(())
    }

    fn forward_edge(&self, destination: NodeId, edge: &Edge) {
        match bincode::serialize(edge) {
            Ok(bytes) => {
                if !self.transport.push(Channel::Edge, destination, bytes) {
                    self.metrics.lock().edge_request_send_failed();
                }
            }
            Err(_) => self.metrics.lock().malformed_receive(),
        }
    }

    /// Steps 2b–2e of spec.md §4.5, shared by `consume` (after partitioning
    /// and restamping) and the edge pull thread (after deserializing and
    /// restamping a remote edge, with the partitioner bypassed).
    fn process_local(&self, edge: Edge) {
        self.graph.insert(edge.clone());

        let registered = self.queries.read();
        for RegisteredQuery { name, query } in registered.iter() {
            if let Some(partial) = PartialMatch::new(query.clone(), edge.clone(), &self.feature_map) {
                self.metrics.lock().partial_match_created();
                let incomplete = self.result_map.add(partial, &self.graph, &self.feature_map, |_| {
                    self.metrics.lock().completed_match(name);
                });
                for partial in incomplete {
                    self.maybe_request_remote(&partial);
                }
            }
        }

        let current_time = self.graph.current_time();
        let (_, incomplete) = self.result_map.process(&edge, &self.graph, current_time, &self.feature_map, |partial| {
            let name = registered.iter().find(|r| Arc::ptr_eq(&r.query, partial.query())).map(|r| r.name.as_str()).unwrap_or("");
            self.metrics.lock().completed_match(name);
        });
        for partial in incomplete {
            self.maybe_request_remote(&partial);
        }
        drop(registered);

        self.edge_request_map.process(&edge, &self.partitioner);
    }

    /// If `partial`'s next required edge is bound to a vertex this node
    /// doesn't own, emits an edge request to whichever node does (spec.md
    /// §4.5 step 2c/2d: "If the next edge hashes to a remote node, emit an
    /// edge request").
    fn maybe_request_remote(&self, partial: &PartialMatch) {
        let (start_range, end_range) = match partial.current_time_windows() {
            Some(windows) => windows,
            None => return,
        };
        let source = partial.current_source().cloned();
        let target = partial.current_target().cloned();

        for (vertex, is_source) in [(source.as_ref(), true), (target.as_ref(), false)] {
            let vertex = match vertex {
                Some(vertex) => vertex,
                None => continue,
            };
            let owner = self.partitioner.owner_of(vertex);
            if owner == self.node_id {
                continue;
            }
            let request = if is_source {
                EdgeRequest { source: Some(vertex.clone()), target: None, start_range, end_range, return_node: self.node_id }
            } else {
                EdgeRequest { source: None, target: Some(vertex.clone()), start_range, end_range, return_node: self.node_id }
            };
            self.send_request(owner, request);
        }
    }

    fn send_request(&self, to: NodeId, request: EdgeRequest) {
        match bincode::serialize(&request) {
            Ok(bytes) => {
                if self.transport.push(Channel::Request, to, bytes) {
                    self.metrics.lock().edge_request_sent();
                } else {
                    self.metrics.lock().edge_request_send_failed();
                }
            }
            Err(_) => self.metrics.lock().malformed_receive(),
        }
    }

    /// Answers `request` immediately with any matching edges already live in
    /// the local graph, in addition to leaving it in the edge-request map
    /// for edges that arrive later (spec.md §4.5 step 4; §3 "Edge-request
    /// map": new requests can be satisfied by edges that predate them).
    fn answer_from_graph(&self, request: &EdgeRequest) {
        let found = match (&request.source, &request.target) {
            (Some(source), target) => self.graph.find_by_source(source, target.as_ref(), request.start_range, request.end_range),
            (None, Some(target)) => self.graph.find_by_target(target, None, request.start_range, request.end_range),
            (None, None) => Vec::new(),
        };
        for edge in found {
            self.forward_edge(request.return_node, &edge);
        }
    }

    /// Spawns `config.num_pull_threads` pairs of pull threads (one edge, one
    /// request, per configured parallelism) that drain `transport` until
    /// they see a terminate sentinel from every peer or their idle grace
    /// elapses (spec.md §4.5 steps 3-4, §5's pull-thread exit condition).
    /// Returns immediately; join happens inside `terminate`.
    pub fn spawn_pull_threads(self: &Arc<Self>) {
        let mut handles = Vec::new();
        for _ in 0..self.config.num_pull_threads.max(1) {
            handles.push(self.clone().spawn_edge_pull_thread());
            handles.push(self.clone().spawn_request_pull_thread());
        }
        *self.pull_handles.lock() = Some(handles);
    }

    fn spawn_edge_pull_thread(self: Arc<Self>) -> JoinHandle<()> {
        std::thread::spawn(move || {
            let mut peers_terminated = vec![false; self.config.num_nodes];
            peers_terminated[self.node_id] = true;
            loop {
                if peers_terminated.iter().all(|done| *done) {
                    return;
                }
                match self.transport.pull(Channel::Edge) {
                    None => {
                        if self.terminated.load(Ordering::Acquire) {
                            return;
                        }
                        continue;
                    }
                    Some(message) if is_terminate(&message) => {
                        // The reference transport doesn't tag which peer
                        // terminated; any sentinel counts toward every peer
                        // not yet marked, since a cluster-wide terminate is
                        // the only caller of `EdgeRequestMap::terminate`.
                        peers_terminated.iter_mut().for_each(|done| *done = true);
                    }
                    Some(message) => match bincode::deserialize::<Edge>(&message) {
                        Ok(edge) => {
                            let edge = restamp(edge, self.next_local_id());
                            self.process_local(edge);
                        }
                        Err(_) => self.metrics.lock().malformed_receive(),
                    },
                }
            }
        })
    }

    fn spawn_request_pull_thread(self: Arc<Self>) -> JoinHandle<()> {
        std::thread::spawn(move || loop {
            if self.terminated.load(Ordering::Acquire) {
                match self.transport.pull(Channel::Request) {
                    None => return,
                    Some(message) if is_terminate(&message) => return,
                    Some(message) => match bincode::deserialize::<EdgeRequest>(&message) {
                        Ok(request) => {
                            self.answer_from_graph(&request);
                            self.edge_request_map.add(request);
                        }
                        Err(_) => self.metrics.lock().malformed_receive(),
                    },
                }
                continue;
            }
            match self.transport.pull(Channel::Request) {
                None => continue,
                Some(message) if is_terminate(&message) => return,
                Some(message) => match bincode::deserialize::<EdgeRequest>(&message) {
                    Ok(request) => {
                        self.answer_from_graph(&request);
                        self.edge_request_map.add(request);
                    }
                    Err(_) => self.metrics.lock().malformed_receive(),
                },
            }
        })
    }

    /// Marks the store terminated, sends terminate sentinels to every peer
    /// on both channels, and joins every pull thread. Idempotent: a second
    /// call is a no-op (spec.md §8: "`graph_store.terminate()` called twice
    /// is a no-op").
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        self.edge_request_map.terminate();
        for node in 0..self.config.num_nodes {
            if node != self.node_id {
                self.transport.push(Channel::Request, node, Vec::new());
            }
        }
        if let Some(handles) = self.pull_handles.lock().take() {
            for handle in handles {
                let _ = handle.join();
            }
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub fn results(&self) -> Vec<PartialMatch> {
        self.result_map.results()
    }

    pub fn num_completed(&self) -> u64 {
        self.result_map.num_results()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::FieldValue;
    use crate::query::description::{EdgeDescriptionBuilder, OpenTimeRange};
    use crate::query::subquery::SubgraphQueryBuilder;
    use crate::transport::InProcessFabric;
    use metrics_runtime::Receiver;
    use std::time::Duration;

    fn test_metrics() -> EngineMetrics {
        let receiver = Receiver::builder().build().unwrap();
        EngineMetrics::new(&receiver, 1_000)
    }

    fn single_node_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.graph_capacity = 64;
        config.table_capacity = 64;
        config.results_capacity = 16;
        config.feature_map_capacity = 64;
        config.time_window = 1000.0;
        config
    }

    fn one_hop_query() -> SubgraphQuery {
        SubgraphQueryBuilder::new()
            .add_description(
                EdgeDescriptionBuilder::new("y", "e1", "x")
                    .with_start_time_range(OpenTimeRange::bounded(0.0, 1000.0))
                    .with_end_time_range(OpenTimeRange::bounded(0.0, 1000.0)),
            )
            .finalize()
            .unwrap()
    }

    #[test]
    fn consume_on_a_single_node_completes_a_one_hop_match() {
        let cluster = InProcessFabric::cluster(1, Duration::from_millis(50));
        let feature_map = Arc::new(FeatureMap::new(64));
        let store = GraphStore::new(single_node_config(), cluster[0].clone(), test_metrics(), feature_map).unwrap();
        store.register_query("one_hop", one_hop_query());

        let edge = Edge::new(0, "1.1.1.1".into(), "2.2.2.2".into(), 10.0, 1.0).with_field("proto", FieldValue::Text("tcp".into()));
        store.consume(edge).unwrap();

        assert_eq!(store.num_completed(), 1);
        assert_eq!(store.results()[0].result_edges().len(), 1);
    }

    #[test]
    fn consume_after_terminate_is_rejected() {
        let cluster = InProcessFabric::cluster(1, Duration::from_millis(50));
        let feature_map = Arc::new(FeatureMap::new(64));
        let store = GraphStore::new(single_node_config(), cluster[0].clone(), test_metrics(), feature_map).unwrap();
        store.terminate();

        let edge = Edge::new(0, "a".into(), "b".into(), 0.0, 1.0);
        assert!(matches!(store.consume(edge), Err(EngineError::Terminated)));
    }

    #[test]
    fn terminate_twice_is_a_no_op() {
        let cluster = InProcessFabric::cluster(1, Duration::from_millis(50));
        let feature_map = Arc::new(FeatureMap::new(64));
        let store = GraphStore::new(single_node_config(), cluster[0].clone(), test_metrics(), feature_map).unwrap();
        store.terminate();
        store.terminate();
        assert!(store.is_terminated());
    }

    #[test]
    fn an_edge_with_no_matching_query_leaves_the_result_ring_empty() {
        let cluster = InProcessFabric::cluster(1, Duration::from_millis(50));
        let feature_map = Arc::new(FeatureMap::new(64));
        let store = GraphStore::new(single_node_config(), cluster[0].clone(), test_metrics(), feature_map).unwrap();

        let edge = Edge::new(0, "a".into(), "b".into(), 0.0, 1.0);
        store.consume(edge).unwrap();
        assert_eq!(store.num_completed(), 0);
    }
}
