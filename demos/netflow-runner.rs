//! Drives an in-process cluster of graph stores from a NetFlow CSV file, the
//! way `sga-runner.rs` drives a timely dataflow from a streaming graph edge
//! file. Reports the same kind of per-interval counters to a CSV exporter.
//!
//! Arguments:
//! 1. input file: a NetFlow CSV file (no header), one record per line
//! 2. reporting dir: directory per-metric CSVs are written to
//! 3. num_nodes: cluster size (every node runs in this one process, wired
//!    together by the in-process transport fabric)
//! 4. query name: `triangle` or `watering_hole`

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::time::Duration;

use log::{info, trace};
use metrics_runtime::Receiver;

use sam_graph::config::EngineConfig;
use sam_graph::feature::map::FeatureMap;
use sam_graph::metrics::{spawn_csv_exporter, EngineMetrics};
use sam_graph::netflow::NetflowRecord;
use sam_graph::query::description::{EdgeDescriptionBuilder, OpenTimeRange};
use sam_graph::query::expr::VertexConstraint;
use sam_graph::query::subquery::{SubgraphQuery, SubgraphQueryBuilder};
use sam_graph::store::GraphStore;
use sam_graph::transport::InProcessFabric;

fn triangle_query(window: f64) -> SubgraphQuery {
    SubgraphQueryBuilder::new()
        .add_description(EdgeDescriptionBuilder::new("a", "e1", "b").with_start_time_range(OpenTimeRange::bounded(0.0, window)))
        .add_description(EdgeDescriptionBuilder::new("b", "e2", "c").with_start_time_range(OpenTimeRange::bounded(0.0, window)))
        .add_description(EdgeDescriptionBuilder::new("c", "e3", "a").with_start_time_range(OpenTimeRange::bounded(0.0, window)))
        .finalize()
        .expect("triangle query is well-formed")
}

fn watering_hole_query(window: f64) -> SubgraphQuery {
    let in_popular = || VertexConstraint::parse("v in popular_dest").expect("constraint is well-formed");
    SubgraphQueryBuilder::new()
        .add_description(
            EdgeDescriptionBuilder::new("a", "e1", "v")
                .with_start_time_range(OpenTimeRange::bounded(0.0, window))
                .with_constraint(in_popular()),
        )
        .add_description(
            EdgeDescriptionBuilder::new("b", "e2", "v")
                .with_start_time_range(OpenTimeRange::bounded(0.0, window))
                .with_constraint(in_popular()),
        )
        .finalize()
        .expect("watering hole query is well-formed")
}

fn build_query(name: &str, window: f64) -> SubgraphQuery {
    match name {
        "triangle" => triangle_query(window),
        "watering_hole" => watering_hole_query(window),
        other => panic!("unknown query name: {} (expected 'triangle' or 'watering_hole')", other),
    }
}

fn main() {
    env_logger::init();

    let mut args = std::env::args();
    args.next();
    let input_path = args.next().expect("usage: netflow-runner <input-file> <reporting-dir> <num-nodes> <query-name>");
    let reporting_dir = args.next().expect("missing reporting directory argument");
    let num_nodes: usize = args.next().expect("missing num-nodes argument").parse().expect("num-nodes must be an integer");
    let query_name = args.next().expect("missing query-name argument");

    let receiver = Receiver::builder().build().expect("failed to create metrics receiver");
    spawn_csv_exporter(receiver.controller(), reporting_dir);

    let cluster = InProcessFabric::cluster(num_nodes, Duration::from_millis(200));
    let feature_map = Arc::new(FeatureMap::new(1 << 16));

    let stores: Vec<Arc<GraphStore>> = (0..num_nodes)
        .map(|node_id| {
            let mut config = EngineConfig::default();
            config.num_nodes = num_nodes;
            config.node_id = node_id;
            config.hostnames = (0..num_nodes).map(|i| format!("node-{}", i)).collect();

            let metrics = EngineMetrics::new(&receiver, 1_000);
            let store = GraphStore::new(config, cluster[node_id].clone(), metrics, feature_map.clone()).expect("engine configuration is valid");
            store.register_query(query_name.as_str(), build_query(&query_name, 100.0));
            Arc::new(store)
        })
        .collect();

    for store in &stores {
        store.spawn_pull_threads();
    }

    let file = File::open(&input_path).expect("cannot open input file");
    let reader = BufReader::new(file);

    let ingest = &stores[0];
    let mut total_edges = 0u64;
    for line in reader.lines() {
        let line = line.expect("failed to read input line");
        if line.trim().is_empty() {
            continue;
        }
        let record = match NetflowRecord::parse_line(&line) {
            Ok(record) => record,
            Err(e) => {
                trace!("skipping malformed NetFlow line: {}", e);
                continue;
            }
        };
        let edge = record.into_edge(0);
        ingest.consume(edge).expect("engine has not been terminated");
        total_edges += 1;
    }

    for store in &stores {
        store.terminate();
    }

    let total_completed: u64 = stores.iter().map(|store| store.num_completed()).sum();
    info!("consumed {} edges, completed {} matches for query '{}' across {} node(s)", total_edges, total_completed, query_name, num_nodes);
}
