//! Partitioned streaming graph engine: windowed aggregates and temporal
//! subgraph matching over sharded event streams.
//!
//! The module layout mirrors the reference engine's own components: an
//! [`edge`] model flowing through a [`partition`]-routed [`graph`] store,
//! matched against registered [`query`] patterns, with [`feature`] values
//! feeding vertex constraints and an [`EdgeRequestMap`](request) closing the
//! cross-shard loop. [`transport`] is the push/pull fabric tying nodes
//! together; [`config`], [`error`], and [`metrics`] are the ambient plumbing.

pub mod config;
pub mod edge;
pub mod error;
pub mod feature;
pub mod graph;
pub mod metrics;
pub mod netflow;
pub mod partition;
pub mod query;
pub mod request;
pub mod store;
pub mod transport;
pub mod util;
pub mod util_metrics;

pub use config::EngineConfig;
pub use edge::{Edge, FieldValue, SamId, VertexId};
pub use error::{EngineError, Result};
pub use feature::map::FeatureMap;
pub use feature::Feature;
pub use graph::TemporalGraph;
pub use metrics::EngineMetrics;
pub use partition::{NodeId, Partitioner};
pub use query::{EdgeDescription, EdgeDescriptionBuilder, PartialMatch, ResultMap, SubgraphQuery, SubgraphQueryBuilder};
pub use request::{EdgeRequest, EdgeRequestMap};
pub use store::GraphStore;
pub use transport::{Channel, InProcessFabric, Transport};
