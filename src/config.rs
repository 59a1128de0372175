//! Cluster and engine configuration (spec.md §6).

use crate::error::{EngineError, Result};

/// All tunables recognized by the engine, one field per entry in spec.md's
/// configuration table.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Number of nodes in the cluster.
    pub num_nodes: usize,
    /// This node's id, in `0..num_nodes`.
    pub node_id: usize,
    /// Peer hostnames, indexed by node id (ambient: transport endpoint discovery).
    pub hostnames: Vec<String>,
    /// First port used when deriving per-peer transport endpoints.
    pub starting_port: u16,
    /// Per-socket high-water mark.
    pub hwm: usize,
    /// Ingress batch size before parallel fan-out.
    pub queue_length: usize,
    /// CSR/CSC table size `C`.
    pub graph_capacity: usize,
    /// Result-map / edge-request-map slot count `T`.
    pub table_capacity: usize,
    /// Completed-result ring capacity.
    pub results_capacity: usize,
    /// CSR/CSC edge retention window, in seconds.
    pub time_window: f64,
    /// Default per-edge max start-end offset used to widen unbounded query
    /// time ranges at `finalize()`.
    pub query_time_window: f64,
    /// Parallel push sockets per peer.
    pub num_push_sockets: usize,
    /// Per-node pull-thread parallelism.
    pub num_pull_threads: usize,
    /// Transport send timeout in milliseconds; `-1` blocks indefinitely.
    pub timeout_ms: i64,
    /// Sliding-window top-k parameter: total window size.
    pub n: usize,
    /// Sliding-window top-k parameter: block size.
    pub b: usize,
    /// Sliding-window / exponential-histogram top-k parameter.
    pub k: usize,
    /// Feature-map fixed capacity (should be sized by the operator as
    /// roughly `2 * numKeys * numFeatures`, per the original implementation's
    /// own sizing guidance).
    pub feature_map_capacity: usize,
    /// Grace period pull threads wait for data before checking for a
    /// sentinel-from-every-peer exit condition, in milliseconds.
    pub pull_idle_grace_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_nodes: 1,
            node_id: 0,
            hostnames: vec!["127.0.0.1".to_string()],
            starting_port: 10_000,
            hwm: 1_000,
            queue_length: 256,
            graph_capacity: 1 << 16,
            table_capacity: 1 << 14,
            results_capacity: 1 << 12,
            time_window: 10.0,
            query_time_window: 10.0,
            num_push_sockets: 1,
            num_pull_threads: 1,
            timeout_ms: -1,
            n: 10_000,
            b: 1_000,
            k: 100,
            feature_map_capacity: 1 << 16,
            pull_idle_grace_ms: 10_000,
        }
    }
}

impl EngineConfig {
    /// Fatal-at-construction checks (spec.md §7: "invalid configuration").
    pub fn validate(&self) -> Result<()> {
        if self.node_id >= self.num_nodes {
            return Err(EngineError::InvalidConfiguration(format!(
                "node_id {} is out of range for num_nodes {}",
                self.node_id, self.num_nodes
            )));
        }
        if self.hostnames.len() != self.num_nodes {
            return Err(EngineError::InvalidConfiguration(format!(
                "expected {} hostnames, got {}",
                self.num_nodes,
                self.hostnames.len()
            )));
        }
        if self.b == 0 || self.n == 0 {
            return Err(EngineError::InvalidConfiguration("N and b must be non-zero".into()));
        }
        if dormant_block_capacity(self.n, self.b) == 0 {
            return Err(EngineError::InvalidConfiguration(format!(
                "N/b - 1 <= 0 for N={} b={}; top-k window would hold no dormant blocks",
                self.n, self.b
            )));
        }
        if self.graph_capacity == 0 || self.table_capacity == 0 || self.feature_map_capacity == 0 {
            return Err(EngineError::InvalidConfiguration("capacities must be non-zero".into()));
        }
        Ok(())
    }
}

/// `N/b - 1` (integer division), the number of dormant blocks a top-k
/// sliding window holds — matches `feature::topk::SlidingWindow::new`.
pub fn dormant_block_capacity(n: usize, b: usize) -> usize {
    (n / b).saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_node_id_out_of_range() {
        let mut cfg = EngineConfig::default();
        cfg.node_id = 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_degenerate_topk_window() {
        let mut cfg = EngineConfig::default();
        cfg.n = 10;
        cfg.b = 10;
        // ceil(10/10) - 1 == 0
        assert!(cfg.validate().is_err());
    }
}
