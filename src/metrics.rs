//! Engine observability: counters for the at-most-once transport and match
//! lifecycle events named throughout spec.md (§4.4, §4.5, §7), plus a
//! send-latency histogram, exported the way the teacher exports its own
//! runtime metrics: a [`metrics_runtime::Receiver`] feeding a CSV exporter
//! on an interval, built from `metrics-core`/`metrics-util`.

use std::thread;
use std::time::Duration;

use log::{trace, warn};
use metrics_runtime::{Controller, Receiver, Sink};

pub use crate::util_metrics::csv_builder::CSVBuilder;
pub use crate::util_metrics::csv_exporter::CSVExporter;

/// Default interval, in milliseconds, for flushing counters to the CSV
/// exporter when one is attached.
pub const REPORTING_PERIOD_MILLISECONDS: u64 = 5_000;

/// Handle used by engine components to record counters and latencies. Cloned
/// cheaply (it wraps a [`Sink`], which is itself cheap to clone) and handed
/// to every thread that needs to report something.
pub struct EngineMetrics {
    sink: Sink,
    /// Send-latency threshold (spec.md §4.4: "latencies over a configurable
    /// threshold are surfaced to the observability layer"); exceeding it
    /// logs a warning in addition to recording the timing.
    send_latency_threshold_micros: u64,
}

impl Clone for EngineMetrics {
    fn clone(&self) -> Self {
        Self {
            sink: self.sink.clone(),
            send_latency_threshold_micros: self.send_latency_threshold_micros,
        }
    }
}

impl EngineMetrics {
    pub fn new(receiver: &Receiver, send_latency_threshold_micros: u64) -> Self {
        Self { sink: receiver.sink(), send_latency_threshold_micros }
    }

    pub fn completed_match(&mut self, query_name: &str) {
        self.sink.record_value(&format!("matches.completed.{}", query_name), 1);
    }

    pub fn partial_match_created(&mut self) {
        self.sink.record_value("matches.partial.created", 1);
    }

    pub fn partial_match_expired(&mut self) {
        self.sink.record_value("matches.partial.expired", 1);
    }

    pub fn duplicate_edge_suppressed(&mut self) {
        self.sink.record_value("edges.duplicate_suppressed", 1);
    }

    pub fn edge_request_sent(&mut self) {
        self.sink.record_value("requests.sent", 1);
    }

    pub fn edge_request_send_failed(&mut self) {
        self.sink.record_value("requests.send_failed", 1);
        warn!("edge-request send failed");
    }

    pub fn malformed_receive(&mut self) {
        self.sink.record_value("receive.malformed", 1);
        warn!("dropped malformed payload from transport");
    }

    /// Records a transport send's wall-clock span. `start`/`end` come from
    /// [`Sink::now`] so they share the sink's monotonic clock.
    pub fn record_send_latency(&mut self, start: u64, end: u64) {
        self.sink.record_timing("transport.send_latency", start, end);
        let micros = (end.saturating_sub(start)) / 1_000;
        if micros > self.send_latency_threshold_micros {
            warn!(
                "transport send took {}us, over the {}us threshold",
                micros, self.send_latency_threshold_micros
            );
        }
        trace!("recorded send latency of {}us", micros);
    }

    pub fn now(&self) -> u64 {
        self.sink.now()
    }
}

/// Spawns a background thread that periodically drains `controller` into a
/// CSV file per metric under `reporting_dir`, mirroring the teacher's own
/// `CSVExporter::run` usage in its runner binaries. Returns the join handle
/// so callers can decide whether to detach or wait on it.
pub fn spawn_csv_exporter(controller: Controller, reporting_dir: String) -> thread::JoinHandle<()> {
    let mut exporter = CSVExporter::new(
        controller,
        CSVBuilder::default(),
        &reporting_dir,
        Duration::from_millis(REPORTING_PERIOD_MILLISECONDS),
    );
    thread::spawn(move || exporter.run())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_handle_clones_and_records_without_panicking() {
        let receiver = Receiver::builder().build().expect("failed to create receiver");
        let mut metrics = EngineMetrics::new(&receiver, 1_000);
        let mut clone = metrics.clone();

        metrics.completed_match("watering_hole");
        clone.partial_match_created();
        clone.edge_request_sent();
        let start = clone.now();
        clone.record_send_latency(start, start + 500);
    }
}
