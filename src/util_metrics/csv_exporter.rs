//! Exports metrics into a csv file, mimicking the `LogExporter` from
//! `metrics_runtime`.
//!
//! This exporter can utilize observers that are able to be converted to a
//! textual representation via [`Drain<String>`]. It emits that output to a
//! specified csv file.
//!
//! # Run Modes
//! - Using `run` will block the current thread, capturing a snapshot and
//!   logging it based on the configured interval.
#![deny(missing_docs)]

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::{thread, time::Duration};

use csv::Writer;
use log::trace;
use metrics_core::{Builder, Drain, Observe, Observer};

/// Exports metrics by converting them to a textual representation and
/// printing them into a csv file.
pub struct CSVExporter<C, B>
where
    B: Builder,
{
    controller: C,
    observer: B::Output,
    reporting_dir: PathBuf,
    interval: Duration,
    metric_writer: HashMap<String, Writer<File>>,
}

impl<C, B> CSVExporter<C, B>
where
    B: Builder,
    B::Output: Drain<Vec<(String, Vec<String>, Vec<String>)>> + Observer,
    C: Observe,
{
    /// Creates a new [`CSVExporter`] that logs at the configurable interval.
    pub fn new(controller: C, builder: B, reporting_dir: &str, interval: Duration) -> Self {
        let dir = Path::new(reporting_dir).to_path_buf();
        match std::fs::create_dir_all(dir.as_path()) {
            Ok(_) => CSVExporter {
                controller,
                observer: builder.build(),
                reporting_dir: dir,
                interval,
                metric_writer: HashMap::new(),
            },
            Err(e) => {
                panic!("Cannot create reporting directory {} {}", reporting_dir, e);
            }
        }
    }

    /// Runs this exporter on the current thread, logging output at the
    /// interval given on construction.
    pub fn run(&mut self) {
        loop {
            thread::sleep(self.interval);
            self.turn();
        }
    }

    /// Runs this exporter, logging output only once.
    pub fn turn(&mut self) {
        self.controller.observe(&mut self.observer);

        for (metric_name, headers, values) in self.observer.drain() {
            trace!("Recording metrics for {}", metric_name);
            let metric_report_path = self.reporting_dir.as_path().join(Path::new(&metric_name).with_extension("csv"));
            let writer = self.metric_writer.entry(metric_name).or_insert_with(|| {
                let mut w = csv::Writer::from_path(metric_report_path).unwrap();
                match w.write_record(headers) {
                    Ok(_) => {
                        trace!("Writing metric headers");
                        w.flush().expect("Cannot flush metric file");
                    }
                    Err(e) => {
                        eprintln!("Error during writing metric headers {:?}", e);
                    }
                }
                w
            });

            match writer.write_record(values) {
                Ok(_) => {
                    trace!("Writing metric values");
                    writer.flush().expect("Cannot flush metric file");
                }
                Err(e) => {
                    eprintln!("Error during writing metric values {:?}", e);
                }
            }
        }
    }
}
