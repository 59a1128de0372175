//! CSV-backed metrics export, ported from the teacher crate's own
//! `util/metrics` module and reused unchanged by [`crate::metrics`].

pub mod csv_builder;
pub mod csv_exporter;
