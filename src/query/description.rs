//! A single edge description within a subgraph query: the three variables
//! an edge binds (source, edge, target), its time windows relative to the
//! query's anchor time, and any vertex constraints. Grounded on
//! `SamSrc/EdgeDescription.hpp`.

use crate::edge::Edge;
use crate::error::{EngineError, Result};
use crate::query::expr::VertexConstraint;
use crate::util::HalfOpenTimeRange;

/// An open (half-bounded) time range as written by a query author, before
/// `finalize` widens it to a concrete `HalfOpenTimeRange`. `None` means
/// unbounded on that side.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenTimeRange {
    pub start: Option<f64>,
    pub end: Option<f64>,
}

impl OpenTimeRange {
    pub fn bounded(start: f64, end: f64) -> Self {
        Self { start: Some(start), end: Some(end) }
    }
}

/// One edge pattern in a subgraph query, with variables for its source,
/// itself, and its target, time windows relative to the query's anchor
/// time `t0`, and vertex constraints over the source/target variables.
#[derive(Clone, Debug)]
pub struct EdgeDescription {
    pub source_var: String,
    pub edge_var: String,
    pub target_var: String,
    pub start_time_range: HalfOpenTimeRange,
    pub end_time_range: HalfOpenTimeRange,
    pub vertex_constraints: Vec<VertexConstraint>,
    /// True if this description's start-time range was the side the query
    /// author actually bounded (as opposed to one derived from the end-time
    /// range by `finalize`). Used to pick a partial match's anchor time
    /// `t0` from whichever of the first edge's start/end time was the
    /// query's real constraint (spec.md §9 Open Question (a)).
    pub anchor_on_start: bool,
}

const UNBOUNDED_LOW: f64 = f64::MIN;
const UNBOUNDED_HIGH: f64 = f64::MAX;

/// An [`EdgeDescription`] still under construction, with possibly-open time
/// ranges, before `finalize` widens any unbounded side to `max_offset` from
/// the known side (spec.md §3, `fixTimeRange`).
pub struct EdgeDescriptionBuilder {
    pub source_var: String,
    pub edge_var: String,
    pub target_var: String,
    pub start_time_range: OpenTimeRange,
    pub end_time_range: OpenTimeRange,
    pub vertex_constraints: Vec<VertexConstraint>,
}

impl EdgeDescriptionBuilder {
    pub fn new(source_var: impl Into<String>, edge_var: impl Into<String>, target_var: impl Into<String>) -> Self {
        Self {
            source_var: source_var.into(),
            edge_var: edge_var.into(),
            target_var: target_var.into(),
            start_time_range: OpenTimeRange::default(),
            end_time_range: OpenTimeRange::default(),
            vertex_constraints: Vec::new(),
        }
    }

    pub fn with_start_time_range(mut self, range: OpenTimeRange) -> Self {
        self.start_time_range = range;
        self
    }

    pub fn with_end_time_range(mut self, range: OpenTimeRange) -> Self {
        self.end_time_range = range;
        self
    }

    pub fn with_constraint(mut self, constraint: VertexConstraint) -> Self {
        self.vertex_constraints.push(constraint);
        self
    }

    /// Widens whichever of `start_time_range`/`end_time_range` is fully or
    /// partially unbounded to sit within `max_offset` of the known side.
    /// Mirrors `EdgeDescription::fixTimeRange`; rejects a description where
    /// neither range has any bound at all (spec.md §3 invariant: "time
    /// ranges are finite; if neither side is known the query is rejected").
    pub fn finalize(self, max_offset: f64) -> Result<EdgeDescription> {
        let start_bound = self.start_time_range.start.is_some() || self.start_time_range.end.is_some();
        let end_bound = self.end_time_range.start.is_some() || self.end_time_range.end.is_some();

        if !start_bound && !end_bound {
            return Err(EngineError::InvalidConfiguration(format!(
                "edge description for edge variable '{}' has no time bound on either side",
                self.edge_var
            )));
        }

        let anchor_on_start = start_bound;
        let mut start = self.start_time_range;
        let mut end = self.end_time_range;

        if !start_bound {
            // Neither side of start known: derive from end's midpoint.
            let end_mid = match (end.start, end.end) {
                (Some(a), Some(b)) => (a + b) / 2.0,
                (Some(a), None) => a,
                (None, Some(b)) => b,
                (None, None) => unreachable!("end_bound implies at least one side set"),
            };
            start = OpenTimeRange::bounded(end_mid - max_offset, end_mid + max_offset);
        }
        if !end_bound {
            let start_mid = match (start.start, start.end) {
                (Some(a), Some(b)) => (a + b) / 2.0,
                (Some(a), None) => a,
                (None, Some(b)) => b,
                (None, None) => unreachable!("start_bound implies at least one side set"),
            };
            end = OpenTimeRange::bounded(start_mid - max_offset, start_mid + max_offset);
        }

        let start_range = widen_one_sided(start, max_offset)?;
        let end_range = widen_one_sided(end, max_offset)?;

        Ok(EdgeDescription {
            source_var: self.source_var,
            edge_var: self.edge_var,
            target_var: self.target_var,
            start_time_range: start_range,
            end_time_range: end_range,
            vertex_constraints: self.vertex_constraints,
            anchor_on_start,
        })
    }
}

fn widen_one_sided(range: OpenTimeRange, max_offset: f64) -> Result<HalfOpenTimeRange> {
    match (range.start, range.end) {
        (Some(a), Some(b)) => {
            if (b - a).abs() > 2.0 * max_offset {
                return Err(EngineError::InvalidConfiguration("edge description time range exceeds twice the configured max offset".into()));
            }
            Ok(HalfOpenTimeRange::new(a, b))
        }
        (Some(a), None) => Ok(HalfOpenTimeRange::new(a, a + max_offset)),
        (None, Some(b)) => Ok(HalfOpenTimeRange::new(b - max_offset, b)),
        (None, None) => Ok(HalfOpenTimeRange::new(UNBOUNDED_LOW, UNBOUNDED_HIGH)),
    }
}

impl EdgeDescription {
    pub fn unspecified_source(&self) -> bool {
        self.source_var.is_empty()
    }

    pub fn unspecified_target(&self) -> bool {
        self.target_var.is_empty()
    }

    /// Whether `edge`, arriving relative to a partial match's anchor time
    /// `t0`, falls within this description's time windows (spec.md §3,
    /// `satisfiesTimeConstraints`).
    pub fn satisfies_time_constraints(&self, edge: &Edge, t0: f64) -> bool {
        let start = edge.start;
        let end = edge.end_time();
        let start_window = HalfOpenTimeRange::new(self.start_time_range.start + t0, self.start_time_range.end + t0);
        let end_window = HalfOpenTimeRange::new(self.end_time_range.start + t0, self.end_time_range.end + t0);
        start >= start_window.start && start <= start_window.end && end >= end_window.start && end <= end_window.end
    }
}
