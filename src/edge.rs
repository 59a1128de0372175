//! The edge/tuple model (spec.md §3).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::util::HalfOpenTimeRange;

/// Opaque, hashable/equatable vertex identifier. Strings in the reference
/// implementation, per spec.md §3.
pub type VertexId = String;

/// Locally-assigned monotonic per-edge identifier ("sam id" in the
/// glossary). Unique on a node, not globally — ids are reassigned by the
/// receiving node on every cross-node hop (spec.md §6).
pub type SamId = u64;

/// A single typed user field carried on an edge, beyond the fixed
/// source/target/start/duration core. Keeps `Edge` generic over payloads
/// (NetFlow, or any caller-defined tuple) without requiring a trait object
/// per field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Real(f64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Real(r) => write!(f, "{}", r),
        }
    }
}

/// Immutable directed edge record (spec.md §3). `start` and `duration` are
/// seconds; `end_time()` is `start + duration`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: SamId,
    pub source: VertexId,
    pub target: VertexId,
    pub start: f64,
    pub duration: f64,
    pub fields: BTreeMap<String, FieldValue>,
}

/// `(source, target, start, duration)`, used to suppress re-consuming the
/// same physical edge within a single partial match (spec.md §3, §4.3).
pub type EdgeFingerprint = (VertexId, VertexId, u64, u64);

impl Edge {
    pub fn new(id: SamId, source: VertexId, target: VertexId, start: f64, duration: f64) -> Self {
        Self { id, source, target, start, duration, fields: BTreeMap::new() }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn end_time(&self) -> f64 {
        self.start + self.duration
    }

    pub fn validity(&self) -> HalfOpenTimeRange {
        HalfOpenTimeRange::new(self.start, self.end_time())
    }

    /// Fingerprint for per-partial-match deduplication (spec.md §3). Start
    /// and duration are compared via their bit patterns rather than float
    /// equality so the fingerprint implements `Hash`/`Eq` exactly.
    pub fn fingerprint(&self) -> EdgeFingerprint {
        (self.source.clone(), self.target.clone(), self.start.to_bits(), self.duration.to_bits())
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// Re-stamps `edge` with a fresh, locally generated id. Used whenever an
/// edge crosses a node boundary, since sam ids are not portable across
/// nodes (spec.md §6).
pub fn restamp(mut edge: Edge, new_id: SamId) -> Edge {
    edge.id = new_id;
    edge
}
