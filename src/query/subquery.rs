//! A subgraph query: an ordered sequence of edge descriptions built up
//! incrementally and then finalized (spec.md §3, §4.5 "Register query").
//! Grounded on `SamSrc/SubgraphQuery.hpp`.

use crate::error::{EngineError, Result};
use crate::query::description::{EdgeDescription, EdgeDescriptionBuilder};

const DEFAULT_MAX_OFFSET: f64 = 100.0;

/// A query under construction: descriptions are added in any order, then
/// `finalize` sorts them by start time and computes the query's maximum
/// time extent.
pub struct SubgraphQueryBuilder {
    descriptions: Vec<EdgeDescriptionBuilder>,
    max_offset: f64,
}

impl SubgraphQueryBuilder {
    pub fn new() -> Self {
        Self { descriptions: Vec::new(), max_offset: DEFAULT_MAX_OFFSET }
    }

    pub fn with_max_offset(mut self, max_offset: f64) -> Result<Self> {
        if max_offset < 0.0 {
            return Err(EngineError::InvalidConfiguration(format!("max offset must be non-negative, got {}", max_offset)));
        }
        self.max_offset = max_offset;
        Ok(self)
    }

    pub fn add_description(mut self, description: EdgeDescriptionBuilder) -> Self {
        self.descriptions.push(description);
        self
    }

    /// Sorts descriptions by ascending start time and computes the query's
    /// max time extent, rejecting descriptions with an unspecified source
    /// or target (spec.md §3 invariant: "every edge description has a
    /// source and a target variable").
    pub fn finalize(self) -> Result<SubgraphQuery> {
        if self.descriptions.is_empty() {
            return Err(EngineError::InvalidConfiguration("subgraph query has no edge descriptions".into()));
        }

        let max_offset = self.max_offset;
        let mut finalized: Vec<EdgeDescription> = Vec::with_capacity(self.descriptions.len());
        for builder in self.descriptions {
            if builder.source_var.is_empty() || builder.target_var.is_empty() {
                return Err(EngineError::InvalidConfiguration(format!(
                    "edge description for edge variable '{}' is missing a source and/or target variable",
                    builder.edge_var
                )));
            }
            finalized.push(builder.finalize(max_offset)?);
        }

        finalized.sort_by(|a, b| a.start_time_range.start.partial_cmp(&b.start_time_range.start).expect("start times are never NaN"));

        let max_time_extent = finalized.last().expect("checked non-empty above").end_time_range.end
            - finalized.first().expect("checked non-empty above").start_time_range.start;

        Ok(SubgraphQuery { descriptions: finalized, max_time_extent })
    }
}

impl Default for SubgraphQueryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A finalized subgraph query: descriptions sorted by ascending start time
/// (spec.md §3).
pub struct SubgraphQuery {
    descriptions: Vec<EdgeDescription>,
    max_time_extent: f64,
}

impl SubgraphQuery {
    pub fn len(&self) -> usize {
        self.descriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptions.is_empty()
    }

    pub fn description(&self, index: usize) -> &EdgeDescription {
        &self.descriptions[index]
    }

    pub fn descriptions(&self) -> &[EdgeDescription] {
        &self.descriptions
    }

    pub fn max_time_extent(&self) -> f64 {
        self.max_time_extent
    }
}
