//! Vertex-constraint expressions: `variable (in|not in) top-k-feature`
//! (spec.md §3, §9). Parsed with `pest` into a small AST and evaluated by a
//! visitor against a bound vertex and the feature map, rather than the
//! original's hand-rolled shunting-yard tokenizer over `EdgeDescription.hpp`
//! / `Expression.hpp` / `Tokens.hpp` / `FilterTokenizer.hpp` — the
//! constraint language here has no operator precedence to resolve, so a
//! grammar-driven AST is the simpler idiomatic fit (spec.md §9 design
//! note).

use pest::Parser;
use pest_derive::Parser;

use crate::error::{EngineError, Result};
use crate::feature::map::FeatureMap;
use crate::feature::topk_contains;

#[derive(Parser)]
#[grammar = "query/grammar.pest"]
struct ConstraintParser;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MembershipOp {
    In,
    NotIn,
}

/// One parsed vertex constraint: `variable (in|not in) feature_name`.
#[derive(Clone, Debug, PartialEq)]
pub struct VertexConstraint {
    pub variable: String,
    pub op: MembershipOp,
    pub feature_name: String,
}

impl VertexConstraint {
    /// Parses a single constraint expression, e.g. `"a in top1000"` or
    /// `"a not in top1000"`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut pairs = ConstraintParser::parse(Rule::program, text)
            .map_err(|e| EngineError::InvalidConfiguration(format!("invalid vertex constraint '{}': {}", text, e)))?;
        let constraint = pairs.next().ok_or_else(|| EngineError::InvalidConfiguration(format!("empty vertex constraint '{}'", text)))?;

        let mut inner = constraint.into_inner();
        let variable = inner.next().expect("grammar guarantees a variable").as_str().to_string();
        let op_pair = inner.next().expect("grammar guarantees an operator");
        let op = match op_pair.as_rule() {
            Rule::in_op => MembershipOp::In,
            Rule::not_in => MembershipOp::NotIn,
            other => unreachable!("unexpected constraint operator rule: {:?}", other),
        };
        let feature_name = inner.next().expect("grammar guarantees a feature name").as_str().to_string();

        Ok(Self { variable, op, feature_name })
    }

    /// Evaluates this constraint against `vertex`'s membership in the top-k
    /// feature named by `feature_name`, looked up under `vertex` itself as
    /// the feature map's key (spec.md §3: top-k features are keyed by the
    /// vertex they describe).
    pub fn evaluate(&self, vertex: &str, features: &FeatureMap) -> bool {
        let feature = match features.lookup(vertex, &self.feature_name) {
            Some(f) => f,
            None => return false,
        };
        let contains = topk_contains(&feature, vertex);
        match self.op {
            MembershipOp::In => contains,
            MembershipOp::NotIn => !contains,
        }
    }
}
