//! The polymorphic feature hierarchy (spec.md §3, §9): a tagged variant
//! rather than a class tree, with `apply`/`merge` dispatched on the tag.

pub mod histogram;
pub mod map;
pub mod producer;
pub mod topk;

use strum_macros::EnumString;

/// Discriminant for [`Feature`], mirroring the original's `FeatureEnum`
/// kinds. Kept as its own type (rather than matching on `Feature` directly)
/// so callers can request "give me the tag without materializing the
/// payload" cheaply, and so `merge` can assert kind compatibility up front.
#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumString, strum_macros::Display)]
pub enum FeatureKind {
    Scalar,
    Boolean,
    TopK,
    Map,
}

/// Tagged variant over a feature's payload (spec.md §3). Every feature
/// exposes a single-operation contract, `apply`, that evaluates a
/// caller-supplied reducer against the payload without the caller needing
/// to match on the variant itself.
#[derive(Clone, Debug, PartialEq)]
pub enum Feature {
    Scalar(f64),
    Boolean(bool),
    /// Parallel vectors of keys and their normalized frequencies, sorted by
    /// descending frequency (spec.md §3, §4.2).
    TopK { keys: Vec<String>, frequencies: Vec<f64> },
    Map(std::collections::BTreeMap<String, Box<Feature>>),
}

impl Feature {
    pub fn kind(&self) -> FeatureKind {
        match self {
            Feature::Scalar(_) => FeatureKind::Scalar,
            Feature::Boolean(_) => FeatureKind::Boolean,
            Feature::TopK { .. } => FeatureKind::TopK,
            Feature::Map(_) => FeatureKind::Map,
        }
    }

    /// Evaluates `reducer` against this feature's payload. This is the
    /// feature hierarchy's one customization point (spec.md §9): instead of
    /// a virtual dispatch per consumer, every consumer is just a closure
    /// passed to `apply`.
    pub fn apply<R>(&self, mut reducer: impl FnMut(&Feature) -> R) -> R {
        reducer(self)
    }

    /// Merge semantics are feature-kind-specific (spec.md §4.1): scalars and
    /// booleans replace, maps union by key, top-k replaces. `self` is the
    /// existing stored value; `incoming` is the update. A feature never
    /// changes kind once stored: an `incoming` of a different kind than
    /// `self` is rejected and `self` is kept unchanged.
    pub fn merge(&self, incoming: &Feature) -> Feature {
        if !self.is_same_kind(incoming) {
            return self.clone();
        }
        match (self, incoming) {
            (Feature::Map(existing), Feature::Map(update)) => {
                let mut merged = existing.clone();
                for (key, value) in update.iter() {
                    merged.insert(key.clone(), value.clone());
                }
                Feature::Map(merged)
            }
            (_, incoming) => incoming.clone(),
        }
    }

    /// True if two values share the same variant, independent of payload.
    pub fn is_same_kind(&self, other: &Feature) -> bool {
        self.kind() == other.kind()
    }
}

/// Does `vertex` belong to the top-k key set carried by `feature`? Used by
/// the vertex-constraint evaluator (`crate::query::expr`) for `∈`/`∉`
/// top-k-feature constraints (spec.md §3).
pub fn topk_contains(feature: &Feature, vertex: &str) -> bool {
    feature.apply(|payload| match payload {
        Feature::TopK { keys, .. } => keys.iter().any(|k| k == vertex),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_merge_replaces() {
        let old = Feature::Scalar(1.0);
        let new = Feature::Scalar(2.0);
        assert_eq!(old.merge(&new), Feature::Scalar(2.0));
    }

    #[test]
    fn map_merge_unions_by_key() {
        let mut a = std::collections::BTreeMap::new();
        a.insert("x".to_string(), Box::new(Feature::Scalar(1.0)));
        let mut b = std::collections::BTreeMap::new();
        b.insert("y".to_string(), Box::new(Feature::Scalar(2.0)));

        let merged = Feature::Map(a).merge(&Feature::Map(b));
        match merged {
            Feature::Map(m) => {
                assert_eq!(m.len(), 2);
                assert!(m.contains_key("x"));
                assert!(m.contains_key("y"));
            }
            _ => panic!("expected a map feature"),
        }
    }

    #[test]
    fn merge_rejects_an_incoming_update_of_a_different_kind() {
        let old = Feature::Scalar(1.0);
        let incoming = Feature::Boolean(true);
        assert_eq!(old.merge(&incoming), Feature::Scalar(1.0));
    }

    #[test]
    fn topk_contains_checks_key_membership() {
        let feature = Feature::TopK { keys: vec!["a".into(), "b".into()], frequencies: vec![0.6, 0.4] };
        assert!(topk_contains(&feature, "a"));
        assert!(!topk_contains(&feature, "c"));
    }
}
