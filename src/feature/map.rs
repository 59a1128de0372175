//! Concurrent `(key, feature-name) -> Feature` store (spec.md §4.1),
//! open-addressed with a fixed capacity and lock-free slot-state CAS,
//! following `SamSrc/FeatureMap.hpp`'s `MAP_EMPTY`/`MAP_OCCUPIED`/
//! `MAP_INTERMEDIATE` protocol.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU8, Ordering};

use arc_swap::ArcSwapOption;
use hashers::fx_hash::FxHasher;

use crate::feature::Feature;

const SLOT_EMPTY: u8 = 0;
const SLOT_OCCUPIED: u8 = 1;
const SLOT_TRANSIENT: u8 = 2;

struct Slot {
    state: AtomicU8,
    /// Combined `key ⊕ name` string this slot is occupied by, once
    /// `state == SLOT_OCCUPIED`. Only ever written while holding the
    /// transient state, so a torn read is impossible once `state` settles.
    combined_key: ArcSwapOption<String>,
    feature: ArcSwapOption<Feature>,
}

impl Slot {
    fn empty() -> Self {
        Self { state: AtomicU8::new(SLOT_EMPTY), combined_key: ArcSwapOption::from(None), feature: ArcSwapOption::from(None) }
    }
}

/// Fixed-capacity, lock-free-on-the-happy-path feature store. Overflow (no
/// empty or matching slot found while probing) is a configuration error
/// (spec.md §4.1, §7): the operator is expected to size `capacity` as
/// roughly `2 * num_keys * num_features`, per the original implementation's
/// own sizing guidance.
pub struct FeatureMap {
    slots: Vec<Slot>,
    capacity: usize,
}

fn combine(key: &str, name: &str) -> String {
    let mut s = String::with_capacity(key.len() + name.len());
    s.push_str(key);
    s.push_str(name);
    s
}

fn hash_combined(combined: &str) -> usize {
    let mut hasher = FxHasher::default();
    combined.hash(&mut hasher);
    hasher.finish() as usize
}

impl FeatureMap {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Slot::empty);
        Self { slots, capacity }
    }

    /// Inserts the feature for `(key, name)` if absent, or merges it with
    /// the existing value via [`Feature::merge`] if present. Returns `true`
    /// if the update took place, `false` if the table is full and probing
    /// wrapped back to the starting slot without finding room (spec.md
    /// §4.1, §7: capacity exhaustion).
    pub fn update_or_insert(&self, key: &str, name: &str, feature: Feature) -> bool {
        let combined = combine(key, name);
        let start = hash_combined(&combined) % self.capacity;
        let mut index = start;

        loop {
            let slot = &self.slots[index];
            let state = slot.state.load(Ordering::Acquire);

            if state == SLOT_EMPTY {
                if slot
                    .state
                    .compare_exchange(SLOT_EMPTY, SLOT_TRANSIENT, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    slot.combined_key.store(Some(std::sync::Arc::new(combined)));
                    slot.feature.store(Some(std::sync::Arc::new(feature)));
                    slot.state.store(SLOT_OCCUPIED, Ordering::Release);
                    return true;
                }
                // Lost the race; fall through to re-check this slot's new state.
                continue;
            }

            if state == SLOT_TRANSIENT {
                // Someone else is installing into this slot; spin until it
                // settles, then re-evaluate without advancing `index`.
                std::hint::spin_loop();
                continue;
            }

            // SLOT_OCCUPIED: check whether it's ours.
            let occupant = slot.combined_key.load();
            if occupant.as_deref().map_or(false, |k| k.as_str() == combined) {
                if slot
                    .state
                    .compare_exchange(SLOT_OCCUPIED, SLOT_TRANSIENT, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    let existing = slot.feature.load();
                    let merged = match existing.as_deref() {
                        Some(old) => old.merge(&feature),
                        None => feature,
                    };
                    slot.feature.store(Some(std::sync::Arc::new(merged)));
                    slot.state.store(SLOT_OCCUPIED, Ordering::Release);
                    return true;
                }
                continue;
            }

            index = (index + 1) % self.capacity;
            if index == start {
                return false;
            }
        }
    }

    /// Looks up `(key, name)`. Spins through transient slots until they
    /// resolve, per spec.md §4.1.
    pub fn lookup(&self, key: &str, name: &str) -> Option<Feature> {
        let combined = combine(key, name);
        let start = hash_combined(&combined) % self.capacity;
        let mut index = start;

        loop {
            let slot = &self.slots[index];
            loop {
                let state = slot.state.load(Ordering::Acquire);
                if state != SLOT_TRANSIENT {
                    break;
                }
                std::hint::spin_loop();
            }

            let state = slot.state.load(Ordering::Acquire);
            if state == SLOT_EMPTY {
                return None;
            }

            let occupant = slot.combined_key.load();
            if occupant.as_deref().map_or(false, |k| k.as_str() == combined) {
                return slot.feature.load().as_deref().cloned();
            }

            index = (index + 1) % self.capacity;
            if index == start {
                return None;
            }
        }
    }

    pub fn exists(&self, key: &str, name: &str) -> bool {
        self.lookup(key, name).is_some()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_lookup_roundtrips() {
        let map = FeatureMap::new(16);
        assert!(map.update_or_insert("1.1.1.1", "topk", Feature::Scalar(1.0)));
        assert_eq!(map.lookup("1.1.1.1", "topk"), Some(Feature::Scalar(1.0)));
        assert!(!map.exists("1.1.1.1", "other"));
    }

    #[test]
    fn second_update_merges_scalar_by_replacing() {
        let map = FeatureMap::new(16);
        map.update_or_insert("k", "f", Feature::Scalar(1.0));
        map.update_or_insert("k", "f", Feature::Scalar(5.0));
        assert_eq!(map.lookup("k", "f"), Some(Feature::Scalar(5.0)));
    }

    #[test]
    fn distinct_keys_and_names_do_not_collide() {
        let map = FeatureMap::new(16);
        map.update_or_insert("k1", "f", Feature::Scalar(1.0));
        map.update_or_insert("k2", "f", Feature::Scalar(2.0));
        map.update_or_insert("k1", "g", Feature::Scalar(3.0));

        assert_eq!(map.lookup("k1", "f"), Some(Feature::Scalar(1.0)));
        assert_eq!(map.lookup("k2", "f"), Some(Feature::Scalar(2.0)));
        assert_eq!(map.lookup("k1", "g"), Some(Feature::Scalar(3.0)));
    }

    #[test]
    fn overflow_returns_false_instead_of_panicking() {
        let map = FeatureMap::new(2);
        assert!(map.update_or_insert("a", "f", Feature::Scalar(1.0)));
        assert!(map.update_or_insert("b", "f", Feature::Scalar(1.0)));
        // table full of distinct keys; a third distinct key cannot be placed.
        assert!(!map.update_or_insert("c", "f", Feature::Scalar(1.0)));
    }

    #[test]
    fn concurrent_inserts_across_many_keys_all_land() {
        use std::sync::Arc;
        use std::thread;

        let map = Arc::new(FeatureMap::new(4096));
        let mut handles = Vec::new();
        for t in 0..8 {
            let map = Arc::clone(&map);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    let key = format!("key-{}-{}", t, i);
                    assert!(map.update_or_insert(&key, "f", Feature::Scalar(i as f64)));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        for t in 0..8 {
            for i in 0..100 {
                let key = format!("key-{}-{}", t, i);
                assert_eq!(map.lookup(&key, "f"), Some(Feature::Scalar(i as f64)));
            }
        }
    }
}
