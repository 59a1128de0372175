//! Feature fan-out glue: producers notify subscribers as each named feature
//! is computed for a given key, and a subscriber emits one output row once
//! every registered feature has arrived for that key. Grounded on
//! `SamSrc/FeatureProducer.hpp` and `FeatureSubscriber.hpp`.

use std::io::Write;

use parking_lot::Mutex;

use crate::error::{EngineError, Result};

/// Collects per-key feature values into fixed-width rows and writes a row
/// out once all registered features have reported for that key
/// (`FeatureSubscriber::update`). Keys are assumed to be a dense, roughly
/// increasing sequence (sam ids), and are slotted by `key % capacity` so
/// storage stays bounded instead of growing with the stream.
pub struct FeatureSubscriber {
    feature_names: Vec<String>,
    capacity: usize,
    state: Mutex<SubscriberState>,
}

struct SubscriberState {
    values: Vec<f64>,
    counts: Vec<usize>,
    sink: Box<dyn Write + Send>,
}

impl FeatureSubscriber {
    /// `sink` receives one comma-separated line per completed row. `init`
    /// must be called after all features are registered and before any
    /// `update`, mirroring the original's explicit init-then-update
    /// lifecycle.
    pub fn new(capacity: usize, sink: Box<dyn Write + Send>) -> Self {
        Self { feature_names: Vec::new(), capacity, state: Mutex::new(SubscriberState { values: Vec::new(), counts: vec![0; capacity], sink }) }
    }

    /// Registers a feature name this subscriber expects a value for on
    /// every key, in the order it was registered. Must happen before the
    /// first `update`.
    pub fn add_feature(&mut self, name: impl Into<String>) {
        self.feature_names.push(name.into());
    }

    pub fn num_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Allocates row storage once all features are registered.
    pub fn init(&self) -> Result<()> {
        if self.feature_names.is_empty() {
            return Err(EngineError::InvalidConfiguration("feature subscriber has no registered features".into()));
        }
        let mut state = self.state.lock();
        state.values = vec![0.0; self.capacity * self.feature_names.len()];
        Ok(())
    }

    /// Records `value` for `feature_name` at `key`. Once every registered
    /// feature has a value recorded for this key's slot, writes the
    /// completed row to the sink and resets the slot's count.
    pub fn update(&self, key: u64, feature_name: &str, value: f64) -> Result<()> {
        let num_features = self.feature_names.len();
        if num_features == 0 {
            return Err(EngineError::InvalidConfiguration("update called before init".into()));
        }
        let feature_index = self
            .feature_names
            .iter()
            .position(|n| n == feature_name)
            .ok_or_else(|| EngineError::InvalidConfiguration(format!("unregistered feature name: {}", feature_name)))?;

        let index = (key as usize) % self.capacity;
        let mut state = self.state.lock();
        if state.values.is_empty() {
            return Err(EngineError::InvalidConfiguration("update called before init".into()));
        }

        state.values[index * num_features + feature_index] = value;
        state.counts[index] += 1;

        if state.counts[index] >= num_features {
            state.counts[index] = 0;
            let row: Vec<String> = (0..num_features).map(|j| state.values[index * num_features + j].to_string()).collect();
            let line = row.join(",");
            writeln!(state.sink, "{}", line).map_err(|e| EngineError::Io(format!("feature subscriber sink write failed: {}", e)))?;
        }
        Ok(())
    }
}

/// Tracks the subscribers registered against one producing computation
/// (`FeatureProducer::registerSubscriber`). A computation embeds a
/// `FeatureProducer` and calls `notify` every time it produces a new value
/// for a key.
#[derive(Default)]
pub struct FeatureProducer {
    subscribers: Vec<(std::sync::Arc<FeatureSubscriber>, String)>,
}

impl FeatureProducer {
    pub fn new() -> Self {
        Self { subscribers: Vec::new() }
    }

    /// Registers `subscriber` to receive this producer's updates tagged as
    /// `name`, which must match a name the subscriber was told to expect
    /// via `FeatureSubscriber::add_feature`.
    pub fn register_subscriber(&mut self, subscriber: std::sync::Arc<FeatureSubscriber>, name: impl Into<String>) {
        self.subscribers.push((subscriber, name.into()));
    }

    /// Notifies every registered subscriber that `key` has a new value for
    /// this producer's feature.
    pub fn notify(&self, key: u64, value: f64) -> Result<()> {
        for (subscriber, name) in &self.subscribers {
            subscriber.update(key, name, value)?;
        }
        Ok(())
    }
}
