//! Change-tracking attribute storage.
//!
//! A [`Storage`] holds one entity's current attribute values plus a shadow
//! map of original values for every attribute that currently differs from
//! what was last persisted. Writing an attribute back to its original value
//! removes it from the shadow map: a round trip is "unchanged", not
//! "changed twice". [`Storage::compact`] makes the current values the new
//! originals.

use crate::value::Value;
use std::collections::{BTreeMap, HashMap};

/// The before/after pair reported for a changed attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// Value as of the last compaction.
    pub original: Value,
    /// Value now held.
    pub current: Value,
}

/// Tracks attribute values and their divergence from the last compaction.
#[derive(Debug, Clone, Default)]
pub struct Storage {
    /// Current values by attribute name.
    values: HashMap<String, Value>,
    /// Original values of changed attributes.
    original: HashMap<String, Value>,
}

impl Storage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current value of an attribute.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Check whether an attribute has ever been written.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Write an attribute.
    ///
    /// Returns `true` if the stored value actually changed. An attribute
    /// that was never written compares as `Null`.
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        let current = self.values.get(name).cloned().unwrap_or(Value::Null);
        if current == value {
            // Still record the key so `contains` and `as_map` see it.
            self.values
                .entry(name.to_string())
                .or_insert(Value::Null);
            return false;
        }

        match self.original.get(name) {
            Some(original) if *original == value => {
                self.original.remove(name);
            }
            Some(_) => {}
            None => {
                self.original.insert(name.to_string(), current);
            }
        }

        tracing::trace!(attribute = name, "Storage value changed");
        self.values.insert(name.to_string(), value);
        true
    }

    /// Check if an attribute differs from its original value.
    pub fn is_changed(&self, name: &str) -> bool {
        self.original.contains_key(name)
    }

    /// Check if any attribute differs from its original value.
    pub fn has_changes(&self) -> bool {
        !self.original.is_empty()
    }

    /// All changed attributes with their original and current values.
    pub fn changed(&self) -> BTreeMap<String, Change> {
        self.original
            .iter()
            .map(|(name, original)| {
                let current = self.values.get(name).cloned().unwrap_or(Value::Null);
                (
                    name.clone(),
                    Change {
                        original: original.clone(),
                        current,
                    },
                )
            })
            .collect()
    }

    /// The value an attribute had at the last compaction.
    pub fn original(&self, name: &str) -> Option<&Value> {
        self.original.get(name).or_else(|| self.values.get(name))
    }

    /// Forget all changes, making current values the new originals.
    pub fn compact(&mut self) {
        self.original.clear();
    }

    /// Snapshot of all current values.
    pub fn as_map(&self) -> HashMap<String, Value> {
        self.values.clone()
    }

    /// Iterate over current values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}
