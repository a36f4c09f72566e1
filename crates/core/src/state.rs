//! System state - the value that gets checkpointed and restored
//!
//! Rollback does not restore process memory. It restores this record, which
//! holds only what executed operations chose to change.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::digest::sha256_hex;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    /// Bumped on every applied change set
    pub revision: u64,
    /// Number of operations whose changes were applied
    pub operations_applied: u64,
    pub last_operation_type: Option<String>,
    pub values: BTreeMap<String, Value>,
}

impl SystemState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the changes produced by an executed operation
    ///
    /// A `null` value removes the key.
    pub fn apply(&mut self, op_type: &str, changes: BTreeMap<String, Value>) {
        for (key, value) in changes {
            if value.is_null() {
                self.values.remove(&key);
            } else {
                self.values.insert(key, value);
            }
        }
        self.revision += 1;
        self.operations_applied += 1;
        self.last_operation_type = Some(op_type.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Sorted-key JSON value of the whole state
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("revision".to_string(), Value::from(self.revision));
        map.insert(
            "operations_applied".to_string(),
            Value::from(self.operations_applied),
        );
        map.insert(
            "last_operation_type".to_string(),
            self.last_operation_type
                .clone()
                .map_or(Value::Null, Value::String),
        );
        map.insert(
            "values".to_string(),
            Value::Object(self.values.clone().into_iter().collect()),
        );
        Value::Object(map)
    }

    /// SHA-256 over the canonical JSON form
    pub fn state_hash(&self) -> String {
        sha256_hex(self.to_value().to_string())
    }
}
