//! Audit entry and its content hash

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use warden_core::sha256_hex;

/// One record in the audit trail
///
/// Invariants: `entry_hash == calculate_entry_hash(self)` and
/// `entries[i].previous_hash == entries[i - 1].entry_hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic, starting at 1
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    /// e.g. "decision", "violation_alert", "rollback"
    pub event_type: String,
    pub data: Value,
    /// Rule codes this event relates to
    pub principles: Vec<String>,
    pub previous_hash: String,
    pub entry_hash: String,
}

impl AuditEntry {
    /// Build an entry and seal it with its hash
    pub fn new(
        id: u64,
        event_type: impl Into<String>,
        data: Value,
        principles: Vec<String>,
        previous_hash: impl Into<String>,
    ) -> Self {
        let mut entry = Self {
            id,
            timestamp: Utc::now(),
            event_type: event_type.into(),
            data,
            principles,
            previous_hash: previous_hash.into(),
            entry_hash: String::new(),
        };
        entry.entry_hash = calculate_entry_hash(&entry);
        entry
    }

    /// Whether the stored hash matches the entry content
    pub fn is_sealed_correctly(&self) -> bool {
        self.entry_hash == calculate_entry_hash(self)
    }

    pub fn has_principle(&self, code: &str) -> bool {
        self.principles.iter().any(|p| p == code)
    }
}

/// SHA-256 over the canonical JSON of every field except `entry_hash`
pub fn calculate_entry_hash(entry: &AuditEntry) -> String {
    let mut fields = Map::new();
    fields.insert("id".to_string(), Value::from(entry.id));
    fields.insert(
        "timestamp".to_string(),
        Value::String(entry.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)),
    );
    fields.insert(
        "event_type".to_string(),
        Value::String(entry.event_type.clone()),
    );
    fields.insert("data".to_string(), entry.data.clone());
    fields.insert(
        "principles".to_string(),
        Value::Array(
            entry
                .principles
                .iter()
                .cloned()
                .map(Value::String)
                .collect(),
        ),
    );
    fields.insert(
        "previous_hash".to_string(),
        Value::String(entry.previous_hash.clone()),
    );

    sha256_hex(Value::Object(fields).to_string())
}
