//! Operation - the opaque record submitted for validation
//!
//! Callers hand the kernel loosely-shaped JSON. It is parsed once, here, into
//! a typed record with explicit optional fields. Keys the kernel does not
//! know about are kept in `extra` so they still take part in pattern scoring.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use strum_macros::{Display, EnumString};

use crate::digest::{canonical_json, normalize_text};
use crate::error::OperationError;

/// How significant an operation is
///
/// `Medium` and `High` operations are checkpointed after they execute.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Criticality {
    #[default]
    Low,
    Medium,
    High,
}

impl Criticality {
    /// Whether a successful operation of this criticality creates a checkpoint
    pub fn requires_checkpoint(&self) -> bool {
        matches!(self, Criticality::Medium | Criticality::High)
    }
}

/// An operation submitted to the kernel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Operation type, e.g. "user_service", "governance_decision"
    #[serde(rename = "type")]
    pub op_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criticality: Option<Criticality>,

    /// Free-text justification (required by the explainability rule)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Required for governance decisions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stakeholders_consulted: Option<bool>,

    /// Presence flag checked by the transparency rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_trail: Option<bool>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub payload: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,

    /// Runtime metrics reported alongside the operation (fed to drift monitoring)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, f64>,

    /// Any other top-level keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Operation {
    /// Create an operation of the given type with no optional fields
    pub fn new(op_type: impl Into<String>) -> Self {
        Self {
            op_type: op_type.into(),
            criticality: None,
            reasoning: None,
            stakeholders_consulted: None,
            audit_trail: None,
            payload: Map::new(),
            context: Map::new(),
            metrics: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Parse and validate raw JSON at the boundary
    pub fn from_value(value: Value) -> Result<Self, OperationError> {
        let Value::Object(ref map) = value else {
            return Err(OperationError::NotAnObject);
        };

        match map.get("type") {
            None => return Err(OperationError::MissingType),
            Some(Value::String(s)) if !s.trim().is_empty() => {}
            Some(_) => return Err(OperationError::InvalidType),
        }

        serde_json::from_value(value).map_err(|e| OperationError::InvalidField(e.to_string()))
    }

    /// Parse an operation from a JSON string
    pub fn from_json(json: &str) -> Result<Self, OperationError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| OperationError::InvalidField(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn with_criticality(mut self, criticality: Criticality) -> Self {
        self.criticality = Some(criticality);
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_stakeholders_consulted(mut self, consulted: bool) -> Self {
        self.stakeholders_consulted = Some(consulted);
        self
    }

    pub fn with_audit_trail(mut self, audit_trail: bool) -> Self {
        self.audit_trail = Some(audit_trail);
        self
    }

    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Effective criticality (`Low` when not given)
    pub fn criticality(&self) -> Criticality {
        self.criticality.unwrap_or_default()
    }

    /// Whether a non-blank `reasoning` was supplied
    pub fn has_reasoning(&self) -> bool {
        self.reasoning
            .as_deref()
            .map_or(false, |r| !r.trim().is_empty())
    }

    /// Sorted-key JSON form of the operation
    pub fn canonical_json(&self) -> String {
        // A record of strings, bools, finite maps and JSON values always serializes
        canonical_json(self).unwrap_or_default()
    }

    /// Lowercased, whitespace-collapsed canonical JSON used for pattern scoring
    pub fn normalized_text(&self) -> String {
        normalize_text(&self.canonical_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_minimal() {
        let op = Operation::from_value(json!({"type": "user_service"})).unwrap();
        assert_eq!(op.op_type, "user_service");
        assert_eq!(op.criticality(), Criticality::Low);
        assert!(op.reasoning.is_none());
        assert!(op.payload.is_empty());
    }

    #[test]
    fn test_parse_full() {
        let op = Operation::from_value(json!({
            "type": "governance_decision",
            "criticality": "high",
            "reasoning": "quarterly review",
            "stakeholders_consulted": true,
            "audit_trail": true,
            "payload": {"budget": 10},
            "metrics": {"latency": 12.5}
        }))
        .unwrap();

        assert_eq!(op.criticality(), Criticality::High);
        assert_eq!(op.stakeholders_consulted, Some(true));
        assert_eq!(op.audit_trail, Some(true));
        assert_eq!(op.payload.get("budget"), Some(&json!(10)));
        assert_eq!(op.metrics.get("latency"), Some(&12.5));
    }

    #[test]
    fn test_unknown_keys_preserved() {
        let op = Operation::from_value(json!({
            "type": "forced_action",
            "data": {"coercive": "pattern"}
        }))
        .unwrap();

        assert_eq!(op.extra.get("data"), Some(&json!({"coercive": "pattern"})));
        assert_eq!(
            op.canonical_json(),
            r#"{"data":{"coercive":"pattern"},"type":"forced_action"}"#
        );
    }

    #[test]
    fn test_missing_type_rejected() {
        let err = Operation::from_value(json!({"reasoning": "x"})).unwrap_err();
        assert_eq!(err, OperationError::MissingType);
    }

    #[test]
    fn test_blank_type_rejected() {
        let err = Operation::from_value(json!({"type": "   "})).unwrap_err();
        assert_eq!(err, OperationError::InvalidType);

        let err = Operation::from_value(json!({"type": 42})).unwrap_err();
        assert_eq!(err, OperationError::InvalidType);
    }

    #[test]
    fn test_not_an_object_rejected() {
        let err = Operation::from_value(json!(["type"])).unwrap_err();
        assert_eq!(err, OperationError::NotAnObject);
    }

    #[test]
    fn test_unknown_criticality_rejected() {
        let err = Operation::from_value(json!({"type": "x", "criticality": "urgent"})).unwrap_err();
        assert!(matches!(err, OperationError::InvalidField(_)));
    }

    #[test]
    fn test_has_reasoning() {
        assert!(!Operation::new("x").has_reasoning());
        assert!(!Operation::new("x").with_reasoning("  ").has_reasoning());
        assert!(Operation::new("x").with_reasoning("because").has_reasoning());
    }

    #[test]
    fn test_criticality_requires_checkpoint() {
        assert!(!Criticality::Low.requires_checkpoint());
        assert!(Criticality::Medium.requires_checkpoint());
        assert!(Criticality::High.requires_checkpoint());
        assert_eq!(Criticality::Medium.to_string(), "medium");
    }

    #[test]
    fn test_normalized_text_is_lowercase() {
        let op = Operation::new("Forced_Action").with_payload("note", "Hidden   Agenda");
        let text = op.normalized_text();
        assert!(text.contains("forced_action"));
        assert!(text.contains("hidden agenda"));
    }
}
