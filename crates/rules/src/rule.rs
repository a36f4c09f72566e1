//! Rule definition and per-rule scoring

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use warden_core::digest::{canonical_json, normalize_text, sha256_hex};
use warden_core::Operation;

use crate::action::Action;
use crate::error::RuleError;

/// Score contributed by each distinct pattern found in an operation
pub const PATTERN_WEIGHT: f64 = 0.3;

/// Rule-specific checks on operation fields
///
/// Missing fields count toward a violation; they are never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Heuristic {
    /// Adds `penalty` when the top-level `key` is absent
    RequiresKey { key: String, penalty: f64 },
    /// Adds `penalty` when `reasoning` is absent or blank
    RequiresReasoning { penalty: f64 },
    /// Adds `penalty` when an operation of `op_type` was not marked
    /// `stakeholders_consulted: true`
    RequiresConsultation { op_type: String, penalty: f64 },
}

impl Heuristic {
    /// Penalty this heuristic adds for `op` (`fields` is its top-level JSON object)
    pub fn penalty(&self, op: &Operation, fields: &Map<String, Value>) -> f64 {
        match self {
            Heuristic::RequiresKey { key, penalty } => {
                if fields.contains_key(key) {
                    0.0
                } else {
                    *penalty
                }
            }
            Heuristic::RequiresReasoning { penalty } => {
                if op.has_reasoning() {
                    0.0
                } else {
                    *penalty
                }
            }
            Heuristic::RequiresConsultation { op_type, penalty } => {
                if op.op_type == *op_type && op.stakeholders_consulted != Some(true) {
                    *penalty
                } else {
                    0.0
                }
            }
        }
    }
}

/// A policy principle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique code, e.g. "P-001"
    pub code: String,
    pub name: String,
    pub description: String,
    /// Case-insensitive substrings searched in the operation's JSON form
    pub patterns: Vec<String>,
    /// Violated when score >= threshold
    pub threshold: f64,
    pub action: Action,
    #[serde(default)]
    pub heuristics: Vec<Heuristic>,
}

impl Rule {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        threshold: f64,
        action: Action,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            description: description.into(),
            patterns: Vec::new(),
            threshold,
            action,
            heuristics: Vec::new(),
        }
    }

    pub fn with_patterns(mut self, patterns: &[&str]) -> Self {
        self.patterns = patterns.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_heuristic(mut self, heuristic: Heuristic) -> Self {
        self.heuristics.push(heuristic);
        self
    }

    /// SHA-256 over the rule's canonical JSON
    pub fn rule_hash(&self) -> Result<String, RuleError> {
        Ok(sha256_hex(canonical_json(self)?))
    }

    /// Number of distinct patterns present in normalized `text`
    pub fn pattern_matches(&self, text: &str) -> usize {
        self.patterns
            .iter()
            .filter(|p| text.contains(&normalize_text(p)))
            .count()
    }

    /// Pattern-only score for normalized `text`, clamped to [0, 1]
    pub fn pattern_score(&self, text: &str) -> f64 {
        (self.pattern_matches(text) as f64 * PATTERN_WEIGHT).clamp(0.0, 1.0)
    }

    /// Full score for an operation: patterns plus heuristics, clamped to [0, 1]
    pub fn score(&self, op: &Operation, text: &str, fields: &Map<String, Value>) -> f64 {
        let base = self.pattern_matches(text) as f64 * PATTERN_WEIGHT;
        let penalties: f64 = self.heuristics.iter().map(|h| h.penalty(op, fields)).sum();
        (base + penalties).clamp(0.0, 1.0)
    }
}
