//! Violation Detector - scores operations against every rule
//!
//! `evaluate` is pure: the same operation always yields the same violated
//! codes and action. `check` additionally folds the result into the running
//! per-rule compliance scores, which start at 1.0 and lose `score × 0.1` on
//! each violation (floored at 0).

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use warden_core::digest::normalize_text;
use warden_core::Operation;

use crate::action::Action;
use crate::registry::RuleRegistry;
use crate::rule::Rule;

/// Fraction of a violation score subtracted from the rule's running compliance
pub const DECAY_FACTOR: f64 = 0.1;

/// Number of violations included in a compliance report
pub const RECENT_VIOLATIONS: usize = 10;

/// Violation history kept in memory
const HISTORY_CAPACITY: usize = 100;

/// Tolerance for `score >= threshold` on sums of pattern weights
const EPSILON: f64 = 1e-9;

/// One rule violated by one operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationReport {
    pub rule_code: String,
    pub score: f64,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of checking one operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub compliant: bool,
    /// Codes of violated rules, in registry order
    pub violated: Vec<String>,
    /// Most severe action among violated rules (`None` when compliant)
    pub action: Option<Action>,
    /// Score of every rule for this operation
    pub scores: BTreeMap<String, f64>,
}

impl Verdict {
    pub fn violations(&self) -> usize {
        self.violated.len()
    }

    /// Whether the verdict demands restoring the last SAFE checkpoint
    pub fn requires_rollback(&self) -> bool {
        self.action.map_or(false, |a| a.requires_rollback())
    }
}

/// Snapshot of the detector's running compliance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    /// Mean of all per-rule scores
    pub overall_compliance: f64,
    pub per_rule_scores: BTreeMap<String, f64>,
    pub total_violations: u64,
    /// Most recent first, at most [`RECENT_VIOLATIONS`]
    pub recent_violations: Vec<ViolationReport>,
}

pub struct ViolationDetector {
    registry: Arc<RuleRegistry>,
    rule_scores: BTreeMap<String, f64>,
    total_violations: u64,
    history: VecDeque<ViolationReport>,
}

impl ViolationDetector {
    pub fn new(registry: Arc<RuleRegistry>) -> Self {
        let rule_scores = registry.codes().map(|c| (c.to_string(), 1.0)).collect();
        Self {
            registry,
            rule_scores,
            total_violations: 0,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }

    /// Score an operation without touching running state
    pub fn evaluate(&self, op: &Operation) -> Verdict {
        let text = op.normalized_text();
        let fields = match serde_json::to_value(op) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };

        self.verdict_from(|rule| rule.score(op, &text, &fields))
    }

    /// Score an arbitrary JSON value (e.g. an execution result) with patterns only
    pub fn evaluate_output(&self, output: &Value) -> Verdict {
        let text = normalize_text(&output.to_string());
        self.verdict_from(|rule| rule.pattern_score(&text))
    }

    /// Score an operation and record any violations
    pub fn check(&mut self, op: &Operation) -> Verdict {
        let verdict = self.evaluate(op);
        self.record(&verdict);
        verdict
    }

    /// Score an execution result and record any violations
    pub fn check_output(&mut self, output: &Value) -> Verdict {
        let verdict = self.evaluate_output(output);
        self.record(&verdict);
        verdict
    }

    fn verdict_from(&self, score_of: impl Fn(&Rule) -> f64) -> Verdict {
        let mut scores = BTreeMap::new();
        let mut violated = Vec::new();
        let mut actions = Vec::new();

        for rule in self.registry.rules() {
            let score = score_of(rule);
            if score + EPSILON >= rule.threshold {
                violated.push(rule.code.clone());
                actions.push(rule.action);
            }
            scores.insert(rule.code.clone(), score);
        }

        Verdict {
            compliant: violated.is_empty(),
            violated,
            action: Action::aggregate(actions),
            scores,
        }
    }

    fn record(&mut self, verdict: &Verdict) {
        let now = Utc::now();
        for code in &verdict.violated {
            let score = verdict.scores.get(code).copied().unwrap_or_default();
            if let Some(current) = self.rule_scores.get_mut(code) {
                *current = (*current - score * DECAY_FACTOR).max(0.0);
            }
            self.total_violations += 1;

            if self.history.len() == HISTORY_CAPACITY {
                self.history.pop_front();
            }
            self.history.push_back(ViolationReport {
                rule_code: code.clone(),
                score,
                timestamp: now,
            });

            tracing::warn!(rule = %code, score, "Rule violated");
        }
    }

    /// Mean of all per-rule running scores
    pub fn overall_compliance(&self) -> f64 {
        if self.rule_scores.is_empty() {
            return 1.0;
        }
        self.rule_scores.values().sum::<f64>() / self.rule_scores.len() as f64
    }

    pub fn rule_score(&self, code: &str) -> Option<f64> {
        self.rule_scores.get(code).copied()
    }

    pub fn total_violations(&self) -> u64 {
        self.total_violations
    }

    pub fn compliance_report(&self) -> ComplianceReport {
        ComplianceReport {
            overall_compliance: self.overall_compliance(),
            per_rule_scores: self.rule_scores.clone(),
            total_violations: self.total_violations,
            recent_violations: self
                .history
                .iter()
                .rev()
                .take(RECENT_VIOLATIONS)
                .cloned()
                .collect(),
        }
    }
}
