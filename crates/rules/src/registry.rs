//! Rule Registry - immutable, hash-verified rule catalog
//!
//! The registry hash is `H(sorted list of each rule's own hash)`. It is
//! computed once at construction; `verify_integrity` recomputes it and
//! reports a mismatch. The registry never repairs itself - the caller
//! decides whether to halt.

use std::collections::HashMap;

use warden_core::digest::{canonical_json, sha256_hex};

use crate::catalog::standard_rules;
use crate::error::RuleError;
use crate::rule::Rule;

#[derive(Debug, Clone)]
pub struct RuleRegistry {
    rules: Vec<Rule>,
    index: HashMap<String, usize>,
    registry_hash: String,
}

impl RuleRegistry {
    /// Build the registry from the standard principle catalog
    pub fn load() -> Result<Self, RuleError> {
        Self::from_rules(standard_rules())
    }

    /// Build a registry from an explicit rule list
    pub fn from_rules(rules: Vec<Rule>) -> Result<Self, RuleError> {
        if rules.is_empty() {
            return Err(RuleError::EmptyRegistry);
        }

        let mut index = HashMap::with_capacity(rules.len());
        for (i, rule) in rules.iter().enumerate() {
            if rule.code.trim().is_empty() {
                return Err(RuleError::EmptyCode);
            }
            // A zero threshold would flag every operation
            if !rule.threshold.is_finite() || rule.threshold <= 0.0 || rule.threshold > 1.0 {
                return Err(RuleError::InvalidThreshold {
                    code: rule.code.clone(),
                    threshold: rule.threshold,
                });
            }
            if rule.patterns.iter().any(|p| p.trim().is_empty()) {
                return Err(RuleError::EmptyPattern(rule.code.clone()));
            }
            if index.insert(rule.code.clone(), i).is_some() {
                return Err(RuleError::DuplicateCode(rule.code.clone()));
            }
        }

        let registry_hash = Self::compute_hash(&rules)?;
        tracing::debug!(rules = rules.len(), hash = %registry_hash, "Rule registry loaded");

        Ok(Self {
            rules,
            index,
            registry_hash,
        })
    }

    /// Hash over the sorted list of per-rule hashes
    pub fn compute_hash(rules: &[Rule]) -> Result<String, RuleError> {
        let mut hashes = rules
            .iter()
            .map(Rule::rule_hash)
            .collect::<Result<Vec<_>, _>>()?;
        hashes.sort();
        Ok(sha256_hex(canonical_json(&hashes)?))
    }

    /// Recompute the registry hash and compare with the one captured at load
    pub fn verify_integrity(&self) -> bool {
        match Self::compute_hash(&self.rules) {
            Ok(hash) if hash == self.registry_hash => true,
            Ok(hash) => {
                tracing::error!(
                    expected = %self.registry_hash,
                    actual = %hash,
                    "Rule registry hash mismatch"
                );
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Rule registry hash could not be recomputed");
                false
            }
        }
    }

    pub fn get_rule(&self, code: &str) -> Option<&Rule> {
        self.index.get(code).map(|&i| &self.rules[i])
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.code.as_str())
    }

    pub fn registry_hash(&self) -> &str {
        &self.registry_hash
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
