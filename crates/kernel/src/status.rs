//! Aggregated kernel snapshot for external reporting

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_audit::AuditSummary;
use warden_monitor::AlertLevel;
use warden_recovery::{CheckpointStats, RollbackStats};
use warden_rules::ViolationReport;

use crate::error::{KernelError, KernelResult};
use crate::notify::DegradedReason;

/// Why and since when operations are refused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockdownInfo {
    pub reason: String,
    pub engaged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KernelStatus {
    pub overall_compliance: f64,
    pub total_violations: u64,
    pub per_rule_scores: BTreeMap<String, f64>,
    pub recent_violations: Vec<ViolationReport>,
    pub checkpoints: CheckpointStats,
    pub rollbacks: RollbackStats,
    pub drift_score: f64,
    pub drift_trend: Option<f64>,
    pub integrity_valid: bool,
    pub tampered: Vec<PathBuf>,
    pub alert_level: AlertLevel,
    pub audit: AuditSummary,
    pub registry_hash: String,
    pub registry_valid: bool,
    pub state_revision: u64,
    pub state_hash: String,
    pub lockdown: Option<LockdownInfo>,
    pub degraded: Vec<DegradedReason>,
    pub generated_at: DateTime<Utc>,
}

impl KernelStatus {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    pub fn is_locked_down(&self) -> bool {
        self.lockdown.is_some()
    }

    pub fn to_pretty_json(&self) -> KernelResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| KernelError::Storage(e.to_string()))
    }
}
