//! Silent Monitor - one alert level from drift, integrity and compliance
//!
//! Self-healing only names a compensating action; it never changes
//! production state. The caller records the advice in the audit trail.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Observations kept for status output
const OBSERVATION_CAPACITY: usize = 100;

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertLevel {
    #[default]
    Normal,
    Watch,
    Concern,
    InterventionNeeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertKind {
    Drift,
    Integrity,
    Compliance,
}

impl AlertKind {
    /// Advisory compensating action for this kind of alert
    pub fn compensating_action(&self) -> &'static str {
        match self {
            AlertKind::Drift => "drift correction",
            AlertKind::Integrity => "escalate integrity violation",
            AlertKind::Compliance => "increase monitoring frequency",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub level: AlertLevel,
    pub message: String,
}

/// Inputs for one system-state observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSample {
    pub drift_score: f64,
    pub integrity_valid: bool,
    pub compliance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemObservation {
    pub timestamp: DateTime<Utc>,
    pub sample: HealthSample,
    pub alerts: Vec<Alert>,
    pub alert_level: AlertLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingAction {
    pub kind: AlertKind,
    pub level: AlertLevel,
    pub action: String,
}

#[derive(Debug, Clone)]
pub struct SilentMonitor {
    drift_threshold: f64,
    observations: VecDeque<SystemObservation>,
}

impl SilentMonitor {
    pub fn new(drift_threshold: f64) -> Self {
        Self {
            drift_threshold,
            observations: VecDeque::with_capacity(OBSERVATION_CAPACITY),
        }
    }

    fn drift_level(&self, score: f64) -> AlertLevel {
        if score > self.drift_threshold * 2.0 {
            AlertLevel::InterventionNeeded
        } else if score > self.drift_threshold {
            AlertLevel::Concern
        } else if score > self.drift_threshold / 2.0 {
            AlertLevel::Watch
        } else {
            AlertLevel::Normal
        }
    }

    fn compliance_level(compliance: f64) -> AlertLevel {
        if compliance < 0.7 {
            AlertLevel::InterventionNeeded
        } else if compliance < 0.85 {
            AlertLevel::Concern
        } else if compliance < 0.95 {
            AlertLevel::Watch
        } else {
            AlertLevel::Normal
        }
    }

    /// Classify a sample; the overall level is the worst of the three checks
    pub fn observe_system_state(&mut self, sample: HealthSample) -> SystemObservation {
        let mut alerts = Vec::new();

        let drift = self.drift_level(sample.drift_score);
        if drift > AlertLevel::Normal {
            alerts.push(Alert {
                kind: AlertKind::Drift,
                level: drift,
                message: format!(
                    "drift {:.3} against threshold {:.3}",
                    sample.drift_score, self.drift_threshold
                ),
            });
        }

        if !sample.integrity_valid {
            alerts.push(Alert {
                kind: AlertKind::Integrity,
                level: AlertLevel::InterventionNeeded,
                message: "critical artifact integrity check failed".to_string(),
            });
        }

        let compliance = Self::compliance_level(sample.compliance);
        if compliance > AlertLevel::Normal {
            alerts.push(Alert {
                kind: AlertKind::Compliance,
                level: compliance,
                message: format!("overall compliance {:.3}", sample.compliance),
            });
        }

        let alert_level = alerts
            .iter()
            .map(|a| a.level)
            .max()
            .unwrap_or(AlertLevel::Normal);

        if alert_level >= AlertLevel::Concern {
            tracing::warn!(level = %alert_level, alerts = alerts.len(), "System health degraded");
        }

        let observation = SystemObservation {
            timestamp: Utc::now(),
            sample,
            alerts,
            alert_level,
        };

        if self.observations.len() == OBSERVATION_CAPACITY {
            self.observations.pop_front();
        }
        self.observations.push_back(observation.clone());
        observation
    }

    /// One advisory action per alert
    pub fn trigger_self_healing(&self, alerts: &[Alert]) -> Vec<HealingAction> {
        alerts
            .iter()
            .map(|alert| {
                let action = alert.kind.compensating_action();
                tracing::info!(kind = %alert.kind, action, "Self-healing advised");
                HealingAction {
                    kind: alert.kind,
                    level: alert.level,
                    action: action.to_string(),
                }
            })
            .collect()
    }

    pub fn last_observation(&self) -> Option<&SystemObservation> {
        self.observations.back()
    }

    pub fn observations(&self) -> impl Iterator<Item = &SystemObservation> {
        self.observations.iter()
    }
}
