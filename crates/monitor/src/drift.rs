//! Drift Monitor - deviation of runtime metrics from a fixed baseline
//!
//! `drift = mean over matched keys of |current - baseline| / baseline`.
//! Baselines of zero are skipped; with no matched key the drift is 0.0.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MonitorError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftConfig {
    /// `is_drifting` once the last score exceeds this
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_baseline")]
    pub baseline: BTreeMap<String, f64>,
}

fn default_threshold() -> f64 {
    0.15
}

fn default_history_capacity() -> usize {
    1000
}

fn default_baseline() -> BTreeMap<String, f64> {
    BTreeMap::from([("overall_compliance".to_string(), 1.0)])
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            history_capacity: default_history_capacity(),
            baseline: default_baseline(),
        }
    }
}

/// One observed metrics sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub metrics: BTreeMap<String, f64>,
    pub drift_score: f64,
}

#[derive(Debug, Clone)]
pub struct DriftMonitor {
    baseline: BTreeMap<String, f64>,
    threshold: f64,
    capacity: usize,
    history: VecDeque<Observation>,
}

impl DriftMonitor {
    pub fn new(config: &DriftConfig) -> Result<Self, MonitorError> {
        if !config.threshold.is_finite() || config.threshold < 0.0 {
            return Err(MonitorError::InvalidThreshold(config.threshold));
        }
        let capacity = config.history_capacity.max(1);
        Ok(Self {
            baseline: config.baseline.clone(),
            threshold: config.threshold,
            capacity,
            history: VecDeque::with_capacity(capacity),
        })
    }

    pub fn baseline(&self) -> &BTreeMap<String, f64> {
        &self.baseline
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Drift of `metrics` against the baseline, without recording it
    pub fn drift_score(&self, metrics: &BTreeMap<String, f64>) -> f64 {
        let deviations: Vec<f64> = self
            .baseline
            .iter()
            .filter(|(_, base)| **base != 0.0)
            .filter_map(|(key, base)| {
                metrics
                    .get(key)
                    .filter(|v| v.is_finite())
                    .map(|current| (current - base).abs() / base.abs())
            })
            .collect();

        if deviations.is_empty() {
            return 0.0;
        }
        deviations.iter().sum::<f64>() / deviations.len() as f64
    }

    /// Record a sample and return its drift score
    pub fn observe(&mut self, metrics: BTreeMap<String, f64>) -> f64 {
        let drift_score = self.drift_score(&metrics);

        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(Observation {
            timestamp: Utc::now(),
            metrics,
            drift_score,
        });

        if drift_score > self.threshold {
            tracing::warn!(drift_score, threshold = self.threshold, "Metric drift detected");
        }
        drift_score
    }

    /// Score of the most recent observation (0.0 before any)
    pub fn last_score(&self) -> f64 {
        self.history.back().map_or(0.0, |o| o.drift_score)
    }

    pub fn is_drifting(&self) -> bool {
        self.last_score() > self.threshold
    }

    /// Mean drift over the last `window` observations
    pub fn trend(&self, window: usize) -> Option<f64> {
        let count = window.min(self.history.len());
        if count == 0 {
            return None;
        }
        let sum: f64 = self
            .history
            .iter()
            .rev()
            .take(count)
            .map(|o| o.drift_score)
            .sum();
        Some(sum / count as f64)
    }

    /// Oldest first
    pub fn history(&self) -> impl Iterator<Item = &Observation> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(baseline: &[(&str, f64)]) -> DriftMonitor {
        DriftMonitor::new(&DriftConfig {
            baseline: baseline.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            ..DriftConfig::default()
        })
        .unwrap()
    }

    fn metrics(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_drift_half() {
        let mut monitor = monitor(&[("x", 100.0)]);
        assert!((monitor.observe(metrics(&[("x", 150.0)])) - 0.5).abs() < 1e-12);
        assert!(monitor.is_drifting());
    }

    #[test]
    fn test_no_drift_at_baseline() {
        let mut monitor = monitor(&[("x", 100.0)]);
        assert_eq!(monitor.observe(metrics(&[("x", 100.0)])), 0.0);
        assert!(!monitor.is_drifting());
    }

    #[test]
    fn test_mean_over_matched_keys_only() {
        let mut monitor = monitor(&[("a", 10.0), ("b", 20.0), ("c", 5.0)]);
        // a: 0.2, b: 0.5, c unmatched
        let score = monitor.observe(metrics(&[("a", 12.0), ("b", 10.0), ("z", 1.0)]));
        assert!((score - 0.35).abs() < 1e-12);
    }

    #[test]
    fn test_zero_baseline_skipped() {
        let mut monitor = monitor(&[("zero", 0.0), ("x", 100.0)]);
        assert_eq!(monitor.observe(metrics(&[("zero", 50.0), ("x", 100.0)])), 0.0);

        let mut only_zero = self::monitor(&[("zero", 0.0)]);
        assert_eq!(only_zero.observe(metrics(&[("zero", 50.0)])), 0.0);
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut monitor = monitor(&[("x", 100.0)]);
        monitor.observe(metrics(&[("x", 115.0)]));
        assert!(!monitor.is_drifting());
        monitor.observe(metrics(&[("x", 116.0)]));
        assert!(monitor.is_drifting());
    }

    #[test]
    fn test_history_bounded() {
        let mut monitor = DriftMonitor::new(&DriftConfig {
            history_capacity: 3,
            baseline: metrics(&[("x", 100.0)]),
            ..DriftConfig::default()
        })
        .unwrap();

        for v in [100.0, 110.0, 120.0, 130.0, 140.0] {
            monitor.observe(metrics(&[("x", v)]));
        }

        assert_eq!(monitor.len(), 3);
        let first = monitor.history().next().unwrap();
        assert_eq!(first.metrics["x"], 120.0);
    }

    #[test]
    fn test_trend() {
        let mut monitor = monitor(&[("x", 100.0)]);
        assert_eq!(monitor.trend(5), None);

        monitor.observe(metrics(&[("x", 100.0)]));
        monitor.observe(metrics(&[("x", 120.0)]));
        monitor.observe(metrics(&[("x", 140.0)]));

        assert!((monitor.trend(2).unwrap() - 0.3).abs() < 1e-12);
        assert!((monitor.trend(10).unwrap() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let config = DriftConfig {
            threshold: -1.0,
            ..DriftConfig::default()
        };
        assert!(matches!(
            DriftMonitor::new(&config),
            Err(MonitorError::InvalidThreshold(_))
        ));
    }
}
