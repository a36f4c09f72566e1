//! Checkpoint classification and retention policy

use serde::{Deserialize, Serialize};

use crate::checkpoint::CheckpointStatus;

/// Compliance at or above which a checkpoint is SAFE
pub const DEFAULT_SAFE_THRESHOLD: f64 = 0.95;
/// Compliance below which a checkpoint is UNSAFE
pub const DEFAULT_UNSAFE_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointPolicy {
    #[serde(default = "default_safe_threshold")]
    pub safe_threshold: f64,
    #[serde(default = "default_unsafe_threshold")]
    pub unsafe_threshold: f64,
    /// Pruning starts once more checkpoints than this are stored
    #[serde(default = "default_max_checkpoints")]
    pub max_checkpoints: usize,
    /// Most recent checkpoints of any status kept by pruning
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,
}

fn default_safe_threshold() -> f64 {
    DEFAULT_SAFE_THRESHOLD
}

fn default_unsafe_threshold() -> f64 {
    DEFAULT_UNSAFE_THRESHOLD
}

fn default_max_checkpoints() -> usize {
    100
}

fn default_keep_recent() -> usize {
    50
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        Self {
            safe_threshold: default_safe_threshold(),
            unsafe_threshold: default_unsafe_threshold(),
            max_checkpoints: default_max_checkpoints(),
            keep_recent: default_keep_recent(),
        }
    }
}

impl CheckpointPolicy {
    /// SAFE iff `score >= safe_threshold`, UNSAFE iff `score < unsafe_threshold`
    pub fn classify(&self, score: f64) -> CheckpointStatus {
        if score >= self.safe_threshold {
            CheckpointStatus::Safe
        } else if score < self.unsafe_threshold {
            CheckpointStatus::Unsafe
        } else {
            CheckpointStatus::Unknown
        }
    }
}
