//! Kernel configuration
//!
//! Every field has a default, so an empty JSON object is a valid config.
//! Thresholds are tunable without recompilation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_monitor::DriftConfig;
use warden_recovery::CheckpointPolicy;

use crate::error::KernelError;

/// Audit trail file inside the data directory
pub const AUDIT_FILE: &str = "audit.jsonl";
/// Checkpoint database inside the data directory
pub const CHECKPOINT_FILE: &str = "checkpoints.db";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Where the audit trail and checkpoints live; `None` keeps everything in memory
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub checkpoint: CheckpointPolicy,

    #[serde(default)]
    pub drift: DriftConfig,

    /// Audit entries kept in memory (the file keeps everything)
    #[serde(default)]
    pub audit_retention: Option<usize>,

    /// Entries per Merkle snapshot
    #[serde(default = "default_merkle_interval")]
    pub merkle_interval: usize,

    /// Critical artifacts hashed at startup and re-checked after every operation
    #[serde(default)]
    pub integrity_manifest: Vec<PathBuf>,

    /// Bounded queue in front of the single audit/checkpoint writer
    #[serde(default = "default_recorder_queue_depth")]
    pub recorder_queue_depth: usize,

    /// Workers in an `OperationPool`
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_handler_timeout_ms")]
    pub handler_timeout_ms: u64,

    /// Buffered kernel events per subscriber
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
}

fn default_merkle_interval() -> usize {
    100
}

fn default_recorder_queue_depth() -> usize {
    256
}

fn default_workers() -> usize {
    4
}

fn default_handler_timeout_ms() -> u64 {
    5000
}

fn default_notification_capacity() -> usize {
    1024
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            checkpoint: CheckpointPolicy::default(),
            drift: DriftConfig::default(),
            audit_retention: None,
            merkle_interval: default_merkle_interval(),
            integrity_manifest: Vec::new(),
            recorder_queue_depth: default_recorder_queue_depth(),
            workers: default_workers(),
            handler_timeout_ms: default_handler_timeout_ms(),
            notification_capacity: default_notification_capacity(),
        }
    }
}

impl KernelConfig {
    pub fn from_json(json: &str) -> Result<Self, KernelError> {
        serde_json::from_str(json).map_err(|e| KernelError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, KernelError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| KernelError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&contents)
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn audit_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|d| d.join(AUDIT_FILE))
    }

    pub fn checkpoint_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|d| d.join(CHECKPOINT_FILE))
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_gives_defaults() {
        let config = KernelConfig::from_json("{}").unwrap();
        assert_eq!(config, KernelConfig::default());
        assert_eq!(config.checkpoint.max_checkpoints, 100);
        assert_eq!(config.drift.threshold, 0.15);
        assert_eq!(config.handler_timeout(), Duration::from_secs(5));
        assert!(config.audit_path().is_none());
    }

    #[test]
    fn test_nested_overrides() {
        let config = KernelConfig::from_json(
            r#"{
                "data_dir": "/var/lib/warden",
                "checkpoint": {"keep_recent": 20},
                "drift": {"threshold": 0.3},
                "workers": 8
            }"#,
        )
        .unwrap();

        assert_eq!(config.checkpoint.keep_recent, 20);
        assert_eq!(config.checkpoint.max_checkpoints, 100);
        assert_eq!(config.drift.threshold, 0.3);
        assert_eq!(config.drift.history_capacity, 1000);
        assert_eq!(config.workers, 8);
        assert_eq!(
            config.audit_path(),
            Some(PathBuf::from("/var/lib/warden/audit.jsonl"))
        );
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        assert!(matches!(
            KernelConfig::from_json("{\"workers\": \"many\"}"),
            Err(KernelError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        assert!(matches!(
            KernelConfig::from_file("/nonexistent/warden.json"),
            Err(KernelError::Config(_))
        ));
    }
}
