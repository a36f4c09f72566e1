//! Kernel error taxonomy
//!
//! Cloneable and serializable so it can travel inside a `ProcessOutcome`
//! and across the recorder's reply channels.

use serde::Serialize;
use thiserror::Error;
use warden_audit::AuditError;
use warden_monitor::MonitorError;
use warden_recovery::RecoveryError;
use warden_rules::{Action, RuleError};

#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum KernelError {
    #[error("Operation rejected: violated {codes:?}, action {action:?}")]
    ValidationRejected {
        codes: Vec<String>,
        action: Option<Action>,
    },

    #[error("Integrity failure: {0}")]
    IntegrityFailure(String),

    #[error("No safe checkpoint available")]
    NoSafeCheckpoint,

    #[error("Audit chain corrupted: {0}")]
    ChainCorruption(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Execution timed out after {0} ms")]
    ExecutionTimeout(u64),

    #[error("Kernel in lockdown: {0}")]
    Lockdown(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Recorder task is not running")]
    RecorderClosed,

    #[error("Operation pool is shut down")]
    PoolClosed,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type KernelResult<T> = Result<T, KernelError>;

impl KernelError {
    /// Errors that must surface as a persistent degraded flag
    pub fn is_integrity_related(&self) -> bool {
        matches!(
            self,
            KernelError::IntegrityFailure(_) | KernelError::ChainCorruption(_)
        )
    }
}

impl From<AuditError> for KernelError {
    fn from(err: AuditError) -> Self {
        match err {
            AuditError::ChainCorrupted(chain) => KernelError::ChainCorruption(chain.to_string()),
            other => KernelError::Storage(other.to_string()),
        }
    }
}

impl From<RecoveryError> for KernelError {
    fn from(err: RecoveryError) -> Self {
        match err {
            RecoveryError::NoSafeCheckpoint => KernelError::NoSafeCheckpoint,
            err @ RecoveryError::IntegrityFailure { .. } => {
                KernelError::IntegrityFailure(err.to_string())
            }
            RecoveryError::Audit(audit) => audit.into(),
            other => KernelError::Storage(other.to_string()),
        }
    }
}

impl From<MonitorError> for KernelError {
    fn from(err: MonitorError) -> Self {
        match err {
            MonitorError::InvalidThreshold(_) => KernelError::Config(err.to_string()),
            MonitorError::Artifact { .. } => KernelError::Storage(err.to_string()),
        }
    }
}

impl From<RuleError> for KernelError {
    fn from(err: RuleError) -> Self {
        KernelError::Config(err.to_string())
    }
}
