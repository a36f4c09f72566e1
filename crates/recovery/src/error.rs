//! Recovery errors

use thiserror::Error;
use warden_audit::AuditError;

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("No safe checkpoint available")]
    NoSafeCheckpoint,

    #[error("Checkpoint {checkpoint_id} failed integrity check: expected {expected}, got {actual}")]
    IntegrityFailure {
        checkpoint_id: u64,
        expected: String,
        actual: String,
    },

    #[error("Checkpoint not found: {0}")]
    NotFound(u64),

    #[error("Corrupt checkpoint record: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),
}

pub type RecoveryResult<T> = Result<T, RecoveryError>;
