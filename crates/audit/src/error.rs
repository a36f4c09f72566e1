//! Audit trail errors

use thiserror::Error;

use crate::chain::ChainError;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit chain corrupted, writes refused: {0}")]
    ChainCorrupted(ChainError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for audit operations
pub type AuditResult<T> = Result<T, AuditError>;
