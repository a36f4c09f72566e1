//! Hash chain verification

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entry::{calculate_entry_hash, AuditEntry};

/// `previous_hash` of the first entry ever written
pub const GENESIS: &str = "GENESIS";

/// First break found while walking the chain
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Broken link at entry {id}: expected previous_hash '{expected}', got '{actual}'")]
    BrokenLink {
        id: u64,
        expected: String,
        actual: String,
    },

    #[error("Invalid hash at entry {id}: expected '{expected}', got '{actual}'")]
    InvalidHash {
        id: u64,
        expected: String,
        actual: String,
    },

    #[error("Invalid id: expected {expected}, got {actual}")]
    InvalidSequence { expected: u64, actual: u64 },

    #[error("Unreadable audit record at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("Write of entry {id} did not complete: {reason}")]
    WriteFailed { id: u64, reason: String },
}

impl ChainError {
    /// Id of the entry at which the chain stops verifying
    pub fn entry_id(&self) -> Option<u64> {
        match self {
            ChainError::BrokenLink { id, .. }
            | ChainError::InvalidHash { id, .. }
            | ChainError::WriteFailed { id, .. } => Some(*id),
            ChainError::InvalidSequence { actual, .. } => Some(*actual),
            ChainError::Malformed { .. } => None,
        }
    }
}

/// Verify `entries` link to each other and to `anchor`
///
/// `anchor` is [`GENESIS`] for a complete trail, or the `previous_hash` of
/// the first retained entry when the head has been truncated.
pub fn verify_chain(entries: &[AuditEntry], anchor: &str) -> Result<(), ChainError> {
    let mut prev_hash = anchor;

    for (i, entry) in entries.iter().enumerate() {
        if entry.previous_hash != prev_hash {
            return Err(ChainError::BrokenLink {
                id: entry.id,
                expected: prev_hash.to_string(),
                actual: entry.previous_hash.clone(),
            });
        }

        let calculated = calculate_entry_hash(entry);
        if entry.entry_hash != calculated {
            return Err(ChainError::InvalidHash {
                id: entry.id,
                expected: calculated,
                actual: entry.entry_hash.clone(),
            });
        }

        if i > 0 && entry.id != entries[i - 1].id + 1 {
            return Err(ChainError::InvalidSequence {
                expected: entries[i - 1].id + 1,
                actual: entry.id,
            });
        }

        prev_hash = &entry.entry_hash;
    }

    Ok(())
}

/// Result of a full chain walk, suitable for status output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainReport {
    pub valid: bool,
    pub verified_entries: usize,
    /// Id of the first entry that fails verification
    pub broken_at: Option<u64>,
    pub error: Option<String>,
}

impl ChainReport {
    pub fn from_result(entries: &[AuditEntry], result: Result<(), ChainError>) -> Self {
        match result {
            Ok(()) => Self {
                valid: true,
                verified_entries: entries.len(),
                broken_at: None,
                error: None,
            },
            Err(e) => {
                let broken_at = e.entry_id();
                let verified_entries = broken_at
                    .map(|id| entries.iter().take_while(|entry| entry.id < id).count())
                    .unwrap_or(0);
                Self {
                    valid: false,
                    verified_entries,
                    broken_at,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
