//! Checkpoint - a classified, hashed snapshot of `SystemState`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use warden_core::SystemState;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckpointStatus {
    Safe,
    Unsafe,
    Unknown,
}

/// Immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    /// Hash of `state_snapshot` recorded at creation
    pub state_hash: String,
    pub state_snapshot: SystemState,
    pub compliance_score: f64,
    pub status: CheckpointStatus,
}

impl Checkpoint {
    pub fn is_safe(&self) -> bool {
        self.status == CheckpointStatus::Safe
    }

    /// Hash of the snapshot as it is now
    pub fn current_hash(&self) -> String {
        self.state_snapshot.state_hash()
    }

    /// Whether the snapshot still matches the hash recorded at creation
    pub fn verify(&self) -> bool {
        self.current_hash() == self.state_hash
    }
}
