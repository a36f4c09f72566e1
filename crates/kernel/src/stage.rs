//! Per-operation state machine
//!
//! ```text
//! Received -> Validated -> Executed -> Audited -> Checkpointed
//!          \-> Rejected -> ViolationHandled -> RolledBack
//!                         Executed -> ViolationHandled
//! ```
//! `Failed` covers handler errors and timeouts; `Cancelled` can follow any
//! stage reached before execution, or `Audited` when cancelled afterwards.

use serde::{Deserialize, Serialize};
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OperationStage {
    Received,
    Validated,
    Rejected,
    Executed,
    Failed,
    Audited,
    Checkpointed,
    ViolationHandled,
    RolledBack,
    Cancelled,
}

impl OperationStage {
    pub fn can_transition_to(self, next: OperationStage) -> bool {
        use OperationStage::*;
        matches!(
            (self, next),
            (Received, Validated)
                | (Received, Rejected)
                | (Received, Cancelled)
                | (Validated, Executed)
                | (Validated, Failed)
                | (Validated, Cancelled)
                | (Executed, Audited)
                | (Executed, ViolationHandled)
                | (Failed, Audited)
                | (Audited, Checkpointed)
                | (Audited, Cancelled)
                | (Rejected, ViolationHandled)
                | (ViolationHandled, RolledBack)
        )
    }

    pub fn is_success(self) -> bool {
        matches!(self, OperationStage::Audited | OperationStage::Checkpointed)
    }
}

/// Records the path an operation takes through the stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTracker {
    path: Vec<OperationStage>,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            path: vec![OperationStage::Received],
        }
    }

    pub fn current(&self) -> OperationStage {
        self.path
            .last()
            .copied()
            .unwrap_or(OperationStage::Received)
    }

    /// Move to `next`; an illegal transition is logged and still recorded
    ///
    /// Returns whether the transition was legal.
    pub fn advance(&mut self, next: OperationStage) -> bool {
        let current = self.current();
        let legal = current.can_transition_to(next);
        if !legal {
            tracing::error!(from = %current, to = %next, "Illegal operation stage transition");
        }
        self.path.push(next);
        legal
    }

    pub fn path(&self) -> &[OperationStage] {
        &self.path
    }

    pub fn into_path(self) -> Vec<OperationStage> {
        self.path
    }
}
