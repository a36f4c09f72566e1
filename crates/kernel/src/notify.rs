//! Kernel event notifications
//!
//! A best-effort broadcast sink for external reporting. Sending never
//! blocks and never fails the operation; slow subscribers lose events.

use serde::Serialize;
use strum_macros::Display;
use tokio::sync::broadcast;
use uuid::Uuid;
use warden_monitor::AlertLevel;
use warden_recovery::RollbackTrigger;
use warden_rules::Action;

/// Persistent reasons for reporting the kernel as degraded
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DegradedReason {
    RegistryMismatch,
    ChainCorruption,
    CheckpointIntegrity,
    ArtifactTampering,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum KernelEvent {
    OperationCompleted {
        operation_id: Uuid,
        operation_type: String,
        checkpoint_id: Option<u64>,
    },
    OperationRejected {
        operation_id: Uuid,
        operation_type: String,
        violated: Vec<String>,
        action: Option<Action>,
    },
    RollbackPerformed {
        trigger: RollbackTrigger,
        checkpoint_id: u64,
    },
    RollbackFailed {
        trigger: RollbackTrigger,
        reason: String,
    },
    LockdownEngaged {
        reason: String,
    },
    LockdownReleased {
        operator: String,
    },
    SelfHealingAdvised {
        level: AlertLevel,
        actions: Vec<String>,
    },
    Degraded {
        reason: DegradedReason,
    },
}

#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<KernelEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KernelEvent> {
        self.tx.subscribe()
    }

    pub fn notify(&self, event: KernelEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
