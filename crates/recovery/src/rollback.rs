//! Rollback Engine - restore the last SAFE checkpoint
//!
//! The snapshot hash is recomputed before anything is touched. A mismatch
//! or a missing SAFE checkpoint leaves the current state as it was and is
//! returned as a typed error so the caller can choose lockdown or retry.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum_macros::{Display, EnumString};
use warden_audit::{AuditError, AuditTrail};
use warden_core::SystemState;

use crate::checkpoint::Checkpoint;
use crate::error::{RecoveryError, RecoveryResult};
use crate::store::CheckpointStore;

/// Audit event type for a completed rollback
pub const EVENT_ROLLBACK: &str = "rollback";
/// Audit event type for a refused rollback
pub const EVENT_ROLLBACK_FAILED: &str = "rollback_failed";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RollbackTrigger {
    CriticalViolation,
    Lockdown,
    IntegrityFailure,
    DriftDetected,
    Manual,
}

/// One performed rollback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackEvent {
    pub timestamp: DateTime<Utc>,
    pub trigger: RollbackTrigger,
    pub context: Value,
    pub restored_checkpoint_id: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackStats {
    pub total: u64,
    pub by_trigger: BTreeMap<String, u64>,
}

pub struct RollbackEngine {
    history: Vec<RollbackEvent>,
}

impl RollbackEngine {
    /// Engine seeded with the rollback history already persisted in `store`
    pub fn load(store: &CheckpointStore) -> RecoveryResult<Self> {
        Ok(Self {
            history: store.rollback_events()?,
        })
    }

    pub fn new() -> Self {
        Self {
            history: Vec::new(),
        }
    }

    /// Restore the last SAFE checkpoint into `state`
    ///
    /// Rule codes listed under `context["violated"]` are attached to the
    /// audit entry. Prior checkpoints and audit history are never removed.
    pub fn trigger(
        &mut self,
        store: &CheckpointStore,
        audit: &mut AuditTrail,
        state: &mut SystemState,
        trigger: RollbackTrigger,
        context: Value,
    ) -> RecoveryResult<RollbackEvent> {
        if let Some(err) = audit.seal_reason() {
            return Err(RecoveryError::Audit(AuditError::ChainCorrupted(err.clone())));
        }

        let principles = violated_codes(&context);

        let checkpoint = match self.verified_last_safe(store) {
            Ok(checkpoint) => checkpoint,
            Err(err) => {
                tracing::error!(%trigger, error = %err, "Rollback refused");
                audit.add(
                    EVENT_ROLLBACK_FAILED,
                    json!({
                        "trigger": trigger,
                        "error": err.to_string(),
                        "context": context,
                    }),
                    principles,
                )?;
                return Err(err);
            }
        };

        let event = RollbackEvent {
            timestamp: Utc::now(),
            trigger,
            context,
            restored_checkpoint_id: checkpoint.id,
        };
        let event_id = store.record_rollback(&event)?;

        let audited = audit.add(
            EVENT_ROLLBACK,
            json!({
                "trigger": trigger,
                "checkpoint_id": checkpoint.id,
                "restored_state_hash": checkpoint.state_hash,
                "previous_state_hash": state.state_hash(),
                "context": event.context,
            }),
            principles,
        );
        if let Err(err) = audited {
            if let Err(undo) = store.remove_rollback(event_id) {
                tracing::error!(error = %undo, event_id, "Unaudited rollback left in store");
            }
            return Err(err.into());
        }

        // Only a recorded and audited rollback touches the state
        *state = checkpoint.state_snapshot;
        self.history.push(event.clone());

        tracing::warn!(
            %trigger,
            checkpoint_id = checkpoint.id,
            "Rolled back to last safe checkpoint"
        );

        Ok(event)
    }

    fn verified_last_safe(&self, store: &CheckpointStore) -> RecoveryResult<Checkpoint> {
        let checkpoint = store
            .get_last_safe()?
            .ok_or(RecoveryError::NoSafeCheckpoint)?;

        let actual = checkpoint.current_hash();
        if actual != checkpoint.state_hash {
            return Err(RecoveryError::IntegrityFailure {
                checkpoint_id: checkpoint.id,
                expected: checkpoint.state_hash,
                actual,
            });
        }
        Ok(checkpoint)
    }

    pub fn history(&self) -> &[RollbackEvent] {
        &self.history
    }

    pub fn stats(&self) -> RollbackStats {
        let mut by_trigger = BTreeMap::new();
        for event in &self.history {
            *by_trigger.entry(event.trigger.to_string()).or_insert(0) += 1;
        }
        RollbackStats {
            total: self.history.len() as u64,
            by_trigger,
        }
    }
}

impl Default for RollbackEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn violated_codes(context: &Value) -> Vec<String> {
    context
        .get("violated")
        .and_then(Value::as_array)
        .map(|codes| {
            codes
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
