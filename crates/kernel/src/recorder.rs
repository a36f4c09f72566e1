//! Recorder - the single writer of audit, checkpoint and state
//!
//! One task owns every mutation of the stores:
//! - Receives commands via a bounded mpsc channel
//! - Sends results back via oneshot channels
//!
//! Readers (status, search) take the shared read lock and always see whole
//! entries, since the task holds the write lock for a full command. Each
//! command runs on the blocking pool so disk I/O never stalls a runtime worker.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, RwLock};
use warden_audit::{AuditTrail, ChainReport};
use warden_core::SystemState;
use warden_recovery::{
    CheckpointStatus, CheckpointStore, RollbackEngine, RollbackEvent, RollbackTrigger,
};

use crate::error::{KernelError, KernelResult};
use crate::events;

/// Everything the recorder mutates
pub struct KernelStores {
    pub audit: AuditTrail,
    pub checkpoints: CheckpointStore,
    pub rollback: RollbackEngine,
    pub state: SystemState,
}

pub type SharedStores = Arc<RwLock<KernelStores>>;

/// Result of applying an executed operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitReceipt {
    pub audit_id: u64,
    pub revision: u64,
    pub state_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckpointReceipt {
    pub id: u64,
    pub status: CheckpointStatus,
    pub pruned: usize,
}

type Reply<T> = oneshot::Sender<KernelResult<T>>;

/// Request handled by the recorder task
pub enum RecordCommand {
    Audit {
        event_type: String,
        data: Value,
        principles: Vec<String>,
        reply: Reply<u64>,
    },
    /// Audit a decision and apply its state changes as one step
    Commit {
        op_type: String,
        changes: BTreeMap<String, Value>,
        data: Value,
        reply: Reply<CommitReceipt>,
    },
    Checkpoint {
        compliance: f64,
        reply: Reply<CheckpointReceipt>,
    },
    Rollback {
        trigger: RollbackTrigger,
        context: Value,
        reply: Reply<RollbackEvent>,
    },
    VerifyAudit {
        reply: Reply<ChainReport>,
    },
}

/// Handle to send commands to the recorder task
#[derive(Clone)]
pub struct RecorderHandle {
    tx: mpsc::Sender<RecordCommand>,
}

impl RecorderHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> RecordCommand,
    ) -> KernelResult<T> {
        let (reply, rx) = oneshot::channel();

        self.tx
            .send(build(reply))
            .await
            .map_err(|_| KernelError::RecorderClosed)?;

        rx.await.map_err(|_| KernelError::RecorderClosed)?
    }

    pub async fn audit(
        &self,
        event_type: &str,
        data: Value,
        principles: Vec<String>,
    ) -> KernelResult<u64> {
        let event_type = event_type.to_string();
        self.request(|reply| RecordCommand::Audit {
            event_type,
            data,
            principles,
            reply,
        })
        .await
    }

    pub async fn commit(
        &self,
        op_type: &str,
        changes: BTreeMap<String, Value>,
        data: Value,
    ) -> KernelResult<CommitReceipt> {
        let op_type = op_type.to_string();
        self.request(|reply| RecordCommand::Commit {
            op_type,
            changes,
            data,
            reply,
        })
        .await
    }

    pub async fn checkpoint(&self, compliance: f64) -> KernelResult<CheckpointReceipt> {
        self.request(|reply| RecordCommand::Checkpoint { compliance, reply })
            .await
    }

    pub async fn rollback(
        &self,
        trigger: RollbackTrigger,
        context: Value,
    ) -> KernelResult<RollbackEvent> {
        self.request(|reply| RecordCommand::Rollback {
            trigger,
            context,
            reply,
        })
        .await
    }

    /// Walk the audit chain, sealing the trail if it is broken
    pub async fn verify_audit(&self) -> KernelResult<ChainReport> {
        self.request(|reply| RecordCommand::VerifyAudit { reply })
            .await
    }
}

/// Spawn the recorder task over `stores`
pub fn spawn_recorder(stores: SharedStores, queue_depth: usize) -> RecorderHandle {
    let (tx, rx) = mpsc::channel::<RecordCommand>(queue_depth.max(1));

    tokio::spawn(recorder_loop(stores, rx));

    RecorderHandle { tx }
}

async fn recorder_loop(stores: SharedStores, mut rx: mpsc::Receiver<RecordCommand>) {
    while let Some(command) = rx.recv().await {
        let mut guard = stores.clone().write_owned().await;

        // SQLite and file flushes block, so they run off the runtime workers
        let handled = tokio::task::spawn_blocking(move || execute(&mut guard, command)).await;
        if let Err(err) = handled {
            tracing::error!(error = %err, "Recorder command did not complete");
        }
    }

    tracing::debug!("Recorder stopped");
}

fn execute(owned: &mut KernelStores, command: RecordCommand) {
    // A dropped reply receiver means the caller gave up; the write still stands
    match command {
        RecordCommand::Audit {
            event_type,
            data,
            principles,
            reply,
        } => {
            let result = owned
                .audit
                .add(&event_type, data, principles)
                .map_err(KernelError::from);
            let _ = reply.send(result);
        }
        RecordCommand::Commit {
            op_type,
            changes,
            data,
            reply,
        } => {
            let _ = reply.send(commit(owned, &op_type, changes, data));
        }
        RecordCommand::Checkpoint { compliance, reply } => {
            let _ = reply.send(checkpoint(owned, compliance));
        }
        RecordCommand::Rollback {
            trigger,
            context,
            reply,
        } => {
            let KernelStores {
                audit,
                checkpoints,
                rollback,
                state,
            } = owned;
            let result = rollback
                .trigger(checkpoints, audit, state, trigger, context)
                .map_err(KernelError::from);
            let _ = reply.send(result);
        }
        RecordCommand::VerifyAudit { reply } => {
            // The report carries the failure; sealing is the side effect
            let _ = owned.audit.verify_and_seal();
            let _ = reply.send(Ok(owned.audit.chain_report()));
        }
    }
}

/// State changes only land once the decision entry is durable
fn commit(
    stores: &mut KernelStores,
    op_type: &str,
    changes: BTreeMap<String, Value>,
    mut data: Value,
) -> KernelResult<CommitReceipt> {
    let mut next = stores.state.clone();
    next.apply(op_type, changes);
    let state_hash = next.state_hash();

    if let Value::Object(ref mut map) = data {
        map.insert("revision".to_string(), Value::from(next.revision));
        map.insert("state_hash".to_string(), Value::from(state_hash.clone()));
    }

    let audit_id = stores.audit.add(events::DECISION, data, Vec::new())?;
    let revision = next.revision;
    stores.state = next;

    Ok(CommitReceipt {
        audit_id,
        revision,
        state_hash,
    })
}

fn checkpoint(stores: &mut KernelStores, compliance: f64) -> KernelResult<CheckpointReceipt> {
    let checkpoint = stores
        .checkpoints
        .create_checkpoint(&stores.state, compliance)?;
    let pruned = stores.checkpoints.prune()?;

    Ok(CheckpointReceipt {
        id: checkpoint.id,
        status: checkpoint.status,
        pruned,
    })
}
