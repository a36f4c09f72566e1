//! Warden Kernel - operation orchestration over the policy stores
//!
//! # Key Types
//! - `Orchestrator`: validates, executes, audits and checkpoints operations
//! - `RecorderHandle`: the single writer of audit, checkpoint and state
//! - `OperationHandler`: pluggable domain logic keyed by operation type
//! - `OperationPool`: worker tasks for concurrent callers
//! - `KernelStatus`: aggregated snapshot for external reporting

pub mod cancel;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod handler;
pub mod notify;
pub mod orchestrator;
pub mod outcome;
pub mod pool;
pub mod recorder;
pub mod stage;
pub mod status;

pub use cancel::CancelToken;
pub use config::KernelConfig;
pub use error::{KernelError, KernelResult};
pub use handler::{
    AcknowledgeHandler, ConfigureHandler, HandlerError, HandlerOutput, HandlerRegistry,
    OperationHandler,
};
pub use notify::{DegradedReason, KernelEvent, Notifier};
pub use orchestrator::Orchestrator;
pub use outcome::ProcessOutcome;
pub use pool::OperationPool;
pub use recorder::{CheckpointReceipt, CommitReceipt, RecorderHandle};
pub use stage::{OperationStage, StageTracker};
pub use status::{KernelStatus, LockdownInfo};
