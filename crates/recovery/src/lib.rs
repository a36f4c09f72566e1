//! Warden Recovery - checkpoints of `SystemState` and rollback to the last SAFE one
//!
//! # Key Types
//! - `Checkpoint`: a hashed snapshot tagged SAFE/UNSAFE/UNKNOWN from a compliance score
//! - `CheckpointStore`: SQLite-backed, monotonic ids, pruning that never drops SAFE
//! - `RollbackEngine`: verifies the snapshot hash, restores, records and audits

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod rollback;
pub mod store;

pub use checkpoint::{Checkpoint, CheckpointStatus};
pub use config::CheckpointPolicy;
pub use error::RecoveryError;
pub use rollback::{RollbackEngine, RollbackEvent, RollbackStats, RollbackTrigger};
pub use store::{CheckpointStats, CheckpointStore};
