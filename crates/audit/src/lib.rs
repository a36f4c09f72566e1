//! Warden Audit - the append-only, hash-chained record of significant events
//!
//! Each entry commits to its predecessor through `previous_hash`, starting
//! from the [`GENESIS`] constant. The JSONL file is the durable copy; the
//! chain can be verified by reopening it without any in-memory state.

pub mod chain;
pub mod entry;
pub mod error;
pub mod merkle;
pub mod trail;

pub use chain::{verify_chain, ChainError, ChainReport, GENESIS};
pub use entry::AuditEntry;
pub use error::AuditError;
pub use merkle::{merkle_root, MerkleSnapshot};
pub use trail::{AuditSummary, AuditTrail};
