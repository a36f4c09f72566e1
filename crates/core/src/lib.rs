//! Warden Core - shared domain types
//!
//! # Key Types
//! - `Operation`: typed record submitted for policy validation
//! - `Criticality`: how significant an operation is (drives checkpointing)
//! - `SystemState`: the narrow value that is checkpointed and restored
//! - `digest`: canonical JSON and SHA-256 helpers shared by every hash

pub mod digest;
pub mod error;
pub mod operation;
pub mod state;

pub use digest::{canonical_json, sha256_hex};
pub use error::OperationError;
pub use operation::{Criticality, Operation};
pub use state::SystemState;
