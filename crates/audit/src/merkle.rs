//! Merkle roots over entry hashes
//!
//! Snapshots let an external witness pin a trail prefix with a single hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::sha256_hex;

/// Merkle root of a list of hex hashes (odd levels duplicate the last node)
pub fn merkle_root<S: AsRef<str>>(leaves: &[S]) -> Option<String> {
    if leaves.is_empty() {
        return None;
    }

    let mut level: Vec<String> = leaves.iter().map(|l| l.as_ref().to_string()).collect();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let left = &pair[0];
                let right = pair.get(1).unwrap_or(left);
                sha256_hex(format!("{}{}", left, right))
            })
            .collect();
    }

    level.pop()
}

/// Root over one segment of consecutive entries `from_id..=to_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerkleSnapshot {
    pub from_id: u64,
    pub to_id: u64,
    pub root: String,
    pub timestamp: DateTime<Utc>,
}
