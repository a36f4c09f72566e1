//! Audit Trail - append-only JSONL storage with an in-memory index
//!
//! Every entry is written to the file before it becomes visible in memory.
//! When verification fails the trail is sealed: reads keep working, further
//! writes are refused until an operator intervenes.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chain::{verify_chain, ChainError, ChainReport, GENESIS};
use crate::entry::AuditEntry;
use crate::error::{AuditError, AuditResult};
use crate::merkle::{merkle_root, MerkleSnapshot};

/// Default number of entries per Merkle snapshot
pub const DEFAULT_MERKLE_INTERVAL: usize = 100;

/// Aggregate view of the trail for status output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    /// Entries written since genesis
    pub total_entries: u64,
    /// Entries currently held in memory
    pub retained_entries: usize,
    pub last_id: Option<u64>,
    pub last_hash: String,
    pub chain_valid: bool,
    pub sealed: bool,
    /// Root over the retained entries
    pub merkle_root: Option<String>,
    pub snapshots: usize,
}

pub struct AuditTrail {
    path: Option<PathBuf>,
    file: Option<File>,
    entries: Vec<AuditEntry>,
    /// Expected `previous_hash` of `entries[0]`
    anchor_hash: String,
    last_hash: String,
    next_id: u64,
    retention: Option<usize>,
    merkle_interval: usize,
    pending_leaves: Vec<String>,
    snapshots: Vec<MerkleSnapshot>,
    /// Newest entry of each event type, kept past retention
    latest_by_type: BTreeMap<String, AuditEntry>,
    sealed: Option<ChainError>,
}

impl AuditTrail {
    /// Trail with no backing file
    pub fn in_memory() -> Self {
        Self {
            path: None,
            file: None,
            entries: Vec::new(),
            anchor_hash: GENESIS.to_string(),
            last_hash: GENESIS.to_string(),
            next_id: 1,
            retention: None,
            merkle_interval: DEFAULT_MERKLE_INTERVAL,
            pending_leaves: Vec::new(),
            snapshots: Vec::new(),
            latest_by_type: BTreeMap::new(),
            sealed: None,
        }
    }

    /// Open (or create) a JSONL trail and verify it
    ///
    /// A trail that fails verification is still returned, but sealed.
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut trail = Self::in_memory();
        let mut malformed = None;

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for (i, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<AuditEntry>(&line) {
                    Ok(entry) => trail.entries.push(entry),
                    Err(e) => {
                        malformed = Some(ChainError::Malformed {
                            line: i + 1,
                            reason: e.to_string(),
                        });
                        break;
                    }
                }
            }
        }

        for entry in &trail.entries {
            trail
                .latest_by_type
                .insert(entry.event_type.clone(), entry.clone());
        }
        if let Some(last) = trail.entries.last() {
            trail.last_hash = last.entry_hash.clone();
            trail.next_id = last.id + 1;
        }
        trail.rebuild_pending_leaves();

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        trail.path = Some(path);
        trail.file = Some(file);

        match malformed {
            Some(err) => trail.seal(err),
            None => {
                let _ = trail.verify_and_seal();
            }
        }

        tracing::info!(
            path = ?trail.path,
            entries = trail.entries.len(),
            sealed = trail.is_sealed(),
            "Audit trail opened"
        );

        Ok(trail)
    }

    /// Keep at most `retention` entries in memory (the file keeps everything)
    pub fn with_retention(mut self, retention: Option<usize>) -> Self {
        self.retention = retention.map(|r| r.max(1));
        self.apply_retention();
        self
    }

    pub fn with_merkle_interval(mut self, interval: usize) -> Self {
        self.merkle_interval = interval.max(1);
        self.rebuild_pending_leaves();
        self
    }

    /// Leaves written since the last snapshot boundary that are still in memory
    fn rebuild_pending_leaves(&mut self) {
        let pending = (self.total_entries() % self.merkle_interval as u64) as usize;
        let start = self.entries.len().saturating_sub(pending);
        self.pending_leaves = self.entries[start..]
            .iter()
            .map(|e| e.entry_hash.clone())
            .collect();
    }

    /// Append an entry and return its id
    pub fn add(
        &mut self,
        event_type: &str,
        data: Value,
        principles: Vec<String>,
    ) -> AuditResult<u64> {
        if let Some(err) = &self.sealed {
            return Err(AuditError::ChainCorrupted(err.clone()));
        }

        let entry = AuditEntry::new(
            self.next_id,
            event_type,
            data,
            principles,
            self.last_hash.clone(),
        );

        if let Some(ref mut file) = self.file {
            let json = serde_json::to_string(&entry)?;
            if let Err(e) = writeln!(file, "{}", json).and_then(|_| file.flush()) {
                // The line may be partly on disk; no further append is safe
                self.seal(ChainError::WriteFailed {
                    id: entry.id,
                    reason: e.to_string(),
                });
                return Err(e.into());
            }
        }

        let id = entry.id;
        self.last_hash = entry.entry_hash.clone();
        self.next_id += 1;
        self.pending_leaves.push(entry.entry_hash.clone());
        self.latest_by_type.insert(entry.event_type.clone(), entry.clone());
        self.entries.push(entry);

        if self.pending_leaves.len() >= self.merkle_interval {
            self.take_snapshot(id);
        }
        self.apply_retention();

        tracing::debug!(id, event_type, "Audit entry recorded");
        Ok(id)
    }

    fn take_snapshot(&mut self, to_id: u64) {
        let leaves = std::mem::take(&mut self.pending_leaves);
        if let Some(root) = merkle_root(&leaves) {
            let snapshot = MerkleSnapshot {
                from_id: to_id + 1 - leaves.len() as u64,
                to_id,
                root,
                timestamp: chrono::Utc::now(),
            };
            tracing::info!(to_id, root = %snapshot.root, "Merkle snapshot taken");
            self.snapshots.push(snapshot);
        }
    }

    fn apply_retention(&mut self) {
        let Some(limit) = self.retention else {
            return;
        };
        if self.entries.len() > limit {
            let excess = self.entries.len() - limit;
            self.entries.drain(..excess);
            if let Some(first) = self.entries.first() {
                self.anchor_hash = first.previous_hash.clone();
            }
        }
    }

    fn seal(&mut self, err: ChainError) {
        tracing::error!(error = %err, "Audit chain corrupted, sealing trail");
        self.sealed = Some(err);
    }

    /// Walk the retained chain
    pub fn verify(&self) -> Result<(), ChainError> {
        verify_chain(&self.entries, &self.anchor_hash)
    }

    /// Walk the chain and seal the trail on failure
    pub fn verify_and_seal(&mut self) -> Result<(), ChainError> {
        if let Some(err) = &self.sealed {
            return Err(err.clone());
        }
        let result = self.verify();
        if let Err(ref err) = result {
            self.seal(err.clone());
        }
        result
    }

    pub fn verify_integrity(&self) -> bool {
        self.sealed.is_none() && self.verify().is_ok()
    }

    pub fn chain_report(&self) -> ChainReport {
        let result = match &self.sealed {
            Some(err) => Err(err.clone()),
            None => self.verify(),
        };
        ChainReport::from_result(&self.entries, result)
    }

    /// Most recent first, filtered by event type and/or principle code
    pub fn search(
        &self,
        event_type: Option<&str>,
        principle: Option<&str>,
        limit: usize,
    ) -> Vec<AuditEntry> {
        self.entries
            .iter()
            .rev()
            .filter(|e| event_type.map_or(true, |t| e.event_type == t))
            .filter(|e| principle.map_or(true, |p| e.has_principle(p)))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn get(&self, id: u64) -> Option<&AuditEntry> {
        let first = self.entries.first()?.id;
        let index = id.checked_sub(first)? as usize;
        self.entries.get(index).filter(|e| e.id == id)
    }

    /// Newest entry whose type is one of `event_types`
    ///
    /// Looks past retention: every entry read on open or written since is
    /// considered.
    pub fn last_of(&self, event_types: &[&str]) -> Option<&AuditEntry> {
        event_types
            .iter()
            .filter_map(|t| self.latest_by_type.get(*t))
            .max_by_key(|e| e.id)
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries written since genesis, including those dropped by retention
    pub fn total_entries(&self) -> u64 {
        self.next_id - 1
    }

    pub fn last_hash(&self) -> &str {
        &self.last_hash
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.is_some()
    }

    pub fn seal_reason(&self) -> Option<&ChainError> {
        self.sealed.as_ref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn merkle_root(&self) -> Option<String> {
        let hashes: Vec<&str> = self.entries.iter().map(|e| e.entry_hash.as_str()).collect();
        merkle_root(&hashes)
    }

    pub fn snapshots(&self) -> &[MerkleSnapshot] {
        &self.snapshots
    }

    pub fn summary(&self) -> AuditSummary {
        AuditSummary {
            total_entries: self.total_entries(),
            retained_entries: self.entries.len(),
            last_id: self.entries.last().map(|e| e.id),
            last_hash: self.last_hash.clone(),
            chain_valid: self.verify_integrity(),
            sealed: self.is_sealed(),
            merkle_root: self.merkle_root(),
            snapshots: self.snapshots.len(),
        }
    }
}
