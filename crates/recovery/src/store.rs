//! SQLite storage for checkpoints and rollback history
//!
//! Ids come from `AUTOINCREMENT`, so they stay monotonic across pruning and
//! restarts. The connection sits behind a mutex so readers can share the store.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use warden_core::SystemState;

use crate::checkpoint::{Checkpoint, CheckpointStatus};
use crate::config::CheckpointPolicy;
use crate::error::{RecoveryError, RecoveryResult};
use crate::rollback::{RollbackEvent, RollbackTrigger};

const CHECKPOINT_COLUMNS: &str =
    "id, timestamp, state_hash, state_json, compliance_score, status";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointStats {
    pub total: usize,
    pub safe: usize,
    #[serde(rename = "unsafe")]
    pub unsafe_count: usize,
    pub unknown: usize,
}

pub struct CheckpointStore {
    conn: Mutex<Connection>,
    policy: CheckpointPolicy,
}

impl CheckpointStore {
    /// Open (or create) a store at the given database path
    pub fn open<P: AsRef<Path>>(path: P, policy: CheckpointPolicy) -> RecoveryResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self {
            conn: Mutex::new(Connection::open(path)?),
            policy,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory(policy: CheckpointPolicy) -> RecoveryResult<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            policy,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn init_schema(&self) -> RecoveryResult<()> {
        self.conn().execute_batch(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                state_hash TEXT NOT NULL,
                state_json TEXT NOT NULL,
                compliance_score REAL NOT NULL,
                status TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_checkpoints_status ON checkpoints(status);
            CREATE TABLE IF NOT EXISTS rollback_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                trigger TEXT NOT NULL,
                context_json TEXT NOT NULL,
                restored_checkpoint_id INTEGER NOT NULL,
                newest_checkpoint_id INTEGER NOT NULL
            );",
        )?;
        Ok(())
    }

    pub fn policy(&self) -> &CheckpointPolicy {
        &self.policy
    }

    /// Snapshot `state`, classify it by `compliance_score` and persist it
    pub fn create_checkpoint(
        &self,
        state: &SystemState,
        compliance_score: f64,
    ) -> RecoveryResult<Checkpoint> {
        let timestamp = Utc::now();
        let state_hash = state.state_hash();
        let status = self.policy.classify(compliance_score);
        let state_json = serde_json::to_string(state)?;

        let conn = self.conn();
        conn.execute(
            "INSERT INTO checkpoints (timestamp, state_hash, state_json, compliance_score, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
                state_hash,
                state_json,
                compliance_score,
                status.to_string(),
            ],
        )?;
        let id = conn.last_insert_rowid() as u64;

        tracing::info!(id, %status, compliance_score, "Checkpoint created");

        Ok(Checkpoint {
            id,
            timestamp,
            state_hash,
            state_snapshot: state.clone(),
            compliance_score,
            status,
        })
    }

    pub fn get(&self, id: u64) -> RecoveryResult<Option<Checkpoint>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                &format!("SELECT {} FROM checkpoints WHERE id = ?1", CHECKPOINT_COLUMNS),
                params![id as i64],
                read_checkpoint_row,
            )
            .optional()?;
        row.map(CheckpointRow::into_checkpoint).transpose()
    }

    /// SAFE checkpoint with the latest timestamp
    pub fn get_last_safe(&self) -> RecoveryResult<Option<Checkpoint>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM checkpoints WHERE status = ?1
                     ORDER BY timestamp DESC, id DESC LIMIT 1",
                    CHECKPOINT_COLUMNS
                ),
                params![CheckpointStatus::Safe.to_string()],
                read_checkpoint_row,
            )
            .optional()?;
        row.map(CheckpointRow::into_checkpoint).transpose()
    }

    /// Most recently created checkpoint of any status
    pub fn latest(&self) -> RecoveryResult<Option<Checkpoint>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM checkpoints ORDER BY id DESC LIMIT 1",
                    CHECKPOINT_COLUMNS
                ),
                [],
                read_checkpoint_row,
            )
            .optional()?;
        row.map(CheckpointRow::into_checkpoint).transpose()
    }

    /// Checkpoint whose snapshot is the current state after a restart
    ///
    /// That is the newest checkpoint, unless a rollback was recorded after it
    /// was created, in which case it is the checkpoint the rollback restored.
    pub fn resume_point(&self) -> RecoveryResult<Option<Checkpoint>> {
        let last_rollback: Option<(i64, i64)> = self
            .conn()
            .query_row(
                "SELECT restored_checkpoint_id, newest_checkpoint_id
                 FROM rollback_events ORDER BY id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let latest = self.latest()?;
        let superseded_by = match (last_rollback, &latest) {
            (Some((restored, newest)), Some(checkpoint)) if checkpoint.id <= newest as u64 => {
                Some(restored as u64)
            }
            _ => None,
        };
        let Some(restored_id) = superseded_by else {
            return Ok(latest);
        };

        match self.get(restored_id)? {
            Some(restored) => Ok(Some(restored)),
            None => {
                tracing::warn!(id = restored_id, "Restored checkpoint missing, using latest");
                Ok(latest)
            }
        }
    }

    /// All checkpoints, oldest first
    pub fn list(&self) -> RecoveryResult<Vec<Checkpoint>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM checkpoints ORDER BY id ASC",
            CHECKPOINT_COLUMNS
        ))?;
        let rows = stmt
            .query_map([], read_checkpoint_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(CheckpointRow::into_checkpoint).collect()
    }

    pub fn count(&self) -> RecoveryResult<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM checkpoints", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Once over `max_checkpoints`, drop everything that is neither SAFE nor
    /// among the `keep_recent` newest. Returns the number removed.
    pub fn prune(&self) -> RecoveryResult<usize> {
        if self.count()? <= self.policy.max_checkpoints {
            return Ok(0);
        }

        let removed = self.conn().execute(
            "DELETE FROM checkpoints
             WHERE status != ?1
               AND id NOT IN (SELECT id FROM checkpoints ORDER BY id DESC LIMIT ?2)",
            params![
                CheckpointStatus::Safe.to_string(),
                self.policy.keep_recent as i64
            ],
        )?;

        if removed > 0 {
            tracing::info!(removed, "Checkpoints pruned");
        }
        Ok(removed)
    }

    pub fn stats(&self) -> RecoveryResult<CheckpointStats> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM checkpoints GROUP BY status")?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stats = CheckpointStats::default();
        for (status, count) in counts {
            let count = count as usize;
            stats.total += count;
            match CheckpointStatus::from_str(&status) {
                Ok(CheckpointStatus::Safe) => stats.safe += count,
                Ok(CheckpointStatus::Unsafe) => stats.unsafe_count += count,
                Ok(CheckpointStatus::Unknown) | Err(_) => stats.unknown += count,
            }
        }
        Ok(stats)
    }

    /// Ids of checkpoints whose snapshot no longer matches the recorded hash
    pub fn verify_all(&self) -> RecoveryResult<Vec<u64>> {
        let tampered: Vec<u64> = self
            .list()?
            .into_iter()
            .filter(|c| !c.verify())
            .map(|c| c.id)
            .collect();

        for id in &tampered {
            tracing::error!(id, "Checkpoint failed integrity check");
        }
        Ok(tampered)
    }

    /// Persist a rollback and return its row id
    ///
    /// The id of the newest checkpoint at this moment is stored with it, so
    /// a restart can tell whether the rollback supersedes that checkpoint.
    pub fn record_rollback(&self, event: &RollbackEvent) -> RecoveryResult<u64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO rollback_events
                 (timestamp, trigger, context_json, restored_checkpoint_id, newest_checkpoint_id)
             VALUES (?1, ?2, ?3, ?4, (SELECT COALESCE(MAX(id), 0) FROM checkpoints))",
            params![
                event.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
                event.trigger.to_string(),
                serde_json::to_string(&event.context)?,
                event.restored_checkpoint_id as i64,
            ],
        )?;
        Ok(conn.last_insert_rowid() as u64)
    }

    /// Drop a rollback row that could not be audited
    pub fn remove_rollback(&self, id: u64) -> RecoveryResult<()> {
        self.conn()
            .execute("DELETE FROM rollback_events WHERE id = ?1", params![id as i64])?;
        Ok(())
    }

    /// Rollback history, oldest first
    pub fn rollback_events(&self) -> RecoveryResult<Vec<RollbackEvent>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT timestamp, trigger, context_json, restored_checkpoint_id
             FROM rollback_events ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(timestamp, trigger, context_json, restored)| {
                Ok(RollbackEvent {
                    timestamp: parse_timestamp(&timestamp)?,
                    trigger: RollbackTrigger::from_str(&trigger)
                        .map_err(|_| RecoveryError::Corrupt(format!("trigger '{}'", trigger)))?,
                    context: serde_json::from_str(&context_json)?,
                    restored_checkpoint_id: restored as u64,
                })
            })
            .collect()
    }
}

struct CheckpointRow {
    id: i64,
    timestamp: String,
    state_hash: String,
    state_json: String,
    compliance_score: f64,
    status: String,
}

fn read_checkpoint_row(row: &Row<'_>) -> rusqlite::Result<CheckpointRow> {
    Ok(CheckpointRow {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        state_hash: row.get(2)?,
        state_json: row.get(3)?,
        compliance_score: row.get(4)?,
        status: row.get(5)?,
    })
}

impl CheckpointRow {
    fn into_checkpoint(self) -> RecoveryResult<Checkpoint> {
        let status = CheckpointStatus::from_str(&self.status)
            .map_err(|_| RecoveryError::Corrupt(format!("status '{}'", self.status)))?;
        Ok(Checkpoint {
            id: self.id as u64,
            timestamp: parse_timestamp(&self.timestamp)?,
            state_hash: self.state_hash,
            state_snapshot: serde_json::from_str(&self.state_json)?,
            compliance_score: self.compliance_score,
            status,
        })
    }
}

fn parse_timestamp(value: &str) -> RecoveryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| RecoveryError::Corrupt(format!("timestamp '{}'", value)))
}
