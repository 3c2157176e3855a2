//! SQLite-backed checkpoint store.
//!
//! Schema (one database file per run is preferred; a shared file keyed by
//! `run_id` is also supported — every statement here is scoped by
//! `run_id`):
//!
//! ```text
//! checkpoints(run_id, cycle, inference_count, state_json, created_at,
//!             PRIMARY KEY(run_id, cycle, inference_count))
//! executions(run_id, cycle, flow_index, started_at, completed_at,
//!            status, detail, error_text)
//! logs(run_id, cycle, flow_index, step, level, message, ts)
//! ```

use std::path::{Path, PathBuf};

use fs2::FileExt;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoreError};

/// One row of the `checkpoints` table.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointRow {
    pub run_id: String,
    pub cycle: i64,
    pub inference_count: i64,
    pub state_json: String,
    pub created_at: i64,
}

/// One row of the `executions` table — an execution log entry for a single
/// inference dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRow {
    pub run_id: String,
    pub cycle: i64,
    pub flow_index: String,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub status: String,
    pub detail: Option<String>,
    pub error_text: Option<String>,
}

/// One row of the `logs` table — a structured log line emitted by a
/// sequence handler step.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRow {
    pub run_id: String,
    pub cycle: i64,
    pub flow_index: String,
    pub step: String,
    pub level: String,
    pub message: String,
    pub ts: i64,
}

/// Handle to the checkpoint database. Holds an advisory file lock for the
/// lifetime of the handle so that two processes never interleave writes to
/// the same run.
pub struct CheckpointStore {
    conn: Connection,
    _lock_file: std::fs::File,
    path: PathBuf,
}

impl CheckpointStore {
    /// Open (creating if absent) the checkpoint database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(lock_path(&path))?;
        lock_file.try_lock_exclusive().map_err(|_| StoreError::LockFailed {
            path: path.display().to_string(),
        })?;

        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let store = Self {
            conn,
            _lock_file: lock_file,
            path,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open an in-memory store, used by tests that don't need cross-process
    /// locking.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let lock_file = tempfile_lock()?;
        let store = Self {
            conn,
            _lock_file: lock_file,
            path: PathBuf::from(":memory:"),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                run_id TEXT NOT NULL,
                cycle INTEGER NOT NULL,
                inference_count INTEGER NOT NULL,
                state_json TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (run_id, cycle, inference_count)
            );
            CREATE TABLE IF NOT EXISTS executions (
                run_id TEXT NOT NULL,
                cycle INTEGER NOT NULL,
                flow_index TEXT NOT NULL,
                started_at INTEGER NOT NULL,
                completed_at INTEGER,
                status TEXT NOT NULL,
                detail TEXT,
                error_text TEXT
            );
            CREATE INDEX IF NOT EXISTS executions_run_idx ON executions(run_id, cycle);
            CREATE TABLE IF NOT EXISTS logs (
                run_id TEXT NOT NULL,
                cycle INTEGER NOT NULL,
                flow_index TEXT NOT NULL,
                step TEXT NOT NULL,
                level TEXT NOT NULL,
                message TEXT NOT NULL,
                ts INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS logs_run_idx ON logs(run_id, cycle);",
        )?;
        Ok(())
    }

    /// Persist a checkpoint. `state_json` should already be canonicalized
    /// (see [`crate::canonical`]) by the caller so that equal states
    /// round-trip byte-identically.
    pub fn checkpoint(&self, run_id: &str, cycle: i64, inference_count: i64, state_json: &str, created_at: i64) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO checkpoints (run_id, cycle, inference_count, state_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run_id, cycle, inference_count, state_json, created_at],
        )?;
        Ok(())
    }

    /// Load the most recent checkpoint for `run_id` (highest `cycle`, then
    /// highest `inference_count`).
    pub fn load_latest(&self, run_id: &str) -> Result<CheckpointRow> {
        self.conn
            .query_row(
                "SELECT run_id, cycle, inference_count, state_json, created_at
                 FROM checkpoints WHERE run_id = ?1
                 ORDER BY cycle DESC, inference_count DESC LIMIT 1",
                params![run_id],
                row_to_checkpoint,
            )
            .optional()?
            .ok_or_else(|| StoreError::NoCheckpoint { run_id: run_id.to_string() })
    }

    /// Load the checkpoint at or immediately before the given cycle. A
    /// missing `inference_count` selects the latest checkpoint within that
    /// cycle.
    pub fn load_at(&self, run_id: &str, cycle: i64, inference_count: Option<i64>) -> Result<CheckpointRow> {
        let result = match inference_count {
            Some(count) => self
                .conn
                .query_row(
                    "SELECT run_id, cycle, inference_count, state_json, created_at
                     FROM checkpoints WHERE run_id = ?1 AND cycle = ?2 AND inference_count = ?3",
                    params![run_id, cycle, count],
                    row_to_checkpoint,
                )
                .optional()?,
            None => self
                .conn
                .query_row(
                    "SELECT run_id, cycle, inference_count, state_json, created_at
                     FROM checkpoints WHERE run_id = ?1 AND cycle <= ?2
                     ORDER BY cycle DESC, inference_count DESC LIMIT 1",
                    params![run_id, cycle],
                    row_to_checkpoint,
                )
                .optional()?,
        };
        result.ok_or_else(|| StoreError::CheckpointNotAt {
            run_id: run_id.to_string(),
            cycle,
            inference_count: inference_count.unwrap_or(-1),
        })
    }

    /// List every checkpoint recorded for `run_id`, oldest first.
    pub fn list_checkpoints(&self, run_id: &str) -> Result<Vec<CheckpointRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, cycle, inference_count, state_json, created_at
             FROM checkpoints WHERE run_id = ?1 ORDER BY cycle ASC, inference_count ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], row_to_checkpoint)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Copy every checkpoint/execution/log row for `source_run_id` into a
    /// new `new_run_id` slot, optionally truncated at `cycle`. Subsequent
    /// writes to either run_id diverge independently.
    pub fn fork(&self, source_run_id: &str, cycle: Option<i64>, new_run_id: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        match cycle {
            Some(c) => {
                tx.execute(
                    "INSERT INTO checkpoints (run_id, cycle, inference_count, state_json, created_at)
                     SELECT ?1, cycle, inference_count, state_json, created_at
                     FROM checkpoints WHERE run_id = ?2 AND cycle <= ?3",
                    params![new_run_id, source_run_id, c],
                )?;
                tx.execute(
                    "INSERT INTO executions (run_id, cycle, flow_index, started_at, completed_at, status, detail, error_text)
                     SELECT ?1, cycle, flow_index, started_at, completed_at, status, detail, error_text
                     FROM executions WHERE run_id = ?2 AND cycle <= ?3",
                    params![new_run_id, source_run_id, c],
                )?;
            }
            None => {
                tx.execute(
                    "INSERT INTO checkpoints (run_id, cycle, inference_count, state_json, created_at)
                     SELECT ?1, cycle, inference_count, state_json, created_at
                     FROM checkpoints WHERE run_id = ?2",
                    params![new_run_id, source_run_id],
                )?;
                tx.execute(
                    "INSERT INTO executions (run_id, cycle, flow_index, started_at, completed_at, status, detail, error_text)
                     SELECT ?1, cycle, flow_index, started_at, completed_at, status, detail, error_text
                     FROM executions WHERE run_id = ?2",
                    params![new_run_id, source_run_id],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Record an execution row.
    pub fn record_execution(&self, row: &ExecutionRow) -> Result<()> {
        self.conn.execute(
            "INSERT INTO executions (run_id, cycle, flow_index, started_at, completed_at, status, detail, error_text)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                row.run_id,
                row.cycle,
                row.flow_index,
                row.started_at,
                row.completed_at,
                row.status,
                row.detail,
                row.error_text,
            ],
        )?;
        Ok(())
    }

    /// List execution rows for a run, ordered by cycle then insertion order.
    pub fn list_executions(&self, run_id: &str) -> Result<Vec<ExecutionRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, cycle, flow_index, started_at, completed_at, status, detail, error_text
             FROM executions WHERE run_id = ?1 ORDER BY rowid ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(ExecutionRow {
                    run_id: row.get(0)?,
                    cycle: row.get(1)?,
                    flow_index: row.get(2)?,
                    started_at: row.get(3)?,
                    completed_at: row.get(4)?,
                    status: row.get(5)?,
                    detail: row.get(6)?,
                    error_text: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Append a log line.
    pub fn log(&self, row: &LogRow) -> Result<()> {
        self.conn.execute(
            "INSERT INTO logs (run_id, cycle, flow_index, step, level, message, ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![row.run_id, row.cycle, row.flow_index, row.step, row.level, row.message, row.ts],
        )?;
        Ok(())
    }
}

fn row_to_checkpoint(row: &rusqlite::Row) -> rusqlite::Result<CheckpointRow> {
    Ok(CheckpointRow {
        run_id: row.get(0)?,
        cycle: row.get(1)?,
        inference_count: row.get(2)?,
        state_json: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn lock_path(db_path: &Path) -> PathBuf {
    let mut s = db_path.as_os_str().to_owned();
    s.push(".lock");
    PathBuf::from(s)
}

fn tempfile_lock() -> Result<std::fs::File> {
    let path = std::env::temp_dir().join(format!("normcode-checkpoint-{}.lock", uuid::Uuid::new_v4()));
    Ok(std::fs::OpenOptions::new().create(true).write(true).open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_round_trips() {
        let store = CheckpointStore::open_in_memory().unwrap();
        store.checkpoint("run-1", 0, 3, r#"{"a":1}"#, 1000).unwrap();
        store.checkpoint("run-1", 1, 7, r#"{"a":2}"#, 2000).unwrap();

        let latest = store.load_latest("run-1").unwrap();
        assert_eq!(latest.cycle, 1);
        assert_eq!(latest.inference_count, 7);
        assert_eq!(latest.state_json, r#"{"a":2}"#);

        let at0 = store.load_at("run-1", 0, Some(3)).unwrap();
        assert_eq!(at0.state_json, r#"{"a":1}"#);
    }

    #[test]
    fn load_latest_missing_run_errors() {
        let store = CheckpointStore::open_in_memory().unwrap();
        let err = store.load_latest("nope").unwrap_err();
        assert!(matches!(err, StoreError::NoCheckpoint { .. }));
    }

    #[test]
    fn list_checkpoints_is_ordered() {
        let store = CheckpointStore::open_in_memory().unwrap();
        store.checkpoint("r", 2, 1, "{}", 1).unwrap();
        store.checkpoint("r", 0, 1, "{}", 1).unwrap();
        store.checkpoint("r", 1, 1, "{}", 1).unwrap();
        let cycles: Vec<i64> = store.list_checkpoints("r").unwrap().iter().map(|c| c.cycle).collect();
        assert_eq!(cycles, vec![0, 1, 2]);
    }

    #[test]
    fn fork_copies_up_to_cycle() {
        let store = CheckpointStore::open_in_memory().unwrap();
        store.checkpoint("r1", 0, 1, "{}", 1).unwrap();
        store.checkpoint("r1", 1, 2, "{}", 1).unwrap();
        store.checkpoint("r1", 2, 3, "{}", 1).unwrap();

        store.fork("r1", Some(1), "r2").unwrap();
        let forked = store.list_checkpoints("r2").unwrap();
        assert_eq!(forked.len(), 2);
        assert!(forked.iter().all(|c| c.cycle <= 1));

        // Diverge: write a new checkpoint to r2 only.
        store.checkpoint("r2", 2, 5, "{\"diverged\":true}", 9).unwrap();
        assert_eq!(store.list_checkpoints("r1").unwrap().len(), 3);
        assert_eq!(store.list_checkpoints("r2").unwrap().len(), 3);
        assert!(store.load_latest("r2").unwrap().state_json.contains("diverged"));
        assert!(!store.load_latest("r1").unwrap().state_json.contains("diverged"));
    }

    #[test]
    fn executions_and_logs_round_trip() {
        let store = CheckpointStore::open_in_memory().unwrap();
        store
            .record_execution(&ExecutionRow {
                run_id: "r".into(),
                cycle: 0,
                flow_index: "1.1".into(),
                started_at: 10,
                completed_at: Some(20),
                status: "complete".into(),
                detail: Some("success".into()),
                error_text: None,
            })
            .unwrap();
        let execs = store.list_executions("r").unwrap();
        assert_eq!(execs.len(), 1);
        assert_eq!(execs[0].flow_index, "1.1");

        store
            .log(&LogRow {
                run_id: "r".into(),
                cycle: 0,
                flow_index: "1.1".into(),
                step: "IR".into(),
                level: "debug".into(),
                message: "loaded references".into(),
                ts: 10,
            })
            .unwrap();
    }
}
