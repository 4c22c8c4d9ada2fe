//! Durable store for workflow run records (§4.18 "durable across
//! process restart"), grounded directly on the teacher's
//! `scheduler::job_store::{JobStore, SqliteJobStore}`: trait-first,
//! `open`/`open_in_memory` constructors, `init_schema`, WAL pragma.

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use super::state::{RunId, RunRecord};

#[derive(Debug, Error)]
pub enum WorkflowStoreError {
    #[error("run not found: {0}")]
    NotFound(RunId),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn save(&self, record: &RunRecord) -> Result<(), WorkflowStoreError>;
    async fn get(&self, run_id: RunId) -> Result<Option<RunRecord>, WorkflowStoreError>;
    async fn list(&self) -> Result<Vec<RunRecord>, WorkflowStoreError>;
    async fn delete(&self, run_id: RunId) -> Result<bool, WorkflowStoreError>;
}

/// In-memory reference store, the default wiring used by tests and any
/// caller not requiring persistence across restarts.
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    runs: DashMap<RunId, RunRecord>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn save(&self, record: &RunRecord) -> Result<(), WorkflowStoreError> {
        self.runs.insert(record.run_id, record.clone());
        Ok(())
    }

    async fn get(&self, run_id: RunId) -> Result<Option<RunRecord>, WorkflowStoreError> {
        Ok(self.runs.get(&run_id).map(|r| r.clone()))
    }

    async fn list(&self) -> Result<Vec<RunRecord>, WorkflowStoreError> {
        Ok(self.runs.iter().map(|r| r.clone()).collect())
    }

    async fn delete(&self, run_id: RunId) -> Result<bool, WorkflowStoreError> {
        Ok(self.runs.remove(&run_id).is_some())
    }
}

#[cfg(feature = "sqlite-store")]
pub use sqlite::SqliteWorkflowStore;

#[cfg(feature = "sqlite-store")]
mod sqlite {
    use super::*;
    use crate::agents::WorkflowState;
    use crate::workflow::state::RunStatus;
    use chrono::{DateTime, Utc};

    /// SQLite-backed persistent store for workflow runs, one row per
    /// run with the agent state serialized as a JSON blob.
    pub struct SqliteWorkflowStore {
        conn: tokio::sync::Mutex<rusqlite::Connection>,
    }

    impl SqliteWorkflowStore {
        pub fn open(path: &std::path::Path) -> Result<Self, WorkflowStoreError> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| WorkflowStoreError::Backend(format!("create dir: {e}")))?;
            }
            let conn = rusqlite::Connection::open(path).map_err(|e| WorkflowStoreError::Backend(e.to_string()))?;
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(|e| WorkflowStoreError::Backend(e.to_string()))?;
            Self::init_schema(&conn)?;
            Ok(Self { conn: tokio::sync::Mutex::new(conn) })
        }

        pub fn open_in_memory() -> Result<Self, WorkflowStoreError> {
            let conn = rusqlite::Connection::open_in_memory().map_err(|e| WorkflowStoreError::Backend(e.to_string()))?;
            Self::init_schema(&conn)?;
            Ok(Self { conn: tokio::sync::Mutex::new(conn) })
        }

        fn init_schema(conn: &rusqlite::Connection) -> Result<(), WorkflowStoreError> {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);
                 INSERT OR IGNORE INTO schema_version (version) VALUES (1);

                 CREATE TABLE IF NOT EXISTS workflow_runs (
                     run_id              TEXT PRIMARY KEY,
                     status              TEXT NOT NULL,
                     pending_checkpoint  TEXT,
                     state_json          TEXT NOT NULL,
                     errors_json         TEXT NOT NULL DEFAULT '[]',
                     created_at          TEXT NOT NULL,
                     updated_at          TEXT NOT NULL
                 );

                 CREATE INDEX IF NOT EXISTS idx_workflow_runs_status ON workflow_runs(status);",
            )
            .map_err(|e| WorkflowStoreError::Backend(e.to_string()))?;
            Ok(())
        }
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<RunRecord, WorkflowStoreError>> {
        let run_id_str: String = row.get(0)?;
        let status_str: String = row.get(1)?;
        let checkpoint_str: Option<String> = row.get(2)?;
        let state_json: String = row.get(3)?;
        let errors_json: String = row.get(4)?;
        let created_str: String = row.get(5)?;
        let updated_str: String = row.get(6)?;

        Ok((|| -> Result<RunRecord, WorkflowStoreError> {
            let run_id: RunId = run_id_str.parse().map_err(|e: uuid::Error| WorkflowStoreError::Serialization(e.to_string()))?;
            let status: RunStatus = serde_json::from_str(&status_str).map_err(|e| WorkflowStoreError::Serialization(e.to_string()))?;
            let pending_checkpoint = checkpoint_str
                .map(|s| serde_json::from_str(&s))
                .transpose()
                .map_err(|e| WorkflowStoreError::Serialization(e.to_string()))?;
            let state: WorkflowState = serde_json::from_str(&state_json).map_err(|e| WorkflowStoreError::Serialization(e.to_string()))?;
            let errors: Vec<String> = serde_json::from_str(&errors_json).map_err(|e| WorkflowStoreError::Serialization(e.to_string()))?;
            let created_at = DateTime::parse_from_rfc3339(&created_str)
                .map_err(|e| WorkflowStoreError::Serialization(e.to_string()))?
                .with_timezone(&Utc);
            let updated_at = DateTime::parse_from_rfc3339(&updated_str)
                .map_err(|e| WorkflowStoreError::Serialization(e.to_string()))?
                .with_timezone(&Utc);

            Ok(RunRecord { run_id, status, pending_checkpoint, state, errors, created_at, updated_at })
        })())
    }

    #[async_trait]
    impl WorkflowStore for SqliteWorkflowStore {
        async fn save(&self, record: &RunRecord) -> Result<(), WorkflowStoreError> {
            let status_str = serde_json::to_string(&record.status).map_err(|e| WorkflowStoreError::Serialization(e.to_string()))?;
            let checkpoint_str = record
                .pending_checkpoint
                .map(|c| serde_json::to_string(&c))
                .transpose()
                .map_err(|e| WorkflowStoreError::Serialization(e.to_string()))?;
            let state_json = serde_json::to_string(&record.state).map_err(|e| WorkflowStoreError::Serialization(e.to_string()))?;
            let errors_json = serde_json::to_string(&record.errors).map_err(|e| WorkflowStoreError::Serialization(e.to_string()))?;

            let conn = self.conn.lock().await;
            conn.execute(
                "INSERT OR REPLACE INTO workflow_runs
                    (run_id, status, pending_checkpoint, state_json, errors_json, created_at, updated_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7)",
                rusqlite::params![
                    record.run_id.to_string(),
                    status_str,
                    checkpoint_str,
                    state_json,
                    errors_json,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| WorkflowStoreError::Backend(e.to_string()))?;
            Ok(())
        }

        async fn get(&self, run_id: RunId) -> Result<Option<RunRecord>, WorkflowStoreError> {
            let conn = self.conn.lock().await;
            let mut stmt = conn
                .prepare(
                    "SELECT run_id, status, pending_checkpoint, state_json, errors_json, created_at, updated_at
                     FROM workflow_runs WHERE run_id = ?1",
                )
                .map_err(|e| WorkflowStoreError::Backend(e.to_string()))?;

            let result = stmt.query_row(rusqlite::params![run_id.to_string()], row_to_record);
            match result {
                Ok(Ok(record)) => Ok(Some(record)),
                Ok(Err(e)) => Err(e),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(WorkflowStoreError::Backend(e.to_string())),
            }
        }

        async fn list(&self) -> Result<Vec<RunRecord>, WorkflowStoreError> {
            let conn = self.conn.lock().await;
            let mut stmt = conn
                .prepare(
                    "SELECT run_id, status, pending_checkpoint, state_json, errors_json, created_at, updated_at
                     FROM workflow_runs ORDER BY created_at",
                )
                .map_err(|e| WorkflowStoreError::Backend(e.to_string()))?;
            let rows = stmt.query_map([], row_to_record).map_err(|e| WorkflowStoreError::Backend(e.to_string()))?;
            let mut records = Vec::new();
            for row in rows {
                let inner = row.map_err(|e| WorkflowStoreError::Backend(e.to_string()))?;
                records.push(inner?);
            }
            Ok(records)
        }

        async fn delete(&self, run_id: RunId) -> Result<bool, WorkflowStoreError> {
            let conn = self.conn.lock().await;
            let rows = conn
                .execute("DELETE FROM workflow_runs WHERE run_id = ?1", rusqlite::params![run_id.to_string()])
                .map_err(|e| WorkflowStoreError::Backend(e.to_string()))?;
            Ok(rows > 0)
        }
    }
}
