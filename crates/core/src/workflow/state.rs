//! Durable per-run state keyed by `RunId` (§4.18, §5, §8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agents::WorkflowState as AgentState;

use super::checkpoint::CheckpointType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    PausedAtCheckpoint,
    Completed,
    Failed,
    Cancelled,
}

/// Everything the engine persists at a node boundary: enough to resume
/// a run from cold storage after a process restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub status: RunStatus,
    pub pending_checkpoint: Option<CheckpointType>,
    pub state: AgentState,
    pub errors: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn new(run_id: RunId, state: AgentState) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            status: RunStatus::Running,
            pending_checkpoint: None,
            state,
            errors: vec![],
            created_at: now,
            updated_at: now,
        }
    }
}
