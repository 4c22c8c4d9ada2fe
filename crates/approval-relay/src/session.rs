//! Pending decision sessions: one per workflow checkpoint or review
//! queue escalation awaiting a human's approve/reject/edit. Grounded on
//! the teacher's `ToolReviewOrchestrator` session map (typed id keys in
//! an `Arc<RwLock<HashMap<..>>>`), here a `DashMap` since sessions are
//! independent and need no cross-session lock.

use agentic_kg_core::graph::models::ReviewId;
use agentic_kg_core::workflow::checkpoint::{CheckpointType, Decision, DecisionKind};
use agentic_kg_core::workflow::state::RunId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::RelayError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SessionKind {
    WorkflowCheckpoint { run_id: RunId, checkpoint_type: CheckpointType },
    ReviewQueueEntry { review_id: ReviewId },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum RelayDecision {
    Approve,
    Reject { feedback: Option<String> },
    Edit { data: Value },
}

impl RelayDecision {
    /// Translate into the Workflow Engine's own `Decision` type, the
    /// shape a caller passes straight to `WorkflowEngine::resume`.
    pub fn into_workflow_decision(self) -> Decision {
        match self {
            RelayDecision::Approve => Decision { kind: DecisionKind::Approve, feedback: None, edited_data: None },
            RelayDecision::Reject { feedback } => Decision { kind: DecisionKind::Reject, feedback, edited_data: None },
            RelayDecision::Edit { data } => Decision { kind: DecisionKind::Edit, feedback: None, edited_data: Some(data) },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Decided,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalSession {
    pub id: Uuid,
    pub kind: SessionKind,
    pub status: SessionStatus,
    pub decision: Option<RelayDecision>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// In-process registry of outstanding approval sessions. Not itself
/// durable: a restart drops pending sessions the same way the workflow
/// engine's caller would need to re-announce a checkpoint on restart by
/// reading `WorkflowStore::list` for runs paused at a checkpoint.
#[derive(Default)]
pub struct SessionManager {
    sessions: DashMap<Uuid, ApprovalSession>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, kind: SessionKind) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions.insert(
            id,
            ApprovalSession { id, kind, status: SessionStatus::Pending, decision: None, created_at: Utc::now(), decided_at: None },
        );
        id
    }

    pub fn get(&self, id: Uuid) -> Option<ApprovalSession> {
        self.sessions.get(&id).map(|s| s.clone())
    }

    pub fn list_pending(&self) -> Vec<ApprovalSession> {
        self.sessions.iter().filter(|s| s.status == SessionStatus::Pending).map(|s| s.clone()).collect()
    }

    pub fn decide(&self, id: Uuid, decision: RelayDecision) -> Result<ApprovalSession, RelayError> {
        let mut entry = self.sessions.get_mut(&id).ok_or(RelayError::SessionNotFound(id))?;
        if entry.status == SessionStatus::Decided {
            return Err(RelayError::AlreadyDecided(id));
        }
        entry.decision = Some(decision);
        entry.status = SessionStatus::Decided;
        entry.decided_at = Some(Utc::now());
        Ok(entry.clone())
    }
}
