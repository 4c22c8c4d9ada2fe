//! The four research agents (ranking, continuation, evaluation,
//! synthesis) and their shared contract (§4.17).
//!
//! All four are stateless: dependencies are injected via constructor
//! (LLM client, repository, sandbox, event bus) and every `run` call is
//! a pure function of its input `WorkflowState`, mirroring the
//! teacher's constructor-injected orchestrator components rather than
//! reaching into ambient globals.

pub mod continuation;
pub mod evaluation;
pub mod llm;
pub mod ranking;
pub mod synthesis;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::graph::models::{ProblemId, ProblemStatus};
use crate::graph::repository::RepositoryError;
use crate::sandbox::SandboxError;

pub use llm::*;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("llm call failed: {0}")]
    Llm(String),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),
    #[error("required workflow state missing: {0}")]
    MissingState(String),
}

/// The durable record threaded through all four agents and persisted by
/// the workflow engine at every node boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowState {
    pub run_id: Option<Uuid>,
    pub domain_filter: Option<String>,
    pub status_filter: Option<ProblemStatus>,
    pub candidate_limit: usize,
    pub ranked: Vec<RankedProblem>,
    pub selected_problem_id: Option<ProblemId>,
    pub proposal: Option<ContinuationProposal>,
    pub evaluation: Option<EvaluationOutcome>,
    pub synthesis: Option<SynthesisOutput>,
}

/// Shared contract for the four research agents.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn run(&self, state: WorkflowState) -> Result<WorkflowState, AgentError>;
}
