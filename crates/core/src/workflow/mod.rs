//! The research workflow engine: a 7-node DAG with three interrupt-before
//! human checkpoints and durable per-run state (§4.18).

pub mod checkpoint;
pub mod engine;
pub mod state;
pub mod store;

use thiserror::Error;

use crate::agents::AgentError;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("run not found: {0}")]
    RunNotFound(state::RunId),
    #[error("run {0} is not paused at a checkpoint")]
    NotAtCheckpoint(state::RunId),
    #[error("checkpoint mismatch: run is paused at {expected:?}, got {actual:?}")]
    CheckpointMismatch { expected: checkpoint::CheckpointType, actual: checkpoint::CheckpointType },
    #[error("edit decision requires edited_data")]
    MissingEditedData,
    #[error("invalid edit: {0}")]
    InvalidEdit(String),
    #[error("run {0} was cancelled")]
    Cancelled(state::RunId),
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),
    #[error("store error: {0}")]
    Store(#[from] store::WorkflowStoreError),
}
