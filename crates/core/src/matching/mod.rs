//! Concept matching: similarity tiering, the classify/consensus state
//! machine, and the human review queue (§4.14–§4.16).

pub mod concept_matcher;
pub mod review_queue;
pub mod workflow;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatchingError {
    #[error("repository error: {0}")]
    Repository(#[from] crate::graph::repository::RepositoryError),
    #[error("llm call failed: {0}")]
    Llm(String),
}
