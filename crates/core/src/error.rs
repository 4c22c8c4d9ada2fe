//! Crate-wide error taxonomy.
//!
//! Individual modules define their own `thiserror` error enums; this type
//! aggregates them at the facade boundary the way `runtime/src/lib.rs`'s
//! `RuntimeError` aggregates `SchedulerError`/`ResourceError`/... from each
//! subsystem.

use thiserror::Error;

use crate::acquisition::AcquisitionError;
use crate::extraction::ExtractionError;
use crate::graph::RepositoryError;
use crate::importer::ImporterError;
use crate::matching::MatchingError;
use crate::sandbox::SandboxError;
use crate::workflow::WorkflowError;

/// Top-level error taxonomy, matching the semantic categories in spec §7.
#[derive(Debug, Error)]
pub enum AgenticKgError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("rate limited, retry after {retry_after_ms:?}ms")]
    RateLimit { retry_after_ms: Option<u64> },

    #[error("transient error: {0}")]
    Transient(String),

    #[error("circuit open for {source}")]
    CircuitOpen { source: String },

    #[error("normalization failed: {0}")]
    Normalization(String),

    #[error("sandbox execution timed out")]
    SandboxTimeout,

    #[error("sandbox execution failed: {0}")]
    SandboxFailure(String),

    #[error("LLM call failed: {0}")]
    Llm(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Importer(#[from] ImporterError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Matching(#[from] MatchingError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl AgenticKgError {
    /// Whether the retry engine should consider this retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgenticKgError::RateLimit { .. }
                | AgenticKgError::Transient(_)
                | AgenticKgError::CircuitOpen { .. }
                | AgenticKgError::Llm(_)
        )
    }
}
