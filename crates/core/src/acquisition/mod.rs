//! Paper-acquisition layer: rate limiting, circuit breaking, retry,
//! caching, source clients, normalization, and aggregation.

pub mod aggregator;
pub mod cache;
pub mod circuit_breaker;
pub mod clients;
pub mod models;
pub mod normalizer;
pub mod pdf_cache;
pub mod rate_limiter;
pub mod retry;

use thiserror::Error;

/// Errors shared across the acquisition layer. Per spec §7, `not_found` is
/// distinct from an empty result set, and `normalization` failures are
/// fatal only for the source that produced them.
#[derive(Debug, Error, Clone)]
pub enum AcquisitionError {
    #[error("identifier not found: {0}")]
    NotFound(String),

    #[error("rate limited{}", .retry_after_ms.map(|m| format!(", retry after {m}ms")).unwrap_or_default())]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("transient transport error: {0}")]
    Transient(String),

    #[error("http status {0}")]
    HttpStatus(u16),

    #[error("circuit open for source {source}")]
    CircuitOpen { source: String },

    #[error("normalization failed: {0}")]
    Normalization(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("operation not supported by this source")]
    Unsupported,

    #[error("all sources failed for request")]
    AllSourcesFailed,
}

impl AcquisitionError {
    /// Classification used by the retry engine (§4.3, §8): only these
    /// outcomes are retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            AcquisitionError::RateLimited { .. } => true,
            AcquisitionError::Transient(_) => true,
            AcquisitionError::HttpStatus(code) => *code >= 500 || *code == 429,
            AcquisitionError::CircuitOpen { .. } => true,
            AcquisitionError::NotFound(_)
            | AcquisitionError::Normalization(_)
            | AcquisitionError::Validation(_)
            | AcquisitionError::Unsupported
            | AcquisitionError::AllSourcesFailed => false,
        }
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            AcquisitionError::RateLimited { retry_after_ms } => *retry_after_ms,
            _ => None,
        }
    }
}

/// The three bibliographic source identifiers this layer knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Source {
    SemanticScholar,
    Arxiv,
    OpenAlex,
    Cache,
    Manual,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Source::SemanticScholar => "s2",
            Source::Arxiv => "arxiv",
            Source::OpenAlex => "openalex",
            Source::Cache => "cache",
            Source::Manual => "manual",
        };
        write!(f, "{s}")
    }
}
