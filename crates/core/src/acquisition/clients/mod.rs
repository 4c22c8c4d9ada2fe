//! Per-source HTTP clients (§4.6).
//!
//! Each client composes, in order: circuit breaker check → rate limiter
//! acquire → cache lookup → HTTP call (wrapped in `retry::retry`) → cache
//! insert. None of those concerns live inside the client itself; they are
//! injected so the aggregator can share one breaker/limiter/cache per
//! source across concurrent requests.

pub mod arxiv;
pub mod openalex;
pub mod semantic_scholar;

use async_trait::async_trait;

use super::models::Identifier;
use super::AcquisitionError;
use crate::graph::models::Paper;

/// Common shape every source client implements, so the aggregator can
/// fan a lookup out across all three without knowing their internals.
#[async_trait]
pub trait SourceClient: Send + Sync {
    fn source(&self) -> super::Source;

    /// Fetch a single paper by identifier. `Unsupported` is returned if
    /// this source doesn't understand the given identifier kind.
    async fn fetch(&self, identifier: &Identifier) -> Result<Paper, AcquisitionError>;

    /// Free-text search, returning up to `limit` candidate papers.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Paper>, AcquisitionError>;
}
