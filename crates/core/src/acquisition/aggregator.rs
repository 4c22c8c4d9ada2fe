//! Concurrent multi-source fetch, identifier-type dispatch, and dedupe
//! merge (§4.8).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;

use super::clients::SourceClient;
use super::models::Identifier;
use super::normalizer::merge;
use super::{AcquisitionError, Source};
use crate::graph::models::Paper;

/// Which source clients can serve a given identifier kind, per §4.8's
/// structural dispatch rules (DOI → all three; arXiv → S2 + arXiv).
fn eligible_sources(identifier: &Identifier) -> &'static [Source] {
    match identifier {
        Identifier::Doi(_) => &[Source::SemanticScholar, Source::Arxiv, Source::OpenAlex],
        Identifier::Arxiv(_) => &[Source::SemanticScholar, Source::Arxiv],
        Identifier::SemanticScholarId(_) => &[Source::SemanticScholar],
        Identifier::OpenAlexId(_) => &[Source::OpenAlex],
    }
}

/// Best-available identifier precedence used for dedup: DOI > arXiv >
/// S2 > OpenAlex.
fn dedup_key(paper: &Paper) -> Option<String> {
    paper
        .doi
        .clone()
        .map(|d| format!("doi:{d}"))
        .or_else(|| paper.arxiv_id.clone().map(|a| format!("arxiv:{a}")))
        .or_else(|| paper.s2_id.clone().map(|s| format!("s2:{s}")))
        .or_else(|| paper.openalex_id.clone().map(|o| format!("openalex:{o}")))
}

/// Fans a lookup or search request out across eligible source clients
/// concurrently, normalizes each raw record, and merges same-identity
/// results. A source error is logged and excluded from the result
/// unless every eligible source fails, in which case `AllSourcesFailed`
/// is returned.
pub struct Aggregator {
    clients: HashMap<Source, Arc<dyn SourceClient>>,
}

impl Aggregator {
    pub fn new(clients: HashMap<Source, Arc<dyn SourceClient>>) -> Self {
        Self { clients }
    }

    /// Fetch a single paper by identifier, merging results from every
    /// eligible source that succeeds.
    pub async fn fetch(&self, identifier: &Identifier) -> Result<Paper, AcquisitionError> {
        let sources = eligible_sources(identifier);
        let mut tasks: JoinSet<Result<Paper, AcquisitionError>> = JoinSet::new();

        for &source in sources {
            let Some(client) = self.clients.get(&source).cloned() else {
                continue;
            };
            let identifier = identifier.clone();
            tasks.spawn(async move { client.fetch(&identifier).await });
        }

        let mut merged: Option<Paper> = None;
        let mut any_success = false;
        let mut last_err: Option<AcquisitionError> = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(paper)) => {
                    any_success = true;
                    merged = Some(match merged.take() {
                        Some(existing) => merge(existing, paper),
                        None => paper,
                    });
                }
                Ok(Err(err)) => {
                    tracing::warn!("source fetch failed: {err}");
                    last_err = Some(err);
                }
                Err(join_err) => {
                    tracing::warn!("source fetch task panicked: {join_err}");
                }
            }
        }

        if !any_success {
            return Err(last_err.unwrap_or(AcquisitionError::AllSourcesFailed));
        }
        merged.ok_or(AcquisitionError::AllSourcesFailed)
    }

    /// Free-text search across all registered sources, de-duplicated by
    /// best-available identifier and returned as a ranked union
    /// (citation_count desc, ties broken by title).
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<Paper>, AcquisitionError> {
        let mut tasks: JoinSet<Result<Vec<Paper>, AcquisitionError>> = JoinSet::new();
        for client in self.clients.values().cloned() {
            let query = query.to_string();
            tasks.spawn(async move { client.search(&query, limit).await });
        }

        let mut any_success = false;
        let mut last_err: Option<AcquisitionError> = None;
        let mut by_key: HashMap<String, Paper> = HashMap::new();
        let mut unkeyed: Vec<Paper> = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(papers)) => {
                    any_success = true;
                    for paper in papers {
                        match dedup_key(&paper) {
                            Some(key) => {
                                by_key
                                    .entry(key)
                                    .and_modify(|existing| *existing = merge(existing.clone(), paper.clone()))
                                    .or_insert(paper);
                            }
                            None => unkeyed.push(paper),
                        }
                    }
                }
                Ok(Err(err)) => {
                    tracing::warn!("source search failed: {err}");
                    last_err = Some(err);
                }
                Err(join_err) => {
                    tracing::warn!("source search task panicked: {join_err}");
                }
            }
        }

        if !any_success {
            return Err(last_err.unwrap_or(AcquisitionError::AllSourcesFailed));
        }

        let mut results: Vec<Paper> = by_key.into_values().chain(unkeyed).collect();
        results.sort_by(|a, b| b.citation_count.cmp(&a.citation_count).then_with(|| a.title.cmp(&b.title)));
        results.truncate(limit);
        Ok(results)
    }
}
