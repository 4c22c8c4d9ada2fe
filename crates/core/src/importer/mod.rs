//! Paper/Author upsert into the graph (§4.9).

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;

use crate::acquisition::normalizer::merge;
use crate::graph::models::{Author, AuthorId, AuthorRef, Paper};
use crate::graph::repository::{Repository, RepositoryError};

#[derive(Debug, Error)]
pub enum ImporterError {
    #[error("paper has neither DOI nor any alternate identifier")]
    NoIdentifier,
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Aggregate outcome of a batch import, per §4.9.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<(String, String)>,
}

/// Whether re-ingesting a paper that already exists should merge the
/// incoming record into the stored one.
#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    pub update_existing: bool,
    pub max_concurrency: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self { update_existing: false, max_concurrency: 8 }
    }
}

#[derive(Clone)]
pub struct Importer {
    repository: Arc<dyn Repository>,
}

impl Importer {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    /// Resolve or create the `Author` node for `name`, matched on ORCID
    /// first, then normalized name, per §4.9.
    async fn resolve_author(&self, name: &str, orcid: Option<&str>) -> Result<AuthorId, ImporterError> {
        if let Some(orcid) = orcid {
            if let Some(existing) = self.repository.find_author_by_orcid(orcid).await? {
                return Ok(existing.id);
            }
        }
        let normalized = name.trim().to_lowercase();
        if let Some(existing) = self.repository.find_author_by_name(&normalized).await? {
            return Ok(existing.id);
        }
        let author = Author {
            id: AuthorId::new(),
            name: name.to_string(),
            orcid: orcid.map(str::to_string),
            affiliations: Vec::new(),
        };
        self.repository.upsert_author(author.clone()).await?;
        Ok(author.id)
    }

    /// Import a single paper: find existing by DOI, create if absent,
    /// or merge-and-version-bump if present and `update_existing`.
    /// Returns `true` if a new paper was created, `false` if an
    /// existing one was updated or left untouched.
    pub async fn import_paper(
        &self,
        mut paper: Paper,
        options: ImportOptions,
    ) -> Result<bool, ImporterError> {
        let doi = paper.doi.clone().ok_or(ImporterError::NoIdentifier)?;

        let mut resolved_authors: Vec<AuthorRef> = Vec::with_capacity(paper.raw_author_names.len());
        for (position, name) in paper.raw_author_names.iter().enumerate() {
            let author_id = self.resolve_author(name, None).await?;
            resolved_authors.push(AuthorRef { author_id, position: position as u32 });
        }
        for author_ref in &resolved_authors {
            self.repository
                .put_relation(crate::graph::models::Relation::AuthoredBy {
                    paper_doi: doi.clone(),
                    author: author_ref.author_id,
                    position: author_ref.position,
                })
                .await?;
        }
        paper.authors = resolved_authors;
        paper.raw_author_names = Vec::new();

        match self.repository.get_paper_by_doi(&doi).await? {
            Some(existing) if options.update_existing => {
                let merged = merge(existing, paper);
                self.repository.upsert_paper(merged).await?;
                Ok(false)
            }
            Some(_) => Ok(false),
            None => {
                self.repository.upsert_paper(paper).await?;
                Ok(true)
            }
        }
    }

    /// Import many papers with bounded concurrency via a semaphore gate,
    /// invoking `on_progress` after each paper completes (success or
    /// failure).
    pub async fn import_batch<F>(
        &self,
        papers: Vec<Paper>,
        options: ImportOptions,
        on_progress: F,
    ) -> BatchResult
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(options.max_concurrency.max(1)));
        let total = papers.len();
        let on_progress = Arc::new(on_progress);
        let mut tasks = tokio::task::JoinSet::new();

        for paper in papers {
            let semaphore = semaphore.clone();
            let importer = self.clone();
            let identifier_label = paper.doi.clone().unwrap_or_else(|| "<no-doi>".to_string());
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                let result = importer.import_paper(paper, options).await;
                (identifier_label, result)
            });
        }

        let mut result = BatchResult { total, ..Default::default() };
        let mut completed = 0usize;
        while let Some(joined) = tasks.join_next().await {
            completed += 1;
            on_progress(completed, total);
            match joined {
                Ok((_, Ok(true))) => result.created += 1,
                Ok((_, Ok(false))) => result.updated += 1,
                Ok((id, Err(ImporterError::NoIdentifier))) => {
                    result.skipped += 1;
                    result.errors.push((id, "no identifier".to_string()));
                }
                Ok((id, Err(err))) => {
                    result.failed += 1;
                    result.errors.push((id, err.to_string()));
                }
                Err(join_err) => {
                    result.failed += 1;
                    result.errors.push(("<unknown>".to_string(), join_err.to_string()));
                }
            }
        }
        result
    }
}
