//! Repository contract (§4.21/§"Repository Contract" row): CRUD plus
//! vector-index queries over the graph store. Only the contract is
//! specified here; the property-graph store itself is an external
//! collaborator. `InMemoryRepository` is a reference implementation used
//! by tests and by any caller that doesn't need real persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

use super::models::*;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("duplicate: {0}")]
    Duplicate(String),
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// CRUD plus vector-index queries over the property graph. Session
/// semantics (thread safety) are the implementation's responsibility;
/// per §5 the engine's per-run lock — not the repository — serializes
/// writes to the same entity.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_paper_by_doi(&self, doi: &str) -> Result<Option<Paper>, RepositoryError>;
    async fn upsert_paper(&self, paper: Paper) -> Result<(), RepositoryError>;

    async fn get_author(&self, id: AuthorId) -> Result<Option<Author>, RepositoryError>;
    async fn find_author_by_orcid(&self, orcid: &str) -> Result<Option<Author>, RepositoryError>;
    async fn find_author_by_name(&self, normalized_name: &str) -> Result<Option<Author>, RepositoryError>;
    async fn upsert_author(&self, author: Author) -> Result<(), RepositoryError>;

    async fn put_relation(&self, relation: Relation) -> Result<(), RepositoryError>;

    async fn get_problem(&self, id: ProblemId) -> Result<Option<Problem>, RepositoryError>;
    async fn put_problem(&self, problem: Problem) -> Result<(), RepositoryError>;
    async fn list_problems(
        &self,
        status: Option<ProblemStatus>,
        domain: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Problem>, RepositoryError>;

    async fn put_mention(&self, mention: ProblemMention) -> Result<(), RepositoryError>;
    async fn get_mention(&self, id: MentionId) -> Result<Option<ProblemMention>, RepositoryError>;

    async fn get_concept(&self, id: ConceptId) -> Result<Option<ProblemConcept>, RepositoryError>;
    async fn put_concept(&self, concept: ProblemConcept) -> Result<(), RepositoryError>;

    /// Vector-index query: top-k most similar concepts by cosine
    /// similarity to `embedding`.
    async fn query_similar_concepts(
        &self,
        embedding: &Embedding,
        top_k: usize,
    ) -> Result<Vec<(ConceptId, f32)>, RepositoryError>;

    async fn put_pending_review(&self, review: PendingReview) -> Result<(), RepositoryError>;
    async fn get_pending_review(&self, id: ReviewId) -> Result<Option<PendingReview>, RepositoryError>;
    async fn list_pending_reviews(
        &self,
        status_resolved: Option<bool>,
        priority: Option<ReviewPriority>,
    ) -> Result<Vec<PendingReview>, RepositoryError>;

    /// Returns true if `citing_doi` cites `cited_doi` transitively via
    /// exactly one hop (used by the concept matcher's citation boost).
    async fn cites_one_hop(&self, citing_doi: &str, cited_doi: &str) -> Result<bool, RepositoryError>;

    /// All mention IDs already linked (INSTANCE_OF) to `concept`.
    async fn mentions_of_concept(&self, concept: ConceptId) -> Result<Vec<MentionId>, RepositoryError>;
}

#[derive(Default)]
struct Store {
    papers_by_doi: HashMap<String, Paper>,
    authors: HashMap<AuthorId, Author>,
    problems: HashMap<ProblemId, Problem>,
    mentions: HashMap<MentionId, ProblemMention>,
    concepts: HashMap<ConceptId, ProblemConcept>,
    reviews: HashMap<ReviewId, PendingReview>,
    relations: Vec<Relation>,
}

/// A plain in-memory reference implementation of [`Repository`], backed
/// by a single `parking_lot::RwLock` over a plain struct of maps — no
/// session pooling, no persistence. Suitable for tests and for the
/// `InMemoryWorkflowStore`-style default wiring.
#[derive(Default)]
pub struct InMemoryRepository {
    store: RwLock<Store>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_paper_by_doi(&self, doi: &str) -> Result<Option<Paper>, RepositoryError> {
        Ok(self.store.read().papers_by_doi.get(doi).cloned())
    }

    async fn upsert_paper(&self, paper: Paper) -> Result<(), RepositoryError> {
        let mut store = self.store.write();
        if let Some(doi) = paper.doi.clone() {
            store.papers_by_doi.insert(doi, paper);
        } else {
            return Err(RepositoryError::InvariantViolation(
                "paper has no DOI; callers must assign a surrogate key before upsert".into(),
            ));
        }
        Ok(())
    }

    async fn get_author(&self, id: AuthorId) -> Result<Option<Author>, RepositoryError> {
        Ok(self.store.read().authors.get(&id).cloned())
    }

    async fn find_author_by_orcid(&self, orcid: &str) -> Result<Option<Author>, RepositoryError> {
        Ok(self
            .store
            .read()
            .authors
            .values()
            .find(|a| a.orcid.as_deref() == Some(orcid))
            .cloned())
    }

    async fn find_author_by_name(&self, normalized_name: &str) -> Result<Option<Author>, RepositoryError> {
        Ok(self
            .store
            .read()
            .authors
            .values()
            .find(|a| normalize_name(&a.name) == normalized_name)
            .cloned())
    }

    async fn upsert_author(&self, author: Author) -> Result<(), RepositoryError> {
        self.store.write().authors.insert(author.id, author);
        Ok(())
    }

    async fn put_relation(&self, relation: Relation) -> Result<(), RepositoryError> {
        let mut store = self.store.write();
        if let Relation::InstanceOf { concept, .. } = &relation {
            if let Some(c) = store.concepts.get_mut(concept) {
                c.mention_count += 1;
            }
        }
        store.relations.push(relation);
        Ok(())
    }

    async fn get_problem(&self, id: ProblemId) -> Result<Option<Problem>, RepositoryError> {
        Ok(self.store.read().problems.get(&id).cloned())
    }

    async fn put_problem(&self, problem: Problem) -> Result<(), RepositoryError> {
        self.store.write().problems.insert(problem.id, problem);
        Ok(())
    }

    async fn list_problems(
        &self,
        status: Option<ProblemStatus>,
        domain: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Problem>, RepositoryError> {
        let store = self.store.read();
        let mut results: Vec<Problem> = store
            .problems
            .values()
            .filter(|p| status.map(|s| p.status == s).unwrap_or(true))
            .filter(|p| domain.map(|d| p.domain == d).unwrap_or(true))
            .cloned()
            .collect();
        results.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        results.truncate(limit);
        Ok(results)
    }

    async fn put_mention(&self, mention: ProblemMention) -> Result<(), RepositoryError> {
        self.store.write().mentions.insert(mention.id, mention);
        Ok(())
    }

    async fn get_mention(&self, id: MentionId) -> Result<Option<ProblemMention>, RepositoryError> {
        Ok(self.store.read().mentions.get(&id).cloned())
    }

    async fn get_concept(&self, id: ConceptId) -> Result<Option<ProblemConcept>, RepositoryError> {
        Ok(self.store.read().concepts.get(&id).cloned())
    }

    async fn put_concept(&self, concept: ProblemConcept) -> Result<(), RepositoryError> {
        self.store.write().concepts.insert(concept.id, concept);
        Ok(())
    }

    async fn query_similar_concepts(
        &self,
        embedding: &Embedding,
        top_k: usize,
    ) -> Result<Vec<(ConceptId, f32)>, RepositoryError> {
        let store = self.store.read();
        let mut scored: Vec<(ConceptId, f32)> = store
            .concepts
            .values()
            .map(|c| (c.id, embedding.cosine_similarity(&c.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn put_pending_review(&self, review: PendingReview) -> Result<(), RepositoryError> {
        self.store.write().reviews.insert(review.id, review);
        Ok(())
    }

    async fn get_pending_review(&self, id: ReviewId) -> Result<Option<PendingReview>, RepositoryError> {
        Ok(self.store.read().reviews.get(&id).cloned())
    }

    async fn list_pending_reviews(
        &self,
        status_resolved: Option<bool>,
        priority: Option<ReviewPriority>,
    ) -> Result<Vec<PendingReview>, RepositoryError> {
        let store = self.store.read();
        Ok(store
            .reviews
            .values()
            .filter(|r| {
                status_resolved
                    .map(|want_resolved| r.resolution.is_some() == want_resolved)
                    .unwrap_or(true)
            })
            .filter(|r| priority.map(|p| r.priority == p).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn cites_one_hop(&self, citing_doi: &str, cited_doi: &str) -> Result<bool, RepositoryError> {
        let store = self.store.read();
        Ok(store.relations.iter().any(|r| {
            matches!(
                r,
                Relation::Cites { citing_doi: c, cited_doi: d }
                    if c == citing_doi && d == cited_doi
            )
        }))
    }

    async fn mentions_of_concept(&self, concept: ConceptId) -> Result<Vec<MentionId>, RepositoryError> {
        let store = self.store.read();
        Ok(store
            .relations
            .iter()
            .filter_map(|r| match r {
                Relation::InstanceOf { mention, concept: c } if *c == concept => Some(*mention),
                _ => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_paper(doi: &str) -> Paper {
        Paper {
            doi: Some(doi.to_string()),
            title: "A Paper".into(),
            abstract_text: None,
            authors: vec![],
            raw_author_names: vec![],
            year: Some(2024),
            venue: None,
            arxiv_id: None,
            openalex_id: None,
            s2_id: None,
            pdf_url: None,
            is_open_access: false,
            citation_count: 0,
            fields_of_study: vec![],
            source: PaperSource::Manual,
            retrieved_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let repo = InMemoryRepository::new();
        repo.upsert_paper(sample_paper("10.1/x")).await.unwrap();
        let found = repo.get_paper_by_doi("10.1/x").await.unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().title, "A Paper");
    }

    #[tokio::test]
    async fn put_relation_increments_concept_mention_count() {
        let repo = InMemoryRepository::new();
        let concept_id = ConceptId::new();
        repo.put_concept(ProblemConcept {
            id: concept_id,
            canonical_statement: "stmt".into(),
            domain: "ml".into(),
            embedding: Embedding::new(vec![0.1; EMBEDDING_DIM]).unwrap(),
            mention_count: 0,
            status: ConceptStatus::Active,
        })
        .await
        .unwrap();

        repo.put_relation(Relation::InstanceOf {
            mention: MentionId::new(),
            concept: concept_id,
        })
        .await
        .unwrap();

        let concept = repo.get_concept(concept_id).await.unwrap().unwrap();
        assert_eq!(concept.mention_count, 1);
    }
}
