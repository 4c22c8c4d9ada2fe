//! Persistent, SLA-bound human review queue (§4.16).

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::graph::models::{
    ConceptId, ConceptStatus, EscalationReason, MatchCandidate, MentionId, PendingReview, ProblemConcept, Relation,
    ReviewId, ReviewPriority, ReviewResolution, ReviewResolutionKind,
};
use crate::graph::repository::Repository;

use super::concept_matcher::HIGH_IMPACT_DOMAINS;
use super::MatchingError;

#[derive(Debug, Clone, Copy)]
pub struct SlaConfig {
    pub high: StdDuration,
    pub normal: StdDuration,
    pub low: StdDuration,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            high: StdDuration::from_secs(4 * 3600),
            normal: StdDuration::from_secs(24 * 3600),
            low: StdDuration::from_secs(72 * 3600),
        }
    }
}

impl SlaConfig {
    fn deadline_for(&self, priority: ReviewPriority, now: DateTime<Utc>) -> DateTime<Utc> {
        let window = match priority {
            ReviewPriority::High => self.high,
            ReviewPriority::Normal => self.normal,
            ReviewPriority::Low => self.low,
        };
        now + Duration::seconds(window.as_secs() as i64)
    }
}

struct Claim {
    reviewer: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewQueueStatus {
    Open,
    Resolved,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Paging {
    pub offset: usize,
    pub limit: usize,
}

/// Checked-out-but-unresolved reviews past their claim ttl are made
/// available to `claim` again; this is enforced lazily (no background
/// reaper) by checking expiry whenever a claim is consulted.
pub struct ReviewQueue {
    repository: Arc<dyn Repository>,
    sla: SlaConfig,
    claims: DashMap<ReviewId, Claim>,
}

impl ReviewQueue {
    pub fn new(repository: Arc<dyn Repository>, sla: SlaConfig) -> Self {
        Self { repository, sla, claims: DashMap::new() }
    }

    /// Idempotent on `mention_id`: if a review already exists for this
    /// mention, its id is returned unchanged rather than duplicating it.
    pub async fn enqueue(
        &self,
        mention_id: MentionId,
        domain: &str,
        suggested_concepts: Vec<MatchCandidate>,
        mut priority: ReviewPriority,
        reason: EscalationReason,
        now: DateTime<Utc>,
    ) -> Result<ReviewId, MatchingError> {
        let existing = self.repository.list_pending_reviews(None, None).await?;
        if let Some(found) = existing.iter().find(|r| r.mention_ref == mention_id) {
            return Ok(found.id);
        }

        if HIGH_IMPACT_DOMAINS.contains(&domain) {
            priority = ReviewPriority::High;
        }

        let review = PendingReview {
            id: ReviewId::new(),
            mention_ref: mention_id,
            suggested_concepts,
            priority,
            escalation_reason: reason,
            sla_deadline: self.sla.deadline_for(priority, now),
            resolution: None,
        };
        let id = review.id;
        self.repository.put_pending_review(review).await?;
        Ok(id)
    }

    pub async fn list(
        &self,
        status: Option<ReviewQueueStatus>,
        priority: Option<ReviewPriority>,
        domain: Option<&str>,
        paging: Paging,
    ) -> Result<Vec<PendingReview>, MatchingError> {
        let status_resolved = status.map(|s| s == ReviewQueueStatus::Resolved);
        let mut reviews = self.repository.list_pending_reviews(status_resolved, priority).await?;
        reviews.sort_by(|a, b| a.id.0.cmp(&b.id.0));

        if let Some(domain) = domain {
            let mut filtered = Vec::with_capacity(reviews.len());
            for review in reviews {
                if let Some(mention) = self.repository.get_mention(review.mention_ref).await? {
                    if mention.domain == domain {
                        filtered.push(review);
                    }
                }
            }
            reviews = filtered;
        }

        let limit = if paging.limit == 0 { reviews.len() } else { paging.limit };
        Ok(reviews.into_iter().skip(paging.offset).take(limit).collect())
    }

    /// Check out a review for `reviewer` for up to `ttl`. Fails if it is
    /// already claimed by someone else and that claim has not expired.
    pub fn claim(&self, id: ReviewId, reviewer: &str, ttl: StdDuration, now: DateTime<Utc>) -> Result<(), MatchingError> {
        if let Some(existing) = self.claims.get(&id) {
            if existing.expires_at > now && existing.reviewer != reviewer {
                return Err(MatchingError::Llm(format!("review {id} already claimed by {}", existing.reviewer)));
            }
        }
        self.claims.insert(
            id,
            Claim { reviewer: reviewer.to_string(), expires_at: now + Duration::seconds(ttl.as_secs() as i64) },
        );
        Ok(())
    }

    pub fn is_claim_active(&self, id: ReviewId, now: DateTime<Utc>) -> bool {
        self.claims.get(&id).map(|c| c.expires_at > now).unwrap_or(false)
    }

    /// Resolve a review: link the mention to an existing concept, or
    /// promote it to a brand-new concept.
    pub async fn resolve(
        &self,
        id: ReviewId,
        kind: ReviewResolutionKind,
        concept_id: Option<ConceptId>,
        resolved_by: &str,
        now: DateTime<Utc>,
    ) -> Result<(), MatchingError> {
        let mut review = self
            .repository
            .get_pending_review(id)
            .await?
            .ok_or_else(|| MatchingError::Llm(format!("review {id} not found")))?;

        let mention = self
            .repository
            .get_mention(review.mention_ref)
            .await?
            .ok_or_else(|| MatchingError::Llm(format!("mention {} not found", review.mention_ref)))?;

        let linked_concept = match kind {
            ReviewResolutionKind::Link => {
                let concept = concept_id.ok_or_else(|| MatchingError::Llm("link resolution requires a concept_id".into()))?;
                self.repository
                    .put_relation(Relation::InstanceOf { mention: mention.id, concept })
                    .await?;
                concept
            }
            ReviewResolutionKind::PromoteNewConcept => {
                let new_concept = ProblemConcept {
                    id: ConceptId::new(),
                    canonical_statement: mention.statement.clone(),
                    domain: mention.domain.clone(),
                    embedding: mention.embedding.clone(),
                    mention_count: 0,
                    status: ConceptStatus::Active,
                };
                let new_id = new_concept.id;
                self.repository.put_concept(new_concept).await?;
                self.repository
                    .put_relation(Relation::InstanceOf { mention: mention.id, concept: new_id })
                    .await?;
                new_id
            }
        };

        review.resolution = Some(ReviewResolution {
            kind,
            concept_id: Some(linked_concept),
            resolved_by: resolved_by.to_string(),
            resolved_at: now,
        });
        self.repository.put_pending_review(review).await?;
        self.claims.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::models::{Embedding, ProblemMention, ReviewStatus, EMBEDDING_DIM};
    use crate::graph::repository::InMemoryRepository;

    fn mention(domain: &str) -> ProblemMention {
        ProblemMention {
            id: MentionId::new(),
            statement: "stmt".into(),
            embedding: Embedding::new(vec![0.1; EMBEDDING_DIM]).unwrap(),
            paper_doi: None,
            domain: domain.into(),
            review_status: ReviewStatus::Pending,
            concept_id: None,
        }
    }

    #[tokio::test]
    async fn enqueue_is_idempotent_on_mention_id() {
        let repo = Arc::new(InMemoryRepository::new());
        let m = mention("ml");
        repo.put_mention(m.clone()).await.unwrap();
        let queue = ReviewQueue::new(repo, SlaConfig::default());
        let now = Utc::now();

        let id1 = queue
            .enqueue(m.id, "ml", vec![], ReviewPriority::Normal, EscalationReason::LowConfidence, now)
            .await
            .unwrap();
        let id2 = queue
            .enqueue(m.id, "ml", vec![], ReviewPriority::Low, EscalationReason::LowConfidence, now)
            .await
            .unwrap();
        assert_eq!(id1, id2);
    }

    #[tokio::test]
    async fn high_impact_domain_upgrades_priority() {
        let repo = Arc::new(InMemoryRepository::new());
        let m = mention("safety");
        repo.put_mention(m.clone()).await.unwrap();
        let queue = ReviewQueue::new(repo.clone(), SlaConfig::default());
        let now = Utc::now();

        let id = queue
            .enqueue(m.id, "safety", vec![], ReviewPriority::Low, EscalationReason::LowConfidence, now)
            .await
            .unwrap();
        let review = repo.get_pending_review(id).await.unwrap().unwrap();
        assert_eq!(review.priority, ReviewPriority::High);
    }

    #[tokio::test]
    async fn claim_rejects_second_claimant_before_expiry() {
        let repo = Arc::new(InMemoryRepository::new());
        let queue = ReviewQueue::new(repo, SlaConfig::default());
        let id = ReviewId::new();
        let now = Utc::now();
        queue.claim(id, "alice", StdDuration::from_secs(60), now).unwrap();
        assert!(queue.claim(id, "bob", StdDuration::from_secs(60), now).is_err());
        assert!(queue.claim(id, "alice", StdDuration::from_secs(60), now).is_ok());
    }

    #[tokio::test]
    async fn claim_available_again_after_ttl_expires() {
        let repo = Arc::new(InMemoryRepository::new());
        let queue = ReviewQueue::new(repo, SlaConfig::default());
        let id = ReviewId::new();
        let now = Utc::now();
        queue.claim(id, "alice", StdDuration::from_secs(60), now).unwrap();
        let later = now + Duration::seconds(120);
        assert!(queue.claim(id, "bob", StdDuration::from_secs(60), later).is_ok());
    }

    #[tokio::test]
    async fn resolve_promote_creates_concept_and_links_mention() {
        let repo = Arc::new(InMemoryRepository::new());
        let m = mention("ml");
        repo.put_mention(m.clone()).await.unwrap();
        let queue = ReviewQueue::new(repo.clone(), SlaConfig::default());
        let now = Utc::now();
        let id = queue
            .enqueue(m.id, "ml", vec![], ReviewPriority::Normal, EscalationReason::LowConfidence, now)
            .await
            .unwrap();

        queue.resolve(id, ReviewResolutionKind::PromoteNewConcept, None, "alice", now).await.unwrap();

        let review = repo.get_pending_review(id).await.unwrap().unwrap();
        assert!(review.resolution.is_some());
    }
}
