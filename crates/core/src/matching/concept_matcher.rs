//! Vector-similarity matching and confidence tiering (§4.14).

use std::sync::Arc;

use crate::graph::models::{ConceptId, Embedding, MentionId, ProblemConcept, ProblemMention};
use crate::graph::repository::Repository;

use super::MatchingError;

/// Domains that always escalate below-HIGH outcomes to high review
/// priority regardless of why they were escalated (§4.16). Closed set,
/// matching the spec's "closed-set list" wording.
pub const HIGH_IMPACT_DOMAINS: &[&str] = &["safety", "alignment", "medicine", "security"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
    Rejected,
}

impl ConfidenceTier {
    pub fn from_similarity(similarity: f32) -> Self {
        if similarity >= 0.95 {
            ConfidenceTier::High
        } else if similarity >= 0.80 {
            ConfidenceTier::Medium
        } else if similarity >= 0.50 {
            ConfidenceTier::Low
        } else {
            ConfidenceTier::Rejected
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub concept: ProblemConcept,
    pub similarity: f32,
    pub citation_boost: f32,
    pub final_score: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct MatcherConfig {
    pub top_k: usize,
    pub citation_boost: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self { top_k: 10, citation_boost: 0.20 }
    }
}

pub struct ConceptMatcher {
    repository: Arc<dyn Repository>,
    config: MatcherConfig,
}

impl ConceptMatcher {
    pub fn new(repository: Arc<dyn Repository>, config: MatcherConfig) -> Self {
        Self { repository, config }
    }

    /// Run the similarity query and apply the citation boost, returning
    /// candidates sorted by `final_score` descending with ties broken by
    /// domain match, then `mention_count`, then lexicographic concept id.
    pub async fn candidates(&self, mention: &ProblemMention) -> Result<Vec<ScoredCandidate>, MatchingError> {
        self.candidates_for(&mention.embedding, mention.paper_doi.as_deref(), &mention.domain).await
    }

    async fn candidates_for(
        &self,
        embedding: &Embedding,
        mention_paper_doi: Option<&str>,
        mention_domain: &str,
    ) -> Result<Vec<ScoredCandidate>, MatchingError> {
        let similar = self.repository.query_similar_concepts(embedding, self.config.top_k).await?;

        let mut scored = Vec::with_capacity(similar.len());
        for (concept_id, similarity) in similar {
            let Some(concept) = self.repository.get_concept(concept_id).await? else { continue };
            let citation_boost = self.citation_boost(concept_id, mention_paper_doi).await?;
            let final_score = similarity + citation_boost;
            scored.push(ScoredCandidate { concept, similarity, citation_boost, final_score });
        }

        scored.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| domain_rank(&b.concept.domain, mention_domain).cmp(&domain_rank(&a.concept.domain, mention_domain)))
                .then_with(|| b.concept.mention_count.cmp(&a.concept.mention_count))
                .then_with(|| a.concept.id.0.cmp(&b.concept.id.0))
        });

        Ok(scored)
    }

    /// Does `mention_paper_doi` transitively (one hop) cite any paper
    /// that already has a mention linked to `concept`?
    async fn citation_boost(&self, concept: ConceptId, mention_paper_doi: Option<&str>) -> Result<f32, MatchingError> {
        let Some(citing_doi) = mention_paper_doi else { return Ok(0.0) };
        let linked_mentions = self.repository.mentions_of_concept(concept).await?;
        for mention_id in linked_mentions {
            if let Some(linked) = self.repository.get_mention(mention_id).await? {
                if let Some(cited_doi) = linked.paper_doi.as_deref() {
                    if self.repository.cites_one_hop(citing_doi, cited_doi).await? {
                        return Ok(self.config.citation_boost);
                    }
                }
            }
        }
        Ok(0.0)
    }

    /// Top candidate and its tier, or `None` if there were no candidates
    /// at all (treated the same as REJECTED by callers).
    pub async fn top_candidate(&self, mention: &ProblemMention) -> Result<Option<(ScoredCandidate, ConfidenceTier)>, MatchingError> {
        let candidates = self.candidates(mention).await?;
        Ok(candidates.into_iter().next().map(|c| {
            let tier = ConfidenceTier::from_similarity(c.similarity);
            (c, tier)
        }))
    }
}

fn domain_rank(concept_domain: &str, mention_domain: &str) -> u8 {
    if concept_domain == mention_domain {
        1
    } else {
        0
    }
}

pub type MentionRef = MentionId;
