//! Black-box coverage of the classify → escalate → human review →
//! resolve round trip, crossing the `matching::workflow` and
//! `matching::review_queue` module boundary through the public API.

use std::sync::Arc;

use agentic_kg_core::graph::models::{
    ConceptStatus, Embedding, MentionId, ProblemConcept, ProblemMention, ReviewResolutionKind, ReviewStatus, EMBEDDING_DIM,
};
use agentic_kg_core::graph::repository::InMemoryRepository;
use agentic_kg_core::matching::concept_matcher::{ConceptMatcher, MatcherConfig, ScoredCandidate};
use agentic_kg_core::matching::review_queue::{ReviewQueue, SlaConfig};
use agentic_kg_core::matching::workflow::{ArbiterDecision, ConsensusRound, EvaluatorDecision, MatchOutcome, MatchingLlm, MatchingWorkflow};
use agentic_kg_core::matching::MatchingError;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

struct AlwaysEscalate;

#[async_trait]
impl MatchingLlm for AlwaysEscalate {
    async fn evaluate(&self, _m: &ProblemMention, _c: &ScoredCandidate) -> Result<EvaluatorDecision, MatchingError> {
        Ok(EvaluatorDecision::Escalate)
    }
    async fn maker_argument(&self, _m: &ProblemMention, _c: &ScoredCandidate, _r: &[ConsensusRound]) -> Result<String, MatchingError> {
        Ok("maker".into())
    }
    async fn hater_argument(&self, _m: &ProblemMention, _c: &ScoredCandidate, _a: &str) -> Result<String, MatchingError> {
        Ok("hater".into())
    }
    async fn arbiter_decision(&self, _m: &ProblemMention, _c: &ScoredCandidate, _mk: &str, _h: &str) -> Result<ArbiterDecision, MatchingError> {
        unreachable!("MEDIUM tier never reaches the consensus sub-machine")
    }
}

fn embedding(seed: f32) -> Embedding {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[0] = seed;
    v[1] = 1.0;
    Embedding::new(v).unwrap()
}

#[tokio::test]
async fn medium_tier_escalation_round_trips_through_review_queue_resolution() {
    let repo = Arc::new(InMemoryRepository::new());

    // concept at seed 0.0 vs. mention at seed 0.5 gives a ~0.89 cosine
    // similarity: inside the MEDIUM band (0.80..0.95), not HIGH.
    let existing_concept = ProblemConcept {
        id: agentic_kg_core::graph::models::ConceptId::new(),
        canonical_statement: "stmt".into(),
        domain: "ml".into(),
        embedding: embedding(0.0),
        mention_count: 0,
        status: ConceptStatus::Active,
    };
    repo.put_concept(existing_concept.clone()).await.unwrap();

    let mention = ProblemMention {
        id: MentionId::new(),
        statement: "stmt".into(),
        embedding: embedding(0.5),
        paper_doi: None,
        domain: "ml".into(),
        review_status: ReviewStatus::Unreviewed,
        concept_id: None,
    };
    repo.put_mention(mention.clone()).await.unwrap();

    let matcher = Arc::new(ConceptMatcher::new(repo.clone(), MatcherConfig::default()));
    let review_queue = Arc::new(ReviewQueue::new(repo.clone(), SlaConfig::default()));
    let workflow = MatchingWorkflow::new(matcher, review_queue.clone(), repo.clone(), AlwaysEscalate);

    let (outcome, trace) = workflow.run(mention.clone(), Uuid::new_v4(), Utc::now()).await.unwrap();
    let review_id = match outcome {
        MatchOutcome::Escalated(id) => id,
        other => panic!("expected an escalation, got {other:?}"),
    };
    assert!(trace.iter().any(|t| t.step == "medium_evaluator"));

    let pending = repo.get_pending_review(review_id).await.unwrap().unwrap();
    assert!(pending.resolution.is_none());

    review_queue
        .resolve(review_id, ReviewResolutionKind::Link, Some(existing_concept.id), "reviewer-1", Utc::now())
        .await
        .unwrap();

    let linked_mentions = repo.mentions_of_concept(existing_concept.id).await.unwrap();
    assert!(linked_mentions.contains(&mention.id));

    let resolved = repo.get_pending_review(review_id).await.unwrap().unwrap();
    assert_eq!(resolved.resolution.unwrap().concept_id, Some(existing_concept.id));
}

#[tokio::test]
async fn review_queue_upgrades_priority_for_high_impact_domains_end_to_end() {
    let repo = Arc::new(InMemoryRepository::new());
    let review_queue = ReviewQueue::new(repo.clone(), SlaConfig::default());

    let mention = ProblemMention {
        id: MentionId::new(),
        statement: "stmt".into(),
        embedding: embedding(1.0),
        paper_doi: None,
        domain: "safety".into(),
        review_status: ReviewStatus::Unreviewed,
        concept_id: None,
    };
    repo.put_mention(mention.clone()).await.unwrap();

    let id = review_queue
        .enqueue(
            mention.id,
            "safety",
            vec![],
            agentic_kg_core::graph::models::ReviewPriority::Low,
            agentic_kg_core::graph::models::EscalationReason::LowConfidence,
            Utc::now(),
        )
        .await
        .unwrap();

    let review = repo.get_pending_review(id).await.unwrap().unwrap();
    assert_eq!(review.priority, agentic_kg_core::graph::models::ReviewPriority::High);
}
