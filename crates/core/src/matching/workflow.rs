//! `classify → {high_link | medium_evaluator | low_consensus |
//! reject_create} → finalize` state machine, including the Maker/Hater/
//! Arbiter consensus sub-machine (§4.15).

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::graph::models::{ConceptId, ConceptStatus, EscalationReason, ProblemConcept, ProblemMention, Relation, ReviewId, ReviewPriority};
use crate::graph::repository::Repository;

use super::concept_matcher::{ConceptMatcher, ConfidenceTier, ScoredCandidate};
use super::review_queue::ReviewQueue;
use super::MatchingError;

pub const MAX_ROUNDS: u32 = 3;
/// Arbiter decisions at or above this confidence finalize the round
/// immediately instead of continuing the debate.
pub const ARBITER_CONFIDENCE_THRESHOLD: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluatorDecision {
    Approve,
    Reject,
    Escalate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbiterOutcome {
    Link,
    CreateNew,
}

#[derive(Debug, Clone, Copy)]
pub struct ArbiterDecision {
    pub outcome: ArbiterOutcome,
    pub confidence: f32,
}

#[derive(Debug, Clone)]
pub struct ConsensusRound {
    pub round: u32,
    pub maker_argument: String,
    pub hater_argument: String,
    pub arbiter_decision: Option<ArbiterDecision>,
}

/// The LLM-shaped collaborators the matching workflow depends on: a
/// single Evaluator for MEDIUM-tier candidates, and the Maker/Hater/
/// Arbiter triad for LOW-tier consensus.
#[async_trait]
pub trait MatchingLlm: Send + Sync {
    async fn evaluate(&self, mention: &ProblemMention, candidate: &ScoredCandidate) -> Result<EvaluatorDecision, MatchingError>;
    async fn maker_argument(&self, mention: &ProblemMention, candidate: &ScoredCandidate, rounds: &[ConsensusRound]) -> Result<String, MatchingError>;
    async fn hater_argument(&self, mention: &ProblemMention, candidate: &ScoredCandidate, maker_argument: &str) -> Result<String, MatchingError>;
    async fn arbiter_decision(&self, mention: &ProblemMention, candidate: &ScoredCandidate, maker_argument: &str, hater_argument: &str) -> Result<ArbiterDecision, MatchingError>;
}

/// Audit-log trace record emitted on every state transition (§4.15,
/// last sentence).
#[derive(Debug, Clone)]
pub struct TraceRecord {
    pub trace_id: Uuid,
    pub run_id: Uuid,
    pub step: &'static str,
    pub duration_ms: u64,
    pub decision: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Linked(ConceptId),
    CreatedNew(ConceptId),
    Escalated(ReviewId),
}

pub struct MatchingWorkflow<L: MatchingLlm> {
    matcher: Arc<ConceptMatcher>,
    review_queue: Arc<ReviewQueue>,
    repository: Arc<dyn Repository>,
    llm: L,
}

impl<L: MatchingLlm> MatchingWorkflow<L> {
    pub fn new(matcher: Arc<ConceptMatcher>, review_queue: Arc<ReviewQueue>, repository: Arc<dyn Repository>, llm: L) -> Self {
        Self { matcher, review_queue, repository, llm }
    }

    pub async fn run(&self, mention: ProblemMention, run_id: Uuid, now: DateTime<Utc>) -> Result<(MatchOutcome, Vec<TraceRecord>), MatchingError> {
        let mut trace = Vec::new();

        let top = self.record(&mut trace, run_id, "classify", async { self.matcher.top_candidate(&mention).await }).await?;

        let outcome = match top {
            None => self.reject_create(&mention, &mut trace, run_id).await?,
            Some((candidate, tier)) => match tier {
                ConfidenceTier::High => self.high_link(&mention, candidate, &mut trace, run_id).await?,
                ConfidenceTier::Medium => self.medium_evaluator(&mention, candidate, &mut trace, run_id, now).await?,
                ConfidenceTier::Low => self.low_consensus(&mention, candidate, &mut trace, run_id, now).await?,
                ConfidenceTier::Rejected => self.reject_create(&mention, &mut trace, run_id).await?,
            },
        };

        Ok((outcome, trace))
    }

    async fn record<T, F>(&self, trace: &mut Vec<TraceRecord>, run_id: Uuid, step: &'static str, fut: F) -> Result<T, MatchingError>
    where
        F: std::future::Future<Output = Result<T, MatchingError>>,
    {
        let start = Instant::now();
        let result = fut.await;
        trace.push(TraceRecord {
            trace_id: Uuid::new_v4(),
            run_id,
            step,
            duration_ms: start.elapsed().as_millis() as u64,
            decision: if result.is_ok() { "ok".to_string() } else { "error".to_string() },
            confidence: 0.0,
        });
        result
    }

    async fn high_link(&self, mention: &ProblemMention, candidate: ScoredCandidate, trace: &mut Vec<TraceRecord>, run_id: Uuid) -> Result<MatchOutcome, MatchingError> {
        self.repository.put_relation(Relation::InstanceOf { mention: mention.id, concept: candidate.concept.id }).await?;
        trace.push(TraceRecord {
            trace_id: Uuid::new_v4(),
            run_id,
            step: "high_link",
            duration_ms: 0,
            decision: "link".to_string(),
            confidence: candidate.similarity,
        });
        Ok(MatchOutcome::Linked(candidate.concept.id))
    }

    async fn medium_evaluator(
        &self,
        mention: &ProblemMention,
        candidate: ScoredCandidate,
        trace: &mut Vec<TraceRecord>,
        run_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<MatchOutcome, MatchingError> {
        let decision = self.llm.evaluate(mention, &candidate).await?;
        trace.push(TraceRecord {
            trace_id: Uuid::new_v4(),
            run_id,
            step: "medium_evaluator",
            duration_ms: 0,
            decision: format!("{decision:?}"),
            confidence: candidate.similarity,
        });

        match decision {
            EvaluatorDecision::Approve => {
                self.repository.put_relation(Relation::InstanceOf { mention: mention.id, concept: candidate.concept.id }).await?;
                Ok(MatchOutcome::Linked(candidate.concept.id))
            }
            EvaluatorDecision::Reject => self.reject_create(mention, trace, run_id).await,
            EvaluatorDecision::Escalate => self.escalate(mention, vec![candidate], EscalationReason::LowConfidence, now).await,
        }
    }

    async fn low_consensus(
        &self,
        mention: &ProblemMention,
        candidate: ScoredCandidate,
        trace: &mut Vec<TraceRecord>,
        run_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<MatchOutcome, MatchingError> {
        let mut rounds: Vec<ConsensusRound> = Vec::new();

        for round_idx in 0..MAX_ROUNDS {
            let maker_argument = self.llm.maker_argument(mention, &candidate, &rounds).await?;
            let hater_argument = self.llm.hater_argument(mention, &candidate, &maker_argument).await?;
            let arbiter = self.llm.arbiter_decision(mention, &candidate, &maker_argument, &hater_argument).await?;

            trace.push(TraceRecord {
                trace_id: Uuid::new_v4(),
                run_id,
                step: "low_consensus",
                duration_ms: 0,
                decision: format!("{:?}", arbiter.outcome),
                confidence: arbiter.confidence,
            });

            let finalized = arbiter.confidence >= ARBITER_CONFIDENCE_THRESHOLD;
            rounds.push(ConsensusRound {
                round: round_idx,
                maker_argument,
                hater_argument,
                arbiter_decision: Some(arbiter),
            });

            if finalized {
                return match arbiter.outcome {
                    ArbiterOutcome::Link => {
                        self.repository.put_relation(Relation::InstanceOf { mention: mention.id, concept: candidate.concept.id }).await?;
                        Ok(MatchOutcome::Linked(candidate.concept.id))
                    }
                    ArbiterOutcome::CreateNew => self.reject_create(mention, trace, run_id).await,
                };
            }
        }

        self.escalate(mention, vec![candidate], EscalationReason::ConsensusNotReached, now).await
    }

    async fn reject_create(&self, mention: &ProblemMention, trace: &mut Vec<TraceRecord>, run_id: Uuid) -> Result<MatchOutcome, MatchingError> {
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
        self.repository.put_relation(Relation::InstanceOf { mention: mention.id, concept: new_id }).await?;
        trace.push(TraceRecord {
            trace_id: Uuid::new_v4(),
            run_id,
            step: "reject_create",
            duration_ms: 0,
            decision: "create_new".to_string(),
            confidence: 0.0,
        });
        Ok(MatchOutcome::CreatedNew(new_id))
    }

    async fn escalate(
        &self,
        mention: &ProblemMention,
        candidates: Vec<ScoredCandidate>,
        reason: EscalationReason,
        now: DateTime<Utc>,
    ) -> Result<MatchOutcome, MatchingError> {
        let suggested = candidates
            .iter()
            .map(|c| crate::graph::models::MatchCandidate {
                concept_id: c.concept.id,
                similarity: c.similarity,
                citation_boost: c.citation_boost,
                final_score: c.final_score,
            })
            .collect();
        let review_id = self
            .review_queue
            .enqueue(mention.id, &mention.domain, suggested, ReviewPriority::Normal, reason, now)
            .await?;
        Ok(MatchOutcome::Escalated(review_id))
    }
}
