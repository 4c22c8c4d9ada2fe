//! Synthesis agent: summarizes the run and writes new problems and
//! relations back to the graph (§4.17).
//!
//! All writes here are best-effort: a failure to persist one proposed
//! problem or relation is logged and skipped rather than aborting the
//! rest of synthesis, since the LLM's proposals are independent of one
//! another.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use crate::graph::models::{Problem, ProblemId, ProblemStatus, Relation};
use crate::graph::repository::Repository;

use super::llm::RelationEndpoint;
use super::{Agent, AgentError, ResearchLlm, WorkflowState};

pub struct SynthesisAgent<L: ResearchLlm> {
    repository: Arc<dyn Repository>,
    llm: L,
}

impl<L: ResearchLlm> SynthesisAgent<L> {
    pub fn new(repository: Arc<dyn Repository>, llm: L) -> Self {
        Self { repository, llm }
    }

    fn resolve(&self, endpoint: RelationEndpoint, created: &[Option<ProblemId>]) -> Option<ProblemId> {
        match endpoint {
            RelationEndpoint::Existing(id) => Some(id),
            RelationEndpoint::NewProblem(idx) => created.get(idx).copied().flatten(),
        }
    }
}

#[async_trait]
impl<L: ResearchLlm> Agent for SynthesisAgent<L> {
    async fn run(&self, mut state: WorkflowState) -> Result<WorkflowState, AgentError> {
        let problem_id = state
            .selected_problem_id
            .ok_or_else(|| AgentError::MissingState("selected_problem_id".to_string()))?;
        let proposal = state.proposal.clone().ok_or_else(|| AgentError::MissingState("proposal".to_string()))?;
        let evaluation = state.evaluation.clone().ok_or_else(|| AgentError::MissingState("evaluation".to_string()))?;

        let source = self
            .repository
            .get_problem(problem_id)
            .await?
            .ok_or_else(|| AgentError::MissingState(format!("problem {problem_id} not found")))?;

        let synthesis = self.llm.synthesize(&source, &proposal, &evaluation).await?;

        let mut created: Vec<Option<ProblemId>> = Vec::with_capacity(synthesis.new_problems.len());
        for proposed in &synthesis.new_problems {
            let now = Utc::now();
            let new_id = ProblemId::new();
            let new_problem = Problem {
                id: new_id,
                statement: proposed.statement.clone(),
                domain: proposed.domain.clone(),
                status: ProblemStatus::Open,
                assumptions: proposed.assumptions.clone(),
                constraints: vec![],
                datasets: vec![],
                metrics: vec![],
                baselines: vec![],
                evidence: source.evidence.clone(),
                extraction_metadata: source.extraction_metadata.clone(),
                embedding: None,
                version: 1,
                related_problem_ids: vec![source.id],
                created_at: now,
                updated_at: now,
            };

            match self.repository.put_problem(new_problem).await {
                Ok(()) => {
                    created.push(Some(new_id));
                    if let Err(e) = self
                        .repository
                        .put_relation(Relation::ProblemToProblem {
                            from: new_id,
                            to: source.id,
                            kind: crate::graph::models::ProblemRelationKind::Extends,
                            confidence: proposal.confidence,
                        })
                        .await
                    {
                        warn!(error = %e, "failed to write EXTENDS relation for synthesized problem");
                    }
                }
                Err(e) => {
                    warn!(error = %e, statement = %proposed.statement, "failed to persist synthesized problem");
                    created.push(None);
                }
            }
        }

        for proposed_relation in &synthesis.proposed_relations {
            let from = self.resolve(proposed_relation.from, &created);
            let to = self.resolve(proposed_relation.to, &created);
            let (Some(from), Some(to)) = (from, to) else {
                warn!("skipping proposed relation with unresolved endpoint");
                continue;
            };
            if let Err(e) = self
                .repository
                .put_relation(Relation::ProblemToProblem {
                    from,
                    to,
                    kind: proposed_relation.kind,
                    confidence: proposed_relation.confidence,
                })
                .await
            {
                warn!(error = %e, "failed to write proposed relation");
            }
        }

        if evaluation.verdict == super::llm::Verdict::Promising && source.status == ProblemStatus::Open {
            let mut advanced = source.clone();
            advanced.status = ProblemStatus::InProgress;
            advanced.version += 1;
            advanced.updated_at = Utc::now();
            if let Err(e) = self.repository.put_problem(advanced).await {
                warn!(error = %e, "failed to advance source problem status to in_progress");
            }
        }

        state.synthesis = Some(synthesis);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::llm::{
        ContinuationProposal, EvaluationOutcome, MetricComparison, ProposedProblem, ProposedRelation, RankedProblem,
        SynthesisOutput, Verdict,
    };
    use crate::graph::models::{Constraint, Evidence, ExtractionMetadata, ProblemRelationKind};
    use crate::graph::repository::InMemoryRepository;
    use std::collections::HashMap;

    fn problem() -> Problem {
        let now = Utc::now();
        Problem {
            id: ProblemId::new(),
            statement: "stmt".into(),
            domain: "ml".into(),
            status: ProblemStatus::Open,
            assumptions: vec![],
            constraints: Vec::<Constraint>::new(),
            datasets: vec![],
            metrics: vec![],
            baselines: vec![],
            evidence: Evidence { source_doi: None, source_title: "t".into(), section: "s".into(), quoted_text: "q".into() },
            extraction_metadata: ExtractionMetadata { model: "m".into(), version: "v".into(), confidence_score: 0.9, reviewed: false },
            embedding: None,
            version: 1,
            related_problem_ids: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    fn proposal() -> ContinuationProposal {
        ContinuationProposal { title: "t".into(), methodology: "m".into(), experimental_steps: vec![], expected_outcome: "o".into(), confidence: 0.9 }
    }

    fn evaluation(verdict: Verdict) -> EvaluationOutcome {
        EvaluationOutcome { verdict, feasibility: 0.8, metrics: HashMap::new(), timed_out: false, sandbox_failed: false }
    }

    struct StubLlm {
        output: SynthesisOutput,
    }
    #[async_trait]
    impl ResearchLlm for StubLlm {
        async fn rank_problems(&self, _: &[Problem]) -> Result<Vec<RankedProblem>, AgentError> {
            unreachable!()
        }
        async fn propose_continuation(&self, _: &Problem, _: &[Problem]) -> Result<ContinuationProposal, AgentError> {
            unreachable!()
        }
        async fn generate_evaluation_script(&self, _: &Problem, _: &ContinuationProposal) -> Result<String, AgentError> {
            unreachable!()
        }
        async fn interpret_evaluation(&self, _: &Problem, _: &str, _: &HashMap<String, serde_json::Value>) -> Result<MetricComparison, AgentError> {
            unreachable!()
        }
        async fn synthesize(&self, _: &Problem, _: &ContinuationProposal, _: &EvaluationOutcome) -> Result<SynthesisOutput, AgentError> {
            Ok(self.output.clone())
        }
    }

    #[tokio::test]
    async fn promising_verdict_creates_problem_and_advances_source() {
        let repo = Arc::new(InMemoryRepository::new());
        let source = problem();
        let source_id = source.id;
        repo.put_problem(source).await.unwrap();

        let llm = StubLlm {
            output: SynthesisOutput {
                summary: "s".into(),
                new_problems: vec![ProposedProblem { statement: "new one".into(), domain: "ml".into(), assumptions: vec![] }],
                proposed_relations: vec![],
            },
        };

        let agent = SynthesisAgent::new(repo.clone(), llm);
        let state = WorkflowState {
            selected_problem_id: Some(source_id),
            proposal: Some(proposal()),
            evaluation: Some(evaluation(Verdict::Promising)),
            ..Default::default()
        };
        let result = agent.run(state).await.unwrap();
        assert_eq!(result.synthesis.unwrap().new_problems.len(), 1);

        let source_after = repo.get_problem(source_id).await.unwrap().unwrap();
        assert_eq!(source_after.status, ProblemStatus::InProgress);
    }

    #[tokio::test]
    async fn non_promising_verdict_leaves_source_open() {
        let repo = Arc::new(InMemoryRepository::new());
        let source = problem();
        let source_id = source.id;
        repo.put_problem(source).await.unwrap();

        let llm = StubLlm { output: SynthesisOutput { summary: "s".into(), new_problems: vec![], proposed_relations: vec![] } };
        let agent = SynthesisAgent::new(repo.clone(), llm);
        let state = WorkflowState {
            selected_problem_id: Some(source_id),
            proposal: Some(proposal()),
            evaluation: Some(evaluation(Verdict::Inconclusive)),
            ..Default::default()
        };
        agent.run(state).await.unwrap();

        let source_after = repo.get_problem(source_id).await.unwrap().unwrap();
        assert_eq!(source_after.status, ProblemStatus::Open);
    }

    #[tokio::test]
    async fn relation_with_unresolved_endpoint_is_skipped_not_fatal() {
        let repo = Arc::new(InMemoryRepository::new());
        let source = problem();
        let source_id = source.id;
        repo.put_problem(source).await.unwrap();

        let llm = StubLlm {
            output: SynthesisOutput {
                summary: "s".into(),
                new_problems: vec![],
                proposed_relations: vec![ProposedRelation {
                    from: RelationEndpoint::NewProblem(5),
                    to: RelationEndpoint::Existing(source_id),
                    kind: ProblemRelationKind::DependsOn,
                    confidence: 0.5,
                }],
            },
        };

        let agent = SynthesisAgent::new(repo, llm);
        let state = WorkflowState {
            selected_problem_id: Some(source_id),
            proposal: Some(proposal()),
            evaluation: Some(evaluation(Verdict::Inconclusive)),
            ..Default::default()
        };
        assert!(agent.run(state).await.is_ok());
    }
}
