//! Black-box coverage of the workflow engine against the public API,
//! complementing the in-module tests in `src/workflow/engine.rs` with
//! scenarios that cross module boundaries (store persistence, cancel
//! racing a paused checkpoint, edit-then-resume round trips).

use std::collections::HashMap;
use std::sync::Arc;

use agentic_kg_core::agents::continuation::ContinuationAgent;
use agentic_kg_core::agents::evaluation::EvaluationAgent;
use agentic_kg_core::agents::llm::{ContinuationProposal, EvaluationOutcome, MetricComparison, RankedProblem, ResearchLlm, SynthesisOutput};
use agentic_kg_core::agents::ranking::RankingAgent;
use agentic_kg_core::agents::synthesis::SynthesisAgent;
use agentic_kg_core::agents::AgentError;
use agentic_kg_core::config::CheckpointConfig;
use agentic_kg_core::events::EventBus;
use agentic_kg_core::graph::models::{Constraint, Evidence, ExtractionMetadata, Problem, ProblemId, ProblemStatus};
use agentic_kg_core::graph::repository::InMemoryRepository;
use agentic_kg_core::sandbox::{ExecutionResult, SandboxError, SandboxRunner};
use agentic_kg_core::workflow::checkpoint::{CheckpointType, Decision, DecisionKind};
use agentic_kg_core::workflow::engine::{StartParams, WorkflowEngine, WorkflowEngineConfig};
use agentic_kg_core::workflow::state::RunStatus;
use agentic_kg_core::workflow::store::InMemoryWorkflowStore;
use agentic_kg_core::workflow::WorkflowError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

#[derive(Clone)]
struct HappyLlm;

#[async_trait]
impl ResearchLlm for HappyLlm {
    async fn rank_problems(&self, candidates: &[Problem]) -> Result<Vec<RankedProblem>, AgentError> {
        Ok(candidates.iter().map(|p| RankedProblem { problem_id: p.id, score: 1.0, rationale: "r".into() }).collect())
    }
    async fn propose_continuation(&self, _problem: &Problem, _related: &[Problem]) -> Result<ContinuationProposal, AgentError> {
        Ok(ContinuationProposal { title: "t".into(), methodology: "m".into(), experimental_steps: vec![], expected_outcome: "o".into(), confidence: 0.9 })
    }
    async fn generate_evaluation_script(&self, _: &Problem, _: &ContinuationProposal) -> Result<String, AgentError> {
        Ok("print('{}')".into())
    }
    async fn interpret_evaluation(&self, _: &Problem, _: &str, _: &HashMap<String, serde_json::Value>) -> Result<MetricComparison, AgentError> {
        Ok(MetricComparison { any_metric_improved: true, notes: "n".into() })
    }
    async fn synthesize(&self, _: &Problem, _: &ContinuationProposal, _: &EvaluationOutcome) -> Result<SynthesisOutput, AgentError> {
        Ok(SynthesisOutput { summary: "done".into(), new_problems: vec![], proposed_relations: vec![] })
    }
}

struct StubSandbox;
#[async_trait]
impl SandboxRunner for StubSandbox {
    async fn execute(&self, _code: &str, _env: HashMap<String, String>) -> Result<ExecutionResult, SandboxError> {
        Ok(ExecutionResult { exit_code: 0, stdout: "{}".into(), stderr: String::new(), stdout_truncated: false, stderr_truncated: false, execution_time_ms: 5, timed_out: false })
    }
}

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

fn build_engine(repo: Arc<InMemoryRepository>, checkpoints: CheckpointConfig) -> WorkflowEngine {
    let sandbox: Arc<dyn SandboxRunner> = Arc::new(StubSandbox);
    WorkflowEngine::new(
        Arc::new(RankingAgent::new(repo.clone(), HappyLlm)),
        Arc::new(ContinuationAgent::new(repo.clone(), HappyLlm)),
        Arc::new(EvaluationAgent::new(repo.clone(), sandbox, HappyLlm)),
        Arc::new(SynthesisAgent::new(repo, HappyLlm)),
        Arc::new(InMemoryWorkflowStore::new()),
        Arc::new(EventBus::new()),
        checkpoints,
        WorkflowEngineConfig { default_candidate_limit: 10 },
    )
}

fn all_required() -> CheckpointConfig {
    CheckpointConfig { select_problem_required: true, approve_proposal_required: true, review_evaluation_required: true }
}

#[tokio::test]
async fn run_state_survives_a_store_round_trip_across_checkpoints() {
    let repo = Arc::new(InMemoryRepository::new());
    let p = problem();
    let pid = p.id;
    repo.put_problem(p).await.unwrap();
    let engine = build_engine(repo, all_required());

    let run_id = engine.start(StartParams::default()).await.unwrap();

    // A fresh read through `get_state` must see exactly what `start` paused at.
    let reloaded = engine.get_state(run_id).await.unwrap();
    assert_eq!(reloaded.status, RunStatus::PausedAtCheckpoint);
    assert_eq!(reloaded.pending_checkpoint, Some(CheckpointType::SelectProblem));

    let record = engine
        .resume(run_id, CheckpointType::SelectProblem, Decision { kind: DecisionKind::Edit, feedback: None, edited_data: Some(json!({"problem_id": pid.0.to_string()})) })
        .await
        .unwrap();
    assert_eq!(record.state.selected_problem_id, Some(pid));

    // List must surface the same run exactly once, mid-flight.
    let all = engine.list().await.unwrap();
    assert_eq!(all.iter().filter(|r| r.run_id == run_id).count(), 1);
}

#[tokio::test]
async fn cancel_while_paused_blocks_further_resume() {
    let repo = Arc::new(InMemoryRepository::new());
    repo.put_problem(problem()).await.unwrap();
    let engine = build_engine(repo, all_required());

    let run_id = engine.start(StartParams::default()).await.unwrap();
    engine.cancel(run_id).await.unwrap();

    let result = engine.resume(run_id, CheckpointType::SelectProblem, Decision { kind: DecisionKind::Approve, feedback: None, edited_data: None }).await;
    assert!(matches!(result, Err(WorkflowError::Cancelled(_))));
}

#[tokio::test]
async fn edit_decision_is_visible_in_subsequent_checkpoint_state() {
    let repo = Arc::new(InMemoryRepository::new());
    let p = problem();
    repo.put_problem(p).await.unwrap();
    let engine = build_engine(repo, all_required());

    let run_id = engine.start(StartParams::default()).await.unwrap();
    let record = engine.get_state(run_id).await.unwrap();
    let pid = record.state.ranked.first().unwrap().problem_id;

    let record = engine
        .resume(run_id, CheckpointType::SelectProblem, Decision { kind: DecisionKind::Edit, feedback: None, edited_data: Some(json!({"problem_id": pid.0.to_string()})) })
        .await
        .unwrap();
    assert!(record.state.proposal.is_some());

    let record = engine
        .resume(
            run_id,
            CheckpointType::ApproveProposal,
            Decision { kind: DecisionKind::Edit, feedback: None, edited_data: Some(json!({"title": "revised title"})) },
        )
        .await
        .unwrap();
    assert_eq!(record.state.proposal.as_ref().unwrap().title, "revised title");
}
