//! The 7-node DAG engine: `ranking → [select_problem] → continuation →
//! [approve_proposal] → evaluation → [review_evaluation] → synthesis →
//! END` (§4.18).

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;
use tracing::info;

use crate::agents::{Agent, WorkflowState};
use crate::config::CheckpointConfig;
use crate::events::{EventBus, EventKind, WorkflowEvent};
use crate::graph::models::ProblemStatus;

use super::checkpoint::{apply_edit, CheckpointType, Decision, DecisionKind};
use super::state::{RunId, RunRecord, RunStatus};
use super::store::WorkflowStore;
use super::WorkflowError;

#[derive(Debug, Clone)]
pub struct WorkflowEngineConfig {
    pub default_candidate_limit: usize,
}

impl Default for WorkflowEngineConfig {
    fn default() -> Self {
        Self { default_candidate_limit: crate::config::env_u64("AGENTIC_KG_WORKFLOW_CANDIDATE_LIMIT", 20) as usize }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StartParams {
    pub domain_filter: Option<String>,
    pub status_filter: Option<ProblemStatus>,
    pub candidate_limit: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Ranking,
    Continuation,
    Evaluation,
    Synthesis,
}

/// The DAG engine itself is not generic over the LLM client: it takes
/// the four agents as `Arc<dyn Agent>`, constructor-injected, the way
/// `ToolReviewOrchestrator` takes its collaborators as `Arc<dyn Trait>`
/// fields rather than being generic over them.
pub struct WorkflowEngine {
    ranking: Arc<dyn Agent>,
    continuation: Arc<dyn Agent>,
    evaluation: Arc<dyn Agent>,
    synthesis: Arc<dyn Agent>,
    store: Arc<dyn WorkflowStore>,
    events: Arc<EventBus>,
    checkpoints: CheckpointConfig,
    config: WorkflowEngineConfig,
    locks: DashMap<RunId, Arc<AsyncMutex<()>>>,
    cancel_flags: DashMap<RunId, bool>,
}

impl WorkflowEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ranking: Arc<dyn Agent>,
        continuation: Arc<dyn Agent>,
        evaluation: Arc<dyn Agent>,
        synthesis: Arc<dyn Agent>,
        store: Arc<dyn WorkflowStore>,
        events: Arc<EventBus>,
        checkpoints: CheckpointConfig,
        config: WorkflowEngineConfig,
    ) -> Self {
        Self {
            ranking,
            continuation,
            evaluation,
            synthesis,
            store,
            events,
            checkpoints,
            config,
            locks: DashMap::new(),
            cancel_flags: DashMap::new(),
        }
    }

    fn lock_for(&self, run_id: RunId) -> Arc<AsyncMutex<()>> {
        self.locks.entry(run_id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    fn is_cancelled(&self, run_id: RunId) -> bool {
        self.cancel_flags.get(&run_id).map(|f| *f).unwrap_or(false)
    }

    pub async fn start(&self, params: StartParams) -> Result<RunId, WorkflowError> {
        let run_id = RunId::new();
        let lock = self.lock_for(run_id);
        let _permit = lock.lock().await;

        let state = WorkflowState {
            run_id: Some(run_id.0),
            domain_filter: params.domain_filter,
            status_filter: params.status_filter,
            candidate_limit: params.candidate_limit.unwrap_or(self.config.default_candidate_limit),
            ..Default::default()
        };

        self.advance(run_id, state, Node::Ranking, vec![]).await?;
        Ok(run_id)
    }

    pub async fn resume(&self, run_id: RunId, checkpoint: CheckpointType, decision: Decision) -> Result<RunRecord, WorkflowError> {
        let lock = self.lock_for(run_id);
        let _permit = lock.lock().await;

        let mut record = self.store.get(run_id).await?.ok_or(WorkflowError::RunNotFound(run_id))?;
        if record.status == RunStatus::Cancelled {
            return Err(WorkflowError::Cancelled(run_id));
        }
        let pending = record.pending_checkpoint.ok_or(WorkflowError::NotAtCheckpoint(run_id))?;
        if pending != checkpoint {
            return Err(WorkflowError::CheckpointMismatch { expected: pending, actual: checkpoint });
        }

        self.events
            .emit(WorkflowEvent::new(
                run_id.0,
                EventKind::CheckpointResolved,
                Some(checkpoint_label(checkpoint)),
                json!({"decision": decision_label(decision.kind), "feedback": decision.feedback}),
            ))
            .await;

        match decision.kind {
            DecisionKind::Reject => {
                record.status = RunStatus::Completed;
                record.pending_checkpoint = None;
                record.updated_at = Utc::now();
                self.store.save(&record).await?;
                self.events.emit(WorkflowEvent::new(run_id.0, EventKind::WorkflowCompleted, None, json!({"rejected_at": checkpoint_label(checkpoint)}))).await;
                return Ok(record);
            }
            DecisionKind::Edit => {
                let data = decision.edited_data.ok_or(WorkflowError::MissingEditedData)?;
                apply_edit(checkpoint, &mut record.state, &data)?;
            }
            DecisionKind::Approve => {}
        }

        let next = match checkpoint {
            CheckpointType::SelectProblem => Node::Continuation,
            CheckpointType::ApproveProposal => Node::Evaluation,
            CheckpointType::ReviewEvaluation => Node::Synthesis,
        };

        self.advance(run_id, record.state, next, record.errors).await
    }

    pub async fn get_state(&self, run_id: RunId) -> Result<RunRecord, WorkflowError> {
        self.store.get(run_id).await?.ok_or(WorkflowError::RunNotFound(run_id))
    }

    pub async fn list(&self) -> Result<Vec<RunRecord>, WorkflowError> {
        Ok(self.store.list().await?)
    }

    /// Idempotent: cancelling an already-terminal run is a no-op.
    pub async fn cancel(&self, run_id: RunId) -> Result<(), WorkflowError> {
        self.cancel_flags.insert(run_id, true);
        if let Some(mut record) = self.store.get(run_id).await? {
            if !matches!(record.status, RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled) {
                record.status = RunStatus::Cancelled;
                record.pending_checkpoint = None;
                record.updated_at = Utc::now();
                self.store.save(&record).await?;
                self.events.emit(WorkflowEvent::new(run_id.0, EventKind::WorkflowCancelled, None, Value::Null)).await;
            }
        }
        Ok(())
    }

    async fn advance(&self, run_id: RunId, mut state: WorkflowState, mut from: Node, mut errors: Vec<String>) -> Result<RunRecord, WorkflowError> {
        loop {
            if self.is_cancelled(run_id) {
                return self.finalize_cancelled(run_id, state, errors).await;
            }

            match from {
                Node::Ranking => {
                    match self.run_agent(&self.ranking, state.clone(), "ranking", run_id).await {
                        Ok(s) => state = s,
                        Err(e) => errors.push(e.to_string()),
                    }
                    if self.checkpoints.select_problem_required {
                        return self.pause(run_id, state, errors, CheckpointType::SelectProblem).await;
                    }
                    if let Some(top) = state.ranked.first() {
                        state.selected_problem_id = Some(top.problem_id);
                    } else {
                        errors.push("no ranked candidates to auto-select".to_string());
                    }
                    from = Node::Continuation;
                }
                Node::Continuation => {
                    match self.run_agent(&self.continuation, state.clone(), "continuation", run_id).await {
                        Ok(s) => state = s,
                        Err(e) => errors.push(e.to_string()),
                    }
                    if self.checkpoints.approve_proposal_required {
                        return self.pause(run_id, state, errors, CheckpointType::ApproveProposal).await;
                    }
                    from = Node::Evaluation;
                }
                Node::Evaluation => {
                    match self.run_agent(&self.evaluation, state.clone(), "evaluation", run_id).await {
                        Ok(s) => state = s,
                        Err(e) => errors.push(e.to_string()),
                    }
                    if self.checkpoints.review_evaluation_required {
                        return self.pause(run_id, state, errors, CheckpointType::ReviewEvaluation).await;
                    }
                    from = Node::Synthesis;
                }
                Node::Synthesis => {
                    match self.run_agent(&self.synthesis, state.clone(), "synthesis", run_id).await {
                        Ok(s) => state = s,
                        Err(e) => errors.push(e.to_string()),
                    }
                    return self.complete(run_id, state, errors).await;
                }
            }
        }
    }

    async fn run_agent(&self, agent: &Arc<dyn Agent>, state: WorkflowState, label: &str, run_id: RunId) -> Result<WorkflowState, crate::agents::AgentError> {
        self.events.emit(WorkflowEvent::new(run_id.0, EventKind::StepStarted, Some(label), Value::Null)).await;
        let result = agent.run(state).await;
        if result.is_ok() {
            self.events.emit(WorkflowEvent::new(run_id.0, EventKind::StepCompleted, Some(label), Value::Null)).await;
        }
        result
    }

    async fn pause(&self, run_id: RunId, state: WorkflowState, errors: Vec<String>, checkpoint: CheckpointType) -> Result<RunRecord, WorkflowError> {
        let mut record = RunRecord::new(run_id, state);
        record.status = RunStatus::PausedAtCheckpoint;
        record.pending_checkpoint = Some(checkpoint);
        record.errors = errors;
        self.store.save(&record).await?;
        info!(run_id = %run_id, checkpoint = checkpoint_label(checkpoint), "workflow paused at checkpoint");
        self.events
            .emit(WorkflowEvent::new(run_id.0, EventKind::CheckpointReached, Some(checkpoint_label(checkpoint)), Value::Null))
            .await;
        Ok(record)
    }

    async fn complete(&self, run_id: RunId, state: WorkflowState, errors: Vec<String>) -> Result<RunRecord, WorkflowError> {
        let mut record = RunRecord::new(run_id, state);
        record.status = RunStatus::Completed;
        record.errors = errors;
        self.store.save(&record).await?;
        self.events.emit(WorkflowEvent::new(run_id.0, EventKind::WorkflowCompleted, None, Value::Null)).await;
        Ok(record)
    }

    async fn finalize_cancelled(&self, run_id: RunId, state: WorkflowState, errors: Vec<String>) -> Result<RunRecord, WorkflowError> {
        let mut record = RunRecord::new(run_id, state);
        record.status = RunStatus::Cancelled;
        record.errors = errors;
        self.store.save(&record).await?;
        self.events.emit(WorkflowEvent::new(run_id.0, EventKind::WorkflowCancelled, None, Value::Null)).await;
        Ok(record)
    }
}

fn checkpoint_label(checkpoint: CheckpointType) -> &'static str {
    match checkpoint {
        CheckpointType::SelectProblem => "select_problem",
        CheckpointType::ApproveProposal => "approve_proposal",
        CheckpointType::ReviewEvaluation => "review_evaluation",
    }
}

fn decision_label(kind: DecisionKind) -> &'static str {
    match kind {
        DecisionKind::Approve => "approve",
        DecisionKind::Reject => "reject",
        DecisionKind::Edit => "edit",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::continuation::ContinuationAgent;
    use crate::agents::evaluation::EvaluationAgent;
    use crate::agents::llm::{
        ContinuationProposal, EvaluationOutcome, MetricComparison, RankedProblem, ResearchLlm, SynthesisOutput, Verdict,
    };
    use crate::agents::ranking::RankingAgent;
    use crate::agents::synthesis::SynthesisAgent;
    use crate::agents::AgentError;
    use crate::graph::models::{Constraint, Evidence, ExtractionMetadata, Problem, ProblemId};
    use crate::graph::repository::InMemoryRepository;
    use crate::sandbox::{ExecutionResult, SandboxError, SandboxRunner};
    use async_trait::async_trait;
    use std::collections::HashMap;

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
            Ok(ExecutionResult {
                exit_code: 0,
                stdout: "{}".into(),
                stderr: String::new(),
                stdout_truncated: false,
                stderr_truncated: false,
                execution_time_ms: 5,
                timed_out: false,
            })
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
            Arc::new(super::super::store::InMemoryWorkflowStore::new()),
            Arc::new(EventBus::new()),
            checkpoints,
            WorkflowEngineConfig { default_candidate_limit: 10 },
        )
    }

    fn all_required() -> CheckpointConfig {
        CheckpointConfig { select_problem_required: true, approve_proposal_required: true, review_evaluation_required: true }
    }

    fn none_required() -> CheckpointConfig {
        CheckpointConfig { select_problem_required: false, approve_proposal_required: false, review_evaluation_required: false }
    }

    #[tokio::test]
    async fn start_pauses_at_select_problem() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.put_problem(problem()).await.unwrap();
        let engine = build_engine(repo, all_required());

        let run_id = engine.start(StartParams::default()).await.unwrap();
        let record = engine.get_state(run_id).await.unwrap();
        assert_eq!(record.status, RunStatus::PausedAtCheckpoint);
        assert_eq!(record.pending_checkpoint, Some(CheckpointType::SelectProblem));
    }

    #[tokio::test]
    async fn full_happy_path_with_all_checkpoints_required() {
        let repo = Arc::new(InMemoryRepository::new());
        let p = problem();
        let pid = p.id;
        repo.put_problem(p).await.unwrap();
        let engine = build_engine(repo, all_required());

        let run_id = engine.start(StartParams::default()).await.unwrap();

        let record = engine
            .resume(run_id, CheckpointType::SelectProblem, Decision { kind: DecisionKind::Edit, feedback: None, edited_data: Some(json!({"problem_id": pid.0.to_string()})) })
            .await
            .unwrap();
        assert_eq!(record.pending_checkpoint, Some(CheckpointType::ApproveProposal));

        let record = engine.resume(run_id, CheckpointType::ApproveProposal, Decision { kind: DecisionKind::Approve, feedback: None, edited_data: None }).await.unwrap();
        assert_eq!(record.pending_checkpoint, Some(CheckpointType::ReviewEvaluation));

        let record = engine.resume(run_id, CheckpointType::ReviewEvaluation, Decision { kind: DecisionKind::Approve, feedback: None, edited_data: None }).await.unwrap();
        assert_eq!(record.status, RunStatus::Completed);
        assert!(record.state.synthesis.is_some());
    }

    #[tokio::test]
    async fn reject_short_circuits_to_end() {
        let repo = Arc::new(InMemoryRepository::new());
        let p = problem();
        let pid = p.id;
        repo.put_problem(p).await.unwrap();
        let engine = build_engine(repo, all_required());

        let run_id = engine.start(StartParams::default()).await.unwrap();
        let _ = pid;
        let record = engine.resume(run_id, CheckpointType::SelectProblem, Decision { kind: DecisionKind::Reject, feedback: Some("no".into()), edited_data: None }).await.unwrap();
        assert_eq!(record.status, RunStatus::Completed);
        assert!(record.pending_checkpoint.is_none());
        assert!(record.state.proposal.is_none());
    }

    #[tokio::test]
    async fn no_checkpoints_required_runs_straight_through() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.put_problem(problem()).await.unwrap();
        let engine = build_engine(repo, none_required());

        let run_id = engine.start(StartParams::default()).await.unwrap();
        let record = engine.get_state(run_id).await.unwrap();
        assert_eq!(record.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn resume_with_mismatched_checkpoint_fails() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.put_problem(problem()).await.unwrap();
        let engine = build_engine(repo, all_required());

        let run_id = engine.start(StartParams::default()).await.unwrap();
        let result = engine.resume(run_id, CheckpointType::ApproveProposal, Decision { kind: DecisionKind::Approve, feedback: None, edited_data: None }).await;
        assert!(matches!(result, Err(WorkflowError::CheckpointMismatch { .. })));
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_marks_terminal() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.put_problem(problem()).await.unwrap();
        let engine = build_engine(repo, all_required());

        let run_id = engine.start(StartParams::default()).await.unwrap();
        engine.cancel(run_id).await.unwrap();
        let record = engine.get_state(run_id).await.unwrap();
        assert_eq!(record.status, RunStatus::Cancelled);

        engine.cancel(run_id).await.unwrap();
        let record_again = engine.get_state(run_id).await.unwrap();
        assert_eq!(record_again.status, RunStatus::Cancelled);
    }
}
