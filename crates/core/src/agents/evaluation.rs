//! Evaluation agent: generates an evaluation script, runs it in the
//! sandbox, and derives a deterministic verdict (§4.17).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::graph::repository::Repository;
use crate::sandbox::SandboxRunner;

use super::llm::{EvaluationOutcome, MetricComparison, Verdict};
use super::{Agent, AgentError, ResearchLlm, WorkflowState};

/// Strip a leading/trailing markdown code fence (```lang\n ... \n```)
/// from an LLM-generated script, if present.
pub fn strip_fence_markers(script: &str) -> String {
    let fence = Regex::new(r"(?s)^```[a-zA-Z0-9_-]*\n(.*?)\n?```\s*$").unwrap();
    match fence.captures(script.trim()) {
        Some(caps) => caps.get(1).unwrap().as_str().to_string(),
        None => script.trim().to_string(),
    }
}

fn derive_verdict(timed_out: bool, sandbox_failed: bool, any_metric_improved: bool) -> (Verdict, f32) {
    if timed_out {
        (Verdict::NotViable, 0.1)
    } else if sandbox_failed {
        (Verdict::Inconclusive, 0.3)
    } else if any_metric_improved {
        (Verdict::Promising, 0.8)
    } else {
        (Verdict::Inconclusive, 0.5)
    }
}

pub struct EvaluationAgent<L: ResearchLlm> {
    repository: Arc<dyn Repository>,
    sandbox: Arc<dyn SandboxRunner>,
    llm: L,
}

impl<L: ResearchLlm> EvaluationAgent<L> {
    pub fn new(repository: Arc<dyn Repository>, sandbox: Arc<dyn SandboxRunner>, llm: L) -> Self {
        Self { repository, sandbox, llm }
    }
}

#[async_trait]
impl<L: ResearchLlm> Agent for EvaluationAgent<L> {
    async fn run(&self, mut state: WorkflowState) -> Result<WorkflowState, AgentError> {
        let problem_id = state
            .selected_problem_id
            .ok_or_else(|| AgentError::MissingState("selected_problem_id".to_string()))?;
        let proposal = state.proposal.clone().ok_or_else(|| AgentError::MissingState("proposal".to_string()))?;
        let problem = self
            .repository
            .get_problem(problem_id)
            .await?
            .ok_or_else(|| AgentError::MissingState(format!("problem {problem_id} not found")))?;

        let raw_script = self.llm.generate_evaluation_script(&problem, &proposal).await?;
        let script = strip_fence_markers(&raw_script);

        let exec_result = self.sandbox.execute(&script, HashMap::new()).await?;
        let metrics = exec_result.parse_metrics();
        let sandbox_failed = !exec_result.timed_out && exec_result.exit_code != 0;

        let comparison = if exec_result.timed_out || sandbox_failed {
            MetricComparison { any_metric_improved: false, notes: String::new() }
        } else {
            self.llm.interpret_evaluation(&problem, &exec_result.stdout, &metrics).await?
        };

        let (verdict, feasibility) = derive_verdict(exec_result.timed_out, sandbox_failed, comparison.any_metric_improved);

        state.evaluation = Some(EvaluationOutcome {
            verdict,
            feasibility,
            metrics,
            timed_out: exec_result.timed_out,
            sandbox_failed,
        });
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::llm::{ContinuationProposal, RankedProblem, SynthesisOutput};
    use crate::graph::models::{Constraint, Evidence, ExtractionMetadata, Problem, ProblemId, ProblemStatus};
    use crate::graph::repository::InMemoryRepository;
    use crate::sandbox::ExecutionResult;
    use chrono::Utc;

    fn problem() -> Problem {
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
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn proposal() -> ContinuationProposal {
        ContinuationProposal {
            title: "t".into(),
            methodology: "m".into(),
            experimental_steps: vec![],
            expected_outcome: "o".into(),
            confidence: 0.5,
        }
    }

    struct FixedSandbox(ExecutionResult);
    #[async_trait]
    impl SandboxRunner for FixedSandbox {
        async fn execute(&self, _code: &str, _env: HashMap<String, String>) -> Result<ExecutionResult, crate::sandbox::SandboxError> {
            Ok(self.0.clone())
        }
    }

    struct StaticLlm {
        improved: bool,
    }
    #[async_trait]
    impl ResearchLlm for StaticLlm {
        async fn rank_problems(&self, _: &[Problem]) -> Result<Vec<RankedProblem>, AgentError> {
            unreachable!()
        }
        async fn propose_continuation(&self, _: &Problem, _: &[Problem]) -> Result<ContinuationProposal, AgentError> {
            unreachable!()
        }
        async fn generate_evaluation_script(&self, _: &Problem, _: &ContinuationProposal) -> Result<String, AgentError> {
            Ok("```python\nprint('{}')\n```".to_string())
        }
        async fn interpret_evaluation(&self, _: &Problem, _: &str, _: &HashMap<String, serde_json::Value>) -> Result<MetricComparison, AgentError> {
            Ok(MetricComparison { any_metric_improved: self.improved, notes: "n".into() })
        }
        async fn synthesize(&self, _: &Problem, _: &ContinuationProposal, _: &EvaluationOutcome) -> Result<SynthesisOutput, AgentError> {
            unreachable!()
        }
    }

    fn exec_result(timed_out: bool, exit_code: i32) -> ExecutionResult {
        ExecutionResult {
            exit_code,
            stdout: "{}".to_string(),
            stderr: String::new(),
            stdout_truncated: false,
            stderr_truncated: false,
            execution_time_ms: 10,
            timed_out,
        }
    }

    #[test]
    fn strips_python_fence() {
        let script = "```python\nprint('hi')\n```";
        assert_eq!(strip_fence_markers(script), "print('hi')");
    }

    #[test]
    fn leaves_unfenced_script_untouched() {
        assert_eq!(strip_fence_markers("print('hi')"), "print('hi')");
    }

    #[tokio::test]
    async fn timeout_yields_not_viable() {
        let repo = Arc::new(InMemoryRepository::new());
        let p = problem();
        let pid = p.id;
        repo.put_problem(p).await.unwrap();

        let agent = EvaluationAgent::new(repo, Arc::new(FixedSandbox(exec_result(true, 0))), StaticLlm { improved: false });
        let state = WorkflowState { selected_problem_id: Some(pid), proposal: Some(proposal()), ..Default::default() };
        let result = agent.run(state).await.unwrap();
        let eval = result.evaluation.unwrap();
        assert_eq!(eval.verdict, Verdict::NotViable);
        assert!((eval.feasibility - 0.1).abs() < 1e-6);
    }

    #[tokio::test]
    async fn nonzero_exit_yields_inconclusive_low_feasibility() {
        let repo = Arc::new(InMemoryRepository::new());
        let p = problem();
        let pid = p.id;
        repo.put_problem(p).await.unwrap();

        let agent = EvaluationAgent::new(repo, Arc::new(FixedSandbox(exec_result(false, 1))), StaticLlm { improved: false });
        let state = WorkflowState { selected_problem_id: Some(pid), proposal: Some(proposal()), ..Default::default() };
        let result = agent.run(state).await.unwrap();
        let eval = result.evaluation.unwrap();
        assert_eq!(eval.verdict, Verdict::Inconclusive);
        assert!((eval.feasibility - 0.3).abs() < 1e-6);
    }

    #[tokio::test]
    async fn improved_metric_yields_promising() {
        let repo = Arc::new(InMemoryRepository::new());
        let p = problem();
        let pid = p.id;
        repo.put_problem(p).await.unwrap();

        let agent = EvaluationAgent::new(repo, Arc::new(FixedSandbox(exec_result(false, 0))), StaticLlm { improved: true });
        let state = WorkflowState { selected_problem_id: Some(pid), proposal: Some(proposal()), ..Default::default() };
        let result = agent.run(state).await.unwrap();
        let eval = result.evaluation.unwrap();
        assert_eq!(eval.verdict, Verdict::Promising);
        assert!((eval.feasibility - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn no_improvement_yields_inconclusive_mid_feasibility() {
        let repo = Arc::new(InMemoryRepository::new());
        let p = problem();
        let pid = p.id;
        repo.put_problem(p).await.unwrap();

        let agent = EvaluationAgent::new(repo, Arc::new(FixedSandbox(exec_result(false, 0))), StaticLlm { improved: false });
        let state = WorkflowState { selected_problem_id: Some(pid), proposal: Some(proposal()), ..Default::default() };
        let result = agent.run(state).await.unwrap();
        let eval = result.evaluation.unwrap();
        assert_eq!(eval.verdict, Verdict::Inconclusive);
        assert!((eval.feasibility - 0.5).abs() < 1e-6);
    }
}
