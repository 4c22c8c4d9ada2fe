//! Typed-output LLM contract the four research agents depend on
//! (§4.17, AMBIENT Agent contract).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::models::{Problem, ProblemId, ProblemRelationKind};

use super::AgentError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedProblem {
    pub problem_id: ProblemId,
    pub score: f32,
    pub rationale: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuationProposal {
    pub title: String,
    pub methodology: String,
    pub experimental_steps: Vec<String>,
    pub expected_outcome: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Promising,
    Inconclusive,
    NotViable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub verdict: Verdict,
    pub feasibility: f32,
    pub metrics: HashMap<String, Value>,
    pub timed_out: bool,
    pub sandbox_failed: bool,
}

/// The LLM's read on whether the generated script's metrics beat the
/// problem's recorded baselines; the deterministic verdict table in
/// §4.17 consumes `any_metric_improved` alongside the sandbox outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricComparison {
    pub any_metric_improved: bool,
    pub notes: String,
}

/// Which endpoint a proposed relation refers to: an already-persisted
/// problem, or one of the new problems proposed in the same synthesis
/// call (by its index in `SynthesisOutput::new_problems`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum RelationEndpoint {
    Existing(ProblemId),
    NewProblem(usize),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedProblem {
    pub statement: String,
    pub domain: String,
    pub assumptions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedRelation {
    pub from: RelationEndpoint,
    pub to: RelationEndpoint,
    pub kind: ProblemRelationKind,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisOutput {
    pub summary: String,
    pub new_problems: Vec<ProposedProblem>,
    pub proposed_relations: Vec<ProposedRelation>,
}

/// Everything the four research agents need from the LLM, composed
/// into one contract the way `ProblemExtractionClient` composes
/// extraction's single LLM dependency.
#[async_trait]
pub trait ResearchLlm: Send + Sync {
    async fn rank_problems(&self, candidates: &[Problem]) -> Result<Vec<RankedProblem>, AgentError>;

    async fn propose_continuation(&self, problem: &Problem, related: &[Problem]) -> Result<ContinuationProposal, AgentError>;

    async fn generate_evaluation_script(&self, problem: &Problem, proposal: &ContinuationProposal) -> Result<String, AgentError>;

    async fn interpret_evaluation(
        &self,
        problem: &Problem,
        stdout: &str,
        metrics: &HashMap<String, Value>,
    ) -> Result<MetricComparison, AgentError>;

    async fn synthesize(
        &self,
        problem: &Problem,
        proposal: &ContinuationProposal,
        evaluation: &EvaluationOutcome,
    ) -> Result<SynthesisOutput, AgentError>;
}
