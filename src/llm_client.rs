//! Concrete LLM and embedding backend for the CLI binary.
//!
//! `crates/core` specifies its LLM and embedding needs only as traits
//! (`ResearchLlm`, `ProblemExtractionClient`, `EmbeddingProvider`,
//! `MatchingLlm`) so the property graph, the agents, and the matching
//! pipeline stay testable without a live model. This module supplies
//! the one concrete implementation the binary actually runs with,
//! auto-detected from the environment the way the teacher's
//! `http_input::llm_client::LlmClient::from_env` picks a provider.
//!
//! All four traits are served by two HTTP calls: `chat_json` posts to
//! an OpenAI-compatible chat-completions endpoint and parses a JSON
//! object out of the reply content, and `embed` posts to an
//! embeddings endpoint. Anthropic is intentionally not supported here
//! since its Messages API has no embeddings endpoint, and this binary
//! needs both from the same provider.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use agentic_kg_core::agents::llm::{ContinuationProposal, EvaluationOutcome, MetricComparison, RankedProblem, ResearchLlm, SynthesisOutput};
use agentic_kg_core::agents::AgentError;
use agentic_kg_core::extraction::embeddings::EmbeddingProvider;
use agentic_kg_core::extraction::problem_extractor::{ProblemExtractionClient, RawExtractedProblem};
use agentic_kg_core::extraction::ExtractionError;
use agentic_kg_core::graph::models::{Embedding, Problem, EMBEDDING_DIM};
use agentic_kg_core::matching::workflow::{ArbiterDecision, ConsensusRound, EvaluatorDecision, MatchingLlm, ScoredCandidate};
use agentic_kg_core::matching::MatchingError;
use agentic_kg_core::graph::models::ProblemMention;

#[derive(Debug, thiserror::Error)]
pub enum LlmClientError {
    #[error("llm request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("llm api error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("no content in llm response")]
    NoContent,
    #[error("llm response was not the expected JSON shape: {0}")]
    InvalidJson(String),
    #[error("embedding response had {0} dimensions, expected {EMBEDDING_DIM}")]
    WrongEmbeddingDimension(usize),
}

impl From<LlmClientError> for AgentError {
    fn from(e: LlmClientError) -> Self {
        AgentError::Llm(e.to_string())
    }
}

impl From<LlmClientError> for ExtractionError {
    fn from(e: LlmClientError) -> Self {
        match e {
            LlmClientError::WrongEmbeddingDimension(_) => ExtractionError::Embedding(e.to_string()),
            _ => ExtractionError::Llm(e.to_string()),
        }
    }
}

impl From<LlmClientError> for MatchingError {
    fn from(e: LlmClientError) -> Self {
        MatchingError::Llm(e.to_string())
    }
}

/// `OPENROUTER_API_KEY` and `OPENAI_API_KEY` both speak the same
/// OpenAI-compatible wire format; only the base URL and default model
/// differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provider {
    OpenRouter,
    OpenAI,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::OpenRouter => write!(f, "OpenRouter"),
            Provider::OpenAI => write!(f, "OpenAI"),
        }
    }
}

/// HTTP-backed implementation of every LLM-shaped trait `crates/core`
/// exposes, plus embeddings. One client, one provider, shared across
/// the extraction, ranking, continuation, evaluation, synthesis, and
/// matching call sites.
#[derive(Clone)]
pub struct HttpLlmClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    embedding_model: String,
    provider: Provider,
}

impl HttpLlmClient {
    /// Auto-detect a provider from the environment, checking
    /// `OPENROUTER_API_KEY` before `OPENAI_API_KEY`. Returns `None` if
    /// neither is set, so callers can run extraction/workflow commands
    /// that only need the repository and degrade cleanly otherwise.
    pub fn from_env() -> Option<Self> {
        let client = reqwest::Client::builder().timeout(std::time::Duration::from_secs(120)).build().ok()?;

        if let Ok(api_key) = std::env::var("OPENROUTER_API_KEY") {
            let model = std::env::var("OPENROUTER_MODEL").unwrap_or_else(|_| "anthropic/claude-sonnet-4".to_string());
            let base_url = std::env::var("OPENROUTER_BASE_URL").unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string());
            let embedding_model = std::env::var("OPENROUTER_EMBEDDING_MODEL").unwrap_or_else(|_| "openai/text-embedding-3-small".to_string());
            tracing::info!(provider = %Provider::OpenRouter, %model, "llm client initialized");
            return Some(Self { client, api_key, base_url, model, embedding_model, provider: Provider::OpenRouter });
        }

        if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
            let model = std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
            let base_url = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
            let embedding_model = std::env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "text-embedding-3-small".to_string());
            tracing::info!(provider = %Provider::OpenAI, %model, "llm client initialized");
            return Some(Self { client, api_key, base_url, model, embedding_model, provider: Provider::OpenAI });
        }

        tracing::info!("no LLM API key found in environment (OPENROUTER_API_KEY / OPENAI_API_KEY); LLM-backed commands are unavailable");
        None
    }

    /// Send a chat-completion request and parse the reply content as
    /// the given JSON-deserializable type, instructing the model to
    /// answer with nothing but a JSON value.
    async fn chat_json<T: DeserializeOwned>(&self, system: &str, user: &str) -> Result<T, LlmClientError> {
        let system = format!("{system}\n\nRespond with a single JSON value and nothing else: no prose, no markdown fences.");
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ],
            "max_tokens": 4096,
            "temperature": 0.3,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(LlmClientError::Api { status: status.as_u16(), body });
        }

        let parsed: Value = response.json().await?;
        let content = parsed
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or(LlmClientError::NoContent)?;

        let content = content.trim().trim_start_matches("```json").trim_start_matches("```").trim_end_matches("```").trim();
        serde_json::from_str(content).map_err(|e| LlmClientError::InvalidJson(e.to_string()))
    }

    async fn embed(&self, text: &str) -> Result<Embedding, LlmClientError> {
        let body = serde_json::json!({ "model": self.embedding_model, "input": text });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(LlmClientError::Api { status: status.as_u16(), body });
        }

        let parsed: Value = response.json().await?;
        let values: Vec<f32> = parsed
            .get("data")
            .and_then(|d| d.get(0))
            .and_then(|d| d.get("embedding"))
            .and_then(|e| e.as_array())
            .ok_or(LlmClientError::NoContent)?
            .iter()
            .filter_map(|v| v.as_f64())
            .map(|v| v as f32)
            .collect();

        Embedding::new(values.clone()).map_err(|_| LlmClientError::WrongEmbeddingDimension(values.len()))
    }
}

#[async_trait]
impl ResearchLlm for HttpLlmClient {
    async fn rank_problems(&self, candidates: &[Problem]) -> Result<Vec<RankedProblem>, AgentError> {
        let user = serde_json::to_string(candidates).map_err(|e| AgentError::Llm(e.to_string()))?;
        self.chat_json(
            "You rank open research problems by how promising a next continuation would be. \
             Return a JSON array of objects with fields problem_id (string UUID), score (0.0-1.0), rationale (string), \
             one per input problem.",
            &user,
        )
        .await
        .map_err(Into::into)
    }

    async fn propose_continuation(&self, problem: &Problem, related: &[Problem]) -> Result<ContinuationProposal, AgentError> {
        let user = serde_json::json!({ "problem": problem, "related_problems": related }).to_string();
        self.chat_json(
            "You propose a concrete experimental continuation for a research problem, grounded in its related problems. \
             Return a JSON object with fields title, methodology, experimental_steps (array of strings), expected_outcome, \
             confidence (0.0-1.0).",
            &user,
        )
        .await
        .map_err(Into::into)
    }

    async fn generate_evaluation_script(&self, problem: &Problem, proposal: &ContinuationProposal) -> Result<String, AgentError> {
        let user = serde_json::json!({ "problem": problem, "proposal": proposal }).to_string();
        #[derive(serde::Deserialize)]
        struct ScriptOut {
            script: String,
        }
        let out: ScriptOut = self
            .chat_json(
                "Write a short, self-contained Python script that evaluates the proposed continuation and prints a single \
                 JSON object of metric name to numeric value on stdout. Return a JSON object with one field, script, \
                 containing the script source as a string.",
                &user,
            )
            .await?;
        Ok(out.script)
    }

    async fn interpret_evaluation(&self, problem: &Problem, stdout: &str, metrics: &HashMap<String, Value>) -> Result<MetricComparison, AgentError> {
        let user = serde_json::json!({ "problem": problem, "stdout": stdout, "metrics": metrics }).to_string();
        self.chat_json(
            "You decide whether the evaluation's metrics improve on the problem's recorded baselines. \
             Return a JSON object with fields any_metric_improved (bool), notes (string).",
            &user,
        )
        .await
        .map_err(Into::into)
    }

    async fn synthesize(&self, problem: &Problem, proposal: &ContinuationProposal, evaluation: &EvaluationOutcome) -> Result<SynthesisOutput, AgentError> {
        let user = serde_json::json!({ "problem": problem, "proposal": proposal, "evaluation": evaluation }).to_string();
        self.chat_json(
            "You synthesize the outcome of a research continuation into a summary and any new follow-on problems or \
             relations it surfaces. Return a JSON object with fields summary (string), new_problems (array of objects with \
             statement, domain, assumptions), proposed_relations (array of objects with from, to, kind, confidence).",
            &user,
        )
        .await
        .map_err(Into::into)
    }
}

#[async_trait]
impl ProblemExtractionClient for HttpLlmClient {
    async fn extract(&self, prompt: &str) -> Result<Vec<RawExtractedProblem>, ExtractionError> {
        self.chat_json(
            "You extract open research problems stated or implied in a section of a paper. Return a JSON array of objects \
             with fields statement (string), confidence (0.0-1.0), quoted_text (the exact supporting quote from the \
             section). Return an empty array if the section states no problem.",
            prompt,
        )
        .await
        .map_err(Into::into)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpLlmClient {
    async fn embed_one(&self, text: &str) -> Result<Embedding, ExtractionError> {
        self.embed(text).await.map_err(Into::into)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Option<Embedding>>, ExtractionError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await.ok());
        }
        Ok(out)
    }
}

#[async_trait]
impl MatchingLlm for HttpLlmClient {
    async fn evaluate(&self, mention: &ProblemMention, candidate: &ScoredCandidate) -> Result<EvaluatorDecision, MatchingError> {
        let user = serde_json::json!({ "mention": mention, "candidate_statement": candidate.concept.canonical_statement, "similarity": candidate.similarity }).to_string();
        self.chat_json(
            "You decide whether a newly mentioned research problem statement is the same underlying concept as a \
             candidate concept, a different concept, or too uncertain to decide alone. Return a JSON object with one \
             field, decision, one of \"approve\", \"reject\", \"escalate\".",
            &user,
        )
        .await
        .map_err(Into::into)
        .and_then(|v: Value| match v.get("decision").and_then(|d| d.as_str()) {
            Some("approve") => Ok(EvaluatorDecision::Approve),
            Some("reject") => Ok(EvaluatorDecision::Reject),
            Some("escalate") => Ok(EvaluatorDecision::Escalate),
            other => Err(MatchingError::Llm(format!("unexpected evaluator decision: {other:?}"))),
        })
    }

    async fn maker_argument(&self, mention: &ProblemMention, candidate: &ScoredCandidate, rounds: &[ConsensusRound]) -> Result<String, MatchingError> {
        let user = serde_json::json!({ "mention": mention, "candidate_statement": candidate.concept.canonical_statement, "prior_rounds": rounds.len() }).to_string();
        #[derive(serde::Deserialize)]
        struct Out {
            argument: String,
        }
        let out: Out = self
            .chat_json("Argue, as the Maker, that the mention and candidate are the same concept. Return a JSON object with field argument.", &user)
            .await
            .map_err(Into::into)?;
        Ok(out.argument)
    }

    async fn hater_argument(&self, mention: &ProblemMention, candidate: &ScoredCandidate, maker_argument: &str) -> Result<String, MatchingError> {
        let user = serde_json::json!({ "mention": mention, "candidate_statement": candidate.concept.canonical_statement, "maker_argument": maker_argument }).to_string();
        #[derive(serde::Deserialize)]
        struct Out {
            argument: String,
        }
        let out: Out = self
            .chat_json(
                "Argue, as the Hater, against the Maker's claim that the mention and candidate are the same concept. \
                 Return a JSON object with field argument.",
                &user,
            )
            .await
            .map_err(Into::into)?;
        Ok(out.argument)
    }

    async fn arbiter_decision(&self, mention: &ProblemMention, candidate: &ScoredCandidate, maker_argument: &str, hater_argument: &str) -> Result<ArbiterDecision, MatchingError> {
        let user = serde_json::json!({
            "mention": mention,
            "candidate_statement": candidate.concept.canonical_statement,
            "maker_argument": maker_argument,
            "hater_argument": hater_argument,
        })
        .to_string();
        #[derive(serde::Deserialize)]
        struct Out {
            outcome: String,
            confidence: f32,
        }
        let out: Out = self
            .chat_json(
                "As the Arbiter, weigh the Maker's and Hater's arguments and decide. Return a JSON object with fields \
                 outcome (one of \"link\", \"create_new\") and confidence (0.0-1.0).",
                &user,
            )
            .await
            .map_err(Into::into)?;
        let outcome = match out.outcome.as_str() {
            "link" => agentic_kg_core::matching::workflow::ArbiterOutcome::Link,
            "create_new" => agentic_kg_core::matching::workflow::ArbiterOutcome::CreateNew,
            other => return Err(MatchingError::Llm(format!("unexpected arbiter outcome: {other}"))),
        };
        Ok(ArbiterDecision { outcome, confidence: out.confidence })
    }
}
