//! CLI-wide wiring: builds the shared `AgenticKg` facade, the matching
//! pipeline, and the workflow engine from `RuntimeConfig` plus whatever
//! LLM backend is available in the environment. Mirrors the teacher's
//! `up` command building one `AgentRuntime` from its `RuntimeConfig`
//! and handing it to every subcommand.

use std::collections::HashMap;
use std::sync::Arc;

use agentic_kg_core::acquisition::aggregator::Aggregator;
use agentic_kg_core::acquisition::cache::ResponseCache;
use agentic_kg_core::acquisition::circuit_breaker::CircuitBreaker;
use agentic_kg_core::acquisition::clients::arxiv::ArxivClient;
use agentic_kg_core::acquisition::clients::openalex::OpenAlexClient;
use agentic_kg_core::acquisition::clients::semantic_scholar::SemanticScholarClient;
use agentic_kg_core::acquisition::clients::SourceClient;
use agentic_kg_core::acquisition::rate_limiter::RateLimiter;
use agentic_kg_core::acquisition::Source;
use agentic_kg_core::agents::continuation::ContinuationAgent;
use agentic_kg_core::agents::evaluation::EvaluationAgent;
use agentic_kg_core::agents::ranking::RankingAgent;
use agentic_kg_core::agents::synthesis::SynthesisAgent;
use agentic_kg_core::agents::Agent;
use agentic_kg_core::events::EventBus;
use agentic_kg_core::graph::repository::{InMemoryRepository, Repository};
use agentic_kg_core::matching::concept_matcher::ConceptMatcher;
use agentic_kg_core::matching::review_queue::ReviewQueue;
use agentic_kg_core::matching::workflow::MatchingWorkflow;
use agentic_kg_core::sandbox::native::{NativeConfig, NativeSandboxRunner};
use agentic_kg_core::sandbox::SandboxRunner;
use agentic_kg_core::workflow::engine::WorkflowEngine;
use agentic_kg_core::workflow::store::{InMemoryWorkflowStore, WorkflowStore};
use agentic_kg_core::AgenticKg;

use crate::llm_client::HttpLlmClient;

/// Everything the CLI's subcommands need, built once in `main` and
/// passed down by reference. `llm` is `None` when no provider API key
/// is set in the environment; commands that need one report a clear
/// error instead of panicking.
pub struct CliContext {
    pub kg: AgenticKg,
    pub llm: Option<HttpLlmClient>,
    pub workflow_store: Arc<dyn WorkflowStore>,
}

impl CliContext {
    pub fn build() -> Self {
        let runtime_config = agentic_kg_core::RuntimeConfig::from_env();
        let repository: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());

        let aggregator = Arc::new(build_aggregator(&runtime_config.acquisition));
        let kg = AgenticKg::new(repository, aggregator, runtime_config);
        let llm = HttpLlmClient::from_env();
        let workflow_store: Arc<dyn WorkflowStore> = Arc::new(InMemoryWorkflowStore::new());

        Self { kg, llm, workflow_store }
    }

    pub fn matching_workflow(&self) -> Option<MatchingWorkflow<HttpLlmClient>> {
        let llm = self.llm.clone()?;
        let matcher = Arc::new(ConceptMatcher::new(self.kg.repository.clone(), self.kg.config().matcher.clone()));
        let review_queue = Arc::new(ReviewQueue::new(self.kg.repository.clone(), agentic_kg_core::matching::review_queue::SlaConfig::default()));
        Some(MatchingWorkflow::new(matcher, review_queue, self.kg.repository.clone(), llm))
    }

    /// Build a fresh `WorkflowEngine`. Cheap enough to call per command
    /// invocation since every collaborator it holds is an `Arc`/clone.
    pub fn workflow_engine(&self) -> Result<WorkflowEngine, anyhow::Error> {
        let llm = self.llm.clone().ok_or_else(|| anyhow::anyhow!("no LLM backend configured (set OPENROUTER_API_KEY or OPENAI_API_KEY)"))?;
        let repo = self.kg.repository.clone();

        let sandbox_cfg = &self.kg.config().sandbox;
        let mut native = NativeConfig::default();
        native.timeout = std::time::Duration::from_secs(sandbox_cfg.timeout_secs);
        native.memory_mb = sandbox_cfg.memory_mb;
        native.cpu_cores = sandbox_cfg.cpu_cores;
        native.network_disabled = sandbox_cfg.network_disabled;
        native.read_only_root = sandbox_cfg.read_only_root;
        let sandbox: Arc<dyn SandboxRunner> = Arc::new(NativeSandboxRunner::new(native)?);

        let ranking: Arc<dyn Agent> = Arc::new(RankingAgent::new(repo.clone(), llm.clone()));
        let continuation: Arc<dyn Agent> = Arc::new(ContinuationAgent::new(repo.clone(), llm.clone()));
        let evaluation: Arc<dyn Agent> = Arc::new(EvaluationAgent::new(repo.clone(), sandbox, llm.clone()));
        let synthesis: Arc<dyn Agent> = Arc::new(SynthesisAgent::new(repo, llm));

        Ok(WorkflowEngine::new(
            ranking,
            continuation,
            evaluation,
            synthesis,
            self.workflow_store.clone(),
            Arc::new(EventBus::new()),
            self.kg.config().checkpoints.clone(),
            self.kg.config().workflow.clone(),
        ))
    }
}

/// Wire the three acquisition source clients, sharing one circuit
/// breaker / rate limiter / cache per source the way `up` shares one
/// `AgentRuntime`'s resource pools across its scheduled agents.
fn build_aggregator(config: &agentic_kg_core::config::AcquisitionConfig) -> Aggregator {
    let mut clients: HashMap<Source, Arc<dyn SourceClient>> = HashMap::new();

    let s2_breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone()));
    let s2_limiter = Arc::new(RateLimiter::new(config.semantic_scholar_rate));
    let s2_cache = Arc::new(ResponseCache::new(config.cache.clone()));
    clients.insert(
        Source::SemanticScholar,
        Arc::new(SemanticScholarClient::new(
            std::env::var("SEMANTIC_SCHOLAR_API_KEY").ok(),
            s2_breaker,
            s2_limiter,
            s2_cache,
            config.retry,
        )),
    );

    let arxiv_breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone()));
    let arxiv_limiter = Arc::new(RateLimiter::new(config.arxiv_rate));
    let arxiv_cache = Arc::new(ResponseCache::new(config.cache.clone()));
    clients.insert(Source::Arxiv, Arc::new(ArxivClient::new(arxiv_breaker, arxiv_limiter, arxiv_cache, config.retry)));

    let openalex_breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone()));
    let openalex_limiter = Arc::new(RateLimiter::new(config.openalex_rate));
    let openalex_cache = Arc::new(ResponseCache::new(config.cache.clone()));
    clients.insert(
        Source::OpenAlex,
        Arc::new(OpenAlexClient::new(std::env::var("OPENALEX_MAILTO").ok(), openalex_breaker, openalex_limiter, openalex_cache, config.retry)),
    );

    Aggregator::new(clients)
}
