//! Aggregate runtime configuration.
//!
//! Mirrors `runtime/src/lib.rs`'s `RuntimeConfig`, which composes each
//! subsystem's own `*Config` struct. Every field named in spec §6
//! "Configuration" has an environment-variable binding and a default,
//! read via the small `env_*` helpers below.

use std::time::Duration;

use crate::acquisition::cache::CacheConfig;
use crate::acquisition::circuit_breaker::CircuitBreakerConfig;
use crate::acquisition::pdf_cache::PdfCacheConfig;
use crate::acquisition::rate_limiter::RateLimiterConfig;
use crate::acquisition::retry::RetryPolicy;
use crate::matching::concept_matcher::MatcherConfig;
use crate::workflow::engine::WorkflowEngineConfig;

pub(crate) fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub(crate) fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub(crate) fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub(crate) fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Some(true),
            "0" | "false" | "no" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

pub(crate) fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_u64(key, default_secs))
}

/// Graph repository connection configuration.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub pool_size: u32,
    pub acquisition_timeout: Duration,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: env_string("AGENTIC_KG_GRAPH_URI", "bolt://localhost:7687"),
            user: env_string("AGENTIC_KG_GRAPH_USER", "neo4j"),
            password: env_string("AGENTIC_KG_GRAPH_PASSWORD", ""),
            database: env_string("AGENTIC_KG_GRAPH_DATABASE", "neo4j"),
            pool_size: env_u64("AGENTIC_KG_GRAPH_POOL_SIZE", 10) as u32,
            acquisition_timeout: env_duration_secs("AGENTIC_KG_GRAPH_ACQUIRE_TIMEOUT_SECS", 30),
        }
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub api_key: String,
    pub model: String,
    pub batch_size: usize,
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: env_string("AGENTIC_KG_EMBEDDING_API_KEY", ""),
            model: env_string("AGENTIC_KG_EMBEDDING_MODEL", "text-embedding-3-small"),
            batch_size: env_u64("AGENTIC_KG_EMBEDDING_BATCH_SIZE", 64) as usize,
            dimension: env_u64("AGENTIC_KG_EMBEDDING_DIMENSION", 1536) as usize,
        }
    }
}

/// Per-source acquisition configuration: rate limit, circuit breaker, retry.
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    pub semantic_scholar_rate: RateLimiterConfig,
    pub arxiv_rate: RateLimiterConfig,
    pub openalex_rate: RateLimiterConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryPolicy,
    pub cache: CacheConfig,
    pub pdf_cache: PdfCacheConfig,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            semantic_scholar_rate: RateLimiterConfig {
                rate_per_sec: env_f64("AGENTIC_KG_S2_RATE_PER_SEC", 1.0),
                burst_multiplier: env_f64("AGENTIC_KG_S2_BURST_MULTIPLIER", 2.0),
            },
            arxiv_rate: RateLimiterConfig {
                rate_per_sec: env_f64("AGENTIC_KG_ARXIV_RATE_PER_SEC", 3.0),
                burst_multiplier: env_f64("AGENTIC_KG_ARXIV_BURST_MULTIPLIER", 1.5),
            },
            openalex_rate: RateLimiterConfig {
                rate_per_sec: env_f64("AGENTIC_KG_OPENALEX_RATE_PER_SEC", 10.0),
                burst_multiplier: env_f64("AGENTIC_KG_OPENALEX_BURST_MULTIPLIER", 1.5),
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: env_u64("AGENTIC_KG_CB_FAILURE_THRESHOLD", 5) as u32,
                success_threshold: env_u64("AGENTIC_KG_CB_SUCCESS_THRESHOLD", 2) as u32,
                cooldown: env_duration_secs("AGENTIC_KG_CB_COOLDOWN_SECS", 30),
            },
            retry: RetryPolicy {
                initial_backoff: Duration::from_millis(env_u64(
                    "AGENTIC_KG_RETRY_INITIAL_BACKOFF_MS",
                    250,
                )),
                max_backoff: Duration::from_millis(env_u64(
                    "AGENTIC_KG_RETRY_MAX_BACKOFF_MS",
                    30_000,
                )),
                multiplier: env_f64("AGENTIC_KG_RETRY_MULTIPLIER", 2.0),
                jitter_fraction: env_f64("AGENTIC_KG_RETRY_JITTER_FRACTION", 0.2),
                max_retries: env_u64("AGENTIC_KG_RETRY_MAX_RETRIES", 5) as u32,
            },
            cache: CacheConfig {
                max_size: env_u64("AGENTIC_KG_CACHE_MAX_SIZE", 10_000) as usize,
                paper_ttl: env_duration_secs("AGENTIC_KG_CACHE_PAPER_TTL_SECS", 7 * 24 * 3600),
                search_ttl: env_duration_secs("AGENTIC_KG_CACHE_SEARCH_TTL_SECS", 3600),
                author_ttl: env_duration_secs("AGENTIC_KG_CACHE_AUTHOR_TTL_SECS", 7 * 24 * 3600),
            },
            pdf_cache: PdfCacheConfig {
                base_dir: std::path::PathBuf::from(env_string(
                    "AGENTIC_KG_PDF_CACHE_DIR",
                    "/tmp/agentic-kg/pdf-cache",
                )),
                max_total_bytes: env_u64(
                    "AGENTIC_KG_PDF_CACHE_MAX_BYTES",
                    10 * 1024 * 1024 * 1024,
                ),
            },
        }
    }
}

/// Sandboxed evaluation execution configuration.
#[derive(Debug, Clone)]
pub struct SandboxEnvConfig {
    pub image: String,
    pub timeout_secs: u64,
    pub memory_mb: u64,
    pub cpu_cores: u32,
    pub network_disabled: bool,
    pub read_only_root: bool,
}

impl Default for SandboxEnvConfig {
    fn default() -> Self {
        Self {
            image: env_string("AGENTIC_KG_SANDBOX_IMAGE", "python:3.11-slim"),
            timeout_secs: env_u64("AGENTIC_KG_SANDBOX_TIMEOUT_SECS", 300),
            memory_mb: env_u64("AGENTIC_KG_SANDBOX_MEMORY_MB", 2048),
            cpu_cores: env_u64("AGENTIC_KG_SANDBOX_CPU_CORES", 1) as u32,
            network_disabled: env_bool("AGENTIC_KG_SANDBOX_NETWORK_DISABLED", true),
            read_only_root: env_bool("AGENTIC_KG_SANDBOX_READ_ONLY_ROOT", true),
        }
    }
}

/// Which workflow checkpoints require an explicit human decision vs.
/// auto-approving (useful for batch/offline runs and tests).
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    pub select_problem_required: bool,
    pub approve_proposal_required: bool,
    pub review_evaluation_required: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            select_problem_required: env_bool("AGENTIC_KG_CHECKPOINT_SELECT_PROBLEM", true),
            approve_proposal_required: env_bool("AGENTIC_KG_CHECKPOINT_APPROVE_PROPOSAL", true),
            review_evaluation_required: env_bool("AGENTIC_KG_CHECKPOINT_REVIEW_EVALUATION", true),
        }
    }
}

/// Aggregate configuration for the whole engine.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub graph: GraphConfig,
    pub embedding: EmbeddingConfig,
    pub acquisition: AcquisitionConfig,
    pub matcher: MatcherConfig,
    pub sandbox: SandboxEnvConfig,
    pub checkpoints: CheckpointConfig,
    pub workflow: WorkflowEngineConfig,
}

impl RuntimeConfig {
    /// Build configuration entirely from the environment (with defaults),
    /// the way a CLI entry point or service main would.
    pub fn from_env() -> Self {
        Self::default()
    }
}
