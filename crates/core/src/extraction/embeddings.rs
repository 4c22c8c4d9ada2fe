//! Text → vector embedding, with retry, batching, and the fixed
//! embedding-input string format for `Problem`s (§4.13).

use async_trait::async_trait;

use super::ExtractionError;
use crate::acquisition::retry::{retry, RetryPolicy};
use crate::graph::models::Embedding;

/// A text→vector provider. Implementations are expected to be
/// deterministic given the same model name and input; the provider
/// itself is an external collaborator (only the contract is specified
/// here).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_one(&self, text: &str) -> Result<Embedding, ExtractionError>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Option<Embedding>>, ExtractionError>;
}

/// Build the fixed embedding-input string for a Problem, so recomputed
/// embeddings remain stable across protocol versions:
/// `"[Domain: D] STATEMENT Assumptions: A1; A2; A3"` (top 3 assumptions,
/// omitted entirely if there are none).
pub fn problem_embedding_text(domain: &str, statement: &str, assumptions: &[String]) -> String {
    let mut text = format!("[Domain: {domain}] {statement}");
    if !assumptions.is_empty() {
        let top3: Vec<&str> = assumptions.iter().take(3).map(String::as_str).collect();
        text.push_str(" Assumptions: ");
        text.push_str(&top3.join("; "));
    }
    text
}

/// Wraps an `EmbeddingProvider`, adding retry/backoff and batching into
/// chunks of at most `batch_size`, preserving input order and returning
/// `None` for inputs that could not be embedded after exhausting
/// retries.
pub struct EmbeddingService<P: EmbeddingProvider> {
    provider: P,
    retry_policy: RetryPolicy,
    batch_size: usize,
}

impl<P: EmbeddingProvider> EmbeddingService<P> {
    pub fn new(provider: P, retry_policy: RetryPolicy, batch_size: usize) -> Self {
        Self { provider, retry_policy, batch_size: batch_size.max(1) }
    }

    pub async fn embed(&self, text: &str) -> Result<Embedding, ExtractionError> {
        let policy = acquisition_retry_policy(self.retry_policy);
        retry(&policy, || async {
            self.provider
                .embed_one(text)
                .await
                .map_err(|e| crate::acquisition::AcquisitionError::Transient(e.to_string()))
        })
        .await
        .map_err(|e| ExtractionError::Embedding(e.to_string()))
    }

    /// Split `texts` into chunks of at most `batch_size`, embed each
    /// chunk, and reassemble in original order.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Option<Embedding>>, ExtractionError> {
        let mut results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            let chunk_result = self.provider.embed_batch(chunk).await?;
            results.extend(chunk_result);
        }
        Ok(results)
    }
}

fn acquisition_retry_policy(policy: RetryPolicy) -> RetryPolicy {
    policy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::models::EMBEDDING_DIM;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyOnceProvider {
        calls: AtomicU32,
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyOnceProvider {
        async fn embed_one(&self, _text: &str) -> Result<Embedding, ExtractionError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(ExtractionError::Embedding("transient failure".into()))
            } else {
                Embedding::new(vec![0.1; EMBEDDING_DIM]).map_err(|e| ExtractionError::Embedding(e.to_string()))
            }
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Option<Embedding>>, ExtractionError> {
            let mut out = Vec::new();
            for _ in texts {
                out.push(Some(
                    Embedding::new(vec![0.2; EMBEDDING_DIM]).map_err(|e| ExtractionError::Embedding(e.to_string()))?,
                ));
            }
            Ok(out)
        }
    }

    #[test]
    fn problem_embedding_text_includes_top_three_assumptions() {
        let assumptions = vec!["A1".to_string(), "A2".to_string(), "A3".to_string(), "A4".to_string()];
        let text = problem_embedding_text("ml", "statement here", &assumptions);
        assert_eq!(text, "[Domain: ml] statement here Assumptions: A1; A2; A3");
    }

    #[test]
    fn problem_embedding_text_omits_assumptions_clause_when_empty() {
        let text = problem_embedding_text("ml", "statement here", &[]);
        assert_eq!(text, "[Domain: ml] statement here");
    }

    #[tokio::test]
    async fn embed_retries_on_transient_failure() {
        let service = EmbeddingService::new(
            FlakyOnceProvider { calls: AtomicU32::new(0) },
            RetryPolicy {
                initial_backoff: std::time::Duration::from_millis(1),
                max_backoff: std::time::Duration::from_millis(2),
                multiplier: 1.0,
                jitter_fraction: 0.0,
                max_retries: 3,
            },
            16,
        );
        let embedding = service.embed("hello").await.unwrap();
        assert_eq!(embedding.as_slice().len(), EMBEDDING_DIM);
    }

    #[tokio::test]
    async fn embed_batch_splits_and_preserves_order() {
        let service = EmbeddingService::new(
            FlakyOnceProvider { calls: AtomicU32::new(1) },
            RetryPolicy::default(),
            2,
        );
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let results = service.embed_batch(&texts).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.is_some()));
    }
}
