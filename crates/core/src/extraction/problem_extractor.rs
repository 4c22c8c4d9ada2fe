//! Per-section, priority-gated problem extraction via a structured LLM
//! call (§4.12).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::prompts::extraction_prompt;
use super::segmenter::Section;
use super::ExtractionError;

/// One problem candidate as returned by the LLM, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawExtractedProblem {
    pub statement: String,
    pub confidence: f32,
    pub quoted_text: String,
}

/// A validated problem candidate, ready to be turned into a `Problem` /
/// `ProblemMention` pair by the caller.
#[derive(Debug, Clone)]
pub struct ExtractedProblem {
    pub statement: String,
    pub confidence: f32,
    pub quoted_text: String,
}

/// The structured-output contract extraction depends on. Kept local and
/// minimal rather than importing the agent workflow's LLM contract,
/// since extraction only ever needs one shape of call (prompt in,
/// typed list out).
#[async_trait]
pub trait ProblemExtractionClient: Send + Sync {
    async fn extract(&self, prompt: &str) -> Result<Vec<RawExtractedProblem>, ExtractionError>;
}

#[derive(Debug, Clone, Copy)]
pub struct ExtractorConfig {
    /// Only sections with `priority <= max_section_priority` are sent to
    /// the LLM at all.
    pub max_section_priority: u32,
    pub min_confidence: f32,
    pub min_statement_len: usize,
    pub max_per_section: usize,
    pub max_retries: u32,
    /// Whether to retry once more if the LLM returned an empty list,
    /// in case of a transient no-op response.
    pub retry_on_empty: bool,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_section_priority: 50,
            min_confidence: 0.5,
            min_statement_len: 20,
            max_per_section: 5,
            max_retries: 3,
            retry_on_empty: true,
        }
    }
}

pub struct ProblemExtractor<C: ProblemExtractionClient> {
    client: C,
    config: ExtractorConfig,
}

impl<C: ProblemExtractionClient> ProblemExtractor<C> {
    pub fn new(client: C, config: ExtractorConfig) -> Self {
        Self { client, config }
    }

    /// Run extraction over every section whose priority qualifies,
    /// returning validated problems keyed by their originating section
    /// index (position in `sections`).
    pub async fn extract_all(&self, sections: &[Section]) -> Result<Vec<(usize, ExtractedProblem)>, ExtractionError> {
        let mut out = Vec::new();
        for (idx, section) in sections.iter().enumerate() {
            if section.priority > self.config.max_section_priority {
                continue;
            }
            let found = self.extract_section(section).await?;
            for problem in found {
                out.push((idx, problem));
            }
        }
        Ok(out)
    }

    async fn extract_section(&self, section: &Section) -> Result<Vec<ExtractedProblem>, ExtractionError> {
        let prompt = extraction_prompt(section.section_type, &section.title, &section.content);
        let raw = self.call_with_retry(&prompt).await?;
        Ok(self.validate_and_cap(raw, &section.content))
    }

    async fn call_with_retry(&self, prompt: &str) -> Result<Vec<RawExtractedProblem>, ExtractionError> {
        let mut attempt = 0u32;
        loop {
            match self.client.extract(prompt).await {
                Ok(result) if result.is_empty() && self.config.retry_on_empty && attempt == 0 => {
                    attempt += 1;
                    continue;
                }
                Ok(result) => return Ok(result),
                Err(err) if attempt < self.config.max_retries => {
                    tracing::debug!(attempt, "retrying problem extraction after error: {err}");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Drop invalid candidates, then keep at most `max_per_section`,
    /// highest confidence first.
    fn validate_and_cap(&self, raw: Vec<RawExtractedProblem>, section_content: &str) -> Vec<ExtractedProblem> {
        let mut valid: Vec<ExtractedProblem> = raw
            .into_iter()
            .filter(|p| p.confidence >= self.config.min_confidence)
            .filter(|p| p.statement.trim().len() >= self.config.min_statement_len)
            .filter(|p| !p.quoted_text.trim().is_empty() && section_content.contains(p.quoted_text.trim()))
            .map(|p| ExtractedProblem { statement: p.statement, confidence: p.confidence, quoted_text: p.quoted_text })
            .collect();

        valid.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
        valid.truncate(self.config.max_per_section);
        valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::segmenter::SectionType;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn section(content: &str) -> Section {
        Section {
            section_type: SectionType::Limitations,
            title: "Limitations".to_string(),
            content: content.to_string(),
            word_count: content.split_whitespace().count(),
            priority: SectionType::Limitations.priority(),
        }
    }

    struct StaticClient(Vec<RawExtractedProblem>);

    #[async_trait]
    impl ProblemExtractionClient for StaticClient {
        async fn extract(&self, _prompt: &str) -> Result<Vec<RawExtractedProblem>, ExtractionError> {
            Ok(self.0.clone())
        }
    }

    struct FlakyClient {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ProblemExtractionClient for FlakyClient {
        async fn extract(&self, _prompt: &str) -> Result<Vec<RawExtractedProblem>, ExtractionError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(ExtractionError::Llm("transient".into()))
            } else {
                Ok(vec![RawExtractedProblem {
                    statement: "This approach does not scale to large graphs.".into(),
                    confidence: 0.9,
                    quoted_text: "does not scale".into(),
                }])
            }
        }
    }

    struct EmptyThenFullClient {
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl ProblemExtractionClient for EmptyThenFullClient {
        async fn extract(&self, _prompt: &str) -> Result<Vec<RawExtractedProblem>, ExtractionError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls == 1 {
                Ok(vec![])
            } else {
                Ok(vec![RawExtractedProblem {
                    statement: "This approach does not scale to large graphs.".into(),
                    confidence: 0.9,
                    quoted_text: "does not scale".into(),
                }])
            }
        }
    }

    #[tokio::test]
    async fn drops_low_confidence_short_and_unquoted_candidates() {
        let content = "Our approach does not scale to large graphs, which limits real use.";
        let raw = vec![
            RawExtractedProblem { statement: "Too short".into(), confidence: 0.9, quoted_text: "does not scale".into() },
            RawExtractedProblem {
                statement: "A fine length statement but low confidence entirely.".into(),
                confidence: 0.1,
                quoted_text: "does not scale".into(),
            },
            RawExtractedProblem {
                statement: "A fine length statement with a quote not in the text.".into(),
                confidence: 0.9,
                quoted_text: "nonexistent phrase".into(),
            },
            RawExtractedProblem {
                statement: "This approach does not scale to large graphs at all.".into(),
                confidence: 0.9,
                quoted_text: "does not scale".into(),
            },
        ];
        let extractor = ProblemExtractor::new(StaticClient(raw), ExtractorConfig::default());
        let result = extractor.extract_all(&[section(content)]).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].1.quoted_text, "does not scale");
    }

    #[tokio::test]
    async fn caps_at_max_per_section_keeping_highest_confidence() {
        let content = "does not scale at all in practice for this kind of workload.";
        let raw: Vec<RawExtractedProblem> = (0..10)
            .map(|i| RawExtractedProblem {
                statement: format!("Statement number {i} about scaling limitations in practice."),
                confidence: i as f32 / 10.0,
                quoted_text: "does not scale".into(),
            })
            .collect();
        let mut config = ExtractorConfig::default();
        config.min_confidence = 0.0;
        config.max_per_section = 3;
        let extractor = ProblemExtractor::new(StaticClient(raw), config);
        let result = extractor.extract_all(&[section(content)]).await.unwrap();
        assert_eq!(result.len(), 3);
        assert!(result[0].1.confidence >= result[1].1.confidence);
        assert!(result[1].1.confidence >= result[2].1.confidence);
    }

    #[tokio::test]
    async fn retries_on_transport_error() {
        let extractor = ProblemExtractor::new(FlakyClient { calls: AtomicU32::new(0) }, ExtractorConfig::default());
        let content = "This approach does not scale to large graphs in production settings.";
        let result = extractor.extract_all(&[section(content)]).await.unwrap();
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn retries_once_on_empty_response() {
        let extractor =
            ProblemExtractor::new(EmptyThenFullClient { calls: Mutex::new(0) }, ExtractorConfig::default());
        let content = "This approach does not scale to large graphs in production settings.";
        let result = extractor.extract_all(&[section(content)]).await.unwrap();
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn skips_sections_above_priority_threshold() {
        let mut references_section = section("does not scale");
        references_section.section_type = SectionType::References;
        references_section.priority = SectionType::References.priority();
        let extractor = ProblemExtractor::new(
            StaticClient(vec![RawExtractedProblem {
                statement: "Should never be reached because section is excluded.".into(),
                confidence: 0.9,
                quoted_text: "does not scale".into(),
            }]),
            ExtractorConfig::default(),
        );
        let result = extractor.extract_all(&[references_section]).await.unwrap();
        assert!(result.is_empty());
    }
}
