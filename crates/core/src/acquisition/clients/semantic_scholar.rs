//! Semantic Scholar Graph API client.

use std::sync::Arc;

use async_trait::async_trait;

use super::SourceClient;
use crate::acquisition::cache::{EntryKind, ResponseCache};
use crate::acquisition::circuit_breaker::CircuitBreaker;
use crate::acquisition::models::{Identifier, RawS2Paper};
use crate::acquisition::normalizer::normalize_s2;
use crate::acquisition::rate_limiter::RateLimiter;
use crate::acquisition::retry::{retry, RetryPolicy};
use crate::acquisition::{AcquisitionError, Source};
use crate::graph::models::Paper;

const BASE_URL: &str = "https://api.semanticscholar.org/graph/v1";
const FIELDS: &str = "paperId,title,abstract,year,authors,externalIds,citationCount,openAccessPdf";

pub struct SemanticScholarClient {
    http: reqwest::Client,
    api_key: Option<String>,
    breaker: Arc<CircuitBreaker>,
    limiter: Arc<RateLimiter>,
    cache: Arc<ResponseCache<Paper>>,
    retry_policy: RetryPolicy,
}

impl SemanticScholarClient {
    pub fn new(
        api_key: Option<String>,
        breaker: Arc<CircuitBreaker>,
        limiter: Arc<RateLimiter>,
        cache: Arc<ResponseCache<Paper>>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("building reqwest client"),
            api_key,
            breaker,
            limiter,
            cache,
            retry_policy,
        }
    }

    fn identifier_path(identifier: &Identifier) -> Result<String, AcquisitionError> {
        match identifier {
            Identifier::Doi(doi) => Ok(format!("DOI:{doi}")),
            Identifier::Arxiv(id) => Ok(format!("ARXIV:{id}")),
            Identifier::SemanticScholarId(id) => Ok(id.clone()),
            Identifier::OpenAlexId(_) => Err(AcquisitionError::Unsupported),
        }
    }

    async fn do_request(&self, url: &str) -> Result<reqwest::Response, AcquisitionError> {
        let mut req = self.http.get(url);
        if let Some(key) = &self.api_key {
            req = req.header("x-api-key", key);
        }
        req.send().await.map_err(|e| AcquisitionError::Transient(e.to_string()))
    }

    async fn classify_and_parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, AcquisitionError> {
        let status = response.status();
        if status.as_u16() == 404 {
            return Err(AcquisitionError::NotFound(response.url().to_string()));
        }
        if status.as_u16() == 429 {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(|secs| secs * 1000);
            return Err(AcquisitionError::RateLimited { retry_after_ms });
        }
        if !status.is_success() {
            return Err(AcquisitionError::HttpStatus(status.as_u16()));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| AcquisitionError::Normalization(e.to_string()))
    }
}

#[async_trait]
impl SourceClient for SemanticScholarClient {
    fn source(&self) -> Source {
        Source::SemanticScholar
    }

    async fn fetch(&self, identifier: &Identifier) -> Result<Paper, AcquisitionError> {
        let cache_key = format!("s2:{}", identifier.as_str());
        if let Some(cached) = self.cache.get(&cache_key) {
            return Ok(cached);
        }

        self.breaker
            .check()
            .map_err(|_| AcquisitionError::CircuitOpen { source: "s2".into() })?;

        let path = Self::identifier_path(identifier)?;
        self.limiter.acquire(1.0).await;

        let result = retry(&self.retry_policy, || {
            let url = format!("{BASE_URL}/paper/{path}?fields={FIELDS}");
            async move {
                let response = self.do_request(&url).await?;
                let raw: RawS2Paper = Self::classify_and_parse(response).await?;
                normalize_s2(&raw)
            }
        })
        .await;

        match &result {
            Ok(paper) => {
                self.breaker.record_success();
                let aliases: Vec<String> = [paper.doi.clone(), paper.arxiv_id.clone()]
                    .into_iter()
                    .flatten()
                    .collect();
                self.cache.insert(&cache_key, &aliases, EntryKind::Paper, paper.clone());
            }
            Err(err) if err.is_retryable() => self.breaker.record_failure(),
            Err(_) => {}
        }

        result
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Paper>, AcquisitionError> {
        self.breaker
            .check()
            .map_err(|_| AcquisitionError::CircuitOpen { source: "s2".into() })?;
        self.limiter.acquire(1.0).await;

        #[derive(serde::Deserialize)]
        struct SearchResponse {
            data: Vec<RawS2Paper>,
        }

        let result = retry(&self.retry_policy, || {
            let url = format!(
                "{BASE_URL}/paper/search?query={}&limit={limit}&fields={FIELDS}",
                urlencoding_query(query)
            );
            async move {
                let response = self.do_request(&url).await?;
                let parsed: SearchResponse = Self::classify_and_parse(response).await?;
                parsed
                    .data
                    .iter()
                    .map(normalize_s2)
                    .collect::<Result<Vec<_>, _>>()
            }
        })
        .await;

        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(err) if err.is_retryable() => self.breaker.record_failure(),
            Err(_) => {}
        }
        result
    }
}

fn urlencoding_query(q: &str) -> String {
    url::form_urlencoded::byte_serialize(q.as_bytes()).collect()
}
