//! OpenAlex Works API client.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::SourceClient;
use crate::acquisition::cache::{EntryKind, ResponseCache};
use crate::acquisition::circuit_breaker::CircuitBreaker;
use crate::acquisition::models::{Identifier, RawOpenAlexAuthor, RawOpenAlexAuthorship, RawOpenAlexOpenAccess, RawOpenAlexWork};
use crate::acquisition::normalizer::{normalize_openalex, reconstruct_abstract_from_inverted_index};
use crate::acquisition::rate_limiter::RateLimiter;
use crate::acquisition::retry::{retry, RetryPolicy};
use crate::acquisition::{AcquisitionError, Source};
use crate::graph::models::Paper;

const BASE_URL: &str = "https://api.openalex.org/works";

/// The wire shape OpenAlex actually returns, with the abstract as an
/// inverted index; `into_raw` reconstructs it into plain text before
/// handing off to the normalizer.
#[derive(Debug, Deserialize)]
struct WireWork {
    id: String,
    doi: Option<String>,
    title: Option<String>,
    publication_year: Option<i32>,
    #[serde(default)]
    authorships: Vec<WireAuthorship>,
    cited_by_count: Option<u32>,
    open_access: Option<WireOpenAccess>,
    abstract_inverted_index: Option<HashMap<String, Vec<u32>>>,
}

#[derive(Debug, Deserialize)]
struct WireAuthorship {
    author: WireAuthor,
}

#[derive(Debug, Deserialize)]
struct WireAuthor {
    id: String,
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct WireOpenAccess {
    oa_url: Option<String>,
}

impl WireWork {
    fn into_raw(self) -> (RawOpenAlexWork, Option<String>) {
        let reconstructed_abstract = self
            .abstract_inverted_index
            .as_ref()
            .map(reconstruct_abstract_from_inverted_index);
        let raw = RawOpenAlexWork {
            id: self.id,
            doi: self.doi,
            title: self.title,
            publication_year: self.publication_year,
            authorships: self
                .authorships
                .into_iter()
                .map(|a| RawOpenAlexAuthorship {
                    author: RawOpenAlexAuthor { id: a.author.id, display_name: a.author.display_name },
                })
                .collect(),
            cited_by_count: self.cited_by_count,
            open_access: self.open_access.map(|oa| RawOpenAlexOpenAccess { oa_url: oa.oa_url }),
        };
        (raw, reconstructed_abstract)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<WireWork>,
}

pub struct OpenAlexClient {
    http: reqwest::Client,
    mailto: Option<String>,
    breaker: Arc<CircuitBreaker>,
    limiter: Arc<RateLimiter>,
    cache: Arc<ResponseCache<Paper>>,
    retry_policy: RetryPolicy,
}

impl OpenAlexClient {
    pub fn new(
        mailto: Option<String>,
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
            mailto,
            breaker,
            limiter,
            cache,
            retry_policy,
        }
    }

    fn polite_suffix(&self) -> String {
        self.mailto.as_ref().map(|m| format!("&mailto={m}")).unwrap_or_default()
    }

    fn normalize_with_abstract(&self, wire: WireWork) -> Result<Paper, AcquisitionError> {
        let (raw, abstract_text) = wire.into_raw();
        let mut paper = normalize_openalex(&raw)?;
        paper.abstract_text = abstract_text;
        Ok(paper)
    }

    async fn do_get<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, AcquisitionError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AcquisitionError::Transient(e.to_string()))?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Err(AcquisitionError::NotFound(url.to_string()));
        }
        if status.as_u16() == 429 {
            return Err(AcquisitionError::RateLimited { retry_after_ms: None });
        }
        if !status.is_success() {
            return Err(AcquisitionError::HttpStatus(status.as_u16()));
        }
        response.json::<T>().await.map_err(|e| AcquisitionError::Normalization(e.to_string()))
    }
}

#[async_trait]
impl SourceClient for OpenAlexClient {
    fn source(&self) -> Source {
        Source::OpenAlex
    }

    async fn fetch(&self, identifier: &Identifier) -> Result<Paper, AcquisitionError> {
        let lookup = match identifier {
            Identifier::OpenAlexId(id) => id.clone(),
            Identifier::Doi(doi) => format!("https://doi.org/{doi}"),
            _ => return Err(AcquisitionError::Unsupported),
        };
        let cache_key = format!("openalex:{lookup}");
        if let Some(cached) = self.cache.get(&cache_key) {
            return Ok(cached);
        }

        self.breaker
            .check()
            .map_err(|_| AcquisitionError::CircuitOpen { source: "openalex".into() })?;
        self.limiter.acquire(1.0).await;

        let result = retry(&self.retry_policy, || {
            let url = format!("{BASE_URL}/{lookup}?{}", self.polite_suffix());
            async move {
                let wire: WireWork = self.do_get(&url).await?;
                self.normalize_with_abstract(wire)
            }
        })
        .await;

        match &result {
            Ok(paper) => {
                self.breaker.record_success();
                let aliases: Vec<String> = [paper.doi.clone(), paper.openalex_id.clone()]
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
            .map_err(|_| AcquisitionError::CircuitOpen { source: "openalex".into() })?;
        self.limiter.acquire(1.0).await;

        let result = retry(&self.retry_policy, || {
            let url = format!(
                "{BASE_URL}?search={}&per_page={limit}{}",
                urlencoding_query(query),
                self.polite_suffix()
            );
            async move {
                let parsed: SearchResponse = self.do_get(&url).await?;
                parsed
                    .results
                    .into_iter()
                    .map(|w| self.normalize_with_abstract(w))
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
