//! arXiv Atom-feed client. Unlike the other two sources, arXiv answers
//! in Atom/XML; this client deserializes the feed with `quick-xml`
//! before handing raw entries to the normalizer.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::SourceClient;
use crate::acquisition::cache::{EntryKind, ResponseCache};
use crate::acquisition::circuit_breaker::CircuitBreaker;
use crate::acquisition::models::{Identifier, RawArxivEntry};
use crate::acquisition::normalizer::normalize_arxiv;
use crate::acquisition::rate_limiter::RateLimiter;
use crate::acquisition::retry::{retry, RetryPolicy};
use crate::acquisition::{AcquisitionError, Source};
use crate::graph::models::Paper;

const BASE_URL: &str = "http://export.arxiv.org/api/query";

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    id: String,
    title: String,
    summary: String,
    published: String,
    #[serde(rename = "author", default)]
    authors: Vec<AtomAuthor>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@title", default)]
    title: Option<String>,
}

impl AtomEntry {
    fn into_raw(self) -> RawArxivEntry {
        let pdf_url = self
            .links
            .iter()
            .find(|l| l.title.as_deref() == Some("pdf"))
            .map(|l| l.href.clone());
        RawArxivEntry {
            id: self.id,
            title: self.title.split_whitespace().collect::<Vec<_>>().join(" "),
            summary: self.summary.split_whitespace().collect::<Vec<_>>().join(" "),
            published: self.published,
            authors: self.authors.into_iter().map(|a| a.name).collect(),
            pdf_url,
        }
    }
}

pub struct ArxivClient {
    http: reqwest::Client,
    breaker: Arc<CircuitBreaker>,
    limiter: Arc<RateLimiter>,
    cache: Arc<ResponseCache<Paper>>,
    retry_policy: RetryPolicy,
}

impl ArxivClient {
    pub fn new(
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
            breaker,
            limiter,
            cache,
            retry_policy,
        }
    }

    async fn fetch_feed(&self, query_params: &str) -> Result<AtomFeed, AcquisitionError> {
        let url = format!("{BASE_URL}?{query_params}");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AcquisitionError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AcquisitionError::HttpStatus(status.as_u16()));
        }
        let body = response.text().await.map_err(|e| AcquisitionError::Transient(e.to_string()))?;
        quick_xml::de::from_str(&body).map_err(|e| AcquisitionError::Normalization(e.to_string()))
    }
}

#[async_trait]
impl SourceClient for ArxivClient {
    fn source(&self) -> Source {
        Source::Arxiv
    }

    async fn fetch(&self, identifier: &Identifier) -> Result<Paper, AcquisitionError> {
        let Identifier::Arxiv(id) = identifier else {
            return Err(AcquisitionError::Unsupported);
        };

        let cache_key = format!("arxiv:{id}");
        if let Some(cached) = self.cache.get(&cache_key) {
            return Ok(cached);
        }

        self.breaker
            .check()
            .map_err(|_| AcquisitionError::CircuitOpen { source: "arxiv".into() })?;
        self.limiter.acquire(1.0).await;

        let result = retry(&self.retry_policy, || {
            let query = format!("id_list={id}");
            async move {
                let feed = self.fetch_feed(&query).await?;
                let entry = feed
                    .entries
                    .into_iter()
                    .next()
                    .ok_or_else(|| AcquisitionError::NotFound(id.clone()))?;
                normalize_arxiv(&entry.into_raw())
            }
        })
        .await;

        match &result {
            Ok(paper) => {
                self.breaker.record_success();
                let aliases: Vec<String> = paper.arxiv_id.clone().into_iter().collect();
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
            .map_err(|_| AcquisitionError::CircuitOpen { source: "arxiv".into() })?;
        self.limiter.acquire(1.0).await;

        let result = retry(&self.retry_policy, || {
            let params = format!(
                "search_query=all:{}&max_results={limit}",
                urlencoding_query(query)
            );
            async move {
                let feed = self.fetch_feed(&params).await?;
                feed.entries
                    .into_iter()
                    .map(|e| normalize_arxiv(&e.into_raw()))
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
