use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::PaperSource;
use crate::config::{RequestConfig, ScholarConfig};
use crate::error::{ScholarError, ScholarResult};
use crate::model::PaperRecord;

const SEARCH_FIELDS: &str = "title,url,abstract,authors,publicationDate,externalIds";
const REFERENCE_FIELDS: &str = "title,url";
const REFERENCE_LIMIT: usize = 1000;
const DEFAULT_REFERENCE_CONCURRENCY: usize = 4;

/// Client for the Semantic Scholar Graph API
#[derive(Clone)]
pub struct SemanticScholarClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    skip_review_titles: bool,
    require_references: bool,
    reference_concurrency: usize,
    request_config: RequestConfig,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<S2Paper>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Paper {
    paper_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(default)]
    authors: Vec<S2Author>,
    #[serde(default)]
    publication_date: Option<String>,
    #[serde(default)]
    external_ids: Option<ExternalIds>,
}

#[derive(Debug, Deserialize)]
struct S2Author {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExternalIds {
    #[serde(default, rename = "ArXiv")]
    arxiv: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReferencesResponse {
    #[serde(default)]
    data: Vec<ReferenceEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReferenceEntry {
    #[serde(default)]
    cited_paper: Option<CitedPaper>,
}

#[derive(Debug, Deserialize)]
struct CitedPaper {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl S2Paper {
    fn record_url(&self) -> Option<String> {
        if let Some(arxiv) = self
            .external_ids
            .as_ref()
            .and_then(|ids| ids.arxiv.as_deref())
            .filter(|id| !id.trim().is_empty())
        {
            return Some(format!("https://arxiv.org/abs/{}", arxiv.trim()));
        }
        self.url.clone().filter(|u| !u.trim().is_empty())
    }

    fn into_record(self) -> Option<PaperRecord> {
        let url = self.record_url()?;
        let title = self.title?;
        let record = PaperRecord::new(url, title).ok()?;
        let date = self
            .publication_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());

        let record = record
            .with_authors(self.authors.into_iter().filter_map(|a| a.name))
            .with_content(self.abstract_text.unwrap_or_default());
        Some(match date {
            Some(date) => record.with_publication_date(date),
            None => record,
        })
    }
}

/// Titles that mark commentary or survey papers rather than primary work.
fn is_review_title(title: &str) -> bool {
    let lower = title.to_lowercase();
    lower.contains("comment") || lower.contains("review")
}

impl SemanticScholarClient {
    /// Create a new Semantic Scholar client
    pub fn new(config: &ScholarConfig, request_config: RequestConfig) -> ScholarResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .user_agent(concat!("incite-review/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ScholarError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            skip_review_titles: config.skip_review_titles,
            require_references: config.require_references,
            reference_concurrency: DEFAULT_REFERENCE_CONCURRENCY,
            request_config,
        })
    }

    /// Set how many reference lookups run at once
    pub fn with_reference_concurrency(mut self, concurrency: usize) -> Self {
        self.reference_concurrency = concurrency.max(1);
        self
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Search papers by free-text query
    async fn search(&self, query: &str, limit: usize) -> ScholarResult<Vec<S2Paper>> {
        let url = format!("{}/paper/search", self.base_url);
        let limit = limit.to_string();
        let response: SearchResponse = self
            .get_json(
                &url,
                &[("query", query), ("limit", &limit), ("fields", SEARCH_FIELDS)],
            )
            .await?;
        Ok(response.data)
    }

    /// Reference keys of one paper: titles, or urls for untitled references
    async fn references(&self, paper_id: &str) -> ScholarResult<Vec<String>> {
        let url = format!("{}/paper/{}/references", self.base_url, paper_id);
        let limit = REFERENCE_LIMIT.to_string();
        let response: ReferencesResponse = self
            .get_json(&url, &[("fields", REFERENCE_FIELDS), ("limit", &limit)])
            .await?;

        Ok(response
            .data
            .into_iter()
            .filter_map(|entry| entry.cited_paper)
            .filter_map(|cited| {
                cited
                    .title
                    .filter(|t| !t.trim().is_empty())
                    .or(cited.url.filter(|u| !u.trim().is_empty()))
            })
            .collect())
    }

    /// GET with retries on transient failures
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> ScholarResult<T> {
        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = self.request_config.backoff_delay(retries);
                warn!(
                    url = %url,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying Semantic Scholar request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(url, query).await {
                Ok(value) => {
                    debug!(
                        url = %url,
                        latency_ms = start.elapsed().as_millis(),
                        "Semantic Scholar request succeeded"
                    );
                    return Ok(value);
                }
                Err(e) => {
                    error!(
                        url = %url,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Semantic Scholar request failed"
                    );
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(ScholarError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Execute a single request (internal)
    async fn execute_request<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> ScholarResult<T> {
        let mut request = self.client.get(url).query(query);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ScholarError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ScholarError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })
    }
}

#[async_trait]
impl PaperSource for SemanticScholarClient {
    async fn fetch(&self, keywords: &[String], max_n: usize) -> ScholarResult<Vec<PaperRecord>> {
        let query = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if query.is_empty() || max_n == 0 {
            return Ok(Vec::new());
        }

        let found = self.search(&query, max_n).await?;
        let total = found.len();

        let candidates: Vec<(String, PaperRecord)> = found
            .into_iter()
            .filter_map(|paper| {
                let id = paper.paper_id.clone();
                paper.into_record().map(|record| (id, record))
            })
            .filter(|(_, record)| !(self.skip_review_titles && is_review_title(&record.name)))
            .take(max_n)
            .collect();

        let papers: Vec<PaperRecord> = stream::iter(candidates.into_iter().map(|(id, record)| {
            async move {
                match self.references(&id).await {
                    Ok(keys) => record.with_out_references(keys),
                    Err(e) => {
                        warn!(
                            url = %record.url(),
                            error = %e,
                            "Reference lookup failed, keeping paper without references"
                        );
                        record
                    }
                }
            }
        }))
        .buffered(self.reference_concurrency)
        .filter(|record| {
            let keep = !self.require_references || record.num_out() > 0;
            async move { keep }
        })
        .collect()
        .await;

        info!(
            query = %query,
            found = total,
            kept = papers.len(),
            "Papers fetched"
        );
        Ok(papers)
    }
}
