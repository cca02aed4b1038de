use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use tripweave_core::config::SearchConfig;
use tripweave_core::error::{Result, TripError};
use tripweave_core::traits::SearchProvider;
use tripweave_core::types::SearchHit;

const SERVICE: &str = "search";

/// Tavily web search client.
pub struct TavilySearch {
    api_key: String,
    base_url: String,
    max_results: u32,
    timeout_secs: u64,
    http: reqwest::Client,
}

impl TavilySearch {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| TripError::Config("search.api_key is not set".into()))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Ok(Self {
            api_key,
            base_url: config.base_url.clone(),
            max_results: config.max_results,
            timeout_secs: config.timeout_secs,
            http,
        })
    }
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

/// Parse a Tavily response body into hits, dropping untitled results.
pub fn parse_results(body: &str) -> Result<Vec<SearchHit>> {
    let parsed: TavilyResponse =
        serde_json::from_str(body).map_err(|e| TripError::malformed_body(SERVICE, e))?;
    Ok(parsed
        .results
        .into_iter()
        .filter(|r| !r.title.trim().is_empty())
        .map(|r| SearchHit {
            title: r.title.trim().to_string(),
            url: r.url,
            snippet: r.content.trim().to_string(),
        })
        .collect())
}

impl SearchProvider for TavilySearch {
    fn name(&self) -> &str {
        "tavily"
    }

    fn search(&self, query: String) -> BoxFuture<'_, Result<Vec<SearchHit>>> {
        Box::pin(async move {
            let resp = self
                .http
                .post(&self.base_url)
                .json(&json!({
                    "api_key": self.api_key,
                    "query": query,
                    "max_results": self.max_results,
                }))
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        TripError::UpstreamTimeout {
                            service: SERVICE.into(),
                            secs: self.timeout_secs,
                        }
                    } else {
                        TripError::upstream(SERVICE, e.to_string())
                    }
                })?;

            let status = resp.status();
            let body = resp
                .text()
                .await
                .map_err(|e| TripError::upstream(SERVICE, e.to_string()))?;

            match status {
                s if s.is_success() => {}
                StatusCode::TOO_MANY_REQUESTS => {
                    return Err(TripError::RateLimited {
                        service: SERVICE.into(),
                    })
                }
                StatusCode::NOT_FOUND => {
                    return Err(TripError::NotFound {
                        service: SERVICE.into(),
                        what: self.base_url.clone(),
                    })
                }
                s => {
                    return Err(TripError::Http {
                        service: SERVICE.into(),
                        message: format!("HTTP {}: {}", s, body),
                    })
                }
            }

            let hits = parse_results(&body)?;
            debug!(query = %query, hits = hits.len(), "Search complete");
            Ok(hits)
        })
    }
}
