//! Web search providers.
//!
//! [`TavilySearch`] calls the Tavily search API. Without a `TAVILY_API_KEY`
//! the agent gets a [`DisabledWebSearch`] instead, which always returns
//! an empty list.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{Credentials, WebSearchConfig};
use crate::http;
use crate::models::WebSearchItem;
use crate::traits::WebSearchProvider;

pub struct TavilySearch {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    search_depth: String,
    max_retries: u32,
}

impl TavilySearch {
    pub fn new(config: &WebSearchConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            search_depth: config.search_depth.clone(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl WebSearchProvider for TavilySearch {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebSearchItem>> {
        let body = serde_json::json!({
            "query": query,
            "search_depth": self.search_depth,
            "max_results": max_results,
        });
        let url = format!("{}/search", self.base_url);
        let json = http::post_json(
            &self.client,
            "Tavily",
            &url,
            Some(&self.api_key),
            &body,
            self.max_retries,
        )
        .await
        .context("Tavily search request failed")?;

        let mut items = parse_tavily_response(&json);
        items.truncate(max_results);
        Ok(items)
    }
}

/// Stand-in used when no web search credential is configured.
pub struct DisabledWebSearch;

#[async_trait]
impl WebSearchProvider for DisabledWebSearch {
    fn name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<WebSearchItem>> {
        Ok(Vec::new())
    }
}

/// Map a Tavily response body to search items.
///
/// A missing `results` array means no results. Missing fields default to
/// `"Untitled"` / `""` / `""`; a non-numeric score is dropped.
pub fn parse_tavily_response(json: &serde_json::Value) -> Vec<WebSearchItem> {
    let Some(rows) = json.get("results").and_then(|r| r.as_array()) else {
        return Vec::new();
    };

    rows.iter()
        .map(|row| {
            let text = |key: &str, default: &str| {
                row.get(key)
                    .and_then(|v| v.as_str())
                    .unwrap_or(default)
                    .to_string()
            };
            WebSearchItem {
                title: text("title", "Untitled"),
                url: text("url", ""),
                content: text("content", ""),
                score: row.get("score").and_then(|s| s.as_f64()),
            }
        })
        .collect()
}

/// Pick the web search provider for the available credentials.
pub fn create_web_search(
    config: &WebSearchConfig,
    credentials: &Credentials,
) -> Result<Arc<dyn WebSearchProvider>> {
    match &credentials.tavily_api_key {
        Some(key) => Ok(Arc::new(TavilySearch::new(config, key.clone())?)),
        None => {
            tracing::info!("TAVILY_API_KEY not set; web search fallback disabled");
            Ok(Arc::new(DisabledWebSearch))
        }
    }
}
