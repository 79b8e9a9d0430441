//! Provider traits the agent is written against.
//!
//! The agent never talks to SQLite, Tavily or OpenAI directly. It holds
//! trait objects for the three external capabilities it needs, so tests
//! and alternative backends can be swapped in without touching the
//! control flow.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                    Agent                     │
//! │  ┌────────────┐ ┌────────────┐ ┌──────────┐  │
//! │  │ Retrieval  │ │ Web Search │ │   Text   │  │
//! │  │ Provider   │ │ Provider   │ │Generator │  │
//! │  └─────┬──────┘ └─────┬──────┘ └────┬─────┘  │
//! └────────┼──────────────┼─────────────┼────────┘
//!          ▼              ▼             ▼
//!     GameIndex      TavilySearch   OpenAIGenerator
//!     (SQLite)       / Disabled     / none
//! ```
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use anyhow::Result;
//! use udaplay::models::WebSearchItem;
//! use udaplay::traits::WebSearchProvider;
//!
//! pub struct FixedResults(Vec<WebSearchItem>);
//!
//! #[async_trait]
//! impl WebSearchProvider for FixedResults {
//!     fn name(&self) -> &str { "fixed" }
//!
//!     async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<WebSearchItem>> {
//!         Ok(self.0.iter().take(max_results).cloned().collect())
//!     }
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{RetrievalResult, WebSearchItem};

/// Nearest-neighbour search over the local game index.
#[async_trait]
pub trait RetrievalProvider: Send + Sync {
    /// Return up to `top_k` matches for `query`, best first.
    ///
    /// An empty `matches` list is a valid answer meaning "nothing found".
    async fn search(&self, query: &str, top_k: usize) -> Result<RetrievalResult>;
}

/// Live web search used as a fallback when local data is insufficient.
#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    /// Short identifier recorded in the answer's tool usage (e.g. `"tavily"`).
    fn name(&self) -> &str;

    /// Whether the provider can actually reach a search backend.
    ///
    /// A disabled provider still answers [`search`](WebSearchProvider::search)
    /// with an empty list.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Search the web, returning at most `max_results` documents.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebSearchItem>>;
}

/// Free-text completion.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Short identifier recorded in the answer's tool usage (e.g. `"openai"`).
    fn name(&self) -> &str;

    /// Generate text for a complete prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;
}
