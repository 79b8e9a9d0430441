//! Error kinds surfaced by the question-answering controller.
//!
//! Each provider gets its own variant so callers can tell a failed web
//! search apart from a failed retrieval or generation call.

use std::fmt;
use thiserror::Error;

/// The external capability a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Retrieval,
    WebSearch,
    Generation,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderKind::Retrieval => "retrieval",
            ProviderKind::WebSearch => "web search",
            ProviderKind::Generation => "text generation",
        })
    }
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    #[error("web search failed: {0}")]
    WebSearch(String),

    #[error("text generation failed: {0}")]
    Generation(String),

    #[error("{provider} timed out after {secs}s")]
    Timeout { provider: ProviderKind, secs: u64 },

    #[error("{provider} call was cancelled")]
    Cancelled { provider: ProviderKind },
}

impl AgentError {
    /// Wrap a provider failure in the variant that belongs to `provider`.
    pub fn from_provider(provider: ProviderKind, err: anyhow::Error) -> Self {
        let message = format!("{:#}", err);
        match provider {
            ProviderKind::Retrieval => AgentError::Retrieval(message),
            ProviderKind::WebSearch => AgentError::WebSearch(message),
            ProviderKind::Generation => AgentError::Generation(message),
        }
    }

    /// The provider this error is attributed to.
    pub fn provider(&self) -> ProviderKind {
        match self {
            AgentError::Retrieval(_) => ProviderKind::Retrieval,
            AgentError::WebSearch(_) => ProviderKind::WebSearch,
            AgentError::Generation(_) => ProviderKind::Generation,
            AgentError::Timeout { provider, .. } | AgentError::Cancelled { provider } => *provider,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_provider_keeps_context_chain() {
        let err = anyhow::anyhow!("connection refused").context("Tavily request failed");
        let agent_err = AgentError::from_provider(ProviderKind::WebSearch, err);
        assert!(matches!(agent_err, AgentError::WebSearch(_)));
        assert_eq!(
            agent_err.to_string(),
            "web search failed: Tavily request failed: connection refused"
        );
    }

    #[test]
    fn test_timeout_message_names_provider() {
        let err = AgentError::Timeout {
            provider: ProviderKind::Generation,
            secs: 60,
        };
        assert_eq!(err.to_string(), "text generation timed out after 60s");
        assert_eq!(err.provider(), ProviderKind::Generation);
    }
}
