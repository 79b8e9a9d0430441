//! The question-answering controller.
//!
//! Each question runs through a small state machine:
//!
//! ```text
//! RETRIEVE ──▶ EVALUATE ──(high)──────────────▶ RESPOND
//!                 │                                ▲
//!                 └──(medium/low)──▶ WEB_SEARCH ───┘
//! ```
//!
//! Transitions are decided by the pure [`AgentState::next`]; the provider
//! calls for each state live in [`Agent::answer`]. Every provider call is
//! bounded by a timeout and raced against the agent's cancellation token.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{AgentConfig, WebSearchConfig};
use crate::error::{AgentError, ProviderKind};
use crate::evaluate::evaluate;
use crate::models::{AgentAnswer, EvaluationResult, RetrievalResult, Sufficiency, WebSearchItem};
use crate::synthesize::ResponseSynthesizer;
use crate::traits::{RetrievalProvider, WebSearchProvider};

pub const WEB_SEARCH_QUERY_PREFIX: &str = "video game research: ";
pub const WEB_SEARCH_MAX_RESULTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Retrieve,
    Evaluate,
    WebSearch,
    Respond,
}

impl AgentState {
    /// The state after `self`, or `None` once the answer is produced.
    ///
    /// `evaluation` is only consulted when leaving `Evaluate`; a missing
    /// evaluation is treated like an insufficient one.
    pub fn next(self, evaluation: Option<&EvaluationResult>) -> Option<AgentState> {
        match self {
            AgentState::Retrieve => Some(AgentState::Evaluate),
            AgentState::Evaluate => match evaluation.map(|e| e.sufficiency) {
                Some(Sufficiency::High) => Some(AgentState::Respond),
                _ => Some(AgentState::WebSearch),
            },
            AgentState::WebSearch => Some(AgentState::Respond),
            AgentState::Respond => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Retrieve => "retrieve",
            AgentState::Evaluate => "evaluate",
            AgentState::WebSearch => "web_search",
            AgentState::Respond => "respond",
        }
    }
}

/// Run a provider call under a timeout, racing `cancel`.
pub(crate) async fn guarded<T, F>(
    provider: ProviderKind,
    timeout_secs: u64,
    cancel: &CancellationToken,
    call: F,
) -> Result<T, AgentError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AgentError::Cancelled { provider }),
        outcome = tokio::time::timeout(Duration::from_secs(timeout_secs), call) => match outcome {
            Ok(result) => result.map_err(|e| AgentError::from_provider(provider, e)),
            Err(_) => Err(AgentError::Timeout {
                provider,
                secs: timeout_secs,
            }),
        },
    }
}

pub struct Agent {
    retrieval: Arc<dyn RetrievalProvider>,
    web_search: Arc<dyn WebSearchProvider>,
    synthesizer: ResponseSynthesizer,
    retrieval_timeout_secs: u64,
    web_search_timeout_secs: u64,
    cancel: CancellationToken,
}

impl Agent {
    pub fn new(
        retrieval: Arc<dyn RetrievalProvider>,
        web_search: Arc<dyn WebSearchProvider>,
        synthesizer: ResponseSynthesizer,
    ) -> Self {
        let cancel = CancellationToken::new();
        Self {
            retrieval,
            web_search,
            synthesizer: synthesizer.with_cancellation(cancel.clone()),
            retrieval_timeout_secs: AgentConfig::default().retrieval_timeout_secs,
            web_search_timeout_secs: WebSearchConfig::default().timeout_secs,
            cancel,
        }
    }

    pub fn with_timeouts(mut self, retrieval_secs: u64, web_search_secs: u64) -> Self {
        self.retrieval_timeout_secs = retrieval_secs;
        self.web_search_timeout_secs = web_search_secs;
        self
    }

    /// Replace the cancellation token shared with the synthesizer.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.synthesizer = self.synthesizer.with_cancellation(cancel.clone());
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Answer `question` using up to `top_k` local matches (minimum 1).
    ///
    /// Retrieval and generation failures abort the answer. A failed or
    /// timed-out web search is recorded in the trace and treated as no
    /// results. Cancellation always aborts.
    pub async fn answer(&self, question: &str, top_k: usize) -> Result<AgentAnswer, AgentError> {
        let top_k = top_k.max(1);

        let mut state = AgentState::Retrieve;
        let mut retrieval = RetrievalResult::empty(question);
        let mut evaluation: Option<EvaluationResult> = None;
        let mut web_results: Vec<WebSearchItem> = Vec::new();
        let mut trace = Vec::new();
        let mut tools = Vec::new();

        loop {
            tracing::debug!(state = state.as_str(), "agent step");

            match state {
                AgentState::Retrieve => {
                    retrieval = guarded(
                        ProviderKind::Retrieval,
                        self.retrieval_timeout_secs,
                        &self.cancel,
                        self.retrieval.search(question, top_k),
                    )
                    .await?;
                    tools.push("local_index.search".to_string());
                    trace.push(format!(
                        "retrieve: {} local matches (top_k={})",
                        retrieval.matches.len(),
                        top_k
                    ));
                }
                AgentState::Evaluate => {
                    let result = evaluate(&retrieval);
                    trace.push(format!(
                        "evaluate: {} sufficiency (confidence {:.2})",
                        result.sufficiency, result.confidence
                    ));
                    evaluation = Some(result);
                }
                AgentState::WebSearch => {
                    web_results = self.web_search_step(question, &mut trace, &mut tools).await?;
                }
                AgentState::Respond => {
                    let evaluation = evaluation.unwrap_or_else(|| EvaluationResult {
                        sufficiency: Sufficiency::Low,
                        confidence: 0.0,
                        rationale: "Not evaluated.".to_string(),
                    });
                    trace.push(format!(
                        "respond: {} local and {} web sources",
                        retrieval.matches.len(),
                        web_results.len()
                    ));

                    let mut answer = self
                        .synthesizer
                        .synthesize(question, &retrieval, &evaluation, &web_results)
                        .await?;
                    tools.append(&mut answer.tool_usage);
                    answer.execution_trace = trace;
                    answer.tool_usage = tools;
                    return Ok(answer);
                }
            }

            // Respond always returns above.
            state = state
                .next(evaluation.as_ref())
                .unwrap_or(AgentState::Respond);
        }
    }

    async fn web_search_step(
        &self,
        question: &str,
        trace: &mut Vec<String>,
        tools: &mut Vec<String>,
    ) -> Result<Vec<WebSearchItem>, AgentError> {
        let query = format!("{}{}", WEB_SEARCH_QUERY_PREFIX, question);
        let outcome = guarded(
            ProviderKind::WebSearch,
            self.web_search_timeout_secs,
            &self.cancel,
            self.web_search.search(&query, WEB_SEARCH_MAX_RESULTS),
        )
        .await;

        if self.web_search.is_enabled() {
            tools.push(format!("web_search.{}", self.web_search.name()));
        }

        match outcome {
            Ok(mut items) => {
                items.truncate(WEB_SEARCH_MAX_RESULTS);
                if self.web_search.is_enabled() {
                    trace.push(format!("web_search: {} results", items.len()));
                } else {
                    trace.push("web_search: skipped, no web search provider configured".to_string());
                }
                Ok(items)
            }
            Err(err @ AgentError::Cancelled { .. }) => Err(err),
            Err(err) => {
                tracing::warn!(error = %err, "web search failed; continuing with local results");
                trace.push(format!("web_search: {}; continuing without web results", err));
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RetrievalItem;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedRetrieval {
        scores: Vec<f64>,
        delay: Option<Duration>,
    }

    impl FixedRetrieval {
        fn new(scores: &[f64]) -> Arc<Self> {
            Arc::new(Self {
                scores: scores.to_vec(),
                delay: None,
            })
        }
    }

    #[async_trait]
    impl RetrievalProvider for FixedRetrieval {
        async fn search(&self, query: &str, top_k: usize) -> Result<RetrievalResult> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(RetrievalResult {
                query: query.to_string(),
                matches: self
                    .scores
                    .iter()
                    .take(top_k)
                    .enumerate()
                    .map(|(i, &score)| RetrievalItem {
                        id: format!("{:03}", i + 1),
                        title: format!("Game {}", i + 1),
                        score,
                        metadata: BTreeMap::new(),
                        description: format!("Description {}", i + 1),
                    })
                    .collect(),
            })
        }
    }

    struct CountingWebSearch {
        calls: AtomicUsize,
        queries: Mutex<Vec<(String, usize)>>,
        results: usize,
        fail: bool,
    }

    impl CountingWebSearch {
        fn new(results: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                queries: Mutex::new(Vec::new()),
                results,
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                queries: Mutex::new(Vec::new()),
                results: 0,
                fail: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WebSearchProvider for CountingWebSearch {
        fn name(&self) -> &str {
            "stub"
        }

        async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebSearchItem>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries
                .lock()
                .unwrap()
                .push((query.to_string(), max_results));
            if self.fail {
                anyhow::bail!("search backend unavailable");
            }
            // Deliberately ignores max_results so the caller's cap is tested.
            Ok((0..self.results)
                .map(|i| WebSearchItem {
                    title: format!("Page {}", i),
                    url: format!("https://example.com/{}", i),
                    content: format!("content {}", i),
                    score: Some(0.5),
                })
                .collect())
        }
    }

    /// Signals when a search starts, then never answers in time.
    struct StalledWebSearch {
        started: tokio::sync::Notify,
    }

    #[async_trait]
    impl WebSearchProvider for StalledWebSearch {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<WebSearchItem>> {
            self.started.notify_one();
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
    }

    fn stalled_web_search() -> Arc<StalledWebSearch> {
        Arc::new(StalledWebSearch {
            started: tokio::sync::Notify::new(),
        })
    }

    fn agent(retrieval: Arc<dyn RetrievalProvider>, web: Arc<dyn WebSearchProvider>) -> Agent {
        Agent::new(retrieval, web, ResponseSynthesizer::new(None))
    }

    #[test]
    fn test_transitions() {
        let high = EvaluationResult {
            sufficiency: Sufficiency::High,
            confidence: 0.9,
            rationale: String::new(),
        };
        let medium = EvaluationResult {
            sufficiency: Sufficiency::Medium,
            ..high.clone()
        };

        assert_eq!(AgentState::Retrieve.next(None), Some(AgentState::Evaluate));
        assert_eq!(
            AgentState::Evaluate.next(Some(&high)),
            Some(AgentState::Respond)
        );
        assert_eq!(
            AgentState::Evaluate.next(Some(&medium)),
            Some(AgentState::WebSearch)
        );
        assert_eq!(AgentState::Evaluate.next(None), Some(AgentState::WebSearch));
        assert_eq!(AgentState::WebSearch.next(None), Some(AgentState::Respond));
        assert_eq!(AgentState::Respond.next(Some(&high)), None);
    }

    #[tokio::test]
    async fn test_high_sufficiency_skips_web_search() {
        let web = CountingWebSearch::new(3);
        let answer = agent(FixedRetrieval::new(&[0.9, 0.85, 0.8]), web.clone())
            .answer("Who made Gran Turismo?", 5)
            .await
            .unwrap();

        assert_eq!(web.calls(), 0);
        assert_eq!(answer.retrieval_evaluation.sufficiency, Sufficiency::High);
        assert!(!answer.used_web_fallback);
        assert_eq!(
            answer.tool_usage,
            vec![
                "local_index.search".to_string(),
                "generation.local_summary".to_string()
            ]
        );
        assert_eq!(answer.execution_trace.len(), 3);
        assert!(answer.execution_trace[0].starts_with("retrieve: 3 local matches"));
    }

    #[tokio::test]
    async fn test_medium_and_low_search_once() {
        for scores in [&[0.65, 0.35][..], &[0.3, 0.1][..], &[][..]] {
            let web = CountingWebSearch::new(2);
            let answer = agent(FixedRetrieval::new(scores), web.clone())
                .answer("Tell me about Pokemon Gold", 5)
                .await
                .unwrap();

            assert_eq!(web.calls(), 1, "scores {:?}", scores);
            assert!(answer.used_web_fallback);
            assert!(answer.confidence >= 0.65 && answer.confidence <= 0.95);
            assert!(answer.tool_usage.contains(&"web_search.stub".to_string()));
            assert_eq!(answer.execution_trace.len(), 4);
        }
    }

    #[tokio::test]
    async fn test_web_query_prefix_and_cap() {
        let web = CountingWebSearch::new(9);
        let answer = agent(FixedRetrieval::new(&[0.2]), web.clone())
            .answer("Which studio made Halo?", 5)
            .await
            .unwrap();

        let queries = web.queries.lock().unwrap();
        assert_eq!(
            queries[0],
            ("video game research: Which studio made Halo?".to_string(), 5)
        );
        // 1 local + 5 web citations
        assert_eq!(answer.citations.len(), 6);
    }

    #[tokio::test]
    async fn test_top_k_raised_to_one() {
        let answer = agent(FixedRetrieval::new(&[0.9, 0.9]), CountingWebSearch::new(0))
            .answer("q", 0)
            .await
            .unwrap();
        assert_eq!(answer.citations, vec!["local:001".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_web_search_is_no_results() {
        let web = CountingWebSearch::failing();
        let answer = agent(FixedRetrieval::new(&[0.3]), web.clone())
            .answer("q", 5)
            .await
            .unwrap();

        assert_eq!(web.calls(), 1);
        assert!(!answer.used_web_fallback);
        assert_eq!(answer.retrieval_evaluation.sufficiency, Sufficiency::Low);
        assert!(answer
            .execution_trace
            .iter()
            .any(|line| line.contains("search backend unavailable")));
    }

    #[tokio::test]
    async fn test_disabled_web_search_not_reported_as_tool() {
        let answer = agent(
            FixedRetrieval::new(&[0.3]),
            Arc::new(crate::web_search::DisabledWebSearch),
        )
        .answer("q", 5)
        .await
        .unwrap();

        assert!(!answer.used_web_fallback);
        assert!(!answer.tool_usage.iter().any(|t| t.starts_with("web_search")));
        assert!(answer.execution_trace[2].contains("skipped"));
    }

    #[tokio::test]
    async fn test_retrieval_timeout() {
        let slow = Arc::new(FixedRetrieval {
            scores: vec![0.9],
            delay: Some(Duration::from_secs(30)),
        });
        let err = agent(slow, CountingWebSearch::new(0))
            .with_timeouts(1, 1)
            .answer("q", 5)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AgentError::Timeout {
                provider: ProviderKind::Retrieval,
                secs: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let web = CountingWebSearch::new(1);
        let agent = agent(FixedRetrieval::new(&[0.3]), web.clone());
        agent.cancellation_token().cancel();

        let err = agent.answer("q", 5).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::Cancelled {
                provider: ProviderKind::Retrieval
            }
        ));
        assert_eq!(web.calls(), 0);
    }

    #[tokio::test]
    async fn test_web_search_timeout_is_no_results() {
        let answer = agent(FixedRetrieval::new(&[0.3]), stalled_web_search())
            .with_timeouts(60, 1)
            .answer("q", 5)
            .await
            .unwrap();

        assert!(!answer.used_web_fallback);
        assert_eq!(answer.retrieval_evaluation.sufficiency, Sufficiency::Low);
        assert!(answer.tool_usage.contains(&"web_search.stalled".to_string()));
        assert!(answer
            .execution_trace
            .iter()
            .any(|line| line.contains("web search timed out after 1s")));
    }

    #[tokio::test]
    async fn test_cancel_during_web_search_aborts() {
        let web = stalled_web_search();
        let agent = agent(FixedRetrieval::new(&[0.3]), web.clone());
        let cancel = agent.cancellation_token();

        let (result, _) = tokio::join!(agent.answer("q", 5), async {
            web.started.notified().await;
            cancel.cancel();
        });

        assert!(matches!(
            result.unwrap_err(),
            AgentError::Cancelled {
                provider: ProviderKind::WebSearch
            }
        ));
    }

    #[tokio::test]
    async fn test_retrieval_error_aborts() {
        struct Broken;

        #[async_trait]
        impl RetrievalProvider for Broken {
            async fn search(&self, _query: &str, _top_k: usize) -> Result<RetrievalResult> {
                anyhow::bail!("index is corrupt")
            }
        }

        let err = agent(Arc::new(Broken), CountingWebSearch::new(0))
            .answer("q", 5)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "retrieval failed: index is corrupt");
    }
}
