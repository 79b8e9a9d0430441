//! Answer synthesis from local matches and web results.
//!
//! Builds a bounded context from the retrieval matches (ranking order)
//! followed by the web results (provider order), then either asks the
//! text generator for an answer or falls back to a plain context summary
//! when no generator is configured.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agent::guarded;
use crate::error::{AgentError, ProviderKind};
use crate::evaluate::clamp_unit;
use crate::models::{AgentAnswer, EvaluationResult, RetrievalResult, Sufficiency, WebSearchItem};
use crate::traits::TextGenerator;

pub const DEFAULT_MAX_CONTEXT_BLOCKS: usize = 8;
pub const DEFAULT_SUMMARY_MAX_CHARS: usize = 2000;

/// Confidence band applied when web results back a non-high evaluation.
pub const WEB_CONFIDENCE_FLOOR: f64 = 0.65;
pub const WEB_CONFIDENCE_CAP: f64 = 0.95;

pub const EMPTY_CONTEXT: &str = "No supporting context found.";
pub const NO_GENERATOR_NOTICE: &str =
    "UdaPlay could not access an LLM API key. Here is the retrieved context summary:";

/// Ordered context blocks with the citations of every contributing source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisContext {
    pub blocks: Vec<String>,
    pub citations: Vec<String>,
}

/// Collect blocks and citations. Citations cover every source, including
/// those whose block later falls outside the context cap.
pub fn build_context(retrieval: &RetrievalResult, web_results: &[WebSearchItem]) -> SynthesisContext {
    let mut ctx = SynthesisContext::default();

    for item in &retrieval.matches {
        ctx.citations.push(format!("local:{}", item.id));
        ctx.blocks.push(item.description.clone());
    }

    for item in web_results {
        ctx.citations.push(item.url.clone());
        ctx.blocks
            .push(format!("Web Source: {}\n{}", item.title, item.content));
    }

    ctx
}

/// Join the first `max_blocks` blocks with blank lines.
pub fn render_context(blocks: &[String], max_blocks: usize) -> String {
    let context = blocks
        .iter()
        .take(max_blocks)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n\n");

    if context.is_empty() {
        EMPTY_CONTEXT.to_string()
    } else {
        context
    }
}

pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are UdaPlay, a video game research assistant.\n\
         Answer using the provided context, be explicit about uncertainty, and cite sources inline.\n\
         Question: {}\n\n\
         Context:\n{}",
        question, context
    )
}

/// Answer text used when no generator is available. Truncates on
/// character boundaries, never mid code point.
pub fn fallback_summary(context: &str, max_chars: usize) -> String {
    let summary: String = context.chars().take(max_chars).collect();
    format!("{}\n\n{}", NO_GENERATOR_NOTICE, summary)
}

pub fn adjust_confidence(evaluation: &EvaluationResult, used_web: bool) -> f64 {
    let confidence = evaluation.confidence;
    if used_web && evaluation.sufficiency != Sufficiency::High {
        clamp_unit(confidence.max(WEB_CONFIDENCE_FLOOR).min(WEB_CONFIDENCE_CAP))
    } else {
        clamp_unit(confidence)
    }
}

fn dedup_sorted(citations: Vec<String>) -> Vec<String> {
    citations
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Produces the final [`AgentAnswer`] for a question.
pub struct ResponseSynthesizer {
    generator: Option<Arc<dyn TextGenerator>>,
    max_context_blocks: usize,
    summary_max_chars: usize,
    timeout_secs: u64,
    cancel: CancellationToken,
}

impl ResponseSynthesizer {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self {
            generator,
            max_context_blocks: DEFAULT_MAX_CONTEXT_BLOCKS,
            summary_max_chars: DEFAULT_SUMMARY_MAX_CHARS,
            timeout_secs: 60,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_limits(mut self, max_context_blocks: usize, summary_max_chars: usize) -> Self {
        self.max_context_blocks = max_context_blocks.max(1);
        self.summary_max_chars = summary_max_chars;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// `generation.<name>` or `generation.local_summary`.
    pub fn tool_name(&self) -> String {
        match &self.generator {
            Some(generator) => format!("generation.{}", generator.name()),
            None => "generation.local_summary".to_string(),
        }
    }

    /// Build the answer. `execution_trace` is left empty for the caller;
    /// `tool_usage` holds the generation step only.
    pub async fn synthesize(
        &self,
        question: &str,
        retrieval: &RetrievalResult,
        evaluation: &EvaluationResult,
        web_results: &[WebSearchItem],
    ) -> Result<AgentAnswer, AgentError> {
        let SynthesisContext { blocks, citations } = build_context(retrieval, web_results);
        if blocks.len() > self.max_context_blocks {
            tracing::debug!(
                blocks = blocks.len(),
                kept = self.max_context_blocks,
                "dropping context blocks over the cap"
            );
        }
        let context = render_context(&blocks, self.max_context_blocks);

        let answer = match &self.generator {
            Some(generator) => {
                let prompt = build_prompt(question, &context);
                guarded(
                    ProviderKind::Generation,
                    self.timeout_secs,
                    &self.cancel,
                    generator.generate(&prompt),
                )
                .await?
            }
            None => fallback_summary(&context, self.summary_max_chars),
        };

        let used_web_fallback = !web_results.is_empty();

        Ok(AgentAnswer {
            question: question.to_string(),
            answer,
            confidence: adjust_confidence(evaluation, used_web_fallback),
            retrieval_evaluation: evaluation.clone(),
            citations: dedup_sorted(citations),
            used_web_fallback,
            execution_trace: Vec::new(),
            tool_usage: vec![self.tool_name()],
        })
    }
}
