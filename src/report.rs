//! Markdown rendering of an [`AgentAnswer`].

use crate::models::AgentAnswer;

fn bullets(lines: &[String]) -> String {
    if lines.is_empty() {
        return "- None".to_string();
    }
    lines
        .iter()
        .map(|line| format!("- {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn to_markdown(answer: &AgentAnswer) -> String {
    format!(
        "## UdaPlay Response\n\n\
         **Question:** {question}\n\n\
         **Confidence:** {confidence:.2}\n\
         **Retrieval Sufficiency:** {sufficiency}\n\
         **Evaluation Rationale:** {rationale}\n\
         **Used Web Fallback:** {web}\n\n\
         ### Reasoning Trace\n{trace}\n\n\
         ### Tool Usage\n{tools}\n\n\
         ### Answer\n{text}\n\n\
         ### Sources\n{sources}\n",
        question = answer.question,
        confidence = answer.confidence,
        sufficiency = answer.retrieval_evaluation.sufficiency,
        rationale = answer.retrieval_evaluation.rationale,
        web = if answer.used_web_fallback { "Yes" } else { "No" },
        trace = bullets(&answer.execution_trace),
        tools = bullets(&answer.tool_usage),
        text = answer.answer,
        sources = bullets(&answer.citations),
    )
}
