//! Core data models used throughout UdaPlay.
//!
//! These types represent the game records, retrieval results, evaluations
//! and answers that flow through the ingestion and question-answering
//! pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A game record as it appears in the ingestion JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub genre: Vec<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub platforms: Vec<String>,
}

impl GameRecord {
    /// Text that is embedded and later handed to the synthesizer as context.
    pub fn to_document(&self) -> String {
        format!(
            "Title: {}\nDescription: {}\nGenre: {}\nPublisher: {}\nRelease Date: {}\nPlatforms: {}",
            self.title,
            self.description,
            self.genre.join(", "),
            self.publisher.as_deref().unwrap_or("Unknown"),
            self.release_date.as_deref().unwrap_or("Unknown"),
            self.platforms.join(", "),
        )
    }

    /// Flat string metadata stored next to the document.
    pub fn to_metadata(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("title".to_string(), self.title.clone()),
            (
                "publisher".to_string(),
                self.publisher.clone().unwrap_or_else(|| "Unknown".to_string()),
            ),
            (
                "release_date".to_string(),
                self.release_date
                    .clone()
                    .unwrap_or_else(|| "Unknown".to_string()),
            ),
            ("genre".to_string(), self.genre.join(", ")),
            ("platforms".to_string(), self.platforms.join(", ")),
        ])
    }
}

/// One ranked match from the local index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalItem {
    pub id: String,
    pub title: String,
    pub score: f64,
    pub metadata: BTreeMap<String, String>,
    pub description: String,
}

/// The query plus its matches, in provider ranking order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub query: String,
    pub matches: Vec<RetrievalItem>,
}

impl RetrievalResult {
    pub fn empty(query: &str) -> Self {
        Self {
            query: query.to_string(),
            matches: Vec::new(),
        }
    }
}

/// How far the local index alone can be trusted for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sufficiency {
    Low,
    Medium,
    High,
}

impl Sufficiency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sufficiency::Low => "low",
            Sufficiency::Medium => "medium",
            Sufficiency::High => "high",
        }
    }
}

impl fmt::Display for Sufficiency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the sufficiency evaluator. `confidence` is always in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub sufficiency: Sufficiency,
    pub confidence: f64,
    pub rationale: String,
}

/// A single web search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSearchItem {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default)]
    pub score: Option<f64>,
}

/// The final, cited answer returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAnswer {
    pub question: String,
    pub answer: String,
    pub confidence: f64,
    pub retrieval_evaluation: EvaluationResult,
    #[serde(default)]
    pub citations: Vec<String>,
    #[serde(default)]
    pub used_web_fallback: bool,
    #[serde(default)]
    pub execution_trace: Vec<String>,
    #[serde(default)]
    pub tool_usage: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> GameRecord {
        GameRecord {
            id: "001".to_string(),
            title: "Gran Turismo".to_string(),
            description: "A realistic racing simulator.".to_string(),
            genre: vec!["Racing".to_string(), "Simulation".to_string()],
            publisher: Some("Sony Computer Entertainment".to_string()),
            release_date: None,
            platforms: vec!["PlayStation 1".to_string()],
        }
    }

    #[test]
    fn test_document_layout() {
        let doc = record().to_document();
        assert_eq!(
            doc,
            "Title: Gran Turismo\nDescription: A realistic racing simulator.\nGenre: Racing, Simulation\nPublisher: Sony Computer Entertainment\nRelease Date: Unknown\nPlatforms: PlayStation 1"
        );
    }

    #[test]
    fn test_metadata_defaults_unknown() {
        let meta = record().to_metadata();
        assert_eq!(meta["release_date"], "Unknown");
        assert_eq!(meta["genre"], "Racing, Simulation");
        assert_eq!(meta.len(), 5);
    }

    #[test]
    fn test_optional_fields_default() {
        let rec: GameRecord =
            serde_json::from_str(r#"{"id": "x", "title": "T", "description": "D"}"#).unwrap();
        assert!(rec.genre.is_empty());
        assert!(rec.platforms.is_empty());
        assert!(rec.publisher.is_none());
    }

    #[test]
    fn test_sufficiency_ordering_and_serde() {
        assert!(Sufficiency::High > Sufficiency::Medium);
        assert!(Sufficiency::Medium > Sufficiency::Low);
        assert_eq!(
            serde_json::to_string(&Sufficiency::Medium).unwrap(),
            "\"medium\""
        );
    }
}
