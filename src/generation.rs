//! Text generation via the OpenAI Responses API.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{Credentials, GenerationConfig};
use crate::http;
use crate::traits::TextGenerator;

pub struct OpenAIGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f64,
    max_retries: u32,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextGenerator for OpenAIGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "input": prompt,
            "temperature": self.temperature,
        });
        let url = format!("{}/responses", self.base_url);
        let json = http::post_json(
            &self.client,
            "OpenAI",
            &url,
            Some(&self.api_key),
            &body,
            self.max_retries,
        )
        .await
        .context("OpenAI generation request failed")?;

        parse_output_text(&json)
    }
}

/// Extract the answer text from a Responses API body.
///
/// Prefers the top-level `output_text`; otherwise concatenates every
/// `output[].content[]` part of type `output_text`.
pub fn parse_output_text(json: &serde_json::Value) -> Result<String> {
    if let Some(text) = json.get("output_text").and_then(|t| t.as_str()) {
        return Ok(text.to_string());
    }

    let Some(output) = json.get("output").and_then(|o| o.as_array()) else {
        bail!("Invalid OpenAI response: missing output");
    };

    let text: String = output
        .iter()
        .filter_map(|message| message.get("content").and_then(|c| c.as_array()))
        .flatten()
        .filter(|part| part.get("type").and_then(|t| t.as_str()) == Some("output_text"))
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect();

    Ok(text)
}

/// `None` when no OpenAI credential is available; the synthesizer then
/// answers with a context summary.
pub fn create_generator(
    config: &GenerationConfig,
    credentials: &Credentials,
) -> Result<Option<Arc<dyn TextGenerator>>> {
    match &credentials.openai_api_key {
        Some(key) => {
            let generator = OpenAIGenerator::new(config, key.clone())?;
            tracing::debug!(model = generator.model(), "text generation enabled");
            let generator: Arc<dyn TextGenerator> = Arc::new(generator);
            Ok(Some(generator))
        }
        None => {
            tracing::info!("OPENAI_API_KEY not set; answers will be context summaries");
            Ok(None)
        }
    }
}
