//! Ollama-backed classification oracle.
//!
//! Sends one non-streaming chat request per item with the output schema in
//! Ollama's `format` field, and parses the model's message as JSON.

use super::ClassificationOracle;
use crate::config::OracleConfig;
use crate::error::OracleError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Message in the chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    format: &'a Value,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

pub struct OllamaOracle {
    config: OracleConfig,
    http_client: reqwest::Client,
}

impl OllamaOracle {
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        info!(
            "Initializing oracle with model {} at {}",
            config.model, config.ollama_url
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> OracleError {
        if e.is_timeout() {
            OracleError::Timeout(self.config.timeout_seconds)
        } else if e.is_connect() {
            OracleError::Connect(self.config.ollama_url.clone())
        } else {
            OracleError::Transport(e.to_string())
        }
    }
}

impl ClassificationOracle for OllamaOracle {
    async fn classify(&self, content: &str, schema: &Value) -> Result<Value, OracleError> {
        let url = format!("{}/api/chat", self.config.ollama_url.trim_end_matches('/'));

        let request = OllamaChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: build_prompt(content),
                },
            ],
            stream: false,
            format: schema,
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
        };

        debug!("Sending classification request ({} bytes of content)", content.len());

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status { status, body });
        }

        let body = response.text().await.map_err(|e| self.map_send_error(e))?;
        let chat_response: OllamaChatResponse =
            serde_json::from_str(&body).map_err(|e| OracleError::Malformed {
                reason: format!("unexpected chat response: {}", e),
                raw: body.clone(),
            })?;

        parse_assessment(&chat_response.message.content)
    }
}

/// Build the user prompt for one piece of content.
fn build_prompt(content: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str("Analyze the following content for spam, phishing, and misinformation.\n");
    prompt.push_str("Act as an aggregator of a URL reputation lookup, a multi-engine scan, ");
    prompt.push_str("and a text classification model.\n\n");
    prompt.push_str("=== CONTENT ===\n");
    prompt.push_str(content);
    prompt.push_str("\n=== END OF CONTENT ===\n\n");
    prompt.push_str("Respond with a single JSON object: score (0-100), label ");
    prompt.push_str("(\"No Risk\", \"Low Risk\" or \"High Risk\"), confidence (0-1), explanation, ");
    prompt.push_str("mitigations (list of recommendations), extracted_urls, and signals with ");
    prompt.push_str("the facets reputation, crowdsourced_scan and text_model. ");
    prompt.push_str("Omit a signal facet entirely if you have no data for it.");
    prompt
}

/// Parse the model's reply into a JSON object, tolerating a Markdown code fence.
fn parse_assessment(content: &str) -> Result<Value, OracleError> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let value: Value = serde_json::from_str(unfenced).map_err(|e| OracleError::Malformed {
        reason: e.to_string(),
        raw: content.to_string(),
    })?;

    if !value.is_object() {
        return Err(OracleError::Malformed {
            reason: "expected a JSON object".to_string(),
            raw: content.to_string(),
        });
    }

    Ok(value)
}

/// System prompt for classification requests
const SYSTEM_PROMPT: &str = r#"You are a content security analyst.
You assess text, URLs and documents for spam, phishing and misinformation.
Only output valid JSON matching the requested schema, no explanations or markdown."#;
