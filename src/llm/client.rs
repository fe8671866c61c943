//! Gemini REST client.

use anyhow::{Context, Result};
use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use super::error::ProviderError;
use super::{EmbedMode, EmbeddingProvider};
use crate::config::PilotConfig;

/// Reply of every chat-level call made while no API key is configured.
pub const NOT_CONFIGURED_MESSAGE: &str =
    "Error: API key is not set. Run `pilot config set-key <key>` or export GEMINI_API_KEY.";

/// Client for the Gemini `generateContent` and `embedContent` endpoints.
///
/// Constructed explicitly from a [`PilotConfig`]. Without an API key the
/// client is built in a not-ready state: every call fails with
/// [`ProviderError::NotConfigured`] instead of reaching the network.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
    chat_model: String,
    embedding_model: String,
}

impl GeminiClient {
    pub fn new(config: &PilotConfig) -> Result<Self> {
        config.validate()?;

        let http = Client::builder()
            .user_agent(concat!("pilot-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        let api_key = config.api_key_secret();
        if api_key.is_none() {
            warn!("no API key configured, LLM calls are disabled");
        }

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            chat_model: model_id(&config.chat_model).to_string(),
            embedding_model: model_id(&config.embedding_model).to_string(),
        })
    }

    /// Whether calls can reach the backend.
    pub fn is_ready(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn chat_model(&self) -> &str {
        &self.chat_model
    }

    /// Generate a completion for a single-turn prompt.
    pub async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = self.endpoint(&self.chat_model, "generateContent");
        debug!(model = %self.chat_model, prompt_chars = prompt.len(), "generating");

        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        });
        let text = self.post(&url, &body).await?;
        parse_generate_response(&text)
    }

    /// Chat-level call: failures come back as a readable message.
    pub async fn chat(&self, prompt: &str) -> String {
        match self.generate(prompt).await {
            Ok(text) => text,
            Err(ProviderError::NotConfigured(_)) => NOT_CONFIGURED_MESSAGE.to_string(),
            Err(e) => {
                warn!(error = %e, "chat request failed");
                format!("API Error: {}", e)
            }
        }
    }

    /// Same client with the key removed, for offline tests.
    #[cfg(test)]
    pub(crate) fn without_key(mut self) -> Self {
        self.api_key = None;
        self
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, model, method)
    }

    async fn post(&self, url: &str, body: &serde_json::Value) -> Result<String, ProviderError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ProviderError::NotConfigured("missing API key".to_string()))?;

        let resp = self
            .http
            .post(url)
            .header("x-goog-api-key", api_key.expose_secret())
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(ProviderError::from_status(
                status.as_u16(),
                &text,
                retry_after,
            ));
        }

        Ok(text)
    }
}

impl EmbeddingProvider for GeminiClient {
    async fn embed(&self, text: &str, mode: EmbedMode) -> Result<Vec<f32>, ProviderError> {
        let url = self.endpoint(&self.embedding_model, "embedContent");

        let body = serde_json::json!({
            "model": format!("models/{}", self.embedding_model),
            "content": { "parts": [{ "text": text }] },
            "taskType": mode.task_type(),
        });
        let reply = self.post(&url, &body).await?;
        parse_embed_response(&reply)
    }
}

/// Accept both `gemini-2.5-pro` and `models/gemini-2.5-pro`.
fn model_id(name: &str) -> &str {
    let name = name.trim();
    name.strip_prefix("models/").unwrap_or(name)
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Option<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

fn parse_embed_response(body: &str) -> Result<Vec<f32>, ProviderError> {
    let response: EmbedResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::Malformed(format!("embedding response: {}", e)))?;

    match response.embedding {
        Some(e) if !e.values.is_empty() => Ok(e.values),
        _ => Err(ProviderError::Malformed("empty embedding".to_string())),
    }
}

fn parse_generate_response(body: &str) -> Result<String, ProviderError> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::Malformed(format!("generation response: {}", e)))?;

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Malformed("no candidates returned".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
        return Err(ProviderError::Malformed(format!(
            "empty candidate (finish reason: {})",
            reason
        )));
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderErrorKind;

    fn unconfigured() -> GeminiClient {
        GeminiClient::new(&PilotConfig::default()).unwrap().without_key()
    }

    #[test]
    fn test_model_id_strips_prefix() {
        assert_eq!(model_id("models/text-embedding-004"), "text-embedding-004");
        assert_eq!(model_id(" gemini-2.5-pro "), "gemini-2.5-pro");
    }

    #[test]
    fn test_endpoint_format() {
        let mut config = PilotConfig::default();
        config.base_url = "http://localhost:8080/".to_string();
        let client = GeminiClient::new(&config).unwrap();
        assert_eq!(
            client.endpoint("text-embedding-004", "embedContent"),
            "http://localhost:8080/v1beta/models/text-embedding-004:embedContent"
        );
    }

    #[test]
    fn test_parse_embed_response() {
        let values = parse_embed_response(r#"{"embedding":{"values":[0.1,0.2,0.3]}}"#).unwrap();
        assert_eq!(values, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_parse_embed_response_empty_is_malformed() {
        let err = parse_embed_response(r#"{"embedding":{"values":[]}}"#).unwrap_err();
        assert_eq!(err.kind(), ProviderErrorKind::Malformed);
        let err = parse_embed_response("{}").unwrap_err();
        assert_eq!(err.kind(), ProviderErrorKind::Malformed);
        let err = parse_embed_response("<html>").unwrap_err();
        assert_eq!(err.kind(), ProviderErrorKind::Malformed);
    }

    #[test]
    fn test_parse_generate_response_joins_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Hello, "},{"text":"world"}]}}]}"#;
        assert_eq!(parse_generate_response(body).unwrap(), "Hello, world");
    }

    #[test]
    fn test_parse_generate_response_blocked() {
        let body = r#"{"candidates":[{"finishReason":"SAFETY"}]}"#;
        let err = parse_generate_response(body).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
        assert!(parse_generate_response(r#"{"candidates":[]}"#).is_err());
    }

    #[tokio::test]
    async fn test_unconfigured_client_fails_without_network() {
        let client = unconfigured();
        assert!(!client.is_ready());

        let err = client.embed("text", EmbedMode::Query).await.unwrap_err();
        assert_eq!(err.kind(), ProviderErrorKind::NotConfigured);

        let err = client.generate("hi").await.unwrap_err();
        assert_eq!(err.kind(), ProviderErrorKind::NotConfigured);
    }

    #[tokio::test]
    async fn test_chat_returns_sentinel_when_unconfigured() {
        let client = unconfigured();
        assert_eq!(client.chat("hi").await, NOT_CONFIGURED_MESSAGE);
    }
}
