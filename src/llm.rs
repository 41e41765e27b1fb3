//! Language model abstraction and HTTP clients.
//!
//! The [`LanguageModel`] trait is the single capability the answering
//! pipeline needs: turn a fully assembled prompt into plain text.
//!
//! | Config Value | Client | Endpoint |
//! |--------------|--------|----------|
//! | `"gemini"` | [`GeminiModel`] | `POST /v1beta/models/{model}:generateContent` |
//! | `"ollama"` | [`OllamaModel`] | `POST /api/generate` (non-streaming) |
//! | `"openai"` | [`OpenAIChatModel`] | `POST /v1/chat/completions` |
//! | `"disabled"` | `None` | |
//!
//! All clients share the retry policy in [`crate::http`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::http;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;
    /// Generates a completion for `prompt`, returned as plain text.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

fn api_key(config: &LlmConfig, default_env: &str) -> Result<String> {
    let var = config.api_key_env.as_deref().unwrap_or(default_env);
    std::env::var(var).map_err(|_| anyhow::anyhow!("{} environment variable not set", var))
}

// ============ Gemini ============

/// Google Gemini via the Generative Language API.
///
/// The API key is read from the variable named by `llm.api_key_env`
/// (default `GOOGLE_API_KEY`).
pub struct GeminiModel {
    model: String,
    base_url: String,
    api_key: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl GeminiModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "gemini-2.5-flash".to_string()),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            api_key: api_key(config, "GOOGLE_API_KEY")?,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: http::build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": self.temperature },
        });
        let json = http::post_json_with_retry(
            &self.client,
            &url,
            http::Auth::Header("x-goog-api-key", &self.api_key),
            &body,
            self.max_retries,
            "Gemini API",
        )
        .await?;
        parse_gemini_response(&json)
    }
}

/// Concatenates the text parts of the first candidate.
fn parse_gemini_response(json: &serde_json::Value) -> Result<String> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing candidates"))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    Ok(text)
}

// ============ Ollama ============

/// A local Ollama instance (`/api/generate` with `stream: false`).
pub struct OllamaModel {
    model: String,
    url: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for Ollama provider"))?;
        Ok(Self {
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: http::build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": self.temperature },
        });
        let json = http::post_json_with_retry(
            &self.client,
            &format!("{}/api/generate", self.url.trim_end_matches('/')),
            http::Auth::None,
            &body,
            self.max_retries,
            "Ollama API",
        )
        .await?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))
    }
}

// ============ OpenAI ============

/// OpenAI chat completions, sending the prompt as a single user message.
///
/// Requires the variable named by `llm.api_key_env` (default `OPENAI_API_KEY`).
pub struct OpenAIChatModel {
    model: String,
    url: String,
    api_key: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            api_key: api_key(config, "OPENAI_API_KEY")?,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: http::build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let json = http::post_json_with_retry(
            &self.client,
            &format!("{}/v1/chat/completions", self.url.trim_end_matches('/')),
            http::Auth::Bearer(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI API",
        )
        .await?;
        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))
    }
}

/// Create the [`LanguageModel`] named by `[llm].provider`; `"disabled"` yields `None`.
pub fn create_model(config: &LlmConfig) -> Result<Option<Arc<dyn LanguageModel>>> {
    let model: Arc<dyn LanguageModel> = match config.provider.as_str() {
        "disabled" => return Ok(None),
        "gemini" => Arc::new(GeminiModel::new(config)?),
        "ollama" => Arc::new(OllamaModel::new(config)?),
        "openai" => Arc::new(OpenAIChatModel::new(config)?),
        other => bail!("Unknown llm provider: {}", other),
    };
    Ok(Some(model))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_parts_are_concatenated() {
        let json = serde_json::json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "F=" }, { "text": "ma" }] }
            }]
        });
        assert_eq!(parse_gemini_response(&json).unwrap(), "F=ma");
    }

    #[test]
    fn gemini_without_candidates_is_an_error() {
        let json = serde_json::json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        assert!(parse_gemini_response(&json).is_err());
    }

    #[test]
    fn disabled_model_is_none() {
        assert!(create_model(&LlmConfig::default()).unwrap().is_none());
    }

    #[test]
    fn missing_api_key_fails_construction() {
        let config = LlmConfig {
            provider: "gemini".to_string(),
            api_key_env: Some("SAHAYAK_TEST_UNSET_KEY_VAR".to_string()),
            ..LlmConfig::default()
        };
        let err = create_model(&config).err().unwrap();
        assert!(err.to_string().contains("SAHAYAK_TEST_UNSET_KEY_VAR"));
    }

    #[tokio::test]
    async fn gemini_errors_do_not_reveal_the_api_key() {
        let model = GeminiModel {
            model: "gemini-2.5-flash".to_string(),
            base_url: "http://127.0.0.1:1".to_string(),
            api_key: "SECRET_KEY_12345".to_string(),
            temperature: 0.0,
            max_retries: 0,
            client: http::build_client(5).unwrap(),
        };
        let err = model.generate("What is F = ma?").await.unwrap_err();
        let rendered = format!("{:#}", err);
        assert!(rendered.contains("Gemini API"));
        assert!(!rendered.contains("SECRET_KEY_12345"), "{}", rendered);
    }
}
