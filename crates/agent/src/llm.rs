use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;

use storedesk_core::config::{LlmConfig, LlmProvider};
use storedesk_core::errors::ErrorCategory;

const MAX_TOKENS: u32 = 1024;
const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),
    #[error("provider transport failed: {0}")]
    Transport(String),
    #[error("provider reply was unusable: {0}")]
    Malformed(String),
    #[error("provider is unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// 429 is quota, 408/504 and local timeouts are timeouts, 400 is a
    /// content rejection, everything else is general.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Http { status: 429, .. } => ErrorCategory::ProviderQuota,
            Self::Http { status: 408 | 504, .. } | Self::Timeout(_) => {
                ErrorCategory::ProviderTimeout
            }
            Self::Http { status: 400, .. } => ErrorCategory::ProviderContentFilter,
            _ => ErrorCategory::ProviderGeneral,
        }
    }
}

/// Outbound completion call. Implementations return the provider's raw JSON;
/// callers normalize it with [`normalize_reply`].
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, prompt: &str) -> Result<Value, ProviderError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderReply {
    Text(String),
}

impl ProviderReply {
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
        }
    }
}

const TEXT_FIELDS: [&str; 5] = ["text", "content", "output_text", "response", "completion"];

/// Maps every reply shape we accept onto [`ProviderReply::Text`]:
/// a bare string, an object with a text-like field, a content block array,
/// OpenAI `choices`, or a `message.content` envelope.
pub fn normalize_reply(raw: &Value) -> Option<ProviderReply> {
    extract_text(raw, 0).filter(|text| !text.trim().is_empty()).map(ProviderReply::Text)
}

fn extract_text(value: &Value, depth: usize) -> Option<String> {
    if depth > 4 {
        return None;
    }
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Array(items) => {
            let parts: Vec<String> =
                items.iter().filter_map(|item| extract_text(item, depth + 1)).collect();
            (!parts.is_empty()).then(|| parts.join(""))
        }
        Value::Object(map) => {
            if let Some(choice) = map.get("choices").and_then(|choices| choices.get(0)) {
                let from_choice = choice
                    .get("message")
                    .and_then(|message| extract_text(message, depth + 1))
                    .or_else(|| choice.get("text").and_then(|text| extract_text(text, depth + 1)));
                if from_choice.is_some() {
                    return from_choice;
                }
            }
            if let Some(message) = map.get("message") {
                if let Some(text) = extract_text(message, depth + 1) {
                    return Some(text);
                }
            }
            TEXT_FIELDS
                .iter()
                .filter_map(|field| map.get(*field))
                .find_map(|field| extract_text(field, depth + 1))
        }
        _ => None,
    }
}

/// reqwest-backed provider for OpenAI-compatible, Anthropic and Ollama APIs.
pub struct HttpCompletionProvider {
    client: Client,
    provider: LlmProvider,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    timeout: Duration,
    name: String,
}

impl HttpCompletionProvider {
    pub fn new(
        provider: LlmProvider,
        base_url: Option<&str>,
        model: &str,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ProviderError::Unavailable(error.to_string()))?;
        let base_url = base_url
            .map(str::to_string)
            .unwrap_or_else(|| default_base_url(provider).to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            provider,
            base_url,
            model: model.to_string(),
            api_key,
            timeout,
            name: format!("{}:{model}", provider_label(provider)),
        })
    }

    pub fn primary(config: &LlmConfig) -> Result<Self, ProviderError> {
        Self::new(
            config.provider,
            config.base_url.as_deref(),
            &config.model,
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn fallback(config: &LlmConfig) -> Result<Self, ProviderError> {
        Self::new(
            config.provider,
            config.fallback_base_url(),
            config.fallback_model(),
            config.api_key.clone(),
            Duration::from_secs(config.fallback_timeout_secs),
        )
    }

    fn request(&self, prompt: &str) -> Result<reqwest::RequestBuilder, ProviderError> {
        let builder = match self.provider {
            LlmProvider::OpenAi => self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(self.require_key()?)
                .json(&json!({
                    "model": self.model,
                    "max_tokens": MAX_TOKENS,
                    "messages": [{ "role": "user", "content": prompt }],
                })),
            LlmProvider::Anthropic => self
                .client
                .post(format!("{}/v1/messages", self.base_url))
                .header("x-api-key", self.require_key()?)
                .header("anthropic-version", "2023-06-01")
                .json(&json!({
                    "model": self.model,
                    "max_tokens": MAX_TOKENS,
                    "messages": [{ "role": "user", "content": prompt }],
                })),
            LlmProvider::Ollama => self
                .client
                .post(format!("{}/api/generate", self.base_url))
                .json(&json!({ "model": self.model, "prompt": prompt, "stream": false })),
        };
        Ok(builder)
    }

    fn require_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .ok_or_else(|| ProviderError::Unavailable(format!("{} requires an api key", self.name)))
    }
}

#[async_trait]
impl CompletionProvider for HttpCompletionProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &str) -> Result<Value, ProviderError> {
        let response = self
            .request(prompt)?
            .send()
            .await
            .map_err(|error| map_transport_error(error, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let mut message = response.text().await.unwrap_or_default();
            if message.len() > ERROR_BODY_LIMIT {
                let mut cut = ERROR_BODY_LIMIT;
                while !message.is_char_boundary(cut) {
                    cut -= 1;
                }
                message.truncate(cut);
            }
            return Err(ProviderError::Http { status: status.as_u16(), message });
        }

        response.json::<Value>().await.map_err(|error| ProviderError::Malformed(error.to_string()))
    }
}

fn map_transport_error(error: reqwest::Error, timeout: Duration) -> ProviderError {
    if error.is_timeout() {
        return ProviderError::Timeout(timeout);
    }
    match error.status() {
        Some(status) => ProviderError::Http { status: status.as_u16(), message: error.to_string() },
        None => ProviderError::Transport(error.to_string()),
    }
}

fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "https://api.openai.com/v1",
        LlmProvider::Anthropic => "https://api.anthropic.com",
        LlmProvider::Ollama => "http://localhost:11434",
    }
}

fn provider_label(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "openai",
        LlmProvider::Anthropic => "anthropic",
        LlmProvider::Ollama => "ollama",
    }
}
