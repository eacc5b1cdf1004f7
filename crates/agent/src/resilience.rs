//! Completion resilience chain.
//!
//! PRIMARY is tried first. On failure the error is classified, the fallback
//! provider is built once per chain and the prompt is re-issued. When that
//! fails too a canned, category-specific message is returned. Every path is
//! post-processed for the chat transport and the result is never empty.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use storedesk_core::config::LlmConfig;
use storedesk_core::errors::ErrorCategory;

use crate::llm::{normalize_reply, CompletionProvider, HttpCompletionProvider, ProviderError};
use crate::render::sanitize_for_transport;

pub type FallbackFactory =
    Box<dyn Fn() -> Result<Arc<dyn CompletionProvider>, ProviderError> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompletionTimeouts {
    pub primary: Duration,
    pub fallback: Duration,
}

impl CompletionTimeouts {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            primary: Duration::from_secs(config.timeout_secs),
            fallback: Duration::from_secs(config.fallback_timeout_secs),
        }
    }
}

impl Default for CompletionTimeouts {
    fn default() -> Self {
        Self { primary: Duration::from_secs(30), fallback: Duration::from_secs(30) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRequest {
    pub prompt: String,
    /// The operator's own words, echoed back in canned replies.
    pub original_request: Option<String>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), original_request: None }
    }

    pub fn with_original_request(mut self, original_request: impl Into<String>) -> Self {
        self.original_request = Some(original_request.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPath {
    Primary,
    Fallback,
    Canned,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub text: String,
    pub path: CompletionPath,
    /// Category of the primary failure, when there was one.
    pub error: Option<ErrorCategory>,
}

pub struct ResilienceChain {
    primary: Arc<dyn CompletionProvider>,
    fallback_factory: FallbackFactory,
    fallback: OnceCell<Option<Arc<dyn CompletionProvider>>>,
}

impl ResilienceChain {
    pub fn new(primary: Arc<dyn CompletionProvider>, fallback_factory: FallbackFactory) -> Self {
        Self { primary, fallback_factory, fallback: OnceCell::new() }
    }

    /// Chain whose fallback is an already-built provider.
    pub fn with_fallback(
        primary: Arc<dyn CompletionProvider>,
        fallback: Arc<dyn CompletionProvider>,
    ) -> Self {
        Self::new(primary, Box::new(move || Ok(Arc::clone(&fallback))))
    }

    /// HTTP primary plus a lazily built HTTP fallback from the same config.
    pub fn from_config(config: &LlmConfig) -> Result<Self, ProviderError> {
        let primary: Arc<dyn CompletionProvider> = Arc::new(HttpCompletionProvider::primary(config)?);
        let fallback_config = config.clone();
        Ok(Self::new(
            primary,
            Box::new(move || {
                let fallback: Arc<dyn CompletionProvider> =
                    Arc::new(HttpCompletionProvider::fallback(&fallback_config)?);
                Ok(fallback)
            }),
        ))
    }

    pub async fn get_completion(&self, prompt: &str, timeouts: CompletionTimeouts) -> String {
        self.complete(CompletionRequest::new(prompt), timeouts).await.text
    }

    pub async fn complete(
        &self,
        request: CompletionRequest,
        timeouts: CompletionTimeouts,
    ) -> CompletionOutcome {
        let primary_error =
            match attempt(self.primary.as_ref(), &request.prompt, timeouts.primary).await {
                Ok(text) => {
                    return CompletionOutcome { text, path: CompletionPath::Primary, error: None };
                }
                Err(error) => error,
            };

        let category = primary_error.category();
        warn!(
            event_name = "agent.completion.primary_failed",
            provider = self.primary.name(),
            error_category = category.as_str(),
            error = %primary_error,
            "primary completion failed"
        );

        if let Some(fallback) = self.fallback_provider().await {
            match attempt(fallback.as_ref(), &request.prompt, timeouts.fallback).await {
                Ok(text) => {
                    info!(
                        event_name = "agent.completion.fallback",
                        provider = fallback.name(),
                        error_category = category.as_str(),
                        "fallback completion succeeded"
                    );
                    return CompletionOutcome {
                        text,
                        path: CompletionPath::Fallback,
                        error: Some(category),
                    };
                }
                Err(error) => {
                    warn!(
                        event_name = "agent.completion.fallback_failed",
                        provider = fallback.name(),
                        error_category = error.category().as_str(),
                        error = %error,
                        "fallback completion failed"
                    );
                }
            }
        }

        CompletionOutcome {
            text: canned_response(category, request.original_request.as_deref()),
            path: CompletionPath::Canned,
            error: Some(category),
        }
    }

    async fn fallback_provider(&self) -> Option<Arc<dyn CompletionProvider>> {
        self.fallback
            .get_or_init(|| async {
                match (self.fallback_factory)() {
                    Ok(provider) => {
                        info!(
                            event_name = "agent.completion.fallback_initialized",
                            provider = provider.name(),
                            "fallback provider initialized"
                        );
                        Some(provider)
                    }
                    Err(error) => {
                        warn!(
                            event_name = "agent.completion.fallback_unavailable",
                            error = %error,
                            "fallback provider could not be initialized"
                        );
                        None
                    }
                }
            })
            .await
            .clone()
    }
}

async fn attempt(
    provider: &dyn CompletionProvider,
    prompt: &str,
    timeout: Duration,
) -> Result<String, ProviderError> {
    let raw = match tokio::time::timeout(timeout, provider.complete(prompt)).await {
        Ok(result) => result?,
        Err(_) => return Err(ProviderError::Timeout(timeout)),
    };

    let reply = normalize_reply(&raw)
        .ok_or_else(|| ProviderError::Malformed("no text in provider reply".to_string()))?;
    let text = sanitize_for_transport(&reply.into_text());
    if text.is_empty() {
        return Err(ProviderError::Malformed("reply was empty after post-processing".to_string()));
    }
    Ok(text)
}

/// Deterministic reply for a failed completion, echoing the request when known.
pub fn canned_response(category: ErrorCategory, original_request: Option<&str>) -> String {
    let base = category.user_message();
    let echoed = original_request
        .map(sanitize_for_transport)
        .filter(|request| !request.is_empty())
        .map(|request| format!("{base} Your request was: \"{request}\"."));
    echoed.unwrap_or_else(|| base.to_string())
}
