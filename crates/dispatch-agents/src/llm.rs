use std::time::Duration;

use async_trait::async_trait;
use dispatch_models::config::{
    ModelConfig, Provider, ProviderEndpoint, ProvidersConfig, RequestStyle,
};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{excerpt, AgentError};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Separator used when a reasoning model needs system and user text merged.
const MERGED_PROMPT_SEPARATOR: &str = "\n\n---\n\n";

/// Sends one prompt pair to a model and returns its text. Mockable for testing.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(
        &self,
        config: &ModelConfig,
        system: &str,
        user: &str,
    ) -> Result<String, AgentError>;
}

/// Credentials and base URL for one provider.
#[derive(Debug, Clone)]
struct Endpoint {
    base_url: String,
    api_key: Option<String>,
    api_key_env: String,
}

impl Endpoint {
    fn new(config: &ProviderEndpoint, default_base_url: &str, api_key: Option<String>) -> Self {
        Self {
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| default_base_url.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            api_key_env: config.api_key_env.clone(),
        }
    }

    fn api_key(&self) -> Result<&str, AgentError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| AgentError::MissingApiKey(self.api_key_env.clone()))
    }
}

/// HTTP client for the Anthropic Messages and OpenAI Chat Completions APIs.
///
/// A missing API key only fails calls to that provider, so a run that uses
/// a single provider needs a single key.
pub struct HttpLlmClient {
    http: Client,
    timeout: Duration,
    anthropic: Endpoint,
    openai: Endpoint,
}

impl HttpLlmClient {
    /// Build a client reading API keys from the configured environment variables.
    pub fn from_env(providers: &ProvidersConfig, timeout: Duration) -> Result<Self, AgentError> {
        let anthropic_key = std::env::var(&providers.anthropic.api_key_env).ok();
        let openai_key = std::env::var(&providers.openai.api_key_env).ok();
        Self::with_keys(providers, timeout, anthropic_key, openai_key)
    }

    /// Build a client with explicitly provided API keys.
    pub fn with_keys(
        providers: &ProvidersConfig,
        timeout: Duration,
        anthropic_key: Option<String>,
        openai_key: Option<String>,
    ) -> Result<Self, AgentError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Request(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            timeout,
            anthropic: Endpoint::new(&providers.anthropic, ANTHROPIC_BASE_URL, anthropic_key),
            openai: Endpoint::new(&providers.openai, OPENAI_BASE_URL, openai_key),
        })
    }

    async fn generate_anthropic(
        &self,
        config: &ModelConfig,
        system: &str,
        user: &str,
    ) -> Result<String, AgentError> {
        let api_key = self.anthropic.api_key()?;
        let url = format!("{}/messages", self.anthropic.base_url);
        info!(
            model = %config.model,
            thinking = config.thinking_budget().is_some(),
            "Calling Anthropic"
        );

        let request = self
            .http
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&anthropic_request_body(config, system, user));
        let body = self.send(request, "Anthropic").await?;
        anthropic_text(&body)
    }

    async fn generate_openai(
        &self,
        config: &ModelConfig,
        system: &str,
        user: &str,
    ) -> Result<String, AgentError> {
        let api_key = self.openai.api_key()?;
        let url = format!("{}/chat/completions", self.openai.base_url);
        let style = config.request_style.unwrap_or_default();
        info!(model = %config.model, style = ?style, "Calling OpenAI");

        let request = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&openai_request_body(config, style, system, user));
        let body = self.send(request, "OpenAI").await?;
        openai_text(&body)
    }

    /// Send a request and return the decoded JSON body of a 2xx response.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        provider: &str,
    ) -> Result<Value, AgentError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AgentError::Timeout(self.timeout.as_secs())
            } else {
                AgentError::Request(format!("Request to {provider} failed: {e}"))
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AgentError::Request(format!("Failed to read {provider} response: {e}")))?;

        if !status.is_success() {
            warn!(provider, status = status.as_u16(), "Model API returned an error");
            return Err(map_http_error(provider, status, &text));
        }

        debug!(provider, bytes = text.len(), "Model API response received");
        serde_json::from_str(&text)
            .map_err(|e| AgentError::Envelope(format!("{provider} returned invalid JSON: {e}")))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn generate(
        &self,
        config: &ModelConfig,
        system: &str,
        user: &str,
    ) -> Result<String, AgentError> {
        match config.provider {
            Provider::Anthropic => self.generate_anthropic(config, system, user).await,
            Provider::OpenAi => self.generate_openai(config, system, user).await,
        }
    }
}

fn map_http_error(provider: &str, status: StatusCode, body: &str) -> AgentError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AgentError::Auth(provider.to_string()),
        _ => AgentError::Api {
            provider: provider.to_string(),
            status: status.as_u16(),
            body: excerpt(body),
        },
    }
}

/// Messages API body. Extended thinking replaces `temperature`.
pub fn anthropic_request_body(config: &ModelConfig, system: &str, user: &str) -> Value {
    let mut body = json!({
        "model": config.model,
        "max_tokens": config.max_tokens,
        "system": system,
        "messages": [{"role": "user", "content": user}],
    });

    match config.thinking_budget() {
        Some(budget) => {
            body["thinking"] = json!({"type": "enabled", "budget_tokens": budget});
        }
        None => {
            body["temperature"] = json!(config.temperature);
        }
    }

    body
}

/// Chat Completions body shaped for the model family.
pub fn openai_request_body(
    config: &ModelConfig,
    style: RequestStyle,
    system: &str,
    user: &str,
) -> Value {
    match style {
        RequestStyle::Reasoning => json!({
            "model": config.model,
            "messages": [
                {"role": "user", "content": format!("{system}{MERGED_PROMPT_SEPARATOR}{user}")}
            ],
            "max_completion_tokens": config.max_tokens,
        }),
        RequestStyle::Standard | RequestStyle::MaxCompletionTokens => {
            let mut body = json!({
                "model": config.model,
                "messages": [
                    {"role": "system", "content": system},
                    {"role": "user", "content": user},
                ],
                "temperature": config.temperature,
            });
            let length_key = if style == RequestStyle::MaxCompletionTokens {
                "max_completion_tokens"
            } else {
                "max_tokens"
            };
            body[length_key] = json!(config.max_tokens);
            body
        }
    }
}

/// Text of the first `text` block. Thinking blocks are skipped; a response
/// without any text block yields an empty string.
pub fn anthropic_text(body: &Value) -> Result<String, AgentError> {
    let blocks = body
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| AgentError::Envelope("Missing 'content' array in response".to_string()))?;

    Ok(blocks
        .iter()
        .find(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .and_then(|block| block.get("text"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string())
}

/// `choices[0].message.content`, empty when the content is null.
pub fn openai_text(body: &Value) -> Result<String, AgentError> {
    let message = body
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| AgentError::Envelope("No choices in response".to_string()))?;

    Ok(message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string())
}
