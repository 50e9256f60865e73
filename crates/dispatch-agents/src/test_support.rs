//! Test support: a scripted model client and document fixtures.
//!
//! `ScriptedLlm` replays queued replies in order and records every call, so
//! pipeline tests can assert both on the result and on what was sent.

use std::collections::VecDeque;

use async_trait::async_trait;
use dispatch_models::config::{ModelConfig, ModelRoles, Provider, RequestStyle};
use dispatch_models::document::{Document, SourceDate};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::error::AgentError;
use crate::llm::LlmClient;

/// One `generate` call as the client saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub model: String,
    pub system: String,
    pub user: String,
}

impl RecordedCall {
    /// The user message parsed back into JSON.
    pub fn payload(&self) -> Value {
        serde_json::from_str(&self.user).unwrap_or(Value::Null)
    }
}

#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, AgentError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub fn reply(mut self, text: impl Into<String>) -> Self {
        self.replies.get_mut().push_back(Ok(text.into()));
        self
    }

    /// Queue a failed call.
    pub fn fail(mut self, error: AgentError) -> Self {
        self.replies.get_mut().push_back(Err(error));
        self
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate(
        &self,
        config: &ModelConfig,
        system: &str,
        user: &str,
    ) -> Result<String, AgentError> {
        self.calls.lock().await.push(RecordedCall {
            model: config.model.clone(),
            system: system.to_string(),
            user: user.to_string(),
        });
        self.replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(AgentError::Request("no scripted reply left".to_string())))
    }
}

pub fn model(provider: Provider, name: &str) -> ModelConfig {
    ModelConfig {
        provider,
        model: name.to_string(),
        max_tokens: 16000,
        temperature: 0.0,
        extended_thinking: None,
        request_style: Some(RequestStyle::Standard),
    }
}

/// Distinct model names per role so tests can tell the calls apart.
pub fn sample_models() -> ModelRoles {
    ModelRoles {
        synthesis: model(Provider::Anthropic, "synthesis-model"),
        throughline_synthesizer: Some(model(Provider::Anthropic, "throughline-model")),
        callout_extractor: Some(model(Provider::OpenAi, "callout-model")),
    }
}

/// A parsed research document carrying one primary theme per label.
pub fn research_document(source: &str, name: &str, theme_labels: &[&str]) -> Document {
    let themes: Vec<Value> = theme_labels
        .iter()
        .map(|label| {
            json!({
                "label": label,
                "context": format!("{source} on {label}"),
                "strength": "Primary",
                "confidence": "High",
            })
        })
        .collect();

    Document {
        id: Some(json!(name)),
        source: Some(source.to_string()),
        document_name: Some(name.to_string()),
        source_date: Some(SourceDate::Text("2025-01-15".to_string())),
        synthesized: Some(false),
        parsed_data: Some(json!({
            "themes": themes,
            "trades": [],
            "metadata": { "publisher": source },
        })),
    }
}

/// Add a trade idea to a document built by [`research_document`].
pub fn with_trade(mut doc: Document, text: &str, conviction: &str) -> Document {
    if let Some(trades) = doc
        .parsed_data
        .as_mut()
        .and_then(|data| data.get_mut("trades"))
        .and_then(|t| t.as_array_mut())
    {
        trades.push(json!({
            "text": text,
            "conviction": conviction,
            "timeframe": "3-6 months",
            "rationale": "Valuation",
        }));
    }
    doc
}
