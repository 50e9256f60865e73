use std::path::{Path, PathBuf};

use dispatch_models::config::{
    AvailableModels, DispatchConfig, ModelConfig, Provider, RequestStyle, SynthesisMode,
};
use tracing::{info, warn};

use crate::error::AgentError;

/// A validated configuration together with the file it came from.
///
/// Reloading builds a fresh instance; nothing is cached globally.
#[derive(Debug, Clone)]
pub struct Settings {
    path: PathBuf,
    pub config: DispatchConfig,
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading dispatch config");

        let text = std::fs::read_to_string(path)
            .map_err(|e| AgentError::Config(format!("{}: {e}", path.display())))?;
        let raw: DispatchConfig = toml::from_str(&text)
            .map_err(|e| AgentError::Config(format!("{}: {e}", path.display())))?;

        Ok(Self {
            path: path.to_path_buf(),
            config: resolve(raw)?,
        })
    }

    /// Re-read the same file into a new instance.
    pub fn reload(&self) -> Result<Self, AgentError> {
        Self::load(&self.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Validate a parsed config and fill in load-time decisions.
///
/// - every model role gets a concrete `request_style`
/// - extended thinking is dropped (with a warning) for non-Anthropic models
/// - extended thinking on an Anthropic model outside a non-empty capability
///   list is rejected
/// - `skills` mode requires both stage models
pub fn resolve(mut config: DispatchConfig) -> Result<DispatchConfig, AgentError> {
    let available = config.available_models.clone();
    let models = &mut config.models;

    resolve_model("synthesis", &mut models.synthesis, &available)?;
    if let Some(stage1) = models.throughline_synthesizer.as_mut() {
        resolve_model("throughline_synthesizer", stage1, &available)?;
    }
    if let Some(stage2) = models.callout_extractor.as_mut() {
        resolve_model("callout_extractor", stage2, &available)?;
    }

    if config.synthesis.mode == SynthesisMode::Skills {
        for (role, model) in [
            ("throughline_synthesizer", &models.throughline_synthesizer),
            ("callout_extractor", &models.callout_extractor),
        ] {
            if model.is_none() {
                return Err(AgentError::Config(format!(
                    "skills mode requires [models.{role}]"
                )));
            }
        }
    }

    Ok(config)
}

fn resolve_model(
    role: &str,
    model: &mut ModelConfig,
    available: &AvailableModels,
) -> Result<(), AgentError> {
    if model.request_style.is_none() {
        model.request_style = Some(match model.provider {
            Provider::OpenAi => infer_request_style(&model.model),
            Provider::Anthropic => RequestStyle::Standard,
        });
    }

    if model.provider != Provider::Anthropic {
        if model.extended_thinking.is_some() {
            warn!(
                role,
                model = %model.model,
                "Extended thinking is only supported for Anthropic; disabling"
            );
        }
        model.extended_thinking = None;
        return Ok(());
    }

    if model.thinking_budget().is_some() {
        let thinking_models: Vec<&str> = available
            .anthropic
            .iter()
            .filter(|m| m.supports_thinking)
            .map(|m| m.id.as_str())
            .collect();
        if !thinking_models.is_empty() && !thinking_models.contains(&model.model.as_str()) {
            return Err(AgentError::Config(format!(
                "extended thinking is enabled for {role} but {} does not support it",
                model.model
            )));
        }
    }

    Ok(())
}

/// Request shape for OpenAI model families that deviate from the default.
pub fn infer_request_style(model: &str) -> RequestStyle {
    if model.starts_with("o1") {
        RequestStyle::Reasoning
    } else if model.starts_with("gpt-5") {
        RequestStyle::MaxCompletionTokens
    } else {
        RequestStyle::Standard
    }
}
