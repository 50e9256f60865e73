use serde::{Deserialize, Serialize};

/// Top-level configuration for a dispatch run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchConfig {
    #[serde(default)]
    pub synthesis: SynthesisSettings,
    #[serde(default)]
    pub providers: ProvidersConfig,
    pub models: ModelRoles,
    /// Capability list consulted when extended thinking is requested.
    #[serde(default)]
    pub available_models: AvailableModels,
    #[serde(default)]
    pub report: ReportSettings,
}

/// Which synthesis pipeline to run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisMode {
    /// One call producing through-lines and callouts together.
    #[default]
    Monolithic,
    /// Through-line extraction followed by callout extraction.
    Skills,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SynthesisSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub mode: SynthesisMode,
    /// Directory holding `synthesis.md` and `skills/*.md` prompt overrides.
    #[serde(default)]
    pub prompts_dir: Option<String>,
    /// Per-request HTTP timeout for model calls.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: SynthesisMode::default(),
            prompts_dir: None,
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// Endpoint and credential lookup for each provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProvidersConfig {
    #[serde(default = "default_anthropic_endpoint")]
    pub anthropic: ProviderEndpoint,
    #[serde(default = "default_openai_endpoint")]
    pub openai: ProviderEndpoint,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            anthropic: default_anthropic_endpoint(),
            openai: default_openai_endpoint(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderEndpoint {
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Override for the API base URL (e.g. a proxy). `None` = provider default.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Model configuration per pipeline role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelRoles {
    /// Used for monolithic synthesis.
    pub synthesis: ModelConfig,
    /// Stage 1 of the skill pipeline. Required in `skills` mode.
    #[serde(default)]
    pub throughline_synthesizer: Option<ModelConfig>,
    /// Stage 2 of the skill pipeline. Required in `skills` mode.
    #[serde(default)]
    pub callout_extractor: Option<ModelConfig>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    OpenAi,
}

/// How an OpenAI chat request must be shaped for a given model family.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestStyle {
    /// System + user messages, `temperature`, `max_tokens`.
    #[default]
    Standard,
    /// As `Standard`, but the length limit is sent as `max_completion_tokens`.
    MaxCompletionTokens,
    /// No system role and no temperature: system and user text are merged
    /// into one user message, length sent as `max_completion_tokens`.
    Reasoning,
}

/// Parameters for a single model call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    pub provider: Provider,
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default)]
    pub extended_thinking: Option<ExtendedThinking>,
    /// Resolved at load time when omitted.
    #[serde(default)]
    pub request_style: Option<RequestStyle>,
}

impl ModelConfig {
    /// Budget to send when extended thinking is switched on.
    pub fn thinking_budget(&self) -> Option<u32> {
        self.extended_thinking
            .as_ref()
            .filter(|t| t.enabled)
            .map(|t| t.budget_tokens)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtendedThinking {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_thinking_budget")]
    pub budget_tokens: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AvailableModels {
    #[serde(default)]
    pub anthropic: Vec<ModelCapability>,
    #[serde(default)]
    pub openai: Vec<ModelCapability>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelCapability {
    pub id: String,
    #[serde(default)]
    pub supports_thinking: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportSettings {
    #[serde(default = "default_report_title")]
    pub title: String,
    /// How far back the summary's date range reaches.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            title: default_report_title(),
            lookback_days: default_lookback_days(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_request_timeout() -> u64 {
    120
}
fn default_max_tokens() -> u32 {
    16_000
}
fn default_thinking_budget() -> u32 {
    10_000
}
fn default_report_title() -> String {
    "Research Dispatch".to_string()
}
fn default_lookback_days() -> i64 {
    7
}
fn default_anthropic_endpoint() -> ProviderEndpoint {
    ProviderEndpoint {
        api_key_env: "ANTHROPIC_API_KEY".to_string(),
        base_url: None,
    }
}
fn default_openai_endpoint() -> ProviderEndpoint {
    ProviderEndpoint {
        api_key_env: "OPENAI_API_KEY".to_string(),
        base_url: None,
    }
}
