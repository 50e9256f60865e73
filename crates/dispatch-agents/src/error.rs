use thiserror::Error;

/// Longest slice of raw model output carried in diagnostics.
pub const EXCERPT_LIMIT: usize = 500;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("Authentication failed for provider {0}")]
    Auth(String),

    #[error("{provider} API returned HTTP {status}: {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("LLM request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Missing API key: environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("Provider response parse error: {0}")]
    Envelope(String),

    #[error("Model response rejected: {0}")]
    Response(#[from] ParseFailure),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Model output that could not be turned into the expected structure.
///
/// Both variants carry a bounded excerpt of the offending text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("invalid JSON: {message}")]
    InvalidJson { message: String, excerpt: String },

    #[error("unexpected shape: {message}")]
    Shape { message: String, excerpt: String },
}

impl ParseFailure {
    pub fn excerpt(&self) -> &str {
        match self {
            ParseFailure::InvalidJson { excerpt, .. } | ParseFailure::Shape { excerpt, .. } => {
                excerpt
            }
        }
    }
}

/// First `EXCERPT_LIMIT` characters of `text`, on a char boundary.
pub fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_LIMIT).collect()
}
