use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

/// Title used when the model does not supply one.
pub const DEFAULT_SYNTHESIS_TITLE: &str = "Cross-Document Synthesis";

/// A theme lifted out of one document, tagged with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Theme {
    pub source: String,
    pub document: String,
    pub label: String,
    pub context: String,
    /// "Primary" / "Secondary" as rated by the upstream parser.
    pub strength: String,
    pub confidence: String,
}

/// A trade idea lifted out of one document, tagged with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Trade {
    pub source: String,
    pub document: String,
    pub text: String,
    pub conviction: String,
    /// Horizon hint such as "days", "weeks", "months".
    pub timeframe: String,
    pub rationale: String,
}

/// The payload sent to the model for a monolithic or stage-1 call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SynthesisInput {
    pub themes: Vec<Theme>,
    pub trades: Vec<Trade>,
    /// Number of input documents, including those that contributed nothing.
    pub document_count: usize,
    pub sources: Vec<String>,
    /// `"<earliest> to <latest>"`, or today's date when nothing parsed.
    pub date_range: String,
}

/// A synthesized cross-document insight.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ThroughLine {
    /// Headline; callouts reference through-lines by this text.
    #[serde(default, deserialize_with = "null_as_default")]
    pub lead: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub key_insight: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub supporting_themes: Vec<serde_json::Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub supporting_trades: Vec<serde_json::Value>,
    #[serde(
        default,
        deserialize_with = "lenient_sources",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub supporting_sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    /// Any further fields the model emitted, passed through to the report.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ThroughLine {
    /// True when either display field is set to something non-empty.
    pub fn has_attribution(&self) -> bool {
        non_empty(&self.source) || non_empty(&self.document)
    }
}

/// A short attributed highlight linked to a through-line by its lead.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Callout {
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_through_line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Callout {
    pub fn has_source(&self) -> bool {
        non_empty(&self.source)
    }
}

/// Output of one synthesis run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SynthesisResult {
    pub title: String,
    pub document_count: usize,
    pub through_lines: Vec<ThroughLine>,
    pub callouts: Vec<Callout>,
    /// Unparsed model output, kept for diagnostics in monolithic mode only.
    #[serde(skip)]
    pub raw_response: Option<String>,
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.is_empty())
}

/// Treat an explicit JSON `null` the same as a missing field.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Source names from a model-supplied list. Non-string items are dropped
/// with a warning; a bare string counts as a one-item list.
fn lenient_sources<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let sources = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(name)) => vec![name],
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(name) => Some(name),
                other => {
                    warn!(item = %other, "Dropping non-string supporting source");
                    None
                }
            })
            .collect(),
        Some(other) => {
            warn!(value = %other, "Ignoring supporting_sources that is not a list");
            Vec::new()
        }
    };
    Ok(sources)
}
