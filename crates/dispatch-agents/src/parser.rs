use dispatch_models::synthesis::{Callout, ThroughLine};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::error::{excerpt, ParseFailure};

const FENCE: &str = "```";

/// Strip the wrapping models put around a JSON answer.
///
/// Drops everything before the first `{` (explanatory prose) and everything
/// from the first code fence after it (closing fences, trailing commentary).
/// Text without any `{` is returned trimmed so that parsing fails on it.
pub fn clean_json_response(text: &str) -> &str {
    let mut cleaned = text.trim();

    if let Some(start) = cleaned.find('{') {
        cleaned = &cleaned[start..];
    }
    if let Some(end) = cleaned.find(FENCE) {
        cleaned = &cleaned[..end];
    }

    cleaned.trim()
}

/// Parse raw model output into a JSON value.
///
/// Tries the cleaned text first, then the first brace-balanced object
/// (which survives fences inside string values and unfenced trailing prose).
pub fn clean_and_parse(raw: &str) -> Result<Value, ParseFailure> {
    let cleaned = clean_json_response(raw);

    let strict_error = match serde_json::from_str::<Value>(cleaned) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let balanced = raw
        .find('{')
        .and_then(|start| extract_first_object(&raw[start..]));
    if let Some(candidate) = balanced {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            return Ok(value);
        }
    }

    Err(ParseFailure::InvalidJson {
        message: strict_error.to_string(),
        excerpt: excerpt(raw),
    })
}

/// Find the first balanced { ... } in the text.
fn extract_first_object(text: &str) -> Option<&str> {
    let mut depth = 0;
    let mut start = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => {
                escape_next = true;
            }
            '"' => {
                in_string = !in_string;
            }
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start {
                        return Some(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }

    None
}

/// A model answer validated against the synthesis schema.
///
/// The same shape covers all three prompts: monolithic answers carry both
/// lists, stage 1 only `through_lines`, stage 2 only `callouts`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisDraft {
    pub title: Option<String>,
    pub document_count: Option<usize>,
    pub through_lines: Vec<ThroughLine>,
    pub callouts: Vec<Callout>,
}

/// Parse and validate raw model output in one step.
pub fn parse_synthesis_draft(raw: &str) -> Result<SynthesisDraft, ParseFailure> {
    let value = clean_and_parse(raw)?;
    SynthesisDraft::from_value(&value, raw)
}

impl SynthesisDraft {
    /// Validate a parsed answer. `raw` is only used for diagnostics.
    ///
    /// The answer must be an object and both lists, when present, must be
    /// lists. Entries inside a list that do not match the schema are dropped
    /// with a warning rather than failing the whole answer.
    pub fn from_value(value: &Value, raw: &str) -> Result<Self, ParseFailure> {
        let object = value.as_object().ok_or_else(|| ParseFailure::Shape {
            message: format!("expected a JSON object, got {}", json_kind(value)),
            excerpt: excerpt(raw),
        })?;

        let title = match object.get("title") {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => {
                warn!(kind = json_kind(other), "Ignoring non-string title");
                None
            }
        };

        let document_count = object
            .get("document_count")
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok());

        Ok(Self {
            title,
            document_count,
            through_lines: decode_entries(object.get("through_lines"), "through_lines", raw)?,
            callouts: decode_entries(object.get("callouts"), "callouts", raw)?,
        })
    }
}

fn decode_entries<T: DeserializeOwned>(
    value: Option<&Value>,
    field: &str,
    raw: &str,
) -> Result<Vec<T>, ParseFailure> {
    let items = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(ParseFailure::Shape {
                message: format!("`{field}` must be a list, got {}", json_kind(other)),
                excerpt: excerpt(raw),
            })
        }
    };

    let mut decoded = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        if !item.is_object() {
            warn!(field, index, kind = json_kind(item), "Dropping non-object entry");
            continue;
        }
        match serde_json::from_value::<T>(item.clone()) {
            Ok(entry) => decoded.push(entry),
            Err(e) => warn!(
                field,
                index,
                error = %e,
                entry = %excerpt(&item.to_string()),
                "Dropping malformed entry"
            ),
        }
    }
    Ok(decoded)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
