use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A parsed research record as returned by the `parsed_research` table.
///
/// Every field is optional: rows come from an external pipeline and the
/// nested `parsed_data` payload has no enforced schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Document {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    /// Publisher or provider label (e.g. "Goldman Sachs").
    #[serde(default, deserialize_with = "lenient_text")]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub document_name: Option<String>,
    #[serde(default)]
    pub source_date: Option<SourceDate>,
    /// Whether a previous dispatch already included this document.
    #[serde(default, deserialize_with = "lenient_flag")]
    pub synthesized: Option<bool>,
    /// Upstream extraction output: `themes`, `trades`, `through_lines`, `metadata`.
    #[serde(default)]
    pub parsed_data: Option<serde_json::Value>,
}

impl Document {
    /// The nested payload, or `None` when it is absent or falsy
    /// (`null`, `false`, `0`, `""`, `[]`, `{}`).
    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.parsed_data.as_ref().filter(|v| is_truthy(v))
    }

    /// Look up a list inside the payload. Absent or non-list values yield `None`.
    pub fn payload_list(&self, key: &str) -> Option<&Vec<serde_json::Value>> {
        self.payload()
            .and_then(|data| data.get(key))
            .and_then(|v| v.as_array())
    }

    /// `parsed_data.metadata.publisher`, when it is a non-empty string.
    pub fn publisher(&self) -> Option<&str> {
        self.payload()
            .and_then(|data| data.get("metadata"))
            .and_then(|meta| meta.get("publisher"))
            .and_then(|p| p.as_str())
            .filter(|p| !p.is_empty())
    }
}

/// A text column that may arrive as a number or flag. Scalars are rendered
/// as text; lists and objects are treated as missing.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(v @ (Value::Number(_) | Value::Bool(_))) => Some(v.to_string()),
        _ => None,
    })
}

/// A flag column that may arrive as any JSON value; read by truthiness.
fn lenient_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.map(|v| is_truthy(&v)))
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
    }
}

/// The `source_date` column. Accepts a calendar date, a datetime, or
/// free text that is parsed leniently on demand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SourceDate {
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    Text(String),
    Other(serde_json::Value),
}

/// Offset-aware ISO-8601 layouts tried after RFC 3339.
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z"];

/// Naive ISO-8601 layouts.
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

impl SourceDate {
    /// The calendar date this value denotes, if it can be determined.
    ///
    /// Datetimes keep the date in their own offset; a trailing `Z` is read
    /// as `+00:00`.
    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        match self {
            SourceDate::Date(d) => Some(*d),
            SourceDate::DateTime(dt) => Some(dt.date_naive()),
            SourceDate::Text(text) => parse_iso_date(text),
            SourceDate::Other(_) => None,
        }
    }
}

fn parse_iso_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let normalized = text.replace('Z', "+00:00");

    if let Ok(date) = NaiveDate::parse_from_str(&normalized, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.date_naive());
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, fmt) {
            return Some(dt.date_naive());
        }
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())
        .map(|dt| dt.date())
}

impl fmt::Display for SourceDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDate::Date(d) => write!(f, "{d}"),
            SourceDate::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            SourceDate::Text(s) => f.write_str(s),
            SourceDate::Other(v) => write!(f, "{v}"),
        }
    }
}
