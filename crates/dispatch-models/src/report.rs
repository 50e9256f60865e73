use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::synthesis::{Callout, ThroughLine};

/// The structured report handed to the renderer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub title: String,
    pub generated_at: String,
    pub summary: ReportSummary,
    pub details: Vec<DocumentDetail>,
    pub themes_analysis: Vec<ThemeAggregate>,
    pub trades: Vec<TradeEntry>,
    pub through_lines: Vec<ThroughLine>,
    /// Present only when a synthesis ran successfully.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesis_title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub callouts: Vec<Callout>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportSummary {
    pub total_documents: usize,
    pub date_range: String,
    pub synthesis_status: SynthesisStatus,
    pub by_source: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_publisher: Option<BTreeMap<String, usize>>,
}

/// How many documents were already dispatched vs. still pending.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SynthesisStatus {
    pub synthesized: usize,
    pub pending: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentDetail {
    pub id: Option<serde_json::Value>,
    pub document_name: String,
    pub source: String,
    pub source_date: String,
    pub publisher: String,
    /// "Yes" / "No".
    pub synthesized: String,
    pub themes_count: usize,
    pub trades_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThemeAggregate {
    pub label: String,
    pub count: usize,
    pub examples: Vec<ThemeExample>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThemeExample {
    pub document: String,
    pub context: String,
    /// False when the document was already named by an earlier example.
    pub show_document: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeEntry {
    pub text: String,
    pub exposure: String,
    pub rationale: String,
    pub timeframe: String,
    pub conviction: String,
    pub trigger_levels: Option<serde_json::Value>,
    pub document: String,
    pub source: String,
    pub date: String,
}
