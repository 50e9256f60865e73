use std::collections::BTreeSet;

use chrono::{Local, NaiveDate};
use dispatch_models::document::Document;
use dispatch_models::synthesis::{SynthesisInput, Theme, Trade};
use serde_json::{Map, Value};

const UNKNOWN_SOURCE: &str = "Unknown";
const UNKNOWN_DOCUMENT: &str = "Unknown Document";

/// Flatten documents into the synthesis payload.
///
/// Documents without a usable `parsed_data` payload contribute nothing but
/// are still counted. Malformed theme/trade entries are skipped.
pub fn prepare_input(documents: &[Document]) -> SynthesisInput {
    let mut themes = Vec::new();
    let mut trades = Vec::new();
    let mut sources = BTreeSet::new();
    let mut dates: Vec<NaiveDate> = Vec::new();

    for doc in documents {
        if doc.payload().is_none() {
            continue;
        }

        let source = doc.source.as_deref().unwrap_or(UNKNOWN_SOURCE);
        let document = doc.document_name.as_deref().unwrap_or(UNKNOWN_DOCUMENT);

        sources.insert(source.to_string());
        if let Some(date) = doc.source_date.as_ref().and_then(|d| d.to_naive_date()) {
            dates.push(date);
        }

        for theme in entries(doc, "themes") {
            themes.push(Theme {
                source: source.to_string(),
                document: document.to_string(),
                label: text_field(theme, "label", "Unlabeled"),
                context: text_field(theme, "context", ""),
                strength: text_field(theme, "strength", "Secondary"),
                confidence: text_field(theme, "confidence", "Medium"),
            });
        }

        for trade in entries(doc, "trades") {
            trades.push(Trade {
                source: source.to_string(),
                document: document.to_string(),
                text: text_field(trade, "text", ""),
                conviction: text_field(trade, "conviction", "Medium"),
                timeframe: text_field(trade, "timeframe", "weeks"),
                rationale: text_field(trade, "rationale", ""),
            });
        }
    }

    SynthesisInput {
        themes,
        trades,
        document_count: documents.len(),
        sources: sources.into_iter().collect(),
        date_range: date_range(&dates, Local::now().date_naive()),
    }
}

/// Object entries of a payload list; anything else is ignored.
fn entries<'a>(doc: &'a Document, key: &str) -> impl Iterator<Item = &'a Map<String, Value>> {
    doc.payload_list(key)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

/// A string field, with `null`/absent mapped to `fallback` and other
/// scalars rendered as text.
fn text_field(entry: &Map<String, Value>, key: &str, fallback: &str) -> String {
    match entry.get(key) {
        None | Some(Value::Null) => fallback.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// `"<earliest> to <latest>"`, or `today` when no date could be parsed.
pub fn date_range(dates: &[NaiveDate], today: NaiveDate) -> String {
    match (dates.iter().min(), dates.iter().max()) {
        (Some(first), Some(last)) => format!("{first} to {last}"),
        _ => today.format("%Y-%m-%d").to_string(),
    }
}
