use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, Local};
use dispatch_models::config::ReportSettings;
use dispatch_models::document::Document;
use dispatch_models::report::{
    DocumentDetail, Report, ReportSummary, SynthesisStatus, ThemeAggregate, ThemeExample,
    TradeEntry,
};
use dispatch_models::synthesis::{SynthesisResult, ThroughLine};
use serde_json::{Map, Value};

const TOP_THEMES: usize = 10;
const EXAMPLES_PER_THEME: usize = 3;

/// Turns a document batch, plus an optional synthesis, into the report
/// structure consumed by the renderer.
#[derive(Debug, Clone, Default)]
pub struct ReportFormatter {
    settings: ReportSettings,
}

impl ReportFormatter {
    pub fn new(settings: ReportSettings) -> Self {
        Self { settings }
    }

    pub fn format_report(
        &self,
        documents: &[Document],
        synthesis: Option<&SynthesisResult>,
    ) -> Report {
        self.format_report_at(documents, synthesis, Local::now())
    }

    /// As [`format_report`](Self::format_report), with an explicit clock.
    pub fn format_report_at(
        &self,
        documents: &[Document],
        synthesis: Option<&SynthesisResult>,
        now: DateTime<Local>,
    ) -> Report {
        let through_lines = match synthesis {
            Some(result) => result.through_lines.clone(),
            None => document_through_lines(documents),
        };

        Report {
            title: self.settings.title.clone(),
            generated_at: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            summary: self.summary(documents, now),
            details: documents.iter().map(detail).collect(),
            themes_analysis: aggregate_themes(documents),
            trades: aggregate_trades(documents),
            through_lines,
            synthesis_title: synthesis.map(|result| result.title.clone()),
            callouts: synthesis
                .map(|result| result.callouts.clone())
                .unwrap_or_default(),
        }
    }

    fn summary(&self, documents: &[Document], now: DateTime<Local>) -> ReportSummary {
        let start = now - Duration::days(self.settings.lookback_days);
        let mut status = SynthesisStatus::default();
        let mut by_source = BTreeMap::new();
        let mut by_publisher = BTreeMap::new();

        for doc in documents {
            if doc.synthesized.unwrap_or(false) {
                status.synthesized += 1;
            } else {
                status.pending += 1;
            }

            let source = doc.source.clone().unwrap_or_else(|| "Unknown".to_string());
            *by_source.entry(source).or_insert(0) += 1;

            if let Some(publisher) = doc.publisher().filter(|p| *p != "Unknown") {
                *by_publisher.entry(publisher.to_string()).or_insert(0) += 1;
            }
        }

        ReportSummary {
            total_documents: documents.len(),
            date_range: format!(
                "{} to {}",
                start.format("%Y-%m-%d"),
                now.format("%Y-%m-%d")
            ),
            synthesis_status: status,
            by_source,
            by_publisher: (!by_publisher.is_empty()).then_some(by_publisher),
        }
    }
}

fn detail(doc: &Document) -> DocumentDetail {
    DocumentDetail {
        id: doc.id.clone(),
        document_name: doc
            .document_name
            .clone()
            .unwrap_or_else(|| "Untitled".to_string()),
        source: doc.source.clone().unwrap_or_else(|| "Unknown".to_string()),
        source_date: source_date(doc),
        publisher: doc
            .payload()
            .and_then(|data| data.get("metadata"))
            .and_then(|meta| meta.get("publisher"))
            .map(|p| scalar_text(p, "N/A"))
            .unwrap_or_else(|| "N/A".to_string()),
        synthesized: if doc.synthesized.unwrap_or(false) {
            "Yes"
        } else {
            "No"
        }
        .to_string(),
        themes_count: doc.payload_list("themes").map_or(0, Vec::len),
        trades_count: doc.payload_list("trades").map_or(0, Vec::len),
    }
}

fn aggregate_themes(documents: &[Document]) -> Vec<ThemeAggregate> {
    let mut aggregates: Vec<ThemeAggregate> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut seen_documents: HashSet<String> = HashSet::new();

    for doc in documents {
        let document = document_name(doc);
        for theme in entries(doc, "themes") {
            let label = text(theme, "label", "Unlabeled");
            let slot = *index.entry(label.clone()).or_insert_with(|| {
                aggregates.push(ThemeAggregate {
                    label,
                    count: 0,
                    examples: Vec::new(),
                });
                aggregates.len() - 1
            });

            let aggregate = &mut aggregates[slot];
            aggregate.count += 1;
            if aggregate.examples.len() < EXAMPLES_PER_THEME {
                aggregate.examples.push(ThemeExample {
                    document: document.clone(),
                    context: text(theme, "context", ""),
                    show_document: seen_documents.insert(document.clone()),
                });
            }
        }
    }

    // Stable: equal counts keep first-seen order.
    aggregates.sort_by(|a, b| b.count.cmp(&a.count));
    aggregates.truncate(TOP_THEMES);
    aggregates
}

fn aggregate_trades(documents: &[Document]) -> Vec<TradeEntry> {
    let mut trades = Vec::new();
    for doc in documents {
        let document = document_name(doc);
        let source = doc
            .source
            .clone()
            .unwrap_or_else(|| "Unknown Source".to_string());
        let date = source_date(doc);

        for trade in entries(doc, "trades") {
            trades.push(TradeEntry {
                text: text(trade, "text", "N/A"),
                exposure: text(trade, "exposure", "N/A"),
                rationale: text(trade, "rationale", ""),
                timeframe: text(trade, "timeframe", "N/A"),
                conviction: text(trade, "conviction", "N/A"),
                trigger_levels: trade.get("trigger_levels").filter(|v| !v.is_null()).cloned(),
                document: document.clone(),
                source: source.clone(),
                date: date.clone(),
            });
        }
    }
    trades
}

/// Through-lines the upstream extractor attached to individual documents.
fn document_through_lines(documents: &[Document]) -> Vec<ThroughLine> {
    let mut through_lines = Vec::new();
    for doc in documents {
        let document = document_name(doc);
        let source = doc
            .source
            .clone()
            .unwrap_or_else(|| "Unknown Source".to_string());

        for tl in entries(doc, "through_lines") {
            through_lines.push(ThroughLine {
                lead: text(tl, "lead", ""),
                key_insight: text(tl, "key_insight", ""),
                supporting_themes: list(tl, "supporting_themes"),
                supporting_trades: list(tl, "supporting_trades"),
                source: Some(source.clone()),
                document: Some(document.clone()),
                ..Default::default()
            });
        }
    }
    through_lines
}

fn document_name(doc: &Document) -> String {
    doc.document_name
        .clone()
        .unwrap_or_else(|| "Unknown Document".to_string())
}

fn source_date(doc: &Document) -> String {
    doc.source_date
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default()
}

fn entries<'a>(doc: &'a Document, key: &str) -> impl Iterator<Item = &'a Map<String, Value>> {
    doc.payload_list(key)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

fn text(entry: &Map<String, Value>, key: &str, fallback: &str) -> String {
    entry
        .get(key)
        .map(|v| scalar_text(v, fallback))
        .unwrap_or_else(|| fallback.to_string())
}

fn scalar_text(value: &Value, fallback: &str) -> String {
    match value {
        Value::Null => fallback.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn list(entry: &Map<String, Value>, key: &str) -> Vec<Value> {
    entry
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dispatch_models::synthesis::Callout;
    use serde_json::json;

    fn doc(name: &str, source: &str, synthesized: bool, parsed: Value) -> Document {
        Document {
            id: Some(json!(name)),
            source: Some(source.to_string()),
            document_name: Some(name.to_string()),
            source_date: None,
            synthesized: Some(synthesized),
            parsed_data: Some(parsed),
        }
    }

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 10, 9, 30, 0).unwrap()
    }

    fn batch() -> Vec<Document> {
        vec![
            doc(
                "Rates Weekly",
                "Goldman Sachs",
                true,
                json!({
                    "metadata": {"publisher": "GS Research"},
                    "themes": [
                        {"label": "Fed", "context": "Cuts too early"},
                        {"label": "Curve", "context": "Steepener"}
                    ],
                    "trades": [{"text": "Pay 2y", "trigger_levels": {"entry": 4.1}}],
                    "through_lines": [{"lead": "Doc-level view", "key_insight": "K"}]
                }),
            ),
            doc(
                "Sunday Start",
                "Morgan Stanley",
                false,
                json!({
                    "themes": [
                        {"label": "Fed", "context": "Agrees"},
                        "not a theme"
                    ],
                    "trades": "none"
                }),
            ),
            Document {
                source: Some("Goldman Sachs".to_string()),
                ..Default::default()
            },
        ]
    }

    #[test]
    fn summary_counts_status_sources_and_publishers() {
        let report = ReportFormatter::default().format_report_at(&batch(), None, now());
        let summary = &report.summary;

        assert_eq!(report.title, "Research Dispatch");
        assert_eq!(report.generated_at, "2025-03-10 09:30:00");
        assert_eq!(summary.total_documents, 3);
        assert_eq!(summary.date_range, "2025-03-03 to 2025-03-10");
        assert_eq!(summary.synthesis_status, SynthesisStatus { synthesized: 1, pending: 2 });
        assert_eq!(summary.by_source["Goldman Sachs"], 2);
        assert_eq!(summary.by_source["Morgan Stanley"], 1);
        assert_eq!(summary.by_publisher.as_ref().unwrap()["GS Research"], 1);
    }

    #[test]
    fn by_publisher_omitted_when_unknown() {
        let docs = vec![doc("A", "UBS", false, json!({"metadata": {"publisher": "Unknown"}}))];
        let report = ReportFormatter::default().format_report_at(&docs, None, now());
        assert!(report.summary.by_publisher.is_none());
    }

    #[test]
    fn details_use_fallbacks() {
        let report = ReportFormatter::default().format_report_at(&batch(), None, now());

        let first = &report.details[0];
        assert_eq!(first.publisher, "GS Research");
        assert_eq!(first.synthesized, "Yes");
        assert_eq!((first.themes_count, first.trades_count), (2, 1));

        let second = &report.details[1];
        assert_eq!(second.publisher, "N/A");
        assert_eq!(second.themes_count, 2);
        assert_eq!(second.trades_count, 0);

        let empty = &report.details[2];
        assert_eq!(empty.document_name, "Untitled");
        assert_eq!(empty.source_date, "");
        assert_eq!(empty.synthesized, "No");
    }

    #[test]
    fn themes_ranked_with_first_mention_flag() {
        let report = ReportFormatter::default().format_report_at(&batch(), None, now());
        let themes = &report.themes_analysis;

        assert_eq!(themes[0].label, "Fed");
        assert_eq!(themes[0].count, 2);
        assert!(themes[0].examples[0].show_document);
        assert_eq!(themes[0].examples[1].document, "Sunday Start");
        assert!(themes[0].examples[1].show_document);

        assert_eq!(themes[1].label, "Curve");
        assert_eq!(themes[1].examples[0].document, "Rates Weekly");
        assert!(!themes[1].examples[0].show_document);
    }

    #[test]
    fn themes_capped_at_top_ten_with_three_examples() {
        let themes: Vec<Value> = (0..12)
            .flat_map(|i| {
                let repeats = if i == 11 { 5 } else { 1 };
                std::iter::repeat(json!({"label": format!("T{i}")})).take(repeats)
            })
            .collect();
        let docs = vec![doc("Big", "UBS", false, json!({ "themes": themes }))];

        let report = ReportFormatter::default().format_report_at(&docs, None, now());
        assert_eq!(report.themes_analysis.len(), 10);
        assert_eq!(report.themes_analysis[0].label, "T11");
        assert_eq!(report.themes_analysis[0].examples.len(), 3);
        assert_eq!(report.themes_analysis[1].label, "T0");
    }

    #[test]
    fn trades_carry_document_attribution() {
        let report = ReportFormatter::default().format_report_at(&batch(), None, now());
        assert_eq!(report.trades.len(), 1);

        let trade = &report.trades[0];
        assert_eq!(trade.text, "Pay 2y");
        assert_eq!(trade.exposure, "N/A");
        assert_eq!(trade.conviction, "N/A");
        assert_eq!(trade.trigger_levels, Some(json!({"entry": 4.1})));
        assert_eq!(trade.document, "Rates Weekly");
        assert_eq!(trade.source, "Goldman Sachs");
    }

    #[test]
    fn document_through_lines_without_synthesis() {
        let report = ReportFormatter::default().format_report_at(&batch(), None, now());

        assert_eq!(report.through_lines.len(), 1);
        assert_eq!(report.through_lines[0].lead, "Doc-level view");
        assert_eq!(report.through_lines[0].source.as_deref(), Some("Goldman Sachs"));
        assert!(report.synthesis_title.is_none());
        assert!(report.callouts.is_empty());
    }

    #[test]
    fn synthesis_replaces_document_through_lines() {
        let synthesis = SynthesisResult {
            title: "Fed Front-Running".to_string(),
            document_count: 3,
            through_lines: vec![ThroughLine {
                lead: "Cuts priced too early".to_string(),
                source: Some("GS, MS".to_string()),
                ..Default::default()
            }],
            callouts: vec![Callout {
                text: "Pay 2y".to_string(),
                source: Some("GS, MS".to_string()),
                ..Default::default()
            }],
            raw_response: Some("{}".to_string()),
        };

        let report =
            ReportFormatter::default().format_report_at(&batch(), Some(&synthesis), now());
        assert_eq!(report.through_lines, synthesis.through_lines);
        assert_eq!(report.synthesis_title.as_deref(), Some("Fed Front-Running"));
        assert_eq!(report.callouts.len(), 1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["synthesis_title"], "Fed Front-Running");
        assert!(json.get("raw_response").is_none());
    }

    #[test]
    fn custom_title_and_lookback() {
        let formatter = ReportFormatter::new(ReportSettings {
            title: "Rates Dispatch".to_string(),
            lookback_days: 14,
        });
        let report = formatter.format_report_at(&[], None, now());
        assert_eq!(report.title, "Rates Dispatch");
        assert_eq!(report.summary.date_range, "2025-02-24 to 2025-03-10");
        assert_eq!(report.summary.total_documents, 0);
        assert!(report.themes_analysis.is_empty());
    }
}
