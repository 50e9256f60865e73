//! Attribution repair for synthesized through-lines and callouts.
//!
//! Models often omit the display `source` fields. They are derived from
//! `supporting_sources`, abbreviated to the short labels used in the report.

use std::collections::HashMap;

use dispatch_models::synthesis::{Callout, ThroughLine};

/// `document` value marking a through-line as a cross-document artifact.
pub const SYNTHESIS_DOCUMENT: &str = "Cross-document synthesis";

/// Callout attribution when its through-line cannot be resolved.
pub const MULTIPLE_SOURCES: &str = "Multiple";

/// Short labels for well-known research houses.
const SOURCE_ABBREVIATIONS: &[(&str, &str)] = &[
    ("Goldman Sachs", "GS"),
    ("JPMorgan", "JPM"),
    ("JP Morgan", "JPM"),
    ("JPMorgan Chase", "JPM"),
    ("JPMorgan Chase Research", "JPM"),
    ("Morgan Stanley", "MS"),
    ("Bank of America", "BofA"),
    ("Bank of America Merrill Lynch", "BofA"),
    ("Barclays", "Barcs"),
    ("Citigroup", "Citi"),
    ("Wells Fargo", "Wells"),
    ("Deutsche Bank", "DB"),
    ("BNP Paribas", "BNP"),
    ("UBS", "UBS"),
    ("HSBC", "HS"),
    ("Nomura", "Nomura"),
    ("Societe Generale", "SG"),
    ("Société Générale", "SG"),
    ("RBC Capital Markets", "RBC"),
];

/// Backfill attribution on through-lines, then on callouts.
pub fn normalize(through_lines: &mut [ThroughLine], callouts: &mut [Callout]) {
    normalize_through_lines(through_lines);
    normalize_callouts(callouts, through_lines);
}

/// Give unattributed through-lines a source label built from their
/// `supporting_sources`. Through-lines that already show a source or
/// document, or have nothing to derive from, are left alone.
pub fn normalize_through_lines(through_lines: &mut [ThroughLine]) {
    for tl in through_lines.iter_mut() {
        if tl.has_attribution() || tl.supporting_sources.is_empty() {
            continue;
        }
        tl.source = Some(format_sources(&tl.supporting_sources));
        tl.document = Some(SYNTHESIS_DOCUMENT.to_string());
    }
}

/// Attribute callouts via the through-line their `source_through_line` names.
pub fn normalize_callouts(callouts: &mut [Callout], through_lines: &[ThroughLine]) {
    // Later duplicates of a lead overwrite earlier ones.
    let lead_to_sources: HashMap<&str, &[String]> = through_lines
        .iter()
        .filter(|tl| !tl.lead.is_empty() && !tl.supporting_sources.is_empty())
        .map(|tl| (tl.lead.as_str(), tl.supporting_sources.as_slice()))
        .collect();

    for callout in callouts.iter_mut() {
        if callout.has_source() {
            continue;
        }
        let sources = callout
            .source_through_line
            .as_deref()
            .and_then(|lead| lead_to_sources.get(lead));
        callout.source = Some(match sources {
            Some(sources) => format_sources(sources),
            None => MULTIPLE_SOURCES.to_string(),
        });
    }
}

/// Abbreviate each source and join with `", "`.
pub fn format_sources(sources: &[String]) -> String {
    sources
        .iter()
        .map(|name| abbreviate_source(name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Short display label for a source name ("Goldman Sachs" -> "GS").
///
/// Known houses use the fixed table; other multi-word names collapse to
/// their uppercased initials, splitting on whitespace and `&`. Single words
/// are kept as-is.
pub fn abbreviate_source(name: &str) -> String {
    let cleaned = name.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return "Unknown".to_string();
    }

    if let Some((_, short)) = SOURCE_ABBREVIATIONS
        .iter()
        .find(|(full, _)| *full == cleaned)
    {
        return (*short).to_string();
    }

    let parts: Vec<&str> = cleaned
        .split(|c: char| c.is_whitespace() || c == '&')
        .filter(|part| !part.is_empty())
        .collect();
    if parts.len() <= 1 {
        return cleaned;
    }

    parts
        .iter()
        .filter_map(|part| part.chars().next())
        .flat_map(char::to_uppercase)
        .collect()
}
