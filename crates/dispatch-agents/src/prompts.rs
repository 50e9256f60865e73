use std::path::Path;

use tracing::{debug, info};

/// File names inside a prompts directory.
pub const SYNTHESIS_PROMPT_FILE: &str = "synthesis.md";
pub const THROUGHLINE_PROMPT_FILE: &str = "skills/throughline_synthesizer.md";
pub const CALLOUT_PROMPT_FILE: &str = "skills/callout_extractor.md";

/// System prompts for each pipeline role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub synthesis: String,
    pub throughline: String,
    pub callout: String,
}

impl PromptSet {
    pub fn builtin() -> Self {
        Self {
            synthesis: synthesis_system_prompt(),
            throughline: throughline_system_prompt(),
            callout: callout_system_prompt(),
        }
    }

    /// Load prompt overrides from `dir`. Roles without a file keep the
    /// built-in prompt.
    pub fn load(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref();
        let builtin = Self::builtin();
        Ok(Self {
            synthesis: read_or(dir, SYNTHESIS_PROMPT_FILE, builtin.synthesis)?,
            throughline: read_or(dir, THROUGHLINE_PROMPT_FILE, builtin.throughline)?,
            callout: read_or(dir, CALLOUT_PROMPT_FILE, builtin.callout)?,
        })
    }
}

impl Default for PromptSet {
    fn default() -> Self {
        Self::builtin()
    }
}

fn read_or(dir: &Path, file: &str, fallback: String) -> std::io::Result<String> {
    let path = dir.join(file);
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            info!(path = %path.display(), "Loaded prompt override");
            Ok(text.trim().to_string())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No prompt override, using built-in");
            Ok(fallback)
        }
        Err(e) => Err(e),
    }
}

fn through_line_example() -> serde_json::Value {
    serde_json::json!({
        "lead": "<one-sentence headline naming the cross-document view>",
        "key_insight": "<2-3 sentences: what the documents jointly imply and why it matters>",
        "supporting_themes": ["<theme label as given in the input>"],
        "supporting_trades": ["<trade text as given in the input>"],
        "supporting_sources": ["<source name exactly as given in the input>"]
    })
}

fn callout_example() -> serde_json::Value {
    serde_json::json!({
        "text": "<short, quotable highlight, max ~25 words>",
        "source_through_line": "<the exact `lead` of the through-line it supports>",
        "source": "<source name, or omit if it spans several>"
    })
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

const INPUT_DESCRIPTION: &str = "## INPUT\n\n\
     You receive JSON with:\n\
     - `themes`: [{\"source\", \"document\", \"label\", \"context\", \"strength\" \
     (Primary/Secondary), \"confidence\" (High/Medium/Low)}]\n\
     - `trades`: [{\"source\", \"document\", \"text\", \"conviction\", \"timeframe\", \
     \"rationale\"}]\n";

const THROUGH_LINE_RULES: &str = "## THROUGH-LINE RULES\n\n\
     - A through-line must be supported by at least two different sources. \
     Single-source views are not through-lines.\n\
     - Prefer 3-6 through-lines, ordered by how strongly the evidence converges.\n\
     - Disagreement is signal: when sources take opposite sides of the same \
     theme, write the through-line about the debate and list both sides' sources.\n\
     - `supporting_sources` must use source names exactly as they appear in the input.\n\
     - Every `lead` must be unique; it is used as an identifier.\n";

const OUTPUT_RULES: &str = "## OUTPUT\n\n\
     Respond with ONLY the JSON object. No markdown fences, no commentary \
     before or after.";

pub fn synthesis_system_prompt() -> String {
    let example = serde_json::json!({
        "title": "<short headline for the whole dispatch>",
        "document_count": "<integer, from input>",
        "through_lines": [through_line_example()],
        "callouts": [callout_example()]
    });

    format!(
        "You are the cross-document synthesis analyst for Research Dispatch, a \
         digest of recent sell-side and independent research. You read themes and \
         trade ideas extracted from many documents and identify where they \
         converge, diverge, and what a portfolio manager should take away.\n\n\
         {INPUT_DESCRIPTION}\
         - `document_count`: number of documents in this dispatch\n\
         - `sources`: distinct publishers\n\
         - `date_range`: period covered\n\n\
         {THROUGH_LINE_RULES}\n\
         ## CALLOUT RULES\n\n\
         - 3-8 callouts: the most striking specific claims, numbers, or trade \
         levels behind your through-lines.\n\
         - Each callout's `source_through_line` must equal one of your `lead` values.\n\n\
         ## RESPONSE SCHEMA\n\n\
         {}\n\n\
         {OUTPUT_RULES}",
        pretty(&example)
    )
}

pub fn throughline_system_prompt() -> String {
    let example = serde_json::json!({
        "title": "<short headline for the whole dispatch>",
        "through_lines": [through_line_example()]
    });

    format!(
        "You are the through-line synthesizer for Research Dispatch. You read \
         themes and trade ideas extracted from many research documents and \
         identify the views that run across them.\n\n\
         {INPUT_DESCRIPTION}\n\
         {THROUGH_LINE_RULES}\n\
         ## RESPONSE SCHEMA\n\n\
         {}\n\n\
         {OUTPUT_RULES}",
        pretty(&example)
    )
}

pub fn callout_system_prompt() -> String {
    let example = serde_json::json!({
        "callouts": [callout_example()]
    });

    format!(
        "You are the callout extractor for Research Dispatch. You receive the \
         through-lines already synthesized for this dispatch and pick the short \
         highlights a reader should see first.\n\n\
         ## INPUT\n\n\
         JSON with `through_lines`: [{{\"lead\", \"key_insight\", \
         \"supporting_themes\", \"supporting_trades\", \"supporting_sources\"}}]\n\n\
         ## CALLOUT RULES\n\n\
         - 1-2 callouts per through-line, 8 at most overall.\n\
         - A callout states one concrete claim, number, or level. No hedging filler.\n\
         - `source_through_line` must be copied exactly from the through-line's `lead`.\n\
         - Set `source` only when the claim comes from a single named source.\n\n\
         ## RESPONSE SCHEMA\n\n\
         {}\n\n\
         {OUTPUT_RULES}",
        pretty(&example)
    )
}
