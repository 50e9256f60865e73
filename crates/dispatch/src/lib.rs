//! Research Dispatch - cross-document synthesis for parsed research.
//!
//! Reads a batch of parsed research documents, asks a language model for the
//! through-lines and callouts that run across them, and merges the result
//! into a structured report.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use dispatch::agents::{Settings, Synthesizer};
//! use dispatch::models::{Document, Report};
//! use dispatch::report::ReportFormatter;
//! ```

pub use dispatch_agents as agents;
pub use dispatch_models as models;

pub mod report;

use std::sync::Arc;
use std::time::Duration;

use dispatch_agents::{AgentError, HttpLlmClient, Synthesizer};
use dispatch_models::config::DispatchConfig;
use dispatch_models::document::Document;
use dispatch_models::report::Report;
use tracing::info;

use crate::report::ReportFormatter;

/// Build a Synthesizer backed by the HTTP model client.
pub fn build_synthesizer(config: &DispatchConfig) -> Result<Synthesizer, AgentError> {
    let timeout = Duration::from_secs(config.synthesis.request_timeout_seconds);
    let client = HttpLlmClient::from_env(&config.providers, timeout)?;
    Synthesizer::from_config(Arc::new(client), config)
}

/// Synthesize (when a synthesizer is given) and format the report.
///
/// A failed or skipped synthesis still yields a report, built from the
/// per-document data alone.
pub async fn generate_report(
    config: &DispatchConfig,
    synthesizer: Option<&Synthesizer>,
    documents: &[Document],
) -> Report {
    let synthesis = match synthesizer {
        Some(synthesizer) => synthesizer.synthesize(documents).await,
        None => {
            info!("Synthesis disabled, formatting per-document data only");
            None
        }
    };

    ReportFormatter::new(config.report.clone()).format_report(documents, synthesis.as_ref())
}
