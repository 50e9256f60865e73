use std::io::Read;

use anyhow::{Context, Result};
use clap::Parser;
use dispatch_agents::settings::{resolve, Settings};
use dispatch_models::config::SynthesisMode;
use dispatch_models::document::Document;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "research-dispatch",
    about = "Cross-document synthesis for parsed research"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/dispatch.toml")]
    config: String,

    /// Read the documents JSON array from a file instead of stdin
    #[arg(short, long)]
    input: Option<String>,

    /// Use the two-stage skill pipeline regardless of the configured mode
    #[arg(long)]
    skills: bool,

    /// Skip synthesis and format per-document data only
    #[arg(long)]
    no_synthesis: bool,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr (respects RUST_LOG); stdout carries the report only.
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let settings = Settings::load(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config))?;
    let mut config = settings.config;
    if cli.skills && config.synthesis.mode != SynthesisMode::Skills {
        config.synthesis.mode = SynthesisMode::Skills;
        config = resolve(config).context("Invalid config for --skills")?;
    }

    let documents_json = if let Some(input_path) = &cli.input {
        std::fs::read_to_string(input_path)
            .with_context(|| format!("Failed to read input: {input_path}"))?
    } else {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read from stdin")?;
        buf
    };

    let documents: Vec<Document> =
        serde_json::from_str(&documents_json).context("Failed to parse documents JSON")?;
    info!(documents = documents.len(), "Loaded documents");

    let synthesizer = if config.synthesis.enabled && !cli.no_synthesis {
        Some(dispatch::build_synthesizer(&config).context("Failed to build synthesizer")?)
    } else {
        None
    };

    let report = dispatch::generate_report(&config, synthesizer.as_ref(), &documents).await;

    let output = if cli.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{output}");

    Ok(())
}
