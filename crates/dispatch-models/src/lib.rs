pub mod config;
pub mod document;
pub mod report;
pub mod synthesis;

pub use config::{
    DispatchConfig, ExtendedThinking, ModelConfig, ModelRoles, Provider, ProviderEndpoint,
    ReportSettings, RequestStyle, SynthesisMode,
};
pub use document::{Document, SourceDate};
pub use report::{DocumentDetail, Report, ReportSummary, ThemeAggregate, TradeEntry};
pub use synthesis::{
    Callout, SynthesisInput, SynthesisResult, Theme, ThroughLine, Trade, DEFAULT_SYNTHESIS_TITLE,
};
