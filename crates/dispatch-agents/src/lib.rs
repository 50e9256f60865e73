pub mod aggregator;
pub mod error;
pub mod llm;
pub mod normalizer;
pub mod parser;
pub mod prompts;
pub mod settings;
pub mod synthesizer;

pub mod test_support;

pub use error::{AgentError, ParseFailure};
pub use llm::{HttpLlmClient, LlmClient};
pub use prompts::PromptSet;
pub use settings::Settings;
pub use synthesizer::{RunState, SynthesisRun, Synthesizer};
