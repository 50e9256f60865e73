use std::sync::Arc;
use std::time::Instant;

use dispatch_models::config::{DispatchConfig, ModelConfig, ModelRoles, SynthesisMode};
use dispatch_models::document::Document;
use dispatch_models::synthesis::{
    Callout, SynthesisInput, SynthesisResult, ThroughLine, DEFAULT_SYNTHESIS_TITLE,
};
use tracing::{debug, info, warn};

use crate::aggregator::prepare_input;
use crate::error::AgentError;
use crate::llm::LlmClient;
use crate::normalizer::normalize;
use crate::parser::{parse_synthesis_draft, SynthesisDraft};
use crate::prompts::PromptSet;

/// Where a synthesis run is, or where it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Preparing,
    MonolithicCall,
    Stage1Call,
    Stage2Call,
    Normalizing,
    Done,
    Failed,
}

/// Outcome of one run. `result` is `None` both for "nothing to synthesize"
/// (`Done`) and for a failed run (`Failed`); callers treat them alike.
#[derive(Debug, Clone)]
pub struct SynthesisRun {
    pub state: RunState,
    pub result: Option<SynthesisResult>,
    /// Model calls attempted, successful or not.
    pub model_calls: usize,
}

struct Tracker {
    state: RunState,
    model_calls: usize,
    started: Instant,
}

impl Tracker {
    fn new() -> Self {
        Self {
            state: RunState::Idle,
            model_calls: 0,
            started: Instant::now(),
        }
    }

    fn advance(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, "Synthesis state change");
        self.state = next;
    }

    fn finish(mut self, result: Option<SynthesisResult>) -> SynthesisRun {
        let terminal = if result.is_some() || self.state == RunState::Preparing {
            RunState::Done
        } else {
            RunState::Failed
        };
        self.advance(terminal);
        info!(
            state = ?terminal,
            model_calls = self.model_calls,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Synthesis finished"
        );
        SynthesisRun {
            state: terminal,
            result,
            model_calls: self.model_calls,
        }
    }
}

/// Produces a cross-document synthesis from a batch of documents.
pub struct Synthesizer {
    client: Arc<dyn LlmClient>,
    models: ModelRoles,
    prompts: PromptSet,
    mode: SynthesisMode,
}

impl Synthesizer {
    pub fn new(
        client: Arc<dyn LlmClient>,
        models: ModelRoles,
        prompts: PromptSet,
        mode: SynthesisMode,
    ) -> Self {
        Self {
            client,
            models,
            prompts,
            mode,
        }
    }

    /// Build from a resolved config, reading prompt overrides if configured.
    pub fn from_config(
        client: Arc<dyn LlmClient>,
        config: &DispatchConfig,
    ) -> Result<Self, AgentError> {
        let prompts = match &config.synthesis.prompts_dir {
            Some(dir) => PromptSet::load(dir)?,
            None => PromptSet::builtin(),
        };
        Ok(Self::new(
            client,
            config.models.clone(),
            prompts,
            config.synthesis.mode,
        ))
    }

    pub fn mode(&self) -> SynthesisMode {
        self.mode
    }

    /// Synthesize, returning `None` when skipped or failed.
    pub async fn synthesize(&self, documents: &[Document]) -> Option<SynthesisResult> {
        self.run(documents).await.result
    }

    /// Synthesize and report how the run ended.
    pub async fn run(&self, documents: &[Document]) -> SynthesisRun {
        let mut tracker = Tracker::new();
        tracker.advance(RunState::Preparing);

        // 1. Flatten documents into the synthesis payload
        let input = prepare_input(documents);
        if input.themes.is_empty() {
            info!(
                documents = input.document_count,
                "No themes found in documents, skipping synthesis"
            );
            return tracker.finish(None);
        }

        info!(
            themes = input.themes.len(),
            trades = input.trades.len(),
            documents = input.document_count,
            mode = ?self.mode,
            "Synthesizing"
        );

        // 2. Run the configured pipeline
        let result = match self.mode {
            SynthesisMode::Monolithic => self.monolithic(&mut tracker, &input).await,
            SynthesisMode::Skills => self.skills(&mut tracker, &input).await,
        };

        // 3. Report the outcome
        if let Some(result) = &result {
            info!(
                title = %result.title,
                through_lines = result.through_lines.len(),
                callouts = result.callouts.len(),
                "Synthesis complete"
            );
        }
        tracker.finish(result)
    }

    async fn monolithic(
        &self,
        tracker: &mut Tracker,
        input: &SynthesisInput,
    ) -> Option<SynthesisResult> {
        // 1. Single call with the full payload
        tracker.advance(RunState::MonolithicCall);
        let outcome = async {
            let user = serde_json::to_string_pretty(input)?;
            tracker.model_calls += 1;
            let raw = self
                .client
                .generate(&self.models.synthesis, &self.prompts.synthesis, &user)
                .await?;
            let draft = parse_synthesis_draft(&raw)?;
            Ok::<_, AgentError>((draft, raw))
        }
        .await;

        let (draft, raw) = match outcome {
            Ok(parsed) => parsed,
            Err(e) => {
                log_failure("monolithic", &e);
                return None;
            }
        };

        let SynthesisDraft {
            title,
            document_count,
            mut through_lines,
            mut callouts,
        } = draft;

        // 2. Backfill attribution
        tracker.advance(RunState::Normalizing);
        normalize(&mut through_lines, &mut callouts);

        Some(SynthesisResult {
            title: title.unwrap_or_else(|| DEFAULT_SYNTHESIS_TITLE.to_string()),
            document_count: document_count.unwrap_or(input.document_count),
            through_lines,
            callouts,
            raw_response: Some(raw),
        })
    }

    async fn skills(
        &self,
        tracker: &mut Tracker,
        input: &SynthesisInput,
    ) -> Option<SynthesisResult> {
        // 1. Through-lines (fatal on failure)
        tracker.advance(RunState::Stage1Call);
        let (title, mut through_lines) = match self.extract_through_lines(tracker, input).await {
            Ok(stage1) => stage1,
            Err(e) => {
                log_failure("stage 1", &e);
                return None;
            }
        };
        if through_lines.is_empty() {
            warn!("Stage 1 returned no through-lines, aborting synthesis");
            return None;
        }
        info!(through_lines = through_lines.len(), "Stage 1 complete");

        // 2. Callouts (non-fatal)
        tracker.advance(RunState::Stage2Call);
        let mut callouts = match self.extract_callouts(tracker, &through_lines).await {
            Ok(callouts) => {
                info!(callouts = callouts.len(), "Stage 2 complete");
                callouts
            }
            Err(e) => {
                log_failure("stage 2", &e);
                warn!("Returning through-lines without callouts");
                Vec::new()
            }
        };

        // 3. Backfill attribution
        tracker.advance(RunState::Normalizing);
        normalize(&mut through_lines, &mut callouts);

        Some(SynthesisResult {
            title,
            document_count: input.document_count,
            through_lines,
            callouts,
            raw_response: None,
        })
    }

    /// Stage 1: themes and trades in, title and through-lines out.
    async fn extract_through_lines(
        &self,
        tracker: &mut Tracker,
        input: &SynthesisInput,
    ) -> Result<(String, Vec<ThroughLine>), AgentError> {
        let payload = serde_json::json!({
            "themes": input.themes,
            "trades": input.trades,
        });
        let user = serde_json::to_string_pretty(&payload)?;

        tracker.model_calls += 1;
        let raw = self
            .client
            .generate(
                self.stage_model(&self.models.throughline_synthesizer),
                &self.prompts.throughline,
                &user,
            )
            .await?;
        let draft = parse_synthesis_draft(&raw)?;

        let title = draft
            .title
            .unwrap_or_else(|| DEFAULT_SYNTHESIS_TITLE.to_string());
        Ok((title, draft.through_lines))
    }

    /// Stage 2: stage-1 through-lines in, callouts out.
    async fn extract_callouts(
        &self,
        tracker: &mut Tracker,
        through_lines: &[ThroughLine],
    ) -> Result<Vec<Callout>, AgentError> {
        let payload = serde_json::json!({ "through_lines": through_lines });
        let user = serde_json::to_string_pretty(&payload)?;

        tracker.model_calls += 1;
        let raw = self
            .client
            .generate(
                self.stage_model(&self.models.callout_extractor),
                &self.prompts.callout,
                &user,
            )
            .await?;
        Ok(parse_synthesis_draft(&raw)?.callouts)
    }

    /// A stage model, falling back to the monolithic model when unset.
    fn stage_model<'a>(&'a self, stage: &'a Option<ModelConfig>) -> &'a ModelConfig {
        stage.as_ref().unwrap_or(&self.models.synthesis)
    }
}

fn log_failure(stage: &str, error: &AgentError) {
    match error {
        AgentError::Response(failure) => warn!(
            stage,
            error = %failure,
            raw = %failure.excerpt(),
            "Failed to parse synthesis response"
        ),
        other => warn!(stage, error = %other, "Synthesis call failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{research_document, sample_models, ScriptedLlm};

    fn synthesizer(client: Arc<ScriptedLlm>, mode: SynthesisMode) -> Synthesizer {
        Synthesizer::new(client, sample_models(), PromptSet::builtin(), mode)
    }

    #[tokio::test]
    async fn empty_documents_make_no_calls() {
        let client = Arc::new(ScriptedLlm::new());
        let run = synthesizer(client.clone(), SynthesisMode::Monolithic)
            .run(&[])
            .await;

        assert_eq!(run.state, RunState::Done);
        assert!(run.result.is_none());
        assert_eq!(run.model_calls, 0);
        assert_eq!(client.call_count().await, 0);
    }

    #[tokio::test]
    async fn monolithic_keeps_raw_response() {
        let reply = r#"{"title": "Duration", "through_lines": [], "callouts": []}"#;
        let client = Arc::new(ScriptedLlm::new().reply(reply));
        let docs = vec![research_document("Goldman Sachs", "Rates", &["Curve steepening"])];

        let result = synthesizer(client, SynthesisMode::Monolithic)
            .synthesize(&docs)
            .await
            .unwrap();
        assert_eq!(result.raw_response.as_deref(), Some(reply));
        assert_eq!(result.document_count, 1);
    }

    #[tokio::test]
    async fn monolithic_uses_synthesis_prompt_and_model() {
        let client = Arc::new(ScriptedLlm::new().reply("{}"));
        let docs = vec![research_document("UBS", "Equity Compass", &["AI capex"])];

        synthesizer(client.clone(), SynthesisMode::Monolithic)
            .synthesize(&docs)
            .await
            .unwrap();

        let calls = client.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model, sample_models().synthesis.model);
        assert_eq!(calls[0].system, PromptSet::builtin().synthesis);
        let payload: serde_json::Value = serde_json::from_str(&calls[0].user).unwrap();
        assert_eq!(payload["document_count"], 1);
        assert_eq!(payload["themes"][0]["label"], "AI capex");
    }

    #[tokio::test]
    async fn stage_model_falls_back_to_synthesis_model() {
        let mut models = sample_models();
        models.callout_extractor = None;
        let client = Arc::new(
            ScriptedLlm::new()
                .reply(r#"{"through_lines": [{"lead": "L"}]}"#)
                .reply(r#"{"callouts": []}"#),
        );
        let docs = vec![research_document("UBS", "Equity Compass", &["AI capex"])];

        let synthesizer = Synthesizer::new(
            client.clone(),
            models.clone(),
            PromptSet::builtin(),
            SynthesisMode::Skills,
        );
        synthesizer
            .synthesize(&docs)
            .await
            .unwrap();

        let calls = client.calls().await;
        assert_eq!(calls[1].model, models.synthesis.model);
    }

    #[tokio::test]
    async fn skills_stage2_error_still_completes_run() {
        let client = Arc::new(
            ScriptedLlm::new()
                .reply(r#"{"through_lines": [{"lead": "L", "supporting_sources": ["UBS"]}]}"#)
                .fail(AgentError::Timeout(30)),
        );
        let docs = vec![research_document("UBS", "Equity Compass", &["AI capex"])];

        let run = synthesizer(client, SynthesisMode::Skills).run(&docs).await;
        assert_eq!(run.state, RunState::Done);
        assert_eq!(run.model_calls, 2);

        let result = run.result.unwrap();
        assert!(result.callouts.is_empty());
        assert_eq!(result.through_lines[0].source.as_deref(), Some("UBS"));
    }
}
