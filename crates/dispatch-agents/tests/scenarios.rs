//! End-to-end synthesis scenarios against a scripted model client.
//!
//! Each test builds a batch of parsed research documents, scripts the model
//! replies, runs the synthesizer, and checks both the result and what was
//! sent to the model.

use std::sync::Arc;

use dispatch_agents::normalizer::{MULTIPLE_SOURCES, SYNTHESIS_DOCUMENT};
use dispatch_agents::test_support::{research_document, sample_models, with_trade, ScriptedLlm};
use dispatch_agents::{AgentError, PromptSet, RunState, Synthesizer};
use dispatch_models::config::SynthesisMode;
use dispatch_models::document::Document;
use dispatch_models::synthesis::DEFAULT_SYNTHESIS_TITLE;

fn weekly_batch() -> Vec<Document> {
    vec![
        with_trade(
            research_document(
                "Goldman Sachs",
                "Global Rates Weekly",
                &["Fed cuts priced too early"],
            ),
            "Pay 2y SOFR",
            "High",
        ),
        research_document(
            "Morgan Stanley",
            "Sunday Start",
            &["Fed cuts priced too early", "Earnings breadth"],
        ),
        research_document("Barclays", "Equity Strategy", &["Earnings breadth"]),
    ]
}

fn synthesizer(client: &Arc<ScriptedLlm>, mode: SynthesisMode) -> Synthesizer {
    Synthesizer::new(client.clone(), sample_models(), PromptSet::builtin(), mode)
}

const STAGE1_REPLY: &str = r#"{
  "title": "Rates Resist, Breadth Improves",
  "through_lines": [
    {
      "lead": "Markets are front-running the Fed",
      "key_insight": "GS and MS both see cuts priced too early.",
      "supporting_themes": ["Fed cuts priced too early"],
      "supporting_trades": ["Pay 2y SOFR"],
      "supporting_sources": ["Goldman Sachs", "Morgan Stanley"]
    },
    {
      "lead": "Earnings breadth is widening",
      "key_insight": "Beats are spreading beyond megacaps.",
      "supporting_themes": ["Earnings breadth"],
      "supporting_trades": [],
      "supporting_sources": ["Morgan Stanley", "Barclays"]
    }
  ]
}"#;

#[tokio::test]
async fn documents_without_themes_skip_synthesis() {
    let client = Arc::new(ScriptedLlm::new().reply("{}"));
    let docs = vec![
        research_document("UBS", "House View", &[]),
        Document {
            source: Some("Nomura".to_string()),
            parsed_data: None,
            ..Default::default()
        },
    ];

    for mode in [SynthesisMode::Monolithic, SynthesisMode::Skills] {
        let run = synthesizer(&client, mode).run(&docs).await;
        assert_eq!(run.state, RunState::Done);
        assert!(run.result.is_none());
    }
    assert_eq!(client.call_count().await, 0);
}

#[tokio::test]
async fn monolithic_wrapped_response_is_normalized() {
    let reply = r#"Here is the synthesis you asked for:

```json
{
  "title": "Cuts Priced Too Early",
  "document_count": 3,
  "through_lines": [
    {
      "lead": "Markets are front-running the Fed",
      "key_insight": "Two houses see the same mispricing.",
      "supporting_themes": ["Fed cuts priced too early"],
      "supporting_trades": ["Pay 2y SOFR"],
      "supporting_sources": ["Goldman Sachs", "Morgan Stanley"]
    }
  ],
  "callouts": [
    {"text": "Pay 2y SOFR into the March meeting", "source_through_line": "Markets are front-running the Fed"},
    {"text": "Breadth is the story of Q1", "source_through_line": "Not a real lead"},
    {"text": "Barclays sees 8% EPS growth", "source_through_line": "Markets are front-running the Fed", "source": "Barclays"}
  ]
}
```

Let me know if you need more detail."#;
    let client = Arc::new(ScriptedLlm::new().reply(reply));

    let run = synthesizer(&client, SynthesisMode::Monolithic)
        .run(&weekly_batch())
        .await;
    assert_eq!(run.state, RunState::Done);
    assert_eq!(run.model_calls, 1);

    let result = run.result.unwrap();
    assert_eq!(result.title, "Cuts Priced Too Early");
    assert_eq!(result.document_count, 3);
    assert_eq!(result.raw_response.as_deref(), Some(reply));

    let tl = &result.through_lines[0];
    assert_eq!(tl.source.as_deref(), Some("GS, MS"));
    assert_eq!(tl.document.as_deref(), Some(SYNTHESIS_DOCUMENT));

    assert_eq!(result.callouts[0].source.as_deref(), Some("GS, MS"));
    assert_eq!(result.callouts[1].source.as_deref(), Some(MULTIPLE_SOURCES));
    assert_eq!(result.callouts[2].source.as_deref(), Some("Barclays"));
}

#[tokio::test]
async fn monolithic_defaults_fill_missing_fields() {
    let client = Arc::new(ScriptedLlm::new().reply(r#"{"through_lines": [], "callouts": []}"#));

    let result = synthesizer(&client, SynthesisMode::Monolithic)
        .synthesize(&weekly_batch())
        .await
        .unwrap();
    assert_eq!(result.title, DEFAULT_SYNTHESIS_TITLE);
    assert_eq!(result.document_count, 3);
    assert!(result.through_lines.is_empty());
}

#[tokio::test]
async fn monolithic_input_carries_batch_summary() {
    let client = Arc::new(ScriptedLlm::new().reply("{}"));

    synthesizer(&client, SynthesisMode::Monolithic)
        .synthesize(&weekly_batch())
        .await
        .unwrap();

    let payload = client.calls().await[0].payload();
    assert_eq!(payload["document_count"], 3);
    assert_eq!(payload["themes"].as_array().unwrap().len(), 4);
    assert_eq!(payload["trades"][0]["text"], "Pay 2y SOFR");
    assert_eq!(
        payload["sources"],
        serde_json::json!(["Barclays", "Goldman Sachs", "Morgan Stanley"])
    );
    assert_eq!(payload["date_range"], "2025-01-15 to 2025-01-15");
}

#[tokio::test]
async fn monolithic_unparseable_response_fails() {
    let client = Arc::new(ScriptedLlm::new().reply("I could not find any through-lines."));

    let run = synthesizer(&client, SynthesisMode::Monolithic)
        .run(&weekly_batch())
        .await;
    assert_eq!(run.state, RunState::Failed);
    assert!(run.result.is_none());
}

#[tokio::test]
async fn monolithic_transport_error_fails() {
    let client = Arc::new(ScriptedLlm::new().fail(AgentError::Timeout(120)));

    let run = synthesizer(&client, SynthesisMode::Monolithic)
        .run(&weekly_batch())
        .await;
    assert_eq!(run.state, RunState::Failed);
    assert_eq!(run.model_calls, 1);
}

#[tokio::test]
async fn skills_pipeline_runs_both_stages() {
    let stage2 = r#"{"callouts": [
        {"text": "2y SOFR payers into March", "source_through_line": "Markets are front-running the Fed"},
        {"text": "Breadth beats are broadening", "source_through_line": "Earnings breadth is widening"}
    ]}"#;
    let client = Arc::new(ScriptedLlm::new().reply(STAGE1_REPLY).reply(stage2));

    let run = synthesizer(&client, SynthesisMode::Skills)
        .run(&weekly_batch())
        .await;
    assert_eq!(run.state, RunState::Done);
    assert_eq!(run.model_calls, 2);

    let result = run.result.unwrap();
    assert_eq!(result.title, "Rates Resist, Breadth Improves");
    assert_eq!(result.document_count, 3);
    assert!(result.raw_response.is_none());
    assert_eq!(result.through_lines.len(), 2);
    assert_eq!(result.through_lines[1].source.as_deref(), Some("MS, Barcs"));
    assert_eq!(result.callouts[0].source.as_deref(), Some("GS, MS"));
    assert_eq!(result.callouts[1].source.as_deref(), Some("MS, Barcs"));

    let calls = client.calls().await;
    let prompts = PromptSet::builtin();

    assert_eq!(calls[0].model, "throughline-model");
    assert_eq!(calls[0].system, prompts.throughline);
    let stage1_input = calls[0].payload();
    assert!(stage1_input.get("themes").is_some());
    assert!(stage1_input.get("trades").is_some());
    assert!(stage1_input.get("document_count").is_none());

    assert_eq!(calls[1].model, "callout-model");
    assert_eq!(calls[1].system, prompts.callout);
    let stage2_input = calls[1].payload();
    assert_eq!(stage2_input["through_lines"].as_array().unwrap().len(), 2);
    assert_eq!(
        stage2_input["through_lines"][0]["lead"],
        "Markets are front-running the Fed"
    );
}

#[tokio::test]
async fn skills_empty_stage1_aborts_before_stage2() {
    let client = Arc::new(
        ScriptedLlm::new()
            .reply(r#"{"title": "Nothing", "through_lines": []}"#)
            .reply(r#"{"callouts": []}"#),
    );

    let run = synthesizer(&client, SynthesisMode::Skills)
        .run(&weekly_batch())
        .await;
    assert_eq!(run.state, RunState::Failed);
    assert!(run.result.is_none());
    assert_eq!(client.call_count().await, 1);
}

#[tokio::test]
async fn skills_stage1_error_aborts() {
    let client = Arc::new(ScriptedLlm::new().fail(AgentError::Auth("Anthropic".to_string())));

    let result = synthesizer(&client, SynthesisMode::Skills)
        .synthesize(&weekly_batch())
        .await;
    assert!(result.is_none());
    assert_eq!(client.call_count().await, 1);
}

#[tokio::test]
async fn skills_stage2_failure_keeps_through_lines() {
    let client = Arc::new(
        ScriptedLlm::new()
            .reply(STAGE1_REPLY)
            .fail(AgentError::Api {
                provider: "OpenAI".to_string(),
                status: 500,
                body: "upstream error".to_string(),
            }),
    );

    let run = synthesizer(&client, SynthesisMode::Skills)
        .run(&weekly_batch())
        .await;
    assert_eq!(run.state, RunState::Done);

    let result = run.result.unwrap();
    assert_eq!(result.through_lines.len(), 2);
    assert!(result.callouts.is_empty());
    assert_eq!(result.through_lines[0].source.as_deref(), Some("GS, MS"));
}

#[tokio::test]
async fn skills_stage2_garbage_keeps_through_lines() {
    let client = Arc::new(
        ScriptedLlm::new()
            .reply(STAGE1_REPLY)
            .reply(r#"{"callouts": "none today"}"#),
    );

    let result = synthesizer(&client, SynthesisMode::Skills)
        .synthesize(&weekly_batch())
        .await
        .unwrap();
    assert_eq!(result.through_lines.len(), 2);
    assert!(result.callouts.is_empty());
}

#[tokio::test]
async fn skills_stage1_without_title_uses_default() {
    let stage1 = r#"{"through_lines": [{"lead": "Single view", "supporting_sources": ["Nomura"]}]}"#;
    let client = Arc::new(ScriptedLlm::new().reply(stage1).reply(r#"{"callouts": []}"#));

    let result = synthesizer(&client, SynthesisMode::Skills)
        .synthesize(&weekly_batch())
        .await
        .unwrap();
    assert_eq!(result.title, DEFAULT_SYNTHESIS_TITLE);
    assert_eq!(result.through_lines[0].source.as_deref(), Some("Nomura"));
}
