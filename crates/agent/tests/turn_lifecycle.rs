//! End-to-end turn lifecycle against a scripted backend.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use rust_decimal::Decimal;

use vakman_agent::llm::{
    BackendError, BackendRequest, FragmentStream, LlmBackend, StreamFragment,
};
use vakman_agent::orchestrator::Orchestrator;
use vakman_core::config::OrchestratorConfig;
use vakman_core::domain::query::{Language, QueryContext};
use vakman_core::domain::response::{ServiceCategory, Urgency, FALLBACK_CONFIDENCE_CEILING};
use vakman_core::errors::DispatchError;
use vakman_core::registry::{BackendId, CapabilityRegistry};

/// One scripted answer to a `stream()` call.
enum Script {
    Reject(BackendError),
    Stream(Vec<Result<StreamFragment, BackendError>>),
}

/// Backend double that replays a fixed script, one entry per dispatch
/// attempt, and records every request it saw.
struct ScriptedBackend {
    script: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<BackendRequest>>,
}

impl ScriptedBackend {
    fn new(script: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn attempts_seen(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }

    fn last_request(&self) -> BackendRequest {
        self.requests.lock().expect("requests lock").last().expect("at least one request").clone()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn stream(&self, request: BackendRequest) -> Result<FragmentStream, BackendError> {
        self.requests.lock().expect("requests lock").push(request);
        let next = self
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .expect("script exhausted: unexpected extra dispatch attempt");
        match next {
            Script::Reject(error) => Err(error),
            Script::Stream(items) => Ok(Box::pin(stream::iter(items))),
        }
    }
}

fn orchestrator(backend: Arc<ScriptedBackend>) -> Orchestrator {
    let mut config = OrchestratorConfig::default();
    config.retry.base_backoff_ms = 10;
    Orchestrator::new(backend, Arc::new(CapabilityRegistry::standard()), config)
}

fn text(delta: &str) -> Result<StreamFragment, BackendError> {
    Ok(StreamFragment::TextDelta(delta.to_string()))
}

fn tool_chunk(name: Option<&str>, arguments: &str) -> Result<StreamFragment, BackendError> {
    Ok(StreamFragment::ToolCallDelta {
        name: name.map(str::to_string),
        arguments: arguments.to_string(),
    })
}

#[tokio::test(start_paused = true)]
async fn structured_turn_completes_on_first_attempt() {
    let backend = ScriptedBackend::new(vec![Script::Stream(vec![
        tool_chunk(Some("dispatch_summary"), r#"{"response":"A tap replacement"#),
        tool_chunk(None, r#" runs 120 to 250 euros.","urgency":"normal","categories":["tap_replacement"],"cost_estimate":{"min":120,"max":250,"currency":"EUR"},"confidence":85}"#),
    ])]);

    let orchestrator = orchestrator(backend.clone());
    let context = QueryContext::new("how much to replace a kitchen tap?", Language::En);
    let outcome = orchestrator.handle_turn(&context).await.expect("turn");

    assert_eq!(backend.attempts_seen(), 1);
    assert_eq!(outcome.routing.backend, BackendId::Frontline);
    assert!(!outcome.response.fallback);
    assert_eq!(outcome.response.urgency, Urgency::Normal);
    assert_eq!(outcome.response.categories, vec![ServiceCategory::TapReplacement]);
    assert_eq!(outcome.response.confidence, 85);

    // The dispatched request carries the tool schema and the user message.
    let request = backend.last_request();
    assert_eq!(request.backend, BackendId::Frontline);
    assert_eq!(request.tool.expect("tool").name, "dispatch_summary");
    assert!(request.messages.iter().any(|m| m.content.contains("kitchen tap")));
}

#[tokio::test(start_paused = true)]
async fn repeated_transient_failures_exhaust_the_retry_budget() {
    let backend = ScriptedBackend::new(vec![
        Script::Reject(BackendError::Transient("connection reset".to_string())),
        Script::Reject(BackendError::Transient("connection reset".to_string())),
        Script::Stream(vec![
            text("partial answer that must never surface"),
            Err(BackendError::Transient("stream dropped".to_string())),
        ]),
    ]);

    let orchestrator = orchestrator(backend.clone());
    let context = QueryContext::new("my drain is blocked", Language::En);
    let error = orchestrator.handle_turn(&context).await.expect_err("budget exhausted");

    assert_eq!(backend.attempts_seen(), 3);
    match error {
        DispatchError::ExhaustedRetries { attempts, last_error } => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("stream dropped"));
        }
        other => panic!("expected ExhaustedRetries, got {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn mid_stream_failure_restarts_with_a_fresh_accumulator() {
    let backend = ScriptedBackend::new(vec![
        Script::Stream(vec![
            text("STALE FIRST ATTEMPT "),
            Err(BackendError::Transient("stream dropped".to_string())),
        ]),
        Script::Stream(vec![tool_chunk(
            Some("dispatch_summary"),
            r#"{"response":"We can unclog that tomorrow.","urgency":"normal","categories":["drain_unclog"],"confidence":80}"#,
        )]),
    ]);

    let orchestrator = orchestrator(backend.clone());
    let context = QueryContext::new("my drain is blocked", Language::En);
    let outcome = orchestrator.handle_turn(&context).await.expect("turn");

    assert_eq!(backend.attempts_seen(), 2);
    assert!(!outcome.response.fallback);
    assert!(!outcome.response.text.contains("STALE FIRST ATTEMPT"));
    assert_eq!(outcome.response.categories, vec![ServiceCategory::DrainUnclog]);
}

#[tokio::test(start_paused = true)]
async fn fatal_rejection_fails_without_further_attempts() {
    let backend = ScriptedBackend::new(vec![
        Script::Reject(BackendError::Fatal("request blocked by provider".to_string())),
        Script::Stream(vec![text("never reached")]),
    ]);

    let orchestrator = orchestrator(backend.clone());
    let context = QueryContext::new("hello", Language::En);
    let error = orchestrator.handle_turn(&context).await.expect_err("fatal");

    assert_eq!(backend.attempts_seen(), 1);
    match error {
        DispatchError::ExhaustedRetries { attempts, last_error } => {
            assert_eq!(attempts, 1);
            assert!(last_error.contains("blocked by provider"));
        }
        other => panic!("expected ExhaustedRetries, got {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn malformed_payload_yields_a_fallback_response_not_an_error() {
    let backend = ScriptedBackend::new(vec![Script::Stream(vec![
        text("Sounds like the boiler needs a service visit."),
        tool_chunk(Some("dispatch_summary"), r#"{"response":"truncated mid-jso"#),
    ])]);

    let orchestrator = orchestrator(backend.clone());
    let context = QueryContext::new("boiler is making a banging noise", Language::En);
    let outcome = orchestrator.handle_turn(&context).await.expect("turn");

    assert!(outcome.response.fallback);
    assert!(outcome.response.confidence <= FALLBACK_CONFIDENCE_CEILING);
    assert!(outcome.response.categories.contains(&ServiceCategory::BoilerService));
    let estimate = outcome.response.cost_estimate.expect("fallback always estimates");
    assert!(estimate.min <= estimate.max);
}

#[tokio::test(start_paused = true)]
async fn empty_stream_surfaces_a_parse_failure() {
    let backend = ScriptedBackend::new(vec![Script::Stream(Vec::new())]);

    let orchestrator = orchestrator(backend.clone());
    let context = QueryContext::new("hello?", Language::En);
    let error = orchestrator.handle_turn(&context).await.expect_err("empty stream");

    assert!(matches!(error, DispatchError::ParseFailure(_)));
    assert!(error.user_message().contains("call us directly"));
}

#[tokio::test(start_paused = true)]
async fn deep_analysis_targets_the_reasoner_and_balances_the_books() {
    let backend = ScriptedBackend::new(vec![Script::Stream(vec![tool_chunk(
        Some("technical_analysis"),
        r#"{
            "summary": "Full radiator replacement in the living room",
            "complexity": "complex",
            "duration_hours": { "min": 3, "max": 5 },
            "materials": [ { "name": "600x1200 radiator", "cost": 210, "essential": true } ],
            "labor_hours": 4,
            "priority": "normal",
            "confidence": 78
        }"#,
    )])]);

    let orchestrator = orchestrator(backend.clone());
    let mut context = QueryContext::new("old radiator is rusted through", Language::En);
    context.needs_extended_reasoning = true;

    let analysis = orchestrator.handle_deep_analysis(&context).await.expect("analysis");

    assert_eq!(backend.last_request().backend, BackendId::Reasoner);
    assert!(analysis.costs.is_consistent());
    // 4h at the default 85/h rate plus the radiator.
    assert_eq!(analysis.costs.labor_cost, Decimal::new(340, 0));
    assert_eq!(analysis.costs.material_cost, Decimal::new(210, 0));
    assert_eq!(analysis.confidence, 78);
}

#[tokio::test(start_paused = true)]
async fn dutch_emergency_falls_back_with_actionable_next_steps() {
    let backend = ScriptedBackend::new(vec![Script::Stream(vec![text(
        "Ik stuur direct een monteur naar u toe.",
    )])]);

    let orchestrator = orchestrator(backend.clone());
    let context = QueryContext::new("help, water stroomt uit de muur!", Language::Nl);
    let outcome = orchestrator.handle_turn(&context).await.expect("turn");

    assert_eq!(outcome.response.urgency, Urgency::Emergency);
    assert!(outcome.response.should_request_booking);
    assert!(outcome.response.fallback);
    assert!(outcome
        .response
        .next_steps
        .iter()
        .any(|step| step.contains("hoofdkraan")));
}
