//! Turn orchestration.
//!
//! One `handle_turn` call walks a fixed lifecycle: select a backend,
//! dispatch with a retry budget, accumulate the response stream, reduce
//! it into a validated `ChatResponse`. Every attempt gets its own timeout
//! and a fresh accumulator; transient failures back off exponentially and
//! retry, fatal rejections and capability mismatches fail the turn at
//! once. The deep-analysis path reuses the same dispatch machinery but
//! always targets the reasoning backend.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

use vakman_core::config::OrchestratorConfig;
use vakman_core::domain::analysis::DetailedAnalysis;
use vakman_core::domain::query::{QueryContext, TurnRole};
use vakman_core::domain::response::ChatResponse;
use vakman_core::errors::DispatchError;
use vakman_core::pricing::PriceBook;
use vakman_core::registry::{BackendId, CapabilityRegistry};
use vakman_core::routing::{estimate_tokens, Router, RoutingDecision};

use crate::analysis;
use crate::llm::{BackendError, BackendRequest, ChatMessage, LlmBackend, ToolSpec};
use crate::reducer::{reduce_chat, StreamAccumulator};

/// Lifecycle of a single turn. Transitions only move forward; retries
/// loop within `Dispatching`/`Streaming` rather than re-entering
/// `Selecting`, because routing is deterministic for a fixed context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Selecting,
    Dispatching,
    Streaming,
    Reducing,
    Completed,
    Failed,
}

impl TurnState {
    pub fn can_transition_to(&self, next: TurnState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Selecting)
                | (Self::Selecting, Self::Dispatching)
                | (Self::Selecting, Self::Failed)
                | (Self::Dispatching, Self::Dispatching)
                | (Self::Dispatching, Self::Streaming)
                | (Self::Dispatching, Self::Failed)
                | (Self::Streaming, Self::Dispatching)
                | (Self::Streaming, Self::Reducing)
                | (Self::Streaming, Self::Failed)
                | (Self::Reducing, Self::Completed)
                | (Self::Reducing, Self::Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Selecting => "selecting",
            Self::Dispatching => "dispatching",
            Self::Streaming => "streaming",
            Self::Reducing => "reducing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Successful result of one chat turn, with the routing decision kept
/// around for logging and diagnostics.
#[derive(Clone, Debug)]
pub struct TurnOutcome {
    pub turn_id: Uuid,
    pub response: ChatResponse,
    pub routing: RoutingDecision,
}

pub struct Orchestrator {
    backend: Arc<dyn LlmBackend>,
    registry: Arc<CapabilityRegistry>,
    router: Router,
    price_book: PriceBook,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        registry: Arc<CapabilityRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        Self { backend, registry, router: Router::default(), price_book: PriceBook, config }
    }

    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run one customer turn end to end.
    ///
    /// Cancellation is cooperative: dropping the returned future abandons
    /// the in-flight attempt without surfacing a partial response.
    pub async fn handle_turn(&self, context: &QueryContext) -> Result<TurnOutcome, DispatchError> {
        let turn_id = Uuid::new_v4();
        let mut state = TurnState::Idle;
        self.advance(&mut state, TurnState::Selecting, turn_id);

        let routing = match self.router.select(context, &self.registry) {
            Ok(decision) => decision,
            Err(error) => return Err(self.fail(&mut state, turn_id, error)),
        };
        tracing::info!(
            event_name = "turn.selected",
            turn_id = %turn_id,
            backend = routing.backend.as_str(),
            reasons = ?routing.reasons,
            "backend selected"
        );

        let request = self.build_chat_request(context, routing.backend);
        let accumulated = match self.dispatch_with_retry(&request, &mut state, turn_id).await {
            Ok(accumulated) => accumulated,
            Err(error) => return Err(self.fail(&mut state, turn_id, error)),
        };

        self.advance(&mut state, TurnState::Reducing, turn_id);
        let response =
            match reduce_chat(&accumulated, context, &self.config.profile, &self.price_book) {
                Ok(response) => response,
                Err(error) => return Err(self.fail(&mut state, turn_id, error)),
            };

        self.advance(&mut state, TurnState::Completed, turn_id);
        tracing::info!(
            event_name = "turn.completed",
            turn_id = %turn_id,
            backend = routing.backend.as_str(),
            fallback = response.fallback,
            confidence = response.confidence,
            urgency = response.urgency.as_str(),
            "turn completed"
        );

        Ok(TurnOutcome { turn_id, response, routing })
    }

    /// Run a deep-analysis request against the reasoning backend,
    /// bypassing scoring but not the capability gate.
    pub async fn handle_deep_analysis(
        &self,
        context: &QueryContext,
    ) -> Result<DetailedAnalysis, DispatchError> {
        let turn_id = Uuid::new_v4();
        let mut state = TurnState::Idle;
        self.advance(&mut state, TurnState::Selecting, turn_id);

        let caps = match self.registry.capabilities(BackendId::Reasoner) {
            Ok(caps) => caps,
            Err(error) => return Err(self.fail(&mut state, turn_id, error)),
        };
        let footprint = estimate_tokens(context);
        if footprint > caps.context_window_tokens {
            let error = DispatchError::CapabilityMismatch(format!(
                "estimated {footprint} tokens exceed the {} token window of {}",
                caps.context_window_tokens,
                caps.id.as_str()
            ));
            return Err(self.fail(&mut state, turn_id, error));
        }

        let request = analysis::build_request(context, &self.config.profile);
        let accumulated = match self.dispatch_with_retry(&request, &mut state, turn_id).await {
            Ok(accumulated) => accumulated,
            Err(error) => return Err(self.fail(&mut state, turn_id, error)),
        };

        self.advance(&mut state, TurnState::Reducing, turn_id);
        let analysis =
            match analysis::reduce_analysis(&accumulated, context, &self.config.profile) {
                Ok(analysis) => analysis,
                Err(error) => return Err(self.fail(&mut state, turn_id, error)),
            };

        self.advance(&mut state, TurnState::Completed, turn_id);
        tracing::info!(
            event_name = "analysis.completed",
            turn_id = %turn_id,
            complexity = ?analysis.technical.complexity,
            confidence = analysis.confidence,
            "deep analysis completed"
        );
        Ok(analysis)
    }

    /// Dispatch one request within the retry budget. Each attempt opens a
    /// new stream and accumulates into fresh state, so a mid-stream
    /// transient failure can never leak half a reply into the next attempt.
    async fn dispatch_with_retry(
        &self,
        request: &BackendRequest,
        state: &mut TurnState,
        turn_id: Uuid,
    ) -> Result<StreamAccumulator, DispatchError> {
        let retry = &self.config.retry;
        let attempt_timeout = Duration::from_secs(retry.attempt_timeout_secs);
        let mut last_error = String::new();

        for attempt in 1..=retry.max_attempts {
            if attempt > 1 {
                let backoff = Duration::from_millis(
                    retry.base_backoff_ms.saturating_mul(1u64 << (attempt - 2).min(16)),
                );
                tracing::warn!(
                    event_name = "turn.dispatch.retry",
                    turn_id = %turn_id,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    last_error = %last_error,
                    "retrying dispatch"
                );
                sleep(backoff).await;
            }

            self.advance(state, TurnState::Dispatching, turn_id);
            match timeout(attempt_timeout, self.attempt(request, state, turn_id)).await {
                Ok(Ok(accumulated)) => return Ok(accumulated),
                Ok(Err(BackendError::Fatal(message))) => {
                    // Retrying a rejected request cannot change the outcome.
                    return Err(DispatchError::ExhaustedRetries {
                        attempts: attempt,
                        last_error: message,
                    });
                }
                Ok(Err(BackendError::Transient(message))) => last_error = message,
                Err(_) => {
                    last_error =
                        format!("attempt timed out after {}s", retry.attempt_timeout_secs);
                }
            }
        }

        Err(DispatchError::ExhaustedRetries { attempts: retry.max_attempts, last_error })
    }

    async fn attempt(
        &self,
        request: &BackendRequest,
        state: &mut TurnState,
        turn_id: Uuid,
    ) -> Result<StreamAccumulator, BackendError> {
        let mut stream = self.backend.stream(request.clone()).await?;
        self.advance(state, TurnState::Streaming, turn_id);

        let mut accumulated = StreamAccumulator::new();
        while let Some(item) = stream.next().await {
            accumulated.push(item?);
        }
        Ok(accumulated)
    }

    fn build_chat_request(&self, context: &QueryContext, backend: BackendId) -> BackendRequest {
        let profile = &self.config.profile;
        let mut messages = vec![ChatMessage::system(format!(
            "You are the dispatch assistant for {}, a plumbing service. Answer in the \
             customer's language (English or Dutch). Labor is billed at {} {} per hour. \
             Always report your findings through the `dispatch_summary` tool.",
            profile.business_name, profile.labor_rate_per_hour, profile.currency
        ))];

        for turn in context.turns() {
            messages.push(match turn.role {
                TurnRole::Customer => ChatMessage::user(turn.content.clone()),
                TurnRole::Assistant => ChatMessage::assistant(turn.content.clone()),
            });
        }
        messages.push(ChatMessage::user(context.message.clone()));

        BackendRequest { backend, messages, tool: Some(chat_tool_spec()) }
    }

    fn advance(&self, state: &mut TurnState, next: TurnState, turn_id: Uuid) {
        debug_assert!(state.can_transition_to(next), "{} -> {}", state.as_str(), next.as_str());
        tracing::trace!(
            event_name = "turn.state",
            turn_id = %turn_id,
            from = state.as_str(),
            to = next.as_str(),
        );
        *state = next;
    }

    fn fail(&self, state: &mut TurnState, turn_id: Uuid, error: DispatchError) -> DispatchError {
        self.advance(state, TurnState::Failed, turn_id);
        tracing::error!(
            event_name = "turn.failed",
            turn_id = %turn_id,
            error = %error,
            user_message = error.user_message(),
            "turn failed"
        );
        error
    }
}

pub fn chat_tool_spec() -> ToolSpec {
    ToolSpec {
        name: "dispatch_summary".to_string(),
        description: "Validated summary of the assistant's reply for dispatch".to_string(),
        parameters: json!({
            "type": "object",
            "required": ["response"],
            "properties": {
                "response": { "type": "string" },
                "urgency": { "enum": ["low", "normal", "high", "emergency"] },
                "categories": { "type": "array", "items": { "type": "string" } },
                "cost_estimate": {
                    "type": "object",
                    "properties": {
                        "min": { "type": "number" },
                        "max": { "type": "number" },
                        "currency": { "type": "string" },
                        "description": { "type": "string" }
                    }
                },
                "customer": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "phone": { "type": "string" },
                        "address": { "type": "string" },
                        "problem_type": { "type": "string" }
                    }
                },
                "should_request_booking": { "type": "boolean" },
                "confidence": { "type": "integer" },
                "next_steps": { "type": "array", "items": { "type": "string" } }
            }
        }),
    }
}
