//! Agent runtime - backend dispatch and streaming orchestration
//!
//! This crate is the asynchronous half of the vakman system. It takes the
//! deterministic decisions made by `vakman-core` (routing, classification,
//! pricing) and drives the actual LLM backends with them:
//! - Dispatches one request per turn with retries, backoff and per-attempt
//!   timeouts (`orchestrator`)
//! - Accumulates the response stream and reduces it into a validated
//!   `ChatResponse`, falling back to heuristic extraction when the
//!   structured payload is missing or malformed (`reducer`)
//! - Builds and reduces deep-analysis requests against the reasoning
//!   backend (`analysis`)
//!
//! # Key Types
//!
//! - `Orchestrator` - Turn lifecycle owner (see `orchestrator` module)
//! - `LlmBackend` - Pluggable trait over the provider SDKs
//! - `StreamAccumulator` - Append-only buffer over one response stream
//!
//! # Safety Principle
//!
//! The backends are strictly narrators. Urgency, service categories and
//! cost ranges in a fallback response come from the deterministic
//! classifier and price book in `vakman-core`, never from free text alone.

pub mod analysis;
pub mod llm;
pub mod orchestrator;
pub mod reducer;

pub use analysis::{build_request as build_analysis_request, reduce_analysis};
pub use llm::{
    BackendError, BackendRequest, ChatMessage, FragmentStream, LlmBackend, MessageRole,
    StreamFragment, ToolSpec,
};
pub use orchestrator::{chat_tool_spec, Orchestrator, TurnOutcome, TurnState};
pub use reducer::{reduce_chat, StreamAccumulator};
