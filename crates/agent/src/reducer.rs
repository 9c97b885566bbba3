//! Streaming reduction.
//!
//! A backend reply arrives as an ordered sequence of fragments: free-text
//! deltas and, optionally, incremental chunks of one structured tool-call
//! payload. The accumulator concatenates both in arrival order; reduction
//! happens once, after the stream ends, as a pure function over the final
//! accumulated state.
//!
//! Reduction has two paths. The happy path parses and validates the
//! structured payload. When the payload is missing or malformed the parse
//! failure is recovered locally: urgency, categories and a cost range are
//! derived heuristically from the text, the result is flagged `fallback`
//! and its confidence is capped. A turn is never dropped silently.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::Deserialize;

use vakman_core::classify::{classify_urgency, detect_categories};
use vakman_core::config::BusinessProfile;
use vakman_core::domain::query::{ConversationPhase, Language, QueryContext};
use vakman_core::domain::response::{
    ChatResponse, CostRange, ExtractedFields, ServiceCategory, Urgency,
};
use vakman_core::errors::DispatchError;
use vakman_core::pricing::PriceBook;

use crate::llm::StreamFragment;

/// Default confidence for a fully validated structured payload that did
/// not state its own.
const STRUCTURED_CONFIDENCE_DEFAULT: u8 = 75;
/// Base confidence for heuristic extraction, before small bonuses for a
/// matched category and a non-trivial urgency.
const HEURISTIC_CONFIDENCE_BASE: u8 = 40;

/// Append-only accumulator over one response stream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamAccumulator {
    text: String,
    tool_name: Option<String>,
    tool_arguments: String,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: StreamFragment) {
        match fragment {
            StreamFragment::TextDelta(delta) => self.text.push_str(&delta),
            StreamFragment::ToolCallDelta { name, arguments } => {
                if self.tool_name.is_none() {
                    self.tool_name = name;
                }
                self.tool_arguments.push_str(&arguments);
            }
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tool_arguments(&self) -> &str {
        &self.tool_arguments
    }

    pub fn has_tool_payload(&self) -> bool {
        !self.tool_arguments.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.tool_arguments.trim().is_empty()
    }
}

/// Structured payload schema the frontline backend is asked to fill.
#[derive(Debug, Deserialize)]
pub(crate) struct StructuredChatPayload {
    response: String,
    urgency: Option<String>,
    #[serde(default)]
    categories: Vec<String>,
    cost_estimate: Option<PayloadCostRange>,
    customer: Option<PayloadCustomer>,
    should_request_booking: Option<bool>,
    confidence: Option<u16>,
    #[serde(default)]
    next_steps: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PayloadCostRange {
    min: Decimal,
    max: Decimal,
    currency: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PayloadCustomer {
    name: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    problem_type: Option<String>,
}

/// Reduce a completed stream into a validated `ChatResponse`.
///
/// Pure over the accumulated state: reducing the same accumulator twice
/// yields identical responses.
pub fn reduce_chat(
    accumulated: &StreamAccumulator,
    context: &QueryContext,
    profile: &BusinessProfile,
    price_book: &PriceBook,
) -> Result<ChatResponse, DispatchError> {
    if accumulated.is_empty() {
        return Err(DispatchError::ParseFailure(
            "stream ended without text or structured payload".to_string(),
        ));
    }

    if accumulated.has_tool_payload() {
        match serde_json::from_str::<StructuredChatPayload>(&accumulated.tool_arguments) {
            Ok(payload) => return Ok(normalize_structured(payload, accumulated, context, profile)),
            Err(error) => {
                tracing::debug!(
                    event_name = "turn.reduce.parse_failure",
                    error = %error,
                    "structured payload malformed, falling back to heuristic extraction"
                );
            }
        }
    }

    Ok(heuristic_response(accumulated.text(), context, profile, price_book))
}

fn normalize_structured(
    payload: StructuredChatPayload,
    accumulated: &StreamAccumulator,
    context: &QueryContext,
    profile: &BusinessProfile,
) -> ChatResponse {
    let urgency = payload
        .urgency
        .as_deref()
        .and_then(Urgency::parse)
        .unwrap_or_else(|| classify_urgency(&context.message, context.language));

    // Through a set: payload category lists may repeat entries in any order.
    let mut categories: Vec<ServiceCategory> = payload
        .categories
        .iter()
        .filter_map(|raw| ServiceCategory::parse(raw))
        .collect::<BTreeSet<ServiceCategory>>()
        .into_iter()
        .collect();
    if categories.is_empty() {
        categories = detect_categories(&context.message, context.language);
    }

    let cost_estimate = payload.cost_estimate.map(|range| CostRange {
        min: range.min,
        max: range.max,
        currency: range.currency.unwrap_or_else(|| profile.currency.clone()),
        description: range.description.unwrap_or_default(),
    });

    let extracted = payload.customer.map(|customer| ExtractedFields {
        customer_name: customer.name,
        phone: customer.phone,
        address: customer.address,
        problem_type: customer.problem_type,
    });

    let text = if payload.response.trim().is_empty() {
        accumulated.text().to_string()
    } else {
        payload.response
    };

    let should_request_booking = payload
        .should_request_booking
        .unwrap_or(urgency >= Urgency::High || context.phase == ConversationPhase::Booking);

    ChatResponse {
        text,
        urgency,
        categories,
        cost_estimate,
        extracted,
        should_request_booking,
        confidence: payload
            .confidence
            .map(|value| value.min(100) as u8)
            .unwrap_or(STRUCTURED_CONFIDENCE_DEFAULT),
        next_steps: payload.next_steps,
        fallback: false,
    }
    .normalized()
}

fn heuristic_response(
    accumulated_text: &str,
    context: &QueryContext,
    profile: &BusinessProfile,
    price_book: &PriceBook,
) -> ChatResponse {
    let urgency = classify_urgency(&context.message, context.language)
        .max(classify_urgency(accumulated_text, context.language));

    let mut categories = detect_categories(&context.message, context.language);
    if categories == [ServiceCategory::HourlyRate] && !accumulated_text.trim().is_empty() {
        categories = detect_categories(accumulated_text, context.language);
    }

    let cost_estimate = Some(price_book.estimate(&categories, urgency, profile));

    let has_concrete_category =
        categories.iter().any(|category| *category != ServiceCategory::HourlyRate);
    let should_request_booking = urgency >= Urgency::High
        || matches!(context.phase, ConversationPhase::Quoted | ConversationPhase::Booking)
        || (has_concrete_category && context.phase == ConversationPhase::ProblemIdentified);

    let mut confidence = HEURISTIC_CONFIDENCE_BASE;
    if has_concrete_category {
        confidence += 10;
    }
    if urgency > Urgency::Low {
        confidence += 5;
    }

    let text = if accumulated_text.trim().is_empty() {
        canned_acknowledgement(context.language).to_string()
    } else {
        accumulated_text.to_string()
    };

    ChatResponse {
        text,
        urgency,
        categories,
        cost_estimate,
        extracted: None,
        should_request_booking,
        confidence,
        next_steps: heuristic_next_steps(urgency, context.language),
        fallback: true,
    }
    .normalized()
}

fn canned_acknowledgement(language: Language) -> &'static str {
    match language {
        Language::En => "We received your message and will follow up with the details shortly.",
        Language::Nl => "We hebben uw bericht ontvangen en komen er zo op terug.",
    }
}

fn heuristic_next_steps(urgency: Urgency, language: Language) -> Vec<String> {
    let steps: &[&str] = match (urgency, language) {
        (Urgency::Emergency, Language::En) => {
            &["Shut off the main water valve if you can reach it safely", "Call us immediately"]
        }
        (Urgency::Emergency, Language::Nl) => {
            &["Draai de hoofdkraan dicht als dat veilig kan", "Bel ons direct"]
        }
        (_, Language::En) => &["Share a photo of the problem if possible", "Confirm your address"],
        (_, Language::Nl) => {
            &["Stuur indien mogelijk een foto van het probleem", "Bevestig uw adres"]
        }
    };
    steps.iter().map(|step| (*step).to_string()).collect()
}
