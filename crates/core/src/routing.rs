//! Backend selection.
//!
//! `Router::select` computes an additive suitability score per backend
//! from weighted signals over the query context, clamps it to 0..=100 and
//! picks a winner, preferring the customer-facing backend on exact ties.
//! A capability gate then verifies the winner can actually take the turn
//! (token footprint, image and extended-reasoning support) and falls
//! through to the next-best candidate when it cannot.
//!
//! The function is pure: the same context against the same registry always
//! yields the same decision.

use serde::{Deserialize, Serialize};

use crate::classify::classify_urgency;
use crate::domain::query::QueryContext;
use crate::domain::response::Urgency;
use crate::errors::DispatchError;
use crate::registry::{BackendId, CapabilityRegistry, ModelCapabilities, Strength};

/// Conversations at or beyond this many turns favor the reasoning backend.
pub const LONG_HISTORY_TURNS: usize = 8;
/// Messages below this many words count as short, simple utterances.
pub const SHORT_MESSAGE_WORDS: usize = 12;
/// Crude token footprint heuristic: about four characters per token.
const CHARS_PER_TOKEN: usize = 4;
/// Fixed per-turn framing overhead added to the footprint estimate.
const TURN_OVERHEAD_TOKENS: usize = 8;

/// Named weight table for the routing signals. The magnitudes are tuning
/// inputs carried over from operational experience, not derived constants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScoringWeights {
    pub customer_facing_base: u8,
    pub emergency_to_frontline: u8,
    pub short_message_to_frontline: u8,
    pub cost_efficient_simple: u8,
    pub extended_reasoning_to_reasoner: u8,
    pub planning_to_reasoner: u8,
    pub long_history_to_reasoner: u8,
    pub image_support: u8,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            customer_facing_base: 15,
            emergency_to_frontline: 35,
            short_message_to_frontline: 20,
            cost_efficient_simple: 10,
            extended_reasoning_to_reasoner: 45,
            planning_to_reasoner: 30,
            long_history_to_reasoner: 25,
            image_support: 25,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendScore {
    pub backend: BackendId,
    pub score: u8,
}

/// Outcome of routing one turn. Not persisted; consumed by the current
/// dispatch and by logging.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub backend: BackendId,
    pub scores: Vec<BackendScore>,
    pub reasons: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct Router {
    weights: ScoringWeights,
}

impl Router {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// Pick a backend for the turn. Candidates are ranked by score, then
    /// walked through the capability gate; the first fit wins. No candidate
    /// fitting yields `CapabilityMismatch`, never a silent truncation.
    pub fn select(
        &self,
        context: &QueryContext,
        registry: &CapabilityRegistry,
    ) -> Result<RoutingDecision, DispatchError> {
        let mut ranked: Vec<(&ModelCapabilities, u8)> = registry
            .all()
            .iter()
            .map(|caps| (caps, self.score(context, caps)))
            .collect();

        // Highest score first; exact ties go to the customer-facing backend
        // so the user experience stays stable across marginal differences.
        ranked.sort_by(|(left_caps, left_score), (right_caps, right_score)| {
            right_score.cmp(left_score).then_with(|| {
                let left_facing = left_caps.has_strength(Strength::CustomerFacing);
                let right_facing = right_caps.has_strength(Strength::CustomerFacing);
                right_facing.cmp(&left_facing).then(left_caps.id.cmp(&right_caps.id))
            })
        });

        let scores: Vec<BackendScore> = ranked
            .iter()
            .map(|(caps, score)| BackendScore { backend: caps.id, score: *score })
            .collect();

        let mut gate_failures = Vec::new();
        for (caps, _) in &ranked {
            match validate_fit(context, caps) {
                Ok(()) => {
                    let reasons = self
                        .fired_signals(context, caps)
                        .into_iter()
                        .map(|(reason, weight)| format!("{reason} (+{weight})"))
                        .collect();
                    return Ok(RoutingDecision { backend: caps.id, scores, reasons });
                }
                Err(reason) => gate_failures.push(format!("{}: {reason}", caps.id.as_str())),
            }
        }

        Err(DispatchError::CapabilityMismatch(gate_failures.join("; ")))
    }

    fn score(&self, context: &QueryContext, caps: &ModelCapabilities) -> u8 {
        let total: u32 = self
            .fired_signals(context, caps)
            .iter()
            .map(|(_, weight)| u32::from(*weight))
            .sum();
        total.min(100) as u8
    }

    /// Evaluate which signals fire for a backend. Used both for scoring and
    /// for the human-readable reasons, so the reasons can never drift from
    /// the score.
    fn fired_signals(
        &self,
        context: &QueryContext,
        caps: &ModelCapabilities,
    ) -> Vec<(&'static str, u8)> {
        let weights = &self.weights;
        let mut fired = Vec::new();

        let customer_facing = caps.has_strength(Strength::CustomerFacing);
        let urgency = effective_urgency(context);
        let short_message = context.message.split_whitespace().count() < SHORT_MESSAGE_WORDS;
        let long_history = context.message_count() >= LONG_HISTORY_TURNS;

        if customer_facing {
            fired.push(("customer-facing backend", weights.customer_facing_base));
        }
        if customer_facing && urgency == Urgency::Emergency {
            fired.push(("emergency needs the fast customer-facing backend", weights.emergency_to_frontline));
        }
        if customer_facing && short_message && !context.needs_extended_reasoning {
            fired.push(("short simple utterance", weights.short_message_to_frontline));
        }
        if caps.has_strength(Strength::CostEfficient) && short_message && !context.needs_planning {
            fired.push(("cheap backend suffices for a simple turn", weights.cost_efficient_simple));
        }
        if caps.supports_extended_reasoning && context.needs_extended_reasoning {
            fired.push(("extended reasoning requested", weights.extended_reasoning_to_reasoner));
        }
        if caps.has_strength(Strength::Planning) && context.needs_planning {
            fired.push(("planning requested", weights.planning_to_reasoner));
        }
        if caps.supports_extended_reasoning && long_history {
            fired.push(("long conversation history", weights.long_history_to_reasoner));
        }
        if caps.supports_images && context.has_images {
            fired.push(("query carries images", weights.image_support));
        }

        fired
    }
}

fn effective_urgency(context: &QueryContext) -> Urgency {
    let classified = classify_urgency(&context.message, context.language);
    match context.urgency_hint {
        Some(hint) => hint.max(classified),
        None => classified,
    }
}

/// Estimated token footprint of the full context: message plus history,
/// with a fixed per-turn framing overhead. Conservative by design.
pub fn estimate_tokens(context: &QueryContext) -> u32 {
    let history_chars: usize =
        context.turns().iter().map(|turn| turn.content.chars().count()).sum();
    let chars = context.message.chars().count() + history_chars;
    let overhead = (context.message_count() + 1) * TURN_OVERHEAD_TOKENS;
    ((chars / CHARS_PER_TOKEN) + overhead) as u32
}

fn validate_fit(context: &QueryContext, caps: &ModelCapabilities) -> Result<(), String> {
    let footprint = estimate_tokens(context);
    if footprint > caps.context_window_tokens {
        return Err(format!(
            "estimated {footprint} tokens exceed the {}-token context window",
            caps.context_window_tokens
        ));
    }
    if context.has_images && !caps.supports_images {
        return Err("images are not supported".to_string());
    }
    if context.needs_extended_reasoning && !caps.supports_extended_reasoning {
        return Err("extended reasoning is not supported".to_string());
    }
    Ok(())
}
