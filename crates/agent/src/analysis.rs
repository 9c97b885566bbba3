//! Deep-analysis path.
//!
//! Builds one request for the reasoning backend out of the full
//! conversation plus everything already known about the customer, and
//! normalizes the reply into a `DetailedAnalysis`. Shares the
//! structured-parse-with-text-fallback strategy of the streaming reducer;
//! the text fallback leans on regex extraction for duration ranges,
//! currency figures and confidence percentages, with conservative
//! defaults when nothing is extractable.

use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use vakman_core::classify::classify_urgency;
use vakman_core::config::BusinessProfile;
use vakman_core::domain::analysis::{
    Complexity, CostBreakdown, DetailedAnalysis, DurationRange, ExpertiseLevel, Material, Risk,
    RiskLevel, SchedulingAdvice, TechnicalAssessment,
};
use vakman_core::domain::query::{QueryContext, TurnRole};
use vakman_core::domain::response::{Urgency, FALLBACK_CONFIDENCE_CEILING};
use vakman_core::errors::DispatchError;
use vakman_core::registry::BackendId;

use crate::llm::{BackendRequest, ChatMessage, ToolSpec};
use crate::reducer::StreamAccumulator;

const FALLBACK_DURATION_MIN_HOURS: Decimal = Decimal::ONE;
const FALLBACK_DURATION_MAX_HOURS: Decimal = Decimal::from_parts(3, 0, 0, false, 0);
const FALLBACK_ANALYSIS_CONFIDENCE: u8 = 45;

pub fn analysis_tool_spec() -> ToolSpec {
    ToolSpec {
        name: "technical_analysis".to_string(),
        description: "Structured technical and cost analysis of the reported job".to_string(),
        parameters: json!({
            "type": "object",
            "required": ["summary", "complexity", "duration_hours", "labor_hours"],
            "properties": {
                "summary": { "type": "string" },
                "complexity": { "enum": ["simple", "moderate", "complex", "specialist"] },
                "duration_hours": {
                    "type": "object",
                    "properties": { "min": { "type": "number" }, "max": { "type": "number" } }
                },
                "materials": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "cost": { "type": "number" },
                            "essential": { "type": "boolean" }
                        }
                    }
                },
                "labor_hours": { "type": "number" },
                "expertise": { "enum": ["apprentice", "journeyman", "master"] },
                "priority": { "enum": ["low", "normal", "high", "emergency"] },
                "recommended_slot": { "type": "string" },
                "preparation_steps": { "type": "array", "items": { "type": "string" } },
                "follow_up_required": { "type": "boolean" },
                "risks": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "level": { "enum": ["low", "medium", "high"] },
                            "description": { "type": "string" },
                            "mitigation": { "type": "string" }
                        }
                    }
                },
                "recommendations": { "type": "array", "items": { "type": "string" } },
                "confidence": { "type": "integer" }
            }
        }),
    }
}

/// Combine the full history, known customer fields and prior quotes into
/// one reasoning-backend request.
pub fn build_request(context: &QueryContext, profile: &BusinessProfile) -> BackendRequest {
    let mut messages = vec![ChatMessage::system(format!(
        "You are the technical planner for {}. Analyse the reported plumbing job and \
         respond with the `technical_analysis` tool. Labor is billed at {} {} per hour; \
         VAT is {}%.",
        profile.business_name, profile.labor_rate_per_hour, profile.currency, profile.vat_rate_pct
    ))];

    for turn in context.turns() {
        messages.push(match turn.role {
            TurnRole::Customer => ChatMessage::user(turn.content.clone()),
            TurnRole::Assistant => ChatMessage::assistant(turn.content.clone()),
        });
    }

    let mut briefing = format!("Latest message: {}", context.message);
    if let Some(session) = &context.session {
        if let Some(problem) = session.detected_problem {
            briefing.push_str(&format!("\nDetected problem type: {}", problem.as_str()));
        }
        if !session.quoted_amounts.is_empty() {
            let quoted: Vec<String> =
                session.quoted_amounts.iter().map(ToString::to_string).collect();
            briefing.push_str(&format!(
                "\nPreviously quoted amounts ({}): {}",
                profile.currency,
                quoted.join(", ")
            ));
        }
    }
    messages.push(ChatMessage::user(briefing));

    BackendRequest {
        backend: BackendId::Reasoner,
        messages,
        tool: Some(analysis_tool_spec()),
    }
}

#[derive(Debug, Deserialize)]
struct StructuredAnalysisPayload {
    summary: String,
    complexity: Option<String>,
    duration_hours: Option<PayloadDuration>,
    #[serde(default)]
    materials: Vec<PayloadMaterial>,
    labor_hours: Option<Decimal>,
    expertise: Option<String>,
    priority: Option<String>,
    recommended_slot: Option<String>,
    #[serde(default)]
    preparation_steps: Vec<String>,
    follow_up_required: Option<bool>,
    #[serde(default)]
    risks: Vec<PayloadRisk>,
    #[serde(default)]
    recommendations: Vec<String>,
    confidence: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct PayloadDuration {
    min: Decimal,
    max: Decimal,
}

#[derive(Debug, Deserialize)]
struct PayloadMaterial {
    name: String,
    cost: Decimal,
    #[serde(default)]
    essential: bool,
}

#[derive(Debug, Deserialize)]
struct PayloadRisk {
    level: Option<String>,
    description: String,
    mitigation: Option<String>,
}

/// Reduce a completed reasoning-backend stream into a `DetailedAnalysis`.
pub fn reduce_analysis(
    accumulated: &StreamAccumulator,
    context: &QueryContext,
    profile: &BusinessProfile,
) -> Result<DetailedAnalysis, DispatchError> {
    if accumulated.is_empty() {
        return Err(DispatchError::ParseFailure(
            "analysis stream ended without text or structured payload".to_string(),
        ));
    }

    if accumulated.has_tool_payload() {
        match serde_json::from_str::<StructuredAnalysisPayload>(accumulated.tool_arguments()) {
            Ok(payload) => return Ok(normalize_structured(payload, context, profile)),
            Err(error) => {
                tracing::debug!(
                    event_name = "analysis.reduce.parse_failure",
                    error = %error,
                    "structured analysis malformed, falling back to text extraction"
                );
            }
        }
    }

    Ok(text_fallback(accumulated.text(), context, profile))
}

fn normalize_structured(
    payload: StructuredAnalysisPayload,
    context: &QueryContext,
    profile: &BusinessProfile,
) -> DetailedAnalysis {
    let complexity = payload
        .complexity
        .as_deref()
        .and_then(Complexity::parse)
        .unwrap_or(Complexity::Moderate);

    let duration = payload
        .duration_hours
        .map(|range| DurationRange { min_hours: range.min, max_hours: range.max })
        .unwrap_or(DurationRange {
            min_hours: FALLBACK_DURATION_MIN_HOURS,
            max_hours: FALLBACK_DURATION_MAX_HOURS,
        })
        .normalized();

    let materials: Vec<Material> = payload
        .materials
        .into_iter()
        .map(|material| Material {
            name: material.name,
            cost: material.cost.max(Decimal::ZERO),
            essential: material.essential,
        })
        .collect();
    let material_cost: Decimal = materials.iter().map(|material| material.cost).sum();

    let labor_hours = payload
        .labor_hours
        .filter(|hours| *hours > Decimal::ZERO)
        .unwrap_or_else(|| midpoint(duration));

    let expertise = match payload.expertise.as_deref() {
        Some("apprentice") => ExpertiseLevel::Apprentice,
        Some("master") => ExpertiseLevel::Master,
        _ => ExpertiseLevel::Journeyman,
    };

    let priority = payload
        .priority
        .as_deref()
        .and_then(Urgency::parse)
        .unwrap_or_else(|| effective_urgency(context));

    let risks = payload
        .risks
        .into_iter()
        .map(|risk| Risk {
            level: match risk.level.as_deref() {
                Some("high") => RiskLevel::High,
                Some("low") => RiskLevel::Low,
                _ => RiskLevel::Medium,
            },
            description: risk.description,
            mitigation: risk.mitigation.unwrap_or_default(),
        })
        .collect();

    DetailedAnalysis {
        summary: payload.summary,
        technical: TechnicalAssessment { complexity, duration, materials, expertise },
        costs: CostBreakdown::from_parts(
            labor_hours,
            profile.labor_rate_per_hour,
            material_cost,
            profile.vat_rate_pct,
        ),
        scheduling: SchedulingAdvice {
            priority,
            recommended_slot: payload
                .recommended_slot
                .unwrap_or_else(|| default_slot(priority).to_string()),
            preparation_steps: payload.preparation_steps,
            follow_up_required: payload
                .follow_up_required
                .unwrap_or(complexity >= Complexity::Complex),
        },
        risks,
        recommendations: payload.recommendations,
        confidence: payload.confidence.map(|value| value.min(100) as u8).unwrap_or(70),
    }
}

fn text_fallback(text: &str, context: &QueryContext, profile: &BusinessProfile) -> DetailedAnalysis {
    let duration = extract_duration(text).unwrap_or(DurationRange {
        min_hours: FALLBACK_DURATION_MIN_HOURS,
        max_hours: FALLBACK_DURATION_MAX_HOURS,
    });
    let material_cost = extract_currency_figure(text).unwrap_or(Decimal::ZERO);
    let confidence = extract_confidence_pct(text)
        .unwrap_or(FALLBACK_ANALYSIS_CONFIDENCE)
        .min(FALLBACK_CONFIDENCE_CEILING);

    let priority = effective_urgency(context);
    let labor_hours = midpoint(duration);

    let summary = if text.trim().is_empty() {
        format!("Preliminary assessment of: {}", context.message)
    } else {
        text.trim().to_string()
    };

    DetailedAnalysis {
        summary,
        technical: TechnicalAssessment {
            complexity: Complexity::Moderate,
            duration,
            materials: Vec::new(),
            expertise: ExpertiseLevel::Journeyman,
        },
        costs: CostBreakdown::from_parts(
            labor_hours,
            profile.labor_rate_per_hour,
            material_cost,
            profile.vat_rate_pct,
        ),
        scheduling: SchedulingAdvice {
            priority,
            recommended_slot: default_slot(priority).to_string(),
            preparation_steps: Vec::new(),
            follow_up_required: true,
        },
        risks: vec![Risk {
            level: RiskLevel::Medium,
            description: "Scope derived from free text only; on-site findings may differ"
                .to_string(),
            mitigation: "Confirm the scope during an on-site inspection".to_string(),
        }],
        recommendations: vec!["Schedule an on-site inspection to confirm the estimate".to_string()],
        confidence,
    }
}

fn effective_urgency(context: &QueryContext) -> Urgency {
    let classified = classify_urgency(&context.message, context.language);
    context.urgency_hint.map_or(classified, |hint| hint.max(classified))
}

fn midpoint(duration: DurationRange) -> Decimal {
    ((duration.min_hours + duration.max_hours) / Decimal::TWO).round_dp(2)
}

fn default_slot(priority: Urgency) -> &'static str {
    match priority {
        Urgency::Emergency => "today, first available engineer",
        Urgency::High => "within 24 hours",
        Urgency::Normal => "within the next 3 working days",
        Urgency::Low => "next free slot",
    }
}

fn duration_range_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*(?:-|–|to|tot)\s*(\d+(?:[.,]\d+)?)\s*(?:hours?|hrs?|uur|uren)")
            .expect("duration range pattern")
    })
}

fn duration_single_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*(?:hours?|hrs?|uur|uren)")
            .expect("single duration pattern")
    })
}

fn currency_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:€|eur)\s*(\d+(?:[.,]\d{1,2})?)").expect("currency pattern")
    })
}

fn confidence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,3})\s*%").expect("confidence pattern"))
}

fn parse_decimal_token(token: &str) -> Option<Decimal> {
    token.replace(',', ".").parse::<Decimal>().ok()
}

fn extract_duration(text: &str) -> Option<DurationRange> {
    if let Some(captures) = duration_range_regex().captures(text) {
        let min = parse_decimal_token(&captures[1])?;
        let max = parse_decimal_token(&captures[2])?;
        return Some(DurationRange { min_hours: min, max_hours: max }.normalized());
    }

    let captures = duration_single_regex().captures(text)?;
    let hours = parse_decimal_token(&captures[1])?;
    Some(DurationRange { min_hours: hours, max_hours: hours }.normalized())
}

fn extract_currency_figure(text: &str) -> Option<Decimal> {
    let captures = currency_regex().captures(text)?;
    parse_decimal_token(&captures[1]).map(|value| value.max(Decimal::ZERO))
}

fn extract_confidence_pct(text: &str) -> Option<u8> {
    let captures = confidence_regex().captures(text)?;
    captures[1].parse::<u16>().ok().map(|value| value.min(100) as u8)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use vakman_core::config::BusinessProfile;
    use vakman_core::domain::analysis::Complexity;
    use vakman_core::domain::query::{
        ConversationTurn, Language, QueryContext, SessionHints,
    };
    use vakman_core::domain::response::{ServiceCategory, Urgency, FALLBACK_CONFIDENCE_CEILING};
    use vakman_core::registry::BackendId;

    use crate::llm::StreamFragment;
    use crate::reducer::StreamAccumulator;

    use super::{build_request, extract_duration, reduce_analysis};

    fn accumulate(fragments: Vec<StreamFragment>) -> StreamAccumulator {
        let mut accumulator = StreamAccumulator::new();
        for fragment in fragments {
            accumulator.push(fragment);
        }
        accumulator
    }

    #[test]
    fn request_targets_reasoner_and_carries_history_and_quotes() {
        let mut context = QueryContext::new("how long would the full job take?", Language::En);
        context.push_turn(ConversationTurn::customer("my boiler is broken"));
        context.push_turn(ConversationTurn::assistant("Can you describe the noise?"));
        context.session = Some(SessionHints {
            detected_problem: Some(ServiceCategory::BoilerService),
            quoted_amounts: vec![Decimal::new(150, 0)],
        });

        let request = build_request(&context, &BusinessProfile::default());

        assert_eq!(request.backend, BackendId::Reasoner);
        assert!(request.tool.is_some());
        // system + 2 history turns + briefing
        assert_eq!(request.messages.len(), 4);
        let briefing = &request.messages.last().expect("briefing").content;
        assert!(briefing.contains("boiler_service"));
        assert!(briefing.contains("150"));
    }

    #[test]
    fn structured_analysis_recomputes_consistent_totals() {
        let accumulator = accumulate(vec![StreamFragment::ToolCallDelta {
            name: Some("technical_analysis".to_string()),
            arguments: r#"{
                "summary": "Replace the corroded radiator valve",
                "complexity": "moderate",
                "duration_hours": { "min": 2, "max": 4 },
                "materials": [
                    { "name": "radiator valve", "cost": 35.50, "essential": true },
                    { "name": "inhibitor fluid", "cost": 18, "essential": false }
                ],
                "labor_hours": 3,
                "priority": "normal",
                "confidence": 82
            }"#
            .to_string(),
        }]);

        let context = QueryContext::new("radiator valve is leaking", Language::En);
        let profile = BusinessProfile::default();
        let analysis = reduce_analysis(&accumulator, &context, &profile).expect("reduce");

        assert_eq!(analysis.technical.complexity, Complexity::Moderate);
        assert_eq!(analysis.costs.labor_cost, Decimal::new(25500, 2));
        assert_eq!(analysis.costs.material_cost, Decimal::new(5350, 2));
        assert!(analysis.costs.is_consistent());
        assert_eq!(analysis.confidence, 82);
    }

    #[test]
    fn text_fallback_extracts_duration_money_and_confidence() {
        let accumulator = accumulate(vec![StreamFragment::TextDelta(
            "Expect roughly 2 to 4 hours of work, parts around €85,50. \
             I'd put confidence at 80% pending inspection."
                .to_string(),
        )]);

        let context = QueryContext::new("kitchen sink drain keeps blocking", Language::En);
        let profile = BusinessProfile::default();
        let analysis = reduce_analysis(&accumulator, &context, &profile).expect("reduce");

        assert_eq!(analysis.technical.duration.min_hours, Decimal::new(2, 0));
        assert_eq!(analysis.technical.duration.max_hours, Decimal::new(4, 0));
        assert_eq!(analysis.costs.material_cost, Decimal::new(8550, 2));
        // 80% stated, but fallback confidence is capped.
        assert_eq!(analysis.confidence, FALLBACK_CONFIDENCE_CEILING);
        assert!(analysis.costs.is_consistent());
    }

    #[test]
    fn empty_text_falls_back_to_conservative_defaults() {
        let accumulator =
            accumulate(vec![StreamFragment::TextDelta("   ".to_string())]);
        let context = QueryContext::new("vague problem", Language::En);
        let profile = BusinessProfile::default();

        // Whitespace-only text is still an empty stream for reduction.
        assert!(reduce_analysis(&accumulator, &context, &profile).is_err());

        let accumulator = accumulate(vec![StreamFragment::TextDelta(
            "Hard to say without seeing it.".to_string(),
        )]);
        let analysis = reduce_analysis(&accumulator, &context, &profile).expect("reduce");

        assert_eq!(analysis.technical.duration.min_hours, Decimal::ONE);
        assert_eq!(analysis.technical.duration.max_hours, Decimal::new(3, 0));
        assert_eq!(analysis.technical.complexity, Complexity::Moderate);
        assert!(analysis.costs.is_consistent());
        assert!(!analysis.risks.is_empty());
    }

    #[test]
    fn malformed_analysis_payload_recovers_through_text() {
        let accumulator = accumulate(vec![
            StreamFragment::TextDelta("About 1,5 uur werk.".to_string()),
            StreamFragment::ToolCallDelta {
                name: Some("technical_analysis".to_string()),
                arguments: "{\"summary\": ".to_string(),
            },
        ]);

        let context = QueryContext::new("kraan vervangen", Language::Nl);
        let analysis =
            reduce_analysis(&accumulator, &context, &BusinessProfile::default()).expect("reduce");

        assert_eq!(analysis.technical.duration.min_hours, Decimal::new(15, 1));
        assert!(analysis.confidence <= FALLBACK_CONFIDENCE_CEILING);
    }

    #[test]
    fn dutch_duration_ranges_parse() {
        let duration = extract_duration("ongeveer 2 tot 3 uur").expect("duration");
        assert_eq!(duration.min_hours, Decimal::new(2, 0));
        assert_eq!(duration.max_hours, Decimal::new(3, 0));
    }

    #[test]
    fn emergency_context_gets_same_day_slot() {
        let accumulator = accumulate(vec![StreamFragment::TextDelta(
            "Burst supply line, must be clamped immediately.".to_string(),
        )]);
        let mut context = QueryContext::new("burst pipe flooding the hallway", Language::En);
        context.urgency_hint = Some(Urgency::Emergency);

        let analysis =
            reduce_analysis(&accumulator, &context, &BusinessProfile::default()).expect("reduce");
        assert_eq!(analysis.scheduling.priority, Urgency::Emergency);
        assert!(analysis.scheduling.recommended_slot.contains("today"));
    }
}
