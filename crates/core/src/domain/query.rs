use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::response::{ServiceCategory, Urgency};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    En,
    Nl,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    Customer,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn customer(content: impl Into<String>) -> Self {
        Self { role: TurnRole::Customer, content: content.into(), timestamp: Utc::now() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: TurnRole::Assistant, content: content.into(), timestamp: Utc::now() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    Initial,
    ProblemIdentified,
    Quoted,
    Booking,
}

/// Session-derived hints carried over from earlier turns of the same
/// conversation by the calling collaborator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionHints {
    pub detected_problem: Option<ServiceCategory>,
    pub quoted_amounts: Vec<Decimal>,
}

/// Per-turn input to the orchestrator.
///
/// Conversation history is append-only: turns can be pushed but never
/// removed or reordered, so `message_count` always equals the number of
/// turns recorded so far.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryContext {
    pub message: String,
    turns: Vec<ConversationTurn>,
    pub urgency_hint: Option<Urgency>,
    pub language: Language,
    pub has_images: bool,
    pub needs_planning: bool,
    pub needs_extended_reasoning: bool,
    pub phase: ConversationPhase,
    pub session: Option<SessionHints>,
}

impl QueryContext {
    pub fn new(message: impl Into<String>, language: Language) -> Self {
        Self {
            message: message.into(),
            turns: Vec::new(),
            urgency_hint: None,
            language,
            has_images: false,
            needs_planning: false,
            needs_extended_reasoning: false,
            phase: ConversationPhase::Initial,
            session: None,
        }
    }

    pub fn push_turn(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn message_count(&self) -> usize {
        self.turns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::{ConversationTurn, Language, QueryContext, TurnRole};

    #[test]
    fn message_count_tracks_appended_turns() {
        let mut context = QueryContext::new("kraan lekt", Language::Nl);
        assert_eq!(context.message_count(), 0);

        context.push_turn(ConversationTurn::customer("kraan lekt"));
        context.push_turn(ConversationTurn::assistant("Kunt u een foto sturen?"));
        context.push_turn(ConversationTurn::customer("ja, moment"));

        assert_eq!(context.message_count(), 3);
        assert_eq!(context.turns().len(), context.message_count());
    }

    #[test]
    fn turn_ordering_is_preserved() {
        let mut context = QueryContext::new("hello", Language::En);
        for index in 0..5 {
            context.push_turn(ConversationTurn::customer(format!("message {index}")));
        }

        let contents: Vec<&str> =
            context.turns().iter().map(|turn| turn.content.as_str()).collect();
        assert_eq!(contents, vec!["message 0", "message 1", "message 2", "message 3", "message 4"]);
        assert!(context.turns().iter().all(|turn| turn.role == TurnRole::Customer));
    }
}
