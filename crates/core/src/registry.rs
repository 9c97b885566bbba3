use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DispatchError;

/// The two language-model backends available for a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendId {
    /// Fast, customer-facing backend; answers most turns.
    Frontline,
    /// Slower backend with extended reasoning; handles deep analysis and
    /// long or complex contexts.
    Reasoner,
}

impl BackendId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Frontline => "frontline",
            Self::Reasoner => "reasoner",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    CustomerFacing,
    Speed,
    CostEfficient,
    DeepReasoning,
    Planning,
    Vision,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedClass {
    Fast,
    Medium,
    Slow,
}

/// Static description of one backend. Loaded once at process start and
/// never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    pub id: BackendId,
    pub strengths: BTreeSet<Strength>,
    pub context_window_tokens: u32,
    pub input_cost_per_mtok: Decimal,
    pub output_cost_per_mtok: Decimal,
    pub supports_streaming: bool,
    pub supports_images: bool,
    pub supports_extended_reasoning: bool,
    pub speed: SpeedClass,
}

impl ModelCapabilities {
    pub fn has_strength(&self, strength: Strength) -> bool {
        self.strengths.contains(&strength)
    }
}

/// Immutable, process-wide capability table. Safe to share across
/// concurrent turns behind an `Arc` without locking.
#[derive(Clone, Debug)]
pub struct CapabilityRegistry {
    entries: Vec<ModelCapabilities>,
}

impl CapabilityRegistry {
    pub fn new(entries: Vec<ModelCapabilities>) -> Self {
        Self { entries }
    }

    pub fn capabilities(&self, id: BackendId) -> Result<&ModelCapabilities, DispatchError> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .ok_or(DispatchError::UnknownBackend(id))
    }

    pub fn all(&self) -> &[ModelCapabilities] {
        &self.entries
    }

    /// The fixed two-backend table used in production. Cost figures are
    /// per million tokens in the profile currency.
    pub fn standard() -> Self {
        Self::new(vec![
            ModelCapabilities {
                id: BackendId::Frontline,
                strengths: BTreeSet::from([
                    Strength::CustomerFacing,
                    Strength::Speed,
                    Strength::CostEfficient,
                    Strength::Vision,
                ]),
                context_window_tokens: 128_000,
                input_cost_per_mtok: Decimal::new(250, 2),
                output_cost_per_mtok: Decimal::new(1000, 2),
                supports_streaming: true,
                supports_images: true,
                supports_extended_reasoning: false,
                speed: SpeedClass::Fast,
            },
            ModelCapabilities {
                id: BackendId::Reasoner,
                strengths: BTreeSet::from([Strength::DeepReasoning, Strength::Planning]),
                context_window_tokens: 200_000,
                input_cost_per_mtok: Decimal::new(1500, 2),
                output_cost_per_mtok: Decimal::new(6000, 2),
                supports_streaming: true,
                supports_images: false,
                supports_extended_reasoning: true,
                speed: SpeedClass::Slow,
            },
        ])
    }
}
