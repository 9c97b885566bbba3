use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Confidence ceiling applied whenever a response was assembled by
/// heuristic fallback extraction instead of a validated structured payload.
pub const FALLBACK_CONFIDENCE_CEILING: u8 = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Normal,
    High,
    Emergency,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Emergency => "emergency",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" | "urgent" => Some(Self::High),
            "emergency" => Some(Self::Emergency),
            _ => None,
        }
    }
}

/// Fixed service vocabulary. `HourlyRate` is the catch-all used when no
/// concrete category matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCategory {
    LeakRepair,
    TapReplacement,
    DrainUnclog,
    ToiletInstall,
    BoilerService,
    KitchenPlumbing,
    RadiatorInstall,
    ShowerInstall,
    HourlyRate,
}

impl ServiceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeakRepair => "leak_repair",
            Self::TapReplacement => "tap_replacement",
            Self::DrainUnclog => "drain_unclog",
            Self::ToiletInstall => "toilet_install",
            Self::BoilerService => "boiler_service",
            Self::KitchenPlumbing => "kitchen_plumbing",
            Self::RadiatorInstall => "radiator_install",
            Self::ShowerInstall => "shower_install",
            Self::HourlyRate => "hourly_rate",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "leak_repair" | "leak repair" => Some(Self::LeakRepair),
            "tap_replacement" | "tap replacement" => Some(Self::TapReplacement),
            "drain_unclog" | "drain unclog" => Some(Self::DrainUnclog),
            "toilet_install" | "toilet install" => Some(Self::ToiletInstall),
            "boiler_service" | "boiler service" => Some(Self::BoilerService),
            "kitchen_plumbing" | "kitchen plumbing" => Some(Self::KitchenPlumbing),
            "radiator_install" | "radiator install" => Some(Self::RadiatorInstall),
            "shower_install" | "shower install" => Some(Self::ShowerInstall),
            "hourly_rate" | "hourly rate" => Some(Self::HourlyRate),
            _ => None,
        }
    }

    pub fn all() -> [Self; 9] {
        [
            Self::LeakRepair,
            Self::TapReplacement,
            Self::DrainUnclog,
            Self::ToiletInstall,
            Self::BoilerService,
            Self::KitchenPlumbing,
            Self::RadiatorInstall,
            Self::ShowerInstall,
            Self::HourlyRate,
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostRange {
    pub min: Decimal,
    pub max: Decimal,
    pub currency: String,
    pub description: String,
}

impl CostRange {
    /// Order the bounds and floor negatives at zero so `min <= max >= 0`
    /// always holds, whatever the payload claimed.
    pub fn normalized(mut self) -> Self {
        if self.min > self.max {
            std::mem::swap(&mut self.min, &mut self.max);
        }
        self.min = self.min.max(Decimal::ZERO);
        self.max = self.max.max(Decimal::ZERO);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub customer_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub problem_type: Option<String>,
}

impl ExtractedFields {
    pub fn is_empty(&self) -> bool {
        self.customer_name.is_none()
            && self.phone.is_none()
            && self.address.is_none()
            && self.problem_type.is_none()
    }
}

/// Reduced, validated output of a single chat turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
    pub urgency: Urgency,
    pub categories: Vec<ServiceCategory>,
    pub cost_estimate: Option<CostRange>,
    pub extracted: Option<ExtractedFields>,
    pub should_request_booking: bool,
    pub confidence: u8,
    pub next_steps: Vec<String>,
    pub fallback: bool,
}

impl ChatResponse {
    /// Clamp confidence into 0..=100 and, for fallback responses, below the
    /// heuristic ceiling. Cost bounds are normalized as well.
    pub fn normalized(mut self) -> Self {
        let ceiling = if self.fallback { FALLBACK_CONFIDENCE_CEILING } else { 100 };
        self.confidence = self.confidence.min(ceiling);
        self.cost_estimate = self.cost_estimate.map(CostRange::normalized);
        self
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{
        ChatResponse, CostRange, ServiceCategory, Urgency, FALLBACK_CONFIDENCE_CEILING,
    };

    #[test]
    fn urgency_levels_are_ordered() {
        assert!(Urgency::Low < Urgency::Normal);
        assert!(Urgency::Normal < Urgency::High);
        assert!(Urgency::High < Urgency::Emergency);
    }

    #[test]
    fn urgent_parses_as_high() {
        assert_eq!(Urgency::parse("Urgent"), Some(Urgency::High));
        assert_eq!(Urgency::parse("EMERGENCY"), Some(Urgency::Emergency));
        assert_eq!(Urgency::parse("whenever"), None);
    }

    #[test]
    fn category_parse_accepts_both_spellings() {
        assert_eq!(ServiceCategory::parse("tap_replacement"), Some(ServiceCategory::TapReplacement));
        assert_eq!(ServiceCategory::parse("Tap Replacement"), Some(ServiceCategory::TapReplacement));
        assert_eq!(ServiceCategory::parse("roofing"), None);
    }

    #[test]
    fn cost_range_normalization_orders_bounds() {
        let range = CostRange {
            min: Decimal::new(400, 0),
            max: Decimal::new(150, 0),
            currency: "EUR".to_string(),
            description: "reversed".to_string(),
        }
        .normalized();

        assert_eq!(range.min, Decimal::new(150, 0));
        assert_eq!(range.max, Decimal::new(400, 0));
    }

    #[test]
    fn fallback_confidence_is_capped() {
        let response = ChatResponse {
            text: "heuristic".to_string(),
            urgency: Urgency::Normal,
            categories: vec![ServiceCategory::HourlyRate],
            cost_estimate: None,
            extracted: None,
            should_request_booking: false,
            confidence: 95,
            next_steps: Vec::new(),
            fallback: true,
        }
        .normalized();

        assert_eq!(response.confidence, FALLBACK_CONFIDENCE_CEILING);
    }
}
