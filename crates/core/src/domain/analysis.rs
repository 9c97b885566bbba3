use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
    Specialist,
}

impl Complexity {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "simple" => Some(Self::Simple),
            "moderate" => Some(Self::Moderate),
            "complex" => Some(Self::Complex),
            "specialist" => Some(Self::Specialist),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpertiseLevel {
    Apprentice,
    Journeyman,
    Master,
}

/// Duration range in whole or fractional hours.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DurationRange {
    pub min_hours: Decimal,
    pub max_hours: Decimal,
}

impl DurationRange {
    pub fn normalized(mut self) -> Self {
        if self.min_hours > self.max_hours {
            std::mem::swap(&mut self.min_hours, &mut self.max_hours);
        }
        self.min_hours = self.min_hours.max(Decimal::ZERO);
        self.max_hours = self.max_hours.max(Decimal::ZERO);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub cost: Decimal,
    pub essential: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TechnicalAssessment {
    pub complexity: Complexity,
    pub duration: DurationRange,
    pub materials: Vec<Material>,
    pub expertise: ExpertiseLevel,
}

/// Labor/material/VAT split. `total` is always recomputed from the parts
/// during normalization, so `subtotal + vat_amount == total` holds to the
/// cent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub labor_hours: Decimal,
    pub hourly_rate: Decimal,
    pub labor_cost: Decimal,
    pub material_cost: Decimal,
    pub subtotal: Decimal,
    pub vat_rate_pct: Decimal,
    pub vat_amount: Decimal,
    pub total: Decimal,
}

impl CostBreakdown {
    pub fn from_parts(
        labor_hours: Decimal,
        hourly_rate: Decimal,
        material_cost: Decimal,
        vat_rate_pct: Decimal,
    ) -> Self {
        let labor_cost = (labor_hours * hourly_rate).round_dp(2);
        let subtotal = labor_cost + material_cost;
        let vat_amount = (subtotal * vat_rate_pct / Decimal::new(100, 0)).round_dp(2);
        Self {
            labor_hours,
            hourly_rate,
            labor_cost,
            material_cost,
            subtotal,
            vat_rate_pct,
            vat_amount,
            total: subtotal + vat_amount,
        }
    }

    pub fn is_consistent(&self) -> bool {
        let tolerance = Decimal::new(1, 2);
        (self.subtotal + self.vat_amount - self.total).abs() <= tolerance
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchedulingAdvice {
    pub priority: super::response::Urgency,
    pub recommended_slot: String,
    pub preparation_steps: Vec<String>,
    pub follow_up_required: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    pub level: RiskLevel,
    pub description: String,
    pub mitigation: String,
}

/// Output of the deep-analysis path: a full technical and cost breakdown
/// from the reasoning backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetailedAnalysis {
    pub summary: String,
    pub technical: TechnicalAssessment,
    pub costs: CostBreakdown,
    pub scheduling: SchedulingAdvice,
    pub risks: Vec<Risk>,
    pub recommendations: Vec<String>,
    pub confidence: u8,
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{CostBreakdown, DurationRange};

    #[test]
    fn cost_breakdown_parts_add_up() {
        let breakdown = CostBreakdown::from_parts(
            Decimal::new(25, 1),  // 2.5 hours
            Decimal::new(85, 0),  // 85/hour
            Decimal::new(4350, 2), // 43.50 materials
            Decimal::new(21, 0),  // 21% VAT
        );

        assert_eq!(breakdown.labor_cost, Decimal::new(21250, 2));
        assert_eq!(breakdown.subtotal, Decimal::new(25600, 2));
        assert_eq!(breakdown.vat_amount, Decimal::new(5376, 2));
        assert_eq!(breakdown.total, Decimal::new(30976, 2));
        assert!(breakdown.is_consistent());
    }

    #[test]
    fn duration_range_normalization_orders_bounds() {
        let range = DurationRange {
            min_hours: Decimal::new(4, 0),
            max_hours: Decimal::new(1, 0),
        }
        .normalized();

        assert!(range.min_hours <= range.max_hours);
        assert_eq!(range.max_hours, Decimal::new(4, 0));
    }
}
