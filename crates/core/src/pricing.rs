use rust_decimal::Decimal;

use crate::config::BusinessProfile;
use crate::domain::response::{CostRange, ServiceCategory, Urgency};

struct PriceEntry {
    min: Decimal,
    max: Decimal,
    description: &'static str,
}

/// Fixed price table keyed by service category, with an urgency multiplier
/// from the business profile applied on top.
#[derive(Clone, Debug, Default)]
pub struct PriceBook;

impl PriceBook {
    fn entry(category: ServiceCategory) -> PriceEntry {
        let (min, max, description) = match category {
            ServiceCategory::LeakRepair => (150, 400, "Leak localisation and repair"),
            ServiceCategory::TapReplacement => (120, 250, "Tap replacement including standard parts"),
            ServiceCategory::DrainUnclog => (100, 300, "Drain unclogging"),
            ServiceCategory::ToiletInstall => (200, 450, "Toilet installation"),
            ServiceCategory::BoilerService => (90, 180, "Boiler service and inspection"),
            ServiceCategory::KitchenPlumbing => (180, 500, "Kitchen plumbing work"),
            ServiceCategory::RadiatorInstall => (250, 600, "Radiator installation"),
            ServiceCategory::ShowerInstall => (300, 700, "Shower installation"),
            ServiceCategory::HourlyRate => (75, 95, "Standard hourly rate"),
        };
        PriceEntry { min: Decimal::new(min, 0), max: Decimal::new(max, 0), description }
    }

    /// Estimate a cost range for the first matched category (or the hourly
    /// rate default), scaled by urgency and rounded to whole currency units.
    ///
    /// Output bounds are always non-negative with `min <= max`.
    pub fn estimate(
        &self,
        categories: &[ServiceCategory],
        urgency: Urgency,
        profile: &BusinessProfile,
    ) -> CostRange {
        let entry =
            Self::entry(categories.first().copied().unwrap_or(ServiceCategory::HourlyRate));

        let multiplier = match urgency {
            Urgency::Emergency => profile.emergency_multiplier,
            Urgency::High => profile.high_urgency_multiplier,
            Urgency::Normal | Urgency::Low => Decimal::ONE,
        };

        let description = if multiplier > Decimal::ONE {
            format!("{} ({} call-out)", entry.description, urgency.as_str())
        } else {
            entry.description.to_string()
        };

        CostRange {
            min: (entry.min * multiplier).round_dp(0),
            max: (entry.max * multiplier).round_dp(0),
            currency: profile.currency.clone(),
            description,
        }
        .normalized()
    }
}
