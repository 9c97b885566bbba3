//! Deterministic, language-keyed keyword classification.
//!
//! Used as the fallback extraction path when a backend emits no valid
//! structured payload, and as a cross-check on model-supplied urgency.
//! Matching is case-insensitive substring search over the lowercased
//! input, so it does not depend on word order.

use std::collections::BTreeSet;

use crate::domain::query::Language;
use crate::domain::response::{ServiceCategory, Urgency};

const EMERGENCY_EN: &[&str] = &[
    "flooding",
    "flooded",
    "burst pipe",
    "pipe burst",
    "gas leak",
    "smell gas",
    "water everywhere",
    "sewage backup",
];
const EMERGENCY_NL: &[&str] = &[
    "overstroming",
    "ondergelopen",
    "water stroomt",
    "gesprongen leiding",
    "leiding gesprongen",
    "gaslek",
    "gas ruik",
    "water overal",
    "riool komt omhoog",
];

const HIGH_EN: &[&str] = &[
    "leaking",
    "active leak",
    "no heat",
    "no hot water",
    "heating broken",
    "drain overflowing",
    "blocked drain overflow",
    "urgent",
];
const HIGH_NL: &[&str] = &[
    "lekt",
    "lekkage",
    "geen verwarming",
    "geen warm water",
    "verwarming kapot",
    "afvoer loopt over",
    "spoed",
    "dringend",
];

const NORMAL_EN: &[&str] =
    &["repair", "fix", "install", "replace", "replacement", "service", "maintenance", "broken"];
const NORMAL_NL: &[&str] =
    &["repareren", "maken", "installeren", "vervangen", "vervanging", "onderhoud", "kapot"];

struct CategoryKeywords {
    category: ServiceCategory,
    en: &'static [&'static str],
    nl: &'static [&'static str],
}

const CATEGORY_TABLE: &[CategoryKeywords] = &[
    CategoryKeywords {
        category: ServiceCategory::LeakRepair,
        en: &["leak", "dripping", "burst pipe", "flooding", "water everywhere"],
        nl: &["lek", "druppelt", "gesprongen leiding", "overstroming", "water stroomt", "water overal"],
    },
    CategoryKeywords {
        category: ServiceCategory::TapReplacement,
        en: &["tap", "faucet", "mixer"],
        nl: &["kraan", "mengkraan"],
    },
    CategoryKeywords {
        category: ServiceCategory::DrainUnclog,
        en: &["drain", "clog", "blocked", "unclog"],
        nl: &["afvoer", "verstopt", "verstopping", "ontstoppen"],
    },
    CategoryKeywords {
        category: ServiceCategory::ToiletInstall,
        en: &["toilet", "wc"],
        nl: &["toilet", "wc"],
    },
    CategoryKeywords {
        category: ServiceCategory::BoilerService,
        en: &["boiler", "central heating", "no heat", "no hot water"],
        nl: &["cv-ketel", "ketel", "verwarming", "warm water"],
    },
    CategoryKeywords {
        category: ServiceCategory::KitchenPlumbing,
        en: &["kitchen", "dishwasher", "sink"],
        nl: &["keuken", "vaatwasser", "gootsteen"],
    },
    CategoryKeywords {
        category: ServiceCategory::RadiatorInstall,
        en: &["radiator"],
        nl: &["radiator"],
    },
    CategoryKeywords {
        category: ServiceCategory::ShowerInstall,
        en: &["shower", "bathtub", "bath"],
        nl: &["douche", "bad", "ligbad"],
    },
];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Classify urgency by keyword precedence: emergency beats high beats
/// normal; `Low` is the default when nothing matches.
pub fn classify_urgency(text: &str, language: Language) -> Urgency {
    let normalized = text.to_lowercase();
    let (emergency, high, normal) = match language {
        Language::En => (EMERGENCY_EN, HIGH_EN, NORMAL_EN),
        Language::Nl => (EMERGENCY_NL, HIGH_NL, NORMAL_NL),
    };

    if contains_any(&normalized, emergency) {
        Urgency::Emergency
    } else if contains_any(&normalized, high) {
        Urgency::High
    } else if contains_any(&normalized, normal) {
        Urgency::Normal
    } else {
        Urgency::Low
    }
}

/// Detect service categories independently of urgency. Returns the default
/// hourly-rate category when nothing in the fixed vocabulary matches.
pub fn detect_categories(text: &str, language: Language) -> Vec<ServiceCategory> {
    let normalized = text.to_lowercase();
    let mut matched = BTreeSet::new();

    for entry in CATEGORY_TABLE {
        let keywords = match language {
            Language::En => entry.en,
            Language::Nl => entry.nl,
        };
        if contains_any(&normalized, keywords) {
            matched.insert(entry.category);
        }
    }

    if matched.is_empty() {
        return vec![ServiceCategory::HourlyRate];
    }
    matched.into_iter().collect()
}
