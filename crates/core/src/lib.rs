pub mod classify;
pub mod config;
pub mod domain;
pub mod errors;
pub mod pricing;
pub mod registry;
pub mod routing;

pub use classify::{classify_urgency, detect_categories};
pub use config::{
    BusinessProfile, ConfigError, ConfigOverrides, LoadOptions, OrchestratorConfig, RetryConfig,
};
pub use domain::analysis::{
    Complexity, CostBreakdown, DetailedAnalysis, DurationRange, ExpertiseLevel, Material, Risk,
    RiskLevel, SchedulingAdvice, TechnicalAssessment,
};
pub use domain::query::{
    ConversationPhase, ConversationTurn, Language, QueryContext, SessionHints, TurnRole,
};
pub use domain::response::{
    ChatResponse, CostRange, ExtractedFields, ServiceCategory, Urgency,
    FALLBACK_CONFIDENCE_CEILING,
};
pub use errors::DispatchError;
pub use pricing::PriceBook;
pub use registry::{BackendId, CapabilityRegistry, ModelCapabilities, SpeedClass, Strength};
pub use routing::{estimate_tokens, BackendScore, Router, RoutingDecision, ScoringWeights};
