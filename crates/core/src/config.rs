use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

/// Caller-supplied configuration injected into the orchestrator at
/// construction time. There is no implicit default profile at runtime;
/// `Default` exists for layering and tests.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub profile: BusinessProfile,
    pub retry: RetryConfig,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BusinessProfile {
    pub business_name: String,
    pub currency: String,
    pub labor_rate_per_hour: Decimal,
    pub vat_rate_pct: Decimal,
    pub emergency_multiplier: Decimal,
    pub high_urgency_multiplier: Decimal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub attempt_timeout_secs: u64,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub business_name: Option<String>,
    pub currency: Option<String>,
    pub labor_rate_per_hour: Option<Decimal>,
    pub emergency_multiplier: Option<Decimal>,
    pub max_attempts: Option<u32>,
    pub attempt_timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for BusinessProfile {
    fn default() -> Self {
        Self {
            business_name: "Vakman Service".to_string(),
            currency: "EUR".to_string(),
            labor_rate_per_hour: Decimal::new(85, 0),
            vat_rate_pct: Decimal::new(21, 0),
            emergency_multiplier: Decimal::new(15, 1),
            high_urgency_multiplier: Decimal::new(125, 2),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, base_backoff_ms: 250, attempt_timeout_secs: 30 }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { profile: BusinessProfile::default(), retry: RetryConfig::default() }
    }
}

impl OrchestratorConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("vakman.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(profile) = patch.profile {
            if let Some(business_name) = profile.business_name {
                self.profile.business_name = business_name;
            }
            if let Some(currency) = profile.currency {
                self.profile.currency = currency;
            }
            if let Some(labor_rate_per_hour) = profile.labor_rate_per_hour {
                self.profile.labor_rate_per_hour = labor_rate_per_hour;
            }
            if let Some(vat_rate_pct) = profile.vat_rate_pct {
                self.profile.vat_rate_pct = vat_rate_pct;
            }
            if let Some(emergency_multiplier) = profile.emergency_multiplier {
                self.profile.emergency_multiplier = emergency_multiplier;
            }
            if let Some(high_urgency_multiplier) = profile.high_urgency_multiplier {
                self.profile.high_urgency_multiplier = high_urgency_multiplier;
            }
        }

        if let Some(retry) = patch.retry {
            if let Some(max_attempts) = retry.max_attempts {
                self.retry.max_attempts = max_attempts;
            }
            if let Some(base_backoff_ms) = retry.base_backoff_ms {
                self.retry.base_backoff_ms = base_backoff_ms;
            }
            if let Some(attempt_timeout_secs) = retry.attempt_timeout_secs {
                self.retry.attempt_timeout_secs = attempt_timeout_secs;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("VAKMAN_BUSINESS_NAME") {
            self.profile.business_name = value;
        }
        if let Some(value) = read_env("VAKMAN_CURRENCY") {
            self.profile.currency = value;
        }
        if let Some(value) = read_env("VAKMAN_LABOR_RATE_PER_HOUR") {
            self.profile.labor_rate_per_hour = parse_decimal("VAKMAN_LABOR_RATE_PER_HOUR", &value)?;
        }
        if let Some(value) = read_env("VAKMAN_VAT_RATE_PCT") {
            self.profile.vat_rate_pct = parse_decimal("VAKMAN_VAT_RATE_PCT", &value)?;
        }
        if let Some(value) = read_env("VAKMAN_EMERGENCY_MULTIPLIER") {
            self.profile.emergency_multiplier =
                parse_decimal("VAKMAN_EMERGENCY_MULTIPLIER", &value)?;
        }
        if let Some(value) = read_env("VAKMAN_HIGH_URGENCY_MULTIPLIER") {
            self.profile.high_urgency_multiplier =
                parse_decimal("VAKMAN_HIGH_URGENCY_MULTIPLIER", &value)?;
        }
        if let Some(value) = read_env("VAKMAN_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_u32("VAKMAN_RETRY_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("VAKMAN_RETRY_BASE_BACKOFF_MS") {
            self.retry.base_backoff_ms = parse_u64("VAKMAN_RETRY_BASE_BACKOFF_MS", &value)?;
        }
        if let Some(value) = read_env("VAKMAN_RETRY_ATTEMPT_TIMEOUT_SECS") {
            self.retry.attempt_timeout_secs =
                parse_u64("VAKMAN_RETRY_ATTEMPT_TIMEOUT_SECS", &value)?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(business_name) = overrides.business_name {
            self.profile.business_name = business_name;
        }
        if let Some(currency) = overrides.currency {
            self.profile.currency = currency;
        }
        if let Some(labor_rate_per_hour) = overrides.labor_rate_per_hour {
            self.profile.labor_rate_per_hour = labor_rate_per_hour;
        }
        if let Some(emergency_multiplier) = overrides.emergency_multiplier {
            self.profile.emergency_multiplier = emergency_multiplier;
        }
        if let Some(max_attempts) = overrides.max_attempts {
            self.retry.max_attempts = max_attempts;
        }
        if let Some(attempt_timeout_secs) = overrides.attempt_timeout_secs {
            self.retry.attempt_timeout_secs = attempt_timeout_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_profile(&self.profile)?;
        validate_retry(&self.retry)?;
        Ok(())
    }
}

fn validate_profile(profile: &BusinessProfile) -> Result<(), ConfigError> {
    if profile.business_name.trim().is_empty() {
        return Err(ConfigError::Validation("profile.business_name must not be empty".to_string()));
    }
    if profile.currency.trim().len() != 3 {
        return Err(ConfigError::Validation(
            "profile.currency must be a three-letter code (e.g. EUR)".to_string(),
        ));
    }
    if profile.labor_rate_per_hour <= Decimal::ZERO {
        return Err(ConfigError::Validation(
            "profile.labor_rate_per_hour must be positive".to_string(),
        ));
    }
    if profile.vat_rate_pct < Decimal::ZERO || profile.vat_rate_pct > Decimal::new(50, 0) {
        return Err(ConfigError::Validation(
            "profile.vat_rate_pct must be in range 0..=50".to_string(),
        ));
    }
    if profile.high_urgency_multiplier < Decimal::ONE {
        return Err(ConfigError::Validation(
            "profile.high_urgency_multiplier must be at least 1".to_string(),
        ));
    }
    if profile.emergency_multiplier < profile.high_urgency_multiplier {
        return Err(ConfigError::Validation(
            "profile.emergency_multiplier must not be below high_urgency_multiplier".to_string(),
        ));
    }
    Ok(())
}

fn validate_retry(retry: &RetryConfig) -> Result<(), ConfigError> {
    if retry.max_attempts == 0 || retry.max_attempts > 10 {
        return Err(ConfigError::Validation(
            "retry.max_attempts must be in range 1..=10".to_string(),
        ));
    }
    if retry.attempt_timeout_secs == 0 || retry.attempt_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "retry.attempt_timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    Ok(())
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("vakman.toml"), PathBuf::from("config/vakman.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    value.parse::<Decimal>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    profile: Option<ProfilePatch>,
    retry: Option<RetryPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ProfilePatch {
    business_name: Option<String>,
    currency: Option<String>,
    labor_rate_per_hour: Option<Decimal>,
    vat_rate_pct: Option<Decimal>,
    emergency_multiplier: Option<Decimal>,
    high_urgency_multiplier: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct RetryPatch {
    max_attempts: Option<u32>,
    base_backoff_ms: Option<u64>,
    attempt_timeout_secs: Option<u64>,
}
