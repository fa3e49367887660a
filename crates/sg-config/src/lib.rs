//! Configuration loading, validation, and merging for the scraping control
//! plane engine.
//!
//! This crate provides [`EngineConfig`] — the engine's runtime knobs — plus
//! helpers for loading from TOML, applying environment overrides, and
//! producing advisory [`ConfigWarning`]s.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A back-off cap smaller than its base, which would defeat exponential
    /// growth entirely.
    BackoffCapBelowBase {
        /// Configured base, seconds.
        base_s: u64,
        /// Configured cap, seconds.
        cap_s: u64,
    },
    /// A timeout value unusually large for its kind.
    LargeTimeout {
        /// Which timeout field.
        field: String,
        /// Value in the field's native unit.
        value: u64,
    },
    /// `provider_credits_cap_per_run` is unset, meaning provider escalation
    /// is effectively uncapped per run.
    NoProviderCreditCap,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BackoffCapBelowBase { base_s, cap_s } => write!(
                f,
                "back_off_cap_s ({cap_s}) is below back_off_base_s ({base_s}); backoff will not grow"
            ),
            Self::LargeTimeout { field, value } => {
                write!(f, "'{field}' is unusually large ({value})")
            }
            Self::NoProviderCreditCap => {
                write!(f, "provider_credits_cap_per_run is unset; provider escalation is uncapped")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Top-level runtime configuration for the execution engine.
///
/// Fields mirror the "Configuration" table in the engine's external
/// interfaces: attempt/timeout budgets, session retirement thresholds, and
/// back-off parameters.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum attempts per run, across all tiers.
    pub default_max_attempts: u32,
    /// HTTP executor wall-clock timeout, seconds.
    pub http_timeout_s: u64,
    /// Browser executor navigation timeout, milliseconds.
    pub browser_nav_timeout_ms: u64,
    /// Provider executor wall-clock timeout, seconds.
    pub provider_timeout_s: u64,
    /// Cumulative provider credit cap per run. `None` = uncapped.
    pub provider_credits_cap_per_run: Option<u32>,
    /// Session retirement age, minutes.
    pub session_max_age_min: u64,
    /// Session retirement use count.
    pub session_max_uses: u32,
    /// Session retirement consecutive-failure count.
    pub session_max_failure_streak: u32,
    /// Exponential back-off base, seconds.
    pub back_off_base_s: u64,
    /// Exponential back-off cap, seconds.
    pub back_off_cap_s: u64,
    /// Log level override (e.g. `"debug"`, `"info"`, `"warn"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: 3,
            http_timeout_s: 20,
            browser_nav_timeout_ms: 30_000,
            provider_timeout_s: 60,
            provider_credits_cap_per_run: None,
            session_max_age_min: 120,
            session_max_uses: 100,
            session_max_failure_streak: 3,
            back_off_base_s: 10,
            back_off_cap_s: 300,
            log_level: Some("info".into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const LARGE_TIMEOUT_THRESHOLD_S: u64 = 300;
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load an [`EngineConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, returns [`EngineConfig::default()`].
///
/// Environment variable overrides are applied on top in both cases.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => EngineConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a TOML string into an [`EngineConfig`].
pub fn parse_toml(content: &str) -> Result<EngineConfig, ConfigError> {
    toml::from_str::<EngineConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

/// Apply environment variable overrides.
///
/// Recognised variables: `SG_DEFAULT_MAX_ATTEMPTS`, `SG_HTTP_TIMEOUT_S`,
/// `SG_BROWSER_NAV_TIMEOUT_MS`, `SG_PROVIDER_CREDITS_CAP_PER_RUN`,
/// `SG_LOG_LEVEL`.
pub fn apply_env_overrides(config: &mut EngineConfig) {
    if let Ok(val) = std::env::var("SG_DEFAULT_MAX_ATTEMPTS")
        && let Ok(n) = val.parse()
    {
        config.default_max_attempts = n;
    }
    if let Ok(val) = std::env::var("SG_HTTP_TIMEOUT_S")
        && let Ok(n) = val.parse()
    {
        config.http_timeout_s = n;
    }
    if let Ok(val) = std::env::var("SG_BROWSER_NAV_TIMEOUT_MS")
        && let Ok(n) = val.parse()
    {
        config.browser_nav_timeout_ms = n;
    }
    if let Ok(val) = std::env::var("SG_PROVIDER_CREDITS_CAP_PER_RUN")
        && let Ok(n) = val.parse()
    {
        config.provider_credits_cap_per_run = Some(n);
    }
    if let Ok(val) = std::env::var("SG_LOG_LEVEL") {
        config.log_level = Some(val);
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a parsed configuration, returning advisory warnings.
///
/// Hard errors (invalid log level, zero-valued timeouts) are returned as a
/// [`ConfigError::ValidationError`]; soft issues come back as warnings.
pub fn validate_config(config: &EngineConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if let Some(ref level) = config.log_level
        && !VALID_LOG_LEVELS.contains(&level.as_str())
    {
        errors.push(format!("invalid log_level '{level}'"));
    }

    if config.default_max_attempts == 0 {
        errors.push("default_max_attempts must be >= 1".into());
    }
    if config.http_timeout_s == 0 {
        errors.push("http_timeout_s must be >= 1".into());
    }
    if config.browser_nav_timeout_ms == 0 {
        errors.push("browser_nav_timeout_ms must be >= 1".into());
    }

    if config.back_off_cap_s < config.back_off_base_s {
        warnings.push(ConfigWarning::BackoffCapBelowBase {
            base_s: config.back_off_base_s,
            cap_s: config.back_off_cap_s,
        });
    }
    if config.http_timeout_s > LARGE_TIMEOUT_THRESHOLD_S {
        warnings.push(ConfigWarning::LargeTimeout {
            field: "http_timeout_s".into(),
            value: config.http_timeout_s,
        });
    }
    if config.provider_credits_cap_per_run.is_none() {
        warnings.push(ConfigWarning::NoProviderCreditCap);
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_table() {
        let c = EngineConfig::default();
        assert_eq!(c.default_max_attempts, 3);
        assert_eq!(c.http_timeout_s, 20);
        assert_eq!(c.browser_nav_timeout_ms, 30_000);
        assert_eq!(c.session_max_age_min, 120);
        assert_eq!(c.session_max_uses, 100);
        assert_eq!(c.session_max_failure_streak, 3);
        assert_eq!(c.back_off_base_s, 10);
        assert_eq!(c.back_off_cap_s, 300);
    }

    #[test]
    fn parse_toml_round_trips_overrides() {
        let toml_src = r#"
            default_max_attempts = 5
            http_timeout_s = 15
        "#;
        let c = parse_toml(toml_src).unwrap();
        assert_eq!(c.default_max_attempts, 5);
        assert_eq!(c.http_timeout_s, 15);
        assert_eq!(c.browser_nav_timeout_ms, 30_000); // default filled in
    }

    #[test]
    fn rejects_invalid_log_level() {
        let mut c = EngineConfig::default();
        c.log_level = Some("verbose".into());
        assert!(validate_config(&c).is_err());
    }

    #[test]
    fn warns_on_backoff_cap_below_base() {
        let mut c = EngineConfig::default();
        c.back_off_base_s = 100;
        c.back_off_cap_s = 10;
        let warnings = validate_config(&c).unwrap();
        assert!(warnings
            .iter()
            .any(|w| matches!(w, ConfigWarning::BackoffCapBelowBase { .. })));
    }

    #[test]
    fn no_provider_cap_warns_but_does_not_error() {
        let c = EngineConfig::default();
        let warnings = validate_config(&c).unwrap();
        assert!(warnings.contains(&ConfigWarning::NoProviderCreditCap));
    }
}
