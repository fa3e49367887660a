//! Unified failure taxonomy for the scraping control plane.
//!
//! Every engine-level failure carries a stable, closed [`FailureCode`] plus a
//! human-readable message, an optional cause, and arbitrary structured
//! context. Use [`EngineError::new`] to build one fluently.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad recovery family a [`FailureCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Authn/authz or rate-limit style rejections. Recovery: escalate tier.
    Access,
    /// Transport-level failures. Recovery: retry / back off.
    Network,
    /// Selector or page content did not yield usable data.
    Extraction,
    /// Provider credit exhaustion or key-level rejection.
    Provider,
    /// Unclassified / internal.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Access => "access",
            Self::Network => "network",
            Self::Extraction => "extraction",
            Self::Provider => "provider",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// FailureCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable failure code.
///
/// Closed set per the engine's error taxonomy; each attempt records exactly
/// one of these on termination. Serializes to `snake_case`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    /// Authentication/authorization or rate-limit response (401/403/429).
    Blocked,
    /// Specifically a 429 or a provider quota signal.
    RateLimited,
    /// Wall-clock timeout exceeded.
    Timeout,
    /// Connection refused/reset/DNS failure.
    Network,
    /// Malformed response or 5xx.
    BadResponse,
    /// Positive captcha, legal block, or provider-final rejection.
    HardBlock,
    /// Zero items extracted, or all declared fields null.
    ExtractionEmpty,
    /// No active provider key with remaining credit.
    NoProviderKey,
    /// Unclassified failure.
    Unknown,
}

impl FailureCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Blocked | Self::RateLimited | Self::HardBlock => ErrorCategory::Access,
            Self::Timeout | Self::Network | Self::BadResponse => ErrorCategory::Network,
            Self::ExtractionEmpty => ErrorCategory::Extraction,
            Self::NoProviderKey => ErrorCategory::Provider,
            Self::Unknown => ErrorCategory::Internal,
        }
    }

    /// Stable `&'static str` representation (e.g. `"hard_block"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::RateLimited => "rate_limited",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::BadResponse => "bad_response",
            Self::HardBlock => "hard_block",
            Self::ExtractionEmpty => "extraction_empty",
            Self::NoProviderKey => "no_provider_key",
            Self::Unknown => "unknown",
        }
    }

    /// Whether an attempt carrying this code may be retried at the same tier
    /// (as opposed to requiring escalation or termination).
    pub fn retryable_same_tier(&self) -> bool {
        matches!(self, Self::Timeout | Self::Network | Self::BadResponse)
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Unified engine error.
///
/// Carries a stable [`FailureCode`], a human-readable message, an optional
/// underlying cause, and arbitrary structured context for diagnostics.
///
/// ```
/// use sg_error::{EngineError, FailureCode};
///
/// let err = EngineError::new(FailureCode::Timeout, "fetch exceeded 20s")
///     .with_context("tier", "http")
///     .with_context("timeout_ms", 20_000);
/// ```
pub struct EngineError {
    /// Machine-readable failure code.
    pub code: FailureCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl EngineError {
    /// Create a new error with the given code and message.
    pub fn new(code: FailureCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Debug for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("EngineError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Serialisable snapshot of an [`EngineError`] (without the opaque source).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineErrorDto {
    /// Failure code.
    pub code: FailureCode,
    /// Human-readable message.
    pub message: String,
    /// Structured context.
    pub context: BTreeMap<String, serde_json::Value>,
    /// String representation of the source error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message: Option<String>,
}

impl From<&EngineError> for EngineErrorDto {
    fn from(err: &EngineError) -> Self {
        Self {
            code: err.code,
            message: err.message.clone(),
            context: err.context.clone(),
            source_message: err.source.as_ref().map(|s| s.to_string()),
        }
    }
}

impl From<EngineErrorDto> for EngineError {
    fn from(dto: EngineErrorDto) -> Self {
        Self {
            code: dto.code,
            message: dto.message,
            source: None,
            context: dto.context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    const ALL_CODES: &[FailureCode] = &[
        FailureCode::Blocked,
        FailureCode::RateLimited,
        FailureCode::Timeout,
        FailureCode::Network,
        FailureCode::BadResponse,
        FailureCode::HardBlock,
        FailureCode::ExtractionEmpty,
        FailureCode::NoProviderKey,
        FailureCode::Unknown,
    ];

    #[test]
    fn basic_construction() {
        let err = EngineError::new(FailureCode::Unknown, "boom");
        assert_eq!(err.code, FailureCode::Unknown);
        assert_eq!(err.message, "boom");
        assert!(err.source.is_none());
        assert!(err.context.is_empty());
    }

    #[test]
    fn display_without_context() {
        let err = EngineError::new(FailureCode::Blocked, "401 from origin");
        assert_eq!(err.to_string(), "[blocked] 401 from origin");
    }

    #[test]
    fn display_with_context() {
        let err = EngineError::new(FailureCode::Timeout, "timed out").with_context("tier", "http");
        let s = err.to_string();
        assert!(s.starts_with("[timeout] timed out"));
        assert!(s.contains("tier"));
    }

    #[test]
    fn debug_with_source() {
        let src = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        let err = EngineError::new(FailureCode::Network, "connection failed").with_source(src);
        let dbg = format!("{err:?}");
        assert!(dbg.contains("source"));
        assert!(dbg.contains("reset"));
    }

    #[test]
    fn every_code_has_a_category() {
        for code in ALL_CODES {
            let _ = code.category();
        }
    }

    #[test]
    fn category_groupings_match_recovery_policy() {
        assert_eq!(FailureCode::Blocked.category(), ErrorCategory::Access);
        assert_eq!(FailureCode::RateLimited.category(), ErrorCategory::Access);
        assert_eq!(FailureCode::HardBlock.category(), ErrorCategory::Access);
        assert_eq!(FailureCode::Timeout.category(), ErrorCategory::Network);
        assert_eq!(FailureCode::Network.category(), ErrorCategory::Network);
        assert_eq!(FailureCode::BadResponse.category(), ErrorCategory::Network);
        assert_eq!(
            FailureCode::ExtractionEmpty.category(),
            ErrorCategory::Extraction
        );
        assert_eq!(
            FailureCode::NoProviderKey.category(),
            ErrorCategory::Provider
        );
        assert_eq!(FailureCode::Unknown.category(), ErrorCategory::Internal);
    }

    #[test]
    fn retryable_same_tier_matches_spec() {
        assert!(FailureCode::Timeout.retryable_same_tier());
        assert!(FailureCode::Network.retryable_same_tier());
        assert!(FailureCode::BadResponse.retryable_same_tier());
        assert!(!FailureCode::Blocked.retryable_same_tier());
        assert!(!FailureCode::HardBlock.retryable_same_tier());
    }

    #[test]
    fn serde_round_trip_snake_case() {
        let json = serde_json::to_string(&FailureCode::ExtractionEmpty).unwrap();
        assert_eq!(json, "\"extraction_empty\"");
        let back: FailureCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, FailureCode::ExtractionEmpty);
    }

    #[test]
    fn dto_round_trip_drops_source_but_keeps_message() {
        let src = io::Error::new(io::ErrorKind::Other, "upstream broke");
        let err = EngineError::new(FailureCode::BadResponse, "5xx").with_source(src);
        let dto = EngineErrorDto::from(&err);
        assert_eq!(dto.source_message.as_deref(), Some("upstream broke"));
        let restored: EngineError = dto.into();
        assert!(restored.source.is_none());
        assert_eq!(restored.code, FailureCode::BadResponse);
    }
}
