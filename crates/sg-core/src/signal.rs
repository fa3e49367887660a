//! Canonical raw signal tokens attached to an [`crate::run::EngineAttempt`].
//!
//! Executors and the field extractor push these string tokens onto an
//! attempt's `signals` list; the escalation engine classifies them back
//! into structured decisions. Kept as plain `&'static str` constants
//! (rather than an enum) because the attempt log serializes `signals` as
//! free-form strings per the data model, and new executor-specific tokens
//! should remain additive without touching the stored shape.

/// 401/403/429 response, or a provider auth-class rejection.
pub const BLOCKED: &str = "blocked";
/// Specifically a 429 or provider quota rejection.
pub const RATE_LIMITED: &str = "rate_limited";
/// A JS-framework marker (or robots `noindex`) was found; static HTML is
/// not authoritative.
pub const JS_REQUIRED: &str = "js_required";
/// Zero records produced, or every declared field was null across all
/// candidate items.
pub const EXTRACTION_EMPTY: &str = "extraction_empty";
/// A positive captcha, legal block, or provider-final rejection marker.
pub const HARD_BLOCK: &str = "hard_block";
/// Browser navigation timed out or ended on a non-2xx final status.
pub const NAVIGATION_FAILED: &str = "navigation_failed";
/// A captcha challenge was detected (subset of [`HARD_BLOCK`] call sites
/// that specifically identified a captcha marker).
pub const CAPTCHA: &str = "captcha";
/// 5xx or otherwise malformed response.
pub const BAD_RESPONSE: &str = "bad_response";
/// Wall-clock timeout exceeded.
pub const TIMEOUT: &str = "timeout";
/// Connection refused/reset/DNS failure.
pub const NETWORK: &str = "network";
/// No active provider key had remaining credit.
pub const NO_PROVIDER_KEY: &str = "no_provider_key";
