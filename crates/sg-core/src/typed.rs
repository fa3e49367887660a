use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Output of the value typer for a single raw field value.
///
/// `confidence` accumulates on successful parse/normalize steps and is
/// reduced on each validation violation, clamped to `[0, 1]`. `reasons` and
/// `errors` are machine-enumerated tokens (e.g. `"parsed_e164"`,
/// `"invalid_format"`).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Typed {
    /// Normalized value, or `None` if parsing/validation failed outright.
    pub value: Option<serde_json::Value>,
    /// The raw string this was derived from.
    pub raw: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Tokens describing successful steps.
    pub reasons: Vec<String>,
    /// Tokens describing validation/parse failures.
    pub errors: Vec<String>,
}

impl Typed {
    /// A fully-failed typing result: no value, zero confidence, the given
    /// error token recorded.
    pub fn failed(raw: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            value: None,
            raw: raw.into(),
            confidence: 0.0,
            reasons: Vec::new(),
            errors: vec![error.into()],
        }
    }

    /// Clamp `confidence` into `[0, 1]`. Called after every adjustment so
    /// intermediate arithmetic never needs to reason about the bound.
    pub fn clamp_confidence(&mut self) {
        self.confidence = self.confidence.clamp(0.0, 1.0);
    }
}
