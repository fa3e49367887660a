use regex::Regex;
use sg_core::{Typed, ValidationRules};

/// Applies bounds/regex/allowed-set/required validation to an already
/// clean-parse-normalized [`Typed`] result, per the pipeline's `validate`
/// step.
///
/// Each violation appends an error token and subtracts from confidence
/// (clamped to `[0, 1]` afterward); it never flips a successfully parsed
/// `value` back to `None` — downstream record-level rejection for
/// `required` fields is the Field Extractor's job, not the typer's.
pub fn apply_validation_rules(mut typed: Typed, rules: &ValidationRules) -> Typed {
    if rules.required && typed.value.is_none() {
        typed.errors.push("required_missing".to_string());
        return typed;
    }

    if let Some(n) = typed
        .value
        .as_ref()
        .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse::<f64>().ok())))
    {
        if let Some(min) = rules.min {
            if n < min {
                typed.errors.push("below_minimum".to_string());
                typed.confidence -= 0.3;
            }
        }
        if let Some(max) = rules.max {
            if n > max {
                typed.errors.push("above_maximum".to_string());
                typed.confidence -= 0.3;
            }
        }
    }

    if let Some(ref pattern) = rules.regex {
        if let Some(ref v) = typed.value {
            let s = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            match Regex::new(pattern) {
                Ok(re) if !re.is_match(&s) => {
                    typed.errors.push("pattern_mismatch".to_string());
                    typed.confidence -= 0.3;
                }
                Err(_) => {
                    typed.errors.push("invalid_validation_regex".to_string());
                }
                _ => {}
            }
        }
    }

    if let Some(ref allowed) = rules.allowed {
        if let Some(ref v) = typed.value {
            let s = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if !allowed.iter().any(|a| a == &s) {
                typed.errors.push("not_in_allowed_set".to_string());
                typed.confidence -= 0.4;
            }
        }
    }

    typed.clamp_confidence();
    typed
}
