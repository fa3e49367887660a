use crate::clean::collapse_whitespace;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use sg_core::Typed;
use std::str::FromStr;
use std::sync::LazyLock;

static NUMERIC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?[0-9][0-9,]*(\.[0-9]+)?").unwrap());

fn strip_thousands(raw: &str) -> Option<String> {
    let cleaned = collapse_whitespace(raw);
    let m = NUMERIC_RE.find(&cleaned)?;
    Some(m.as_str().replace(',', ""))
}

/// Parses `integer`: strips thousands separators, parses as `i64`.
///
/// Confidence: 0.95 on a clean parse, 0 otherwise.
pub fn type_integer(raw: &str) -> Typed {
    let Some(digits) = strip_thousands(raw) else {
        return Typed::failed(raw, "invalid_format");
    };
    let Ok(dec) = Decimal::from_str(&digits) else {
        return Typed::failed(raw, "invalid_format");
    };
    if dec.fract() != Decimal::ZERO {
        return Typed::failed(raw, "not_an_integer");
    }
    let Some(n) = dec.to_i64() else {
        return Typed::failed(raw, "out_of_range");
    };
    Typed {
        value: Some(serde_json::json!(n)),
        raw: raw.to_string(),
        confidence: 0.95,
        reasons: vec!["parsed_integer".to_string()],
        errors: vec![],
    }
}

/// Parses `decimal`: strips thousands separators, parses as an
/// arbitrary-precision [`Decimal`], serialized as its canonical string form.
pub fn type_decimal(raw: &str) -> Typed {
    let Some(digits) = strip_thousands(raw) else {
        return Typed::failed(raw, "invalid_format");
    };
    let Ok(dec) = Decimal::from_str(&digits) else {
        return Typed::failed(raw, "invalid_format");
    };
    Typed {
        value: Some(serde_json::json!(dec.to_string())),
        raw: raw.to_string(),
        confidence: 0.95,
        reasons: vec!["parsed_decimal".to_string()],
        errors: vec![],
    }
}

/// Parses `number`: same as `decimal` but surfaced as an `f64`.
pub fn type_number(raw: &str) -> Typed {
    let Some(digits) = strip_thousands(raw) else {
        return Typed::failed(raw, "invalid_format");
    };
    let Ok(n) = digits.parse::<f64>() else {
        return Typed::failed(raw, "invalid_format");
    };
    Typed {
        value: Some(serde_json::json!(n)),
        raw: raw.to_string(),
        confidence: 0.95,
        reasons: vec!["parsed_number".to_string()],
        errors: vec![],
    }
}

/// Parses `percentage`: strips a trailing `%` (if present, recorded as a
/// reason) and thousands separators, parses as `f64`.
pub fn type_percentage(raw: &str) -> Typed {
    let cleaned = collapse_whitespace(raw);
    let had_symbol = cleaned.contains('%');
    let without_symbol = cleaned.replace('%', "");
    let Some(digits) = strip_thousands(&without_symbol) else {
        return Typed::failed(raw, "invalid_format");
    };
    let Ok(n) = digits.parse::<f64>() else {
        return Typed::failed(raw, "invalid_format");
    };
    let mut reasons = vec!["parsed_percentage".to_string()];
    if had_symbol {
        reasons.push("stripped_percent_symbol".to_string());
    }
    Typed {
        value: Some(serde_json::json!(n)),
        raw: raw.to_string(),
        confidence: 0.95,
        reasons,
        errors: vec![],
    }
}

/// Parses `rating`: a bare number, optionally of the form `"4.5/5"` or
/// `"4.5 out of 5"`, surfaced as `f64`. When a scale is present and is not
/// 5 or 10, the raw numerator is kept as-is (no rescaling) and a
/// `non_standard_scale` reason is recorded.
pub fn type_rating(raw: &str) -> Typed {
    let cleaned = collapse_whitespace(raw);
    static SCALE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)(-?[0-9.]+)\s*(?:/|out of)\s*([0-9.]+)").unwrap());
    if let Some(caps) = SCALE_RE.captures(&cleaned) {
        let Ok(n) = caps[1].parse::<f64>() else {
            return Typed::failed(raw, "invalid_format");
        };
        let scale: f64 = caps[2].parse().unwrap_or(5.0);
        let mut reasons = vec!["parsed_rating".to_string(), "scale_detected".to_string()];
        if (scale - 5.0).abs() > f64::EPSILON && (scale - 10.0).abs() > f64::EPSILON {
            reasons.push("non_standard_scale".to_string());
        }
        return Typed {
            value: Some(serde_json::json!(n)),
            raw: raw.to_string(),
            confidence: 0.95,
            reasons,
            errors: vec![],
        };
    }
    let Ok(n) = cleaned.parse::<f64>() else {
        return Typed::failed(raw, "invalid_format");
    };
    Typed {
        value: Some(serde_json::json!(n)),
        raw: raw.to_string(),
        confidence: 0.9,
        reasons: vec!["parsed_rating".to_string()],
        errors: vec![],
    }
}
