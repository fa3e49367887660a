use crate::clean::{collapse_whitespace, strip_html};
use sg_core::Typed;

const MAX_STRING_LEN: usize = 500;

/// Parses `string`: clean + collapse whitespace, no HTML stripping beyond
/// what `collapse_whitespace` already does to tag-adjacent text. Rejects
/// empty results and flags (but does not reject) unusually long values.
pub fn type_string(raw: &str) -> Typed {
    let cleaned = collapse_whitespace(raw);
    if cleaned.is_empty() {
        return Typed::failed(raw, "empty_value");
    }
    let mut reasons = vec!["cleaned".to_string()];
    let mut confidence = 0.9;
    if cleaned.len() > MAX_STRING_LEN {
        reasons.push("unusually_long".to_string());
        confidence = 0.7;
    }
    Typed {
        value: Some(serde_json::json!(cleaned)),
        raw: raw.to_string(),
        confidence,
        reasons,
        errors: vec![],
    }
}

/// Parses `text`: like `string` but with no length penalty — longer free
/// text is the expected shape.
pub fn type_text(raw: &str) -> Typed {
    let cleaned = collapse_whitespace(raw);
    if cleaned.is_empty() {
        return Typed::failed(raw, "empty_value");
    }
    Typed {
        value: Some(serde_json::json!(cleaned)),
        raw: raw.to_string(),
        confidence: 0.9,
        reasons: vec!["cleaned".to_string()],
        errors: vec![],
    }
}

/// Parses `html`: markup is kept verbatim (only outer whitespace trimmed),
/// since stripping it is precisely what this type exists to avoid.
pub fn type_html(raw: &str) -> Typed {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Typed::failed(raw, "empty_value");
    }
    Typed {
        value: Some(serde_json::json!(trimmed)),
        raw: raw.to_string(),
        confidence: 0.9,
        reasons: vec!["kept_markup".to_string()],
        errors: vec![],
    }
}

const TRUTHY: &[&str] = &["true", "yes", "y", "1", "on", "checked", "available", "in stock"];
const FALSY: &[&str] = &["false", "no", "n", "0", "off", "unchecked", "unavailable", "out of stock"];

/// Parses `boolean` from a closed vocabulary of truthy/falsy tokens
/// (case-insensitive). Values outside this vocabulary fail to parse rather
/// than guessing.
pub fn type_boolean(raw: &str) -> Typed {
    let cleaned = collapse_whitespace(raw).to_lowercase();
    if TRUTHY.contains(&cleaned.as_str()) {
        return Typed {
            value: Some(serde_json::json!(true)),
            raw: raw.to_string(),
            confidence: 0.95,
            reasons: vec!["parsed_boolean".to_string()],
            errors: vec![],
        };
    }
    if FALSY.contains(&cleaned.as_str()) {
        return Typed {
            value: Some(serde_json::json!(false)),
            raw: raw.to_string(),
            confidence: 0.95,
            reasons: vec!["parsed_boolean".to_string()],
            errors: vec![],
        };
    }
    Typed::failed(raw, "unrecognized_boolean_token")
}

/// HTML-stripping variant used when a `string`/`text` selector result still
/// contains inline markup the caller wants removed before cleaning.
pub fn type_string_stripping_html(raw: &str) -> Typed {
    let cleaned = strip_html(raw);
    if cleaned.is_empty() {
        return Typed::failed(raw, "empty_value");
    }
    Typed {
        value: Some(serde_json::json!(cleaned)),
        raw: raw.to_string(),
        confidence: 0.9,
        reasons: vec!["stripped_html".to_string(), "cleaned".to_string()],
        errors: vec![],
    }
}
