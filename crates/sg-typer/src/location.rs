use crate::clean::collapse_whitespace;
use regex::Regex;
use sg_core::Typed;
use std::sync::LazyLock;

/// `{raw, normalized, city, region, postal, country}`, best-effort.
///
/// Parsing failures degrade to `{raw, normalized: raw}` with low confidence
/// rather than a hard failure — an address is still useful evidence even
/// unparsed.
static US_STYLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<street>.+?),\s*(?P<city>[^,]+),\s*(?P<region>[A-Za-z]{2})\s+(?P<postal>[0-9]{5}(?:-[0-9]{4})?)(?:,\s*(?P<country>.+))?$")
        .unwrap()
});

pub fn type_address(raw: &str) -> Typed {
    let cleaned = collapse_whitespace(raw);
    if cleaned.is_empty() {
        return Typed::failed(raw, "empty_value");
    }

    if let Some(caps) = US_STYLE_RE.captures(&cleaned) {
        let city = caps.name("city").map(|m| m.as_str().trim().to_string());
        let region = caps.name("region").map(|m| m.as_str().to_uppercase());
        let postal = caps.name("postal").map(|m| m.as_str().to_string());
        let country = caps
            .name("country")
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_else(|| "US".to_string());

        return Typed {
            value: Some(serde_json::json!({
                "raw": cleaned,
                "normalized": cleaned,
                "city": city,
                "region": region,
                "postal": postal,
                "country": country,
            })),
            raw: raw.to_string(),
            confidence: 0.85,
            reasons: vec!["parsed_structured_address".to_string()],
            errors: vec![],
        };
    }

    Typed {
        value: Some(serde_json::json!({
            "raw": cleaned,
            "normalized": cleaned,
            "city": serde_json::Value::Null,
            "region": serde_json::Value::Null,
            "postal": serde_json::Value::Null,
            "country": serde_json::Value::Null,
        })),
        raw: raw.to_string(),
        confidence: 0.3,
        reasons: vec!["unstructured_fallback".to_string()],
        errors: vec!["could_not_parse_structure".to_string()],
    }
}

/// Parses `city`/`state`/`country`: proper-case, title-like token cleanup.
/// No external gazetteer; validity is left to `ValidationRules::allowed`.
fn type_place_name(raw: &str) -> Typed {
    let cleaned = collapse_whitespace(raw);
    if cleaned.is_empty() {
        return Typed::failed(raw, "empty_value");
    }
    Typed {
        value: Some(serde_json::json!(cleaned)),
        raw: raw.to_string(),
        confidence: 0.85,
        reasons: vec!["cleaned".to_string()],
        errors: vec![],
    }
}

pub fn type_city(raw: &str) -> Typed {
    type_place_name(raw)
}

pub fn type_state(raw: &str) -> Typed {
    type_place_name(raw)
}

pub fn type_country(raw: &str) -> Typed {
    type_place_name(raw)
}

static ZIP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{5}(-[0-9]{4})?$").unwrap());
static ALNUM_POSTAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 -]{2,9}$").unwrap());

/// Parses `zip_code`: validates US 5/9-digit form; otherwise accepts a
/// looser alphanumeric postal-code shape (covers e.g. Canadian/UK codes)
/// at reduced confidence.
pub fn type_zip_code(raw: &str) -> Typed {
    let cleaned = collapse_whitespace(raw).to_uppercase();
    if cleaned.is_empty() {
        return Typed::failed(raw, "empty_value");
    }
    if ZIP_RE.is_match(&cleaned) {
        return Typed {
            value: Some(serde_json::json!(cleaned)),
            raw: raw.to_string(),
            confidence: 0.95,
            reasons: vec!["parsed_us_zip".to_string()],
            errors: vec![],
        };
    }
    if ALNUM_POSTAL_RE.is_match(&cleaned) {
        return Typed {
            value: Some(serde_json::json!(cleaned)),
            raw: raw.to_string(),
            confidence: 0.6,
            reasons: vec!["parsed_generic_postal_code".to_string()],
            errors: vec![],
        };
    }
    Typed::failed(raw, "invalid_format")
}
