use crate::clean::collapse_whitespace;
use crate::context::TypingContext;
use regex::Regex;
use sg_core::Typed;
use std::sync::LazyLock;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)+$").unwrap());

const MAX_LEN: usize = 254;

/// Parses/validates/normalizes an email address.
///
/// Confidence: 0.98 if parsed and normalized cleanly; 0.6 if parsed but the
/// domain is a known disposable-mail provider; 0 if it doesn't parse.
pub fn type_email(raw: &str, ctx: &TypingContext) -> Typed {
    let cleaned = collapse_whitespace(raw);
    if cleaned.is_empty() || cleaned.len() > MAX_LEN || !EMAIL_RE.is_match(&cleaned) {
        return Typed::failed(raw, "invalid_format");
    }

    let (local, domain) = match cleaned.rsplit_once('@') {
        Some(parts) => parts,
        None => return Typed::failed(raw, "invalid_format"),
    };
    let normalized = format!("{local}@{}", domain.to_lowercase());

    let mut reasons = vec!["parsed_email".to_string()];
    let mut confidence = 0.98;
    if ctx
        .disposable_email_domains
        .iter()
        .any(|d| d.eq_ignore_ascii_case(domain))
    {
        confidence = 0.6;
        reasons.push("disposable_domain".to_string());
    }

    Typed {
        value: Some(serde_json::json!(normalized)),
        raw: raw.to_string(),
        confidence,
        reasons,
        errors: vec![],
    }
}
