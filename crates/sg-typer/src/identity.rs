use crate::clean::collapse_whitespace;
use sg_core::Typed;

const SUFFIXES: &[&str] = &["jr", "sr", "ii", "iii", "iv", "phd", "md", "esq"];

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Parses `person_name`: collapse whitespace, title-case each token except
/// recognized suffixes (kept upper/as-is) and short particles (`"van"`,
/// `"de"`, `"la"`) which stay lowercase unless leading.
pub fn type_person_name(raw: &str) -> Typed {
    const PARTICLES: &[&str] = &["van", "de", "la", "den", "der", "von", "di"];
    let cleaned = collapse_whitespace(raw);
    if cleaned.is_empty() || cleaned.chars().any(|c| c.is_ascii_digit()) {
        return Typed::failed(raw, "invalid_format");
    }
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();
    if tokens.is_empty() {
        return Typed::failed(raw, "invalid_format");
    }
    let rendered = tokens
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let lower = t.to_lowercase();
            if SUFFIXES.contains(&lower.trim_matches('.').to_string().as_str()) {
                t.to_uppercase()
            } else if i > 0 && PARTICLES.contains(&lower.as_str()) {
                lower
            } else {
                title_case(t)
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    Typed {
        value: Some(serde_json::json!(rendered)),
        raw: raw.to_string(),
        confidence: if tokens.len() >= 2 { 0.9 } else { 0.6 },
        reasons: vec!["parsed_person_name".to_string()],
        errors: vec![],
    }
}

/// Parses `first_name`/`last_name`: a single title-cased token (or hyphen-
/// joined compound, e.g. `"Smith-Jones"`).
fn type_name_part(raw: &str) -> Typed {
    let cleaned = collapse_whitespace(raw);
    if cleaned.is_empty() || cleaned.chars().any(|c| c.is_ascii_digit()) {
        return Typed::failed(raw, "invalid_format");
    }
    let rendered = cleaned
        .split('-')
        .map(title_case)
        .collect::<Vec<_>>()
        .join("-");
    Typed {
        value: Some(serde_json::json!(rendered)),
        raw: raw.to_string(),
        confidence: 0.9,
        reasons: vec!["parsed_name_part".to_string()],
        errors: vec![],
    }
}

pub fn type_first_name(raw: &str) -> Typed {
    type_name_part(raw)
}

pub fn type_last_name(raw: &str) -> Typed {
    type_name_part(raw)
}

const COMPANY_SUFFIXES: &[&str] = &[
    "inc", "inc.", "llc", "llc.", "ltd", "ltd.", "corp", "corp.", "co", "co.", "gmbh", "plc",
];

/// Parses `company`: clean whitespace; recognizes (but does not strip) a
/// trailing legal-entity suffix, recorded as a reason.
pub fn type_company(raw: &str) -> Typed {
    let cleaned = collapse_whitespace(raw);
    if cleaned.is_empty() {
        return Typed::failed(raw, "empty_value");
    }
    let mut reasons = vec!["cleaned".to_string()];
    if let Some(last_word) = cleaned.split_whitespace().last() {
        if COMPANY_SUFFIXES.contains(&last_word.to_lowercase().as_str()) {
            reasons.push("legal_suffix_detected".to_string());
        }
    }
    Typed {
        value: Some(serde_json::json!(cleaned)),
        raw: raw.to_string(),
        confidence: 0.85,
        reasons,
        errors: vec![],
    }
}

/// Parses `job_title`: clean whitespace, title-case each word except a
/// small set of lowercase connectors (`"of"`, `"and"`, `"the"`, `"for"`).
pub fn type_job_title(raw: &str) -> Typed {
    const CONNECTORS: &[&str] = &["of", "and", "the", "for", "&"];
    let cleaned = collapse_whitespace(raw);
    if cleaned.is_empty() {
        return Typed::failed(raw, "empty_value");
    }
    let rendered = cleaned
        .split_whitespace()
        .enumerate()
        .map(|(i, w)| {
            if i > 0 && CONNECTORS.contains(&w.to_lowercase().as_str()) {
                w.to_lowercase()
            } else {
                title_case(w)
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    Typed {
        value: Some(serde_json::json!(rendered)),
        raw: raw.to_string(),
        confidence: 0.85,
        reasons: vec!["parsed_job_title".to_string()],
        errors: vec![],
    }
}

/// Parses `category`: clean whitespace, lowercase-normalized free-form tag.
/// Bounded usefulness beyond cleaning since the vocabulary is open; callers
/// typically constrain it via `ValidationRules::allowed`.
pub fn type_category(raw: &str) -> Typed {
    let cleaned = collapse_whitespace(raw);
    if cleaned.is_empty() {
        return Typed::failed(raw, "empty_value");
    }
    Typed {
        value: Some(serde_json::json!(cleaned.to_lowercase())),
        raw: raw.to_string(),
        confidence: 0.8,
        reasons: vec!["normalized_category".to_string()],
        errors: vec![],
    }
}
