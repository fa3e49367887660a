use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use sg_core::{SelectorSpec, SelectorTarget};
use sg_error::{EngineError, FailureCode};

/// Evaluates a [`SelectorSpec`] against a parsed document, returning the raw
/// string(s) matched. Returns `Ok(vec![])` when nothing matched (a missing
/// element is `null`, not an error); returns `Err` only for a malformed
/// selector/regex, which is a job-authoring mistake rather than a site
/// condition.
pub fn evaluate(doc: &Html, spec: &SelectorSpec) -> Result<Vec<String>, EngineError> {
    evaluate_scope(doc.root_element(), spec)
}

/// Evaluates a [`SelectorSpec`] rooted at a specific element, used for
/// per-item field extraction within a list detail page (same document,
/// narrower scope) as well as whole-document evaluation.
pub fn evaluate_scope(root: ElementRef<'_>, spec: &SelectorSpec) -> Result<Vec<String>, EngineError> {
    let selector = Selector::parse(&spec.selector).map_err(|e| {
        EngineError::new(FailureCode::Unknown, "invalid CSS selector")
            .with_context("selector", spec.selector.clone())
            .with_context("parse_error", e.to_string())
    })?;

    let mut matches: Vec<String> = Vec::new();
    for el in root.select(&selector) {
        let raw = match &spec.target {
            SelectorTarget::Text => el.text().collect::<Vec<_>>().join(""),
            SelectorTarget::Attribute { name } => match el.value().attr(name) {
                Some(v) => v.to_string(),
                None => continue,
            },
        };
        matches.push(raw);
        if !spec.all {
            break;
        }
    }

    if let Some(ref pattern) = spec.capture_regex {
        let re = Regex::new(pattern).map_err(|e| {
            EngineError::new(FailureCode::Unknown, "invalid capture_regex")
                .with_context("pattern", pattern.clone())
                .with_context("parse_error", e.to_string())
        })?;
        matches = matches
            .into_iter()
            .filter_map(|raw| re.captures(&raw).and_then(|c| c.get(1)).map(|m| m.as_str().to_string()))
            .collect();
    }

    Ok(matches)
}

/// Evaluates `spec` and returns the first match, if any.
pub fn evaluate_first(doc: &Html, spec: &SelectorSpec) -> Result<Option<String>, EngineError> {
    let mut all = spec.clone();
    all.all = false;
    Ok(evaluate(doc, &all)?.into_iter().next())
}
