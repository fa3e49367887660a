use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Trims and collapses internal whitespace. Applied to every raw value
/// before type-specific parsing, except `html` fields which keep their
/// markup untouched.
pub fn collapse_whitespace(raw: &str) -> String {
    WHITESPACE.replace_all(raw.trim(), " ").trim().to_string()
}

/// Strips HTML tags, then collapses whitespace. Used for `text`/`string`
/// fields that may carry inline markup from `scraper`'s serialized node
/// text.
pub fn strip_html(raw: &str) -> String {
    collapse_whitespace(&TAG.replace_all(raw, " "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_internal_whitespace() {
        assert_eq!(collapse_whitespace("  a   b\n\tc  "), "a b c");
    }

    #[test]
    fn strips_tags_and_collapses() {
        assert_eq!(strip_html("<b>Hello</b> <i>world</i>"), "Hello world");
    }
}
