use crate::clean::collapse_whitespace;
use crate::context::TypingContext;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use sg_core::Typed;

/// Formats tried, in order, for a bare `date`.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%B %-d, %Y",
    "%b %-d, %Y",
    "%-d %B %Y",
    "%Y/%m/%d",
];

/// Formats tried, in order, for a bare `time`.
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%I:%M %p", "%I:%M:%S %p"];

/// Formats tried, in order, for a combined `datetime`.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M %p",
];

/// Year bounds enforced on every parsed date/datetime: reasonably recent
/// history through a few years of future scheduling slack.
const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 2100;

fn year_in_bounds(year: i32) -> bool {
    (MIN_YEAR..=MAX_YEAR).contains(&year)
}

/// Parses a `date` field, normalizing to `YYYY-MM-DD` (ISO-8601).
///
/// `ctx.default_timezone` is accepted but unused for a pure date (no time
/// component to localize). Confidence: 0.9 on a clean parse within year
/// bounds, 0 otherwise.
pub fn type_date(raw: &str, _ctx: &TypingContext) -> Typed {
    let cleaned = collapse_whitespace(raw);
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(&cleaned, fmt) {
            if !year_in_bounds(d.year()) {
                return Typed::failed(raw, "year_out_of_bounds");
            }
            return Typed {
                value: Some(serde_json::json!(d.format("%Y-%m-%d").to_string())),
                raw: raw.to_string(),
                confidence: 0.9,
                reasons: vec!["parsed_date".to_string(), "normalized_iso8601".to_string()],
                errors: vec![],
            };
        }
    }
    Typed::failed(raw, "invalid_format")
}

/// Parses a `time` field, normalizing to `HH:MM:SS` (24h, ISO-8601).
pub fn type_time(raw: &str, _ctx: &TypingContext) -> Typed {
    let cleaned = collapse_whitespace(raw);
    for fmt in TIME_FORMATS {
        if let Ok(t) = NaiveTime::parse_from_str(&cleaned, fmt) {
            return Typed {
                value: Some(serde_json::json!(t.format("%H:%M:%S").to_string())),
                raw: raw.to_string(),
                confidence: 0.9,
                reasons: vec!["parsed_time".to_string(), "normalized_iso8601".to_string()],
                errors: vec![],
            };
        }
    }
    Typed::failed(raw, "invalid_format")
}

/// Parses a `datetime` field, normalizing to RFC 3339 (`YYYY-MM-DDTHH:MM:SSZ`)
/// with `ctx.default_timezone` applied when the raw string carries no
/// offset. Treated as UTC for normalization purposes when the configured
/// default timezone cannot be resolved to an offset (only `"UTC"` is
/// resolved directly; other IANA zones are accepted as a hint but not
/// looked up, since that requires a tz database this crate does not
/// bundle).
pub fn type_datetime(raw: &str, ctx: &TypingContext) -> Typed {
    let cleaned = collapse_whitespace(raw);

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(&cleaned) {
        if !year_in_bounds(dt.year()) {
            return Typed::failed(raw, "year_out_of_bounds");
        }
        return Typed {
            value: Some(serde_json::json!(dt.to_rfc3339())),
            raw: raw.to_string(),
            confidence: 0.95,
            reasons: vec!["parsed_datetime".to_string(), "had_explicit_offset".to_string()],
            errors: vec![],
        };
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&cleaned, fmt) {
            if !year_in_bounds(naive.year()) {
                return Typed::failed(raw, "year_out_of_bounds");
            }
            let assumed_utc = ctx.default_timezone == "UTC";
            let rendered = format!("{}Z", naive.format("%Y-%m-%dT%H:%M:%S"));
            let mut reasons = vec!["parsed_datetime".to_string()];
            reasons.push(if assumed_utc {
                "assumed_utc".to_string()
            } else {
                "assumed_default_timezone_offset_unresolved".to_string()
            });
            return Typed {
                value: Some(serde_json::json!(rendered)),
                raw: raw.to_string(),
                confidence: if assumed_utc { 0.85 } else { 0.7 },
                reasons,
                errors: vec![],
            };
        }
    }

    Typed::failed(raw, "invalid_format")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_parses_iso() {
        let t = type_date("2024-03-15", &TypingContext::default());
        assert_eq!(t.value.unwrap(), serde_json::json!("2024-03-15"));
    }

    #[test]
    fn date_parses_us_slash_format() {
        let t = type_date("03/15/2024", &TypingContext::default());
        assert_eq!(t.value.unwrap(), serde_json::json!("2024-03-15"));
    }

    #[test]
    fn date_parses_month_name() {
        let t = type_date("March 15, 2024", &TypingContext::default());
        assert_eq!(t.value.unwrap(), serde_json::json!("2024-03-15"));
    }

    #[test]
    fn date_rejects_out_of_bounds_year() {
        let t = type_date("1500-01-01", &TypingContext::default());
        assert!(t.value.is_none());
    }

    #[test]
    fn time_parses_24h() {
        let t = type_time("14:30:00", &TypingContext::default());
        assert_eq!(t.value.unwrap(), serde_json::json!("14:30:00"));
    }

    #[test]
    fn time_parses_12h_with_meridiem() {
        let t = type_time("2:30 PM", &TypingContext::default());
        assert_eq!(t.value.unwrap(), serde_json::json!("14:30:00"));
    }

    #[test]
    fn datetime_parses_rfc3339() {
        let t = type_datetime("2024-03-15T14:30:00Z", &TypingContext::default());
        assert!(t.value.is_some());
        assert!((t.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn datetime_without_offset_assumes_default_timezone() {
        let t = type_datetime("2024-03-15 14:30:00", &TypingContext::default());
        assert_eq!(t.value.unwrap(), serde_json::json!("2024-03-15T14:30:00Z"));
        assert!((t.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn garbage_fails() {
        assert!(type_date("not a date", &TypingContext::default()).value.is_none());
        assert!(type_time("not a time", &TypingContext::default()).value.is_none());
        assert!(type_datetime("not a datetime", &TypingContext::default()).value.is_none());
    }
}
