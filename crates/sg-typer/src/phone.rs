use crate::clean::collapse_whitespace;
use crate::context::TypingContext;
use phonenumber::Mode;
use sg_core::Typed;
use std::str::FromStr;

/// Parses/normalizes a phone/mobile/fax number to E.164 using
/// `ctx.default_phone_region` when the raw string carries no country code.
///
/// Confidence: 0.95 if `is_valid`, 0.7 if only `is_possible`, 0 otherwise.
pub fn type_phone(raw: &str, ctx: &TypingContext) -> Typed {
    let cleaned = collapse_whitespace(raw);
    if cleaned.is_empty() {
        return Typed::failed(raw, "invalid_format");
    }

    let region = phonenumber::country::Id::from_str(&ctx.default_phone_region).ok();
    let parsed = match phonenumber::parse(region, &cleaned) {
        Ok(p) => p,
        Err(_) => return Typed::failed(raw, "invalid_format"),
    };

    let e164 = parsed.format().mode(Mode::E164).to_string();
    if phonenumber::is_valid(&parsed) {
        Typed {
            value: Some(serde_json::json!(e164)),
            raw: raw.to_string(),
            confidence: 0.95,
            reasons: vec!["parsed_e164".to_string(), "valid_number".to_string()],
            errors: vec![],
        }
    } else if phonenumber::is_possible(&parsed) {
        Typed {
            value: Some(serde_json::json!(e164)),
            raw: raw.to_string(),
            confidence: 0.7,
            reasons: vec!["parsed_e164".to_string(), "possible_number".to_string()],
            errors: vec!["not_definitively_valid".to_string()],
        }
    } else {
        Typed::failed(raw, "invalid_format")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_us_number_normalizes_to_e164() {
        let t = type_phone("(415) 555-0132", &TypingContext::default());
        assert_eq!(t.value.unwrap(), serde_json::json!("+14155550132"));
        assert!((t.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn already_e164_round_trips() {
        let t = type_phone("+14155550132", &TypingContext::default());
        assert_eq!(t.value.unwrap(), serde_json::json!("+14155550132"));
    }

    #[test]
    fn garbage_fails() {
        let t = type_phone("not a phone number at all!!", &TypingContext::default());
        assert!(t.value.is_none());
        assert_eq!(t.confidence, 0.0);
    }
}
