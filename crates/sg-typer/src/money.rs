use crate::clean::collapse_whitespace;
use crate::context::TypingContext;
use regex::Regex;
use rust_decimal::Decimal;
use sg_core::Typed;
use std::str::FromStr;
use std::sync::LazyLock;

/// `{symbol -> ISO-4217 code}` for the handful of currency symbols the
/// typer recognizes directly. Anything else must already carry an ISO code
/// (e.g. `"USD 12.00"`) or falls back to `ctx.default_currency`.
const SYMBOL_TABLE: &[(&str, &str)] = &[
    ("$", "USD"),
    ("€", "EUR"),
    ("£", "GBP"),
    ("¥", "JPY"),
    ("₹", "INR"),
    ("₩", "KRW"),
    ("₽", "RUB"),
    ("R$", "BRL"),
];

static ISO_CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z]{3}$").unwrap());
static NUMERIC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?[0-9][0-9,\. ]*").unwrap());

/// Parses a `money` field into `{amount, currency}`.
///
/// Detects a currency symbol or a leading/trailing ISO-4217 code; falls
/// back to `ctx.default_currency` when neither is present. Strips
/// thousands separators before parsing the decimal amount. Negative
/// amounts are rejected unless `ctx.reject_negative_money` is `false`.
///
/// Confidence: 0.95 when a currency was explicitly detected in the raw
/// string; 0.75 when the default currency had to be assumed; 0 on parse
/// failure or a rejected negative amount.
pub fn type_money(raw: &str, ctx: &TypingContext) -> Typed {
    let cleaned = collapse_whitespace(raw);
    if cleaned.is_empty() {
        return Typed::failed(raw, "invalid_format");
    }

    let mut currency: Option<String> = None;
    let mut remainder = cleaned.clone();

    for (symbol, code) in SYMBOL_TABLE {
        if cleaned.contains(symbol) {
            currency = Some((*code).to_string());
            remainder = remainder.replace(symbol, "");
            break;
        }
    }

    if currency.is_none() {
        for token in cleaned.split_whitespace() {
            let stripped = token.trim_matches(|c: char| !c.is_alphanumeric());
            if ISO_CODE_RE.is_match(stripped) {
                currency = Some(stripped.to_uppercase());
                remainder = remainder.replace(token, "");
                break;
            }
        }
    }

    let explicit_currency = currency.is_some();
    let currency = currency.unwrap_or_else(|| ctx.default_currency.clone());

    let Some(m) = NUMERIC_RE.find(&remainder) else {
        return Typed::failed(raw, "invalid_format");
    };
    let digits: String = m
        .as_str()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-' || *c == '.')
        .collect();
    // Thousands separators: keep only the last '.' as decimal point if commas
    // were used as grouping (e.g. "1,234.56"); otherwise a lone "," is the
    // grouping separator and is simply dropped above.
    let Ok(amount) = Decimal::from_str(&digits) else {
        return Typed::failed(raw, "invalid_format");
    };

    if amount.is_sign_negative() && ctx.reject_negative_money {
        return Typed::failed(raw, "negative_amount_rejected");
    }

    let mut reasons = vec!["parsed_money".to_string()];
    let confidence = if explicit_currency {
        reasons.push("currency_detected".to_string());
        0.95
    } else {
        reasons.push("currency_defaulted".to_string());
        0.75
    };

    Typed {
        value: Some(serde_json::json!({ "amount": amount.to_string(), "currency": currency })),
        raw: raw.to_string(),
        confidence,
        reasons,
        errors: vec![],
    }
}
