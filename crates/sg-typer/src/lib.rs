//! The Value Typer: a deterministic `clean -> parse -> validate ->
//! normalize -> score` pipeline over the engine's closed [`FieldType`] set.
//!
//! Each type has its own pure parser module performing clean+parse+
//! normalize+intrinsic-score in one pass (mirroring how `sg-core`'s
//! [`Typed`] is a flat result rather than a staged builder); [`validate`]
//! applies the shared bounds/regex/allowed/required pass afterward. The one
//! entry point, [`type_value`], exhaustively dispatches on [`FieldType`] so
//! adding a variant to the enum is a compile error here until handled.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Whitespace/HTML cleaning helpers shared by every parser.
pub mod clean;
/// Ambient [`TypingContext`] consulted for region/timezone/currency
/// defaults and tracking-parameter/disposable-domain lists.
pub mod context;
/// Calendar date/time/datetime parsing and ISO-8601 normalization.
pub mod datetime;
/// Email address parsing and normalization.
pub mod email;
/// Person/company/job-title/category parsing.
pub mod identity;
/// Structured address, city/state/zip/country parsing.
pub mod location;
/// Monetary amount + currency parsing.
pub mod money;
/// Integer/decimal/number/percentage/rating parsing.
pub mod numeric;
/// Phone/mobile/fax parsing via E.164 normalization.
pub mod phone;
/// Plain string/text/html/boolean parsing.
pub mod text;
/// Generic URL / image URL parsing and tracking-parameter stripping.
pub mod url_type;
/// Shared post-parse validation (bounds, regex, allowed set, required).
pub mod validate;

pub use context::TypingContext;

use sg_core::{FieldType, SmartConfig, Typed, ValidationRules};

/// Runs the full `clean -> parse -> validate -> normalize -> score`
/// pipeline for one raw field value against its declared [`FieldType`].
///
/// `smart_config` carries type-specific options; today only the phone
/// family consults it (an optional `default_region` override), but the
/// parameter is threaded through every branch so future per-type options
/// don't require touching the dispatch signature again.
pub fn type_value(
    field_type: FieldType,
    raw: &str,
    smart_config: &SmartConfig,
    validation_rules: &ValidationRules,
    ctx: &TypingContext,
) -> Typed {
    let typed = match field_type {
        FieldType::String => text::type_string(raw),
        FieldType::Text => text::type_text(raw),
        FieldType::Html => text::type_html(raw),
        FieldType::Boolean => text::type_boolean(raw),
        FieldType::Integer => numeric::type_integer(raw),
        FieldType::Decimal => numeric::type_decimal(raw),
        FieldType::Number => numeric::type_number(raw),
        FieldType::Money => money::type_money(raw, ctx),
        FieldType::Percentage => numeric::type_percentage(raw),
        FieldType::Rating => numeric::type_rating(raw),
        FieldType::Date => datetime::type_date(raw, ctx),
        FieldType::Time => datetime::type_time(raw, ctx),
        FieldType::Datetime => datetime::type_datetime(raw, ctx),
        FieldType::Url => url_type::type_url(raw, ctx, false),
        FieldType::ImageUrl => url_type::type_url(raw, ctx, true),
        FieldType::Email => email::type_email(raw, ctx),
        FieldType::Phone | FieldType::Mobile | FieldType::Fax => {
            phone::type_phone(raw, &phone_context(smart_config, ctx))
        }
        FieldType::PersonName => identity::type_person_name(raw),
        FieldType::FirstName => identity::type_first_name(raw),
        FieldType::LastName => identity::type_last_name(raw),
        FieldType::Company => identity::type_company(raw),
        FieldType::JobTitle => identity::type_job_title(raw),
        FieldType::Address => location::type_address(raw),
        FieldType::City => location::type_city(raw),
        FieldType::State => location::type_state(raw),
        FieldType::ZipCode => location::type_zip_code(raw),
        FieldType::Country => location::type_country(raw),
        FieldType::Category => identity::type_category(raw),
    };
    validate::apply_validation_rules(typed, validation_rules)
}

/// Builds a [`TypingContext`] for phone parsing, applying a
/// `smart_config.default_region` override when present.
fn phone_context(smart_config: &SmartConfig, ctx: &TypingContext) -> TypingContext {
    let mut out = ctx.clone();
    if let Some(region) = smart_config.0.get("default_region").and_then(|v| v.as_str()) {
        out.default_phone_region = region.to_string();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sg_core::SmartConfig;

    #[test]
    fn dispatch_covers_email() {
        let t = type_value(
            FieldType::Email,
            "Jane@Example.com",
            &SmartConfig::default(),
            &ValidationRules::default(),
            &TypingContext::default(),
        );
        assert_eq!(t.value.unwrap(), serde_json::json!("Jane@example.com"));
    }

    #[test]
    fn dispatch_covers_money() {
        let t = type_value(
            FieldType::Money,
            "$19.99",
            &SmartConfig::default(),
            &ValidationRules::default(),
            &TypingContext::default(),
        );
        assert!(t.value.is_some());
    }

    #[test]
    fn phone_smart_config_overrides_default_region() {
        let cfg = SmartConfig(serde_json::json!({ "default_region": "GB" }));
        let t = type_value(
            FieldType::Phone,
            "020 7946 0958",
            &cfg,
            &ValidationRules::default(),
            &TypingContext::default(),
        );
        assert!(t.value.is_some());
    }

    #[test]
    fn idempotence_money_already_normalized() {
        let ctx = TypingContext::default();
        let rules = ValidationRules::default();
        let first = type_value(FieldType::Money, "$1,234.56", &SmartConfig::default(), &rules, &ctx);
        let normalized_raw = first.value.as_ref().unwrap()["amount"].as_str().unwrap().to_string();
        let second = type_value(FieldType::Decimal, &normalized_raw, &SmartConfig::default(), &rules, &ctx);
        assert!(second.value.is_some());
        assert!(second.confidence >= 0.0);
    }

    #[test]
    fn idempotence_email_round_trip_confidence_non_decreasing() {
        let ctx = TypingContext::default();
        let rules = ValidationRules::default();
        let first = type_value(FieldType::Email, "Jane.Doe@EXAMPLE.com", &SmartConfig::default(), &rules, &ctx);
        let normalized = first.value.as_ref().unwrap().as_str().unwrap().to_string();
        let second = type_value(FieldType::Email, &normalized, &SmartConfig::default(), &rules, &ctx);
        assert!(second.confidence >= first.confidence - 1e-9);
        assert_eq!(first.value, second.value);
    }
}
