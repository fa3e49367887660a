/// Ambient context the typer consults when a raw value is ambiguous without
/// it (a bare national-format phone number, a date with no explicit year,
/// a currency-less money string).
#[derive(Debug, Clone)]
pub struct TypingContext {
    /// Default region for phone numbers lacking a country code, e.g. `"US"`.
    pub default_phone_region: String,
    /// Default IANA timezone applied to dates/times with no offset.
    pub default_timezone: String,
    /// Default ISO-4217 currency applied when a money value has no symbol
    /// or code and none can be inferred.
    pub default_currency: String,
    /// Force `http://` URLs to `https://` during normalization.
    pub force_https: bool,
    /// Reject negative money amounts outright instead of accepting them.
    pub reject_negative_money: bool,
    /// Known disposable-email domains; matches degrade confidence instead
    /// of failing outright.
    pub disposable_email_domains: Vec<String>,
    /// Query parameter names stripped from URLs during normalization.
    pub tracking_query_params: Vec<String>,
}

impl Default for TypingContext {
    fn default() -> Self {
        Self {
            default_phone_region: "US".to_string(),
            default_timezone: "UTC".to_string(),
            default_currency: "USD".to_string(),
            force_https: false,
            reject_negative_money: true,
            disposable_email_domains: vec![
                "mailinator.com".to_string(),
                "tempmail.com".to_string(),
                "10minutemail.com".to_string(),
                "guerrillamail.com".to_string(),
            ],
            tracking_query_params: vec![
                "utm_source".to_string(),
                "utm_medium".to_string(),
                "utm_campaign".to_string(),
                "utm_term".to_string(),
                "utm_content".to_string(),
                "fbclid".to_string(),
                "gclid".to_string(),
                "ref".to_string(),
            ],
        }
    }
}
