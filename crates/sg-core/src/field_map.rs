use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Closed set of value types the typer can produce. See `sg-typer` for the
/// per-type clean/parse/validate/normalize/score contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Opaque short text, minimally cleaned.
    String,
    /// Longer free text.
    Text,
    /// Raw HTML fragment, not stripped.
    Html,
    /// `true`/`false`.
    Boolean,
    /// Whole number.
    Integer,
    /// Arbitrary-precision decimal.
    Decimal,
    /// Floating-point number.
    Number,
    /// `{amount, currency}` pair.
    Money,
    /// A `%` value.
    Percentage,
    /// A star/numeric rating.
    Rating,
    /// Calendar date, no time component.
    Date,
    /// Time of day, no date component.
    Time,
    /// Combined date and time.
    Datetime,
    /// Generic URL.
    Url,
    /// URL known to reference an image.
    ImageUrl,
    /// Email address.
    Email,
    /// Landline or general phone number.
    Phone,
    /// Mobile phone number.
    Mobile,
    /// Fax number.
    Fax,
    /// Full person name.
    PersonName,
    /// Given name.
    FirstName,
    /// Family name.
    LastName,
    /// Organization name.
    Company,
    /// Job/role title.
    JobTitle,
    /// Unstructured postal address.
    Address,
    /// City name.
    City,
    /// State/region.
    State,
    /// Postal/ZIP code.
    ZipCode,
    /// Country name or code.
    Country,
    /// Free-form category/tag.
    Category,
}

/// Whether a selector targets an element's text content or an attribute.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SelectorTarget {
    /// Concatenate descendant text.
    Text,
    /// Read the named attribute.
    Attribute {
        /// Attribute name, e.g. `"href"`.
        name: String,
    },
}

/// A selector expression plus how to read matched elements.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SelectorSpec {
    /// CSS selector string evaluated against the DOM.
    ///
    /// Only CSS selectors are implemented; an XPath-looking expression is
    /// rejected at extraction time with a clear error rather than silently
    /// misbehaving.
    pub selector: String,
    /// Text vs. attribute extraction.
    pub target: SelectorTarget,
    /// If true, evaluate the selector to a list of matches; otherwise take
    /// the first.
    pub all: bool,
    /// Optional regex whose capture group 1 is extracted from the raw
    /// matched string before typing.
    pub capture_regex: Option<String>,
}

/// Type-specific options consulted during parse/normalize (e.g. a default
/// phone region, a money currency hint, a date timezone). Kept as a JSON
/// blob since its shape depends on `field_type`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SmartConfig(pub serde_json::Value);

/// Validation constraints applied after parsing, before normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ValidationRules {
    /// Record-level rejection occurs if this field is required and null.
    pub required: bool,
    /// Inclusive lower bound for numeric/date types.
    pub min: Option<f64>,
    /// Inclusive upper bound for numeric/date types.
    pub max: Option<f64>,
    /// Pattern the normalized value must match.
    pub regex: Option<String>,
    /// Closed set of allowed normalized values.
    pub allowed: Option<Vec<String>>,
}

/// One field's selector + typing configuration, scoped to a single
/// `(job, field_name)` pair. A mapping with no [`SelectorSpec`] is rejected
/// at save time (enforced by the owning store, not this type).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FieldMap {
    /// Declared job field this map applies to.
    pub field_name: String,
    /// Selector used to locate the raw value.
    pub selector: SelectorSpec,
    /// Target type for the value typer.
    pub field_type: FieldType,
    /// Type-specific options.
    pub smart_config: SmartConfig,
    /// Post-parse validation constraints.
    pub validation_rules: ValidationRules,
}
