use crate::field_map::FieldMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sg_error::{EngineError, FailureCode};
use std::collections::BTreeMap;
use url::Url;
use uuid::Uuid;

/// How a job traverses its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CrawlMode {
    /// Extract fields from a single fetched page.
    Single,
    /// Follow item links (and pagination) to extract one record per item.
    List,
}

/// Which executor tier a job is pinned to, or `Auto` to let the escalation
/// engine choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    /// Start at HTTP and allow escalation through BROWSER and PROVIDER.
    Auto,
    /// Pin to the HTTP executor; no escalation.
    Http,
    /// Pin to the browser executor; no escalation.
    Browser,
    /// Pin to the provider executor; no escalation.
    Provider,
}

/// List/pagination configuration, required iff `crawl_mode = list`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListConfig {
    /// Selector (CSS) yielding item detail-page links.
    pub item_links_selector: String,
    /// Selector (CSS) yielding the "next page" link, if any.
    pub pagination_selector: Option<String>,
    /// Stop following pagination after this many list pages.
    pub max_pages: u32,
    /// Stop following item links after this many items (0 = list page only).
    pub max_items: u32,
}

/// Stable browser fingerprint profile used by the browser executor.
///
/// Per-job values, when present, are authoritative over any process-wide
/// default profile.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BrowserProfile {
    /// User-Agent string.
    pub user_agent: String,
    /// Viewport width in CSS pixels.
    pub viewport_width: u32,
    /// Viewport height in CSS pixels.
    pub viewport_height: u32,
    /// BCP-47 locale, e.g. `"en-US"`.
    pub locale: String,
    /// IANA timezone, e.g. `"America/New_York"`.
    pub timezone: String,
    /// `"light"` or `"dark"`.
    pub color_scheme: String,
}

/// A declarative scrape job specification. Immutable once validated.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique identifier.
    pub id: Uuid,
    /// Canonical target URL (absolute, scheme http/https).
    pub target_url: String,
    /// Declared field names, unique and non-empty.
    pub fields: Vec<String>,
    /// Selector/type/validation configuration for each declared field,
    /// keyed by field name. The owning store is responsible for keeping
    /// this in lockstep with `fields`; [`Job::validate`] only checks that
    /// the two agree once both are in hand.
    pub field_maps: BTreeMap<String, FieldMap>,
    /// Single-page vs list traversal.
    pub crawl_mode: CrawlMode,
    /// List configuration; present iff `crawl_mode = List`.
    pub list_config: Option<ListConfig>,
    /// Whether the target requires authenticated session state.
    pub requires_auth: bool,
    /// Pinned tier, or `Auto`.
    pub engine_mode: EngineMode,
    /// Per-job browser fingerprint override.
    pub browser_profile: Option<BrowserProfile>,
    /// Freeform hint consulted by the escalation engine (e.g. a known-good
    /// starting tier for this domain).
    pub strategy_hint: Option<String>,
}

impl Job {
    /// Validates the invariants from the data model: absolute URL with an
    /// http(s) scheme, `list_config` present iff `crawl_mode = List`, and
    /// declared fields unique and non-empty.
    pub fn validate(&self) -> Result<(), EngineError> {
        let parsed = Url::parse(&self.target_url).map_err(|e| {
            EngineError::new(FailureCode::Unknown, "target_url is not a valid absolute URL")
                .with_source(e)
                .with_context("target_url", self.target_url.clone())
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(EngineError::new(
                FailureCode::Unknown,
                "target_url scheme must be http or https",
            )
            .with_context("scheme", parsed.scheme().to_string()));
        }

        match (self.crawl_mode, &self.list_config) {
            (CrawlMode::List, None) => {
                return Err(EngineError::new(
                    FailureCode::Unknown,
                    "crawl_mode=list requires list_config",
                ));
            }
            (CrawlMode::Single, Some(_)) => {
                return Err(EngineError::new(
                    FailureCode::Unknown,
                    "list_config is only valid when crawl_mode=list",
                ));
            }
            _ => {}
        }

        if self.fields.is_empty() {
            return Err(EngineError::new(
                FailureCode::Unknown,
                "job must declare at least one field",
            ));
        }
        let mut seen = std::collections::HashSet::with_capacity(self.fields.len());
        for f in &self.fields {
            if f.is_empty() {
                return Err(EngineError::new(FailureCode::Unknown, "field name is empty"));
            }
            if !seen.insert(f.as_str()) {
                return Err(EngineError::new(
                    FailureCode::Unknown,
                    "declared fields must be unique",
                )
                .with_context("field", f.clone()));
            }
            if !self.field_maps.contains_key(f) {
                return Err(EngineError::new(
                    FailureCode::Unknown,
                    "declared field has no field_maps entry",
                )
                .with_context("field", f.clone()));
            }
        }
        for name in self.field_maps.keys() {
            if !seen.contains(name.as_str()) {
                return Err(EngineError::new(
                    FailureCode::Unknown,
                    "field_maps entry does not match a declared field",
                )
                .with_context("field", name.clone()));
            }
        }
        Ok(())
    }
}
