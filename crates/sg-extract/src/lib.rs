//! The Field Extractor: evaluates selectors against a fetched
//! artifact, walks list/pagination sequences, and invokes the Value Typer
//! on every raw match.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Fetched-page type and the mid-attempt page-fetching contract.
pub mod page;
/// CSS selector evaluation against a parsed document.
pub mod selector;

pub use page::{FetchedPage, PageSource};

use scraper::Html;
use sg_core::{FieldMap, Record, RecordMeta, SelectorTarget};
use sg_error::EngineError;
use sg_typer::TypingContext;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Cap on follow-on fetches within one extraction pass, independent of
/// `max_items`/`max_pages`; a defensive backstop against a selector that
/// accidentally loops (e.g. a "next" link pointing back at itself).
const ABSOLUTE_FOLLOW_CAP: u32 = 2_000;

/// Result of running the extractor over one attempt's fetched content.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    /// Records produced (zero or more).
    pub records: Vec<Record>,
    /// Signals observed during extraction (e.g. `"extraction_empty"`).
    pub signals: Vec<String>,
    /// Detail/list pages actually fetched, for cost/diagnostic accounting.
    pub pages_fetched: u32,
}

impl ExtractionOutcome {
    fn signal_extraction_empty_if_no_field_resolved(&mut self) {
        let any_resolved = self
            .records
            .iter()
            .any(|r| r.data.values().any(|v| v.is_some()));
        if self.records.is_empty() || !any_resolved {
            self.signals.push(sg_core::signal::EXTRACTION_EMPTY.to_string());
        }
    }
}

/// Evaluates a job's declared [`FieldMap`]s against fetched content.
pub struct FieldExtractor<'a> {
    field_maps: &'a BTreeMap<String, FieldMap>,
    ctx: &'a TypingContext,
}

impl<'a> FieldExtractor<'a> {
    /// Builds an extractor over `field_maps` (keyed by declared field name)
    /// and the ambient typing context.
    pub fn new(field_maps: &'a BTreeMap<String, FieldMap>, ctx: &'a TypingContext) -> Self {
        Self { field_maps, ctx }
    }

    /// Evaluates every field map against `doc`, typing each raw match.
    /// Returns `None` if not a single field resolved to a non-empty raw
    /// value (the "at least one field resolves" condition for
    /// single-page extraction).
    fn extract_fields(&self, doc: &Html) -> Option<BTreeMap<String, sg_core::Typed>> {
        let mut out = BTreeMap::new();
        let mut any_raw_match = false;

        for (field_name, map) in self.field_maps {
            let matches = match selector::evaluate(doc, &map.selector) {
                Ok(m) => m,
                Err(e) => {
                    warn!(target: "sg.extract", field = %field_name, error = %e, "selector evaluation failed");
                    out.insert(field_name.clone(), sg_core::Typed::failed("", "selector_error"));
                    continue;
                }
            };

            if map.selector.all {
                // `all=true` fields are typed per-match and joined with a
                // newline for single-value storage; the individual matches
                // and their evidence remain visible via `reasons`.
                if matches.is_empty() {
                    out.insert(field_name.clone(), sg_core::Typed::failed("", "no_match"));
                    continue;
                }
                any_raw_match = true;
                let cleaned_target_is_text = matches!(map.selector.target, SelectorTarget::Text);
                let joined = matches.join(if cleaned_target_is_text { "\n" } else { ", " });
                let typed = sg_typer::type_value(
                    map.field_type,
                    &joined,
                    &map.smart_config,
                    &map.validation_rules,
                    self.ctx,
                );
                out.insert(field_name.clone(), typed);
            } else if let Some(raw) = matches.into_iter().next() {
                any_raw_match = true;
                let typed = sg_typer::type_value(
                    map.field_type,
                    &raw,
                    &map.smart_config,
                    &map.validation_rules,
                    self.ctx,
                );
                out.insert(field_name.clone(), typed);
            } else {
                out.insert(field_name.clone(), sg_core::Typed::failed("", "no_match"));
            }
        }

        if any_raw_match { Some(out) } else { None }
    }

    /// Extracts zero-or-one record from a single page (`crawl_mode=single`).
    pub fn extract_single_page(
        &self,
        run_id: Uuid,
        page: &FetchedPage,
    ) -> ExtractionOutcome {
        let doc = Html::parse_document(&page.html);
        let mut outcome = ExtractionOutcome {
            pages_fetched: 1,
            ..Default::default()
        };

        if let Some(fields) = self.extract_fields(&doc) {
            let meta = RecordMeta {
                url: page.final_url.clone(),
                engine: page.engine,
                fetched_at: page.fetched_at,
                http_status: page.http_status,
            };
            outcome
                .records
                .push(Record::from_typed(Uuid::new_v4(), run_id, fields, meta));
        }

        outcome.signal_extraction_empty_if_no_field_resolved();
        outcome
    }

    /// Walks a `crawl_mode=list` job: list pages via `pagination_selector`
    /// up to `max_pages`, item detail pages via `item_links_selector` up to
    /// `max_items`. `max_items=0` extracts straight from the list page(s)
    /// without producing any detail records, per the boundary behavior in
    /// the testable-properties list.
    ///
    /// A failed follow-on fetch never discards records already extracted
    /// earlier in the same call: a failed item detail fetch is logged and
    /// skipped so the remaining items still get a chance, and a failed
    /// pagination fetch simply stops paginating and returns what's been
    /// accumulated so far, successfully, rather than propagating the error.
    pub async fn extract_list(
        &self,
        run_id: Uuid,
        first_page: FetchedPage,
        item_links_selector: &str,
        pagination_selector: Option<&str>,
        max_pages: u32,
        max_items: u32,
        source: Arc<dyn PageSource>,
    ) -> Result<ExtractionOutcome, EngineError> {
        let mut outcome = ExtractionOutcome::default();
        let mut visited_urls: BTreeSet<String> = BTreeSet::new();
        let mut items_fetched: u32 = 0;
        let mut pages_fetched: u32 = 0;

        let mut current = Some(first_page);
        let mut page_index = 0u32;

        while let Some(page) = current.take() {
            pages_fetched += 1;
            let doc = Html::parse_document(&page.html);

            if max_items > 0 {
                let link_spec = sg_core::SelectorSpec {
                    selector: item_links_selector.to_string(),
                    target: SelectorTarget::Attribute { name: "href".to_string() },
                    all: true,
                    capture_regex: None,
                };
                let hrefs = selector::evaluate(&doc, &link_spec)?;

                for href in hrefs {
                    if items_fetched >= max_items || pages_fetched >= ABSOLUTE_FOLLOW_CAP {
                        break;
                    }
                    let Some(absolute) = resolve_url(&page.final_url, &href) else {
                        continue;
                    };
                    let normalized = normalize_url(&absolute);
                    if !visited_urls.insert(normalized) {
                        continue;
                    }

                    let detail = match source.fetch(&absolute).await {
                        Ok(detail) => detail,
                        Err(e) => {
                            warn!(target: "sg.extract", url = %absolute, error = %e, "item detail fetch failed, skipping");
                            continue;
                        }
                    };
                    pages_fetched += 1;
                    items_fetched += 1;
                    let item_doc = Html::parse_document(&detail.html);
                    if let Some(fields) = self.extract_fields(&item_doc) {
                        let meta = RecordMeta {
                            url: detail.final_url.clone(),
                            engine: detail.engine,
                            fetched_at: detail.fetched_at,
                            http_status: detail.http_status,
                        };
                        outcome
                            .records
                            .push(Record::from_typed(Uuid::new_v4(), run_id, fields, meta));
                    }
                }
            } else {
                // max_items=0: extract directly from the list page itself.
                if let Some(fields) = self.extract_fields(&doc) {
                    let meta = RecordMeta {
                        url: page.final_url.clone(),
                        engine: page.engine,
                        fetched_at: page.fetched_at,
                        http_status: page.http_status,
                    };
                    outcome
                        .records
                        .push(Record::from_typed(Uuid::new_v4(), run_id, fields, meta));
                }
            }

            page_index += 1;
            if page_index >= max_pages {
                break;
            }
            if items_fetched >= max_items && max_items > 0 {
                break;
            }

            let Some(pagination_selector) = pagination_selector else {
                break;
            };
            let pag_spec = sg_core::SelectorSpec {
                selector: pagination_selector.to_string(),
                target: SelectorTarget::Attribute { name: "href".to_string() },
                all: false,
                capture_regex: None,
            };
            let Some(next_href) = selector::evaluate_first(&doc, &pag_spec)? else {
                break;
            };
            let Some(next_url) = resolve_url(&page.final_url, &next_href) else {
                break;
            };
            if !visited_urls.insert(normalize_url(&next_url)) {
                debug!(target: "sg.extract", url = %next_url, "pagination cycle detected, stopping");
                break;
            }
            current = match source.fetch(&next_url).await {
                Ok(page) => Some(page),
                Err(e) => {
                    warn!(target: "sg.extract", url = %next_url, error = %e, "pagination fetch failed, stopping");
                    None
                }
            };
        }

        outcome.pages_fetched = pages_fetched;
        outcome.signal_extraction_empty_if_no_field_resolved();
        Ok(outcome)
    }
}

/// Resolves a (possibly relative) href against the page it was found on.
fn resolve_url(base: &str, href: &str) -> Option<String> {
    let base_url = url::Url::parse(base).ok()?;
    base_url.join(href).ok().map(|u| u.to_string())
}

/// Canonicalizes a URL for run-scoped dedup: lowercases host, strips a
/// trailing slash and fragment.
fn normalize_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut u) => {
            u.set_fragment(None);
            let mut s = u.to_string();
            if s.ends_with('/') && u.path() == "/" {
                s.pop();
            }
            s.to_lowercase()
        }
        Err(_) => raw.to_lowercase(),
    }
}

/// Dedup key for records with no explicit dedup key configured: full
/// `data` map equality via a stable JSON serialization.
pub fn default_dedup_key(record: &Record) -> String {
    serde_json::to_string(&record.data).unwrap_or_default()
}

/// Filters `records` to those whose declared-mandatory fields ("required"
/// validation rule) are non-null, per the record-level rejection
/// policy: "a required field missing causes record-level rejection only if
/// the Field Extractor marks it mandatory for the crawl."
pub fn drop_records_missing_required_fields(
    records: Vec<Record>,
    field_maps: &BTreeMap<String, FieldMap>,
) -> Vec<Record> {
    let required: Vec<&str> = field_maps
        .iter()
        .filter(|(_, m)| m.validation_rules.required)
        .map(|(name, _)| name.as_str())
        .collect();
    if required.is_empty() {
        return records;
    }
    records
        .into_iter()
        .filter(|r| required.iter().all(|f| matches!(r.data.get(*f), Some(Some(_)))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use sg_core::{FieldType, SelectorSpec, SelectorTarget, SmartConfig, ValidationRules};
    use sg_error::FailureCode;
    use std::sync::Mutex;

    fn field_map(selector: &str, field_type: FieldType, all: bool) -> FieldMap {
        FieldMap {
            field_name: "f".to_string(),
            selector: SelectorSpec {
                selector: selector.to_string(),
                target: SelectorTarget::Text,
                all,
                capture_regex: None,
            },
            field_type,
            smart_config: SmartConfig::default(),
            validation_rules: ValidationRules::default(),
        }
    }

    fn page(html: &str, url: &str) -> FetchedPage {
        FetchedPage {
            html: html.to_string(),
            final_url: url.to_string(),
            http_status: Some(200),
            engine: sg_core::Tier::Http,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn single_page_extracts_one_record() {
        let mut maps = BTreeMap::new();
        maps.insert("title".to_string(), field_map("h1", FieldType::String, false));
        let ctx = TypingContext::default();
        let extractor = FieldExtractor::new(&maps, &ctx);
        let p = page("<html><body><h1>Example Domain</h1></body></html>", "https://example.com");
        let outcome = extractor.extract_single_page(Uuid::new_v4(), &p);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(
            outcome.records[0].data["title"],
            Some(serde_json::json!("Example Domain"))
        );
        assert!(outcome.signals.is_empty());
    }

    #[test]
    fn single_page_with_no_matches_signals_extraction_empty() {
        let mut maps = BTreeMap::new();
        maps.insert("title".to_string(), field_map("h1", FieldType::String, false));
        let ctx = TypingContext::default();
        let extractor = FieldExtractor::new(&maps, &ctx);
        let p = page("<html><body><p>no heading here</p></body></html>", "https://example.com");
        let outcome = extractor.extract_single_page(Uuid::new_v4(), &p);
        assert!(outcome.records.is_empty());
        assert!(outcome.signals.contains(&"extraction_empty".to_string()));
    }

    struct StubSource {
        pages: Mutex<BTreeMap<String, FetchedPage>>,
    }

    #[async_trait]
    impl PageSource for StubSource {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, EngineError> {
            self.pages
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| EngineError::new(FailureCode::Network, "no such page"))
        }
    }

    #[tokio::test]
    async fn list_mode_follows_item_links_and_pagination() {
        let mut maps = BTreeMap::new();
        maps.insert("title".to_string(), field_map("h1", FieldType::String, false));
        let ctx = TypingContext::default();
        let extractor = FieldExtractor::new(&maps, &ctx);

        let list_page = page(
            r#"<html><body>
                <h3><a href="/item1">Item 1</a></h3>
                <h3><a href="/item2">Item 2</a></h3>
                <li class="next"><a href="/page2">Next</a></li>
               </body></html>"#,
            "https://shop.example.com/list",
        );
        let page2 = page(
            r#"<html><body><h3><a href="/item3">Item 3</a></h3></body></html>"#,
            "https://shop.example.com/page2",
        );
        let item1 = page("<html><body><h1>Widget One</h1></body></html>", "https://shop.example.com/item1");
        let item2 = page("<html><body><h1>Widget Two</h1></body></html>", "https://shop.example.com/item2");
        let item3 = page("<html><body><h1>Widget Three</h1></body></html>", "https://shop.example.com/item3");

        let mut pages = BTreeMap::new();
        pages.insert("https://shop.example.com/page2".to_string(), page2);
        pages.insert("https://shop.example.com/item1".to_string(), item1);
        pages.insert("https://shop.example.com/item2".to_string(), item2);
        pages.insert("https://shop.example.com/item3".to_string(), item3);
        let source: Arc<dyn PageSource> = Arc::new(StubSource { pages: Mutex::new(pages) });

        let outcome = extractor
            .extract_list(Uuid::new_v4(), list_page, "h3>a", Some("li.next>a"), 2, 20, source)
            .await
            .unwrap();

        assert_eq!(outcome.records.len(), 3);
    }

    #[tokio::test]
    async fn item_fetch_failure_is_skipped_without_losing_other_records() {
        let mut maps = BTreeMap::new();
        maps.insert("title".to_string(), field_map("h1", FieldType::String, false));
        let ctx = TypingContext::default();
        let extractor = FieldExtractor::new(&maps, &ctx);

        let list_page = page(
            r#"<html><body>
                <h3><a href="/item1">Item 1</a></h3>
                <h3><a href="/missing">Missing</a></h3>
                <h3><a href="/item2">Item 2</a></h3>
               </body></html>"#,
            "https://shop.example.com/list",
        );
        let item1 = page("<html><body><h1>Widget One</h1></body></html>", "https://shop.example.com/item1");
        let item2 = page("<html><body><h1>Widget Two</h1></body></html>", "https://shop.example.com/item2");

        let mut pages = BTreeMap::new();
        pages.insert("https://shop.example.com/item1".to_string(), item1);
        pages.insert("https://shop.example.com/item2".to_string(), item2);
        // "/missing" is deliberately absent so StubSource::fetch errors on it.
        let source: Arc<dyn PageSource> = Arc::new(StubSource { pages: Mutex::new(pages) });

        let outcome = extractor
            .extract_list(Uuid::new_v4(), list_page, "h3>a", None, 1, 20, source)
            .await
            .unwrap();

        assert_eq!(outcome.records.len(), 2);
    }

    #[tokio::test]
    async fn pagination_fetch_failure_returns_records_from_pages_already_fetched() {
        let mut maps = BTreeMap::new();
        maps.insert("title".to_string(), field_map("h1", FieldType::String, false));
        let ctx = TypingContext::default();
        let extractor = FieldExtractor::new(&maps, &ctx);

        let list_page = page(
            r#"<html><body>
                <h3><a href="/item1">Item 1</a></h3>
                <li class="next"><a href="/page2">Next</a></li>
               </body></html>"#,
            "https://shop.example.com/list",
        );
        let item1 = page("<html><body><h1>Widget One</h1></body></html>", "https://shop.example.com/item1");

        let mut pages = BTreeMap::new();
        pages.insert("https://shop.example.com/item1".to_string(), item1);
        // "/page2" is deliberately absent so the pagination fetch errors.
        let source: Arc<dyn PageSource> = Arc::new(StubSource { pages: Mutex::new(pages) });

        let outcome = extractor
            .extract_list(Uuid::new_v4(), list_page, "h3>a", Some("li.next>a"), 2, 20, source)
            .await
            .unwrap();

        assert_eq!(outcome.records.len(), 1);
    }

    #[tokio::test]
    async fn max_items_zero_extracts_from_list_page_without_detail_records() {
        let mut maps = BTreeMap::new();
        maps.insert("title".to_string(), field_map("h1", FieldType::String, false));
        let ctx = TypingContext::default();
        let extractor = FieldExtractor::new(&maps, &ctx);

        let list_page = page(
            r#"<html><body><h1>Listing Page</h1><h3><a href="/item1">Item 1</a></h3></body></html>"#,
            "https://shop.example.com/list",
        );
        let source: Arc<dyn PageSource> = Arc::new(StubSource { pages: Mutex::new(BTreeMap::new()) });

        let outcome = extractor
            .extract_list(Uuid::new_v4(), list_page, "h3>a", None, 1, 0, source)
            .await
            .unwrap();

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(
            outcome.records[0].data["title"],
            Some(serde_json::json!("Listing Page"))
        );
    }

    #[test]
    fn dedup_key_is_stable_for_identical_data() {
        let meta = RecordMeta {
            url: "https://example.com".to_string(),
            engine: sg_core::Tier::Http,
            fetched_at: Utc::now(),
            http_status: Some(200),
        };
        let mut fields = BTreeMap::new();
        fields.insert(
            "title".to_string(),
            sg_core::Typed {
                value: Some(serde_json::json!("x")),
                raw: "x".to_string(),
                confidence: 0.9,
                reasons: vec![],
                errors: vec![],
            },
        );
        let r1 = Record::from_typed(Uuid::new_v4(), Uuid::new_v4(), fields.clone(), meta.clone());
        let r2 = Record::from_typed(Uuid::new_v4(), Uuid::new_v4(), fields, meta);
        assert_eq!(default_dedup_key(&r1), default_dedup_key(&r2));
    }

    #[test]
    fn drops_records_missing_required_fields() {
        let mut maps = BTreeMap::new();
        let mut fm = field_map("h1", FieldType::String, false);
        fm.validation_rules.required = true;
        maps.insert("title".to_string(), fm);

        let meta = RecordMeta {
            url: "https://example.com".to_string(),
            engine: sg_core::Tier::Http,
            fetched_at: Utc::now(),
            http_status: Some(200),
        };
        let mut missing = BTreeMap::new();
        missing.insert("title".to_string(), sg_core::Typed::failed("", "no_match"));
        let rejected = Record::from_typed(Uuid::new_v4(), Uuid::new_v4(), missing, meta.clone());

        let mut present = BTreeMap::new();
        present.insert(
            "title".to_string(),
            sg_core::Typed {
                value: Some(serde_json::json!("ok")),
                raw: "ok".to_string(),
                confidence: 0.9,
                reasons: vec![],
                errors: vec![],
            },
        );
        let kept = Record::from_typed(Uuid::new_v4(), Uuid::new_v4(), present, meta);

        let out = drop_records_missing_required_fields(vec![rejected, kept], &maps);
        assert_eq!(out.len(), 1);
    }
}
