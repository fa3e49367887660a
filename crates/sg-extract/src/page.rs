use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sg_core::Tier;
use sg_error::EngineError;

/// One fetched page, regardless of which tier produced it. Constructed by
/// the executor that performed the fetch; consumed by the Field Extractor
/// for both the initial page and any subsequent list/pagination pages
/// fetched mid-attempt.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Raw HTML body.
    pub html: String,
    /// URL the content was ultimately served from (post-redirect).
    pub final_url: String,
    /// HTTP status, if the tier surfaces one.
    pub http_status: Option<u16>,
    /// Tier that produced this page.
    pub engine: Tier,
    /// When the fetch completed.
    pub fetched_at: DateTime<Utc>,
}

/// Fetches additional pages mid-attempt (item detail pages, pagination
/// follow-ons) using whichever tier the current attempt is running at.
///
/// Implemented by a thin adapter over the chosen executor in `sg-executors`;
/// kept here as a trait so the Field Extractor's list-walk logic is
/// testable against a stub without spinning up real HTTP/browser I/O.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch `url` and return the resulting page, or an [`EngineError`]
    /// carrying the same failure taxonomy executors use.
    async fn fetch(&self, url: &str) -> Result<FetchedPage, EngineError>;
}
