//! The three executor tiers (C3 HTTP, C4 Browser, C5 Provider) behind one
//! narrow [`Executor`] trait, modeled on the same single-method contract a
//! run orchestrator dispatches against regardless of which backend actually
//! performs the work.
//!
//! Executors never propagate raw errors across this boundary: every path
//! returns an [`ExecutionOutcome`] carrying signals and an optional
//! [`FailureCode`], so the escalation engine is the sole authority on what
//! happens next. An executor that hits an unexpected internal error catches
//! it and reports `signals=[unknown]` rather than unwinding.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Headless-browser executor.
pub mod browser;
/// Plain HTTP executor.
pub mod http;
/// Paid-provider executor.
pub mod provider;

pub use browser::BrowserExecutor;
pub use http::HttpExecutor;
pub use provider::ProviderExecutor;

use async_trait::async_trait;
use sg_core::{Job, Tier};
use sg_error::FailureCode;
use sg_extract::page::FetchedPage;

/// Outcome of a single executor attempt, regardless of tier.
///
/// Exactly mirrors the `{records, signals, cost}` shape the error design
/// calls for, specialized here to the fetch step (the Field Extractor
/// produces records from `page` afterward).
#[derive(Debug, Clone)]
pub struct ExecutionOutcome<T> {
    /// The fetched artifact, if the executor got far enough to produce one
    /// (a page may still be present alongside a failure code, e.g. a
    /// blocked response whose body is still worth inspecting).
    pub page: Option<T>,
    /// Raw signal tokens observed during this attempt.
    pub signals: Vec<String>,
    /// Set when this attempt did not succeed outright.
    pub failure_code: Option<FailureCode>,
    /// Provider credits consumed (always 0 for HTTP/BROWSER).
    pub cost: u32,
    /// Optional diagnostic message, not shown to end users directly.
    pub message: Option<String>,
}

impl<T> ExecutionOutcome<T> {
    /// A successful fetch, optionally still carrying non-terminal signals
    /// (e.g. `js_required` alongside a page that happened to parse).
    pub fn success(page: T, signals: Vec<String>) -> Self {
        Self { page: Some(page), signals, failure_code: None, cost: 0, message: None }
    }

    /// A failed attempt with no page (or one to be attached via
    /// [`Self::with_page`]).
    pub fn failure(code: FailureCode, signals: Vec<String>) -> Self {
        Self { page: None, signals, failure_code: Some(code), cost: 0, message: None }
    }

    /// Attaches a fetched page to an otherwise-failed outcome.
    pub fn with_page(mut self, page: T) -> Self {
        self.page = Some(page);
        self
    }

    /// Attaches a diagnostic message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the provider-credit cost.
    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    /// `true` if this attempt produced a usable page despite any signals.
    pub fn is_success(&self) -> bool {
        self.failure_code.is_none()
    }
}

/// One executor tier's entry point. Implementations own whatever
/// tier-specific dependencies they need (an HTTP client, a session manager,
/// an API-key ledger) at construction time, so `execute` only ever needs
/// the job itself.
#[async_trait]
pub trait Executor: Send + Sync {
    /// The tier this implementation serves.
    fn tier(&self) -> Tier;

    /// Executes one attempt for `job`, returning the raw fetched page (the
    /// Field Extractor runs separately, after this returns).
    async fn execute(&self, job: &Job) -> ExecutionOutcome<FetchedPage>;
}

#[async_trait]
impl Executor for HttpExecutor {
    fn tier(&self) -> Tier {
        Tier::Http
    }

    async fn execute(&self, job: &Job) -> ExecutionOutcome<FetchedPage> {
        let ua = job.browser_profile.as_ref().map(|p| p.user_agent.as_str());
        self.fetch(&job.target_url, ua).await
    }
}

#[async_trait]
impl Executor for BrowserExecutor {
    fn tier(&self) -> Tier {
        Tier::Browser
    }

    async fn execute(&self, job: &Job) -> ExecutionOutcome<FetchedPage> {
        self.execute(job).await
    }
}

#[async_trait]
impl Executor for ProviderExecutor {
    fn tier(&self) -> Tier {
        Tier::Provider
    }

    async fn execute(&self, job: &Job) -> ExecutionOutcome<FetchedPage> {
        self.execute(&job.target_url).await
    }
}
