//! Data model for the scraping control plane.
//!
//! Every entity here is `Serialize + Deserialize` with `chrono::DateTime<Utc>`
//! timestamps and `uuid::Uuid` identifiers. These types are the wire/storage
//! contract shared by every other crate in the workspace; none of them embed
//! behavior beyond small invariant checks and derived values.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Provider API-key ledger entries.
pub mod api_key;
/// Per-(job, field) selector and typing configuration.
pub mod field_map;
/// Human-in-the-loop pause/resume hook.
pub mod intervention;
/// Declarative scrape job specification.
pub mod job;
/// Extracted items and their evidence.
pub mod record;
/// Run lifecycle state and append-only event log.
pub mod run;
/// In-memory browser session lifecycle object.
pub mod session;
/// Canonical raw signal tokens shared by executors, the extractor, and the
/// escalation engine.
pub mod signal;
/// Typed-value output shared between the extractor and the value typer.
pub mod typed;

pub use api_key::ApiKey;
pub use field_map::{FieldMap, FieldType, SelectorSpec, SelectorTarget, SmartConfig, ValidationRules};
pub use intervention::{Intervention, InterventionStatus};
pub use job::{BrowserProfile, CrawlMode, EngineMode, Job, ListConfig};
pub use record::{Record, RecordMeta};
pub use run::{EngineAttempt, Run, RunStats, RunStatus, Tier};
pub use session::{Cookie, Session, SessionKey};
pub use typed::Typed;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of a [`run::RunEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    /// Routine progress.
    Info,
    /// Recoverable anomaly worth surfacing.
    Warn,
    /// Terminal or user-facing failure.
    Error,
}

/// A single entry in a run's append-only event log, fanned out to
/// subscribers over the pub/sub channel.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunEvent {
    /// Owning run.
    pub run_id: Uuid,
    /// Monotonic per-run sequence number (event stream is at-least-once;
    /// subscribers dedupe on `(run_id, seq)`).
    pub seq: u64,
    /// Wall-clock time the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// Severity.
    pub level: EventLevel,
    /// Human-readable message.
    pub message: String,
    /// Structured payload (shape depends on the lifecycle event kind).
    pub meta: serde_json::Value,
}
