use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of an opened [`Intervention`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum InterventionStatus {
    /// Awaiting external resolution.
    Pending,
    /// Resolved; the owning run may resume.
    Resolved,
    /// Abandoned without resolution.
    Cancelled,
}

/// An opt-out hook raised when the engine cannot proceed without human
/// input (e.g. the provider ledger is exhausted). Raising one transitions
/// the owning run to `waiting_for_human` and pauses it; resolution posts
/// new session data and re-enqueues the run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Intervention {
    /// Unique identifier.
    pub id: Uuid,
    /// Run this intervention pauses.
    pub run_id: Uuid,
    /// Kind of intervention requested (e.g. `"provide_session"`,
    /// `"provide_provider_key"`).
    pub r#type: String,
    /// Human-readable reason it was raised.
    pub reason: String,
    /// Relative priority, higher is more urgent.
    pub priority: u8,
    /// Current status.
    pub status: InterventionStatus,
}
