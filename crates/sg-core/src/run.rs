use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sg_error::FailureCode;
use uuid::Uuid;

/// Executor class attempted for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Plain HTTP fetch, no JS execution.
    Http,
    /// Headless browser with session support.
    Browser,
    /// Remote paid scraping API.
    Provider,
}

/// Run lifecycle status. Transitions are a subset of the graph in the
/// orchestrator's state machine (no direct `queued -> completed`, etc).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Enqueued, not yet picked up by a worker.
    Queued,
    /// A worker is actively executing an attempt.
    Running,
    /// Paused on an open [`crate::Intervention`].
    WaitingForHuman,
    /// Terminal success.
    Completed,
    /// Terminal failure; `failure_code` is set.
    Failed,
    /// Terminal, cooperatively cancelled.
    Cancelled,
}

/// One row in a run's append-only `engine_attempts` log.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EngineAttempt {
    /// Tier used for this attempt.
    pub tier: Tier,
    /// When the attempt began.
    pub started_at: DateTime<Utc>,
    /// When the attempt ended, if it has.
    pub ended_at: Option<DateTime<Utc>>,
    /// Outcome classification, if terminal for this attempt.
    pub failure_code: Option<FailureCode>,
    /// Raw signal tokens observed (e.g. `"js_required"`, `"hard_block"`).
    pub signals: Vec<String>,
    /// Cost incurred (provider credits consumed; 0 for HTTP/BROWSER).
    pub cost: u32,
}

/// Aggregate statistics recorded on run completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RunStats {
    /// Records produced.
    pub items_extracted: u64,
    /// Wall-clock seconds from `run.started` to terminal state.
    pub execution_time_s: f64,
    /// Tier that produced the final commit.
    pub engine_used: Option<Tier>,
    /// Total provider credits spent across all attempts.
    pub total_cost: u32,
    /// Human-readable message for the last error, if the run failed.
    pub last_error_message: Option<String>,
}

/// Append-only history plus mutable current-state for one job execution.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Run {
    /// Unique identifier.
    pub id: Uuid,
    /// Job being executed.
    pub job_id: Uuid,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// 1-based attempt counter.
    pub attempt: u32,
    /// Append-only attempt log; at most 3 tiers per run regardless of mode.
    pub engine_attempts: Vec<EngineAttempt>,
    /// Tier that ultimately served the run, once resolved.
    pub resolved_strategy: Option<Tier>,
    /// Aggregate stats, populated on terminal states.
    pub stats: RunStats,
    /// Terminal failure code, set only when `status = Failed`.
    pub failure_code: Option<FailureCode>,
}

impl Run {
    /// Creates a freshly queued run for `job_id`.
    pub fn new(job_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            status: RunStatus::Queued,
            attempt: 0,
            engine_attempts: Vec::new(),
            resolved_strategy: None,
            stats: RunStats::default(),
            failure_code: None,
        }
    }

    /// `true` if both attempt-count and tier-count invariants from the
    /// testable-properties list hold.
    pub fn within_attempt_bounds(&self, max_attempts: u32) -> bool {
        self.attempt <= max_attempts && self.engine_attempts.len() <= 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_run_is_queued_with_no_attempts() {
        let run = Run::new(Uuid::new_v4());
        assert_eq!(run.status, RunStatus::Queued);
        assert_eq!(run.attempt, 0);
        assert!(run.engine_attempts.is_empty());
    }

    #[test]
    fn within_attempt_bounds_respects_both_limits() {
        let mut run = Run::new(Uuid::new_v4());
        run.attempt = 3;
        assert!(run.within_attempt_bounds(3));
        run.attempt = 4;
        assert!(!run.within_attempt_bounds(3));
    }
}
