//! The Escalation Engine: decides the next engine tier for a run,
//! classifies attempt signals, and drives the per-run state machine
//! described in the data model's `Run.status` transitions.
//!
//! [`decide`] is the single entry point. It is a pure function over a
//! [`Run`]'s history (the attempt that just finished must already be
//! appended to `run.engine_attempts`), the owning [`Job`], and a small
//! [`EscalationContext`] carrying facts the run history alone doesn't
//! record (attempt budget, provider credit cap, whether the last attempt's
//! session was a trusted reuse). It never performs I/O and never mutates
//! its inputs — the orchestrator (`sg-runtime`) is the sole authority on
//! applying the returned [`Decision`] to persisted state.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use sg_core::signal;
use sg_core::{EngineMode, Job, Run, Tier};
use sg_error::FailureCode;

/// Facts about the run/attempt that aren't captured by [`Run`] alone.
#[derive(Debug, Clone, Copy)]
pub struct EscalationContext {
    /// Total attempts allowed across all tiers for this run.
    pub max_attempts: u32,
    /// Cumulative provider-credit cap per run, if configured.
    pub provider_credits_cap: Option<u32>,
    /// Whether the attempt that just finished reused a trusted (already
    /// existing) session, as opposed to capturing a brand-new one. Used
    /// for the BROWSER→PROVIDER tie-break that marks a reused session as
    /// a failure before escalating away from it.
    pub session_reused_and_trusted: bool,
    /// Whether the attempt that just finished produced at least one
    /// record with at least one non-null field. Not stored on
    /// [`sg_core::run::EngineAttempt`] itself since only the caller (who
    /// ran the Field Extractor) knows it.
    pub had_records: bool,
}

/// What the orchestrator should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Persist the produced records and finish the run successfully.
    Commit,
    /// Re-attempt at the same tier (e.g. after a timeout or 5xx).
    RetrySameTier,
    /// Move to a higher-cost tier.
    Escalate {
        /// Tier to attempt next.
        next_tier: Tier,
        /// If `true`, the orchestrator must call
        /// `SessionManager::mark_failure` for the session used by the
        /// attempt that just finished *before* escalating, per the
        /// BROWSER `extraction_empty`-with-trusted-session tie-break.
        retire_session_first: bool,
    },
    /// No further attempts; the run is terminally failed.
    TerminalFail {
        /// Failure code to record on the run.
        code: FailureCode,
    },
    /// Pause the run for human input (e.g. the provider ledger is
    /// exhausted and no escalation path remains).
    Intervention {
        /// Human-readable reason, persisted on the raised
        /// [`sg_core::Intervention`].
        reason: String,
    },
}

/// Decides the next step after an attempt completes.
///
/// `run.engine_attempts` must already include the attempt that just ran;
/// `run.attempt` must already reflect the attempt count taken so far
/// (1-based). This function reads but never writes either field.
pub fn decide(run: &Run, job: &Job, ctx: &EscalationContext) -> Decision {
    let Some(last) = run.engine_attempts.last() else {
        // Nothing has run yet; the orchestrator should have called
        // `first_tier` instead. Defensive fallback: start at the first
        // tier for this job's mode.
        return match first_tier(job) {
            Some(tier) => Decision::Escalate { next_tier: tier, retire_session_first: false },
            None => Decision::TerminalFail { code: FailureCode::Unknown },
        };
    };

    let signals: Vec<&str> = last.signals.iter().map(String::as_str).collect();
    let has = |token: &str| signals.contains(&token);

    // Ledger exhaustion and a positive provider hard-block are unconditional,
    // independent of attempt/tier budgets.
    if last.tier == Tier::Provider && has(signal::HARD_BLOCK) {
        return Decision::TerminalFail { code: FailureCode::HardBlock };
    }
    if has(signal::NO_PROVIDER_KEY) {
        return Decision::Intervention {
            reason: "provider ledger exhausted: no active key with remaining credit".to_string(),
        };
    }
    if consecutive_provider_blocks(run) >= 2 {
        return Decision::TerminalFail { code: FailureCode::Blocked };
    }

    let allowed = allowed_tiers(job.engine_mode);
    let budget_exhausted = run.attempt >= ctx.max_attempts;
    let tier_cap_hit = run.engine_attempts.len() >= 3;

    // A commit can still be overridden by a signal that says the content
    // just extracted can't be trusted (e.g. a JS-gated page that happened
    // to yield a stray partial match) — but only when there's somewhere
    // left to escalate to; otherwise the partial result is all there is.
    if ctx.had_records {
        let overridable = matches!(last.tier, Tier::Http)
            && (has(signal::JS_REQUIRED) || has(signal::BLOCKED));
        let overridable = overridable
            || (matches!(last.tier, Tier::Browser)
                && (has(signal::HARD_BLOCK) || has(signal::NAVIGATION_FAILED) || has(signal::CAPTCHA)));
        let can_escalate = !budget_exhausted && !tier_cap_hit && next_tier_for(last.tier, allowed).is_some();
        if !(overridable && can_escalate) {
            return Decision::Commit;
        }
    }

    let retryable = has(signal::TIMEOUT) || has(signal::NETWORK) || has(signal::BAD_RESPONSE);
    let same_tier_run_length = run
        .engine_attempts
        .iter()
        .rev()
        .take_while(|a| a.tier == last.tier)
        .count();

    match last.tier {
        Tier::Http => {
            let escalate_trigger = has(signal::JS_REQUIRED)
                || has(signal::EXTRACTION_EMPTY)
                || has(signal::BLOCKED);
            if escalate_trigger {
                // Tie-break: blocked + js_required both present -> BROWSER,
                // never straight to PROVIDER, because session state may fix it.
                return escalate_or_fail(Tier::Browser, allowed, budget_exhausted, tier_cap_hit, last.failure_code);
            }
            if retryable && same_tier_run_length < 2 {
                return retry_or_fail(budget_exhausted, last.failure_code);
            }
            if retryable {
                return escalate_or_fail(Tier::Browser, allowed, budget_exhausted, tier_cap_hit, last.failure_code);
            }
            terminal_fail_for(last.failure_code)
        }
        Tier::Browser => {
            let hard_trigger = has(signal::HARD_BLOCK) || has(signal::NAVIGATION_FAILED) || has(signal::CAPTCHA);
            if hard_trigger {
                return escalate_or_fail(Tier::Provider, allowed, budget_exhausted, tier_cap_hit, last.failure_code);
            }
            if has(signal::EXTRACTION_EMPTY) {
                let browser_attempts = run.engine_attempts.iter().filter(|a| a.tier == Tier::Browser).count();
                if browser_attempts < 2 {
                    return retry_or_fail(budget_exhausted, last.failure_code);
                }
                let retire_first = ctx.session_reused_and_trusted;
                let mut decision = escalate_or_fail(Tier::Provider, allowed, budget_exhausted, tier_cap_hit, last.failure_code);
                if let Decision::Escalate { ref mut retire_session_first, .. } = decision {
                    *retire_session_first = retire_first;
                }
                return decision;
            }
            if retryable && same_tier_run_length < 2 {
                return retry_or_fail(budget_exhausted, last.failure_code);
            }
            if retryable {
                return escalate_or_fail(Tier::Provider, allowed, budget_exhausted, tier_cap_hit, last.failure_code);
            }
            terminal_fail_for(last.failure_code)
        }
        Tier::Provider => {
            if let Some(cap) = ctx.provider_credits_cap {
                let spent: u32 = run.engine_attempts.iter().map(|a| a.cost).sum();
                if spent >= cap {
                    return Decision::TerminalFail { code: FailureCode::NoProviderKey };
                }
            }
            // A single `blocked` attempt retries the tier so the next
            // reservation tries a different key; a second consecutive
            // `blocked` is already caught by the unconditional
            // `consecutive_provider_blocks` check above before reaching
            // here.
            if has(signal::BLOCKED) {
                return retry_or_fail(budget_exhausted, last.failure_code);
            }
            if retryable && same_tier_run_length < 2 {
                return retry_or_fail(budget_exhausted, last.failure_code);
            }
            // No tier beyond PROVIDER: anything unresolved here terminates
            // (or, for a ledger-style pause, raises an intervention —
            // handled above via `no_provider_key`).
            terminal_fail_for(last.failure_code)
        }
    }
}

/// The tier a fresh run of `job` should attempt first.
pub fn first_tier(job: &Job) -> Option<Tier> {
    Some(match job.engine_mode {
        EngineMode::Auto | EngineMode::Http => Tier::Http,
        EngineMode::Browser => Tier::Browser,
        EngineMode::Provider => Tier::Provider,
    })
}

/// The ordered tier sequence `job.engine_mode` permits.
fn allowed_tiers(mode: EngineMode) -> &'static [Tier] {
    match mode {
        EngineMode::Auto => &[Tier::Http, Tier::Browser, Tier::Provider],
        EngineMode::Http => &[Tier::Http],
        EngineMode::Browser => &[Tier::Browser],
        EngineMode::Provider => &[Tier::Provider],
    }
}

/// The tier that follows `current` in `allowed`, if any.
fn next_tier_for(current: Tier, allowed: &[Tier]) -> Option<Tier> {
    let idx = allowed.iter().position(|t| *t == current)?;
    allowed.get(idx + 1).copied()
}

fn retry_or_fail(budget_exhausted: bool, failure_code: Option<FailureCode>) -> Decision {
    if budget_exhausted {
        return terminal_fail_for(failure_code);
    }
    Decision::RetrySameTier
}

fn escalate_or_fail(
    candidate: Tier,
    allowed: &[Tier],
    budget_exhausted: bool,
    tier_cap_hit: bool,
    failure_code: Option<FailureCode>,
) -> Decision {
    if budget_exhausted || tier_cap_hit || !allowed.contains(&candidate) {
        return terminal_fail_for(failure_code);
    }
    Decision::Escalate { next_tier: candidate, retire_session_first: false }
}

fn terminal_fail_for(failure_code: Option<FailureCode>) -> Decision {
    Decision::TerminalFail { code: failure_code.unwrap_or(FailureCode::Unknown) }
}

/// Number of PROVIDER attempts so far (across this run) that carried a
/// `blocked` signal, used for the "consecutive blocked across two provider
/// keys" hard stop.
fn consecutive_provider_blocks(run: &Run) -> u32 {
    run.engine_attempts
        .iter()
        .filter(|a| a.tier == Tier::Provider && a.signals.iter().any(|s| s == signal::BLOCKED))
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sg_core::run::EngineAttempt;
    use sg_core::{CrawlMode, EngineMode};
    use uuid::Uuid;

    fn job(mode: EngineMode) -> Job {
        use sg_core::field_map::{FieldMap, FieldType, SelectorSpec, SelectorTarget, SmartConfig, ValidationRules};
        let title_map = FieldMap {
            field_name: "title".to_string(),
            selector: SelectorSpec { selector: "h1".to_string(), target: SelectorTarget::Text, all: false, capture_regex: None },
            field_type: FieldType::String,
            smart_config: SmartConfig::default(),
            validation_rules: ValidationRules::default(),
        };
        Job {
            id: Uuid::new_v4(),
            target_url: "https://example.com".to_string(),
            fields: vec!["title".to_string()],
            field_maps: std::collections::BTreeMap::from([("title".to_string(), title_map)]),
            crawl_mode: CrawlMode::Single,
            list_config: None,
            requires_auth: false,
            engine_mode: mode,
            browser_profile: None,
            strategy_hint: None,
        }
    }

    fn attempt(tier: Tier, signals: &[&str], failure_code: Option<FailureCode>, cost: u32) -> EngineAttempt {
        EngineAttempt {
            tier,
            started_at: Utc::now(),
            ended_at: Some(Utc::now()),
            failure_code,
            signals: signals.iter().map(|s| s.to_string()).collect(),
            cost,
        }
    }

    fn ctx(had_records: bool) -> EscalationContext {
        EscalationContext {
            max_attempts: 3,
            provider_credits_cap: None,
            session_reused_and_trusted: false,
            had_records,
        }
    }

    fn run_with(attempts: Vec<EngineAttempt>) -> Run {
        let mut r = Run::new(Uuid::new_v4());
        r.attempt = attempts.len() as u32;
        r.engine_attempts = attempts;
        r
    }

    #[test]
    fn clean_http_success_commits() {
        let run = run_with(vec![attempt(Tier::Http, &[], None, 0)]);
        let decision = decide(&run, &job(EngineMode::Auto), &ctx(true));
        assert_eq!(decision, Decision::Commit);
    }

    #[test]
    fn http_js_required_escalates_to_browser() {
        let run = run_with(vec![attempt(Tier::Http, &[signal::JS_REQUIRED], None, 0)]);
        let decision = decide(&run, &job(EngineMode::Auto), &ctx(false));
        assert_eq!(
            decision,
            Decision::Escalate { next_tier: Tier::Browser, retire_session_first: false }
        );
    }

    #[test]
    fn http_extraction_empty_escalates_even_with_no_required_fields() {
        // Declared fields are implicitly desired; extraction_empty escalates
        // regardless of whether any field is marked `required`.
        let run = run_with(vec![attempt(Tier::Http, &[signal::EXTRACTION_EMPTY], None, 0)]);
        let decision = decide(&run, &job(EngineMode::Auto), &ctx(false));
        assert_eq!(
            decision,
            Decision::Escalate { next_tier: Tier::Browser, retire_session_first: false }
        );
    }

    #[test]
    fn blocked_and_js_required_together_prefer_browser_over_provider() {
        let run = run_with(vec![attempt(
            Tier::Http,
            &[signal::BLOCKED, signal::JS_REQUIRED],
            Some(FailureCode::Blocked),
            0,
        )]);
        let decision = decide(&run, &job(EngineMode::Auto), &ctx(false));
        assert_eq!(
            decision,
            Decision::Escalate { next_tier: Tier::Browser, retire_session_first: false }
        );
    }

    #[test]
    fn pinned_http_mode_never_escalates() {
        let run = run_with(vec![attempt(Tier::Http, &[signal::JS_REQUIRED], None, 0)]);
        let decision = decide(&run, &job(EngineMode::Http), &ctx(false));
        assert_eq!(decision, Decision::TerminalFail { code: FailureCode::Unknown });
    }

    #[test]
    fn timeout_retries_same_tier_once_then_escalates() {
        let one_timeout = run_with(vec![attempt(Tier::Http, &[signal::TIMEOUT], Some(FailureCode::Timeout), 0)]);
        assert_eq!(
            decide(&one_timeout, &job(EngineMode::Auto), &ctx(false)),
            Decision::RetrySameTier
        );

        let two_timeouts = run_with(vec![
            attempt(Tier::Http, &[signal::TIMEOUT], Some(FailureCode::Timeout), 0),
            attempt(Tier::Http, &[signal::TIMEOUT], Some(FailureCode::Timeout), 0),
        ]);
        assert_eq!(
            decide(&two_timeouts, &job(EngineMode::Auto), &ctx(false)),
            Decision::Escalate { next_tier: Tier::Browser, retire_session_first: false }
        );
    }

    #[test]
    fn browser_hard_block_escalates_to_provider() {
        let run = run_with(vec![
            attempt(Tier::Http, &[signal::JS_REQUIRED], None, 0),
            attempt(Tier::Browser, &[signal::HARD_BLOCK], Some(FailureCode::HardBlock), 0),
        ]);
        let decision = decide(&run, &job(EngineMode::Auto), &ctx(false));
        assert_eq!(
            decision,
            Decision::Escalate { next_tier: Tier::Provider, retire_session_first: false }
        );
    }

    #[test]
    fn browser_extraction_empty_retries_once_then_escalates_and_retires_trusted_session() {
        let one_empty = run_with(vec![
            attempt(Tier::Http, &[signal::JS_REQUIRED], None, 0),
            attempt(Tier::Browser, &[signal::EXTRACTION_EMPTY], None, 0),
        ]);
        assert_eq!(
            decide(&one_empty, &job(EngineMode::Auto), &ctx(false)),
            Decision::RetrySameTier
        );

        let two_empty = run_with(vec![
            attempt(Tier::Http, &[signal::JS_REQUIRED], None, 0),
            attempt(Tier::Browser, &[signal::EXTRACTION_EMPTY], None, 0),
            attempt(Tier::Browser, &[signal::EXTRACTION_EMPTY], None, 0),
        ]);
        let mut trusted_ctx = ctx(false);
        trusted_ctx.session_reused_and_trusted = true;
        let decision = decide(&two_empty, &job(EngineMode::Auto), &trusted_ctx);
        assert_eq!(
            decision,
            Decision::Escalate { next_tier: Tier::Provider, retire_session_first: true }
        );
    }

    #[test]
    fn provider_hard_block_terminal_is_unconditional() {
        let run = run_with(vec![
            attempt(Tier::Http, &[signal::JS_REQUIRED], None, 0),
            attempt(Tier::Browser, &[signal::HARD_BLOCK], Some(FailureCode::HardBlock), 0),
            attempt(Tier::Provider, &[signal::HARD_BLOCK], Some(FailureCode::HardBlock), 1),
        ]);
        let decision = decide(&run, &job(EngineMode::Auto), &ctx(false));
        assert_eq!(decision, Decision::TerminalFail { code: FailureCode::HardBlock });
    }

    #[test]
    fn no_provider_key_opens_intervention() {
        let run = run_with(vec![attempt(
            Tier::Provider,
            &[signal::NO_PROVIDER_KEY],
            Some(FailureCode::NoProviderKey),
            0,
        )]);
        let decision = decide(&run, &job(EngineMode::Auto), &ctx(false));
        assert!(matches!(decision, Decision::Intervention { .. }));
    }

    #[test]
    fn first_provider_blocked_retries_same_tier_before_terminating() {
        let run = run_with(vec![attempt(Tier::Provider, &[signal::BLOCKED], Some(FailureCode::Blocked), 1)]);
        let decision = decide(&run, &job(EngineMode::Auto), &ctx(false));
        assert_eq!(decision, Decision::RetrySameTier);
    }

    #[test]
    fn consecutive_provider_blocks_across_two_keys_terminates() {
        let run = run_with(vec![
            attempt(Tier::Provider, &[signal::BLOCKED], Some(FailureCode::Blocked), 1),
            attempt(Tier::Provider, &[signal::BLOCKED], Some(FailureCode::Blocked), 1),
        ]);
        let decision = decide(&run, &job(EngineMode::Auto), &ctx(false));
        assert_eq!(decision, Decision::TerminalFail { code: FailureCode::Blocked });
    }

    #[test]
    fn tier_cap_of_three_is_enforced_even_with_budget_left() {
        let run = run_with(vec![
            attempt(Tier::Http, &[signal::JS_REQUIRED], None, 0),
            attempt(Tier::Browser, &[signal::HARD_BLOCK], Some(FailureCode::HardBlock), 0),
            attempt(Tier::Provider, &[signal::BAD_RESPONSE], Some(FailureCode::BadResponse), 1),
        ]);
        let mut wide_budget = ctx(false);
        wide_budget.max_attempts = 10;
        let decision = decide(&run, &job(EngineMode::Auto), &wide_budget);
        // Provider attempt 1 of a same-tier run: bad_response retries same
        // tier once before any escalation would even be considered, and a
        // retry is still within the 3-tier cap (same tier, no new tier).
        assert_eq!(decision, Decision::RetrySameTier);
    }

    #[test]
    fn attempt_budget_exhausted_forces_terminal_fail_instead_of_retry() {
        let run = run_with(vec![attempt(Tier::Http, &[signal::TIMEOUT], Some(FailureCode::Timeout), 0)]);
        let mut tight = ctx(false);
        tight.max_attempts = 1;
        let decision = decide(&run, &job(EngineMode::Auto), &tight);
        assert_eq!(decision, Decision::TerminalFail { code: FailureCode::Timeout });
    }

    #[test]
    fn partial_records_under_js_required_still_escalate_when_room_remains() {
        let run = run_with(vec![attempt(Tier::Http, &[signal::JS_REQUIRED], None, 0)]);
        let decision = decide(&run, &job(EngineMode::Auto), &ctx(true));
        assert_eq!(
            decision,
            Decision::Escalate { next_tier: Tier::Browser, retire_session_first: false }
        );
    }

    #[test]
    fn partial_records_commit_when_pinned_mode_has_nowhere_to_escalate() {
        let run = run_with(vec![attempt(Tier::Http, &[signal::JS_REQUIRED], None, 0)]);
        let decision = decide(&run, &job(EngineMode::Http), &ctx(true));
        assert_eq!(decision, Decision::Commit);
    }

    #[test]
    fn first_tier_matches_engine_mode_table() {
        assert_eq!(first_tier(&job(EngineMode::Auto)), Some(Tier::Http));
        assert_eq!(first_tier(&job(EngineMode::Http)), Some(Tier::Http));
        assert_eq!(first_tier(&job(EngineMode::Browser)), Some(Tier::Browser));
        assert_eq!(first_tier(&job(EngineMode::Provider)), Some(Tier::Provider));
    }

    #[test]
    fn escalation_sequence_in_auto_mode_is_a_prefix_of_http_browser_provider() {
        let seq = [Tier::Http, Tier::Browser, Tier::Provider];
        let run = run_with(vec![
            attempt(Tier::Http, &[signal::JS_REQUIRED], None, 0),
            attempt(Tier::Browser, &[signal::HARD_BLOCK], Some(FailureCode::HardBlock), 0),
        ]);
        let decision = decide(&run, &job(EngineMode::Auto), &ctx(false));
        let Decision::Escalate { next_tier, .. } = decision else {
            panic!("expected escalate");
        };
        assert_eq!(next_tier, seq[2]);
    }
}
