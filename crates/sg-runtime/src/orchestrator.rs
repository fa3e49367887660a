//! The Run Orchestrator: the only place that mutates persisted [`Run`]
//! state. It drives one run's tier loop end to end — dispatch an executor,
//! run the Field Extractor, ask the Escalation Engine what's next, apply the
//! answer — and is the sole writer to [`Stores`], the sole publisher on the
//! [`EventBus`], and the sole caller of [`SessionManager::mark_failure`]
//! from the "retire before escalating" tie-break.
//!
//! A single struct owns the shared registries and backends and exposes one
//! async entry point that prepares, dispatches, and streams progress for a
//! single run; [`sg_escalation::Decision`] is the outcome that entry point
//! acts on after each attempt.

use std::sync::Arc;

use chrono::Utc;
use sg_core::{
    CrawlMode, EngineAttempt, EventLevel, Job, Run, RunEvent, RunStatus, SessionKey, Tier,
};
use sg_error::{EngineError, FailureCode};
use sg_escalation::{Decision, EscalationContext};
use sg_executors::{BrowserExecutor, ExecutionOutcome, Executor, HttpExecutor, ProviderExecutor};
use sg_extract::page::{FetchedPage, PageSource};
use sg_extract::{drop_records_missing_required_fields, ExtractionOutcome, FieldExtractor};
use sg_session::SessionManager;
use sg_typer::TypingContext;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::backoff;
use crate::bus::EventBus;
use crate::cancel::CancellationToken;
use crate::queue::TaskQueue;
use crate::store::Stores;

/// Owns every shared dependency a run needs and drives its tier loop.
///
/// One `Orchestrator` serves every run in the process; nothing here is
/// per-run state (that all lives on [`Run`] itself, persisted through
/// [`Stores`] after every state-changing step).
pub struct Orchestrator {
    stores: Arc<Stores>,
    bus: Arc<EventBus>,
    session_manager: Arc<SessionManager>,
    http: Arc<HttpExecutor>,
    browser: Arc<BrowserExecutor>,
    provider: Arc<ProviderExecutor>,
    typing_ctx: TypingContext,
    config: sg_config::EngineConfig,
}

impl Orchestrator {
    /// Builds an orchestrator over the given dependencies.
    pub fn new(
        stores: Arc<Stores>,
        bus: Arc<EventBus>,
        session_manager: Arc<SessionManager>,
        http: Arc<HttpExecutor>,
        browser: Arc<BrowserExecutor>,
        provider: Arc<ProviderExecutor>,
        config: sg_config::EngineConfig,
    ) -> Self {
        Self {
            stores,
            bus,
            session_manager,
            http,
            browser,
            provider,
            typing_ctx: TypingContext::default(),
            config,
        }
    }

    /// Drives `run_id` from wherever it currently stands through to a
    /// terminal state (`completed`, `failed`, `cancelled`) or a pause
    /// (`waiting_for_human`), returning the final persisted [`Run`].
    ///
    /// `cancel` is checked before every attempt and raced against the
    /// in-flight attempt itself; cancellation mid-attempt drops the attempt
    /// future, so the executor's own `mark_success`/`mark_failure` calls
    /// never run for that attempt.
    pub async fn execute_run(&self, run_id: Uuid, cancel: CancellationToken) -> Run {
        let mut seq: u64 = 0;

        let Some(mut run) = self.stores.runs.get(run_id).await else {
            error!(target: "sg.orchestrator", %run_id, "run not found in store");
            return Run {
                id: run_id,
                job_id: Uuid::nil(),
                status: RunStatus::Failed,
                attempt: 0,
                engine_attempts: Vec::new(),
                resolved_strategy: None,
                stats: sg_core::RunStats::default(),
                failure_code: Some(FailureCode::Unknown),
            };
        };

        let Some(job) = self.stores.jobs.get(run.job_id).await else {
            return self
                .fail_before_start(run, &mut seq, FailureCode::Unknown, "job not found for run")
                .await;
        };

        if let Err(e) = job.validate() {
            let code = e.code;
            let message = e.to_string();
            return self.fail_before_start(run, &mut seq, code, &message).await;
        }

        // A resumed run (e.g. after an intervention is resolved) picks up at
        // the tier its last attempt paused on rather than restarting from
        // the first tier — an intervention never escalates or retries, it
        // only pauses.
        let Some(mut tier) = run
            .engine_attempts
            .last()
            .map(|a| a.tier)
            .or_else(|| sg_escalation::first_tier(&job))
        else {
            return self
                .fail_before_start(run, &mut seq, FailureCode::Unknown, "job engine_mode has no first tier")
                .await;
        };

        let started_at = Utc::now();
        run.status = RunStatus::Running;
        self.stores.runs.save(run.clone()).await;
        self.emit(&mut seq, run_id, EventLevel::Info, "run started", serde_json::json!({ "job_id": job.id }));

        loop {
            if cancel.is_cancelled() {
                return self.finish_cancelled(run, &mut seq).await;
            }

            self.emit(&mut seq, run_id, EventLevel::Info, "attempt started", serde_json::json!({ "tier": tier }));
            let attempt_started = Utc::now();

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return self.finish_cancelled(run, &mut seq).await;
                }
                outcome = self.dispatch(tier, &job) => outcome,
            };

            let mut signals = outcome.signals.clone();
            let mut candidate_records = Vec::new();

            if outcome.is_success() {
                if let Some(page) = outcome.page.clone() {
                    match self.extract(&job, run_id, page).await {
                        Ok(extraction) => {
                            signals.extend(extraction.signals);
                            candidate_records = extraction.records;
                        }
                        Err(e) => {
                            signals.push(sg_core::signal::EXTRACTION_EMPTY.to_string());
                            warn!(target: "sg.orchestrator", %run_id, error = %e, "extraction failed");
                            self.emit(
                                &mut seq,
                                run_id,
                                EventLevel::Warn,
                                "extraction failed",
                                serde_json::json!({ "error": e.to_string() }),
                            );
                        }
                    }
                }
            }
            let had_records = !candidate_records.is_empty();

            run.attempt += 1;
            run.engine_attempts.push(EngineAttempt {
                tier,
                started_at: attempt_started,
                ended_at: Some(Utc::now()),
                failure_code: outcome.failure_code,
                signals,
                cost: outcome.cost,
            });
            self.stores.runs.save(run.clone()).await;
            self.emit(
                &mut seq,
                run_id,
                EventLevel::Info,
                "attempt finished",
                serde_json::json!({ "tier": tier, "failure_code": outcome.failure_code, "had_records": had_records }),
            );

            let session_key = session_key_for_url(&job.target_url);
            let session_reused_and_trusted = match (tier, &session_key) {
                (Tier::Browser, Some(key)) => self.session_manager.is_trusted(key).await,
                _ => false,
            };

            let ctx = EscalationContext {
                max_attempts: self.config.default_max_attempts,
                provider_credits_cap: self.config.provider_credits_cap_per_run,
                session_reused_and_trusted,
                had_records,
            };
            let decision = sg_escalation::decide(&run, &job, &ctx);

            match decision {
                Decision::Commit => {
                    let records = drop_records_missing_required_fields(candidate_records, &job.field_maps);
                    let count = records.len() as u64;
                    self.stores.records.save_batch(run_id, records).await;

                    run.status = RunStatus::Completed;
                    run.resolved_strategy = Some(tier);
                    run.stats.items_extracted = count;
                    run.stats.execution_time_s = seconds_since(started_at);
                    run.stats.engine_used = Some(tier);
                    run.stats.total_cost = run.engine_attempts.iter().map(|a| a.cost).sum();
                    self.stores.runs.save(run.clone()).await;
                    self.emit(
                        &mut seq,
                        run_id,
                        EventLevel::Info,
                        "run completed",
                        serde_json::json!({ "items_extracted": count, "engine_used": tier }),
                    );
                    info!(target: "sg.orchestrator", %run_id, items = count, "run completed");
                    return run;
                }
                Decision::RetrySameTier => {
                    let same_tier_attempts =
                        run.engine_attempts.iter().rev().take_while(|a| a.tier == tier).count() as u32;
                    let delay = backoff::delay_for(same_tier_attempts, &self.config);
                    self.emit(
                        &mut seq,
                        run_id,
                        EventLevel::Info,
                        "retrying same tier",
                        serde_json::json!({ "tier": tier, "delay_s": delay.as_secs() }),
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return self.finish_cancelled(run, &mut seq).await;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Decision::Escalate { next_tier, retire_session_first } => {
                    if retire_session_first {
                        if let Some(key) = &session_key {
                            self.session_manager.mark_failure(key).await;
                        }
                    }
                    self.emit(
                        &mut seq,
                        run_id,
                        EventLevel::Info,
                        "escalating",
                        serde_json::json!({ "from": tier, "to": next_tier }),
                    );
                    tier = next_tier;
                }
                Decision::TerminalFail { code } => {
                    run.status = RunStatus::Failed;
                    run.failure_code = Some(code);
                    run.stats.execution_time_s = seconds_since(started_at);
                    run.stats.last_error_message = outcome.message.clone();
                    self.stores.runs.save(run.clone()).await;
                    self.emit(&mut seq, run_id, EventLevel::Error, "run failed", serde_json::json!({ "code": code }));
                    warn!(target: "sg.orchestrator", %run_id, ?code, "run terminally failed");
                    return run;
                }
                Decision::Intervention { reason } => {
                    let intervention = self
                        .stores
                        .interventions
                        .create(run_id, intervention_type_for_reason(&reason).to_string(), reason.clone(), 5)
                        .await;
                    run.status = RunStatus::WaitingForHuman;
                    self.stores.runs.save(run.clone()).await;
                    self.emit(
                        &mut seq,
                        run_id,
                        EventLevel::Warn,
                        "intervention raised",
                        serde_json::json!({ "intervention_id": intervention.id, "reason": reason }),
                    );
                    return run;
                }
            }
        }
    }

    /// Dispatches one attempt to the executor for `tier`. UFCS-qualified so
    /// each tier's `Executor::execute(&self, &Job)` is picked unambiguously
    /// over the same-named inherent method a couple of the executors also
    /// expose with a different argument type (`&str`, for Provider).
    async fn dispatch(&self, tier: Tier, job: &Job) -> ExecutionOutcome<FetchedPage> {
        match tier {
            Tier::Http => <HttpExecutor as Executor>::execute(self.http.as_ref(), job).await,
            Tier::Browser => <BrowserExecutor as Executor>::execute(self.browser.as_ref(), job).await,
            Tier::Provider => <ProviderExecutor as Executor>::execute(self.provider.as_ref(), job).await,
        }
    }

    /// Runs the Field Extractor over a successfully fetched `page`.
    ///
    /// List-mode follow-on fetches (item detail pages, pagination) always
    /// go through the plain HTTP executor regardless of which tier served
    /// the first page — `BrowserExecutor::execute`'s session-capture and
    /// consent-handling contract is scoped to one job/one target URL and
    /// doesn't generalize to arbitrary mid-crawl follow-on URLs.
    async fn extract(&self, job: &Job, run_id: Uuid, page: FetchedPage) -> Result<ExtractionOutcome, EngineError> {
        let extractor = FieldExtractor::new(&job.field_maps, &self.typing_ctx);
        match job.crawl_mode {
            CrawlMode::Single => Ok(extractor.extract_single_page(run_id, &page)),
            CrawlMode::List => {
                let list_config = job.list_config.as_ref().ok_or_else(|| {
                    EngineError::new(FailureCode::Unknown, "crawl_mode=list without list_config")
                })?;
                let user_agent = job.browser_profile.as_ref().map(|p| p.user_agent.clone());
                let source: Arc<dyn PageSource> = Arc::new(TierPageSource::new(self.http.clone(), user_agent));
                extractor
                    .extract_list(
                        run_id,
                        page,
                        &list_config.item_links_selector,
                        list_config.pagination_selector.as_deref(),
                        list_config.max_pages,
                        list_config.max_items,
                        source,
                    )
                    .await
            }
        }
    }

    async fn fail_before_start(&self, mut run: Run, seq: &mut u64, code: FailureCode, message: &str) -> Run {
        run.status = RunStatus::Failed;
        run.failure_code = Some(code);
        run.stats.last_error_message = Some(message.to_string());
        self.stores.runs.save(run.clone()).await;
        self.emit(seq, run.id, EventLevel::Error, message, serde_json::json!({ "code": code }));
        run
    }

    async fn finish_cancelled(&self, mut run: Run, seq: &mut u64) -> Run {
        run.status = RunStatus::Cancelled;
        self.stores.runs.save(run.clone()).await;
        self.emit(seq, run.id, EventLevel::Warn, "run cancelled", serde_json::json!({}));
        run
    }

    fn emit(&self, seq: &mut u64, run_id: Uuid, level: EventLevel, message: &str, meta: serde_json::Value) {
        *seq += 1;
        self.bus.publish(RunEvent {
            run_id,
            seq: *seq,
            timestamp: Utc::now(),
            level,
            message: message.to_string(),
            meta,
        });
    }
}

/// Adapts the HTTP executor to [`PageSource`] for mid-attempt follow-on
/// fetches during list-mode extraction.
struct TierPageSource {
    http: Arc<HttpExecutor>,
    user_agent: Option<String>,
}

impl TierPageSource {
    fn new(http: Arc<HttpExecutor>, user_agent: Option<String>) -> Self {
        Self { http, user_agent }
    }
}

#[async_trait::async_trait]
impl PageSource for TierPageSource {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, EngineError> {
        let outcome = self.http.fetch(url, self.user_agent.as_deref()).await;
        match outcome.page {
            Some(page) => Ok(page),
            None => Err(EngineError::new(
                outcome.failure_code.unwrap_or(FailureCode::Unknown),
                outcome.message.unwrap_or_else(|| "follow-on fetch failed".to_string()),
            )),
        }
    }
}

/// Pulls tasks off `queue` and runs them through `orchestrator` until the
/// queue closes or `cancel` fires. The interface between the Run
/// Orchestrator and the broker-agnostic task queue described alongside it.
pub async fn run_worker(orchestrator: Arc<Orchestrator>, queue: Arc<dyn TaskQueue>, cancel: CancellationToken) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let task = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            task = queue.pop() => task,
        };
        let Some(task) = task else { return };
        let run = orchestrator.execute_run(task.run_id, cancel.clone()).await;
        info!(target: "sg.orchestrator", run_id = %run.id, status = ?run.status, "worker finished task");
    }
}

fn seconds_since(start: chrono::DateTime<Utc>) -> f64 {
    (Utc::now() - start).num_milliseconds() as f64 / 1000.0
}

/// Derives the session-pool key for a job's target domain, mirroring the
/// Browser Executor's own (private) `session_key_for`.
fn session_key_for_url(target_url: &str) -> Option<SessionKey> {
    let parsed = url::Url::parse(target_url).ok()?;
    let domain = parsed.host_str()?;
    Some(SessionKey::new(domain))
}

/// Classifies an escalation-raised intervention reason into the
/// `Intervention.type` taxonomy the data model documents.
fn intervention_type_for_reason(reason: &str) -> &'static str {
    if reason.contains("provider") || reason.contains("key") {
        "provide_provider_key"
    } else {
        "provide_session"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_key_for_url_uses_host_only() {
        let key = session_key_for_url("https://example.com/path?x=1").unwrap();
        assert_eq!(key.site_domain, "example.com");
        assert_eq!(key.proxy_identity, "default");
    }

    #[test]
    fn session_key_for_url_rejects_unparsable_urls() {
        assert!(session_key_for_url("not a url").is_none());
    }

    #[test]
    fn intervention_type_classifies_provider_exhaustion() {
        assert_eq!(
            intervention_type_for_reason("provider ledger exhausted: no active key with remaining credit"),
            "provide_provider_key"
        );
        assert_eq!(intervention_type_for_reason("session needs human login"), "provide_session");
    }
}
