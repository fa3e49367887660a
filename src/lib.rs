//! scrapeforge
//!
//! Root facade over the scraping control plane execution engine: re-exports
//! each component crate's key types and provides [`Engine`], a convenience
//! constructor that wires an in-memory [`Orchestrator`] together for
//! embedding or tests. Production deployments typically depend on the
//! component crates directly instead (swapping in real [`Stores`] and
//! [`TaskQueue`] backends); `Engine` exists for the common zero-external-
//! dependency case.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

pub use sg_config::{load_config, ConfigError, ConfigWarning, EngineConfig};
pub use sg_core::*;
pub use sg_error::{EngineError, EngineErrorDto, ErrorCategory, FailureCode};
pub use sg_escalation::{decide, first_tier, Decision, EscalationContext};
pub use sg_executors::{BrowserExecutor, ExecutionOutcome, Executor, HttpExecutor, ProviderExecutor};
pub use sg_extract::{
    default_dedup_key, drop_records_missing_required_fields, ExtractionOutcome, FetchedPage,
    FieldExtractor, PageSource,
};
pub use sg_ledger::{ApiKeyLedger, KeyFailureKind, ProviderSummary, ReservedKey};
pub use sg_runtime::{run_worker, InMemoryTaskQueue, Orchestrator, Stores, Task, TaskQueue};
pub use sg_runtime::bus::EventBus;
pub use sg_runtime::cancel::{CancellableRun, CancellationReason, CancellationToken};
pub use sg_session::SessionManager;
pub use sg_typer::{type_value, TypingContext};

/// Everything needed to submit jobs and drive runs, assembled against
/// in-memory storage and a fresh session pool and key ledger.
///
/// `provider`/`provider_base_url` configure the single Provider-tier
/// backend this engine instance talks to; register credit with
/// [`Engine::ledger`] before any job escalates to PROVIDER.
pub struct Engine {
    stores: Arc<Stores>,
    bus: Arc<EventBus>,
    session_manager: Arc<SessionManager>,
    ledger: Arc<ApiKeyLedger>,
    orchestrator: Arc<Orchestrator>,
}

impl Engine {
    /// Builds an engine over in-memory storage, a fresh event bus, and the
    /// three executor tiers configured from `config`.
    pub fn new(
        config: EngineConfig,
        provider: impl Into<String>,
        provider_base_url: impl Into<String>,
    ) -> Result<Self, EngineError> {
        let stores = Arc::new(Stores::in_memory());
        let bus = Arc::new(EventBus::new());
        let session_manager = Arc::new(SessionManager::new());
        let ledger = Arc::new(ApiKeyLedger::new());

        let http = Arc::new(HttpExecutor::new(config.http_timeout_s)?);
        let browser = Arc::new(BrowserExecutor::new(session_manager.clone(), config.browser_nav_timeout_ms));
        let provider = Arc::new(ProviderExecutor::new(
            ledger.clone(),
            provider,
            provider_base_url,
            config.provider_timeout_s,
        )?);

        let orchestrator = Arc::new(Orchestrator::new(
            stores.clone(),
            bus.clone(),
            session_manager.clone(),
            http,
            browser,
            provider,
            config,
        ));

        Ok(Self { stores, bus, session_manager, ledger, orchestrator })
    }

    /// Registers `job`, returning the freshly queued [`Run`] it will be
    /// driven through. Call [`Engine::orchestrator`]'s
    /// [`Orchestrator::execute_run`] (directly, or via [`run_worker`] over a
    /// [`TaskQueue`]) with the returned run's id to actually drive it.
    pub async fn submit(&self, job: Job) -> Run {
        let run = Run::new(job.id);
        self.stores.jobs.save(job).await;
        self.stores.runs.save(run.clone()).await;
        run
    }

    /// The shared storage boundary (jobs, runs, records, interventions).
    pub fn stores(&self) -> &Arc<Stores> {
        &self.stores
    }

    /// The shared event bus; subscribe for run progress.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The shared session pool.
    pub fn session_manager(&self) -> &Arc<SessionManager> {
        &self.session_manager
    }

    /// The shared provider API-key ledger; register keys here before a run
    /// reaches PROVIDER tier.
    pub fn ledger(&self) -> &Arc<ApiKeyLedger> {
        &self.ledger
    }

    /// The orchestrator driving every run submitted through this engine.
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }
}
