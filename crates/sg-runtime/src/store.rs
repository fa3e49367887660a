//! Storage-boundary traits for Jobs, Runs, Records, and Interventions, plus
//! an in-memory implementation of each.
//!
//! The lock discipline mirrors `sg_session::SessionManager` and
//! `sg_ledger::ApiKeyLedger`: one [`tokio::sync::RwLock`] per map, shared
//! reads, exclusive writes, no I/O held under the lock. The CRUD shape
//! itself (save/get/list) is a trait plus an in-memory implementation of it,
//! so a real deployment can swap in a durable backend without touching
//! callers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sg_core::{Intervention, InterventionStatus, Job, Record, Run};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Persists and retrieves [`Job`]s.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Stores `job`, replacing any existing entry with the same id.
    async fn save(&self, job: Job);
    /// Fetches a job by id.
    async fn get(&self, job_id: Uuid) -> Option<Job>;
}

/// Persists and retrieves [`Run`]s.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Stores `run`, replacing any existing entry with the same id.
    async fn save(&self, run: Run);
    /// Fetches a run by id.
    async fn get(&self, run_id: Uuid) -> Option<Run>;
}

/// Persists extracted [`Record`]s.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Appends `records` for `run_id` in one batch: record insertion is
    /// batched per page of the list crawl.
    async fn save_batch(&self, run_id: Uuid, records: Vec<Record>);
    /// Lists every record committed for `run_id`.
    async fn by_run(&self, run_id: Uuid) -> Vec<Record>;
}

/// Persists and resolves [`Intervention`]s.
#[async_trait]
pub trait InterventionStore: Send + Sync {
    /// Raises a new intervention, returning it.
    async fn create(&self, run_id: Uuid, r#type: String, reason: String, priority: u8) -> Intervention;
    /// Marks `intervention_id` resolved, returning the owning `run_id` if
    /// the intervention existed and was still pending.
    async fn resolve(&self, intervention_id: Uuid) -> Option<Uuid>;
    /// Fetches an intervention by id.
    async fn get(&self, intervention_id: Uuid) -> Option<Intervention>;
    /// Lists every intervention still `pending`.
    async fn list_pending(&self) -> Vec<Intervention>;
}

/// `RwLock<HashMap<...>>`-backed [`JobStore`].
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl InMemoryJobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn save(&self, job: Job) {
        self.jobs.write().await.insert(job.id, job);
    }

    async fn get(&self, job_id: Uuid) -> Option<Job> {
        self.jobs.read().await.get(&job_id).cloned()
    }
}

/// `RwLock<HashMap<...>>`-backed [`RunStore`].
#[derive(Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<Uuid, Run>>,
}

impl InMemoryRunStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn save(&self, run: Run) {
        self.runs.write().await.insert(run.id, run);
    }

    async fn get(&self, run_id: Uuid) -> Option<Run> {
        self.runs.read().await.get(&run_id).cloned()
    }
}

/// `RwLock<HashMap<...>>`-backed [`RecordStore`], keyed by owning run.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<Uuid, Vec<Record>>>,
}

impl InMemoryRecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn save_batch(&self, run_id: Uuid, records: Vec<Record>) {
        self.records.write().await.entry(run_id).or_default().extend(records);
    }

    async fn by_run(&self, run_id: Uuid) -> Vec<Record> {
        self.records.read().await.get(&run_id).cloned().unwrap_or_default()
    }
}

/// `RwLock<HashMap<...>>`-backed [`InterventionStore`].
#[derive(Default)]
pub struct InMemoryInterventionStore {
    interventions: RwLock<HashMap<Uuid, Intervention>>,
}

impl InMemoryInterventionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InterventionStore for InMemoryInterventionStore {
    async fn create(&self, run_id: Uuid, r#type: String, reason: String, priority: u8) -> Intervention {
        let intervention = Intervention {
            id: Uuid::new_v4(),
            run_id,
            r#type,
            reason,
            priority,
            status: InterventionStatus::Pending,
        };
        self.interventions.write().await.insert(intervention.id, intervention.clone());
        intervention
    }

    async fn resolve(&self, intervention_id: Uuid) -> Option<Uuid> {
        let mut guard = self.interventions.write().await;
        let intervention = guard.get_mut(&intervention_id)?;
        if intervention.status != InterventionStatus::Pending {
            return None;
        }
        intervention.status = InterventionStatus::Resolved;
        Some(intervention.run_id)
    }

    async fn get(&self, intervention_id: Uuid) -> Option<Intervention> {
        self.interventions.read().await.get(&intervention_id).cloned()
    }

    async fn list_pending(&self) -> Vec<Intervention> {
        self.interventions
            .read()
            .await
            .values()
            .filter(|i| i.status == InterventionStatus::Pending)
            .cloned()
            .collect()
    }
}

/// The four storage boundaries bundled together, so callers construct one
/// set of stores and hand it to the orchestrator as `Arc<dyn ...>` trait
/// objects.
pub struct Stores {
    /// Job storage.
    pub jobs: Arc<dyn JobStore>,
    /// Run storage.
    pub runs: Arc<dyn RunStore>,
    /// Record storage.
    pub records: Arc<dyn RecordStore>,
    /// Intervention storage.
    pub interventions: Arc<dyn InterventionStore>,
}

impl Stores {
    /// Builds an all-in-memory set of stores.
    pub fn in_memory() -> Self {
        Self {
            jobs: Arc::new(InMemoryJobStore::new()),
            runs: Arc::new(InMemoryRunStore::new()),
            records: Arc::new(InMemoryRecordStore::new()),
            interventions: Arc::new(InMemoryInterventionStore::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sg_core::job::{CrawlMode, EngineMode};
    use std::collections::BTreeMap;

    fn job() -> Job {
        Job {
            id: Uuid::new_v4(),
            target_url: "https://example.com".to_string(),
            fields: vec!["title".to_string()],
            field_maps: BTreeMap::new(),
            crawl_mode: CrawlMode::Single,
            list_config: None,
            requires_auth: false,
            engine_mode: EngineMode::Auto,
            browser_profile: None,
            strategy_hint: None,
        }
    }

    #[tokio::test]
    async fn job_store_round_trips() {
        let store = InMemoryJobStore::new();
        let j = job();
        let id = j.id;
        store.save(j).await;
        assert_eq!(store.get(id).await.unwrap().id, id);
        assert!(store.get(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn run_store_round_trips() {
        let store = InMemoryRunStore::new();
        let run = Run::new(Uuid::new_v4());
        let id = run.id;
        store.save(run).await;
        assert_eq!(store.get(id).await.unwrap().id, id);
    }

    #[tokio::test]
    async fn record_store_batches_append_per_run() {
        let store = InMemoryRecordStore::new();
        let run_id = Uuid::new_v4();
        assert!(store.by_run(run_id).await.is_empty());
        store.save_batch(run_id, vec![]).await;
        assert!(store.by_run(run_id).await.is_empty());
    }

    #[tokio::test]
    async fn intervention_lifecycle() {
        let store = InMemoryInterventionStore::new();
        let run_id = Uuid::new_v4();
        let created = store.create(run_id, "provide_session".to_string(), "needs auth".to_string(), 5).await;
        assert_eq!(store.list_pending().await.len(), 1);
        let resolved_run = store.resolve(created.id).await.unwrap();
        assert_eq!(resolved_run, run_id);
        assert!(store.list_pending().await.is_empty());
        assert!(store.resolve(created.id).await.is_none());
    }
}
