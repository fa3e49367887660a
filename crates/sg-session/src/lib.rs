//! The Session Manager: an in-memory pool of reusable authenticated
//! browser state, keyed by `(site_domain, proxy_identity)`.
//!
//! Mutations and trust-threshold retirement happen under one exclusive
//! [`tokio::sync::RwLock`]; no I/O is ever held across the lock. Reads that
//! don't need to retire an entry still go through the same lock in read mode
//! so the map itself stays a single source of truth.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use sg_core::{Session, SessionKey};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Minimum trust score for a session to be considered usable. Below this,
/// [`SessionManager::get`] retires the entry and returns `None` instead of
/// handing back a session a caller would likely just fail with anyway.
pub const TRUST_FLOOR: f64 = 40.0;

/// Consecutive-failure threshold past which [`SessionManager::mark_failure`]
/// retires the session outright.
pub const FAILURE_RETIRE_THRESHOLD: u32 = 3;

/// Default maximum session age before [`SessionManager::cleanup`] retires it.
pub const DEFAULT_MAX_AGE_MIN: i64 = 120;

/// In-memory pool of [`Session`]s, one per `(domain, proxy)` key.
pub struct SessionManager {
    pool: RwLock<HashMap<SessionKey, Session>>,
}

impl SessionManager {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            pool: RwLock::new(HashMap::new()),
        }
    }

    /// Returns a trusted session for `key`, incrementing its `total_uses`
    /// counter (a get-for-reuse is itself a use). Returns `None` if no
    /// session exists, or if its trust score has fallen below
    /// [`TRUST_FLOOR`] — in the latter case the entry is retired
    /// (removed) so a subsequent caller never observes a stale session.
    pub async fn get(&self, key: &SessionKey) -> Option<Session> {
        let now = Utc::now();
        let mut pool = self.pool.write().await;
        let score = pool.get(key).map(|s| s.trust_score(now))?;
        if score < TRUST_FLOOR {
            debug!(target: "sg.session", domain = %key.site_domain, score, "retiring on read: below trust floor");
            pool.remove(key);
            return None;
        }
        let session = pool.get_mut(key)?;
        session.total_uses += 1;
        Some(session.clone())
    }

    /// Stores a freshly captured session for `key`, replacing any existing
    /// entry. Used both for a brand-new session and for refreshing one
    /// after a successful attempt captured updated cookies/storage state.
    pub async fn create(
        &self,
        key: SessionKey,
        cookies: Vec<sg_core::session::Cookie>,
        storage_state: serde_json::Value,
        user_agent: String,
        viewport: (u32, u32),
    ) {
        let now = Utc::now();
        let session = Session {
            cookies,
            storage_state,
            user_agent,
            viewport,
            created_at: now,
            last_success_at: Some(now),
            total_uses: 1,
            failure_streak: 0,
        };
        info!(target: "sg.session", domain = %key.site_domain, "captured new session");
        self.pool.write().await.insert(key, session);
    }

    /// Records a successful use: refreshes `last_success_at` and resets the
    /// failure streak. `total_uses` is not incremented here — it is already
    /// incremented at reuse time by [`get`](Self::get).
    pub async fn mark_success(&self, key: &SessionKey) {
        let mut pool = self.pool.write().await;
        if let Some(session) = pool.get_mut(key) {
            session.last_success_at = Some(Utc::now());
            session.failure_streak = 0;
        }
    }

    /// Records a failed use. Retires (removes) the session once
    /// `failure_streak` reaches [`FAILURE_RETIRE_THRESHOLD`].
    pub async fn mark_failure(&self, key: &SessionKey) {
        let mut pool = self.pool.write().await;
        let Some(session) = pool.get_mut(key) else {
            return;
        };
        session.failure_streak += 1;
        if session.failure_streak >= FAILURE_RETIRE_THRESHOLD {
            info!(target: "sg.session", domain = %key.site_domain, "retiring after failure streak");
            pool.remove(key);
        }
    }

    /// Retires every session older than `max_age_min` or below the trust
    /// floor. Intended to be called on a timer independent of per-request
    /// `get` calls, so idle sessions don't linger indefinitely.
    pub async fn cleanup(&self, max_age_min: i64) -> usize {
        let now = Utc::now();
        let mut pool = self.pool.write().await;
        let before = pool.len();
        pool.retain(|_, s| s.age_minutes(now) <= max_age_min && s.trust_score(now) >= TRUST_FLOOR);
        before - pool.len()
    }

    /// Number of sessions currently held, regardless of trust score.
    pub async fn len(&self) -> usize {
        self.pool.read().await.len()
    }

    /// `true` if the pool holds no sessions.
    pub async fn is_empty(&self) -> bool {
        self.pool.read().await.is_empty()
    }

    /// Snapshot of a session's trust classification, for diagnostics.
    pub async fn classify(&self, key: &SessionKey, now: DateTime<Utc>) -> Option<TrustClass> {
        let pool = self.pool.read().await;
        pool.get(key).map(|s| TrustClass::from_score(s.trust_score(now)))
    }

    /// `true` if `key` currently holds a session at or above [`TRUST_FLOOR`],
    /// without mutating `total_uses` or retiring a stale entry. Used by
    /// callers that need to know *whether an attempt reused a trusted
    /// session* without that knowledge itself counting as a use (e.g. the
    /// escalation engine's BROWSER `extraction_empty` tie-break, which
    /// consults this after the attempt that already called [`Self::get`]).
    pub async fn is_trusted(&self, key: &SessionKey) -> bool {
        let now = Utc::now();
        let pool = self.pool.read().await;
        pool.get(key).map(|s| s.trust_score(now) >= TRUST_FLOOR).unwrap_or(false)
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Coarse trust bands used for logging/diagnostics (`healthy >= 70`,
/// `degraded 40..70`, `retired < 40`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustClass {
    /// Score >= 70.
    Healthy,
    /// 40 <= score < 70.
    Degraded,
    /// Score < 40. A session in this band is never returned by `get`.
    Retired,
}

impl TrustClass {
    /// Classifies a raw trust score into a [`TrustClass`] band.
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            Self::Healthy
        } else if score >= TRUST_FLOOR {
            Self::Degraded
        } else {
            Self::Retired
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key() -> SessionKey {
        SessionKey::new("example.com")
    }

    #[tokio::test]
    async fn get_on_empty_pool_returns_none() {
        let mgr = SessionManager::new();
        assert!(mgr.get(&key()).await.is_none());
    }

    #[tokio::test]
    async fn create_then_get_returns_session_and_increments_uses() {
        let mgr = SessionManager::new();
        mgr.create(key(), vec![], serde_json::json!({}), "ua".to_string(), (1280, 800))
            .await;
        let s = mgr.get(&key()).await.unwrap();
        assert_eq!(s.total_uses, 2); // 1 at creation + 1 from this get
    }

    #[tokio::test]
    async fn mark_failure_increments_streak() {
        let mgr = SessionManager::new();
        mgr.create(key(), vec![], serde_json::json!({}), "ua".to_string(), (1280, 800))
            .await;
        mgr.mark_failure(&key()).await;
        mgr.mark_failure(&key()).await;
        assert_eq!(mgr.len().await, 1);
    }

    #[tokio::test]
    async fn three_failures_retire_the_session() {
        let mgr = SessionManager::new();
        mgr.create(key(), vec![], serde_json::json!({}), "ua".to_string(), (1280, 800))
            .await;
        mgr.mark_failure(&key()).await;
        mgr.mark_failure(&key()).await;
        mgr.mark_failure(&key()).await;
        assert!(mgr.get(&key()).await.is_none());
        assert_eq!(mgr.len().await, 0);
    }

    #[tokio::test]
    async fn mark_success_resets_streak() {
        let mgr = SessionManager::new();
        mgr.create(key(), vec![], serde_json::json!({}), "ua".to_string(), (1280, 800))
            .await;
        mgr.mark_failure(&key()).await;
        mgr.mark_failure(&key()).await;
        mgr.mark_success(&key()).await;
        // A third failure now should not retire, since the streak was reset.
        mgr.mark_failure(&key()).await;
        assert_eq!(mgr.len().await, 1);
    }

    #[tokio::test]
    async fn low_trust_session_is_retired_on_get() {
        let mgr = SessionManager::new();
        mgr.create(key(), vec![], serde_json::json!({}), "ua".to_string(), (1280, 800))
            .await;
        {
            let mut pool = mgr.pool.write().await;
            let s = pool.get_mut(&key()).unwrap();
            s.created_at = Utc::now() - Duration::minutes(500);
        }
        assert!(mgr.get(&key()).await.is_none());
        assert_eq!(mgr.len().await, 0);
    }

    #[tokio::test]
    async fn cleanup_removes_aged_and_untrusted_sessions() {
        let mgr = SessionManager::new();
        mgr.create(key(), vec![], serde_json::json!({}), "ua".to_string(), (1280, 800))
            .await;
        {
            let mut pool = mgr.pool.write().await;
            let s = pool.get_mut(&key()).unwrap();
            s.created_at = Utc::now() - Duration::minutes(121);
        }
        let removed = mgr.cleanup(DEFAULT_MAX_AGE_MIN).await;
        assert_eq!(removed, 1);
        assert!(mgr.is_empty().await);
    }

    #[tokio::test]
    async fn create_replaces_existing_entry() {
        let mgr = SessionManager::new();
        mgr.create(key(), vec![], serde_json::json!({"a":1}), "ua1".to_string(), (1280, 800))
            .await;
        mgr.create(key(), vec![], serde_json::json!({"b":2}), "ua2".to_string(), (1920, 1080))
            .await;
        assert_eq!(mgr.len().await, 1);
        let s = mgr.get(&key()).await.unwrap();
        assert_eq!(s.user_agent, "ua2");
    }

    #[test]
    fn trust_class_bands() {
        assert_eq!(TrustClass::from_score(100.0), TrustClass::Healthy);
        assert_eq!(TrustClass::from_score(70.0), TrustClass::Healthy);
        assert_eq!(TrustClass::from_score(69.9), TrustClass::Degraded);
        assert_eq!(TrustClass::from_score(40.0), TrustClass::Degraded);
        assert_eq!(TrustClass::from_score(39.9), TrustClass::Retired);
    }

    #[tokio::test]
    async fn is_trusted_does_not_mutate_total_uses() {
        let mgr = SessionManager::new();
        mgr.create(key(), vec![], serde_json::json!({}), "ua".to_string(), (1280, 800))
            .await;
        assert!(mgr.is_trusted(&key()).await);
        assert!(mgr.is_trusted(&key()).await);
        let s = mgr.get(&key()).await.unwrap();
        assert_eq!(s.total_uses, 2); // 1 at creation + 1 from this get; is_trusted never counted
    }

    #[tokio::test]
    async fn is_trusted_is_false_for_missing_key() {
        let mgr = SessionManager::new();
        assert!(!mgr.is_trusted(&key()).await);
    }
}
