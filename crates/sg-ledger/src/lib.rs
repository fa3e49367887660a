//! The API-Key Ledger: tracks remaining credits for provider keys,
//! selects the key with the most remaining credits on each reservation,
//! and auto-deactivates keys once exhausted or auth-rejected.
//!
//! Mirrors [`sg_session::SessionManager`]'s lock discipline: one exclusive
//! [`tokio::sync::RwLock`] over the key map, no I/O held across it.
//! `reserve` both *picks* the best key and *spends* its credit in the same
//! critical section, so two concurrent reservations never race each other
//! onto the same unit of credit.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::Utc;
use sg_core::ApiKey;
use sg_error::{EngineError, FailureCode};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Why a provider call against a reserved key failed, for
/// [`ApiKeyLedger::record_failure`]'s deactivation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFailureKind {
    /// 401/403 from the provider: the key itself is no good.
    AuthRejected,
    /// 451 or another hard, final block unrelated to the key's validity.
    HardBlock,
    /// 5xx or other transient provider failure.
    Transient,
}

/// A key handed out by [`ApiKeyLedger::reserve`], already debited one
/// credit.
#[derive(Debug, Clone)]
pub struct ReservedKey {
    /// Ledger-internal key identity.
    pub id: Uuid,
    /// Provider this key authenticates against.
    pub provider: String,
    /// Opaque key identifier (not the secret), for diagnostics/headers.
    pub key_id: String,
    /// Credits left on this key *after* this reservation's debit.
    pub remaining_after: u64,
}

/// Aggregate, per-provider ledger stats for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderSummary {
    /// Provider name.
    pub provider: String,
    /// Number of keys registered for this provider.
    pub key_count: u32,
    /// Number of keys still active.
    pub active_key_count: u32,
    /// Sum of remaining credits across active keys.
    pub total_remaining: u64,
}

/// Shared, process-local ledger of provider API keys.
pub struct ApiKeyLedger {
    keys: RwLock<HashMap<Uuid, ApiKey>>,
}

impl ApiKeyLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a key (or replaces one with the same `id`).
    pub async fn add_key(&self, key: ApiKey) {
        self.keys.write().await.insert(key.id, key);
    }

    /// Reserves a credit for `provider`: picks the active key with the most
    /// remaining credit, debits one unit, and returns a handle to it.
    ///
    /// Returns [`FailureCode::NoProviderKey`] if no active key for this
    /// provider has remaining credit.
    pub async fn reserve(&self, provider: &str) -> Result<ReservedKey, EngineError> {
        let mut keys = self.keys.write().await;
        let best = keys
            .values_mut()
            .filter(|k| k.provider == provider && k.is_active && k.remaining() > 0)
            .max_by_key(|k| k.remaining());

        let Some(key) = best else {
            warn!(target: "sg.ledger", provider, "no active key with remaining credit");
            return Err(EngineError::new(
                FailureCode::NoProviderKey,
                "no active provider key with remaining credit",
            )
            .with_context("provider", provider.to_string()));
        };

        key.used_credits += 1;
        let remaining_after = key.remaining();
        if remaining_after == 0 {
            key.is_active = false;
        }
        info!(
            target: "sg.ledger",
            provider,
            key_id = %key.key_id,
            remaining_after,
            "reserved provider credit"
        );
        Ok(ReservedKey {
            id: key.id,
            provider: key.provider.clone(),
            key_id: key.key_id.clone(),
            remaining_after,
        })
    }

    /// Records that a reserved key's request succeeded: refreshes
    /// `last_used_at`. Does not refund the credit — it was already spent
    /// at reservation time.
    pub async fn record_success(&self, key_id: Uuid) {
        let mut keys = self.keys.write().await;
        if let Some(key) = keys.get_mut(&key_id) {
            key.last_used_at = Some(Utc::now());
        }
    }

    /// Records a failed call against a reserved key. Auth-class rejections
    /// deactivate the key outright so subsequent reservations skip it;
    /// hard blocks and transient failures leave the key's activation
    /// untouched (the credit was already spent by `reserve`).
    pub async fn record_failure(&self, key_id: Uuid, kind: KeyFailureKind) {
        let mut keys = self.keys.write().await;
        let Some(key) = keys.get_mut(&key_id) else {
            return;
        };
        if matches!(kind, KeyFailureKind::AuthRejected) {
            key.is_active = false;
            info!(target: "sg.ledger", key_id = %key.key_id, "deactivated key after auth rejection");
        }
    }

    /// Whether any active key for `provider` still has remaining credit,
    /// without reserving one.
    pub async fn has_capacity(&self, provider: &str) -> bool {
        self.keys
            .read()
            .await
            .values()
            .any(|k| k.provider == provider && k.is_active && k.remaining() > 0)
    }

    /// Aggregate per-provider summary across all registered keys.
    pub async fn summary(&self, provider: &str) -> ProviderSummary {
        let keys = self.keys.read().await;
        let mut summary = ProviderSummary {
            provider: provider.to_string(),
            ..Default::default()
        };
        for key in keys.values().filter(|k| k.provider == provider) {
            summary.key_count += 1;
            if key.is_active {
                summary.active_key_count += 1;
                summary.total_remaining += key.remaining();
            }
        }
        summary
    }

    /// Snapshot of a single key by id, for diagnostics/tests.
    pub async fn get(&self, key_id: Uuid) -> Option<ApiKey> {
        self.keys.read().await.get(&key_id).cloned()
    }
}

impl Default for ApiKeyLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(provider: &str, total: u64, used: u64) -> ApiKey {
        ApiKey {
            id: Uuid::new_v4(),
            provider: provider.to_string(),
            key_id: format!("key-{total}-{used}"),
            total_credits: total,
            used_credits: used,
            last_used_at: None,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn reserve_picks_key_with_most_remaining() {
        let ledger = ApiKeyLedger::new();
        let low = key("scraperapi", 10, 8); // 2 remaining
        let high = key("scraperapi", 100, 10); // 90 remaining
        let high_id = high.id;
        ledger.add_key(low).await;
        ledger.add_key(high).await;

        let reserved = ledger.reserve("scraperapi").await.unwrap();
        assert_eq!(reserved.id, high_id);
        assert_eq!(reserved.remaining_after, 89);
    }

    #[tokio::test]
    async fn reserve_fails_when_no_capacity() {
        let ledger = ApiKeyLedger::new();
        ledger.add_key(key("scraperapi", 5, 5)).await;
        let err = ledger.reserve("scraperapi").await.unwrap_err();
        assert_eq!(err.code, FailureCode::NoProviderKey);
    }

    #[tokio::test]
    async fn exhausting_last_credit_deactivates_key() {
        let ledger = ApiKeyLedger::new();
        let k = key("scraperapi", 1, 0);
        let id = k.id;
        ledger.add_key(k).await;

        ledger.reserve("scraperapi").await.unwrap();
        let stored = ledger.get(id).await.unwrap();
        assert!(!stored.is_active);
        assert!(ledger.reserve("scraperapi").await.is_err());
    }

    #[tokio::test]
    async fn auth_rejection_deactivates_key_even_with_credit_left() {
        let ledger = ApiKeyLedger::new();
        let k = key("scraperapi", 100, 0);
        let id = k.id;
        ledger.add_key(k).await;

        let reserved = ledger.reserve("scraperapi").await.unwrap();
        ledger.record_failure(reserved.id, KeyFailureKind::AuthRejected).await;
        let stored = ledger.get(id).await.unwrap();
        assert!(!stored.is_active);
        assert!(ledger.reserve("scraperapi").await.is_err());
    }

    #[tokio::test]
    async fn hard_block_does_not_deactivate_key() {
        let ledger = ApiKeyLedger::new();
        let k = key("scraperapi", 100, 0);
        ledger.add_key(k).await;

        let reserved = ledger.reserve("scraperapi").await.unwrap();
        ledger.record_failure(reserved.id, KeyFailureKind::HardBlock).await;
        let stored = ledger.get(reserved.id).await.unwrap();
        assert!(stored.is_active);
    }

    #[tokio::test]
    async fn record_success_sets_last_used_at() {
        let ledger = ApiKeyLedger::new();
        let k = key("scraperapi", 100, 0);
        ledger.add_key(k).await;
        let reserved = ledger.reserve("scraperapi").await.unwrap();
        ledger.record_success(reserved.id).await;
        let stored = ledger.get(reserved.id).await.unwrap();
        assert!(stored.last_used_at.is_some());
    }

    #[tokio::test]
    async fn summary_counts_only_active_remaining() {
        let ledger = ApiKeyLedger::new();
        ledger.add_key(key("scraperapi", 100, 50)).await; // 50 remaining, active
        ledger.add_key(key("scraperapi", 20, 20)).await; // 0 remaining -> reserve would flip it but it starts active=true with 0 remaining
        let summary = ledger.summary("scraperapi").await;
        assert_eq!(summary.key_count, 2);
        assert_eq!(summary.total_remaining, 50);
    }

    #[tokio::test]
    async fn reserve_ignores_other_providers() {
        let ledger = ApiKeyLedger::new();
        ledger.add_key(key("other", 100, 0)).await;
        assert!(ledger.reserve("scraperapi").await.is_err());
    }

    #[tokio::test]
    async fn has_capacity_reflects_active_remaining() {
        let ledger = ApiKeyLedger::new();
        assert!(!ledger.has_capacity("scraperapi").await);
        ledger.add_key(key("scraperapi", 1, 0)).await;
        assert!(ledger.has_capacity("scraperapi").await);
    }
}
