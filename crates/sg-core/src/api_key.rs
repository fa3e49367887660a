use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One provider API key's credit ledger entry.
///
/// Invariant: `used_credits <= total_credits`, and `is_active` is `false`
/// exactly when `remaining() == 0`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ApiKey {
    /// Unique identifier.
    pub id: Uuid,
    /// Provider name, e.g. `"scraperapi"`.
    pub provider: String,
    /// Opaque key identifier (not the secret value itself).
    pub key_id: String,
    /// Total purchased/allotted credits.
    pub total_credits: u64,
    /// Credits consumed so far.
    pub used_credits: u64,
    /// Last time this key successfully served a request.
    pub last_used_at: Option<DateTime<Utc>>,
    /// Whether the key may still be selected by the ledger.
    pub is_active: bool,
}

impl ApiKey {
    /// Credits left on this key.
    pub fn remaining(&self) -> u64 {
        self.total_credits.saturating_sub(self.used_credits)
    }

    /// Whether this key's active flag is consistent with its remaining
    /// balance.
    pub fn active_flag_is_consistent(&self) -> bool {
        self.is_active == (self.remaining() > 0)
    }
}
