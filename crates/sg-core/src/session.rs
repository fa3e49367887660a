use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Identifies a session pool slot: one per (site domain, proxy identity).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct SessionKey {
    /// Registrable domain the session is scoped to.
    pub site_domain: String,
    /// Proxy identity in use, or `"default"` when none is configured.
    pub proxy_identity: String,
}

impl SessionKey {
    /// Builds a key with the default proxy identity.
    pub fn new(site_domain: impl Into<String>) -> Self {
        Self {
            site_domain: site_domain.into(),
            proxy_identity: "default".to_string(),
        }
    }
}

/// A single serialized cookie captured from the browser context.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Domain the cookie is scoped to.
    pub domain: String,
    /// Path the cookie is scoped to.
    pub path: String,
    /// `true` if the cookie requires HTTPS.
    pub secure: bool,
    /// `true` if the cookie is inaccessible to page JS.
    pub http_only: bool,
}

/// Reusable authenticated browser state for one `(domain, proxy)` pair.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Session {
    /// Captured cookies.
    pub cookies: Vec<Cookie>,
    /// Opaque per-origin storage-state blob (localStorage/sessionStorage
    /// snapshot), serialized exactly as the browser driver returned it.
    pub storage_state: serde_json::Value,
    /// User-Agent the session was captured under.
    pub user_agent: String,
    /// Viewport the session was captured under, `(width, height)`.
    pub viewport: (u32, u32),
    /// When this session entry was created.
    pub created_at: DateTime<Utc>,
    /// Last time a run using this session completed successfully.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Total number of runs that have reused this session.
    pub total_uses: u32,
    /// Consecutive failures since the last success.
    pub failure_streak: u32,
}

impl Session {
    /// Computes the trust score on read, per the formula:
    /// start at 100; subtract `(age_minutes - 60) * 0.5` past an hour;
    /// subtract `failure_streak * 15`; add 20 if a success landed in the
    /// last 5 minutes; subtract `(total_uses - 50)` past 50 uses; clamp to
    /// `[0, 100]`.
    pub fn trust_score(&self, now: DateTime<Utc>) -> f64 {
        let age_minutes = (now - self.created_at).num_seconds() as f64 / 60.0;
        let mut score = 100.0;
        if age_minutes > 60.0 {
            score -= (age_minutes - 60.0) * 0.5;
        }
        score -= self.failure_streak as f64 * 15.0;
        if let Some(last) = self.last_success_at {
            if (now - last).num_seconds() <= 5 * 60 {
                score += 20.0;
            }
        }
        if self.total_uses > 50 {
            score -= (self.total_uses - 50) as f64;
        }
        score.clamp(0.0, 100.0)
    }

    /// Age of this session entry in whole minutes.
    pub fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_minutes()
    }
}
