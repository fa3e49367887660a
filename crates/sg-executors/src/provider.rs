//! Provider Executor: thin shim over an external paid scraping API,
//! accounted against the [`ApiKeyLedger`].

use std::time::Duration;

use chrono::Utc;
use sg_core::Tier;
use sg_error::{EngineError, FailureCode};
use sg_extract::page::FetchedPage;
use sg_ledger::{ApiKeyLedger, KeyFailureKind};
use std::sync::Arc;

use crate::ExecutionOutcome;

/// Default per-attempt wall-clock timeout.
pub const DEFAULT_TIMEOUT_S: u64 = 60;

/// Request body sent to the paid provider.
#[derive(Debug, Clone, serde::Serialize)]
struct ProviderRequest<'a> {
    url: &'a str,
    render_js: bool,
    premium: bool,
}

/// Wraps an external paid scraping API, reserving one credit per request.
pub struct ProviderExecutor {
    client: reqwest::Client,
    ledger: Arc<ApiKeyLedger>,
    provider: String,
    base_url: String,
    timeout: Duration,
}

impl ProviderExecutor {
    /// Builds an executor for `provider`, issuing requests to `base_url`.
    pub fn new(ledger: Arc<ApiKeyLedger>, provider: impl Into<String>, base_url: impl Into<String>, timeout_s: u64) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_s))
            .build()
            .map_err(|e| EngineError::new(FailureCode::Unknown, "failed to build HTTP client").with_source(e))?;
        Ok(Self {
            client,
            ledger,
            provider: provider.into(),
            base_url: base_url.into(),
            timeout: Duration::from_secs(timeout_s),
        })
    }

    /// Reserves a credit and fetches `url` through the provider.
    ///
    /// On a 401/403 the reserved key is deactivated and the next active key
    /// is reserved and tried immediately, within this same attempt — per
    /// spec §4.5 ("deactivate key, try next active key"). The loop is
    /// bounded by the ledger itself: each auth rejection permanently
    /// deactivates a key, so it terminates once every active key has been
    /// tried. If no key was ever available to begin with, the signal is
    /// `no_provider_key`; if one or more keys were tried and all were
    /// auth-rejected, the signal is `blocked` (a real, escalatable rejection
    /// rather than an empty ledger).
    pub async fn execute(&self, url: &str) -> ExecutionOutcome<FetchedPage> {
        let mut credits_spent: u32 = 0;

        loop {
            let reserved = match self.ledger.reserve(&self.provider).await {
                Ok(r) => r,
                Err(_) => {
                    let code = if credits_spent > 0 { FailureCode::Blocked } else { FailureCode::NoProviderKey };
                    let signal = if credits_spent > 0 { sg_core::signal::BLOCKED } else { sg_core::signal::NO_PROVIDER_KEY };
                    return ExecutionOutcome::failure(code, vec![signal.to_string()]).with_cost(credits_spent);
                }
            };
            credits_spent += 1;

            let body = ProviderRequest { url, render_js: true, premium: false };
            let response = self
                .client
                .post(&self.base_url)
                .timeout(self.timeout)
                .header("X-Api-Key", &reserved.key_id)
                .json(&body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) if e.is_timeout() => {
                    return ExecutionOutcome::failure(FailureCode::Timeout, vec![sg_core::signal::TIMEOUT.to_string()])
                        .with_cost(credits_spent);
                }
                Err(e) => {
                    return ExecutionOutcome::failure(FailureCode::Network, vec![sg_core::signal::NETWORK.to_string()])
                        .with_message(e.to_string())
                        .with_cost(credits_spent);
                }
            };

            let status = response.status().as_u16();

            if matches!(status, 401 | 403) {
                self.ledger.record_failure(reserved.id, KeyFailureKind::AuthRejected).await;
                continue;
            }
            if status == 451 {
                self.ledger.record_failure(reserved.id, KeyFailureKind::HardBlock).await;
                return ExecutionOutcome::failure(FailureCode::HardBlock, vec![sg_core::signal::HARD_BLOCK.to_string()])
                    .with_cost(credits_spent);
            }
            if (500..600).contains(&status) {
                self.ledger.record_failure(reserved.id, KeyFailureKind::Transient).await;
                return ExecutionOutcome::failure(FailureCode::BadResponse, vec![sg_core::signal::BAD_RESPONSE.to_string()])
                    .with_cost(credits_spent);
            }

            let html = match response.text().await {
                Ok(b) => b,
                Err(e) => {
                    return ExecutionOutcome::failure(FailureCode::BadResponse, vec![sg_core::signal::BAD_RESPONSE.to_string()])
                        .with_message(e.to_string())
                        .with_cost(credits_spent);
                }
            };

            self.ledger.record_success(reserved.id).await;

            let page = FetchedPage {
                html,
                final_url: url.to_string(),
                http_status: Some(status),
                engine: Tier::Provider,
                fetched_at: Utc::now(),
            };
            return ExecutionOutcome::success(page, vec![]).with_cost(credits_spent);
        }
    }
}
