//! HTTP Executor: plain fetch, no JavaScript execution.

use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use sg_core::Tier;
use sg_error::{EngineError, FailureCode};
use sg_extract::page::FetchedPage;
use std::sync::LazyLock;

use crate::ExecutionOutcome;

/// Default per-attempt wall-clock timeout.
pub const DEFAULT_TIMEOUT_S: u64 = 20;

static JS_FRAMEWORK_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"__NEXT_DATA__|data-reactroot|ng-version|data-vue-|svelte-").unwrap()
});

static ROBOTS_NOINDEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta\s+name=["']robots["']\s+content=["'][^"']*noindex"#).unwrap()
});

/// Fetches a URL over plain HTTP(S). Never executes JavaScript.
pub struct HttpExecutor {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpExecutor {
    /// Builds an executor with the given per-request timeout.
    pub fn new(timeout_s: u64) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_s))
            .build()
            .map_err(|e| {
                EngineError::new(FailureCode::Unknown, "failed to build HTTP client").with_source(e)
            })?;
        Ok(Self { client, timeout: Duration::from_secs(timeout_s) })
    }

    /// Fetches `url`, returning the page plus the block/hint signals an
    /// attempt should record.
    pub async fn fetch(&self, url: &str, user_agent: Option<&str>) -> ExecutionOutcome<FetchedPage> {
        let mut request = self.client.get(url).timeout(self.timeout);
        request = request.header("Accept", "text/html,application/xhtml+xml");
        request = request.header("Accept-Language", "en-US,en;q=0.9");
        if let Some(ua) = user_agent {
            request = request.header("User-Agent", ua);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return ExecutionOutcome::failure(FailureCode::Timeout, vec![sg_core::signal::TIMEOUT.to_string()]);
            }
            Err(e) => {
                return ExecutionOutcome::failure(FailureCode::Network, vec![sg_core::signal::NETWORK.to_string()])
                    .with_message(e.to_string());
            }
        };

        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        let mut signals = Vec::new();
        if matches!(status, 401 | 403 | 429) {
            signals.push(sg_core::signal::BLOCKED.to_string());
            if status == 429 {
                signals.push(sg_core::signal::RATE_LIMITED.to_string());
            }
        }
        if (500..600).contains(&status) {
            signals.push(sg_core::signal::BAD_RESPONSE.to_string());
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                return ExecutionOutcome::failure(FailureCode::BadResponse, vec![sg_core::signal::BAD_RESPONSE.to_string()])
                    .with_message(e.to_string());
            }
        };

        if JS_FRAMEWORK_MARKERS.is_match(&body) || ROBOTS_NOINDEX.is_match(&body) {
            signals.push(sg_core::signal::JS_REQUIRED.to_string());
        }

        let page = FetchedPage {
            html: body,
            final_url,
            http_status: Some(status),
            engine: Tier::Http,
            fetched_at: Utc::now(),
        };

        if matches!(status, 401 | 403 | 429) || (500..600).contains(&status) {
            let code = if status == 429 {
                FailureCode::RateLimited
            } else if matches!(status, 401 | 403) {
                FailureCode::Blocked
            } else {
                FailureCode::BadResponse
            };
            return ExecutionOutcome::failure(code, signals).with_page(page);
        }

        ExecutionOutcome::success(page, signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn plain_page_has_no_signals() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><h1>Hi</h1></html>"))
            .mount(&server)
            .await;

        let executor = HttpExecutor::new(5).unwrap();
        let outcome = executor.fetch(&format!("{}/ok", server.uri()), None).await;
        assert!(outcome.signals.is_empty());
        assert!(outcome.failure_code.is_none());
    }

    #[tokio::test]
    async fn status_401_yields_blocked_signal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/denied"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let executor = HttpExecutor::new(5).unwrap();
        let outcome = executor.fetch(&format!("{}/denied", server.uri()), None).await;
        assert!(outcome.signals.contains(&sg_core::signal::BLOCKED.to_string()));
        assert_eq!(outcome.failure_code, Some(FailureCode::Blocked));
    }

    #[tokio::test]
    async fn status_429_yields_blocked_and_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let executor = HttpExecutor::new(5).unwrap();
        let outcome = executor.fetch(&format!("{}/slow", server.uri()), None).await;
        assert!(outcome.signals.contains(&sg_core::signal::BLOCKED.to_string()));
        assert!(outcome.signals.contains(&sg_core::signal::RATE_LIMITED.to_string()));
    }

    #[tokio::test]
    async fn status_500_yields_bad_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oops"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let executor = HttpExecutor::new(5).unwrap();
        let outcome = executor.fetch(&format!("{}/oops", server.uri()), None).await;
        assert_eq!(outcome.failure_code, Some(FailureCode::BadResponse));
    }

    #[tokio::test]
    async fn next_data_marker_yields_js_required() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/spa"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body><script id="__NEXT_DATA__">{}</script></body></html>"#,
            ))
            .mount(&server)
            .await;

        let executor = HttpExecutor::new(5).unwrap();
        let outcome = executor.fetch(&format!("{}/spa", server.uri()), None).await;
        assert!(outcome.signals.contains(&sg_core::signal::JS_REQUIRED.to_string()));
    }

    #[tokio::test]
    async fn robots_noindex_yields_js_required() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/noindex"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><head><meta name="robots" content="noindex,nofollow"></head></html>"#,
            ))
            .mount(&server)
            .await;

        let executor = HttpExecutor::new(5).unwrap();
        let outcome = executor.fetch(&format!("{}/noindex", server.uri()), None).await;
        assert!(outcome.signals.contains(&sg_core::signal::JS_REQUIRED.to_string()));
    }
}
