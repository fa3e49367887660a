//! Browser Executor: headless-browser page load with session reuse,
//! stability fixtures, consent-modal handling, and human-like pacing.
//!
//! The I/O-heavy driving code (launch, navigate, click) is only exercisable
//! against a real Chromium binary and is left as integration surface. The
//! parts that most need exhaustive unit coverage — block markers, consent
//! selectors, and the generic consent-text pattern — are plain, synchronous
//! functions at the bottom of this file so they're testable without
//! spinning up a browser.

use std::sync::LazyLock;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::{Browser, BrowserConfig, Page};
use rand::Rng;
use regex::Regex;
use sg_core::job::BrowserProfile;
use sg_core::session::Cookie as SgCookie;
use sg_core::{Job, Session, SessionKey, Tier};
use sg_error::{EngineError, FailureCode};
use sg_extract::page::FetchedPage;
use sg_session::SessionManager;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use crate::ExecutionOutcome;

/// Default per-attempt navigation timeout.
pub const DEFAULT_NAV_TIMEOUT_MS: u64 = 30_000;

/// A fixed, reproducible fallback profile, used when a job declares none.
/// Per the design notes, fingerprint stability (not randomization) is the
/// goal; only this one profile and per-job overrides ever apply.
pub fn default_profile() -> BrowserProfile {
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string(),
        viewport_width: 1366,
        viewport_height: 768,
        locale: "en-US".to_string(),
        timezone: "America/New_York".to_string(),
        color_scheme: "light".to_string(),
    }
}

/// Stable pre-navigation script disabling the automation tells a target
/// site might probe for. Deliberately small and fixed — no randomized
/// fingerprinting, per the design notes.
const STABILITY_FIXTURE_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
Object.defineProperty(navigator, 'hardwareConcurrency', { get: () => 8 });
Object.defineProperty(navigator, 'deviceMemory', { get: () => 8 });
Object.defineProperty(navigator, 'connection', { get: () => ({ effectiveType: '4g', rtt: 50, downlink: 10 }) });
"#;

/// Known cookie-consent widget selectors, tried in order before falling
/// back to the generic text-pattern match.
const CONSENT_SELECTORS: &[&str] = &[
    "#onetrust-accept-btn-handler",
    "button[aria-label='Accept all']",
    "button[aria-label='Accept All']",
    ".cc-btn.cc-allow",
    "#accept-cookie-notification",
    "button#acceptCookies",
    "button#didomi-notice-agree-button",
];

static CONSENT_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(i\s*agree|accept(\s+all)?|agree|allow\s+all)\s*$").unwrap());

static HARD_BLOCK_MARKERS: &[&str] = &[
    "checking your browser",
    "access denied",
    "verify you are human",
    "cloudflare",
    "captcha",
];

/// Headless-browser executor. Launches a fresh Chromium instance per
/// attempt; the session pool (not the OS process) is what's reused across
/// attempts.
pub struct BrowserExecutor {
    session_manager: Arc<SessionManager>,
    nav_timeout: Duration,
}

impl BrowserExecutor {
    /// Builds an executor backed by `session_manager`.
    pub fn new(session_manager: Arc<SessionManager>, nav_timeout_ms: u64) -> Self {
        Self { session_manager, nav_timeout: Duration::from_millis(nav_timeout_ms) }
    }

    /// Runs the full C4 contract for `job`: session consult, stability
    /// fixtures, navigation, consent handling, pacing, selector-ready page
    /// capture, and session capture/failure recording.
    pub async fn execute(&self, job: &Job) -> ExecutionOutcome<FetchedPage> {
        let profile = job.browser_profile.clone().unwrap_or_else(default_profile);
        let key = match session_key_for(&job.target_url) {
            Ok(k) => k,
            Err(e) => return ExecutionOutcome::failure(FailureCode::Unknown, vec![]).with_message(e.to_string()),
        };

        let existing = self.session_manager.get(&key).await;
        let reused = existing.is_some();

        let outcome = self.run_attempt(job, &profile, existing.as_ref()).await;

        match &outcome {
            Ok((page, signals)) if !signals.iter().any(|s| is_terminal_signal(s)) => {
                if reused {
                    self.session_manager.mark_success(&key).await;
                } else if let Some(captured) = &page.1 {
                    self.session_manager
                        .create(key, captured.cookies.clone(), captured.storage_state.clone(), profile.user_agent.clone(), (profile.viewport_width, profile.viewport_height))
                        .await;
                }
                ExecutionOutcome::success(page.0.clone(), signals.clone())
            }
            Ok((page, signals)) => {
                self.session_manager.mark_failure(&key).await;
                let code = failure_code_for(signals);
                ExecutionOutcome::failure(code, signals.clone()).with_page(page.0.clone())
            }
            Err(e) => {
                self.session_manager.mark_failure(&key).await;
                ExecutionOutcome::failure(FailureCode::Timeout, vec![sg_core::signal::NAVIGATION_FAILED.to_string()])
                    .with_message(e.to_string())
            }
        }
    }

    async fn run_attempt(
        &self,
        job: &Job,
        profile: &BrowserProfile,
        existing: Option<&Session>,
    ) -> Result<((FetchedPage, Option<CapturedState>), Vec<String>), EngineError> {
        let config = BrowserConfig::builder()
            .window_size(profile.viewport_width, profile.viewport_height)
            .build()
            .map_err(|e| EngineError::new(FailureCode::Unknown, "failed to build browser config").with_context("error", e))?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| EngineError::new(FailureCode::Unknown, "failed to launch browser").with_source(e))?;

        let _handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| EngineError::new(FailureCode::Unknown, "failed to open page").with_source(e))?;

        page.evaluate_on_new_document(STABILITY_FIXTURE_SCRIPT)
            .await
            .map_err(|e| EngineError::new(FailureCode::Unknown, "failed to install stability fixtures").with_source(e))?;

        if let Some(session) = existing {
            let cookie_params: Vec<CookieParam> = session
                .cookies
                .iter()
                .filter_map(|c| {
                    CookieParam::builder()
                        .name(c.name.clone())
                        .value(c.value.clone())
                        .domain(c.domain.clone())
                        .path(c.path.clone())
                        .secure(c.secure)
                        .http_only(c.http_only)
                        .build()
                        .ok()
                })
                .collect();
            if !cookie_params.is_empty() {
                let _ = page.set_cookies(cookie_params).await;
            }
        }

        let navigation = tokio::time::timeout(self.nav_timeout, async {
            page.goto(&job.target_url).await?;
            page.wait_for_navigation().await
        })
        .await;

        let mut signals = Vec::new();
        let nav_ok = match navigation {
            Ok(Ok(_)) => true,
            Ok(Err(_)) | Err(_) => {
                signals.push(sg_core::signal::NAVIGATION_FAILED.to_string());
                false
            }
        };

        if nav_ok {
            if let Some(session) = existing {
                if !session.storage_state.is_null() {
                    let script = hydrate_storage_script(&session.storage_state);
                    let _ = page.evaluate(script).await;
                    let _ = page.reload().await;
                }
            }
            pace_like_a_human(&page).await;
            handle_consent(&page).await;
        }

        let html = page.content().await.unwrap_or_default();

        if contains_hard_block_marker(&html) {
            signals.push(sg_core::signal::HARD_BLOCK.to_string());
            if html.to_lowercase().contains("captcha") {
                signals.push(sg_core::signal::CAPTCHA.to_string());
            }
        }

        let captured = if nav_ok && !signals.iter().any(|s| is_terminal_signal(s)) {
            let cookies = page
                .get_cookies()
                .await
                .unwrap_or_default()
                .into_iter()
                .map(|c| SgCookie {
                    name: c.name,
                    value: c.value,
                    domain: c.domain,
                    path: c.path,
                    secure: c.secure,
                    http_only: c.http_only,
                })
                .collect();
            let storage_state = match page.evaluate(STORAGE_SNAPSHOT_SCRIPT).await {
                Ok(result) => result
                    .into_value::<String>()
                    .ok()
                    .and_then(|raw| serde_json::from_str(&raw).ok())
                    .unwrap_or_else(|| serde_json::json!({})),
                Err(_) => serde_json::json!({}),
            };
            Some(CapturedState { cookies, storage_state })
        } else {
            None
        };

        let page_result = FetchedPage {
            html,
            final_url: job.target_url.clone(),
            http_status: None,
            engine: Tier::Browser,
            fetched_at: chrono::Utc::now(),
        };

        let _ = browser.close().await;
        Ok(((page_result, captured), signals))
    }
}

#[derive(Debug, Clone)]
struct CapturedState {
    cookies: Vec<SgCookie>,
    storage_state: serde_json::Value,
}

async fn pace_like_a_human(page: &Page) {
    let wait_ms = rand::thread_rng().gen_range(300..=800);
    tokio::time::sleep(Duration::from_millis(wait_ms)).await;
    let _ = page.evaluate("window.scrollBy(0, 200)").await;
}

async fn handle_consent(page: &Page) {
    for selector in CONSENT_SELECTORS {
        if let Ok(element) = page.find_element(selector).await {
            let _ = element.hover().await;
            let jitter_ms = rand::thread_rng().gen_range(50..=150);
            tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
            if element.click().await.is_ok() {
                tokio::time::sleep(Duration::from_millis(400)).await;
                return;
            }
        }
    }

    if let Ok(buttons) = page.find_elements("button, a, input[type=submit]").await {
        for button in buttons {
            if let Ok(Some(text)) = button.inner_text().await {
                if CONSENT_TEXT_RE.is_match(text.trim()) {
                    let _ = button.hover().await;
                    if button.click().await.is_ok() {
                        tokio::time::sleep(Duration::from_millis(400)).await;
                        return;
                    }
                }
            }
        }
    }
}

const STORAGE_SNAPSHOT_SCRIPT: &str = r#"
(() => {
  const dump = (storage) => {
    const out = {};
    for (let i = 0; i < storage.length; i++) {
      const k = storage.key(i);
      out[k] = storage.getItem(k);
    }
    return out;
  };
  return JSON.stringify({ local: dump(window.localStorage), session: dump(window.sessionStorage) });
})()
"#;

fn hydrate_storage_script(storage_state: &serde_json::Value) -> String {
    format!(
        r#"
(() => {{
  const state = {storage_state};
  const apply = (storage, values) => {{
    if (!values) return;
    for (const [k, v] of Object.entries(values)) storage.setItem(k, v);
  }};
  apply(window.localStorage, state.local);
  apply(window.sessionStorage, state.session);
}})()
"#,
        storage_state = storage_state
    )
}

fn session_key_for(target_url: &str) -> Result<SessionKey, EngineError> {
    let parsed = url::Url::parse(target_url)
        .map_err(|e| EngineError::new(FailureCode::Unknown, "invalid target URL").with_source(e))?;
    let domain = parsed
        .host_str()
        .ok_or_else(|| EngineError::new(FailureCode::Unknown, "target URL has no host"))?;
    Ok(SessionKey::new(domain))
}

/// `true` for a signal that should block session capture / trigger retire.
fn is_terminal_signal(signal: &str) -> bool {
    signal == sg_core::signal::HARD_BLOCK || signal == sg_core::signal::NAVIGATION_FAILED
}

fn failure_code_for(signals: &[String]) -> FailureCode {
    if signals.iter().any(|s| s == sg_core::signal::HARD_BLOCK) {
        FailureCode::HardBlock
    } else if signals.iter().any(|s| s == sg_core::signal::NAVIGATION_FAILED) {
        FailureCode::Timeout
    } else {
        FailureCode::Unknown
    }
}

/// Case-insensitive substring match against the fixed hard-block marker
/// list (checking your browser / access denied / verify you are human /
/// cloudflare / captcha).
fn contains_hard_block_marker(body: &str) -> bool {
    let lower = body.to_lowercase();
    HARD_BLOCK_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_each_hard_block_marker_case_insensitively() {
        for marker in HARD_BLOCK_MARKERS {
            let body = format!("<html>{}</html>", marker.to_uppercase());
            assert!(contains_hard_block_marker(&body), "marker {marker} not detected");
        }
    }

    #[test]
    fn plain_page_has_no_hard_block_marker() {
        assert!(!contains_hard_block_marker("<html><h1>Welcome</h1></html>"));
    }

    #[test]
    fn consent_text_matches_common_phrases() {
        for phrase in ["I Agree", "Accept", "Accept All", "agree", "Allow All"] {
            assert!(CONSENT_TEXT_RE.is_match(phrase), "phrase {phrase} should match");
        }
    }

    #[test]
    fn consent_text_rejects_unrelated_labels() {
        for phrase in ["Learn more", "Settings", "Reject all"] {
            assert!(!CONSENT_TEXT_RE.is_match(phrase), "phrase {phrase} should not match");
        }
    }

    #[test]
    fn failure_code_prioritizes_hard_block_over_navigation_failed() {
        let signals = vec![sg_core::signal::HARD_BLOCK.to_string(), sg_core::signal::NAVIGATION_FAILED.to_string()];
        assert_eq!(failure_code_for(&signals), FailureCode::HardBlock);
    }

    #[test]
    fn session_key_uses_host_only() {
        let key = session_key_for("https://example.com/path?x=1").unwrap();
        assert_eq!(key.site_domain, "example.com");
        assert_eq!(key.proxy_identity, "default");
    }

    #[test]
    fn default_profile_is_stable_across_calls() {
        assert_eq!(default_profile().user_agent, default_profile().user_agent);
        assert_eq!(default_profile().viewport_width, 1366);
    }
}
