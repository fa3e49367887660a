//! Cooperative run cancellation: a flag the orchestrator checks between
//! steps and before each attempt, paired with a reason recorded at the
//! moment cancellation was requested.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

struct TokenInner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// A cheap, cloneable cooperative-cancellation flag. Checking it never
/// blocks; awaiting [`CancellationToken::cancelled`] does.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    /// Creates a fresh, not-yet-cancelled token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Marks the token cancelled. Idempotent: a second call is a no-op
    /// beyond waking any waiters again.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// `true` once [`Self::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token is cancelled. Returns immediately if it
    /// already is.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
            if self.is_cancelled() {
                return;
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken").field("cancelled", &self.is_cancelled()).finish()
    }
}

/// Why a run was cancelled, recorded for the `run.failed`/cancellation
/// event's diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationReason {
    /// An external caller requested cancellation directly.
    UserRequested,
    /// A wall-clock or attempt-budget timeout was hit.
    Timeout,
    /// Provider credit or attempt budget was exhausted mid-run.
    BudgetExhausted,
    /// The process is shutting down and in-flight runs must stop.
    SystemShutdown,
}

impl CancellationReason {
    /// Short human-readable description, suitable for a `RunEvent` message.
    pub fn description(&self) -> &'static str {
        match self {
            Self::UserRequested => "cancelled by request",
            Self::Timeout => "cancelled: timed out",
            Self::BudgetExhausted => "cancelled: budget exhausted",
            Self::SystemShutdown => "cancelled: system shutting down",
        }
    }
}

/// A [`CancellationToken`] plus the first reason it was cancelled for.
/// Bundled together because the orchestrator needs both to classify a
/// cancelled run's terminal event.
pub struct CancellableRun {
    token: CancellationToken,
    reason: Arc<Mutex<Option<CancellationReason>>>,
}

impl CancellableRun {
    /// Wraps an existing token.
    pub fn new(token: CancellationToken) -> Self {
        Self { token, reason: Arc::new(Mutex::new(None)) }
    }

    /// Cancels the run, recording `reason` only if this is the first
    /// cancellation (a later call with a different reason does not
    /// overwrite the original cause).
    pub fn cancel(&self, reason: CancellationReason) {
        let mut guard = self.reason.lock().unwrap();
        if guard.is_none() {
            *guard = Some(reason);
        }
        drop(guard);
        self.token.cancel();
    }

    /// `true` if cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The recorded reason, if cancelled.
    pub fn reason(&self) -> Option<CancellationReason> {
        *self.reason.lock().unwrap()
    }

    /// The underlying token, for passing into a `tokio::select!`.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
