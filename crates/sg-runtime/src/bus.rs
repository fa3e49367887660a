//! At-least-once, in-process pub/sub fan-out for [`RunEvent`]s, built as a
//! thin wrapper around a [`tokio::sync::broadcast`] channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use sg_core::RunEvent;
use tokio::sync::broadcast;

/// Default channel capacity (events buffered per subscriber before a slow
/// reader starts lagging).
const DEFAULT_CAPACITY: usize = 256;

struct StatsInner {
    total_published: AtomicU64,
    dropped_events: AtomicU64,
}

/// Broadcaster for [`RunEvent`]s. Cloning a `EventBus` is not how fan-out
/// works here — subscribers call [`EventBus::subscribe`] to get their own
/// receiver; the bus itself is shared via `Arc`.
pub struct EventBus {
    tx: broadcast::Sender<RunEvent>,
    stats: Arc<StatsInner>,
}

impl EventBus {
    /// Creates a bus with [`DEFAULT_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a bus with an explicit per-subscriber buffer size.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            tx,
            stats: Arc::new(StatsInner {
                total_published: AtomicU64::new(0),
                dropped_events: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribes to every event published from here on.
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription { rx: self.tx.subscribe(), stats: self.stats.clone() }
    }

    /// Subscribes to events matching `filter`, e.g. a single `run_id`.
    pub fn subscribe_filtered(
        &self,
        filter: impl Fn(&RunEvent) -> bool + Send + Sync + 'static,
    ) -> FilteredSubscription {
        FilteredSubscription { inner: self.subscribe(), filter: Box::new(filter) }
    }

    /// Publishes `event` to every current subscriber. A send with zero
    /// subscribers is not an error; it is counted as a drop for visibility.
    pub fn publish(&self, event: RunEvent) {
        self.stats.total_published.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(event).is_err() {
            self.stats.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Current subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Snapshot of publish/drop/subscriber counters.
    pub fn stats(&self) -> EventBusStats {
        EventBusStats {
            total_published: self.stats.total_published.load(Ordering::Relaxed),
            active_subscribers: self.subscriber_count(),
            dropped_events: self.stats.dropped_events.load(Ordering::Relaxed),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscription to every event on a bus, from the point it was created.
pub struct EventSubscription {
    rx: broadcast::Receiver<RunEvent>,
    stats: Arc<StatsInner>,
}

impl EventSubscription {
    /// Awaits the next event, transparently skipping past any `Lagged`
    /// gap (the subscriber fell behind and missed some events — counted,
    /// not surfaced as an error). Returns `None` once the bus is closed.
    pub async fn recv(&mut self) -> Option<RunEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    self.stats.dropped_events.fetch_add(skipped, Ordering::Relaxed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking poll for the next event, if one is already buffered.
    pub fn try_recv(&mut self) -> Option<RunEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    self.stats.dropped_events.fetch_add(skipped, Ordering::Relaxed);
                    continue;
                }
                Err(_) => return None,
            }
        }
    }
}

/// An [`EventSubscription`] narrowed to events passing a predicate, e.g.
/// `run_id == target`.
pub struct FilteredSubscription {
    inner: EventSubscription,
    filter: Box<dyn Fn(&RunEvent) -> bool + Send + Sync>,
}

impl FilteredSubscription {
    /// Awaits the next event passing the filter.
    pub async fn recv(&mut self) -> Option<RunEvent> {
        loop {
            let event = self.inner.recv().await?;
            if (self.filter)(&event) {
                return Some(event);
            }
        }
    }

    /// Non-blocking poll for the next event passing the filter.
    pub fn try_recv(&mut self) -> Option<RunEvent> {
        loop {
            let event = self.inner.try_recv()?;
            if (self.filter)(&event) {
                return Some(event);
            }
        }
    }
}

/// Point-in-time counters for a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventBusStats {
    /// Total events ever published.
    pub total_published: u64,
    /// Current subscriber count.
    pub active_subscribers: usize,
    /// Events dropped: either no subscriber was listening, or a
    /// subscriber lagged past its buffer.
    pub dropped_events: u64,
}
