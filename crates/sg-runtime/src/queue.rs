//! The broker-agnostic task queue protocol: a named task payload of
//! `{task_name, run_id, attempt, enqueued_at}`. The Orchestrator is the sole
//! consumer.
//!
//! [`TaskQueue`] is a trait so a real deployment can back it with whatever
//! broker it likes, while [`InMemoryTaskQueue`] gives tests and
//! single-process embeddings something to run against without one.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

/// Fixed task name every payload carries.
pub const RUNS_EXECUTE: &str = "runs.execute";

/// One unit of work pulled off the task queue: "one task = one run".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Always [`RUNS_EXECUTE`] in this engine; kept as a field (rather than
    /// hard-coded into the queue) so the wire shape is self-describing.
    pub task_name: String,
    /// Run to execute.
    pub run_id: Uuid,
    /// Attempt number this task represents, mirroring `Run.attempt` at
    /// enqueue time (diagnostic only — the orchestrator recomputes the
    /// authoritative attempt count from the persisted run).
    pub attempt: u32,
    /// When this task was enqueued.
    pub enqueued_at: DateTime<Utc>,
}

impl Task {
    /// Builds a `runs.execute` task for `run_id` at `attempt`.
    pub fn new(run_id: Uuid, attempt: u32) -> Self {
        Self {
            task_name: RUNS_EXECUTE.to_string(),
            run_id,
            attempt,
            enqueued_at: Utc::now(),
        }
    }
}

/// A broker-agnostic FIFO task source. A real deployment backs this with
/// its message broker of choice (the orchestrator never assumes ordering
/// beyond FIFO-per-consumer).
#[async_trait::async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueues a task.
    async fn push(&self, task: Task);
    /// Pops the next task, awaiting one if the queue is currently empty.
    /// Returns `None` only once the queue has been permanently closed.
    async fn pop(&self) -> Option<Task>;
}

struct Inner {
    tasks: VecDeque<Task>,
    closed: bool,
}

/// An in-memory, single-process [`TaskQueue`], suitable for the
/// zero-external-broker deployment and for tests.
pub struct InMemoryTaskQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl InMemoryTaskQueue {
    /// Creates an empty, open queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { tasks: VecDeque::new(), closed: false }),
            notify: Notify::new(),
        }
    }

    /// Stops accepting new pops once drained; any outstanding [`pop`](Self::pop)
    /// callers waiting on an empty queue are woken with `None`.
    pub async fn close(&self) {
        self.inner.lock().await.closed = true;
        self.notify.notify_waiters();
    }

    /// Number of tasks currently buffered.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.tasks.len()
    }

    /// `true` if no tasks are buffered.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.tasks.is_empty()
    }
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn push(&self, task: Task) {
        self.inner.lock().await.tasks.push_back(task);
        self.notify.notify_one();
    }

    async fn pop(&self) -> Option<Task> {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some(task) = inner.tasks.pop_front() {
                    return Some(task);
                }
                if inner.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_then_pop_is_fifo() {
        let queue = InMemoryTaskQueue::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        queue.push(Task::new(a, 1)).await;
        queue.push(Task::new(b, 1)).await;
        assert_eq!(queue.pop().await.unwrap().run_id, a);
        assert_eq!(queue.pop().await.unwrap().run_id, b);
    }

    #[tokio::test]
    async fn pop_waits_for_a_push() {
        let queue = std::sync::Arc::new(InMemoryTaskQueue::new());
        let waiter = queue.clone();
        let handle = tokio::spawn(async move { waiter.pop().await });
        tokio::task::yield_now().await;
        let run_id = Uuid::new_v4();
        queue.push(Task::new(run_id, 1)).await;
        let task = handle.await.unwrap().unwrap();
        assert_eq!(task.run_id, run_id);
    }

    #[tokio::test]
    async fn closed_empty_queue_returns_none() {
        let queue = std::sync::Arc::new(InMemoryTaskQueue::new());
        let waiter = queue.clone();
        let handle = tokio::spawn(async move { waiter.pop().await });
        tokio::task::yield_now().await;
        queue.close().await;
        assert!(handle.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn task_name_is_runs_execute() {
        let task = Task::new(Uuid::new_v4(), 1);
        assert_eq!(task.task_name, RUNS_EXECUTE);
    }
}
