//! sg-runtime
//!
//! The Run Orchestrator and its supporting runtime primitives: the task
//! queue, the event bus, cooperative cancellation, back-off, and the
//! storage-boundary traits. Every other component crate (sg-executors,
//! sg-extract, sg-escalation, sg-session, sg-ledger) is a pure or
//! I/O-scoped dependency this crate wires together into one run-driving
//! loop; nothing downstream of here calls back into it.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Exponential back-off delay calculation for same-tier retries.
pub mod backoff;
/// Broadcast-based event bus for run progress fan-out.
pub mod bus;
/// Cooperative cancellation primitives for in-flight runs.
pub mod cancel;
/// The Run Orchestrator: the tier-loop state machine driving one run.
pub mod orchestrator;
/// Broker-agnostic task queue protocol.
pub mod queue;
/// Storage-boundary traits for jobs, runs, records, and interventions.
pub mod store;

pub use orchestrator::{run_worker, Orchestrator};
pub use queue::{InMemoryTaskQueue, Task, TaskQueue};
pub use store::Stores;
