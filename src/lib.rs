//! An elastic, multi-priority in-process work-scheduling engine.
//!
//! - [`job`] — job identity, priority bands, submission options, outcomes
//! - [`cancellation`] — a resettable, shareable cancellation flag
//! - `queue` (private) — the multi-priority dispatch queue
//! - `delayed` (private) — the min-heap backing delayed/recurring jobs
//! - `cache` (private) — the TTL-expiring result cache
//! - [`events`] — the completion/failure/lifecycle event bus
//! - `executor` (private) — timeout, cancellation and retry around one job
//! - `worker` (private) — the worker loop and its controller-side handle
//! - `monitor` (private) — idle reaping, cache sweeps, delayed promotion
//! - [`scheduler`] — the public delayed/recurring scheduling API
//! - [`pool`] — the controller tying all of the above together
//! - [`options`] — `PoolOptions`, built with `typed_builder`
//! - [`log_sink`] — the narrow logging interface and its `tracing` bridge
//! - [`error`] — `PoolError`, the only error type crossing the public API
//!
//! # Architecture
//!
//! ```text
//! Pool::submit(job)
//!     │
//!     ├─► admission check (capacity, disposed) ─► PriorityQueue (by band)
//!     │                                                 │
//!     │                                        Worker::run  ◄──── queue_cv
//!     │                                                 │
//!     │                                        executor::execute
//!     │                                          (timeout / cancel / retry)
//!     │                                                 │
//!     │                                        Pool::on_work_completed
//!     │                                                 │
//!     │                                   ResultCache ◄─┴─► EventBus
//!     │
//!     └─► Pool::schedule_delayed / schedule_recurring ─► DelayedHeap
//!                                                              │
//!                                                    Monitor::run (promotes
//!                                                    due entries into the
//!                                                    live queue)
//! ```
//!
//! Submission, dispatch and the monitor all share one pool; there is no
//! cross-process or persisted state — a [`pool::Pool`] lives and dies with
//! the process that created it.

mod cache;
pub mod cancellation;
mod delayed;
pub mod error;
pub mod events;
mod executor;
pub mod job;
pub mod log_sink;
mod monitor;
pub mod options;
pub mod pool;
mod queue;
pub mod scheduler;
mod worker;

pub use cancellation::CancellationToken;
pub use error::{PoolError, Result};
pub use events::{CompletedEvent, FailedEvent, HandlerId, LifecycleEvent};
pub use job::{BoxedError, JobId, Outcome, OutcomeStatus, Priority, RetryCondition, SubmitOptions};
pub use log_sink::{LogLevel, LogSink, TracingLogSink};
pub use options::PoolOptions;
pub use pool::{Pool, PoolStatus};
pub use scheduler::ScheduledId;
