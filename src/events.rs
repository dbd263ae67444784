//! The event bus (C10).
//!
//! Three kinds of events — `Completed`, `Failed`, and pool lifecycle —
//! delivered synchronously to subscribed handlers on the thread that
//! observed them (a worker for `Completed`/`Failed`, the controller for
//! lifecycle events). A handler that panics is caught and logged rather than
//! allowed to take down a worker or the controller.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::job::{BoxedError, JobId};
use crate::log_sink::{LogLevel, LogSink};

/// Handle returned by an `on_*` subscription, used to `off_*` it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// A job finished successfully.
pub struct CompletedEvent {
    pub id: JobId,
    pub value: Option<Arc<dyn std::any::Any + Send + Sync>>,
    pub finished_at: Instant,
}

/// A job finished in `Failed`, `Cancelled`, or `TimedOut`.
pub struct FailedEvent {
    pub id: JobId,
    pub error: Option<Arc<BoxedError>>,
    pub finished_at: Instant,
    pub is_cancelled: bool,
    pub is_timeout: bool,
}

/// The pool started or stopped.
pub enum LifecycleEvent {
    Started {
        at: Instant,
    },
    Stopped {
        at: Instant,
        completed: usize,
        failed: usize,
    },
}

type CompletedHandler = Arc<dyn Fn(&CompletedEvent) + Send + Sync>;
type FailedHandler = Arc<dyn Fn(&FailedEvent) + Send + Sync>;
type LifecycleHandler = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    completed: Vec<(HandlerId, CompletedHandler)>,
    failed: Vec<(HandlerId, FailedHandler)>,
    lifecycle: Vec<(HandlerId, LifecycleHandler)>,
}

pub(crate) struct EventBus {
    handlers: Mutex<Handlers>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            handlers: Mutex::new(Handlers::default()),
            next_id: AtomicU64::new(0),
        }
    }

    fn next_id(&self) -> HandlerId {
        HandlerId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub fn on_completed(&self, handler: impl Fn(&CompletedEvent) + Send + Sync + 'static) -> HandlerId {
        let id = self.next_id();
        self.handlers.lock().completed.push((id, Arc::new(handler)));
        id
    }

    pub fn on_failed(&self, handler: impl Fn(&FailedEvent) + Send + Sync + 'static) -> HandlerId {
        let id = self.next_id();
        self.handlers.lock().failed.push((id, Arc::new(handler)));
        id
    }

    pub fn on_lifecycle(&self, handler: impl Fn(&LifecycleEvent) + Send + Sync + 'static) -> HandlerId {
        let id = self.next_id();
        self.handlers.lock().lifecycle.push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler previously registered with [`EventBus::on_completed`].
    /// Returns whether it was present. A `HandlerId` only ever matches the
    /// list it was issued for, so this is safe to call even if `id` was
    /// actually issued by `on_failed`/`on_lifecycle` — it simply won't match.
    pub fn off_completed(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.completed.len();
        handlers.completed.retain(|(h, _)| *h != id);
        handlers.completed.len() != before
    }

    pub fn off_failed(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.failed.len();
        handlers.failed.retain(|(h, _)| *h != id);
        handlers.failed.len() != before
    }

    pub fn off_lifecycle(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.lifecycle.len();
        handlers.lifecycle.retain(|(h, _)| *h != id);
        handlers.lifecycle.len() != before
    }

    pub fn emit_completed(&self, event: CompletedEvent, sink: &dyn LogSink) {
        let handlers = self.handlers.lock().completed.clone();
        for (_, handler) in handlers {
            Self::run_guarded(sink, || handler(&event));
        }
    }

    pub fn emit_failed(&self, event: FailedEvent, sink: &dyn LogSink) {
        let handlers = self.handlers.lock().failed.clone();
        for (_, handler) in handlers {
            Self::run_guarded(sink, || handler(&event));
        }
    }

    pub fn emit_lifecycle(&self, event: LifecycleEvent, sink: &dyn LogSink) {
        let handlers = self.handlers.lock().lifecycle.clone();
        for (_, handler) in handlers {
            Self::run_guarded(sink, || handler(&event));
        }
    }

    /// `AssertUnwindSafe` is load-bearing here, not decorative: a handler
    /// closure typically captures `&CompletedEvent`/`&FailedEvent`, and
    /// those hold `dyn Any` trait objects that are not themselves
    /// `RefUnwindSafe`, so the bound could never be satisfied generically.
    fn run_guarded(sink: &dyn LogSink, f: impl FnOnce()) {
        if catch_unwind(AssertUnwindSafe(f)).is_err() {
            sink.log(LogLevel::Warning, "an event handler panicked; ignoring");
        }
    }
}
