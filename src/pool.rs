//! The pool controller (C7): lifecycle, submission admission, elastic
//! worker sizing, waits, and shutdown. This is the component every other
//! subsystem in the crate is wired into.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use uuid::Uuid;

use crate::cache::ResultCache;
use crate::delayed::DelayedHeap;
use crate::error::{PoolError, Result};
use crate::events::{CompletedEvent, EventBus, FailedEvent, HandlerId, LifecycleEvent};
use crate::job::{BoxedError, JobFn, JobId, JobRecord, Outcome, OutcomeStatus, SubmitOptions};
use crate::log_sink::LogLevel;
use crate::options::PoolOptions;
use crate::queue::PriorityQueue;
use crate::scheduler::{self, ScheduledEntry, ScheduledId};
use crate::worker::{self, WorkerHandle};

/// Lifecycle state of a [`Pool`]. `Disposed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    NotRunning,
    Running,
    Disposed,
}

/// Point-in-time counters for [`Pool::status_summary`].
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    pub queued: usize,
    pub executing: usize,
    pub completed: u64,
    pub failed: u64,
    pub cached: usize,
    pub success_rate: f64,
}

pub(crate) struct PoolInner {
    pub queue: PriorityQueue,
    pub suspended: PriorityQueue,
    pub delayed: Mutex<DelayedHeap>,
    pub cache: ResultCache,
    pub events: EventBus,
    pub workers: Mutex<Vec<WorkerHandle>>,
    pub next_worker_index: AtomicUsize,
    state: Mutex<PoolState>,
    pub queue_cv: Condvar,
    pub queue_lock: Mutex<()>,
    pub paused: AtomicBool,
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    pub scheduled: Mutex<HashMap<Uuid, ScheduledEntry>>,
    monitor_stop: Mutex<Option<Arc<AtomicBool>>>,
    monitor_handle: Mutex<Option<std::thread::JoinHandle<()>>>,
    pub options: PoolOptions,
}

impl PoolInner {
    /// Invoked by a worker once the executor pipeline returns a terminal
    /// outcome: updates counters, logs, caches the outcome, and emits the
    /// matching event.
    pub(crate) fn on_work_completed(&self, id: JobId, outcome: Outcome) {
        let sink = self.options.log_sink.as_ref();
        match outcome.status {
            OutcomeStatus::Success => {
                self.completed.fetch_add(1, Ordering::SeqCst);
                sink.log(
                    LogLevel::Debug,
                    &format!(
                        "job {id} succeeded after {} attempt(s)",
                        outcome.attempt_count
                    ),
                );
            }
            OutcomeStatus::Failed => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                sink.log(
                    LogLevel::Warning,
                    &format!("job {id} failed after {} attempt(s)", outcome.attempt_count),
                );
            }
            OutcomeStatus::TimedOut => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                sink.log(LogLevel::Warning, &format!("job {id} timed out"));
            }
            OutcomeStatus::Cancelled => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                sink.log(LogLevel::Info, &format!("job {id} was cancelled"));
            }
        }

        let status = outcome.status;
        let finished_at = outcome.finished_at;
        let value = outcome.value.clone();
        let error = outcome.error.clone();

        self.cache.insert(id, outcome);

        match status {
            OutcomeStatus::Success => {
                self.events.emit_completed(
                    CompletedEvent {
                        id,
                        value,
                        finished_at,
                    },
                    sink,
                );
            }
            _ => {
                self.events.emit_failed(
                    FailedEvent {
                        id,
                        error,
                        finished_at,
                        is_cancelled: status == OutcomeStatus::Cancelled,
                        is_timeout: status == OutcomeStatus::TimedOut,
                    },
                    sink,
                );
            }
        }
    }

    fn is_pending(&self, id: JobId) -> bool {
        if self.queue.contains(id) || self.suspended.contains(id) {
            return true;
        }
        if self.delayed.lock().contains(id) {
            return true;
        }
        self.workers
            .lock()
            .iter()
            .any(|w| *w.current_job.lock() == id)
    }
}

/// A multi-priority, elastic-worker, retry/timeout/cancellation-capable
/// in-process job pool.
///
/// Cheap to clone — internally an `Arc` over the shared state every worker,
/// the monitor, and the scheduler operate on.
#[derive(Clone)]
pub struct Pool(Arc<PoolInner>);

impl Pool {
    /// Construct a pool. The pool starts `NotRunning`; call [`Pool::start`]
    /// to spawn its worker threads and monitor.
    pub fn new(options: PoolOptions) -> Self {
        let inner = Arc::new(PoolInner {
            queue: PriorityQueue::new(),
            suspended: PriorityQueue::new(),
            delayed: Mutex::new(DelayedHeap::new()),
            cache: ResultCache::new(),
            events: EventBus::new(),
            workers: Mutex::new(Vec::new()),
            next_worker_index: AtomicUsize::new(0),
            state: Mutex::new(PoolState::NotRunning),
            queue_cv: Condvar::new(),
            queue_lock: Mutex::new(()),
            paused: AtomicBool::new(false),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            scheduled: Mutex::new(HashMap::new()),
            monitor_stop: Mutex::new(None),
            monitor_handle: Mutex::new(None),
            options,
        });
        Pool(inner)
    }

    /// Start dispatching: spawns `min_workers` worker threads and the
    /// monitor task, then promotes any jobs that were submitted while
    /// `start_suspended` was in effect.
    pub fn start(&self) -> Result<()> {
        if self.0.options.min_workers == 0 {
            return Err(PoolError::InvalidArgument(
                "min_workers must be at least 1".to_string(),
            ));
        }
        if self.0.options.max_workers < self.0.options.min_workers {
            return Err(PoolError::InvalidArgument(
                "max_workers must be >= min_workers".to_string(),
            ));
        }

        {
            let mut state = self.0.state.lock();
            match *state {
                PoolState::Disposed => return Err(PoolError::Disposed),
                PoolState::Running => return Ok(()),
                PoolState::NotRunning => *state = PoolState::Running,
            }
        }

        {
            let mut workers = self.0.workers.lock();
            for _ in 0..self.0.options.min_workers {
                workers.push(self.spawn_worker());
            }
        }

        let monitor_stop = Arc::new(AtomicBool::new(false));
        let handle = crate::monitor::spawn(self.0.clone(), monitor_stop.clone());
        *self.0.monitor_stop.lock() = Some(monitor_stop);
        *self.0.monitor_handle.lock() = Some(handle);

        while let Some(job) = self.0.suspended.pop() {
            self.0.queue.push(job);
        }
        self.0.queue_cv.notify_all();

        self.0.events.emit_lifecycle(
            LifecycleEvent::Started { at: Instant::now() },
            self.0.options.log_sink.as_ref(),
        );
        Ok(())
    }

    fn spawn_worker(&self) -> WorkerHandle {
        let index = self.0.next_worker_index.fetch_add(1, Ordering::SeqCst);
        let name = format!("{}-{index}", self.0.options.worker_name_prefix);
        worker::spawn(self.0.clone(), index, name)
    }

    /// Grow the worker set by exactly one if the pool is saturated: no
    /// idle worker, queue backlog more than half the current worker count,
    /// and room left under `max_workers`.
    fn maybe_expand(&self) {
        if !matches!(*self.0.state.lock(), PoolState::Running) {
            return;
        }
        let mut workers = self.0.workers.lock();
        let worker_count = workers.len();
        if worker_count >= self.0.options.max_workers {
            return;
        }
        let idle_count = workers.iter().filter(|w| w.is_idle()).count();
        if idle_count == 0 && self.0.queue.len() > worker_count / 2 {
            workers.push(self.spawn_worker());
        }
    }

    /// Pause dispatch: workers finish any in-flight job, then block before
    /// picking up the next one. Submissions are unaffected.
    pub fn pause(&self) {
        self.0.paused.store(true, Ordering::SeqCst);
    }

    /// Resume dispatch after [`Pool::pause`].
    pub fn resume(&self) {
        self.0.paused.store(false, Ordering::SeqCst);
        self.0.queue_cv.notify_all();
    }

    /// Stop all workers and the monitor, joining each thread. A no-op if
    /// the pool is not running.
    pub fn stop(&self) -> Result<()> {
        {
            let mut state = self.0.state.lock();
            match *state {
                PoolState::Disposed => return Err(PoolError::Disposed),
                PoolState::NotRunning => return Ok(()),
                PoolState::Running => *state = PoolState::NotRunning,
            }
        }

        self.stop_workers_and_monitor();

        let completed = self.0.completed.load(Ordering::SeqCst) as usize;
        let failed = self.0.failed.load(Ordering::SeqCst) as usize;
        self.0.events.emit_lifecycle(
            LifecycleEvent::Stopped {
                at: Instant::now(),
                completed,
                failed,
            },
            self.0.options.log_sink.as_ref(),
        );
        Ok(())
    }

    fn stop_workers_and_monitor(&self) {
        let handles: Vec<WorkerHandle> = {
            let mut workers = self.0.workers.lock();
            for w in workers.iter() {
                w.request_stop();
            }
            std::mem::take(&mut *workers)
        };
        self.0.queue_cv.notify_all();
        for mut worker in handles {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }

        if let Some(monitor_stop) = self.0.monitor_stop.lock().take() {
            monitor_stop.store(true, Ordering::SeqCst);
        }
        if let Some(handle) = self.0.monitor_handle.lock().take() {
            let _ = handle.join();
        }
    }

    /// Stop the pool (if running), drop all cached results and pending
    /// delayed/scheduled work, and permanently mark it disposed. Safe to
    /// call more than once.
    pub fn dispose(&self) {
        let already_disposed = {
            let mut state = self.0.state.lock();
            if *state == PoolState::Disposed {
                true
            } else {
                *state = PoolState::Disposed;
                false
            }
        };
        if already_disposed {
            return;
        }

        self.stop_workers_and_monitor();
        self.0.cache.clear();
        *self.0.delayed.lock() = DelayedHeap::new();
        self.0.scheduled.lock().clear();
    }

    fn submit_boxed(&self, callable: JobFn, options: SubmitOptions) -> Result<JobId> {
        options.validate()?;

        let state = *self.0.state.lock();
        if state == PoolState::Disposed {
            return Err(PoolError::Disposed);
        }

        if let Some(limit) = self.0.options.queue_limit {
            if self.0.queue.len() >= limit {
                return Err(PoolError::Capacity { limit });
            }
        }

        let job = JobRecord::new(callable, options, Arc::downgrade(&self.0));
        let id = job.id;
        self.0.submitted.fetch_add(1, Ordering::SeqCst);

        let route_to_suspended = self.0.options.start_suspended && state != PoolState::Running;
        if route_to_suspended {
            self.0.suspended.push(job);
        } else {
            self.0.queue.push(job);
            self.0.queue_cv.notify_all();
            self.maybe_expand();
        }

        Ok(id)
    }

    /// Submit a fire-and-forget unit of work.
    pub fn submit<F>(&self, f: F, options: SubmitOptions) -> Result<JobId>
    where
        F: Fn() -> std::result::Result<(), BoxedError> + Send + Sync + 'static,
    {
        let wrapped: JobFn =
            Arc::new(move || f().map(|_| Box::new(()) as Box<dyn Any + Send + Sync>));
        self.submit_boxed(wrapped, options)
    }

    /// Submit a unit of work whose result should be retrievable via
    /// [`Pool::get_result`].
    pub fn submit_with_value<F, T>(&self, f: F, options: SubmitOptions) -> Result<JobId>
    where
        F: Fn() -> std::result::Result<T, BoxedError> + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        let wrapped: JobFn = Arc::new(move || f().map(|v| Box::new(v) as Box<dyn Any + Send + Sync>));
        self.submit_boxed(wrapped, options)
    }

    /// Schedule `callable` to run once, `delay` from now.
    pub fn schedule_delayed<F>(
        &self,
        f: F,
        delay: Duration,
        options: SubmitOptions,
    ) -> Result<ScheduledId>
    where
        F: Fn() -> std::result::Result<(), BoxedError> + Send + Sync + 'static,
    {
        options.validate()?;
        let wrapped: JobFn =
            Arc::new(move || f().map(|_| Box::new(()) as Box<dyn Any + Send + Sync>));
        Ok(scheduler::schedule_delayed(&self.0, wrapped, delay, options))
    }

    /// Schedule `callable` to run every `interval`, optionally bounded by
    /// `max_executions`. Recurrence continues regardless of whether an
    /// individual run succeeds, unless the execution budget is reached.
    pub fn schedule_recurring<F>(
        &self,
        f: F,
        interval: Duration,
        max_executions: Option<u32>,
        options: SubmitOptions,
    ) -> Result<ScheduledId>
    where
        F: Fn() -> std::result::Result<(), BoxedError> + Send + Sync + 'static,
    {
        options.validate()?;
        let wrapped: JobFn =
            Arc::new(move || f().map(|_| Box::new(()) as Box<dyn Any + Send + Sync>));
        Ok(scheduler::schedule_recurring(
            &self.0,
            wrapped,
            interval,
            max_executions,
            options,
        ))
    }

    /// Cancel a pending delayed or recurring schedule. Returns `false` if
    /// the id is not known to the scheduler.
    pub fn cancel_scheduled(&self, id: ScheduledId) -> bool {
        scheduler::cancel_scheduled(&self.0, id)
    }

    /// Currently active (not cancelled) delayed/recurring schedule ids.
    pub fn scheduled_ids(&self) -> Vec<ScheduledId> {
        scheduler::scheduled_ids(&self.0)
    }

    /// Block until the live queue is empty and every worker is idle.
    pub fn wait_all(&self) {
        loop {
            let all_idle = self.0.workers.lock().iter().all(|w| w.is_idle());
            if self.0.queue.is_empty() && all_idle {
                return;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    /// Block until `id` has a cached outcome or `timeout` elapses.
    pub fn wait_one(&self, id: JobId, timeout: Duration) -> Result<()> {
        self.wait_many(&[id], timeout)
    }

    /// Block until every id in `ids` has a cached outcome or `timeout`
    /// elapses (a single deadline for the whole set, not per item).
    pub fn wait_many(&self, ids: &[JobId], timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let pending = ids.iter().filter(|id| !self.0.cache.contains(**id)).count();
            if pending == 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(PoolError::Timeout {
                    pending,
                    requested: ids.len(),
                });
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    /// Fetch the cached outcome for `id`.
    pub fn get_result(&self, id: JobId) -> Result<Outcome> {
        match self.0.cache.with_outcome(id, Clone::clone) {
            Some(outcome) => Ok(outcome),
            None if self.0.is_pending(id) => Err(PoolError::NotComplete { id }),
            None => Err(PoolError::Unknown { id }),
        }
    }

    /// Wait up to `timeout` for `id` to finish, then fetch its outcome.
    pub fn get_result_and_wait(&self, id: JobId, timeout: Duration) -> Result<Outcome> {
        self.wait_one(id, timeout)?;
        self.get_result(id)
    }

    /// Fetch cached outcomes for each of `ids`, in order.
    pub fn get_results(&self, ids: &[JobId]) -> Vec<Result<Outcome>> {
        ids.iter().map(|id| self.get_result(*id)).collect()
    }

    /// Wait up to `timeout` (a single deadline for the whole set) then
    /// fetch cached outcomes for each of `ids`, in order.
    pub fn get_results_and_wait(&self, ids: &[JobId], timeout: Duration) -> Vec<Result<Outcome>> {
        let _ = self.wait_many(ids, timeout);
        self.get_results(ids)
    }

    /// Discard every job currently sitting in the live queue. Returns how
    /// many were discarded.
    pub fn clear_queue(&self) -> usize {
        self.0.queue.clear()
    }

    /// Evict one cached outcome. Returns whether it was present.
    pub fn clear_result(&self, id: JobId) -> bool {
        self.0.cache.remove(id)
    }

    /// Evict a set of cached outcomes. Returns how many were present.
    pub fn clear_results(&self, ids: &[JobId]) -> usize {
        self.0.cache.remove_many(ids)
    }

    /// Evict every cached outcome. Returns how many were present.
    pub fn clear_all_results(&self) -> usize {
        self.0.cache.clear()
    }

    /// Evict cached outcomes older than `max_age`. Returns how many were
    /// evicted.
    pub fn clear_expired_results(&self, max_age: Duration) -> usize {
        self.0.cache.evict_older_than(max_age, Instant::now())
    }

    /// Snapshot of queue depth, in-flight count, lifetime counters, cache
    /// size, and success rate.
    pub fn status_summary(&self) -> PoolStatus {
        let completed = self.0.completed.load(Ordering::SeqCst);
        let failed = self.0.failed.load(Ordering::SeqCst);
        let total = completed + failed;
        let success_rate = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64
        };
        let executing = self
            .0
            .workers
            .lock()
            .iter()
            .filter(|w| !w.is_idle())
            .count();

        PoolStatus {
            queued: self.0.queue.len(),
            executing,
            completed,
            failed,
            cached: self.0.cache.len(),
            success_rate,
        }
    }

    /// Subscribe to successful completions. The returned id can be passed
    /// to [`Pool::off_completed`] to remove the handler again.
    pub fn on_completed(&self, handler: impl Fn(&CompletedEvent) + Send + Sync + 'static) -> HandlerId {
        self.0.events.on_completed(handler)
    }

    /// Remove a handler registered with [`Pool::on_completed`]. Returns
    /// whether it was present.
    pub fn off_completed(&self, id: HandlerId) -> bool {
        self.0.events.off_completed(id)
    }

    /// Subscribe to failures, cancellations, and timeouts. The returned id
    /// can be passed to [`Pool::off_failed`] to remove the handler again.
    pub fn on_failed(&self, handler: impl Fn(&FailedEvent) + Send + Sync + 'static) -> HandlerId {
        self.0.events.on_failed(handler)
    }

    /// Remove a handler registered with [`Pool::on_failed`]. Returns
    /// whether it was present.
    pub fn off_failed(&self, id: HandlerId) -> bool {
        self.0.events.off_failed(id)
    }

    /// Subscribe to pool start/stop lifecycle transitions. The returned id
    /// can be passed to [`Pool::off_lifecycle`] to remove the handler again.
    pub fn on_lifecycle(&self, handler: impl Fn(&LifecycleEvent) + Send + Sync + 'static) -> HandlerId {
        self.0.events.on_lifecycle(handler)
    }

    /// Remove a handler registered with [`Pool::on_lifecycle`]. Returns
    /// whether it was present.
    pub fn off_lifecycle(&self, id: HandlerId) -> bool {
        self.0.events.off_lifecycle(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Priority;
    use std::sync::Mutex as StdMutex;

    fn ok_unit() -> std::result::Result<(), BoxedError> {
        Ok(())
    }

    #[test]
    fn simple_value_submit_returns_42() {
        let pool = Pool::new(PoolOptions::default());
        pool.start().unwrap();
        let id = pool
            .submit_with_value(|| Ok::<_, BoxedError>(42i32), SubmitOptions::default())
            .unwrap();
        let outcome = pool.get_result_and_wait(id, Duration::from_secs(5)).unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.value::<i32>(), Some(42));
    }

    #[test]
    fn disposed_pool_rejects_submissions() {
        let pool = Pool::new(PoolOptions::default());
        pool.start().unwrap();
        pool.dispose();
        let result = pool.submit(ok_unit, SubmitOptions::default());
        assert!(matches!(result, Err(PoolError::Disposed)));
    }

    #[test]
    fn dispose_is_idempotent() {
        let pool = Pool::new(PoolOptions::default());
        pool.start().unwrap();
        pool.dispose();
        pool.dispose();
    }

    #[test]
    fn queue_capacity_is_enforced() {
        let options = PoolOptions::builder()
            .min_workers(1)
            .max_workers(1)
            .queue_limit(1)
            .build();
        let pool = Pool::new(options);
        pool.start().unwrap();
        // Occupy the single worker so the next submission sits in the queue
        // rather than being dequeued immediately.
        pool.submit(
            || {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            },
            SubmitOptions::default(),
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(30));
        pool.submit(ok_unit, SubmitOptions::default()).unwrap();
        let result = pool.submit(ok_unit, SubmitOptions::default());
        assert!(matches!(result, Err(PoolError::Capacity { limit: 1 })));
    }

    #[test]
    fn pause_blocks_dispatch_until_resumed() {
        let pool = Pool::new(
            PoolOptions::builder()
                .min_workers(1)
                .max_workers(1)
                .build(),
        );
        pool.start().unwrap();
        pool.pause();
        let ran = Arc::new(StdMutex::new(false));
        let ran_clone = ran.clone();
        pool.submit(
            move || {
                *ran_clone.lock().unwrap() = true;
                Ok(())
            },
            SubmitOptions::default(),
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert!(!*ran.lock().unwrap());
        pool.resume();
        std::thread::sleep(Duration::from_millis(100));
        assert!(*ran.lock().unwrap());
    }

    #[test]
    fn strict_priority_under_single_worker_contention() {
        let pool = Pool::new(
            PoolOptions::builder()
                .min_workers(1)
                .max_workers(1)
                .build(),
        );
        pool.start().unwrap();
        let order = Arc::new(StdMutex::new(Vec::new()));

        let push = |label: &'static str| {
            let order = order.clone();
            move || {
                std::thread::sleep(Duration::from_millis(50));
                order.lock().unwrap().push(label);
                Ok(())
            }
        };

        pool.submit(
            push("normal"),
            SubmitOptions::builder().priority(Priority::Normal).build(),
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(10));
        pool.submit(
            push("critical"),
            SubmitOptions::builder().priority(Priority::Critical).build(),
        )
        .unwrap();
        pool.submit(
            push("low"),
            SubmitOptions::builder().priority(Priority::Low).build(),
        )
        .unwrap();
        pool.submit(
            push("high"),
            SubmitOptions::builder().priority(Priority::High).build(),
        )
        .unwrap();

        pool.wait_all();
        assert_eq!(*order.lock().unwrap(), vec!["normal", "critical", "high", "low"]);
    }
}
