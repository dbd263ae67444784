//! The delayed/recurring scheduler (C9).
//!
//! A delayed job is a [`crate::job::JobRecord`] inserted straight into the
//! pool's [`crate::delayed::DelayedHeap`]; the monitor promotes it into the
//! live queue once its release instant passes. A recurring job is a
//! self-rescheduling wrapper around the user callable: each time the
//! wrapper runs, it re-arms a fresh delayed entry for the next interval,
//! unless the schedule has been cancelled or has exhausted its execution
//! budget. The wrapper reaches back into the pool through a `Weak` handle
//! so a live recurring schedule never keeps the pool itself alive.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::job::{JobFn, JobId, JobRecord, SubmitOptions};
use crate::pool::PoolInner;

/// Handle to a delayed or recurring schedule created through
/// [`crate::Pool::schedule_delayed`] or [`crate::Pool::schedule_recurring`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduledId(pub(crate) Uuid);

impl fmt::Display for ScheduledId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Bookkeeping the scheduler keeps per active schedule so that
/// `cancel_scheduled` can both stop future re-arming and remove the
/// currently pending delayed entry.
pub(crate) struct ScheduledEntry {
    pub cancelled: Arc<AtomicBool>,
    pub current_job_id: Arc<Mutex<JobId>>,
}

pub(crate) fn schedule_delayed(
    pool: &Arc<PoolInner>,
    callable: JobFn,
    delay: Duration,
    options: SubmitOptions,
) -> ScheduledId {
    let scheduled_id = Uuid::new_v4();
    let cancelled = Arc::new(AtomicBool::new(false));
    let current_job_id = Arc::new(Mutex::new(JobId::NIL));

    let job = JobRecord::new(callable, options, Arc::downgrade(pool));
    *current_job_id.lock() = job.id;

    pool.scheduled.lock().insert(
        scheduled_id,
        ScheduledEntry {
            cancelled,
            current_job_id,
        },
    );

    let release_at = Instant::now() + delay;
    pool.delayed.lock().insert(job, release_at);
    pool.queue_cv.notify_all();

    ScheduledId(scheduled_id)
}

pub(crate) fn schedule_recurring(
    pool: &Arc<PoolInner>,
    callable: JobFn,
    interval: Duration,
    max_executions: Option<u32>,
    options: SubmitOptions,
) -> ScheduledId {
    let scheduled_id = Uuid::new_v4();
    let cancelled = Arc::new(AtomicBool::new(false));
    let current_job_id = Arc::new(Mutex::new(JobId::NIL));
    let executions = Arc::new(AtomicU32::new(0));

    pool.scheduled.lock().insert(
        scheduled_id,
        ScheduledEntry {
            cancelled: cancelled.clone(),
            current_job_id: current_job_id.clone(),
        },
    );

    arm(
        Arc::downgrade(pool),
        scheduled_id,
        callable,
        interval,
        max_executions,
        options,
        cancelled,
        current_job_id,
        executions,
        Instant::now() + interval,
    );

    ScheduledId(scheduled_id)
}

/// Insert one delayed entry for a recurring schedule's next fire, wrapping
/// `user_callable` so that a successful invocation re-arms the schedule for
/// the following interval before returning its result to the executor.
#[allow(clippy::too_many_arguments)]
fn arm(
    weak_pool: Weak<PoolInner>,
    scheduled_id: Uuid,
    user_callable: JobFn,
    interval: Duration,
    max_executions: Option<u32>,
    options: SubmitOptions,
    cancelled: Arc<AtomicBool>,
    current_job_id: Arc<Mutex<JobId>>,
    executions: Arc<AtomicU32>,
    release_at: Instant,
) {
    let Some(pool) = weak_pool.upgrade() else {
        return;
    };
    if cancelled.load(Ordering::SeqCst) {
        return;
    }

    let wrapped: JobFn = {
        let weak_pool = weak_pool.clone();
        let user_callable = user_callable.clone();
        let options = options.clone();
        let cancelled = cancelled.clone();
        let current_job_id = current_job_id.clone();
        let executions = executions.clone();
        Arc::new(move || {
            let result = user_callable();

            let count = executions.fetch_add(1, Ordering::SeqCst) + 1;
            let exhausted = max_executions.map(|max| count >= max).unwrap_or(false);
            if !cancelled.load(Ordering::SeqCst) && !exhausted {
                arm(
                    weak_pool.clone(),
                    scheduled_id,
                    user_callable.clone(),
                    interval,
                    max_executions,
                    options.clone(),
                    cancelled.clone(),
                    current_job_id.clone(),
                    executions.clone(),
                    Instant::now() + interval,
                );
            }

            result
        })
    };

    let job = JobRecord::new(wrapped, options, weak_pool);
    *current_job_id.lock() = job.id;
    pool.delayed.lock().insert(job, release_at);
    pool.queue_cv.notify_all();
}

pub(crate) fn cancel_scheduled(pool: &Arc<PoolInner>, id: ScheduledId) -> bool {
    let entry = {
        let scheduled = pool.scheduled.lock();
        scheduled
            .get(&id.0)
            .map(|e| (e.cancelled.clone(), e.current_job_id.clone()))
    };
    let Some((cancelled, current_job_id)) = entry else {
        return false;
    };

    cancelled.store(true, Ordering::SeqCst);
    let pending_id = *current_job_id.lock();
    if !pending_id.is_nil() {
        pool.delayed.lock().remove(pending_id);
    }
    true
}

/// Ids of schedules that are still active, i.e. have not been cancelled.
/// A schedule remains in `pool.scheduled` after cancellation (so a second
/// `cancel_scheduled` call can still report "already cancelled" rather
/// than "unknown"), so this filters on the `cancelled` flag rather than
/// just returning every key.
pub(crate) fn scheduled_ids(pool: &Arc<PoolInner>) -> Vec<ScheduledId> {
    pool.scheduled
        .lock()
        .iter()
        .filter(|(_, entry)| !entry.cancelled.load(Ordering::SeqCst))
        .map(|(id, _)| ScheduledId(*id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::PoolOptions;
    use crate::pool::Pool;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn delayed_job_does_not_run_before_its_release_instant() {
        let pool = Pool::new(PoolOptions::default());
        pool.start().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_clone = runs.clone();
        pool.schedule_delayed(
            move || {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            Duration::from_millis(200),
            SubmitOptions::default(),
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        std::thread::sleep(Duration::from_millis(250));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelling_a_recurring_schedule_stops_further_runs() {
        let pool = Pool::new(PoolOptions::default());
        pool.start().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_clone = runs.clone();
        let id = pool.schedule_recurring(
            move || {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            Duration::from_millis(50),
            None,
            SubmitOptions::default(),
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(160));
        assert!(pool.cancel_scheduled(id));
        let count_at_cancel = runs.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(runs.load(Ordering::SeqCst), count_at_cancel);
    }
}
