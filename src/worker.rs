//! The worker loop (C4) and the record the controller uses to track it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::job::JobId;
use crate::pool::PoolInner;

/// How long a worker blocks on the queue's condition variable before
/// re-checking for new work. Bounded so a missed wakeup self-heals quickly.
pub(crate) const QUEUE_WAIT: Duration = Duration::from_millis(50);

/// How long a worker sleeps while the pool is paused, between rechecks.
const PAUSE_POLL: Duration = Duration::from_millis(50);

/// The controller's record of one live worker thread.
pub(crate) struct WorkerHandle {
    pub index: usize,
    pub handle: Option<JoinHandle<()>>,
    pub idle: Arc<AtomicBool>,
    pub idle_since: Arc<Mutex<Instant>>,
    pub stop: Arc<AtomicBool>,
    pub current_job: Arc<Mutex<JobId>>,
}

impl WorkerHandle {
    pub fn is_idle(&self) -> bool {
        self.idle.load(Ordering::SeqCst)
    }

    pub fn idle_since(&self) -> Instant {
        *self.idle_since.lock()
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

pub(crate) fn spawn(pool: Arc<PoolInner>, index: usize, thread_name: String) -> WorkerHandle {
    let idle = Arc::new(AtomicBool::new(true));
    let idle_since = Arc::new(Mutex::new(Instant::now()));
    let stop = Arc::new(AtomicBool::new(false));
    let current_job = Arc::new(Mutex::new(JobId::NIL));

    let idle_for_thread = idle.clone();
    let idle_since_for_thread = idle_since.clone();
    let stop_for_thread = stop.clone();
    let current_job_for_thread = current_job.clone();

    let handle = std::thread::Builder::new()
        .name(thread_name)
        .spawn(move || {
            run(
                pool,
                idle_for_thread,
                idle_since_for_thread,
                stop_for_thread,
                current_job_for_thread,
            )
        })
        .expect("failed to spawn worker thread");

    WorkerHandle {
        index,
        handle: Some(handle),
        idle,
        idle_since,
        stop,
        current_job,
    }
}

fn run(
    pool: Arc<PoolInner>,
    idle: Arc<AtomicBool>,
    idle_since: Arc<Mutex<Instant>>,
    stop: Arc<AtomicBool>,
    current_job: Arc<Mutex<JobId>>,
) {
    loop {
        idle.store(true, Ordering::SeqCst);
        *idle_since.lock() = Instant::now();
        *current_job.lock() = JobId::NIL;

        if stop.load(Ordering::SeqCst) {
            return;
        }

        let job = loop {
            if let Some(job) = pool.queue.pop() {
                break Some(job);
            }
            if stop.load(Ordering::SeqCst) {
                break None;
            }
            let mut guard = pool.queue_lock.lock();
            pool.queue_cv.wait_for(&mut guard, QUEUE_WAIT);
        };

        let Some(job) = job else {
            return;
        };

        idle.store(false, Ordering::SeqCst);
        *current_job.lock() = job.id;

        // A stop request observed here must not drop the job: it was
        // already dequeued, so the loop still has to run it to completion
        // before exiting, matching "exactly one outcome is eventually
        // cached" for every id `submit` ever returned.
        while pool.paused.load(Ordering::SeqCst) && !stop.load(Ordering::SeqCst) {
            std::thread::sleep(PAUSE_POLL);
        }

        let outcome = crate::executor::execute(&job, pool.options.log_sink.as_ref());
        pool.on_work_completed(job.id, outcome);
    }
}
