//! The monitor background task (C8).
//!
//! A single low-frequency thread that reaps idle workers, sweeps expired
//! cache entries, and promotes due delayed jobs into the live queue. Each
//! concern runs on its own cadence rather than every tick, since reaping and
//! TTL sweeps are comparatively expensive and delayed-job promotion needs to
//! be near-immediate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::log_sink::LogLevel;
use crate::pool::PoolInner;

const TICK_INTERVAL: Duration = Duration::from_millis(10);
const REAP_INTERVAL: Duration = Duration::from_secs(30);
const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub(crate) fn spawn(pool: Arc<PoolInner>, stop: Arc<AtomicBool>) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("taskpool-monitor".to_string())
        .spawn(move || run(pool, stop))
        .expect("failed to spawn monitor thread")
}

fn run(pool: Arc<PoolInner>, stop: Arc<AtomicBool>) {
    let mut last_reap = Instant::now();
    let mut last_sweep = Instant::now();

    while !stop.load(Ordering::SeqCst) {
        let now = Instant::now();

        promote_due_jobs(&pool, now);

        cleanup_stopped_workers(&pool);

        if now.saturating_duration_since(last_reap) >= REAP_INTERVAL {
            reap_idle_workers(&pool, now);
            last_reap = now;
        }

        if pool.options.cache_ttl_enabled
            && now.saturating_duration_since(last_sweep) >= CACHE_SWEEP_INTERVAL
        {
            let evicted = pool.cache.evict_older_than(pool.options.cache_ttl, now);
            if evicted > 0 {
                pool.options.log_sink.log(
                    LogLevel::Debug,
                    &format!("monitor evicted {evicted} expired result(s)"),
                );
            }
            last_sweep = now;
        }

        std::thread::sleep(TICK_INTERVAL);
    }
}

fn promote_due_jobs(pool: &Arc<PoolInner>, now: Instant) {
    let due = {
        let mut heap = pool.delayed.lock();
        heap.pop_all_due(now)
    };
    if due.is_empty() {
        return;
    }
    for job in due {
        pool.queue.push(job);
    }
    pool.queue_cv.notify_all();
}

/// Join and drop worker threads that have already exited after being
/// stop-marked (by reaping or by `stop()`), so `workers.len()` reflects
/// reality instead of counting dead threads still sitting in the vec.
fn cleanup_stopped_workers(pool: &Arc<PoolInner>) {
    let mut workers = pool.workers.lock();
    let mut i = 0;
    while i < workers.len() {
        let finished = workers[i]
            .handle
            .as_ref()
            .map(|h| h.is_finished())
            .unwrap_or(false);
        if finished {
            let mut worker = workers.remove(i);
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        } else {
            i += 1;
        }
    }
}

fn reap_idle_workers(pool: &Arc<PoolInner>, now: Instant) {
    let mut workers = pool.workers.lock();
    let min_workers = pool.options.min_workers;
    let idle_timeout = pool.options.idle_worker_timeout;

    let reapable: Vec<usize> = workers
        .iter()
        .filter(|w| {
            w.is_idle() && now.saturating_duration_since(w.idle_since()) >= idle_timeout
        })
        .map(|w| w.index)
        .collect();

    let mut remaining = workers.len();
    for index in reapable {
        if remaining <= min_workers {
            break;
        }
        if let Some(pos) = workers.iter().position(|w| w.index == index) {
            workers[pos].request_stop();
            remaining -= 1;
        }
    }
    pool.queue_cv.notify_all();
}
