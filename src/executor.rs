//! The per-job execution pipeline (C5): timeout, cancellation and retry
//! wrapped around a single user callable.
//!
//! A job with neither a timeout nor a cancellation token runs directly on
//! the worker thread — no extra thread, no polling overhead. Once either is
//! configured, the callable is driven on a detached helper thread and the
//! worker polls a channel at a short interval, checking the cancellation
//! token and the deadline on every wake. Rust has no safe cross-thread kill
//! primitive, so on timeout or cancellation the helper thread is simply
//! abandoned to finish (or never finish) on its own; this is a deliberate,
//! documented leak, not a bug.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::job::{BoxedError, JobRecord, Outcome, OutcomeStatus};
use crate::log_sink::{LogLevel, LogSink};

/// How often the worker polls the helper thread's channel while a
/// timeout or cancellation token is in play.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct JobPanicked;

impl fmt::Display for JobPanicked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("job callable panicked")
    }
}

impl std::error::Error for JobPanicked {}

enum AttemptResult {
    Success(Box<dyn std::any::Any + Send + Sync>),
    Error(BoxedError),
    Cancelled,
    TimedOut,
}

/// Drive a job through at most `1 + max_retries` attempts and return its
/// terminal [`Outcome`].
pub(crate) fn execute(job: &JobRecord, log_sink: &dyn LogSink) -> Outcome {
    let options = &job.options;
    let max_attempts = options.max_retries + 1;
    let started_at = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match run_attempt(job) {
            AttemptResult::Success(value) => {
                return Outcome {
                    status: OutcomeStatus::Success,
                    value: Some(Arc::from(value)),
                    error: None,
                    started_at,
                    finished_at: Instant::now(),
                    attempt_count: attempt,
                };
            }
            AttemptResult::Cancelled => {
                return Outcome {
                    status: OutcomeStatus::Cancelled,
                    value: None,
                    error: None,
                    started_at,
                    finished_at: Instant::now(),
                    attempt_count: attempt,
                };
            }
            AttemptResult::TimedOut => {
                return Outcome {
                    status: OutcomeStatus::TimedOut,
                    value: None,
                    error: None,
                    started_at,
                    finished_at: Instant::now(),
                    attempt_count: attempt,
                };
            }
            AttemptResult::Error(err) => {
                let retryable = attempt < max_attempts && (options.retry_condition)(&err);
                if retryable {
                    log_sink.log(
                        LogLevel::Debug,
                        &format!("job {} failed attempt {attempt}, will retry: {err}", job.id),
                    );
                    if !options.retry_interval.is_zero() {
                        thread::sleep(options.retry_interval);
                    }
                    continue;
                }
                return Outcome {
                    status: OutcomeStatus::Failed,
                    value: None,
                    error: Some(Arc::new(err)),
                    started_at,
                    finished_at: Instant::now(),
                    attempt_count: attempt,
                };
            }
        }
    }
}

fn run_attempt(job: &JobRecord) -> AttemptResult {
    let options = &job.options;

    if options.timeout.is_none() && options.cancellation_token.is_none() {
        return match (job.callable)() {
            Ok(value) => AttemptResult::Success(value),
            Err(err) => AttemptResult::Error(err),
        };
    }

    let callable = job.callable.clone();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let result = catch_unwind(AssertUnwindSafe(|| callable()));
        // Disconnect is fine: it only happens after the worker already gave
        // up waiting, in which case nobody cares about this send.
        let _ = tx.send(result);
    });

    let deadline = options.timeout.map(|d| Instant::now() + d);
    loop {
        if let Some(token) = &options.cancellation_token {
            if token.is_cancelled() {
                return AttemptResult::Cancelled;
            }
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return AttemptResult::TimedOut;
            }
        }
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Ok(Ok(value))) => return AttemptResult::Success(value),
            Ok(Ok(Err(err))) => return AttemptResult::Error(err),
            Ok(Err(_panic)) => return AttemptResult::Error(Box::new(JobPanicked)),
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return AttemptResult::Error(Box::new(JobPanicked))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::job::SubmitOptions;
    use crate::log_sink::TracingLogSink;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Weak;

    fn record(callable: crate::job::JobFn, options: SubmitOptions) -> JobRecord {
        JobRecord::new(callable, options, Weak::new())
    }

    #[test]
    fn direct_success_needs_no_helper_thread() {
        let job = record(
            Arc::new(|| Ok(Box::new(42i32) as Box<dyn std::any::Any + Send + Sync>)),
            SubmitOptions::default(),
        );
        let outcome = execute(&job, &TracingLogSink);
        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.value::<i32>(), Some(42));
        assert_eq!(outcome.attempt_count, 1);
    }

    #[test]
    fn retries_until_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let callable: crate::job::JobFn = Arc::new(move || {
            let n = attempts_clone.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(Box::new(JobPanicked) as BoxedError)
            } else {
                Ok(Box::new("ok") as Box<dyn std::any::Any + Send + Sync>)
            }
        });
        let options = SubmitOptions::builder()
            .max_retries(3)
            .retry_interval(Duration::from_millis(1))
            .build();
        let job = record(callable, options);
        let outcome = execute(&job, &TracingLogSink);
        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.attempt_count, 3);
    }

    #[test]
    fn timeout_does_not_retry() {
        let callable: crate::job::JobFn = Arc::new(|| {
            thread::sleep(Duration::from_secs(5));
            Ok(Box::new(()) as Box<dyn std::any::Any + Send + Sync>)
        });
        let options = SubmitOptions::builder()
            .timeout(Duration::from_millis(150))
            .max_retries(3)
            .build();
        let job = record(callable, options);
        let outcome = execute(&job, &TracingLogSink);
        assert_eq!(outcome.status, OutcomeStatus::TimedOut);
        assert_eq!(outcome.attempt_count, 1);
    }

    #[test]
    fn cancellation_token_stops_the_attempt() {
        let token = CancellationToken::new();
        let token_clone = token.clone();
        let callable: crate::job::JobFn = Arc::new(move || {
            thread::sleep(Duration::from_secs(5));
            Ok(Box::new(()) as Box<dyn std::any::Any + Send + Sync>)
        });
        let options = SubmitOptions::builder()
            .cancellation_token(token_clone)
            .build();
        let job = record(callable, options);

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            token.cancel();
        });

        let outcome = execute(&job, &TracingLogSink);
        assert_eq!(outcome.status, OutcomeStatus::Cancelled);
    }
}
