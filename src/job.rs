//! Job identity, priority, submission options and outcomes.
//!
//! This module defines the data the rest of the pool moves around but does
//! not itself decide how — dispatch order lives in [`crate::queue`], timing
//! in [`crate::executor`].

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::error::{PoolError, Result as PoolResult};
use crate::pool::PoolInner;

/// Largest timeout expressible as a platform `int32` millisecond count,
/// the range a [`SubmitOptions::timeout`] is rejected outside of.
const MAX_TIMEOUT_MILLIS: u128 = i32::MAX as u128;

/// Opaque, process-unique job identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(Uuid);

impl JobId {
    /// The empty job id, meaning "no job".
    pub const NIL: JobId = JobId(Uuid::nil());

    pub(crate) fn new() -> Self {
        JobId(Uuid::new_v4())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Dispatch priority. Bands are independent FIFOs; a lower band is only
/// ever dequeued once every higher band is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    pub(crate) const BAND_COUNT: usize = 4;

    /// Index into the priority queue's per-band storage; 0 is dequeued first.
    pub(crate) fn band_index(self) -> usize {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }
}

/// An error raised by a user callable, boxed for storage in an [`Outcome`].
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// A predicate deciding whether a failed attempt should be retried.
pub type RetryCondition = Arc<dyn Fn(&BoxedError) -> bool + Send + Sync>;

/// A type-erased job body. Jobs are stored as `Fn`, not `FnOnce`, since a
/// retried job is invoked more than once. The success value must be
/// `Send + Sync` so a cached [`Outcome`] can be read from more than one
/// thread without cloning it up front.
pub type JobFn = Arc<dyn Fn() -> Result<Box<dyn Any + Send + Sync>, BoxedError> + Send + Sync>;

fn default_retry_condition() -> RetryCondition {
    Arc::new(|_err| true)
}

/// Options accompanying a single submission.
///
/// Unset fields take the defaults documented on each setter. Construct with
/// [`SubmitOptions::builder`].
#[derive(Clone, TypedBuilder)]
pub struct SubmitOptions {
    /// Dispatch priority. Defaults to [`Priority::Normal`].
    #[builder(default)]
    pub priority: Priority,

    /// Wall-clock budget for a single attempt. `None` means no timeout.
    #[builder(default, setter(strip_option))]
    pub timeout: Option<Duration>,

    /// External cancellation signal observed by the executor pipeline.
    #[builder(default, setter(strip_option))]
    pub cancellation_token: Option<CancellationToken>,

    /// Maximum number of retries after the first attempt. Defaults to 0.
    #[builder(default)]
    pub max_retries: u32,

    /// Delay between a failed attempt and the next retry.
    #[builder(default = Duration::ZERO)]
    pub retry_interval: Duration,

    /// Predicate deciding whether a given failure should be retried.
    /// Defaults to "retry any error" — timeouts and cancellations never
    /// reach this predicate since they are not retryable outcomes.
    #[builder(default = default_retry_condition())]
    pub retry_condition: RetryCondition,

    /// Opaque diagnostic label, not interpreted by the pool.
    #[builder(default, setter(strip_option, into))]
    pub name: Option<String>,
}

impl SubmitOptions {
    /// Reject a `timeout` that falls outside the platform `int32`
    /// millisecond range. Called at the point options are handed to the
    /// pool (submission or scheduling), not at `build()` time, since
    /// `typed_builder`'s generated `build()` cannot itself return a
    /// `Result`.
    pub(crate) fn validate(&self) -> PoolResult<()> {
        if let Some(timeout) = self.timeout {
            if timeout.as_millis() > MAX_TIMEOUT_MILLIS {
                return Err(PoolError::InvalidArgument(format!(
                    "timeout {timeout:?} exceeds the maximum of {MAX_TIMEOUT_MILLIS}ms"
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for SubmitOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmitOptions")
            .field("priority", &self.priority)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_interval", &self.retry_interval)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Default for SubmitOptions {
    fn default() -> Self {
        SubmitOptions::builder().build()
    }
}

/// Terminal status of a finished job attempt sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Success,
    Failed,
    Cancelled,
    TimedOut,
}

/// The recorded result of a job once it reaches a terminal state.
#[derive(Clone)]
pub struct Outcome {
    pub status: OutcomeStatus,
    pub(crate) value: Option<Arc<dyn Any + Send + Sync>>,
    pub error: Option<Arc<BoxedError>>,
    pub started_at: Instant,
    pub finished_at: Instant,
    pub attempt_count: u32,
}

impl Outcome {
    /// Read the success value as `T`, if the outcome is [`OutcomeStatus::Success`]
    /// and the stored value really is a `T`.
    ///
    /// Requires `T: Clone` because the cache may be read more than once;
    /// storing by value and cloning on read is simpler and safer than
    /// handing out a reference into a cache entry that may be evicted
    /// concurrently.
    pub fn value<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.value
            .as_ref()
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outcome")
            .field("status", &self.status)
            .field("attempt_count", &self.attempt_count)
            .field("has_error", &self.error.is_some())
            .finish()
    }
}

/// A submitted unit of work and its mutable per-attempt state.
pub(crate) struct JobRecord {
    pub id: JobId,
    pub callable: JobFn,
    pub options: SubmitOptions,
    pub created_at: Instant,
    pub enqueued_at: Instant,
    pub pool: Weak<PoolInner>,
}

impl JobRecord {
    pub fn new(callable: JobFn, options: SubmitOptions, pool: Weak<PoolInner>) -> Self {
        let now = Instant::now();
        JobRecord {
            id: JobId::new(),
            callable,
            options,
            created_at: now,
            enqueued_at: now,
            pool,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_band_ordering_is_critical_first() {
        assert!(Priority::Critical.band_index() < Priority::High.band_index());
        assert!(Priority::High.band_index() < Priority::Normal.band_index());
        assert!(Priority::Normal.band_index() < Priority::Low.band_index());
    }

    #[test]
    fn default_priority_is_normal() {
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn nil_job_id_is_nil() {
        assert!(JobId::NIL.is_nil());
        assert!(!JobId::new().is_nil());
    }

    #[test]
    fn submit_options_builder_applies_defaults() {
        let opts = SubmitOptions::builder().build();
        assert_eq!(opts.priority, Priority::Normal);
        assert_eq!(opts.max_retries, 0);
        assert!(opts.timeout.is_none());
    }

    #[test]
    fn validate_accepts_an_in_range_timeout() {
        let opts = SubmitOptions::builder()
            .timeout(Duration::from_millis(500))
            .build();
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn validate_rejects_a_timeout_beyond_platform_int_ms_range() {
        let opts = SubmitOptions::builder()
            .timeout(Duration::from_millis(MAX_TIMEOUT_MILLIS as u64 + 1))
            .build();
        assert!(matches!(opts.validate(), Err(PoolError::InvalidArgument(_))));
    }

    #[test]
    fn submit_options_builder_overrides() {
        let opts = SubmitOptions::builder()
            .priority(Priority::Critical)
            .max_retries(3)
            .timeout(Duration::from_millis(500))
            .build();
        assert_eq!(opts.priority, Priority::Critical);
        assert_eq!(opts.max_retries, 3);
        assert_eq!(opts.timeout, Some(Duration::from_millis(500)));
    }
}
