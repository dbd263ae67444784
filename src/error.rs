//! The error boundary for the pool's public API.
//!
//! No ad hoc error type crosses the public surface of [`crate::Pool`] — every
//! fallible public method returns [`PoolError`]. Internal job failures (the
//! errors a user's own callable raises) are carried as
//! `Box<dyn std::error::Error + Send + Sync>` up to the point they are
//! stored in an [`crate::job::Outcome`]; they become visible to callers only
//! through `Outcome::error`, never through a `Result<_, PoolError>`.

use thiserror::Error;

use crate::job::JobId;

/// Errors returned by the pool's public API.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The submission queue was at its configured limit.
    #[error("queue is at capacity ({limit} jobs)")]
    Capacity {
        /// The configured queue limit that was hit.
        limit: usize,
    },

    /// The pool has been disposed; no further operations are accepted.
    #[error("pool has been disposed")]
    Disposed,

    /// `get_result` was called for a job that has not reached a terminal
    /// state yet.
    #[error("job {id} has not completed yet")]
    NotComplete {
        /// The job id that was queried.
        id: JobId,
    },

    /// `get_result` was called for a job id the cache has no record of,
    /// either because it never existed or its outcome already expired.
    #[error("job {id} is unknown to this pool")]
    Unknown {
        /// The job id that was queried.
        id: JobId,
    },

    /// A wait operation's deadline elapsed before every requested job
    /// finished.
    #[error("timed out waiting for {pending} of {requested} job(s)")]
    Timeout {
        /// Number of requested jobs still not finished when the deadline hit.
        pending: usize,
        /// Total number of jobs the caller was waiting on.
        requested: usize,
    },

    /// A caller-supplied argument was out of range or otherwise invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Convenience alias for the pool's public `Result` type.
pub type Result<T> = std::result::Result<T, PoolError>;
