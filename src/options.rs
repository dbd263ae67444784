//! Pool-wide configuration (ambient "configuration" concern).
//!
//! Built with [`typed_builder::TypedBuilder`], exactly as this codebase's
//! own scheduling options are, rather than an environment-variable layer —
//! an in-process engine is configured by its embedding application, not by
//! reading its own process environment.

use std::sync::Arc;
use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::log_sink::{LogSink, TracingLogSink};

fn default_log_sink() -> Arc<dyn LogSink> {
    Arc::new(TracingLogSink)
}

/// Configuration for a [`crate::Pool`], supplied at construction time.
#[derive(Clone, TypedBuilder)]
pub struct PoolOptions {
    /// Workers kept alive even when idle. Must be ≥ 1.
    #[builder(default = 1)]
    pub min_workers: usize,

    /// Ceiling on elastic growth. Must be ≥ `min_workers`.
    #[builder(default = 4)]
    pub max_workers: usize,

    /// Maximum number of jobs allowed in the live queue at once. `None`
    /// means unbounded.
    #[builder(default, setter(strip_option))]
    pub queue_limit: Option<usize>,

    /// How long a worker may sit idle before the monitor reaps it (subject
    /// to never dropping below `min_workers`).
    #[builder(default = Duration::from_secs(60))]
    pub idle_worker_timeout: Duration,

    /// Time-to-live for cached outcomes. Only enforced when
    /// `cache_ttl_enabled` is true.
    #[builder(default = Duration::from_secs(300))]
    pub cache_ttl: Duration,

    /// Whether the monitor sweeps expired cache entries at all.
    #[builder(default = true)]
    pub cache_ttl_enabled: bool,

    /// If true, the pool accepts submissions but does not dispatch them
    /// until [`crate::Pool::start`] is called.
    #[builder(default = false)]
    pub start_suspended: bool,

    /// Prefix used when naming worker threads (diagnostic only).
    #[builder(default = "taskpool-worker".to_string(), setter(into))]
    pub worker_name_prefix: String,

    /// Sink for the pool's own diagnostic logging. Defaults to a
    /// `tracing`-backed sink.
    #[builder(default = default_log_sink())]
    pub log_sink: Arc<dyn LogSink>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        PoolOptions::builder().build()
    }
}
