//! Narrow logging interface used for the pool's own diagnostics.
//!
//! The pool does not assume any particular logging framework is wired up by
//! the host application. [`LogSink`] is the interface; [`TracingLogSink`] is
//! the one concrete implementation this crate ships, bridging onto the
//! `tracing` crate. Alternative sinks (colored console themes, file
//! rotation, fan-out to multiple backends) are left to the host.

use std::fmt;

/// Severity of a diagnostic message emitted by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// A sink for the pool's internal diagnostic messages.
///
/// Implementations must be cheap to call from hot paths (worker loop,
/// monitor tick) and must never panic.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Default [`LogSink`] bridging onto the `tracing` crate.
///
/// `tracing` has no sixth level, so [`LogLevel::Critical`] is mapped onto
/// `tracing::error!` with a `critical = true` field rather than dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => tracing::trace!(target: "taskpool", "{message}"),
            LogLevel::Debug => tracing::debug!(target: "taskpool", "{message}"),
            LogLevel::Info => tracing::info!(target: "taskpool", "{message}"),
            LogLevel::Warning => tracing::warn!(target: "taskpool", "{message}"),
            LogLevel::Error => tracing::error!(target: "taskpool", "{message}"),
            LogLevel::Critical => {
                tracing::error!(target: "taskpool", critical = true, "{message}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_display_matches_expected_labels() {
        assert_eq!(LogLevel::Warning.to_string(), "WARN");
        assert_eq!(LogLevel::Critical.to_string(), "CRITICAL");
    }

    #[test]
    fn tracing_sink_does_not_panic_on_any_level() {
        let sink = TracingLogSink;
        for level in [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warning,
            LogLevel::Error,
            LogLevel::Critical,
        ] {
            sink.log(level, "test message");
        }
    }
}
