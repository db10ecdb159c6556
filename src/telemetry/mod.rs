//! 可观测性模块：可插拔日志接口与记录每次调用的日志中间件。
//!
//! # Telemetry Module
//!
//! Internal diagnostics of this crate go through `tracing`. This module adds
//! the application-facing side: a small [`Logger`] trait that middleware
//! writes to, a few ready-made loggers, and the [`Logging`] middleware.
//!
//! A logger can never affect data flow. Panics raised inside a logger are
//! caught and dropped, and the wrapped handler's bytes are forwarded
//! unchanged.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Logger`] | Destination for formatted log lines |
//! | [`TracingLogger`] | Default logger, forwards to `tracing` |
//! | [`MemoryLogger`] | Captures records in memory, for tests |
//! | [`NoopLogger`] | Discards everything |
//! | [`Logging`] | Middleware logging start, finish and failure of each call |

mod middleware;

pub use middleware::Logging;

use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// Accepts formatted messages from observability middleware.
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Forwards to the `tracing` macros under the `flowkit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "flowkit", "{}", message),
            LogLevel::Info => tracing::info!(target: "flowkit", "{}", message),
            LogLevel::Warn => tracing::warn!(target: "flowkit", "{}", message),
            LogLevel::Error => tracing::error!(target: "flowkit", "{}", message),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _: LogLevel, _: &str) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
}

/// In-memory logger for testing, keeping at most `max_records` lines.
pub struct MemoryLogger {
    records: Mutex<Vec<LogRecord>>,
    max_records: usize,
}

impl MemoryLogger {
    pub fn new(max_records: usize) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            max_records,
        }
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn records_at(&self, level: LogLevel) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.level == level)
            .collect()
    }

    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryLogger {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: LogLevel, message: &str) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.push(LogRecord {
            level,
            message: message.to_string(),
        });
        if records.len() > self.max_records {
            records.remove(0);
        }
    }
}

/// Install a `tracing` subscriber for tests and benches.
///
/// Honors `RUST_LOG`; defaults to `flowkit=debug`. Safe to call repeatedly.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("flowkit=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_logger_caps_records() {
        let logger = MemoryLogger::new(2);
        logger.log(LogLevel::Info, "one");
        logger.log(LogLevel::Warn, "two");
        logger.log(LogLevel::Error, "three");

        let messages: Vec<_> = logger.records().into_iter().map(|r| r.message).collect();
        assert_eq!(messages, vec!["two", "three"]);
        assert_eq!(logger.records_at(LogLevel::Error).len(), 1);

        logger.clear();
        assert!(logger.is_empty());
    }

    #[test]
    fn test_levels_order_and_display() {
        assert!(LogLevel::Debug < LogLevel::Error);
        assert_eq!(LogLevel::Warn.to_string(), "warn");
    }

    #[test]
    fn test_builtin_loggers_accept_messages() {
        init_test_tracing();
        TracingLogger.log(LogLevel::Info, "hello");
        NoopLogger.log(LogLevel::Error, "ignored");
    }
}
