use std::sync::Arc;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Configuration key or component field that caused the error (e.g., "batch.max_size")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected range, actual value)
    pub details: Option<String>,
    /// Component that raised the error (e.g., "rate_limiter", "cache")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for flows, handlers and middleware.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("context cancelled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Handler error: {message}{}", format_context(.context))]
    Handler {
        message: String,
        context: ErrorContext,
    },

    #[error("stage {stage} panicked: {message}")]
    Panicked { stage: usize, message: String },

    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("circuit breaker open")]
    CircuitOpen,

    #[error("all handlers failed ({tried} tried, {skipped} skipped){}", .last.as_ref().map(|e| format!(": {}", e)).unwrap_or_default())]
    AllHandlersFailed {
        tried: usize,
        skipped: usize,
        last: Option<Box<Error>>,
    },

    #[error("batch response splitting failed: expected {expected} parts, got {actual}")]
    BatchSplit { expected: usize, actual: usize },

    #[error("batched call failed: {0}")]
    Batch(#[source] Arc<Error>),

    #[error("batch loop is no longer running")]
    BatchClosed,

    #[error("Cache store error: {message}{}", format_context(.context))]
    Store {
        message: String,
        context: ErrorContext,
    },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Plain configuration error without structured context
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::configuration_with_context(msg, ErrorContext::new())
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Failure reported by a user handler
    pub fn handler(msg: impl Into<String>) -> Self {
        Error::Handler {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::store_with_context(msg, ErrorContext::new())
    }

    /// Create a new cache store error with structured context
    pub fn store_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Store {
            message: msg.into(),
            context,
        }
    }

    /// Create a new runtime error with structured context
    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    /// True for cancellation and deadline errors coming from a [`crate::Context`].
    pub fn is_context_error(&self) -> bool {
        match self {
            Error::Cancelled | Error::DeadlineExceeded => true,
            Error::Batch(inner) => inner.is_context_error(),
            _ => false,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Handler { context, .. }
            | Error::Store { context, .. }
            | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_is_rendered() {
        let err = Error::configuration_with_context(
            "rate must be positive",
            ErrorContext::new()
                .with_field_path("rate_limit.rate")
                .with_source("rate_limiter"),
        );
        assert_eq!(
            err.to_string(),
            "Configuration error: rate must be positive (field: rate_limit.rate, source: rate_limiter)"
        );
        assert!(err.context().is_some());
    }

    #[test]
    fn test_retries_exhausted_keeps_source() {
        use std::error::Error as _;
        let err = Error::RetriesExhausted {
            attempts: 3,
            source: Box::new(Error::handler("boom")),
        };
        assert!(err.to_string().contains("retries exhausted after 3 attempts"));
        assert_eq!(err.source().unwrap().to_string(), "Handler error: boom");
    }

    #[test]
    fn test_context_error_classification() {
        assert!(Error::Cancelled.is_context_error());
        assert!(Error::Batch(Arc::new(Error::DeadlineExceeded)).is_context_error());
        assert!(!Error::handler("x").is_context_error());
    }

    #[test]
    fn test_all_handlers_failed_display() {
        let err = Error::AllHandlersFailed {
            tried: 1,
            skipped: 1,
            last: Some(Box::new(Error::handler("down"))),
        };
        assert_eq!(
            err.to_string(),
            "all handlers failed (1 tried, 1 skipped): Handler error: down"
        );
    }
}
