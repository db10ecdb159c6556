//! Retry Operator
//!
//! Replays a handler on the same input until one attempt succeeds. The input
//! is buffered once, since a stream cannot be replayed; each attempt writes
//! into its own buffer so a failed attempt never leaks partial output.

use crate::handler::{Handler, SharedHandler};
use crate::{Context, Error, ErrorContext, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Duration;
use tracing::debug;

/// Configuration for retry logic
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failure; doubled after each further failure.
    pub base_delay: Duration,
    /// Upper bound for a single backoff sleep.
    pub max_delay: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: None,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Exponential backoff: base * 2^attempt, capped by `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        match self.max_delay {
            Some(cap) if delay > cap => cap,
            _ => delay,
        }
    }
}

/// Handler middleware that retries the wrapped handler with backoff.
///
/// The wrapped handler may run up to `max_attempts` times per call, so it
/// must be safe to repeat.
pub struct Retry {
    handler: SharedHandler,
    config: RetryConfig,
}

impl Retry {
    pub fn new<H: Handler + 'static>(handler: H, max_attempts: u32) -> Self {
        Self::with_config(handler, RetryConfig::new(max_attempts))
    }

    pub fn with_config<H: Handler + 'static>(handler: H, config: RetryConfig) -> Self {
        Self {
            handler: Arc::new(handler),
            config,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[async_trait]
impl Handler for Retry {
    async fn serve_flow(
        &self,
        ctx: &Context,
        input: &mut (dyn AsyncRead + Send + Unpin),
        output: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<()> {
        let max_attempts = self.config.max_attempts;
        if max_attempts == 0 {
            return Err(Error::configuration_with_context(
                "max_attempts must be at least 1",
                ErrorContext::new()
                    .with_field_path("retry.max_attempts")
                    .with_source("retry"),
            ));
        }

        let mut payload = Vec::new();
        input.read_to_end(&mut payload).await?;

        let mut last_err = None;
        for attempt in 0..max_attempts {
            let mut replay: &[u8] = &payload;
            let mut buffered = Vec::new();
            match self
                .handler
                .serve_flow(ctx, &mut replay, &mut buffered)
                .await
            {
                Ok(()) => {
                    output.write_all(&buffered).await?;
                    output.flush().await?;
                    return Ok(());
                }
                Err(err) => {
                    debug!(attempt = attempt + 1, max_attempts, error = %err, "retry attempt failed");
                    last_err = Some(err);
                }
            }

            if attempt + 1 < max_attempts {
                let delay = self.config.backoff(attempt);
                tokio::select! {
                    biased;
                    reason = ctx.done() => return Err(reason),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        Err(Error::RetriesExhausted {
            attempts: max_attempts,
            source: Box::new(last_err.unwrap_or_else(|| Error::handler("no attempt was made"))),
        })
    }

    fn name(&self) -> &str {
        "retry"
    }
}
