//! Fallback Operator
//!
//! Tries an ordered list of handlers until one succeeds. Every candidate has
//! its own circuit breaker, so a chronically failing handler is skipped
//! until its cooldown elapses instead of being called on every request.

use crate::handler::{Handler, SharedHandler};
use crate::resilience::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot,
};
use crate::{Context, Error, ErrorContext, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

struct Candidate {
    handler: SharedHandler,
    breaker: CircuitBreaker,
}

/// Handler middleware that fails over to the next handler in order.
pub struct Fallback {
    candidates: Vec<Candidate>,
    breaker_config: CircuitBreakerConfig,
}

impl Fallback {
    pub fn new() -> Self {
        Self {
            candidates: Vec::new(),
            breaker_config: CircuitBreakerConfig::default(),
        }
    }

    pub fn from_handlers(handlers: Vec<SharedHandler>) -> Self {
        handlers
            .into_iter()
            .fold(Self::new(), |fallback, h| fallback.with_shared(h))
    }

    /// Append a candidate, tried after all previously added ones.
    pub fn with_handler<H: Handler + 'static>(self, handler: H) -> Self {
        self.with_shared(Arc::new(handler))
    }

    pub fn with_shared(mut self, handler: SharedHandler) -> Self {
        self.candidates.push(Candidate {
            handler,
            breaker: CircuitBreaker::new(self.breaker_config.clone()),
        });
        self
    }

    /// Breaker settings for every candidate; resets existing breakers.
    pub fn with_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        for candidate in &mut self.candidates {
            candidate.breaker = CircuitBreaker::new(config.clone());
        }
        self.breaker_config = config;
        self
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn breaker(&self, index: usize) -> Option<&CircuitBreaker> {
        self.candidates.get(index).map(|c| &c.breaker)
    }

    pub fn snapshots(&self) -> Vec<CircuitBreakerSnapshot> {
        self.candidates.iter().map(|c| c.breaker.snapshot()).collect()
    }
}

#[async_trait]
impl Handler for Fallback {
    async fn serve_flow(
        &self,
        ctx: &Context,
        input: &mut (dyn AsyncRead + Send + Unpin),
        output: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<()> {
        if self.candidates.is_empty() {
            return Err(Error::configuration_with_context(
                "no handlers provided",
                ErrorContext::new().with_source("fallback"),
            ));
        }

        let mut payload = Vec::new();
        input.read_to_end(&mut payload).await?;

        let mut tried = 0;
        let mut skipped = 0;
        let mut last = None;
        for (index, candidate) in self.candidates.iter().enumerate() {
            if let Some(err) = ctx.err() {
                return Err(err);
            }
            if !candidate.breaker.allow() {
                debug!(index, handler = candidate.handler.name(), "fallback skipping open circuit");
                skipped += 1;
                continue;
            }

            tried += 1;
            let mut replay: &[u8] = &payload;
            let mut buffered = Vec::new();
            match candidate
                .handler
                .serve_flow(ctx, &mut replay, &mut buffered)
                .await
            {
                Ok(()) => {
                    candidate.breaker.record_success();
                    output.write_all(&buffered).await?;
                    output.flush().await?;
                    return Ok(());
                }
                Err(err) => {
                    debug!(index, handler = candidate.handler.name(), error = %err, "fallback candidate failed");
                    candidate.breaker.record_failure();
                    last = Some(Box::new(err));
                }
            }
        }

        Err(Error::AllHandlersFailed {
            tried,
            skipped,
            last,
        })
    }

    fn name(&self) -> &str {
        "fallback"
    }
}

impl Default for Fallback {
    fn default() -> Self {
        Self::new()
    }
}
