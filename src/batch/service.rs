//! Caller-facing batching handler.

use super::collector::{run_collector, BatchConfig, BatchRequest};
use crate::handler::{Handler, SharedHandler};
use crate::{Context, Error, ErrorContext, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

/// Upper bound on requests queued ahead of the coalescing loop.
const MAX_QUEUED: usize = 1024;

/// Coalesces concurrent calls into fewer calls of the wrapped handler.
///
/// Each call buffers its input, joins the current window and waits for its
/// own slice of the combined output. Clones share one coalescing loop, which
/// stops (flushing what is pending) once the last clone is dropped.
///
/// # Panics
///
/// Construction spawns the coalescing loop and must happen inside a Tokio
/// runtime.
#[derive(Clone)]
pub struct Batch {
    requests: mpsc::Sender<BatchRequest>,
    config: BatchConfig,
}

impl Batch {
    pub fn new<H: Handler + 'static>(handler: H, max_size: usize, max_wait: Duration) -> Self {
        Self::with_config(
            handler,
            BatchConfig::new()
                .with_max_size(max_size)
                .with_max_wait(max_wait),
        )
    }

    pub fn with_config<H: Handler + 'static>(handler: H, config: BatchConfig) -> Self {
        let handler: SharedHandler = Arc::new(handler);
        let (tx, rx) = mpsc::channel(config.max_size.clamp(1, MAX_QUEUED));
        tokio::spawn(run_collector(handler, config.clone(), rx));
        Self {
            requests: tx,
            config,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Submit one payload and wait for its share of the batched output.
    pub async fn call(&self, ctx: &Context, payload: Bytes) -> Result<Bytes> {
        if self.config.max_size == 0 {
            return Err(Error::configuration_with_context(
                "max_size must be at least 1",
                ErrorContext::new()
                    .with_field_path("batch.max_size")
                    .with_source("batch"),
            ));
        }

        let (respond, response) = oneshot::channel();
        let request = BatchRequest {
            payload,
            respond,
            ctx: ctx.clone(),
        };
        tokio::select! {
            biased;
            reason = ctx.done() => return Err(reason),
            sent = self.requests.send(request) => sent.map_err(|_| Error::BatchClosed)?,
        }

        tokio::select! {
            biased;
            reason = ctx.done() => Err(reason),
            received = response => received.map_err(|_| Error::BatchClosed)?,
        }
    }
}

#[async_trait]
impl Handler for Batch {
    async fn serve_flow(
        &self,
        ctx: &Context,
        input: &mut (dyn AsyncRead + Send + Unpin),
        output: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<()> {
        let mut payload = Vec::new();
        input.read_to_end(&mut payload).await?;
        let response = self.call(ctx, Bytes::from(payload)).await?;
        output.write_all(&response).await?;
        output.flush().await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "batch"
    }
}
