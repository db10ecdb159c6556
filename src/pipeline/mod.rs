//! 流水线处理模块：将多个处理器串联为并发执行、带背压的流式管道。
//!
//! # Pipeline Engine
//!
//! This module implements the flow engine: an ordered list of [`Handler`]s
//! wired together with byte pipes so data moves through every stage as it
//! arrives instead of waiting for the previous stage to finish.
//!
//! ## Execution Model
//!
//! ```text
//! input ─▶ feeder ─▶ pipe₀ ─▶ handler₀ ─▶ pipe₁ ─▶ handler₁ ─▶ … ─▶ collector ─▶ output
//!   │                            │                    │                 │
//! FlowInput               one task per stage, each closing its      FlowOutput
//!                         output pipe on every exit path
//! ```
//!
//! - Every stage runs as its own task; a slow stage throttles its producer.
//! - The first stage error (or a panic, reported as [`Error::Panicked`])
//!   aborts the run. Output already written is not rolled back.
//! - Cancelling the caller's [`Context`] makes `run` return the context error
//!   immediately; stages unblock once their pipes close.
//!
//! ## Submodules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`pipe`] | Bounded SPSC byte pipe between stages |
//! | [`convert`] | Input/output converters at the flow boundary |
//! | [`retry`] | Replay a handler with exponential backoff |
//! | [`fallback`] | Ordered failover guarded by circuit breakers |
//! | [`timeout`] | Deadline for a single handler call |
//!
//! ## Example
//!
//! ```rust
//! use flowkit::{handler_fn, Context, Flow};
//! use tokio::io::{AsyncReadExt, AsyncWriteExt};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> flowkit::Result<()> {
//! let upper = handler_fn(|_ctx, input, output| {
//!     Box::pin(async move {
//!         let mut buf = Vec::new();
//!         input.read_to_end(&mut buf).await?;
//!         output.write_all(&buf.to_ascii_uppercase()).await?;
//!         Ok(())
//!     })
//! });
//!
//! let flow = Flow::new().use_handler(upper);
//! let mut out = String::new();
//! flow.run(&Context::background(), "hello", &mut out).await?;
//! assert_eq!(out, "HELLO");
//! # Ok(())
//! # }
//! ```

pub mod convert;
pub mod fallback;
pub mod pipe;
pub mod retry;
pub mod timeout;


use crate::handler::{Handler, SharedHandler};
use crate::{Context, Error, Result};
use async_trait::async_trait;
use convert::{FlowInput, FlowOutput};
use futures::FutureExt;
use pipe::{pipe, PipeReader, DEFAULT_PIPE_CAPACITY};
use std::any::Any;
use std::future::Future;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

/// Ordered composition of handlers.
///
/// A flow is immutable once built; each [`Flow::run`] allocates fresh pipes
/// and tasks, so concurrent runs share nothing but the handlers themselves.
#[derive(Clone)]
pub struct Flow {
    handlers: Vec<SharedHandler>,
    pipe_capacity: usize,
}

impl Flow {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        }
    }

    /// Append a stage.
    pub fn use_handler<H: Handler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Append an already shared stage.
    pub fn use_shared(mut self, handler: SharedHandler) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Bytes a stage may write ahead of its consumer before it is suspended.
    pub fn with_pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the whole chain once, converting `input` on the way in and filling
    /// `output` on the way out.
    pub async fn run<I, O>(&self, ctx: &Context, input: I, output: &mut O) -> Result<()>
    where
        I: FlowInput,
        O: FlowOutput + ?Sized,
    {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        let mut source = input.into_reader()?;

        if self.handlers.is_empty() {
            return tokio::select! {
                biased;
                reason = ctx.done() => Err(reason),
                res = output.read_from(&mut source) => res,
            };
        }

        self.execute(ctx, &mut source, |mut tail| async move {
            output.read_from(&mut tail).await
        })
        .await
    }

    /// Wire the stages and drive them until completion, first error or
    /// cancellation. `collect` drains the last pipe.
    async fn execute<'a, C, Fut>(
        &self,
        ctx: &Context,
        source: &'a mut (dyn AsyncRead + Send + Unpin),
        collect: C,
    ) -> Result<()>
    where
        C: FnOnce(PipeReader) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'a,
    {
        let stages = self.handlers.len();
        debug!(stages, "flow run starting");

        // Stages observe a child context, cancelled once this run returns.
        let run_ctx = ctx.child();
        let _run_guard = run_ctx.cancel_on_drop();

        let (err_tx, mut err_rx) = mpsc::channel::<Error>(stages);
        let (mut feed_writer, mut upstream) = pipe(self.pipe_capacity);

        let mut tasks = Vec::with_capacity(stages);
        for (stage, handler) in self.handlers.iter().enumerate() {
            let (writer, next) = pipe(self.pipe_capacity);
            let reader = std::mem::replace(&mut upstream, next);
            tasks.push(tokio::spawn(run_stage(
                stage,
                Arc::clone(handler),
                run_ctx.clone(),
                reader,
                writer,
                err_tx.clone(),
            )));
        }
        drop(err_tx);

        let feed = async move {
            let copied = tokio::io::copy(source, &mut feed_writer).await;
            let _ = feed_writer.shutdown().await;
            match copied {
                Ok(_) => Ok(()),
                // the first stage stopped reading early; not an input failure
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                Err(e) => Err(Error::Io(e)),
            }
        };

        let completion = async move {
            tokio::try_join!(feed, collect(upstream))?;
            for task in tasks {
                task.await.map_err(|e| {
                    Error::runtime_with_context(
                        format!("stage task failed: {}", e),
                        crate::ErrorContext::new().with_source("flow"),
                    )
                })?;
            }
            Ok::<(), Error>(())
        };

        let outcome = tokio::select! {
            biased;
            reason = ctx.done() => return Err(reason),
            Some(err) = err_rx.recv() => return Err(err),
            res = completion => res,
        };

        // A stage may have failed after closing its pipe; its error wins over
        // the (truncated) output collected downstream.
        if let Ok(err) = err_rx.try_recv() {
            return Err(err);
        }
        if outcome.is_ok() {
            debug!(stages, "flow run completed");
        }
        outcome
    }
}

async fn run_stage(
    stage: usize,
    handler: SharedHandler,
    ctx: Context,
    mut reader: PipeReader,
    mut writer: pipe::PipeWriter,
    errors: mpsc::Sender<Error>,
) {
    let outcome = AssertUnwindSafe(handler.serve_flow(&ctx, &mut reader, &mut writer))
        .catch_unwind()
        .await;
    let result = match outcome {
        Ok(result) => result,
        Err(panic) => Err(Error::Panicked {
            stage,
            message: panic_message(panic.as_ref()),
        }),
    };
    if let Err(err) = result {
        debug!(stage, handler = handler.name(), error = %err, "flow stage failed");
        // capacity equals the stage count, so this never drops an error
        let _ = errors.try_send(err);
    }
    let _ = writer.shutdown().await;
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A flow is itself a handler, so flows nest inside other flows and middleware.
#[async_trait]
impl Handler for Flow {
    async fn serve_flow(
        &self,
        ctx: &Context,
        input: &mut (dyn AsyncRead + Send + Unpin),
        output: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<()> {
        if self.handlers.is_empty() {
            tokio::io::copy(input, output).await?;
            output.flush().await?;
            return Ok(());
        }
        self.execute(ctx, input, |mut tail| async move {
            tokio::io::copy(&mut tail, &mut *output).await?;
            output.flush().await?;
            Ok(())
        })
        .await
    }

    fn name(&self) -> &str {
        "flow"
    }
}

impl Default for Flow {
    fn default() -> Self {
        Self::new()
    }
}
