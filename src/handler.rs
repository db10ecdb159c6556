//! The handler contract shared by every stage and middleware.

use crate::{Context, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// Borrowed input stream handed to a handler.
pub type Reader<'a> = &'a mut (dyn AsyncRead + Send + Unpin);

/// Borrowed output stream handed to a handler.
pub type Writer<'a> = &'a mut (dyn AsyncWrite + Send + Unpin);

/// A shareable, type-erased handler.
pub type SharedHandler = Arc<dyn Handler>;

/// Atomic stream-processing unit: consume `input`, write to `output`.
///
/// Handlers hold no per-call state. The same handler may serve several
/// flows at once, so any internal state must be synchronized by the handler.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve_flow(
        &self,
        ctx: &Context,
        input: &mut (dyn AsyncRead + Send + Unpin),
        output: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<()>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "handler"
    }
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn serve_flow(
        &self,
        ctx: &Context,
        input: &mut (dyn AsyncRead + Send + Unpin),
        output: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<()> {
        (**self).serve_flow(ctx, input, output).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Box<H> {
    async fn serve_flow(
        &self,
        ctx: &Context,
        input: &mut (dyn AsyncRead + Send + Unpin),
        output: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<()> {
        (**self).serve_flow(ctx, input, output).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Handler backed by a closure, see [`handler_fn`].
pub struct FnHandler<F> {
    f: F,
    name: String,
}

impl<F> FnHandler<F> {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Adapt a closure with the handler signature into a [`Handler`].
///
/// ```rust
/// use flowkit::handler_fn;
/// use tokio::io::{AsyncReadExt, AsyncWriteExt};
///
/// let upper = handler_fn(|_ctx, input, output| {
///     Box::pin(async move {
///         let mut buf = Vec::new();
///         input.read_to_end(&mut buf).await?;
///         output.write_all(&buf.to_ascii_uppercase()).await?;
///         Ok(())
///     })
/// });
/// # let _ = upper;
/// ```
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: for<'a> Fn(&'a Context, Reader<'a>, Writer<'a>) -> BoxFuture<'a, Result<()>>
        + Send
        + Sync
        + 'static,
{
    FnHandler {
        f,
        name: "fn".to_string(),
    }
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(&'a Context, Reader<'a>, Writer<'a>) -> BoxFuture<'a, Result<()>>
        + Send
        + Sync
        + 'static,
{
    async fn serve_flow(
        &self,
        ctx: &Context,
        input: &mut (dyn AsyncRead + Send + Unpin),
        output: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<()> {
        (self.f)(ctx, input, output).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
