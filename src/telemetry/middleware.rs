//! Call logging middleware.

use super::{LogLevel, Logger, TracingLogger};
use crate::handler::{Handler, SharedHandler};
use crate::{Context, Result};
use async_trait::async_trait;
use std::io;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use uuid::Uuid;

/// Wraps a handler and reports every call to a [`Logger`]: a start line, then
/// either a finish line with byte counts and elapsed time or a failure line
/// with the error.
pub struct Logging {
    handler: SharedHandler,
    logger: Arc<dyn Logger>,
    label: String,
}

impl Logging {
    /// Log through [`TracingLogger`].
    pub fn new<H: Handler + 'static>(handler: H) -> Self {
        Self::with_logger(handler, Arc::new(TracingLogger))
    }

    pub fn with_logger<H: Handler + 'static>(handler: H, logger: Arc<dyn Logger>) -> Self {
        let label = handler.name().to_string();
        Self {
            handler: Arc::new(handler),
            logger,
            label,
        }
    }

    /// Name used in log lines instead of the wrapped handler's own.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    fn emit(&self, level: LogLevel, message: String) {
        let logger = &self.logger;
        if std::panic::catch_unwind(AssertUnwindSafe(|| logger.log(level, &message))).is_err() {
            tracing::warn!(handler = %self.label, "logger panicked, message dropped");
        }
    }
}

#[async_trait]
impl Handler for Logging {
    async fn serve_flow(
        &self,
        ctx: &Context,
        input: &mut (dyn AsyncRead + Send + Unpin),
        output: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<()> {
        let call_id = Uuid::new_v4();
        self.emit(
            LogLevel::Info,
            format!("[{}] {} started", call_id, self.label),
        );

        let started = Instant::now();
        let mut reader = CountingReader::new(input);
        let mut writer = CountingWriter::new(output);
        let result = self.handler.serve_flow(ctx, &mut reader, &mut writer).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(()) => self.emit(
                LogLevel::Info,
                format!(
                    "[{}] {} finished in {:?}: {} bytes in, {} bytes out",
                    call_id, self.label, elapsed, reader.count, writer.count
                ),
            ),
            Err(e) => self.emit(
                LogLevel::Error,
                format!(
                    "[{}] {} failed after {:?}: {}",
                    call_id, self.label, elapsed, e
                ),
            ),
        }
        result
    }

    fn name(&self) -> &str {
        "logging"
    }
}

struct CountingReader<'a> {
    inner: &'a mut (dyn AsyncRead + Send + Unpin),
    count: u64,
}

impl<'a> CountingReader<'a> {
    fn new(inner: &'a mut (dyn AsyncRead + Send + Unpin)) -> Self {
        Self { inner, count: 0 }
    }
}

impl AsyncRead for CountingReader<'_> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let polled = Pin::new(&mut *this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = polled {
            this.count += (buf.filled().len() - before) as u64;
        }
        polled
    }
}

struct CountingWriter<'a> {
    inner: &'a mut (dyn AsyncWrite + Send + Unpin),
    count: u64,
}

impl<'a> CountingWriter<'a> {
    fn new(inner: &'a mut (dyn AsyncWrite + Send + Unpin)) -> Self {
        Self { inner, count: 0 }
    }
}

impl AsyncWrite for CountingWriter<'_> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut *this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = polled {
            this.count += n as u64;
        }
        polled
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::MemoryLogger;
    use crate::{handler_fn, Error};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct PanickingLogger;

    impl Logger for PanickingLogger {
        fn log(&self, _: LogLevel, _: &str) {
            panic!("logger exploded");
        }
    }

    fn double() -> impl Handler {
        handler_fn(|_ctx, input, output| {
            Box::pin(async move {
                let mut buf = Vec::new();
                input.read_to_end(&mut buf).await?;
                output.write_all(&buf).await?;
                output.write_all(&buf).await?;
                Ok(())
            })
        })
        .with_name("double")
    }

    #[tokio::test]
    async fn test_logs_start_and_finish_with_byte_counts() {
        let logger = Arc::new(MemoryLogger::default());
        let logged = Logging::with_logger(double(), logger.clone());

        let mut input: &[u8] = b"abc";
        let mut output = Vec::new();
        logged
            .serve_flow(&Context::background(), &mut input, &mut output)
            .await
            .unwrap();
        assert_eq!(output, b"abcabc");

        let records = logger.records();
        assert_eq!(records.len(), 2);
        assert!(records[0].message.ends_with("double started"));
        assert!(records[1].message.contains("3 bytes in, 6 bytes out"));

        // both lines carry the same call id
        let id = &records[0].message[..38];
        assert!(records[1].message.starts_with(id));
    }

    #[tokio::test]
    async fn test_failure_is_logged_and_returned() {
        let logger = Arc::new(MemoryLogger::default());
        let failing = handler_fn(|_ctx, _input, _output| {
            Box::pin(async move { Err::<(), _>(Error::handler("nope")) })
        });
        let logged = Logging::with_logger(failing, logger.clone()).with_label("failing");

        let mut input: &[u8] = b"";
        let mut output = Vec::new();
        let err = logged
            .serve_flow(&Context::background(), &mut input, &mut output)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Handler { .. }));

        let errors = logger.records_at(LogLevel::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("failing failed"));
    }

    #[tokio::test]
    async fn test_panicking_logger_does_not_affect_data() {
        let logged = Logging::with_logger(double(), Arc::new(PanickingLogger));
        let mut input: &[u8] = b"xy";
        let mut output = Vec::new();
        logged
            .serve_flow(&Context::background(), &mut input, &mut output)
            .await
            .unwrap();
        assert_eq!(output, b"xyxy");
    }
}
