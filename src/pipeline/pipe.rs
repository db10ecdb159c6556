//! Single-producer/single-consumer byte pipe connecting two stages.
//!
//! Backed by a small `tokio::io::duplex` buffer: a writer that gets ahead of
//! its reader by more than the capacity is suspended until the reader drains
//! it. Shutting down or dropping the writer signals EOF once the buffered
//! bytes are consumed; dropping the reader makes further writes fail with
//! `BrokenPipe`.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

/// Default hand-off capacity in bytes.
pub const DEFAULT_PIPE_CAPACITY: usize = 8 * 1024;

/// Write side of a [`pipe`].
#[derive(Debug)]
pub struct PipeWriter {
    inner: DuplexStream,
}

/// Read side of a [`pipe`].
#[derive(Debug)]
pub struct PipeReader {
    inner: DuplexStream,
}

/// Create a connected writer/reader pair with the given capacity (min 1 byte).
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (w, r) = tokio::io::duplex(capacity.max(1));
    (PipeWriter { inner: w }, PipeReader { inner: r })
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl AsyncRead for PipeReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}
