//! Boundary converters between typed values and the byte streams a flow runs on.
//!
//! A flow calls [`FlowInput::into_reader`] once before the first stage and
//! [`FlowOutput::read_from`] once on the last stage's output. Structured
//! formats plug in by implementing these traits for their own types.

use crate::Result;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::io::{self, Cursor};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Owned, type-erased input stream.
pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;

/// Turns a value into the stream fed to the first stage.
pub trait FlowInput: Send {
    fn into_reader(self) -> Result<BoxReader>;
}

impl FlowInput for String {
    fn into_reader(self) -> Result<BoxReader> {
        Ok(Box::new(Cursor::new(self.into_bytes())))
    }
}

impl FlowInput for &'static str {
    fn into_reader(self) -> Result<BoxReader> {
        Ok(Box::new(Cursor::new(self.as_bytes())))
    }
}

impl FlowInput for Vec<u8> {
    fn into_reader(self) -> Result<BoxReader> {
        Ok(Box::new(Cursor::new(self)))
    }
}

impl FlowInput for Bytes {
    fn into_reader(self) -> Result<BoxReader> {
        Ok(Box::new(Cursor::new(self)))
    }
}

/// Streams any reader into a flow without buffering it first.
pub struct ReaderInput<R>(pub R);

impl<R> FlowInput for ReaderInput<R>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    fn into_reader(self) -> Result<BoxReader> {
        Ok(Box::new(self.0))
    }
}

/// Receives the final stream of a flow.
#[async_trait]
pub trait FlowOutput: Send {
    async fn read_from(&mut self, reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<()>;
}

/// Replaces the string with the output, which must be valid UTF-8.
#[async_trait]
impl FlowOutput for String {
    async fn read_from(&mut self, reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<()> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        *self = String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(())
    }
}

#[async_trait]
impl FlowOutput for Vec<u8> {
    async fn read_from(&mut self, reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<()> {
        self.clear();
        reader.read_to_end(self).await?;
        Ok(())
    }
}

#[async_trait]
impl FlowOutput for BytesMut {
    async fn read_from(&mut self, reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<()> {
        self.clear();
        while reader.read_buf(self).await? != 0 {}
        Ok(())
    }
}

/// Copies the output into any writer and flushes it.
pub struct WriterOutput<W>(pub W);

impl<W> WriterOutput<W> {
    pub fn into_inner(self) -> W {
        self.0
    }
}

#[async_trait]
impl<W> FlowOutput for WriterOutput<W>
where
    W: AsyncWrite + Send + Unpin,
{
    async fn read_from(&mut self, reader: &mut (dyn AsyncRead + Send + Unpin)) -> Result<()> {
        tokio::io::copy(reader, &mut self.0).await?;
        self.0.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect<O: FlowOutput>(input: impl FlowInput, mut out: O) -> Result<O> {
        let mut reader = input.into_reader()?;
        out.read_from(&mut reader).await?;
        Ok(out)
    }

    #[tokio::test]
    async fn test_string_round_trip_replaces_destination() {
        let out = collect("fresh", String::from("stale")).await.unwrap();
        assert_eq!(out, "fresh");
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_io_error() {
        let err = collect(vec![0xff, 0xfe], String::new()).await.unwrap_err();
        assert!(matches!(err, crate::Error::Io(ref e) if e.kind() == io::ErrorKind::InvalidData));
    }

    #[tokio::test]
    async fn test_reader_and_writer_adapters() {
        let input = ReaderInput(Cursor::new(b"streamed".to_vec()));
        let out = collect(input, WriterOutput(Vec::new())).await.unwrap();
        assert_eq!(out.into_inner(), b"streamed");

        let out = collect(Bytes::from_static(b"bytes"), BytesMut::new()).await.unwrap();
        assert_eq!(&out[..], b"bytes");
    }
}
