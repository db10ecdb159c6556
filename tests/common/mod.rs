//! Shared handlers for the integration tests.
#![allow(dead_code)]

use flowkit::{handler_fn, Error, Handler};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Appends `tag` to whatever it reads.
pub fn suffix(tag: &'static str) -> impl Handler {
    handler_fn(move |_ctx, input, output| {
        Box::pin(async move {
            let mut buf = Vec::new();
            input.read_to_end(&mut buf).await?;
            output.write_all(&buf).await?;
            output.write_all(tag.as_bytes()).await?;
            Ok(())
        })
    })
}

/// Uppercases its input and counts invocations.
pub fn counted_upper(calls: Arc<AtomicUsize>) -> impl Handler {
    handler_fn(move |_ctx, input, output| {
        calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            let mut buf = Vec::new();
            input.read_to_end(&mut buf).await?;
            output.write_all(&buf.to_ascii_uppercase()).await?;
            Ok(())
        })
    })
}

/// Fails the first `failures` calls, then echoes.
pub fn fails_first(failures: usize, calls: Arc<AtomicUsize>) -> impl Handler {
    handler_fn(move |_ctx, input, output| {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if n < failures {
                return Err(Error::handler(format!("attempt {} failed", n + 1)));
            }
            tokio::io::copy(input, output).await?;
            Ok(())
        })
    })
}

/// Always fails.
pub fn always_fails(calls: Arc<AtomicUsize>) -> impl Handler {
    fails_first(usize::MAX, calls)
}

pub fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

pub fn count(calls: &Arc<AtomicUsize>) -> usize {
    calls.load(Ordering::SeqCst)
}
