//! Batch executor.
//!
//! Payloads of one window are joined with [`SEPARATOR`], sent through the
//! handler in a single call, and the output is split on the same separator.
//! Splitting relies on the handler preserving the separator; when the part
//! count does not match, the batch degrades instead of guessing: the first
//! caller gets the raw output and every other caller gets
//! [`Error::BatchSplit`].

use super::collector::BatchRequest;
use crate::handler::SharedHandler;
use crate::{Context, Error};
use bytes::Bytes;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

/// Frame separator between coalesced payloads. It is a line of its own holding
/// the ASCII record separator, so line-oriented handlers pass it through.
pub const SEPARATOR: &[u8] = b"\n\x1e\n";

/// Join payloads with [`SEPARATOR`].
pub fn join_frames<T: AsRef<[u8]>>(frames: &[T]) -> Vec<u8> {
    let total = frames.iter().map(|f| f.as_ref().len()).sum::<usize>()
        + SEPARATOR.len() * frames.len().saturating_sub(1);
    let mut combined = Vec::with_capacity(total);
    for (i, frame) in frames.iter().enumerate() {
        if i > 0 {
            combined.extend_from_slice(SEPARATOR);
        }
        combined.extend_from_slice(frame.as_ref());
    }
    combined
}

/// Split on [`SEPARATOR`]. An empty input yields one empty part.
pub fn split_frames(data: &[u8]) -> Vec<&[u8]> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i + SEPARATOR.len() <= data.len() {
        if &data[i..i + SEPARATOR.len()] == SEPARATOR {
            parts.push(&data[start..i]);
            i += SEPARATOR.len();
            start = i;
        } else {
            i += 1;
        }
    }
    parts.push(&data[start..]);
    parts
}

/// Run one window through the handler and answer every caller.
pub(crate) async fn flush(handler: SharedHandler, requests: Vec<BatchRequest>) {
    if requests.is_empty() {
        return;
    }
    let count = requests.len();
    let combined = join_frames(&requests.iter().map(|r| r.payload.clone()).collect::<Vec<_>>());

    let ctx = Context::background();
    let mut reader: &[u8] = &combined;
    let mut output = Vec::new();
    let outcome = AssertUnwindSafe(handler.serve_flow(&ctx, &mut reader, &mut output))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| {
            Err(Error::runtime_with_context(
                "batch handler panicked",
                crate::ErrorContext::new().with_source("batch"),
            ))
        });

    if let Err(err) = outcome {
        debug!(size = count, error = %err, "batch handler failed");
        let shared = Arc::new(err);
        for request in requests {
            request.deliver(Err(Error::Batch(Arc::clone(&shared))));
        }
        return;
    }

    let output = Bytes::from(output);
    let parts = split_frames(&output);
    if parts.len() == count {
        debug!(size = count, "batch flushed");
        let parts: Vec<Bytes> = parts.into_iter().map(|p| output.slice_ref(p)).collect();
        for (request, part) in requests.into_iter().zip(parts) {
            request.deliver(Ok(part));
        }
        return;
    }

    warn!(
        expected = count,
        actual = parts.len(),
        "batch response splitting failed"
    );
    let actual = parts.len();
    let mut requests = requests.into_iter();
    if let Some(first) = requests.next() {
        first.deliver(Ok(output.clone()));
    }
    for request in requests {
        request.deliver(Err(Error::BatchSplit {
            expected: count,
            actual,
        }));
    }
}
