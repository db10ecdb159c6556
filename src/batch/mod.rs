//! 请求合批模块：将并发调用合并为对被包装处理器的少量调用。
//!
//! # Request Batching Module
//!
//! [`Batch`] wraps a handler and coalesces concurrent calls. A window opens
//! with the first pending call and closes when it holds `max_size` calls or
//! `max_wait` has elapsed, whichever comes first. The window's payloads are
//! joined with [`SEPARATOR`], handed to the handler in one call, and the
//! output is split back in submission order.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Batch`] | The batching middleware; cheap to clone, clones share one window |
//! | [`BatchConfig`] | Window size and wait time |
//! | [`join_frames`] / [`split_frames`] | The separator framing used on the wire |
//!
//! ## Example
//!
//! ```rust
//! use flowkit::batch::Batch;
//! use flowkit::{handler_fn, Context, Flow};
//! use std::time::Duration;
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
//! let batch = Batch::new(upper, 10, Duration::from_millis(20));
//!
//! let mut out = String::new();
//! Flow::new().use_handler(batch).run(&Context::background(), "hello", &mut out).await?;
//! assert_eq!(out, "HELLO");
//! # Ok(())
//! # }
//! ```
//!
//! ## Splitting
//!
//! The separator is a line of its own, so handlers that transform text line by
//! line preserve it. Handlers that merge or drop it make the batch degrade:
//! the first caller receives the whole output and the others receive
//! [`crate::Error::BatchSplit`].

mod collector;
mod executor;
mod service;

pub use collector::BatchConfig;
pub use executor::{join_frames, split_frames, SEPARATOR};
pub use service::Batch;
