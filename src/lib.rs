//! # flowkit
//!
//! 流式处理管道库：以可组合中间件的方式串联异步处理器，并提供重试、熔断降级、限流、合批与缓存。
//!
//! Streaming handler pipelines for Tokio, composed from small middleware.
//!
//! ## Overview
//!
//! A [`Handler`] consumes a byte stream and produces a byte stream. A [`Flow`]
//! chains handlers with bounded pipes and runs every stage concurrently, so
//! a slow stage throttles the ones before it. Middleware wrap a handler and
//! are handlers themselves, so they nest freely and can sit anywhere in a
//! flow.
//!
//! ## Quick Start
//!
//! ```rust
//! use flowkit::{handler_fn, Context, Flow, Retry};
//! use std::time::Duration;
//! use tokio::io::{AsyncReadExt, AsyncWriteExt};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> flowkit::Result<()> {
//! let suffix = |tag: &'static str| {
//!     handler_fn(move |_ctx, input, output| {
//!         Box::pin(async move {
//!             let mut buf = Vec::new();
//!             input.read_to_end(&mut buf).await?;
//!             output.write_all(&buf).await?;
//!             output.write_all(tag.as_bytes()).await?;
//!             Ok(())
//!         })
//!     })
//! };
//!
//! let flow = Flow::new()
//!     .use_handler(suffix("-a"))
//!     .use_handler(Retry::new(suffix("-b"), 3));
//!
//! let ctx = Context::background().with_timeout(Duration::from_secs(5));
//! let mut out = String::new();
//! flow.run(&ctx, "test", &mut out).await?;
//! assert_eq!(out, "test-a-b");
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`handler`] | The handler contract and closure adapter |
//! | [`context`] | Cancellation and deadlines |
//! | [`pipeline`] | The flow engine, pipes, converters, retry, fallback, timeout |
//! | [`resilience`] | Circuit breaker, token bucket and the rate limit middleware |
//! | [`batch`] | Coalescing concurrent calls into one |
//! | [`cache`] | Content-addressed response caching |
//! | [`telemetry`] | Logger trait and call logging middleware |
//! | [`error`] | Crate error type |

pub mod batch;
pub mod cache;
pub mod context;
pub mod error;
pub mod handler;
pub mod pipeline;
pub mod resilience;
pub mod telemetry;

pub use batch::{Batch, BatchConfig};
pub use cache::{Cache, CacheConfig, CacheStore, MemoryStore};
pub use context::Context;
pub use error::{Error, ErrorContext};
pub use handler::{handler_fn, FnHandler, Handler, SharedHandler};
pub use pipeline::convert::{FlowInput, FlowOutput, ReaderInput, WriterOutput};
pub use pipeline::fallback::Fallback;
pub use pipeline::retry::{Retry, RetryConfig};
pub use pipeline::timeout::Timeout;
pub use pipeline::Flow;
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState, RateLimit, RateLimiter};
pub use telemetry::{Logger, Logging};

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
