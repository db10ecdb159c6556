//! 响应缓存模块：按输入内容哈希缓存处理器输出，支持可插拔存储后端。
//!
//! # Response Caching Module
//!
//! [`Cache`] wraps a handler and stores its output under the SHA-256 of its
//! input. A hit writes the stored bytes straight to the output without
//! calling the wrapped handler.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Cache`] | The caching middleware |
//! | [`CacheConfig`] | TTL, sweep interval, size bound and key prefix |
//! | [`CacheStore`] | Pluggable store contract (get/set/delete/clear/exists/list) |
//! | [`MemoryStore`] | Default in-process store with lazy expiry and a background sweep |
//! | [`NullStore`] | Store that never keeps anything |
//! | [`CacheKey`] / [`CacheKeyGenerator`] | Content-addressed keys |
//!
//! ## Example
//!
//! ```rust
//! use flowkit::cache::{Cache, CacheConfig};
//! use flowkit::{handler_fn, Context, Flow};
//! use std::time::Duration;
//! use tokio::io::AsyncWriteExt;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> flowkit::Result<()> {
//! let expensive = handler_fn(|_ctx, input, output| {
//!     Box::pin(async move {
//!         tokio::io::copy(input, output).await?;
//!         output.flush().await?;
//!         Ok(())
//!     })
//! });
//! let cached = Cache::with_config(expensive, CacheConfig::new().with_ttl(Duration::from_secs(300)));
//!
//! let flow = Flow::new().use_handler(cached);
//! let mut out = String::new();
//! flow.run(&Context::background(), "same input", &mut out).await?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod key;
mod manager;

pub use backend::{CacheStore, MemoryStore, NullStore, DEFAULT_SWEEP_INTERVAL};
pub use key::{CacheKey, CacheKeyGenerator};
pub use manager::{Cache, CacheConfig, CacheStats};
