//! 弹性模式模块：提供熔断器和限流器等可靠性保障机制。
//!
//! # Resilience Primitives Module
//!
//! This module provides the stateful guards used by the resilience
//! middleware. Each guard keeps its state behind a single lock scoped to the
//! instance, held only for in-memory bookkeeping.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`circuit_breaker`] | Closed/Open/HalfOpen breaker used by [`crate::Fallback`] |
//! | [`rate_limiter`] | Token bucket limiter and the [`RateLimit`] middleware |
//!
//! ## Circuit Breaker
//!
//! ```rust
//! use flowkit::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig::new()
//!     .with_failure_threshold(5)
//!     .with_open_timeout(Duration::from_secs(30));
//! let breaker = CircuitBreaker::new(config);
//!
//! if breaker.allow() {
//!     // call the guarded handler...
//!     breaker.record_success();
//! }
//! ```
//!
//! ## Rate Limiter
//!
//! ```rust
//! use flowkit::resilience::rate_limiter::{RateLimiter, RateLimiterConfig};
//! use flowkit::Context;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> flowkit::Result<()> {
//! // 10 operations per second, bursting up to 10
//! let limiter = RateLimiter::new(RateLimiterConfig::new(10, Duration::from_secs(1)));
//! limiter.wait(&Context::background()).await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod rate_limiter;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState};
pub use rate_limiter::{RateLimit, RateLimiter, RateLimiterConfig, RateLimiterSnapshot};
