use crate::handler::{Handler, SharedHandler};
use crate::{Context, Error, ErrorContext, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Shortest pause between two token checks.
const MIN_POLL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct RateLimiterSnapshot {
    pub rate: i64,
    pub per: Duration,
    pub tokens: i64,
    /// Estimated wait time until a token is available (ms), if currently empty.
    pub estimated_wait_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Operations allowed per `per`; also the bucket size.
    pub rate: i64,
    pub per: Duration,
}

impl RateLimiterConfig {
    pub fn new(rate: i64, per: Duration) -> Self {
        Self { rate, per }
    }

    pub fn per_second(rate: i64) -> Self {
        Self::new(rate, Duration::from_secs(1))
    }

    /// Time to earn back one token.
    ///
    /// Never below one nanosecond for a positive rate, so a rate finer than
    /// the clock resolution still limits.
    pub fn refill_interval(&self) -> Duration {
        if self.rate <= 0 {
            return Duration::ZERO;
        }
        (self.per / u32::try_from(self.rate).unwrap_or(u32::MAX)).max(Duration::from_nanos(1))
    }

    fn validate(&self) -> Result<()> {
        if self.rate <= 0 {
            return Err(Error::configuration_with_context(
                "rate must be positive",
                ErrorContext::new()
                    .with_field_path("rate_limit.rate")
                    .with_details(format!("got {}", self.rate))
                    .with_source("rate_limiter"),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct State {
    tokens: i64,
    last_refill: Instant,
}

/// Token-bucket rate limiter shared by concurrent callers.
///
/// - Starts full, with `rate` tokens
/// - Refills lazily, one token per `per / rate`
/// - An invalid rate is reported on every call rather than at construction
pub struct RateLimiter {
    cfg: RateLimiterConfig,
    state: Mutex<State>,
}

impl RateLimiter {
    pub fn new(cfg: RateLimiterConfig) -> Self {
        let state = Mutex::new(State {
            tokens: cfg.rate.max(0),
            last_refill: Instant::now(),
        });
        Self { cfg, state }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.cfg
    }

    fn refill_locked(cfg: &RateLimiterConfig, st: &mut State) {
        let now = Instant::now();
        let max = cfg.rate;
        let interval = cfg.refill_interval();
        if interval.is_zero() {
            st.tokens = max;
            st.last_refill = now;
            return;
        }
        let elapsed = now.duration_since(st.last_refill);
        let earned = (elapsed.as_nanos() / interval.as_nanos()) as i64;
        if earned <= 0 {
            return;
        }
        if earned >= max - st.tokens {
            st.tokens = max;
            st.last_refill = now;
        } else {
            st.tokens += earned;
            // keep the fractional progress towards the next token
            st.last_refill += interval.saturating_mul(u32::try_from(earned).unwrap_or(u32::MAX));
        }
    }

    /// Time until the next token is earned.
    fn until_next_locked(cfg: &RateLimiterConfig, st: &State) -> Duration {
        let interval = cfg.refill_interval();
        interval.saturating_sub(st.last_refill.elapsed())
    }

    /// Acquire one token, sleeping until one is free or `ctx` is done.
    pub async fn wait(&self, ctx: &Context) -> Result<()> {
        self.cfg.validate()?;
        loop {
            if let Some(err) = ctx.err() {
                return Err(err);
            }
            let pause = {
                let mut st = self.state.lock().await;
                Self::refill_locked(&self.cfg, &mut st);
                if st.tokens > 0 {
                    st.tokens -= 1;
                    return Ok(());
                }
                Self::until_next_locked(&self.cfg, &st).max(MIN_POLL)
            };

            tokio::select! {
                biased;
                reason = ctx.done() => return Err(reason),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// Take a token if one is available right now.
    pub async fn try_acquire(&self) -> Result<bool> {
        self.cfg.validate()?;
        let mut st = self.state.lock().await;
        Self::refill_locked(&self.cfg, &mut st);
        if st.tokens > 0 {
            st.tokens -= 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub async fn snapshot(&self) -> RateLimiterSnapshot {
        let mut st = self.state.lock().await;
        let mut estimated_wait_ms = None;
        if self.cfg.rate > 0 {
            Self::refill_locked(&self.cfg, &mut st);
            if st.tokens == 0 {
                estimated_wait_ms =
                    Some(Self::until_next_locked(&self.cfg, &st).as_millis() as u64);
            }
        }
        RateLimiterSnapshot {
            rate: self.cfg.rate,
            per: self.cfg.per,
            tokens: st.tokens,
            estimated_wait_ms,
        }
    }
}

/// Handler middleware gating every call on a shared [`RateLimiter`].
///
/// The input stream is passed through untouched once a token is granted.
pub struct RateLimit {
    handler: SharedHandler,
    limiter: Arc<RateLimiter>,
}

impl RateLimit {
    pub fn new<H: Handler + 'static>(handler: H, rate: i64, per: Duration) -> Self {
        Self::with_limiter(
            handler,
            Arc::new(RateLimiter::new(RateLimiterConfig::new(rate, per))),
        )
    }

    /// Share one bucket between several wrapped handlers.
    pub fn with_limiter<H: Handler + 'static>(handler: H, limiter: Arc<RateLimiter>) -> Self {
        Self {
            handler: Arc::new(handler),
            limiter,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

#[async_trait]
impl Handler for RateLimit {
    async fn serve_flow(
        &self,
        ctx: &Context,
        input: &mut (dyn AsyncRead + Send + Unpin),
        output: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<()> {
        self.limiter.wait(ctx).await?;
        self.handler.serve_flow(ctx, input, output).await
    }

    fn name(&self) -> &str {
        "rate_limit"
    }
}
