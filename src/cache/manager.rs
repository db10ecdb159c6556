//! Caching middleware.

use super::backend::{CacheStore, MemoryStore, DEFAULT_SWEEP_INTERVAL};
use super::key::{CacheKey, CacheKeyGenerator};
use crate::handler::{Handler, SharedHandler};
use crate::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Lifetime of a stored response.
    pub ttl: Duration,
    /// Period of the memory store's expiry sweep.
    pub sweep_interval: Duration,
    /// Upper bound on stored responses; `None` is unbounded.
    pub max_entries: Option<usize>,
    pub key_prefix: Option<String>,
    /// Mixed into every key digest; caches with different salts never share
    /// entries in one store.
    pub key_salt: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            max_entries: None,
            key_prefix: None,
            key_salt: None,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
    pub fn with_sweep_interval(mut self, every: Duration) -> Self {
        self.sweep_interval = every;
        self
    }
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }
    pub fn with_key_salt(mut self, salt: impl Into<String>) -> Self {
        self.key_salt = Some(salt.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    errors: AtomicU64,
}

impl AtomicStats {
    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Handler middleware that memoizes the wrapped handler's output by the
/// SHA-256 of its input.
///
/// On a hit the wrapped handler is not called at all. On a miss its output is
/// stored only if it succeeded; store failures are logged and otherwise
/// ignored, so caching never fails a call.
pub struct Cache {
    handler: SharedHandler,
    store: Arc<dyn CacheStore>,
    keys: CacheKeyGenerator,
    config: CacheConfig,
    stats: Arc<AtomicStats>,
}

impl Cache {
    /// Cache backed by a fresh [`MemoryStore`].
    pub fn new<H: Handler + 'static>(handler: H, ttl: Duration) -> Self {
        Self::with_config(handler, CacheConfig::new().with_ttl(ttl))
    }

    pub fn with_config<H: Handler + 'static>(handler: H, config: CacheConfig) -> Self {
        let store = Arc::new(MemoryStore::new(config.sweep_interval, config.max_entries));
        Self::with_store(handler, store, config)
    }

    /// Cache backed by a caller-provided store, possibly shared with others.
    pub fn with_store<H: Handler + 'static>(
        handler: H,
        store: Arc<dyn CacheStore>,
        config: CacheConfig,
    ) -> Self {
        let mut keys = CacheKeyGenerator::new();
        if let Some(ref prefix) = config.key_prefix {
            keys = keys.with_prefix(prefix.clone());
        }
        if let Some(ref salt) = config.key_salt {
            keys = keys.with_salt(salt.clone());
        }
        Self {
            handler: Arc::new(handler),
            store,
            keys,
            config,
            stats: Arc::new(AtomicStats::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    /// Key under which the response to `input` is stored.
    pub fn key_for(&self, input: &[u8]) -> CacheKey {
        self.keys.generate(input)
    }

    /// Drop the stored response for `input`, if any.
    pub async fn invalidate(&self, input: &[u8]) -> Result<bool> {
        self.store.delete(&self.key_for(input)).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }

    async fn lookup(&self, key: &CacheKey) -> Option<Bytes> {
        match self.store.get(key).await {
            Ok(Some(hit)) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(hit)
            }
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                warn!(store = self.store.name(), error = %e, "cache lookup failed, treating as miss");
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }
}

#[async_trait]
impl Handler for Cache {
    async fn serve_flow(
        &self,
        ctx: &Context,
        input: &mut (dyn AsyncRead + Send + Unpin),
        output: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<()> {
        let mut payload = Vec::new();
        input.read_to_end(&mut payload).await?;
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        let key = self.key_for(&payload);
        if let Some(hit) = self.lookup(&key).await {
            debug!(key = %key, "cache hit");
            output.write_all(&hit).await?;
            output.flush().await?;
            return Ok(());
        }

        let mut produced = Vec::new();
        let mut replay: &[u8] = &payload;
        self.handler.serve_flow(ctx, &mut replay, &mut produced).await?;
        let produced = Bytes::from(produced);

        match self.store.set(&key, produced.clone(), self.config.ttl).await {
            Ok(()) => {
                self.stats.sets.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(store = self.store.name(), key = %key, error = %e, "cache write failed");
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
            }
        }

        output.write_all(&produced).await?;
        output.flush().await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "cache"
    }
}
