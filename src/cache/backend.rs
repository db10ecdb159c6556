//! Cache store implementations.

use super::key::CacheKey;
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default period of the background expiry sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
struct CacheEntry {
    data: Bytes,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn new(data: Bytes, ttl: Duration) -> Self {
        Self {
            data,
            created_at: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) > self.ttl
    }
}

/// Pluggable key/value store behind [`super::Cache`].
///
/// Implementations must never return an expired or partially written entry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>>;
    async fn set(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> Result<()>;
    /// Returns whether an entry was removed.
    async fn delete(&self, key: &CacheKey) -> Result<bool>;
    async fn clear(&self) -> Result<()>;
    async fn exists(&self, key: &CacheKey) -> Result<bool>;
    /// Keys of all live entries, in no particular order.
    async fn list(&self) -> Result<Vec<CacheKey>>;
    async fn len(&self) -> Result<usize>;
    fn name(&self) -> &'static str;
}

struct Entries {
    map: RwLock<HashMap<String, CacheEntry>>,
    max_entries: Option<usize>,
}

impl Entries {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.map.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.map.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop expired entries; returns how many were removed.
    fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut map = self.write();
        let before = map.len();
        map.retain(|_, e| !e.is_expired(now));
        before - map.len()
    }

    fn make_room(&self, map: &mut HashMap<String, CacheEntry>, incoming: &str) {
        let Some(max) = self.max_entries else {
            return;
        };
        if map.contains_key(incoming) {
            return;
        }
        let now = Instant::now();
        map.retain(|_, e| !e.is_expired(now));
        while !map.is_empty() && map.len() >= max {
            let oldest = map
                .iter()
                .min_by_key(|(_, e)| e.created_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    map.remove(&k);
                }
                None => break,
            }
        }
    }
}

/// In-process store: a locked map with lazy expiry on reads plus a periodic
/// sweep task.
///
/// The sweep task only holds a weak reference to the map and stops when the
/// store is closed or dropped. Outside a Tokio runtime no sweep task is
/// started and expiry is purely lazy.
pub struct MemoryStore {
    entries: Arc<Entries>,
    shutdown: CancellationToken,
}

impl MemoryStore {
    pub fn new(sweep_interval: Duration, max_entries: Option<usize>) -> Self {
        let entries = Arc::new(Entries {
            map: RwLock::new(HashMap::new()),
            max_entries: max_entries.map(|n| n.max(1)),
        });
        let shutdown = CancellationToken::new();
        spawn_sweeper(Arc::downgrade(&entries), sweep_interval, shutdown.clone());
        Self { entries, shutdown }
    }

    /// Stop the background sweep. Lazy expiry keeps working.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Run one sweep now; returns the number of removed entries.
    pub fn sweep(&self) -> usize {
        self.entries.sweep()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_SWEEP_INTERVAL, None)
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn spawn_sweeper(entries: Weak<Entries>, every: Duration, shutdown: CancellationToken) {
    if every.is_zero() {
        return;
    }
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        debug!("no runtime, cache sweep disabled");
        return;
    };
    runtime.spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(entries) = entries.upgrade() else { break };
                    let removed = entries.sweep();
                    if removed > 0 {
                        debug!(removed, "cache sweep removed expired entries");
                    }
                }
            }
        }
        debug!("cache sweep stopped");
    });
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>> {
        let now = Instant::now();
        {
            let map = self.entries.read();
            match map.get(&key.hash) {
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.data.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // expired: remove unless it was replaced in the meantime
        let mut map = self.entries.write();
        if map.get(&key.hash).is_some_and(|e| e.is_expired(now)) {
            map.remove(&key.hash);
        }
        Ok(None)
    }

    async fn set(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> Result<()> {
        let mut map = self.entries.write();
        self.entries.make_room(&mut map, &key.hash);
        map.insert(key.hash.clone(), CacheEntry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.entries.write().remove(&key.hash).is_some())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }

    async fn exists(&self, key: &CacheKey) -> Result<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .get(&key.hash)
            .map(|e| !e.is_expired(now))
            .unwrap_or(false))
    }

    async fn list(&self) -> Result<Vec<CacheKey>> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|(_, e)| !e.is_expired(now))
            .map(|(k, _)| CacheKey::new(k.clone()))
            .collect())
    }

    async fn len(&self) -> Result<usize> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .values()
            .filter(|e| !e.is_expired(now))
            .count())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Store that keeps nothing; every lookup is a miss.
#[derive(Debug, Default)]
pub struct NullStore;

impl NullStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CacheStore for NullStore {
    async fn get(&self, _: &CacheKey) -> Result<Option<Bytes>> {
        Ok(None)
    }
    async fn set(&self, _: &CacheKey, _: Bytes, _: Duration) -> Result<()> {
        Ok(())
    }
    async fn delete(&self, _: &CacheKey) -> Result<bool> {
        Ok(false)
    }
    async fn clear(&self) -> Result<()> {
        Ok(())
    }
    async fn exists(&self, _: &CacheKey) -> Result<bool> {
        Ok(false)
    }
    async fn list(&self) -> Result<Vec<CacheKey>> {
        Ok(Vec::new())
    }
    async fn len(&self) -> Result<usize> {
        Ok(0)
    }
    fn name(&self) -> &'static str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> CacheKey {
        CacheKey::new(s)
    }

    #[tokio::test]
    async fn test_memory_store_basic_operations() {
        let store = MemoryStore::default();
        let ttl = Duration::from_secs(60);
        store.set(&key("a"), Bytes::from_static(b"1"), ttl).await.unwrap();
        store.set(&key("b"), Bytes::from_static(b"2"), ttl).await.unwrap();

        assert_eq!(store.get(&key("a")).await.unwrap().unwrap(), "1");
        assert!(store.exists(&key("b")).await.unwrap());
        assert_eq!(store.len().await.unwrap(), 2);

        let mut keys: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|k| k.hash)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);

        assert!(store.delete(&key("a")).await.unwrap());
        assert!(!store.delete(&key("a")).await.unwrap());
        store.clear().await.unwrap();
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_never_returned() {
        let store = MemoryStore::new(Duration::from_secs(3600), None);
        store
            .set(&key("k"), Bytes::from_static(b"v"), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(store.exists(&key("k")).await.unwrap());

        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(!store.exists(&key("k")).await.unwrap());
        assert!(store.list().await.unwrap().is_empty());
        assert!(store.get(&key("k")).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_removes_expired() {
        let store = MemoryStore::new(Duration::from_millis(100), None);
        store
            .set(&key("k"), Bytes::from_static(b"v"), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        // the sweep already dropped it, so a manual sweep finds nothing
        assert_eq!(store.sweep(), 0);
        assert_eq!(store.entries.read().len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_stops_sweep() {
        let store = MemoryStore::new(Duration::from_millis(100), None);
        assert!(!store.is_closed());
        store
            .set(&key("k"), Bytes::from_static(b"v"), Duration::from_millis(10))
            .await
            .unwrap();
        store.close();
        assert!(store.is_closed());

        tokio::time::sleep(Duration::from_millis(350)).await;
        // no sweep ran: the expired entry is still in the map
        assert_eq!(store.entries.read().len(), 1);
        // reads still honour expiry without the sweep
        assert!(store.get(&key("k")).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_sweep() {
        let store = MemoryStore::new(Duration::from_millis(100), None);
        store
            .set(&key("k"), Bytes::from_static(b"v"), Duration::from_millis(10))
            .await
            .unwrap();
        // keep the map alive past the store
        let entries = Arc::clone(&store.entries);
        drop(store);

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(entries.read().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_entries_evicts_oldest() {
        let store = MemoryStore::new(DEFAULT_SWEEP_INTERVAL, Some(2));
        let ttl = Duration::from_secs(60);
        store.set(&key("a"), Bytes::from_static(b"1"), ttl).await.unwrap();
        tokio::time::advance(Duration::from_millis(1)).await;
        store.set(&key("b"), Bytes::from_static(b"2"), ttl).await.unwrap();
        tokio::time::advance(Duration::from_millis(1)).await;
        store.set(&key("c"), Bytes::from_static(b"3"), ttl).await.unwrap();

        assert!(!store.exists(&key("a")).await.unwrap());
        assert!(store.exists(&key("b")).await.unwrap());
        assert!(store.exists(&key("c")).await.unwrap());

        // overwriting an existing key does not evict
        store.set(&key("c"), Bytes::from_static(b"4"), ttl).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 2);
    }

    #[test]
    fn test_store_without_runtime_is_lazy_only() {
        let store = MemoryStore::new(Duration::from_millis(10), None);
        assert_eq!(store.sweep(), 0);
    }

    #[tokio::test]
    async fn test_null_store_keeps_nothing() {
        let store = NullStore::new();
        store
            .set(&key("k"), Bytes::from_static(b"v"), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(store.get(&key("k")).await.unwrap().is_none());
        assert_eq!(store.name(), "null");
    }
}
