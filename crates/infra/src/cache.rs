//! Process-wide TTL cache.
//!
//! Keys are strings so callers can namespace them (`agency:<id>:active`)
//! and drop a whole namespace with [`TtlCache::invalidate_prefix`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Upper bound on any entry's lifetime.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct TtlCache<V> {
    default_ttl: Duration,
    entries: RwLock<HashMap<String, Entry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Live value for `key`. Expired entries read as missing.
    pub fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone())
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    /// TTLs longer than [`MAX_TTL`] are capped.
    pub fn insert_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let expires_at = expiry_from(Instant::now(), ttl);
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries.insert(
            key.into(),
            Entry {
                value,
                expires_at,
            },
        );
    }

    /// Return the cached value or load, cache and return a fresh one.
    ///
    /// Loader errors are returned as-is and nothing is cached. Two callers
    /// missing at the same time may both run the loader.
    pub async fn get_or_insert_with<F, Fut, E>(&self, key: &str, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }
        let value = load().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn invalidate(&self, key: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries.remove(key).is_some()
    }

    /// Drop every key starting with `prefix`; returns how many were dropped.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        before - entries.len()
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    /// Number of entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn expiry_from(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl.min(MAX_TTL)).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn huge_ttls_are_capped_instead_of_overflowing() {
        let cache = TtlCache::new(Duration::MAX);
        cache.insert("a", 1);
        cache.insert_with_ttl("b", 2, Duration::from_secs(u64::MAX));
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), Some(2));

        let now = Instant::now();
        assert_eq!(expiry_from(now, Duration::MAX), now + MAX_TTL);
    }

    #[test]
    fn expired_entries_read_as_missing_and_purge() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert_with_ttl("b", 2, Duration::ZERO);

        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn prefix_invalidation_only_touches_the_namespace() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("agency:1:active", true);
        cache.insert("agency:1:plan", true);
        cache.insert("agency:2:active", false);

        assert_eq!(cache.invalidate_prefix("agency:1:"), 2);
        assert_eq!(cache.get("agency:2:active"), Some(false));
        assert!(cache.invalidate("agency:2:active"));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn loader_runs_once_per_live_entry() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let mut calls = 0;

        for _ in 0..3 {
            let v: Result<u32, ()> = cache
                .get_or_insert_with("k", || {
                    calls += 1;
                    async { Ok(7) }
                })
                .await;
            assert_eq!(v, Ok(7));
        }
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn loader_errors_are_not_cached() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60));
        let err: Result<u32, &str> = cache.get_or_insert_with("k", || async { Err("down") }).await;
        assert_eq!(err, Err("down"));
        assert!(cache.get("k").is_none());
    }
}
