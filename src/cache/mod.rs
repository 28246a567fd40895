//! Ephemeral key-value store with TTL semantics.
//!
//! Every piece of transient auth state (OTP codes, attempt counters,
//! block flags, registration tokens) lives behind the `KeyValueStore`
//! trait so components can be composed against an in-memory store in
//! tests and a shared store in production.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::error::CacheError;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the live value for `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Writes `value` under `key`, overwriting any existing entry and
    /// resetting its TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Atomically increments the integer counter at `key`, creating it at 1
    /// if absent or expired. The TTL is refreshed on every call, giving a
    /// rolling window from the most recent increment.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, CacheError>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// In-process `KeyValueStore`. Single-key atomicity comes from the write
/// lock; expired entries are treated as absent on read and evicted on the
/// next write touching them.
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    clock_skew: Arc<RwLock<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock_skew: Arc::new(RwLock::new(Duration::zero())),
        }
    }

    async fn now(&self) -> DateTime<Utc> {
        Utc::now() + *self.clock_skew.read().await
    }

    /// Shifts the store's notion of "now" forward so tests can cross TTL
    /// horizons without sleeping.
    pub async fn advance_clock(&self, by: Duration) {
        let mut skew = self.clock_skew.write().await;
        *skew = *skew + by;
    }

    /// Drops every expired entry.
    pub async fn purge_expired(&self) {
        let now = self.now().await;
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > now);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = self.now().await;
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let now = self.now().await;
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, CacheError> {
        let now = self.now().await;
        let mut entries = self.entries.write().await;
        let current = entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .and_then(|entry| entry.value.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + 1;
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();

        store.set("otp:+100", "123456", Duration::seconds(300)).await.unwrap();
        assert_eq!(
            store.get("otp:+100").await.unwrap(),
            Some("123456".to_string())
        );

        store.delete("otp:+100").await.unwrap();
        assert_eq!(store.get("otp:+100").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_overwrites_and_resets_ttl() {
        let store = MemoryStore::new();

        store.set("k", "old", Duration::seconds(10)).await.unwrap();
        store.advance_clock(Duration::seconds(8)).await;
        store.set("k", "new", Duration::seconds(10)).await.unwrap();

        // Past the original deadline, within the refreshed one.
        store.advance_clock(Duration::seconds(8)).await;
        assert_eq!(store.get("k").await.unwrap(), Some("new".to_string()));
    }

    #[tokio::test]
    async fn test_expiry() {
        let store = MemoryStore::new();

        store.set("k", "v", Duration::seconds(300)).await.unwrap();
        store.advance_clock(Duration::seconds(301)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_counts_and_refreshes_ttl() {
        let store = MemoryStore::new();
        let window = Duration::seconds(3600);

        assert_eq!(store.incr("attempts", window).await.unwrap(), 1);
        assert_eq!(store.incr("attempts", window).await.unwrap(), 2);

        // Each increment restarts the window, so the counter survives
        // past the deadline of the first write.
        store.advance_clock(Duration::seconds(3000)).await;
        assert_eq!(store.incr("attempts", window).await.unwrap(), 3);
        store.advance_clock(Duration::seconds(3000)).await;
        assert_eq!(store.get("attempts").await.unwrap(), Some("3".to_string()));
    }

    #[tokio::test]
    async fn test_incr_restarts_after_expiry() {
        let store = MemoryStore::new();
        let window = Duration::seconds(3600);

        assert_eq!(store.incr("attempts", window).await.unwrap(), 1);
        store.advance_clock(Duration::seconds(3601)).await;
        assert_eq!(store.incr("attempts", window).await.unwrap(), 1);
    }

    #[test]
    fn test_purge_expired() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            store.set("a", "1", Duration::seconds(10)).await.unwrap();
            store.set("b", "2", Duration::seconds(1000)).await.unwrap();

            store.advance_clock(Duration::seconds(11)).await;
            store.purge_expired().await;

            assert_eq!(store.get("a").await.unwrap(), None);
            assert_eq!(store.get("b").await.unwrap(), Some("2".to_string()));
        });
    }
}
