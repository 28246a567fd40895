//! Generic attempt counting and blocking for rate-sensitive operations.
//!
//! One policy, three instantiations: OTP sending (per IP), OTP
//! verification (per phone + IP), and password login (per phone + IP).
//! Counters live in a rolling window refreshed on every attempt; the
//! caller escalates to `block` once the count reaches `threshold`.

use std::sync::Arc;

use chrono::Duration;
use tracing::warn;

use crate::cache::KeyValueStore;
use crate::config::OtpConfig;
use crate::error::CacheError;

use super::keys::GuardKey;

#[derive(Clone)]
pub struct AbuseGuard {
    store: Arc<dyn KeyValueStore>,
    attempt_window: Duration,
    block_ttl: Duration,
    threshold: i64,
}

impl AbuseGuard {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &OtpConfig) -> Self {
        Self {
            store,
            attempt_window: Duration::seconds(config.attempt_window_seconds),
            block_ttl: Duration::seconds(config.block_seconds),
            threshold: config.max_attempts,
        }
    }

    /// Attempt count at which callers are expected to `block` the key.
    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    pub async fn is_blocked(&self, key: &GuardKey<'_>) -> Result<bool, CacheError> {
        Ok(self.store.get(&key.blocked()).await?.is_some())
    }

    /// Records one attempt and returns the new count for the rolling window.
    pub async fn record_attempt(&self, key: &GuardKey<'_>) -> Result<i64, CacheError> {
        self.store
            .incr(&key.to_string(), self.attempt_window)
            .await
    }

    pub async fn block(&self, key: &GuardKey<'_>) -> Result<(), CacheError> {
        warn!("Blocking {} for {} seconds", key, self.block_ttl.num_seconds());
        self.store.set(&key.blocked(), "1", self.block_ttl).await
    }
}
