//! Key-value store with per-key expiry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::StoreError;

/// Key-value store with expiry, holding opt-out flags and rate counters.
///
/// Every operation is a single round-trip and atomic per key. The admission
/// pipeline relies on that instead of taking locks of its own.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Set `key` to `value`, expiring after `ttl`. Overwrites any previous
    /// value and expiry.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Get the value of `key`, `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Atomically increment `key` and return the new value. An absent key
    /// is created at 1 with no expiry.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Arm an expiry on an existing key. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Remaining lifetime of `key`; `None` if absent or without expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Check the store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Backend name for logging and metrics.
    fn name(&self) -> &'static str;

    /// Increment `key`, arming `ttl` only when this call created it.
    ///
    /// The default issues `incr` then `expire`; backends that can do both
    /// in one server-side step override it.
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        let count = self.incr(key).await?;
        if count == 1 {
            self.expire(key, ttl).await?;
        }
        Ok(count)
    }
}

/// Shared key-value store handle.
pub type SharedKvStore = Arc<dyn KvStore>;
