//! STOP suppression flags.

use std::time::Duration;

use crate::store::{SharedKvStore, StoreError};

/// Default lifetime of a suppression flag.
pub const DEFAULT_OPT_OUT_TTL: Duration = Duration::from_secs(4 * 60 * 60);

/// Directional opt-out flags keyed by `(sender, recipient)`.
///
/// A STOP from A to B suppresses A→B only. Flags expire on their own; there
/// is no delete path.
#[derive(Clone)]
pub struct OptOutStore {
    kv: SharedKvStore,
    ttl: Duration,
}

impl OptOutStore {
    pub fn new(kv: SharedKvStore) -> Self {
        Self::with_ttl(kv, DEFAULT_OPT_OUT_TTL)
    }

    pub fn with_ttl(kv: SharedKvStore, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn key(sender: &str, recipient: &str) -> String {
        format!("stop:{}:{}", sender, recipient)
    }

    /// Record suppression for the ordered pair. Re-recording overwrites the
    /// flag and restarts its TTL.
    pub async fn set_opt_out(&self, sender: &str, recipient: &str) -> Result<(), StoreError> {
        self.kv
            .set_ex(&Self::key(sender, recipient), "1", self.ttl)
            .await
    }

    /// True iff an unexpired flag exists for exactly this ordered pair.
    pub async fn is_opted_out(&self, sender: &str, recipient: &str) -> Result<bool, StoreError> {
        Ok(self.kv.get(&Self::key(sender, recipient)).await?.is_some())
    }

    pub fn store_name(&self) -> &'static str {
        self.kv.name()
    }

    /// Remaining lifetime of the flag, if any.
    #[cfg(test)]
    pub(crate) async fn remaining(&self, sender: &str, recipient: &str) -> Result<Option<Duration>, StoreError> {
        self.kv.ttl(&Self::key(sender, recipient)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKvStore;
    use std::sync::Arc;

    fn store() -> OptOutStore {
        OptOutStore::new(Arc::new(MemoryKvStore::new()))
    }

    #[tokio::test]
    async fn test_flag_is_directional() {
        let opt_outs = store();
        opt_outs.set_opt_out("919800000001", "919800000002").await.unwrap();

        assert!(opt_outs.is_opted_out("919800000001", "919800000002").await.unwrap());
        assert!(!opt_outs.is_opted_out("919800000002", "919800000001").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flag_expires_after_four_hours() {
        let opt_outs = store();
        opt_outs.set_opt_out("919800000001", "919800000002").await.unwrap();

        tokio::time::advance(Duration::from_secs(14_399)).await;
        assert!(opt_outs.is_opted_out("919800000001", "919800000002").await.unwrap());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!opt_outs.is_opted_out("919800000001", "919800000002").await.unwrap());
    }

    /// The memory and Redis stores both use SETEX semantics: a repeated STOP
    /// overwrites the flag and restarts the four hour window.
    #[tokio::test(start_paused = true)]
    async fn test_repeated_opt_out_restarts_ttl() {
        let opt_outs = store();
        opt_outs.set_opt_out("919800000001", "919800000002").await.unwrap();

        tokio::time::advance(Duration::from_secs(3600)).await;
        opt_outs.set_opt_out("919800000001", "919800000002").await.unwrap();

        let remaining = opt_outs.remaining("919800000001", "919800000002").await.unwrap();
        assert_eq!(remaining, Some(DEFAULT_OPT_OUT_TTL));

        tokio::time::advance(Duration::from_secs(14_399)).await;
        assert!(opt_outs.is_opted_out("919800000001", "919800000002").await.unwrap());
    }
}
