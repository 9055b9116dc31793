//! Store factory for creating backends from configuration.

use std::sync::Arc;

use anyhow::Context;

use crate::config::{AccountBackend, AccountsConfig, KvBackend, StoreConfig};

use super::{
    MemoryAccountStore, MemoryKvStore, PgAccountStore, RedisKvStore, SharedAccountStore,
    SharedKvStore,
};

/// A key-value store as built from config.
///
/// The memory variant is kept concrete so the caller can run its purge loop.
pub enum KvHandle {
    Memory(Arc<MemoryKvStore>),
    Remote(SharedKvStore),
}

impl KvHandle {
    /// The store as a trait object.
    pub fn shared(&self) -> SharedKvStore {
        match self {
            Self::Memory(store) => store.clone(),
            Self::Remote(store) => store.clone(),
        }
    }

    /// The in-memory store, if that is the backend.
    pub fn memory(&self) -> Option<Arc<MemoryKvStore>> {
        match self {
            Self::Memory(store) => Some(store.clone()),
            Self::Remote(_) => None,
        }
    }
}

/// Create the key-value store for opt-out flags and rate counters.
pub async fn create_kv_store(config: &StoreConfig) -> anyhow::Result<KvHandle> {
    match config.backend {
        KvBackend::Memory => {
            tracing::info!("using in-memory key-value store (volatile)");
            Ok(KvHandle::Memory(Arc::new(MemoryKvStore::new())))
        }
        KvBackend::Redis => {
            let redis = config
                .redis
                .as_ref()
                .context("redis backend selected without redis settings")?;
            let store = RedisKvStore::connect(redis)
                .await
                .context("failed to connect to redis")?;
            tracing::info!("using redis key-value store");
            Ok(KvHandle::Remote(Arc::new(store)))
        }
    }
}

/// Create the account store.
pub async fn create_account_store(config: &AccountsConfig) -> anyhow::Result<SharedAccountStore> {
    match config.backend {
        AccountBackend::Memory => {
            let store = MemoryAccountStore::from_static(&config.static_accounts);
            tracing::info!(accounts = store.len(), "using static account store");
            Ok(Arc::new(store))
        }
        AccountBackend::Postgres => {
            let postgres = config
                .postgres
                .as_ref()
                .context("postgres backend selected without postgres settings")?;
            let store = PgAccountStore::connect(postgres)
                .await
                .context("failed to connect to postgres")?;
            tracing::info!("using postgres account store");
            Ok(Arc::new(store))
        }
    }
}
