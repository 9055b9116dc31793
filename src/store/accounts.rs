//! Account store: credentials and phone-number ownership.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::admission::Tenant;
use crate::config::StaticAccount;

use super::StoreError;

/// Read-only view of tenant accounts.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Resolve basic-auth credentials to a tenant. `None` when no account
    /// matches both fields.
    async fn authenticate(&self, username: &str, auth_id: &str)
        -> Result<Option<Tenant>, StoreError>;

    /// Does `number` belong to the tenant's account?
    async fn owns_number(&self, tenant: &Tenant, number: &str) -> Result<bool, StoreError>;

    /// Check the store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Backend name for logging and metrics.
    fn name(&self) -> &'static str;
}

/// Shared account store handle.
pub type SharedAccountStore = Arc<dyn AccountStore>;

/// In-memory account.
#[derive(Debug, Clone)]
struct Account {
    auth_id: String,
    numbers: HashSet<String>,
}

/// In-memory account store.
#[derive(Debug, Clone, Default)]
pub struct MemoryAccountStore {
    accounts: HashMap<String, Account>,
}

impl MemoryAccountStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from accounts declared in the config file.
    pub fn from_static(accounts: &[StaticAccount]) -> Self {
        let mut store = Self::new();
        for account in accounts {
            store.add(&account.username, &account.auth_id, account.numbers.iter().cloned());
        }
        store
    }

    /// Add or replace an account.
    pub fn add<I, S>(&mut self, username: &str, auth_id: &str, numbers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accounts.insert(
            username.to_string(),
            Account {
                auth_id: auth_id.to_string(),
                numbers: numbers.into_iter().map(Into::into).collect(),
            },
        );
    }

    /// Builder-style [`MemoryAccountStore::add`].
    pub fn with_account<I, S>(mut self, username: &str, auth_id: &str, numbers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add(username, auth_id, numbers);
        self
    }

    /// Number of accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// True if there are no accounts.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn authenticate(
        &self,
        username: &str,
        auth_id: &str,
    ) -> Result<Option<Tenant>, StoreError> {
        Ok(self
            .accounts
            .get(username)
            .filter(|a| a.auth_id == auth_id)
            .map(|_| Tenant::new(username)))
    }

    async fn owns_number(&self, tenant: &Tenant, number: &str) -> Result<bool, StoreError> {
        Ok(self
            .accounts
            .get(tenant.as_str())
            .is_some_and(|a| a.numbers.contains(number)))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
