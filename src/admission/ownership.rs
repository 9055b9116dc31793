//! Phone-number ownership checks.

use tracing::{debug, warn};

use crate::store::{SharedAccountStore, StoreError};
use crate::telemetry::counters;

use super::request::Tenant;

/// Answers "does this number belong to the tenant's account".
///
/// A negative answer is `Ok(false)`. Only a failed lookup is an error, so
/// callers can never mistake an outage for an unknown number.
#[derive(Clone)]
pub struct OwnershipResolver {
    accounts: SharedAccountStore,
}

impl OwnershipResolver {
    pub fn new(accounts: SharedAccountStore) -> Self {
        Self { accounts }
    }

    /// Check whether `number` is registered to `tenant`.
    pub async fn is_owned(&self, tenant: &Tenant, number: &str) -> Result<bool, StoreError> {
        match self.accounts.owns_number(tenant, number).await {
            Ok(owned) => {
                debug!(tenant = %tenant, number = %number, owned, "ownership resolved");
                Ok(owned)
            }
            Err(e) => {
                warn!(tenant = %tenant, number = %number, error = %e, "ownership lookup failed");
                counters::store_error(self.accounts.name(), "owns_number");
                Err(e)
            }
        }
    }
}
