//! PostgreSQL account store.
//!
//! Reads the `account` and `phone_number` tables:
//!
//! ```text
//! account(id, username, auth_id)
//! phone_number(id, number, account_id -> account.id)
//! ```

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::info;

use crate::admission::Tenant;
use crate::config::PostgresConfig;

use super::{AccountStore, StoreError};

const AUTHENTICATE: &str = "SELECT id FROM account WHERE username = $1 AND auth_id = $2";

const OWNS_NUMBER: &str = "SELECT EXISTS (\
    SELECT 1 FROM phone_number \
    WHERE number = $1 \
    AND account_id = (SELECT id FROM account WHERE username = $2)\
) AS owned";

/// Account store backed by a Postgres pool.
#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    /// Open a connection pool.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;

        info!(max_connections = config.max_connections, "connected to postgres");

        Ok(Self { pool })
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn authenticate(
        &self,
        username: &str,
        auth_id: &str,
    ) -> Result<Option<Tenant>, StoreError> {
        let rows = sqlx::query(AUTHENTICATE)
            .bind(username)
            .bind(auth_id)
            .fetch_all(&self.pool)
            .await?;

        // Exactly one account must match.
        Ok((rows.len() == 1).then(|| Tenant::new(username)))
    }

    async fn owns_number(&self, tenant: &Tenant, number: &str) -> Result<bool, StoreError> {
        let row = sqlx::query(OWNS_NUMBER)
            .bind(number)
            .bind(tenant.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get::<bool, _>("owned")?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
