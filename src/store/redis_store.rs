//! Redis-backed key-value store.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info};

use crate::config::RedisConfig;

use super::{KvStore, StoreError};

const STORE_NAME: &str = "redis";

/// INCR and arm the expiry in one server-side step.
const INCR_WITH_EXPIRY: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
";

/// Redis key-value store with automatic reconnection.
#[derive(Clone)]
pub struct RedisKvStore {
    conn: ConnectionManager,
    command_timeout: Duration,
    incr_script: redis::Script,
}

impl RedisKvStore {
    /// Connect to Redis server.
    ///
    /// Supports both redis:// and rediss:// (TLS) URLs.
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = tokio::time::timeout(config.command_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout {
                store: STORE_NAME,
                elapsed: config.command_timeout,
            })??;

        info!(timeout = ?config.command_timeout, "connected to redis");

        Ok(Self {
            conn,
            command_timeout: config.command_timeout,
            incr_script: redis::Script::new(INCR_WITH_EXPIRY),
        })
    }

    /// Run a command with the configured timeout.
    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(result) => result.map_err(|e| {
                debug!(op, error = %e, "redis command failed");
                StoreError::from(e)
            }),
            Err(_) => Err(StoreError::Timeout {
                store: STORE_NAME,
                elapsed: self.command_timeout,
            }),
        }
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        self.bounded("set_ex", conn.set_ex::<_, _, ()>(key, value, ttl_secs(ttl)))
            .await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        self.bounded("get", conn.get::<_, Option<String>>(key)).await
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        self.bounded("incr", conn.incr::<_, _, i64>(key, 1i64)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        self.bounded("expire", conn.expire::<_, bool>(key, ttl_secs(ttl) as i64))
            .await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.conn.clone();
        let secs: i64 = self.bounded("ttl", conn.ttl::<_, i64>(key)).await?;
        // -2: no key, -1: no expiry
        Ok(u64::try_from(secs).ok().map(Duration::from_secs))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let pong: String = self
            .bounded("ping", redis::cmd("PING").query_async(&mut conn))
            .await?;
        debug!(reply = %pong, "redis ping");
        Ok(())
    }

    fn name(&self) -> &'static str {
        STORE_NAME
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let mut invocation = self.incr_script.key(key);
        invocation.arg(ttl_secs(ttl));
        self.bounded("incr_with_expiry", invocation.invoke_async(&mut conn))
            .await
    }
}
