//! Backing store errors.

use std::time::Duration;

use thiserror::Error;

/// Failure talking to a backing store.
///
/// Always an infrastructure fault: a missing key or an unknown phone number
/// is a normal `Ok` result, never a `StoreError`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store could not be reached or the connection dropped.
    #[error("{store} unavailable: {message}")]
    Unavailable { store: &'static str, message: String },

    /// Store did not answer in time.
    #[error("{store} timed out after {elapsed:?}")]
    Timeout { store: &'static str, elapsed: Duration },

    /// Store answered with an error.
    #[error("{store} query failed: {message}")]
    Query { store: &'static str, message: String },

    /// Stored value has an unexpected shape.
    #[error("{store} returned malformed value for '{key}'")]
    Corrupt { store: &'static str, key: String },
}

impl StoreError {
    /// Name of the store that failed.
    pub fn store(&self) -> &'static str {
        match self {
            Self::Unavailable { store, .. }
            | Self::Timeout { store, .. }
            | Self::Query { store, .. }
            | Self::Corrupt { store, .. } => store,
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                store: "redis",
                elapsed: Duration::ZERO,
            }
        } else if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            Self::Unavailable {
                store: "redis",
                message: err.to_string(),
            }
        } else {
            Self::Query {
                store: "redis",
                message: err.to_string(),
            }
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => Self::Timeout {
                store: "postgres",
                elapsed: Duration::ZERO,
            },
            sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::Tls(_) => {
                Self::Unavailable {
                    store: "postgres",
                    message: err.to_string(),
                }
            }
            other => Self::Query {
                store: "postgres",
                message: other.to_string(),
            },
        }
    }
}
