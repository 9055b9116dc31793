//! Backing stores consumed by the admission pipeline.
//!
//! The pipeline owns no state itself. It talks to two collaborators:
//! - **Key-value store** ([`KvStore`]): opt-out flags and per-sender rate
//!   counters, both with expiry
//! - **Account store** ([`AccountStore`]): basic-auth credentials and
//!   phone-number ownership
//!
//! # Architecture
//!
//! ```text
//!            ┌──────────────────────┐
//!            │  Admission Pipeline  │
//!            └──────────┬───────────┘
//!              ┌────────┴─────────┐
//!              ▼                  ▼
//!        ┌───────────┐      ┌────────────┐
//!        │  KvStore  │      │AccountStore│
//!        └─────┬─────┘      └─────┬──────┘
//!         ┌────┴────┐        ┌────┴─────┐
//!         ▼         ▼        ▼          ▼
//!      Memory     Redis    Memory    Postgres
//!      (dev)     (prod)   (static)    (prod)
//! ```
//!
//! Handles are passed explicitly into the pipeline; there are no
//! process-wide connections.

mod accounts;
mod error;
mod factory;
mod kv;
mod memory;
mod postgres;
mod redis_store;

pub use accounts::{AccountStore, MemoryAccountStore, SharedAccountStore};
pub use error::StoreError;
pub use factory::{create_account_store, create_kv_store, KvHandle};
pub use kv::{KvStore, SharedKvStore};
pub use memory::MemoryKvStore;
pub use postgres::PgAccountStore;
pub use redis_store::RedisKvStore;
