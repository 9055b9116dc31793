use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// Root configuration for smsgate
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Public message API
    #[serde(default)]
    pub api: ApiConfig,

    /// Admin API configuration
    #[serde(default)]
    pub admin: AdminConfig,

    /// Key-value store holding opt-out flags and rate counters
    #[serde(default)]
    pub store: StoreConfig,

    /// Account and phone-number lookups
    #[serde(default)]
    pub accounts: AccountsConfig,

    /// Admission policy knobs
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Global settings
    #[serde(default)]
    pub settings: Settings,
}

/// Message API listener
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Bind address
    #[serde(default = "default_api_address")]
    pub address: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            address: default_api_address(),
        }
    }
}

fn default_api_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

/// Admin API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// HTTP API address
    #[serde(default = "default_admin_address")]
    pub address: SocketAddr,

    /// Enable the admin server
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How often backing stores are pinged for readiness
    #[serde(default = "default_health_check_interval", with = "humantime_serde")]
    pub health_check_interval: Duration,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            address: default_admin_address(),
            enabled: true,
            health_check_interval: default_health_check_interval(),
        }
    }
}

fn default_admin_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9090))
}

fn default_health_check_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_true() -> bool {
    true
}

/// Key-value backend type
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KvBackend {
    /// In-process, volatile
    #[default]
    Memory,
    /// Redis server
    Redis,
}

/// Key-value store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Backend type
    #[serde(default)]
    pub backend: KvBackend,

    /// Redis settings (required for the redis backend)
    #[serde(default)]
    pub redis: Option<RedisConfig>,

    /// How often the memory backend purges expired keys
    #[serde(default = "default_purge_interval", with = "humantime_serde")]
    pub purge_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: KvBackend::Memory,
            redis: None,
            purge_interval: default_purge_interval(),
        }
    }
}

impl StoreConfig {
    /// In-memory store with defaults.
    pub fn memory() -> Self {
        Self::default()
    }
}

fn default_purge_interval() -> Duration {
    Duration::from_secs(60)
}

/// Redis connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Connection URL (redis:// or rediss://)
    pub url: String,

    /// Per-command timeout
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Account backend type
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccountBackend {
    /// Static accounts from this file
    #[default]
    Memory,
    /// PostgreSQL `account` / `phone_number` tables
    Postgres,
}

/// Account store configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountsConfig {
    /// Backend type
    #[serde(default)]
    pub backend: AccountBackend,

    /// PostgreSQL settings (required for the postgres backend)
    #[serde(default)]
    pub postgres: Option<PostgresConfig>,

    /// Static accounts for the memory backend
    #[serde(default)]
    pub static_accounts: Vec<StaticAccount>,
}

/// PostgreSQL pool settings
#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    /// Connection URL
    pub url: String,

    /// Maximum pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Pool acquire timeout
    #[serde(default = "default_acquire_timeout", with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Account declared inline in the config file
#[derive(Debug, Clone, Deserialize)]
pub struct StaticAccount {
    /// Basic-auth username, also the tenant identity
    pub username: String,

    /// Basic-auth secret
    pub auth_id: String,

    /// Phone numbers owned by the account
    #[serde(default)]
    pub numbers: Vec<String>,
}

/// Admission policy
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// Lifetime of a STOP suppression flag
    #[serde(default = "default_opt_out_ttl", with = "humantime_serde")]
    pub opt_out_ttl: Duration,

    /// Marker that records an opt-out when found in an inbound body
    #[serde(default = "default_stop_marker")]
    pub stop_marker: String,

    /// Outbound throttling
    #[serde(default)]
    pub rate_limit: RateLimitPolicy,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            opt_out_ttl: default_opt_out_ttl(),
            stop_marker: default_stop_marker(),
            rate_limit: RateLimitPolicy::default(),
        }
    }
}

fn default_opt_out_ttl() -> Duration {
    Duration::from_secs(4 * 60 * 60)
}

fn default_stop_marker() -> String {
    "STOP".to_string()
}

/// Fixed-window outbound throttle
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitPolicy {
    /// Window length, anchored at the first message
    #[serde(default = "default_window", with = "humantime_serde")]
    pub window: Duration,

    /// Messages admitted per window (inclusive)
    #[serde(default = "default_max_messages")]
    pub max_messages: u32,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            window: default_window(),
            max_messages: default_max_messages(),
        }
    }
}

fn default_window() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_max_messages() -> u32 {
    50
}

/// Global settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Enable structured JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// OTLP endpoint for distributed tracing
    pub otlp_endpoint: Option<String>,

    /// Trace sample rate (0.0 - 1.0)
    #[serde(default = "default_sample_rate")]
    pub trace_sample_rate: f64,

    /// Shutdown configuration
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            json_logs: false,
            log_level: default_log_level(),
            otlp_endpoint: None,
            trace_sample_rate: default_sample_rate(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_sample_rate() -> f64 {
    1.0
}

/// Shutdown configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownConfig {
    /// How long in-flight requests get to finish
    #[serde(default = "default_drain_timeout", with = "humantime_serde")]
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: default_drain_timeout(),
        }
    }
}

fn default_drain_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Humantime serde support module
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
