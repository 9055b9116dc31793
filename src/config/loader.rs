use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::types::{AccountBackend, Config, KvBackend};

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        debug!(path = %path.display(), "loading configuration");

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(yaml).context("failed to parse YAML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.store.backend == KvBackend::Redis && self.store.redis.is_none() {
            anyhow::bail!("store backend 'redis' requires a redis section with a url");
        }

        if self.accounts.backend == AccountBackend::Postgres && self.accounts.postgres.is_none() {
            anyhow::bail!("accounts backend 'postgres' requires a postgres section with a url");
        }

        let mut usernames = HashSet::new();
        for account in &self.accounts.static_accounts {
            if !usernames.insert(&account.username) {
                anyhow::bail!("duplicate account username: {}", account.username);
            }
        }

        let policy = &self.policy;
        if policy.opt_out_ttl.is_zero() {
            anyhow::bail!("policy.opt_out_ttl must be greater than zero");
        }
        if policy.stop_marker.is_empty() {
            anyhow::bail!("policy.stop_marker must not be empty");
        }
        if policy.rate_limit.window.is_zero() {
            anyhow::bail!("policy.rate_limit.window must be greater than zero");
        }
        if policy.rate_limit.max_messages == 0 {
            anyhow::bail!("policy.rate_limit.max_messages must be greater than zero");
        }

        if self.store.purge_interval.is_zero() {
            anyhow::bail!("store.purge_interval must be greater than zero");
        }
        if self.admin.health_check_interval.is_zero() {
            anyhow::bail!("admin.health_check_interval must be greater than zero");
        }

        let rate = self.settings.trace_sample_rate;
        if !(0.0..=1.0).contains(&rate) {
            anyhow::bail!("settings.trace_sample_rate must be within 0.0..=1.0, got {}", rate);
        }

        info!("configuration validated successfully");
        Ok(())
    }
}
