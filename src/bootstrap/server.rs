use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, span, warn, Instrument, Level};

use crate::admission::AdmissionPipeline;
use crate::api::{ApiServer, ApiState};
use crate::config::Config;
use crate::store::{
    create_account_store, create_kv_store, MemoryKvStore, SharedAccountStore, SharedKvStore,
};
use crate::telemetry::{AdminState, Metrics, MetricsConfig};

use super::shutdown::Shutdown;

/// Main smsgate server
///
/// Components:
/// - API server: authenticated `/inbound/sms` and `/outbound/sms`
/// - Admin server: health, readiness, stats and Prometheus metrics
/// - Health prober: pings the backing stores for readiness
/// - Purger: evicts expired entries from the in-memory key-value store
/// - Shutdown: graceful drain with configurable timeout
pub struct Server {
    config: Arc<Config>,
    shutdown: Arc<Shutdown>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let shutdown = Shutdown::new(config.settings.shutdown.drain_timeout);

        Ok(Self {
            config: Arc::new(config),
            shutdown,
        })
    }

    /// Handle for triggering shutdown without a signal
    pub fn shutdown_handle(&self) -> Arc<Shutdown> {
        self.shutdown.clone()
    }

    /// Run the server until shutdown
    pub async fn run(self) -> Result<()> {
        let span = span!(Level::INFO, "smsgate", version = env!("CARGO_PKG_VERSION"));
        self.run_inner().instrument(span).await
    }

    async fn run_inner(self) -> Result<()> {
        let config = &self.config;

        info!(
            api_address = %config.api.address,
            kv_backend = ?config.store.backend,
            account_backend = ?config.accounts.backend,
            "starting smsgate server"
        );

        let kv = create_kv_store(&config.store).await?;
        let accounts = create_account_store(&config.accounts).await?;

        let pipeline = AdmissionPipeline::builder(accounts.clone(), kv.shared())
            .with_policy(&config.policy)
            .build();

        info!(
            opt_out_ttl_secs = config.policy.opt_out_ttl.as_secs(),
            rate_window_secs = config.policy.rate_limit.window.as_secs(),
            rate_max_messages = config.policy.rate_limit.max_messages,
            stop_marker = %config.policy.stop_marker,
            "admission policy configured"
        );

        // Metrics and admin endpoints
        let metrics = Metrics::new(&MetricsConfig {
            address: config.admin.address,
        })?;
        let admin = metrics.admin_state();

        let mut background: Vec<JoinHandle<()>> = Vec::new();

        if config.admin.enabled {
            let metrics = metrics.clone();
            background.push(tokio::spawn(async move {
                if let Err(e) = metrics.serve().await {
                    error!(error = %e, "admin server failed");
                }
            }));
        }

        background.push(spawn_health_probe(
            admin.clone(),
            kv.shared(),
            accounts.clone(),
            config.admin.health_check_interval,
        ));

        if let Some(memory) = kv.memory() {
            background.push(spawn_purger(memory, config.store.purge_interval));
        }

        // API server
        let state = Arc::new(ApiState {
            pipeline,
            accounts,
            admin,
        });
        let api = ApiServer::new(config.api.address, state);
        let mut api_handle = tokio::spawn(api.serve(self.shutdown.signal()));

        info!(
            admin_address = %config.admin.address,
            admin_enabled = config.admin.enabled,
            drain_timeout_secs = config.settings.shutdown.drain_timeout.as_secs(),
            "smsgate server started"
        );

        // Wait for a signal, a programmatic drain, or the API server exiting
        let api_result = tokio::select! {
            _ = wait_for_signal() => {
                info!("shutdown signal received, starting graceful shutdown");
                None
            }
            _ = self.shutdown.signal() => {
                info!("shutdown requested, starting graceful shutdown");
                None
            }
            result = &mut api_handle => Some(result),
        };

        self.shutdown.start_drain();

        let api_result = match api_result {
            Some(result) => result,
            None => match tokio::time::timeout(self.shutdown.drain_timeout(), &mut api_handle).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("drain timeout reached, forcing shutdown");
                    api_handle.abort();
                    Ok(Ok(()))
                }
            },
        };

        self.shutdown.terminate();

        for handle in background {
            handle.abort();
        }

        crate::telemetry::shutdown_tracing();

        info!("smsgate server stopped");

        api_result.context("api server task panicked")?
    }
}

/// Keep readiness in line with the backing stores.
fn spawn_health_probe(
    admin: Arc<AdminState>,
    kv: SharedKvStore,
    accounts: SharedAccountStore,
    interval: Duration,
) -> JoinHandle<()> {
    let kv_name = format!("kv:{}", kv.name());
    let accounts_name = format!("accounts:{}", accounts.name());
    admin.register_dependency(&kv_name);
    admin.register_dependency(&accounts_name);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;

            let kv_health = kv.ping().await.err().map(|e| e.to_string());
            let accounts_health = accounts.ping().await.err().map(|e| e.to_string());

            if let Some(ref e) = kv_health {
                warn!(store = %kv_name, error = %e, "dependency unhealthy");
            }
            if let Some(ref e) = accounts_health {
                warn!(store = %accounts_name, error = %e, "dependency unhealthy");
            }

            admin.set_dependency_health(&kv_name, kv_health);
            admin.set_dependency_health(&accounts_name, accounts_health);
        }
    })
}

/// Periodically evict expired entries from the in-memory store.
fn spawn_purger(store: Arc<MemoryKvStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                debug!(purged, remaining = store.len(), "purged expired entries");
            }
        }
    })
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("received SIGTERM");
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("api_address", &self.config.api.address)
            .field("state", &self.shutdown.state())
            .finish()
    }
}
