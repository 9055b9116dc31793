use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use opentelemetry::metrics::MeterProvider;
use opentelemetry_prometheus::exporter;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{info, warn};

use crate::admission::Direction;

/// Metrics configuration
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// HTTP endpoint address
    pub address: SocketAddr,
}

/// Dependency status for readiness checks
#[derive(Debug, Clone, Serialize)]
pub struct DependencyStatus {
    pub name: String,
    pub healthy: bool,
    pub message: Option<String>,
}

/// Admission counts for one direction.
#[derive(Debug, Default)]
struct DirectionCounters {
    accepted: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
}

impl DirectionCounters {
    fn snapshot(&self) -> DirectionStats {
        DirectionStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Admin state for health/stats endpoints
#[derive(Debug)]
pub struct AdminState {
    start_time: Instant,
    healthy: AtomicBool,
    ready: AtomicBool,
    inbound: DirectionCounters,
    outbound: DirectionCounters,
    auth_failures: AtomicU64,
    /// Backing stores that must be reachable for readiness, by name.
    /// `None` means healthy, `Some(reason)` means not.
    dependencies: RwLock<BTreeMap<String, Option<String>>>,
}

impl AdminState {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            healthy: AtomicBool::new(true),
            ready: AtomicBool::new(true), // Ready by default if no dependencies registered
            inbound: DirectionCounters::default(),
            outbound: DirectionCounters::default(),
            auth_failures: AtomicU64::new(0),
            dependencies: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    fn direction(&self, direction: Direction) -> &DirectionCounters {
        match direction {
            Direction::Inbound => &self.inbound,
            Direction::Outbound => &self.outbound,
        }
    }

    pub fn inc_accepted(&self, direction: Direction) {
        self.direction(direction).accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rejected(&self, direction: Direction) {
        self.direction(direction).rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self, direction: Direction) {
        self.direction(direction).failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_auth_failures(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Register a required dependency. It counts as unhealthy until the
    /// first successful probe.
    pub fn register_dependency(&self, name: &str) {
        {
            let mut deps = self.dependencies.write().unwrap_or_else(|e| e.into_inner());
            deps.entry(name.to_string())
                .or_insert_with(|| Some("not yet probed".to_string()));
        }
        self.update_readiness();
    }

    /// Record the outcome of a dependency probe.
    pub fn set_dependency_health(&self, name: &str, error: Option<String>) {
        {
            let mut deps = self.dependencies.write().unwrap_or_else(|e| e.into_inner());
            deps.insert(name.to_string(), error);
        }
        self.update_readiness();
    }

    fn update_readiness(&self) {
        let deps = self.dependencies.read().unwrap_or_else(|e| e.into_inner());
        let all_healthy = deps.values().all(Option::is_none);
        self.ready.store(all_healthy, Ordering::Relaxed);
    }

    /// Get dependency status for readiness response
    pub fn dependency_status(&self) -> Vec<DependencyStatus> {
        let deps = self.dependencies.read().unwrap_or_else(|e| e.into_inner());
        deps.iter()
            .map(|(name, error)| DependencyStatus {
                name: name.clone(),
                healthy: error.is_none(),
                message: error.clone(),
            })
            .collect()
    }

    fn stats(&self) -> StatsResponse {
        StatsResponse {
            uptime_seconds: self.uptime_secs(),
            inbound: self.inbound.snapshot(),
            outbound: self.outbound.snapshot(),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for AdminState {
    fn default() -> Self {
        Self::new()
    }
}

/// OTEL Metrics with Prometheus exporter
pub struct Metrics {
    registry: Registry,
    meter_provider: SdkMeterProvider,
    address: SocketAddr,
    admin_state: Arc<AdminState>,
}

impl Metrics {
    /// Create metrics with OTEL → Prometheus pipeline
    pub fn new(config: &MetricsConfig) -> Result<Arc<Self>> {
        let registry = Registry::new();

        let exporter = exporter()
            .with_registry(registry.clone())
            .build()
            .context("failed to build prometheus exporter")?;

        let meter_provider = SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        opentelemetry::global::set_meter_provider(meter_provider.clone());
        counters::init(&meter_provider.meter("smsgate"));

        info!(
            address = %config.address,
            "OTEL metrics configured with Prometheus exporter"
        );

        Ok(Arc::new(Self {
            registry,
            meter_provider,
            address: config.address,
            admin_state: Arc::new(AdminState::new()),
        }))
    }

    /// Get admin state for updating metrics from other components
    pub fn admin_state(&self) -> Arc<AdminState> {
        self.admin_state.clone()
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }

    /// Admin routes: health, readiness, stats, prometheus
    pub fn router(self: &Arc<Self>) -> Router {
        let metrics = self.clone();

        Router::new()
            .route("/metrics", get(move || {
                let m = metrics.clone();
                async move {
                    match m.render() {
                        Ok(body) => (StatusCode::OK, body),
                        Err(e) => {
                            warn!(error = %e, "failed to render metrics");
                            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                        }
                    }
                }
            }))
            // Kubernetes-style health endpoints
            .route("/healthz", get(healthz_handler))
            .route("/livez", get(livez_handler))
            .route("/readyz", get(readyz_handler))
            .route("/stats", get(stats_handler))
            .with_state(self.admin_state.clone())
    }

    /// Start the metrics HTTP server
    pub async fn serve(self: Arc<Self>) -> Result<()> {
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(self.address)
            .await
            .with_context(|| format!("failed to bind admin address {}", self.address))?;

        info!(address = %self.address, "admin server started");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

// ============================================================================
// Admin API Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    uptime_seconds: u64,
    inbound: DirectionStats,
    outbound: DirectionStats,
    auth_failures: u64,
}

#[derive(Debug, Serialize)]
struct DirectionStats {
    accepted: u64,
    rejected: u64,
    failed: u64,
}

/// Readiness response with dependency details
#[derive(Debug, Serialize)]
struct ReadinessResponse {
    ready: bool,
    dependencies: Vec<DependencyStatus>,
}

// ============================================================================
// Admin API Handlers
// ============================================================================

async fn healthz_handler(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    let healthy = state.is_healthy();
    let response = HealthResponse {
        status: if healthy { "healthy".to_string() } else { "unhealthy".to_string() },
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    if healthy {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

async fn livez_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz_handler(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    let response = ReadinessResponse {
        ready: state.is_ready(),
        dependencies: state.dependency_status(),
    };

    if response.ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

async fn stats_handler(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    Json(state.stats())
}

impl Drop for Metrics {
    fn drop(&mut self) {
        if let Err(e) = self.meter_provider.shutdown() {
            warn!(error = %e, "failed to shutdown meter provider");
        }
    }
}

/// Gateway metrics with `smsgate_` prefix
pub mod counters {
    use opentelemetry::metrics::{Counter, Histogram};
    use opentelemetry::KeyValue;
    use std::sync::OnceLock;

    // ============================================================================
    // ADMISSION METRICS
    // ============================================================================

    static ADMISSIONS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static ADMISSIONS_REJECTED_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static ADMISSION_DURATION: OnceLock<Histogram<f64>> = OnceLock::new();
    static OPT_OUTS_RECORDED_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();

    // ============================================================================
    // RATE LIMIT METRICS
    // ============================================================================

    static RATE_LIMIT_ALLOWED_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static RATE_LIMIT_DENIED_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();

    // ============================================================================
    // STORE / AUTH METRICS
    // ============================================================================

    static STORE_ERRORS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static AUTH_ATTEMPTS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static AUTH_FAILURES_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();

    /// Initialize all metrics. Later calls are no-ops.
    pub fn init(meter: &opentelemetry::metrics::Meter) {
        let _ = ADMISSIONS_TOTAL.set(
            meter.u64_counter("smsgate_admissions_total")
                .with_description("Admission decisions by direction and result")
                .build(),
        );
        let _ = ADMISSIONS_REJECTED_TOTAL.set(
            meter.u64_counter("smsgate_admissions_rejected_total")
                .with_description("Refused messages by direction and reason")
                .build(),
        );
        let _ = ADMISSION_DURATION.set(
            meter.f64_histogram("smsgate_admission_duration_seconds")
                .with_description("Time to reach an admission decision")
                .build(),
        );
        let _ = OPT_OUTS_RECORDED_TOTAL.set(
            meter.u64_counter("smsgate_opt_outs_recorded_total")
                .with_description("STOP requests recorded from inbound traffic")
                .build(),
        );
        let _ = RATE_LIMIT_ALLOWED_TOTAL.set(
            meter.u64_counter("smsgate_rate_limit_allowed_total")
                .with_description("Outbound messages within the sender window")
                .build(),
        );
        let _ = RATE_LIMIT_DENIED_TOTAL.set(
            meter.u64_counter("smsgate_rate_limit_denied_total")
                .with_description("Outbound messages over the sender window")
                .build(),
        );
        let _ = STORE_ERRORS_TOTAL.set(
            meter.u64_counter("smsgate_store_errors_total")
                .with_description("Backing store failures by store and operation")
                .build(),
        );
        let _ = AUTH_ATTEMPTS_TOTAL.set(
            meter.u64_counter("smsgate_auth_attempts_total")
                .with_description("Basic authentication attempts")
                .build(),
        );
        let _ = AUTH_FAILURES_TOTAL.set(
            meter.u64_counter("smsgate_auth_failures_total")
                .with_description("Basic authentication failures by reason")
                .build(),
        );
    }

    // ============================================================================
    // ADMISSION RECORDING FUNCTIONS
    // ============================================================================

    pub fn admission(direction: &str, result: &str) {
        if let Some(c) = ADMISSIONS_TOTAL.get() {
            c.add(1, &[kv("direction", direction), kv("result", result)]);
        }
    }

    pub fn admission_rejected(direction: &str, reason: &str) {
        if let Some(c) = ADMISSIONS_REJECTED_TOTAL.get() {
            c.add(1, &[kv("direction", direction), kv("reason", reason)]);
        }
    }

    pub fn admission_duration(direction: &str, secs: f64) {
        if let Some(h) = ADMISSION_DURATION.get() {
            h.record(secs, &[kv("direction", direction)]);
        }
    }

    pub fn opt_out_recorded() {
        if let Some(c) = OPT_OUTS_RECORDED_TOTAL.get() {
            c.add(1, &[]);
        }
    }

    pub fn rate_limit_allowed() {
        if let Some(c) = RATE_LIMIT_ALLOWED_TOTAL.get() {
            c.add(1, &[]);
        }
    }

    pub fn rate_limit_denied() {
        if let Some(c) = RATE_LIMIT_DENIED_TOTAL.get() {
            c.add(1, &[]);
        }
    }

    // ============================================================================
    // STORE / AUTH RECORDING FUNCTIONS
    // ============================================================================

    pub fn store_error(store: &str, operation: &str) {
        if let Some(c) = STORE_ERRORS_TOTAL.get() {
            c.add(1, &[kv("store", store), kv("operation", operation)]);
        }
    }

    pub fn auth_attempt() {
        if let Some(c) = AUTH_ATTEMPTS_TOTAL.get() {
            c.add(1, &[]);
        }
    }

    pub fn auth_failure(reason: &str) {
        if let Some(c) = AUTH_FAILURES_TOTAL.get() {
            c.add(1, &[kv("reason", reason)]);
        }
    }

    // Helper function to create KeyValue
    #[inline]
    fn kv(key: &'static str, value: &str) -> KeyValue {
        KeyValue::new(key, value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_without_dependencies() {
        let state = AdminState::new();
        assert!(state.is_ready());
        assert!(state.dependency_status().is_empty());
    }

    #[test]
    fn test_readiness_follows_dependencies() {
        let state = AdminState::new();
        state.register_dependency("redis");
        state.register_dependency("postgres");
        assert!(!state.is_ready());

        state.set_dependency_health("redis", None);
        assert!(!state.is_ready());

        state.set_dependency_health("postgres", None);
        assert!(state.is_ready());

        state.set_dependency_health("redis", Some("timed out".into()));
        assert!(!state.is_ready());

        let status = state.dependency_status();
        assert_eq!(status[0].name, "postgres");
        assert!(status[0].healthy);
        assert_eq!(status[1].message.as_deref(), Some("timed out"));
    }

    #[test]
    fn test_registering_twice_keeps_health() {
        let state = AdminState::new();
        state.register_dependency("redis");
        state.set_dependency_health("redis", None);
        state.register_dependency("redis");
        assert!(state.is_ready());
    }

    #[test]
    fn test_direction_counters() {
        let state = AdminState::new();
        state.inc_accepted(Direction::Inbound);
        state.inc_accepted(Direction::Outbound);
        state.inc_rejected(Direction::Outbound);
        state.inc_failed(Direction::Outbound);

        let stats = state.stats();
        assert_eq!(stats.inbound.accepted, 1);
        assert_eq!(stats.inbound.rejected, 0);
        assert_eq!(stats.outbound.accepted, 1);
        assert_eq!(stats.outbound.rejected, 1);
        assert_eq!(stats.outbound.failed, 1);
    }
}
