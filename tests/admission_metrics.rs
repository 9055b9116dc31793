//! Admission metrics exported through the Prometheus registry
//!
//! The counters bind to the first meter created in the process, so this file
//! holds a single test that owns the only `Metrics` instance.
//!
//! Run with: cargo test --test admission_metrics

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use smsgate::admission::{AdmissionPipeline, Direction, ErrorKind, Tenant};
use smsgate::store::{KvStore, MemoryAccountStore, StoreError};
use smsgate::telemetry::{Metrics, MetricsConfig};

const OWNED: &str = "4924195509198";
const OTHER: &str = "4924195509029";

/// Key-value backend that refuses every call.
struct UnreachableKv;

impl UnreachableKv {
    fn fail<T>() -> Result<T, StoreError> {
        Err(StoreError::Unavailable {
            store: "unreachable",
            message: "connection refused".into(),
        })
    }
}

#[async_trait]
impl KvStore for UnreachableKv {
    async fn set_ex(&self, _: &str, _: &str, _: Duration) -> Result<(), StoreError> {
        Self::fail()
    }
    async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
        Self::fail()
    }
    async fn incr(&self, _: &str) -> Result<i64, StoreError> {
        Self::fail()
    }
    async fn expire(&self, _: &str, _: Duration) -> Result<bool, StoreError> {
        Self::fail()
    }
    async fn ttl(&self, _: &str) -> Result<Option<Duration>, StoreError> {
        Self::fail()
    }
    async fn ping(&self) -> Result<(), StoreError> {
        Self::fail()
    }
    fn name(&self) -> &'static str {
        "unreachable"
    }
}

/// Find the sample line for `metric` carrying every label in `labels`.
fn sample<'a>(rendered: &'a str, metric: &str, labels: &[&str]) -> Option<&'a str> {
    rendered.lines().find(|line| {
        line.starts_with(&format!("{}{{", metric)) && labels.iter().all(|l| line.contains(l))
    })
}

fn sample_value(line: &str) -> f64 {
    line.rsplit(' ')
        .next()
        .and_then(|v| v.parse().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_admission_metrics() {
    let metrics = Metrics::new(&MetricsConfig {
        address: "127.0.0.1:0".parse().unwrap(),
    })
    .unwrap();

    let accounts = Arc::new(MemoryAccountStore::new().with_account("azr1", "pw", [OWNED]));
    let pipeline = AdmissionPipeline::builder(accounts, Arc::new(UnreachableKv)).build();
    let tenant = Tenant::new("azr1");

    // Bodies that never parse are still counted as rejected admissions.
    for body in [&b"[1,2,3]"[..], b"from=1&to=2"] {
        let err = pipeline
            .admit_json(Direction::Inbound, &tenant, body)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    // Store failures are labelled with the key-value backend's name.
    let body = format!(r#"{{"from":"{}","to":"{}","text":"hi"}}"#, OWNED, OTHER);
    let err = pipeline
        .admit_json(Direction::Outbound, &tenant, body.as_bytes())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Infrastructure);

    let body = format!(r#"{{"from":"{}","to":"{}","text":"STOP"}}"#, OTHER, OWNED);
    let accepted = pipeline
        .admit_json(Direction::Inbound, &tenant, body.as_bytes())
        .await
        .unwrap();
    assert!(!accepted.opt_out_recorded);

    let rendered = metrics.render().unwrap();

    let rejected = sample(
        &rendered,
        "smsgate_admissions_rejected_total",
        &[r#"direction="inbound""#, r#"reason="validation""#],
    )
    .expect("malformed bodies missing from rejected admissions");
    assert_eq!(sample_value(rejected), 2.0);

    let total = sample(
        &rendered,
        "smsgate_admissions_total",
        &[r#"direction="inbound""#, r#"result="rejected""#],
    )
    .expect("malformed bodies missing from admissions");
    assert_eq!(sample_value(total), 2.0);

    for operation in ["is_opted_out", "set_opt_out"] {
        let operation_label = format!(r#"operation="{}""#, operation);
        let line = sample(
            &rendered,
            "smsgate_store_errors_total",
            &[r#"store="unreachable""#, &operation_label],
        )
        .unwrap_or_else(|| panic!("no store error sample for {}", operation));
        assert_eq!(sample_value(line), 1.0);
    }
    assert!(!rendered.contains(r#"store="kv""#));
}
