//! Public SMS API server.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{middleware, routing::post, Router};
use tokio::net::TcpListener;
use tracing::info;

use crate::admission::AdmissionPipeline;
use crate::store::SharedAccountStore;
use crate::telemetry::AdminState;

use super::auth::require_basic_auth;
use super::handlers::{inbound_sms, method_not_allowed, outbound_sms};

/// Shared handler state.
pub struct ApiState {
    pub pipeline: AdmissionPipeline,
    /// Credential lookups for the auth middleware
    pub accounts: SharedAccountStore,
    /// Decision counters for `/stats`
    pub admin: Arc<AdminState>,
}

/// Build the API router.
///
/// Authentication wraps every route and the fallback, so an unauthenticated
/// request gets 403 even for an unknown path.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/inbound/sms", post(inbound_sms).fallback(method_not_allowed))
        .route("/outbound/sms", post(outbound_sms).fallback(method_not_allowed))
        .fallback(method_not_allowed)
        .layer(middleware::from_fn_with_state(state.clone(), require_basic_auth))
        .with_state(state)
}

/// HTTP server for `/inbound/sms` and `/outbound/sms`.
pub struct ApiServer {
    address: SocketAddr,
    state: Arc<ApiState>,
}

impl ApiServer {
    pub fn new(address: SocketAddr, state: Arc<ApiState>) -> Self {
        Self { address, state }
    }

    /// Serve until `shutdown` resolves, then finish in-flight requests.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.address)
            .await
            .with_context(|| format!("failed to bind api address {}", self.address))?;

        info!(address = %self.address, "api server started");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("api server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SmsResponse;
    use crate::store::{MemoryAccountStore, MemoryKvStore};
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use tower::ServiceExt;

    fn app() -> Router {
        let accounts: SharedAccountStore = Arc::new(
            MemoryAccountStore::new().with_account("azr1", "20S0KPNOIM", ["4924195509198", "4924195509029"]),
        );
        let pipeline =
            AdmissionPipeline::builder(accounts.clone(), Arc::new(MemoryKvStore::new())).build();
        router(Arc::new(ApiState {
            pipeline,
            accounts,
            admin: Arc::new(AdminState::new()),
        }))
    }

    fn request(method: Method, uri: &str, auth: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(creds) = auth {
            builder = builder.header(header::AUTHORIZATION, format!("Basic {}", STANDARD.encode(creds)));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn call(app: Router, req: Request<Body>) -> (StatusCode, SmsResponse) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_inbound_ok() {
        let body = r#"{"from":"4924195509012","to":"4924195509198","text":"hello"}"#;
        let (status, resp) = call(
            app(),
            request(Method::POST, "/inbound/sms", Some("azr1:20S0KPNOIM"), body),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp, SmsResponse::ok("inbound sms ok"));
    }

    #[tokio::test]
    async fn test_missing_auth_is_forbidden_on_any_path() {
        for (method, uri) in [(Method::POST, "/outbound/sms"), (Method::GET, "/nope")] {
            let (status, resp) = call(app(), request(method, uri, None, "{}")).await;
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert_eq!(resp.error, "Basic Authentication required");
        }
    }

    #[tokio::test]
    async fn test_wrong_auth_id_is_forbidden() {
        let (status, _) = call(
            app(),
            request(Method::POST, "/inbound/sms", Some("azr1:wrong"), "{}"),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_unknown_route_and_method() {
        for (method, uri) in [(Method::GET, "/inbound/sms"), (Method::POST, "/other")] {
            let (status, resp) = call(app(), request(method, uri, Some("azr1:20S0KPNOIM"), "")).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(resp, SmsResponse::error("Method Not Allowed"));
        }
    }

    #[tokio::test]
    async fn test_empty_body_reports_first_field() {
        let (status, resp) = call(
            app(),
            request(Method::POST, "/outbound/sms", Some("azr1:20S0KPNOIM"), ""),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp.error, "from is a required field");
    }
}
