//! HTTP Basic authentication.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{debug, warn};

use crate::telemetry::counters;

use super::error::ApiError;
use super::server::ApiState;

/// Credentials carried in an `Authorization: Basic` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub auth_id: String,
}

/// Extract credentials from the request headers. `None` for a missing header,
/// a non-Basic scheme, bad base64 or a payload without a colon.
pub fn parse_basic(headers: &HeaderMap) -> Option<Credentials> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, auth_id) = decoded.split_once(':')?;

    Some(Credentials {
        username: username.to_string(),
        auth_id: auth_id.to_string(),
    })
}

/// Resolve the caller to a tenant and attach it to the request.
///
/// Runs ahead of routing, so unauthenticated callers get 403 on every path.
pub async fn require_basic_auth(
    State(state): State<Arc<ApiState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    counters::auth_attempt();

    let Some(credentials) = parse_basic(req.headers()) else {
        counters::auth_failure("missing_credentials");
        state.admin.inc_auth_failures();
        return Err(ApiError::Unauthenticated);
    };

    let tenant = match state
        .accounts
        .authenticate(&credentials.username, &credentials.auth_id)
        .await
    {
        Ok(Some(tenant)) => tenant,
        Ok(None) => {
            debug!(username = %credentials.username, "unknown credentials");
            counters::auth_failure("invalid_credentials");
            state.admin.inc_auth_failures();
            return Err(ApiError::Unauthenticated);
        }
        Err(e) => {
            warn!(username = %credentials.username, error = %e, "authentication lookup failed");
            counters::auth_failure("store_error");
            counters::store_error(state.accounts.name(), "authenticate");
            return Err(ApiError::AuthUnavailable(e));
        }
    };

    req.extensions_mut().insert(tenant);
    Ok(next.run(req).await)
}
