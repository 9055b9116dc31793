//! SMS endpoint handlers.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    Extension, Json,
};

use crate::admission::{AdmissionError, Direction, Tenant};

use super::error::{ApiError, SmsResponse};
use super::server::ApiState;

async fn handle(
    state: &ApiState,
    direction: Direction,
    tenant: &Tenant,
    body: &[u8],
) -> Result<(StatusCode, Json<SmsResponse>), ApiError> {
    match state.pipeline.admit_json(direction, tenant, body).await {
        Ok(accepted) => {
            state.admin.inc_accepted(direction);
            Ok((StatusCode::OK, Json(SmsResponse::ok(accepted.message()))))
        }
        Err(e) => {
            match e {
                AdmissionError::Infrastructure(_) => state.admin.inc_failed(direction),
                _ => state.admin.inc_rejected(direction),
            }
            Err(e.into())
        }
    }
}

/// `POST /inbound/sms`
pub async fn inbound_sms(
    State(state): State<Arc<ApiState>>,
    Extension(tenant): Extension<Tenant>,
    body: Bytes,
) -> Result<(StatusCode, Json<SmsResponse>), ApiError> {
    handle(&state, Direction::Inbound, &tenant, &body).await
}

/// `POST /outbound/sms`
pub async fn outbound_sms(
    State(state): State<Arc<ApiState>>,
    Extension(tenant): Extension<Tenant>,
    body: Bytes,
) -> Result<(StatusCode, Json<SmsResponse>), ApiError> {
    handle(&state, Direction::Outbound, &tenant, &body).await
}

/// Fallback for unknown routes and methods.
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
