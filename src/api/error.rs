//! HTTP mapping of admission outcomes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::admission::{AdmissionError, ErrorKind, UNKNOWN_FAILURE};

/// Body of every API response: exactly one of the two fields is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsResponse {
    pub message: String,
    pub error: String,
}

impl SmsResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error: String::new(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            message: String::new(),
            error: error.into(),
        }
    }
}

/// Errors surfaced by the API layer.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, undecodable or unknown credentials.
    #[error("Basic Authentication required")]
    Unauthenticated,

    /// Unknown route or method.
    #[error("Method Not Allowed")]
    MethodNotAllowed,

    /// The account store failed while checking credentials.
    #[error("authentication lookup failed: {0}")]
    AuthUnavailable(#[source] crate::store::StoreError),

    #[error(transparent)]
    Admission(#[from] AdmissionError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::AuthUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Admission(e) => match e.kind() {
                ErrorKind::Validation | ErrorKind::Policy => StatusCode::BAD_REQUEST,
                ErrorKind::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Text placed in the `error` field.
    pub fn client_message(&self) -> String {
        match self {
            Self::AuthUnavailable(_) => UNKNOWN_FAILURE.to_string(),
            Self::Admission(e) => e.client_message(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(SmsResponse::error(self.client_message()))).into_response()
    }
}
