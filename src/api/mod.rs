//! Public HTTP API using Axum.
//!
//! Endpoints:
//! - `POST /inbound/sms`
//! - `POST /outbound/sms`
//!
//! Every request passes HTTP Basic authentication first; anything else is
//! answered with 405.

mod auth;
mod error;
mod handlers;
mod server;

pub use auth::{parse_basic, require_basic_auth, Credentials};
pub use error::{ApiError, SmsResponse};
pub use handlers::{inbound_sms, method_not_allowed, outbound_sms};
pub use server::{router, ApiServer, ApiState};
