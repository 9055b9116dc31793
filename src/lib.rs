//! smsgate: admission gateway for tenant SMS traffic.
//!
//! An authenticated tenant submits inbound and outbound messages over HTTP.
//! Each message is validated, checked against the tenant's phone numbers and
//! then either records a STOP opt-out (inbound) or passes the opt-out and
//! per-sender throttle checks (outbound).

pub mod admission;
pub mod api;
pub mod bootstrap;
pub mod config;
pub mod store;
pub mod telemetry;
