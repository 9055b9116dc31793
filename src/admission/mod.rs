//! Message admission
//!
//! Decides whether an SMS submitted by an authenticated tenant is accepted.
//!
//! ```text
//!   RawMessageRequest ──► validator ──► ownership ──┬─► inbound:  STOP? → OptOutStore
//!                                                   └─► outbound: OptOutStore → RateLimiter
//! ```
//!
//! Opt-out flags and rate counters live in a [`crate::store::KvStore`];
//! ownership lives in a [`crate::store::AccountStore`].

mod error;
mod optout;
mod ownership;
mod pipeline;
mod ratelimit;
mod request;
mod validator;

pub use error::{AdmissionError, ErrorKind, PolicyRejection, UNKNOWN_FAILURE};
pub use optout::{OptOutStore, DEFAULT_OPT_OUT_TTL};
pub use ownership::OwnershipResolver;
pub use pipeline::{Accepted, AdmissionPipeline, AdmissionPipelineBuilder, DEFAULT_STOP_MARKER};
pub use ratelimit::{RateDecision, RateLimitConfig, RateLimiter};
pub use request::{Direction, MessageRequest, RawMessageRequest, Tenant};
pub use validator::{validate, ValidationError};
