//! Admission pipeline.
//!
//! Inbound:  validate → recipient ownership → record STOP (if present) → accept
//! Outbound: validate → sender ownership → opt-out check → rate check → accept
//!
//! Each step is awaited in order and the first failure ends the request. No
//! step touches opt-out or rate state until the request is known to be
//! well-formed and owned by the tenant.

use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};

use crate::config::PolicyConfig;
use crate::store::{SharedAccountStore, SharedKvStore};
use crate::telemetry::counters;

use super::error::{AdmissionError, PolicyRejection};
use super::optout::{OptOutStore, DEFAULT_OPT_OUT_TTL};
use super::ownership::OwnershipResolver;
use super::ratelimit::{RateDecision, RateLimitConfig, RateLimiter};
use super::request::{Direction, MessageRequest, RawMessageRequest, Tenant};
use super::validator::validate;

/// Default marker that turns an inbound message into an opt-out.
pub const DEFAULT_STOP_MARKER: &str = "STOP";

/// A message that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub direction: Direction,
    pub request: MessageRequest,
    /// Inbound only: an opt-out flag was written for this message.
    pub opt_out_recorded: bool,
    /// Outbound only: position of this message in the sender's window.
    pub window_count: Option<i64>,
}

impl Accepted {
    /// Confirmation text returned to the caller.
    pub fn message(&self) -> &'static str {
        match self.direction {
            Direction::Inbound => "inbound sms ok",
            Direction::Outbound => "outbound sms ok",
        }
    }
}

/// Pipeline builder.
pub struct AdmissionPipelineBuilder {
    accounts: SharedAccountStore,
    kv: SharedKvStore,
    opt_out_ttl: std::time::Duration,
    rate_limit: RateLimitConfig,
    stop_marker: String,
}

impl AdmissionPipelineBuilder {
    /// Set the opt-out flag lifetime.
    pub fn with_opt_out_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.opt_out_ttl = ttl;
        self
    }

    /// Set the outbound throttle.
    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    /// Set the inbound opt-out marker.
    pub fn with_stop_marker(mut self, marker: impl Into<String>) -> Self {
        self.stop_marker = marker.into();
        self
    }

    /// Apply a policy section from the config file.
    pub fn with_policy(self, policy: &PolicyConfig) -> Self {
        self.with_opt_out_ttl(policy.opt_out_ttl)
            .with_rate_limit(RateLimitConfig::new(
                policy.rate_limit.max_messages,
                policy.rate_limit.window,
            ))
            .with_stop_marker(policy.stop_marker.clone())
    }

    pub fn build(self) -> AdmissionPipeline {
        AdmissionPipeline {
            ownership: OwnershipResolver::new(self.accounts),
            opt_outs: OptOutStore::with_ttl(self.kv.clone(), self.opt_out_ttl),
            limiter: RateLimiter::new(self.kv, self.rate_limit),
            stop_marker: self.stop_marker,
        }
    }
}

/// Decides whether inbound and outbound messages are admitted.
///
/// Cheap to clone; all state lives in the stores it was built with.
#[derive(Clone)]
pub struct AdmissionPipeline {
    ownership: OwnershipResolver,
    opt_outs: OptOutStore,
    limiter: RateLimiter,
    stop_marker: String,
}

impl AdmissionPipeline {
    /// Start a builder over explicit store handles.
    pub fn builder(accounts: SharedAccountStore, kv: SharedKvStore) -> AdmissionPipelineBuilder {
        AdmissionPipelineBuilder {
            accounts,
            kv,
            opt_out_ttl: DEFAULT_OPT_OUT_TTL,
            rate_limit: RateLimitConfig::default(),
            stop_marker: DEFAULT_STOP_MARKER.to_string(),
        }
    }

    /// Opt-out flags, for inspection.
    pub fn opt_outs(&self) -> &OptOutStore {
        &self.opt_outs
    }

    /// Run the flow for `direction`.
    pub async fn admit(
        &self,
        direction: Direction,
        tenant: &Tenant,
        raw: &RawMessageRequest,
    ) -> Result<Accepted, AdmissionError> {
        match direction {
            Direction::Inbound => self.admit_inbound(tenant, raw).await,
            Direction::Outbound => self.admit_outbound(tenant, raw).await,
        }
    }

    /// Parse a JSON body and run the flow for `direction`. A body that is
    /// not a JSON object is rejected and recorded like any other
    /// validation failure.
    pub async fn admit_json(
        &self,
        direction: Direction,
        tenant: &Tenant,
        body: &[u8],
    ) -> Result<Accepted, AdmissionError> {
        let started = Instant::now();
        match RawMessageRequest::from_json(body) {
            Ok(raw) => self.admit(direction, tenant, &raw).await,
            Err(e) => {
                let result: Result<Accepted, AdmissionError> = Err(e.into());
                record(direction, &result, started);
                result
            }
        }
    }

    /// Admit a message delivered to one of the tenant's numbers.
    #[instrument(skip_all, fields(tenant = %tenant, direction = "inbound"))]
    pub async fn admit_inbound(
        &self,
        tenant: &Tenant,
        raw: &RawMessageRequest,
    ) -> Result<Accepted, AdmissionError> {
        let started = Instant::now();
        let result = self.inbound_steps(tenant, raw).await;
        record(Direction::Inbound, &result, started);
        result
    }

    /// Admit a message sent from one of the tenant's numbers.
    #[instrument(skip_all, fields(tenant = %tenant, direction = "outbound"))]
    pub async fn admit_outbound(
        &self,
        tenant: &Tenant,
        raw: &RawMessageRequest,
    ) -> Result<Accepted, AdmissionError> {
        let started = Instant::now();
        let result = self.outbound_steps(tenant, raw).await;
        record(Direction::Outbound, &result, started);
        result
    }

    async fn inbound_steps(
        &self,
        tenant: &Tenant,
        raw: &RawMessageRequest,
    ) -> Result<Accepted, AdmissionError> {
        let request = validate(raw)?;

        if !self.ownership.is_owned(tenant, &request.recipient).await? {
            return Err(PolicyRejection::RecipientNotFound.into());
        }

        let mut opt_out_recorded = false;
        if request.body.contains(self.stop_marker.as_str()) {
            // The write is ordered before the reply, but its failure does
            // not change the inbound outcome.
            match self
                .opt_outs
                .set_opt_out(&request.sender, &request.recipient)
                .await
            {
                Ok(()) => {
                    opt_out_recorded = true;
                    counters::opt_out_recorded();
                    info!(
                        sender = %request.sender,
                        recipient = %request.recipient,
                        ttl_secs = self.opt_outs.ttl().as_secs(),
                        "opt-out recorded"
                    );
                }
                Err(e) => {
                    counters::store_error(self.opt_outs.store_name(), "set_opt_out");
                    warn!(
                        sender = %request.sender,
                        recipient = %request.recipient,
                        error = %e,
                        "failed to record opt-out"
                    );
                }
            }
        }

        Ok(Accepted {
            direction: Direction::Inbound,
            request,
            opt_out_recorded,
            window_count: None,
        })
    }

    async fn outbound_steps(
        &self,
        tenant: &Tenant,
        raw: &RawMessageRequest,
    ) -> Result<Accepted, AdmissionError> {
        let request = validate(raw)?;

        if !self.ownership.is_owned(tenant, &request.sender).await? {
            return Err(PolicyRejection::SenderNotFound.into());
        }

        let blocked = self
            .opt_outs
            .is_opted_out(&request.sender, &request.recipient)
            .await
            .inspect_err(|_| counters::store_error(self.opt_outs.store_name(), "is_opted_out"))?;
        if blocked {
            return Err(PolicyRejection::BlockedByStop {
                sender: request.sender,
                recipient: request.recipient,
            }
            .into());
        }

        let decision = self
            .limiter
            .try_admit(&request.sender)
            .await
            .inspect_err(|_| counters::store_error(self.limiter.store_name(), "try_admit"))?;
        let count = match decision {
            RateDecision::Admitted { count } => count,
            RateDecision::Rejected { .. } => {
                return Err(PolicyRejection::LimitReached {
                    sender: request.sender,
                }
                .into())
            }
        };

        Ok(Accepted {
            direction: Direction::Outbound,
            request,
            opt_out_recorded: false,
            window_count: Some(count),
        })
    }
}

fn record(direction: Direction, result: &Result<Accepted, AdmissionError>, started: Instant) {
    let elapsed = started.elapsed().as_secs_f64();
    counters::admission_duration(direction.as_str(), elapsed);

    match result {
        Ok(accepted) => {
            counters::admission(direction.as_str(), "accepted");
            debug!(
                sender = %accepted.request.sender,
                recipient = %accepted.request.recipient,
                "message admitted"
            );
        }
        Err(AdmissionError::Infrastructure(e)) => {
            counters::admission(direction.as_str(), "failed");
            counters::admission_rejected(direction.as_str(), "infrastructure");
            error!(error = %e, store = e.store(), "admission aborted by store failure");
        }
        Err(e) => {
            counters::admission(direction.as_str(), "rejected");
            counters::admission_rejected(direction.as_str(), e.reason());
            info!(reason = e.reason(), error = %e, "message rejected");
        }
    }
}
