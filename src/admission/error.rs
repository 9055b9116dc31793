//! Admission outcomes other than acceptance.

use thiserror::Error;

use crate::store::StoreError;

use super::validator::ValidationError;

/// Client-facing text for infrastructure failures.
pub const UNKNOWN_FAILURE: &str = "unknown failure";

/// Expected policy outcome that stops a message. Surfaced verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyRejection {
    /// Inbound recipient is not a number of the tenant.
    #[error("to parameter not found")]
    RecipientNotFound,

    /// Outbound sender is not a number of the tenant.
    #[error("from parameter not found")]
    SenderNotFound,

    /// Recipient sent STOP to this sender within the opt-out window.
    #[error("sms from {sender} to {recipient} blocked by STOP request")]
    BlockedByStop { sender: String, recipient: String },

    /// Sender exhausted its window budget.
    #[error("limit reached for from {sender}")]
    LimitReached { sender: String },
}

impl PolicyRejection {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::RecipientNotFound => "recipient_not_found",
            Self::SenderNotFound => "sender_not_found",
            Self::BlockedByStop { .. } => "blocked_by_stop",
            Self::LimitReached { .. } => "limit_reached",
        }
    }
}

/// Error category, for mapping to transport status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Policy,
    Infrastructure,
}

/// Why a message was not admitted.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// Malformed request.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Well-formed request refused by policy.
    #[error(transparent)]
    Policy(#[from] PolicyRejection),

    /// A backing store failed; the decision could not be made.
    #[error("infrastructure failure: {0}")]
    Infrastructure(#[from] StoreError),
}

impl AdmissionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Policy(_) => ErrorKind::Policy,
            Self::Infrastructure(_) => ErrorKind::Infrastructure,
        }
    }

    /// Text safe to return to the caller. Store details never leak.
    pub fn client_message(&self) -> String {
        match self {
            Self::Validation(e) => e.to_string(),
            Self::Policy(e) => e.to_string(),
            Self::Infrastructure(_) => UNKNOWN_FAILURE.to_string(),
        }
    }

    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Policy(p) => p.reason(),
            Self::Infrastructure(_) => "infrastructure",
        }
    }
}
