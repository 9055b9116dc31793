//! Request shape validation.
//!
//! Runs before any store is touched, so a malformed request can never write
//! an opt-out flag or spend rate-limit budget.

use serde_json::Value;
use thiserror::Error;

use super::request::{MessageRequest, RawMessageRequest};

/// Why a request failed shape validation. The message is client facing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is a required field")]
    Missing { field: &'static str },

    #[error("{field} must be a `string` type, but the final value was: `{found}`")]
    NotAString { field: &'static str, found: String },

    #[error("{field} must be at least {min} characters")]
    TooShort { field: &'static str, min: usize },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("request body must be a JSON object: {0}")]
    Malformed(String),
}

impl ValidationError {
    /// Field that failed, if the error is about a single field.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Missing { field }
            | Self::NotAString { field, .. }
            | Self::TooShort { field, .. }
            | Self::TooLong { field, .. } => Some(field),
            Self::Malformed(_) => None,
        }
    }
}

/// Length bounds for one field, in characters.
#[derive(Debug, Clone, Copy)]
struct FieldRule {
    name: &'static str,
    min: usize,
    max: usize,
}

const FROM: FieldRule = FieldRule { name: "from", min: 6, max: 16 };
const TO: FieldRule = FieldRule { name: "to", min: 6, max: 16 };
const TEXT: FieldRule = FieldRule { name: "text", min: 1, max: 120 };

impl FieldRule {
    fn check(&self, value: Option<&Value>) -> Result<String, ValidationError> {
        let value = match value {
            None | Some(Value::Null) => return Err(ValidationError::Missing { field: self.name }),
            Some(Value::String(s)) => s,
            Some(other) => {
                return Err(ValidationError::NotAString {
                    field: self.name,
                    found: other.to_string(),
                })
            }
        };

        let len = value.chars().count();
        if len == 0 && self.min > 0 {
            return Err(ValidationError::Missing { field: self.name });
        }
        if len < self.min {
            return Err(ValidationError::TooShort { field: self.name, min: self.min });
        }
        if len > self.max {
            return Err(ValidationError::TooLong { field: self.name, max: self.max });
        }
        Ok(value.clone())
    }
}

/// Check a raw request against the field rules.
///
/// Fields are checked in `from`, `to`, `text` order and the first violation
/// is returned.
pub fn validate(raw: &RawMessageRequest) -> Result<MessageRequest, ValidationError> {
    let sender = FROM.check(raw.from.as_ref())?;
    let recipient = TO.check(raw.to.as_ref())?;
    let body = TEXT.check(raw.text.as_ref())?;

    Ok(MessageRequest {
        sender,
        recipient,
        body,
    })
}
