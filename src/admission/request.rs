//! Message request types.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::validator::ValidationError;

/// Authenticated tenant identity (the account username).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tenant(String);

impl Tenant {
    /// Wrap an identity resolved by the authentication layer.
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which way a message travels relative to the tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Delivered to a number the tenant owns
    Inbound,
    /// Sent from a number the tenant owns
    Outbound,
}

impl Direction {
    /// Get direction name for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request as received, before any shape checks.
///
/// Fields hold arbitrary JSON so that a wrong type surfaces as a validation
/// error rather than a parse failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMessageRequest {
    #[serde(default)]
    pub from: Option<Value>,
    #[serde(default)]
    pub to: Option<Value>,
    #[serde(default)]
    pub text: Option<Value>,
}

impl RawMessageRequest {
    /// Build a raw request from plain strings.
    pub fn new(from: &str, to: &str, text: &str) -> Self {
        Self {
            from: Some(Value::from(from)),
            to: Some(Value::from(to)),
            text: Some(Value::from(text)),
        }
    }

    /// Parse a request body. An empty body reads as an empty object so the
    /// caller gets a field-level message rather than a parse error.
    pub fn from_json(body: &[u8]) -> Result<Self, ValidationError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let malformed = |e: serde_json::Error| ValidationError::Malformed(e.to_string());

        // Structs also deserialize from arrays; only objects are accepted here.
        match serde_json::from_slice::<Value>(body).map_err(malformed)? {
            value @ Value::Object(_) => serde_json::from_value(value).map_err(malformed),
            other => Err(ValidationError::Malformed(format!("found {}", json_type(&other)))),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A request that passed shape validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRequest {
    pub sender: String,
    pub recipient: String,
    pub body: String,
}
