//! Inbound messages: arbitrary JSON interpreted by key presence.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body the server sends to acknowledge a request before the real answer.
const ACK_BODY: &str = "RECEIVED";

/// One parsed inbound frame. No schema is enforced; callers inspect keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InboundMessage(Value);

impl InboundMessage {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text).map(Self)
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.0.as_object().is_some_and(|o| o.contains_key(key))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// RFC 6901 lookup, e.g. `/body/industry_report`.
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        self.0.pointer(pointer)
    }

    /// Top-level keys, empty for non-object messages.
    pub fn keys(&self) -> Vec<&str> {
        self.0
            .as_object()
            .map(|o| o.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Top-level `statusCode`, when present.
    pub fn status_code(&self) -> Option<u64> {
        self.get("statusCode").and_then(Value::as_u64)
    }

    /// `{"statusCode": 200, "body": "RECEIVED"}` acknowledgement.
    pub fn is_ack(&self) -> bool {
        self.status_code() == Some(200)
            && self.get("body").and_then(Value::as_str) == Some(ACK_BODY)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for InboundMessage {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
