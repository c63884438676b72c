use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

const CORRELATION_ID_LEN: usize = 8;

/// Random v4 UUID in hyphenated form.
pub fn new_id() -> String {
    Uuid::new_v4().hyphenated().to_string()
}

/// Short hex id for tagging a single request in logs.
pub fn new_correlation_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(CORRELATION_ID_LEN);
    id
}

/// Identifies one Session (one view's connection) in log output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(new_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
