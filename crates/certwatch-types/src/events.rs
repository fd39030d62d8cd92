use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::UserSnapshot;

/// Only payload version the mirror understands. Payloads without a version
/// field are treated as this version.
pub const EVENT_VERSION: u64 = 1;

/// Identity change broadcast by the auth service.
///
/// Wire shape: `{"v": 1, "action": "create"|"update", "user": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "user")]
pub enum ChangeEvent {
    #[serde(rename = "create")]
    Created(UserSnapshot),

    #[serde(rename = "update")]
    Updated(UserSnapshot),
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("event payload is not a JSON object")]
    NotAnObject,

    #[error("unsupported event version {0}")]
    UnsupportedVersion(String),

    #[error("invalid event: {0}")]
    Invalid(&'static str),
}

impl ChangeEvent {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Created(_) => "create",
            Self::Updated(_) => "update",
        }
    }

    pub fn user(&self) -> &UserSnapshot {
        match self {
            Self::Created(user) | Self::Updated(user) => user,
        }
    }

    pub fn into_user(self) -> UserSnapshot {
        match self {
            Self::Created(user) | Self::Updated(user) => user,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.insert("v".to_string(), Value::from(EVENT_VERSION));
        }
        serde_json::to_string(&value)
    }

    /// Decode and validate a raw payload. Anything that is not a well-formed,
    /// supported event is an error; callers discard it.
    pub fn decode(raw: &str) -> Result<Self, EventError> {
        let Value::Object(mut map) = serde_json::from_str::<Value>(raw)? else {
            return Err(EventError::NotAnObject);
        };

        if let Some(version) = map.remove("v") {
            if version.as_u64() != Some(EVENT_VERSION) {
                return Err(EventError::UnsupportedVersion(version.to_string()));
            }
        }

        let event: ChangeEvent = serde_json::from_value(Value::Object(map))?;
        event.validate()?;
        Ok(event)
    }

    fn validate(&self) -> Result<(), EventError> {
        let user = self.user();
        if user.id <= 0 {
            return Err(EventError::Invalid("id must be positive"));
        }
        if user.username.trim().is_empty() {
            return Err(EventError::Invalid("username is blank"));
        }
        if user.email.trim().is_empty() {
            return Err(EventError::Invalid("email is blank"));
        }
        Ok(())
    }
}
