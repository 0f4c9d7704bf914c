//! Wire convention for the payload of a `response`-kind [`crate::Envelope`].
//!
//! A slave's task handler returns either a value or an error (mirroring
//! [`crate::Response`]'s "exactly one of `value`, `error`" invariant), but
//! `Envelope::payload` is a single opaque `serde_json::Value` — this module
//! is the small, explicit tagged shape both sides agree on so the master
//! never has to guess whether a response payload is a success value or a
//! task failure.

use serde::{Deserialize, Serialize};

use crate::error::DistioError;
use crate::response::ResponseError;

/// A task handler's outcome, as carried in a response envelope's payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskResult {
    Ok { value: serde_json::Value },
    Err { kind: String, message: String },
}

impl TaskResult {
    pub fn ok(value: serde_json::Value) -> Self {
        Self::Ok { value }
    }

    pub fn err(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Err {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Encode as the `serde_json::Value` a response envelope should carry.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Parse a response envelope's payload back into a `TaskResult`.
    ///
    /// Payloads that predate this convention (a bare value with no `status`
    /// tag) are treated as an implicit `Ok`, so the codec's round-trip
    /// guarantee still holds for hand-built test envelopes.
    pub fn from_payload(payload: &serde_json::Value) -> Self {
        serde_json::from_value(payload.clone()).unwrap_or_else(|_| Self::ok(payload.clone()))
    }

    pub fn into_result(self) -> Result<serde_json::Value, ResponseError> {
        match self {
            Self::Ok { value } => Ok(value),
            Self::Err { kind, message } => Err(ResponseError { kind, message }),
        }
    }
}

impl From<Result<serde_json::Value, DistioError>> for TaskResult {
    fn from(result: Result<serde_json::Value, DistioError>) -> Self {
        match result {
            Ok(value) => Self::ok(value),
            Err(e) => {
                let resp_err = ResponseError::from(&e);
                Self::err(resp_err.kind, resp_err.message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_round_trips_through_payload() {
        let result = TaskResult::ok(serde_json::json!({"n": 1}));
        let payload = result.to_payload();
        let parsed = TaskResult::from_payload(&payload);
        assert_eq!(parsed.into_result().unwrap(), serde_json::json!({"n": 1}));
    }

    #[test]
    fn err_round_trips_through_payload() {
        let result = TaskResult::err("TaskError", "boom");
        let payload = result.to_payload();
        let parsed = TaskResult::from_payload(&payload);
        let err = parsed.into_result().unwrap_err();
        assert_eq!(err.message, "boom");
    }

    #[test]
    fn untagged_legacy_payload_is_treated_as_ok() {
        let payload = serde_json::json!("hello");
        let parsed = TaskResult::from_payload(&payload);
        assert_eq!(parsed.into_result().unwrap(), serde_json::json!("hello"));
    }
}
