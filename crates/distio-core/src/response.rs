//! [`Response`] and [`ResponseArray`] — the observable result of a dispatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A lightweight, serializable error carried inside a [`Response`].
///
/// Distinct from [`crate::DistioError`] because a `Response` crosses the
/// wire (it must round-trip through JSON) while `DistioError` may box an
/// arbitrary `dyn std::error::Error` source that cannot be serialized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseError {
    pub kind: String,
    pub message: String,
}

impl std::fmt::Display for ResponseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<&crate::DistioError> for ResponseError {
    fn from(err: &crate::DistioError) -> Self {
        let kind = match err {
            crate::DistioError::InvalidArgument { .. } => "InvalidArgument",
            crate::DistioError::InvalidState { .. } => "InvalidState",
            crate::DistioError::TransportError { .. } => "TransportError",
            crate::DistioError::HandshakeTimeout { .. } => "HandshakeTimeout",
            crate::DistioError::TaskError { .. } => "TaskError",
            crate::DistioError::NoAvailableSlaves => "NoAvailableSlaves",
            crate::DistioError::PipelineAborted { .. } => "PipelineAborted",
        };
        Self {
            kind: kind.to_string(),
            message: err.to_string(),
        }
    }
}

/// The observable result of one `dispatch`. Exactly one of `value`, `error`
/// is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub request_id: u64,
    pub slave_id: u64,
    pub task_name: String,
    pub sent_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

impl Response {
    pub fn ok(
        request_id: u64,
        slave_id: u64,
        task_name: impl Into<String>,
        sent_at: DateTime<Utc>,
        value: serde_json::Value,
    ) -> Self {
        let received_at = Utc::now();
        let duration = (received_at - sent_at).to_std().unwrap_or(Duration::ZERO);
        Self {
            request_id,
            slave_id,
            task_name: task_name.into(),
            sent_at,
            received_at,
            duration,
            value: Some(value),
            error: None,
        }
    }

    pub fn err(
        request_id: u64,
        slave_id: u64,
        task_name: impl Into<String>,
        sent_at: DateTime<Utc>,
        error: impl Into<ResponseError>,
    ) -> Self {
        let received_at = Utc::now();
        let duration = (received_at - sent_at).to_std().unwrap_or(Duration::ZERO);
        Self {
            request_id,
            slave_id,
            task_name: task_name.into(),
            sent_at,
            received_at,
            duration,
            value: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Render `value` as plain text for [`ResponseArray::join_values`]: a
    /// JSON string unwraps to its inner text, everything else renders as
    /// compact JSON.
    fn value_as_text(&self) -> String {
        match &self.value {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => self
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default(),
        }
    }
}

/// Which field [`ResponseArray::sort_by`] compares on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Value,
    ReceivedAt,
    SentAt,
    Duration,
    RequestId,
}

/// Sort direction for [`ResponseArray::sort_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// An ordered collection of [`Response`]s produced by a multi-target
/// composer (`tell` over a collection, `scatter`). Preserves the original
/// dispatch order (i.e. the caller-visible order of the target collection
/// or datum list) unless explicitly sorted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseArray(pub Vec<Response>);

impl ResponseArray {
    pub fn new(responses: Vec<Response>) -> Self {
        Self(responses)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Response> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Response> {
        self.0
    }

    /// Sort in place by `field`, breaking ties by dispatch order (a stable
    /// sort), returning `self` for chaining.
    pub fn sort_by(mut self, field: SortField, order: SortOrder) -> Self {
        self.0.sort_by(|a, b| {
            let cmp = match field {
                SortField::Value => a.value_as_text().cmp(&b.value_as_text()),
                SortField::ReceivedAt => a.received_at.cmp(&b.received_at),
                SortField::SentAt => a.sent_at.cmp(&b.sent_at),
                SortField::Duration => a.duration.cmp(&b.duration),
                SortField::RequestId => a.request_id.cmp(&b.request_id),
            };
            match order {
                SortOrder::Asc => cmp,
                SortOrder::Desc => cmp.reverse(),
            }
        });
        self
    }

    /// Join every response's `value` (rendered as plain text) with `sep`,
    /// in the array's current order.
    pub fn join_values(&self, sep: &str) -> String {
        self.0
            .iter()
            .map(Response::value_as_text)
            .collect::<Vec<_>>()
            .join(sep)
    }
}

impl IntoIterator for ResponseArray {
    type Item = Response;
    type IntoIter = std::vec::IntoIter<Response>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<Response> for ResponseArray {
    fn from_iter<I: IntoIterator<Item = Response>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
