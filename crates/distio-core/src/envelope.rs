//! The [`Envelope`] — the single unit carried by every transport adapter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved task-name symbols. A task name equal to one of these is never a
/// valid user task; the codec and dispatcher reject registration attempts
/// that collide with them.
pub struct ReservedTask;

impl ReservedTask {
    /// Requests graceful shutdown of the slave session.
    pub const EXIT: &'static str = "EXIT";
    /// No-op, used for keepalive and handshake nonce exchange.
    pub const NULL: &'static str = "NULL";
    /// Reply to a control frame.
    pub const ACK: &'static str = "ACK";
    /// Kill the child with a named POSIX signal (see [`crate::Signal`]).
    pub const REMOTE_KILL: &'static str = "REMOTE_KILL";

    const ALL: [&'static str; 4] = [Self::EXIT, Self::NULL, Self::ACK, Self::REMOTE_KILL];

    /// True if `name` collides with a reserved task symbol.
    pub fn is_reserved(name: &str) -> bool {
        Self::ALL.contains(&name)
    }
}

/// The kind of frame an [`Envelope`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    /// A task dispatch awaiting a response.
    Request,
    /// The reply to exactly one prior request on the same slave session.
    Response,
    /// A control frame (e.g. `REMOTE_KILL`) that is not itself a task.
    Control,
    /// Acknowledgement of a control frame, or of the handshake nonce.
    Ack,
    /// Graceful-shutdown request (`EXIT`).
    Exit,
}

/// Envelope metadata: when it was sent, who sent it, and (for
/// `REMOTE_KILL`) which signal to deliver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    /// Wall-clock time the envelope was handed to the transport.
    pub sent_at: DateTime<Utc>,
    /// Process-wide slave id of the sender (the master uses `0` for its own
    /// envelopes; a relay rewrites this to the logical slave id it proxies).
    pub sender_id: u64,
    /// Present only on `REMOTE_KILL` control envelopes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
}

impl Meta {
    pub fn now(sender_id: u64) -> Self {
        Self {
            sent_at: Utc::now(),
            sender_id,
            signal: None,
        }
    }

    pub fn with_signal(mut self, signal: impl Into<String>) -> Self {
        self.signal = Some(signal.into());
        self
    }
}

/// The unit of transport. Every response carries the `request_id` of
/// exactly one prior request on the same slave session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub request_id: u64,
    pub kind: EnvelopeKind,
    /// Either a reserved symbol ([`ReservedTask`]) or a user task name.
    pub task_name: String,
    /// Opaque, codec-defined encoding of the request/response payload.
    pub payload: serde_json::Value,
    pub meta: Meta,
}

impl Envelope {
    pub fn request(request_id: u64, task_name: impl Into<String>, payload: serde_json::Value, sender_id: u64) -> Self {
        Self {
            request_id,
            kind: EnvelopeKind::Request,
            task_name: task_name.into(),
            payload,
            meta: Meta::now(sender_id),
        }
    }

    pub fn response(request_id: u64, task_name: impl Into<String>, payload: serde_json::Value, sender_id: u64) -> Self {
        Self {
            request_id,
            kind: EnvelopeKind::Response,
            task_name: task_name.into(),
            payload,
            meta: Meta::now(sender_id),
        }
    }

    pub fn exit(request_id: u64, sender_id: u64) -> Self {
        Self {
            request_id,
            kind: EnvelopeKind::Exit,
            task_name: ReservedTask::EXIT.to_string(),
            payload: serde_json::Value::Null,
            meta: Meta::now(sender_id),
        }
    }

    pub fn ack(request_id: u64, sender_id: u64, payload: serde_json::Value) -> Self {
        Self {
            request_id,
            kind: EnvelopeKind::Ack,
            task_name: ReservedTask::ACK.to_string(),
            payload,
            meta: Meta::now(sender_id),
        }
    }

    pub fn null(request_id: u64, sender_id: u64, nonce: impl Into<String>) -> Self {
        Self {
            request_id,
            kind: EnvelopeKind::Request,
            task_name: ReservedTask::NULL.to_string(),
            payload: serde_json::Value::String(nonce.into()),
            meta: Meta::now(sender_id),
        }
    }

    pub fn remote_kill(request_id: u64, sender_id: u64, signal: crate::Signal) -> Self {
        Self {
            request_id,
            kind: EnvelopeKind::Control,
            task_name: ReservedTask::REMOTE_KILL.to_string(),
            payload: serde_json::Value::Null,
            meta: Meta::now(sender_id).with_signal(signal.name()),
        }
    }

    pub fn is_reserved(&self) -> bool {
        ReservedTask::is_reserved(&self.task_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_names_are_recognized() {
        assert!(ReservedTask::is_reserved("EXIT"));
        assert!(ReservedTask::is_reserved("NULL"));
        assert!(ReservedTask::is_reserved("ACK"));
        assert!(ReservedTask::is_reserved("REMOTE_KILL"));
        assert!(!ReservedTask::is_reserved("say hello"));
    }

    #[test]
    fn exit_envelope_carries_reserved_task_name() {
        let env = Envelope::exit(1, 0);
        assert!(env.is_reserved());
        assert_eq!(env.task_name, "EXIT");
        assert_eq!(env.kind, EnvelopeKind::Exit);
    }
}
