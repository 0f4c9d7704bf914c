//! Error taxonomy shared across distio's transport, master, and relay layers.
//!
//! Mirrors the teacher's `PluginError` shape (struct variants carrying a
//! message plus an optional boxed source) so callers can thread an
//! underlying I/O or serialization error through without losing the chain.

use std::error::Error as StdError;

/// The complete set of errors distio can report.
#[derive(thiserror::Error, Debug)]
pub enum DistioError {
    /// Unknown signal name, malformed host address, or a reserved task name
    /// used where a user task name was expected.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// `dispatch` called on a slave in `Closing`, `Closed`, or `Errored`.
    #[error("invalid slave state: {message}")]
    InvalidState { message: String },

    /// Connection refused, auth rejected, framing error, or unexpected EOF.
    #[error("transport error: {message}")]
    TransportError {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// Handshake did not complete within the configured window.
    #[error("handshake timed out after {elapsed_ms}ms")]
    HandshakeTimeout { elapsed_ms: u64 },

    /// The slave explicitly returned an error value for a task.
    #[error("task {task_name:?} failed: {message}")]
    TaskError { task_name: String, message: String },

    /// A composer was invoked against an empty or all-dead slave set.
    #[error("no available slaves")]
    NoAvailableSlaves,

    /// A pipeline interceptor short-circuited the chain with a sentinel
    /// value and the caller chose to surface that as a hard error rather
    /// than as a synthesized [`crate::Response`].
    #[error("pipeline aborted at stage {stage}")]
    PipelineAborted {
        stage: usize,
        value: serde_json::Value,
    },
}

impl DistioError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportError {
            message: message.into(),
            source: None,
        }
    }

    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::TransportError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn task_error(task_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TaskError {
            task_name: task_name.into(),
            message: message.into(),
        }
    }

    /// Returns true for errors that should mark the owning slave as
    /// [`crate::envelope::Meta`]-level `Errored` (transport-class failures),
    /// as opposed to task-level errors which never taint the slave.
    pub fn is_fatal_to_slave(&self) -> bool {
        matches!(
            self,
            Self::TransportError { .. } | Self::HandshakeTimeout { .. }
        )
    }
}
