//! The relay multiplexing protocol: the messages a master and a relay server
//! exchange over one TCP connection to authenticate, spawn children, and
//! bridge per-slave envelopes.
//!
//! Distinct from [`distio_core::Envelope`]: an envelope is scoped to one
//! slave session and the relay only ever reads its header fields when
//! bridging [`RelayMessage::Data`]. Everything else here — auth, spawn,
//! relay-level exit/kill — is protocol the relay itself terminates, the same
//! layering the teacher draws between MCP JSON-RPC payloads (opaque,
//! forwarded) and the proxy's own framing/lifecycle concerns
//! (`atm-agent-mcp/src/proxy.rs`).

use distio_core::Envelope;
use serde::{Deserialize, Serialize};

/// One multiplexed message on the relay's TCP connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelayMessage {
    /// First message a master sends after connecting. Carries optional
    /// HTTP-basic-style credentials and an optional shared passphrase.
    Auth {
        user: Option<String>,
        pass: Option<String>,
        passphrase: Option<String>,
    },
    /// The relay's reply to [`RelayMessage::Auth`]. `ok = false` means the
    /// relay will close the connection immediately after sending this.
    AuthAck { ok: bool, message: Option<String> },
    /// Ask the relay to fork a child-process slave running `script` and
    /// register it under `local_id` for the rest of this connection.
    Spawn { local_id: u64, script: String },
    /// Reply to [`RelayMessage::Spawn`].
    SpawnAck {
        local_id: u64,
        ok: bool,
        message: Option<String>,
    },
    /// Ask the relay to gracefully exit the child registered under
    /// `local_id` (distinct from the per-session `EXIT` envelope, which the
    /// relay forwards as [`RelayMessage::Data`] to a slave that is already
    /// multiplexed).
    Exit { local_id: u64 },
    /// Ask the relay to signal the child registered under `local_id`.
    RemoteKill { local_id: u64, signal: String },
    /// A bridged envelope for the slave session registered under
    /// `local_id`. The relay does not interpret `envelope`'s payload, only
    /// routes on `local_id` and reads `envelope.meta.sender_id` when
    /// rewriting it for the master.
    Data { local_id: u64, envelope: Envelope },
}

impl RelayMessage {
    pub fn data(local_id: u64, envelope: Envelope) -> Self {
        Self::Data { local_id, envelope }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_message_round_trips() {
        let env = Envelope::request(1, "echo", serde_json::json!("hi"), 0);
        let msg = RelayMessage::data(7, env);
        let bytes = serde_json::to_vec(&msg).unwrap();
        let decoded: RelayMessage = serde_json::from_slice(&bytes).unwrap();
        match decoded {
            RelayMessage::Data { local_id, envelope } => {
                assert_eq!(local_id, 7);
                assert_eq!(envelope.request_id, 1);
            }
            _ => panic!("expected Data"),
        }
    }
}
