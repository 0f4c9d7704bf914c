//! The [`Transport`] trait — the seam between the slave handle and whatever
//! actually moves envelopes: a child process's stdio, a relayed TCP socket,
//! or an in-process channel pair.
//!
//! Grounded on the teacher's `CodexTransport` trait (`atm-agent-mcp`), which
//! plays the same role between `ProxyServer` and its child-process
//! implementations, and is object-safe via `#[async_trait]` so a `Box<dyn
//! Transport>` can live inside a slave handle regardless of backend.

use async_trait::async_trait;
use distio_core::{DistioError, Envelope, Signal};

/// How [`Transport::close`] should behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMode {
    /// Send `EXIT` and wait for `ACK` (bounded by the caller's timeout).
    Graceful,
    /// Tear the transport down immediately (kill the child / drop the
    /// socket) without waiting for acknowledgement.
    Force,
}

/// Uniform send/receive interface implemented by every transport adapter.
///
/// All three variants guarantee ordered delivery within one session and
/// best-effort behavior on connection loss: once the underlying connection
/// is gone, `recv` returns a [`DistioError::TransportError`] for every
/// subsequent call rather than hanging forever.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Enqueue one envelope for delivery. Transports serialize concurrent
    /// `send` calls internally so that no two envelopes interleave on the
    /// wire.
    async fn send(&self, envelope: Envelope) -> Result<(), DistioError>;

    /// Receive the next envelope. Blocks until one arrives, the transport
    /// closes, or the connection is lost.
    async fn recv(&self) -> Result<Envelope, DistioError>;

    /// Close the transport. Idempotent: closing an already-closed transport
    /// is a no-op.
    async fn close(&self, mode: CloseMode) -> Result<(), DistioError>;

    /// Kill the slave's underlying child with `signal`. `signal` is assumed
    /// already validated by the caller (see `SlaveHandle::remote_kill`) —
    /// this method never rejects a signal name itself, it only transmits.
    ///
    /// The default implementation sends a `REMOTE_KILL` envelope through the
    /// ordinary [`Transport::send`] path, which is sufficient for adapters
    /// where the envelope reaches the child directly (child-process,
    /// in-process). [`crate::relay_client::RelayTransport`] overrides this to
    /// use the relay's dedicated `RemoteKill` control message instead of
    /// wrapping the kill as forwarded `Data`.
    async fn remote_kill(&self, signal: Signal) -> Result<(), DistioError> {
        self.send(Envelope::remote_kill(0, 0, signal)).await
    }
}
