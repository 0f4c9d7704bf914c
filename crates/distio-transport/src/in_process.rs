//! In-process transport: a direct channel pair with no encoding, used by
//! tests and by the in-process slave variant (no real child process or
//! socket involved).
//!
//! Grounded on the teacher's `MockTransport`/`mock_transport.rs`
//! (`atm-daemon/src/plugins/bridge/mock_transport.rs`): an in-memory stand-in
//! that implements the same trait as the real transport so composer tests
//! never need a real socket or child process.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use distio_core::{DistioError, Envelope};
use tokio::sync::{Mutex, mpsc};

use crate::transport::{CloseMode, Transport};

/// One end of an in-process channel pair. `send` pushes onto the peer's
/// inbox; `recv` drains this end's own inbox.
pub struct InProcessTransport {
    outbound: mpsc::UnboundedSender<Envelope>,
    inbound: Mutex<mpsc::UnboundedReceiver<Envelope>>,
    closed: AtomicBool,
}

impl InProcessTransport {
    /// Create a connected pair: envelopes sent on one end arrive via `recv`
    /// on the other.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        let a = Self {
            outbound: tx_b,
            inbound: Mutex::new(rx_a),
            closed: AtomicBool::new(false),
        };
        let b = Self {
            outbound: tx_a,
            inbound: Mutex::new(rx_b),
            closed: AtomicBool::new(false),
        };
        (a, b)
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn send(&self, envelope: Envelope) -> Result<(), DistioError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DistioError::transport("in-process transport closed"));
        }
        self.outbound
            .send(envelope)
            .map_err(|_| DistioError::transport("in-process peer dropped"))
    }

    async fn recv(&self) -> Result<Envelope, DistioError> {
        let mut inbound = self.inbound.lock().await;
        inbound
            .recv()
            .await
            .ok_or_else(|| DistioError::transport("in-process peer closed"))
    }

    async fn close(&self, _mode: CloseMode) -> Result<(), DistioError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use distio_core::envelope::Envelope as Env;

    #[tokio::test]
    async fn send_on_one_end_recv_on_the_other() {
        let (a, b) = InProcessTransport::pair();
        a.send(Env::request(1, "echo", serde_json::json!("hi"), 0))
            .await
            .unwrap();
        let received = b.recv().await.unwrap();
        assert_eq!(received.request_id, 1);
        assert_eq!(received.task_name, "echo");
    }

    #[tokio::test]
    async fn closed_transport_rejects_send() {
        let (a, _b) = InProcessTransport::pair();
        a.close(CloseMode::Force).await.unwrap();
        assert!(a.send(Env::exit(1, 0)).await.is_err());
    }

    #[tokio::test]
    async fn dropping_peer_fails_recv() {
        let (a, b) = InProcessTransport::pair();
        drop(b);
        assert!(a.recv().await.is_err());
    }
}
