//! [`SlaveHandle`] — the master-side state machine for one worker.
//!
//! A pending-request map keyed by id backs each handle: a background reader
//! task demultiplexes incoming frames and resolves the matching entry, while
//! a single writer stays serialized behind a lock. Many concurrent requests
//! can be in flight on one slave at a time, tracked by `request_id`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use distio_core::envelope::ReservedTask;
use distio_core::{DistioError, Envelope, EnvelopeKind, Response, Signal};
use tokio::sync::{Mutex, RwLock, oneshot};
use tokio::time::timeout;
use tracing::warn;

use distio_transport::{CloseMode, Transport};

/// A slave handle's lifecycle state. See `SPEC_FULL.md` §4.3 for the full
/// transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaveState {
    Pending,
    Ready,
    Busy,
    Closing,
    Closed,
    Errored,
}

impl SlaveState {
    /// States in which `dispatch` fails synchronously with `InvalidState`.
    fn rejects_dispatch(self) -> bool {
        matches!(self, Self::Closing | Self::Closed | Self::Errored)
    }
}

struct PendingSlot {
    tx: oneshot::Sender<Result<Response, DistioError>>,
    sent_at: chrono::DateTime<chrono::Utc>,
}

/// The master-side representative of one worker, local or relayed.
///
/// Owns the transport, the pending-request table, and the in-flight counter
/// the workpool's assignment policy reads. A background task drains
/// `transport.recv()` for the lifetime of the handle.
pub struct SlaveHandle {
    pub id: u64,
    pub local_id: u64,
    pub group: Option<String>,
    pub was_proxied: bool,
    transport: Arc<dyn Transport>,
    state: RwLock<SlaveState>,
    pending: Mutex<HashMap<u64, PendingSlot>>,
    next_request_id: AtomicU64,
    last_seen: RwLock<chrono::DateTime<chrono::Utc>>,
}

impl SlaveHandle {
    /// Wrap an already-open, already-handshaken transport as a `Ready`
    /// slave and start its reader loop.
    ///
    /// Callers that need the handshake itself (child-process, relay) perform
    /// it on the transport before constructing the handle; see
    /// `distio-master::registry`.
    pub fn new(id: u64, local_id: u64, group: Option<String>, was_proxied: bool, transport: Arc<dyn Transport>) -> Arc<Self> {
        let handle = Arc::new(Self {
            id,
            local_id,
            group,
            was_proxied,
            transport,
            state: RwLock::new(SlaveState::Ready),
            pending: Mutex::new(HashMap::new()),
            next_request_id: AtomicU64::new(1),
            last_seen: RwLock::new(chrono::Utc::now()),
        });
        tokio::spawn(reader_loop(Arc::clone(&handle)));
        handle
    }

    pub async fn state(&self) -> SlaveState {
        *self.state.read().await
    }

    async fn set_state(&self, state: SlaveState) {
        *self.state.write().await = state;
    }

    pub async fn last_seen(&self) -> chrono::DateTime<chrono::Utc> {
        *self.last_seen.read().await
    }

    /// Number of requests sent but not yet fulfilled. Read by the workpool's
    /// least-busy assignment policy; stale reads are acceptable (affects
    /// fairness, not correctness — see `SPEC_FULL.md` §5).
    pub async fn in_flight(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Dispatch one task, parking a completion slot keyed by the assigned
    /// `request_id` until a matching response arrives or the session ends.
    ///
    /// # Errors
    ///
    /// Returns [`DistioError::InvalidState`] synchronously if the slave is
    /// `Closing`, `Closed`, or `Errored`. Returns [`DistioError::TaskError`]
    /// if the slave explicitly replied with an error payload, or
    /// [`DistioError::TransportError`] if the session ends before a reply
    /// arrives.
    pub async fn dispatch(&self, task_name: impl Into<String>, payload: serde_json::Value) -> Result<Response, DistioError> {
        let task_name = task_name.into();
        if ReservedTask::is_reserved(&task_name) {
            return Err(DistioError::invalid_argument(format!(
                "{task_name:?} is a reserved task name and cannot be dispatched as a user task"
            )));
        }
        {
            let state = self.state().await;
            if state.rejects_dispatch() {
                return Err(DistioError::invalid_state(format!(
                    "cannot dispatch to slave {} in state {state:?}",
                    self.id
                )));
            }
        }

        let request_id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let envelope = Envelope::request(request_id, task_name.clone(), payload, self.id);
        let sent_at = envelope.meta.sent_at;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id, PendingSlot { tx, sent_at });

        if let Err(e) = self.transport.send(envelope).await {
            self.pending.lock().await.remove(&request_id);
            self.fail_all_pending(&e).await;
            self.set_state(SlaveState::Errored).await;
            return Err(e);
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(DistioError::transport(format!(
                "slave {} session ended before request {request_id} was fulfilled",
                self.id
            ))),
        }
    }

    /// Kill this slave's child with `signal_name`.
    ///
    /// # Errors
    ///
    /// Returns [`DistioError::InvalidArgument`] synchronously — before any
    /// envelope is constructed or transmitted — if `signal_name` is not one
    /// of `{SIGINT, SIGKILL, SIGTERM, SIGBREAK, SIGSTOP, SIGHUP}`. Returns
    /// [`DistioError::InvalidState`] if the slave is `Closing`, `Closed`, or
    /// `Errored`.
    pub async fn remote_kill(&self, signal_name: &str) -> Result<(), DistioError> {
        let signal = Signal::parse(signal_name)?;
        let state = self.state().await;
        if state.rejects_dispatch() {
            return Err(DistioError::invalid_state(format!(
                "cannot remote_kill slave {} in state {state:?}",
                self.id
            )));
        }
        self.transport.remote_kill(signal).await
    }

    /// Send `EXIT` and wait (bounded by `timeout_dur`) for `ACK`; force-close
    /// the transport if the ack does not arrive in time. Idempotent.
    pub async fn close(&self, timeout_dur: Duration) -> Result<(), DistioError> {
        let state = self.state().await;
        if matches!(state, SlaveState::Closed) {
            return Ok(());
        }
        self.set_state(SlaveState::Closing).await;

        let request_id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id, PendingSlot {
            tx,
            sent_at: chrono::Utc::now(),
        });
        let envelope = Envelope::exit(request_id, self.id);

        if self.transport.send(envelope).await.is_ok() {
            let _ = timeout(timeout_dur, rx).await;
        }

        let _ = self.transport.close(CloseMode::Force).await;
        self.fail_all_pending(&DistioError::transport("slave closed")).await;
        self.set_state(SlaveState::Closed).await;
        Ok(())
    }

    async fn fail_all_pending(&self, err: &DistioError) {
        let mut pending = self.pending.lock().await;
        for (_, slot) in pending.drain() {
            let _ = slot.tx.send(Err(DistioError::transport(err.to_string())));
        }
    }

    /// Route one incoming envelope: fulfil a pending slot for `response`
    /// frames, otherwise handle reserved control frames.
    async fn handle_incoming(&self, envelope: Envelope) {
        *self.last_seen.write().await = chrono::Utc::now();
        match envelope.kind {
            EnvelopeKind::Response | EnvelopeKind::Ack => {
                let slot = self.pending.lock().await.remove(&envelope.request_id);
                let Some(slot) = slot else {
                    return;
                };
                let task_result = distio_core::TaskResult::from_payload(&envelope.payload);
                let response = match task_result.into_result() {
                    Ok(value) => Response::ok(envelope.request_id, self.id, envelope.task_name.clone(), slot.sent_at, value),
                    Err(resp_err) => Response::err(envelope.request_id, self.id, envelope.task_name.clone(), slot.sent_at, resp_err),
                };
                let _ = slot.tx.send(Ok(response));
            }
            EnvelopeKind::Exit | EnvelopeKind::Control => {
                // Reserved control frames addressed to us (REMOTE_KILL acks
                // or an unsolicited EXIT acknowledgement) carry no pending
                // slot to fulfil; nothing to do beyond the `last_seen` touch
                // above.
            }
            EnvelopeKind::Request => {
                warn!(
                    "slave {} sent an unexpected Request-kind frame to the master, dropping",
                    self.id
                );
            }
        }
    }
}

async fn reader_loop(handle: Arc<SlaveHandle>) {
    loop {
        match handle.transport.recv().await {
            Ok(envelope) => handle.handle_incoming(envelope).await,
            Err(e) => {
                warn!("slave {} transport error, marking Errored: {e}", handle.id);
                handle.fail_all_pending(&e).await;
                handle.set_state(SlaveState::Errored).await;
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use distio_transport::InProcessTransport;

    async fn echo_peer(peer: Arc<dyn Transport>) {
        tokio::spawn(async move {
            loop {
                match peer.recv().await {
                    Ok(env) if env.kind == EnvelopeKind::Request => {
                        let reply = Envelope::response(env.request_id, env.task_name, env.payload, 99);
                        if peer.send(reply).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        });
    }

    #[tokio::test]
    async fn dispatch_resolves_with_matching_response() {
        let (master_side, slave_side) = InProcessTransport::pair();
        echo_peer(Arc::new(slave_side)).await;
        let handle = SlaveHandle::new(1, 1, None, false, Arc::new(master_side));

        let resp = handle.dispatch("echo", serde_json::json!("hi")).await.unwrap();
        assert_eq!(resp.value, Some(serde_json::json!("hi")));
        assert_eq!(resp.slave_id, 1);
    }

    #[tokio::test]
    async fn reserved_task_name_is_rejected() {
        let (master_side, _slave_side) = InProcessTransport::pair();
        let handle = SlaveHandle::new(1, 1, None, false, Arc::new(master_side));
        let err = handle.dispatch("EXIT", serde_json::json!(null)).await.unwrap_err();
        assert!(matches!(err, DistioError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn closed_slave_rejects_further_dispatch() {
        let (master_side, slave_side) = InProcessTransport::pair();
        echo_peer(Arc::new(slave_side)).await;
        let handle = SlaveHandle::new(1, 1, None, false, Arc::new(master_side));
        handle.close(Duration::from_millis(50)).await.unwrap();
        let err = handle.dispatch("echo", serde_json::json!(1)).await.unwrap_err();
        assert!(matches!(err, DistioError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (master_side, slave_side) = InProcessTransport::pair();
        echo_peer(Arc::new(slave_side)).await;
        let handle = SlaveHandle::new(1, 1, None, false, Arc::new(master_side));
        handle.close(Duration::from_millis(50)).await.unwrap();
        handle.close(Duration::from_millis(50)).await.unwrap();
        assert!(matches!(handle.state().await, SlaveState::Closed));
    }

    #[tokio::test]
    async fn dropped_peer_fails_pending_dispatch() {
        let (master_side, slave_side) = InProcessTransport::pair();
        let handle = SlaveHandle::new(1, 1, None, false, Arc::new(master_side));
        drop(slave_side);
        let err = handle.dispatch("echo", serde_json::json!(1)).await.unwrap_err();
        assert!(matches!(err, DistioError::TransportError { .. }));
        assert!(matches!(handle.state().await, SlaveState::Errored));
    }

    #[tokio::test]
    async fn remote_kill_rejects_unknown_signal_before_transmission() {
        let (master_side, slave_side) = InProcessTransport::pair();
        let handle = SlaveHandle::new(1, 1, None, false, Arc::new(master_side));

        let err = handle.remote_kill("SIGFOO").await.unwrap_err();
        assert!(matches!(err, DistioError::InvalidArgument { .. }));

        // No envelope was ever sent, so the peer's inbox stays empty: a recv
        // with a short timeout must time out rather than observe a frame.
        let got_envelope = tokio::time::timeout(Duration::from_millis(20), slave_side.recv()).await;
        assert!(got_envelope.is_err(), "remote_kill with a bad signal must not transmit");
    }

    #[tokio::test]
    async fn remote_kill_sends_a_remote_kill_envelope_with_the_signal_name() {
        let (master_side, slave_side) = InProcessTransport::pair();
        let handle = SlaveHandle::new(1, 1, None, false, Arc::new(master_side));

        handle.remote_kill("SIGTERM").await.unwrap();

        let envelope = slave_side.recv().await.unwrap();
        assert_eq!(envelope.kind, EnvelopeKind::Control);
        assert_eq!(envelope.task_name, ReservedTask::REMOTE_KILL);
        assert_eq!(envelope.meta.signal.as_deref(), Some("SIGTERM"));
    }

    #[tokio::test]
    async fn closed_slave_rejects_remote_kill() {
        let (master_side, slave_side) = InProcessTransport::pair();
        echo_peer(Arc::new(slave_side)).await;
        let handle = SlaveHandle::new(1, 1, None, false, Arc::new(master_side));
        handle.close(Duration::from_millis(50)).await.unwrap();

        let err = handle.remote_kill("SIGTERM").await.unwrap_err();
        assert!(matches!(err, DistioError::InvalidState { .. }));
    }
}
