//! Master-side relay transport: one TCP connection to a relay server,
//! multiplexing many logical slaves (`local_id`s) over it.
//!
//! [`RelayConnection`] owns the socket and a background read loop that
//! demultiplexes incoming [`RelayMessage::Data`] frames into a per-`local_id`
//! channel; [`RelayTransport`] is the per-slave [`Transport`] view a
//! [`crate::transport::Transport`] consumer actually holds. Grounded on the
//! teacher's `ProxyServer` reader-task + routed-channel shape
//! (`atm-agent-mcp/src/proxy.rs`), generalized from "one child" to "N
//! children sharing one socket".

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use distio_core::{DistioError, Envelope};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::timeout;

use crate::address::HostAddress;
use crate::framing::{FrameReader, write_frame};
use crate::relay_protocol::RelayMessage;
use crate::transport::{CloseMode, Transport};

type SpawnAckSender = oneshot::Sender<Result<(), String>>;

struct Shared {
    writer: Mutex<OwnedWriteHalf>,
    // A plain std Mutex, not tokio's: `transport_for` is a sync fn and must
    // insert its route before returning, so a later `spawn`'s first reply
    // frame can never race ahead of route registration.
    routes: StdMutex<HashMap<u64, mpsc::UnboundedSender<Envelope>>>,
    pending_spawns: Mutex<HashMap<u64, SpawnAckSender>>,
    closed: AtomicBool,
}

impl Shared {
    async fn write_message(&self, msg: &RelayMessage) -> Result<(), DistioError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DistioError::transport("relay connection closed"));
        }
        let body = serde_json::to_vec(msg)
            .map_err(|e| DistioError::transport_with_source("failed to encode relay message", e))?;
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, &body).await
    }
}

/// One TCP connection to a relay, shared by every [`RelayTransport`] opened
/// against it.
pub struct RelayConnection {
    shared: Arc<Shared>,
}

impl RelayConnection {
    /// Connect, authenticate, and start the background demultiplexing loop.
    ///
    /// # Errors
    ///
    /// Returns [`DistioError::TransportError`] on connection failure,
    /// framing error, or if the relay rejects the authentication frame.
    pub async fn connect(address: &HostAddress, passphrase: Option<String>) -> Result<Self, DistioError> {
        let stream = TcpStream::connect(address.socket_addr_string())
            .await
            .map_err(|e| DistioError::transport_with_source("failed to connect to relay", e))?;
        let (read_half, write_half) = stream.into_split();

        let shared = Arc::new(Shared {
            writer: Mutex::new(write_half),
            routes: StdMutex::new(HashMap::new()),
            pending_spawns: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });

        let mut reader = FrameReader::new(read_half);

        let auth = RelayMessage::Auth {
            user: address.user.clone(),
            pass: address.pass.clone(),
            passphrase,
        };
        shared.write_message(&auth).await?;

        let ack_bytes = reader
            .read_frame()
            .await?
            .ok_or_else(|| DistioError::transport("relay closed connection before auth ack"))?;
        let ack: RelayMessage = serde_json::from_slice(&ack_bytes)
            .map_err(|e| DistioError::transport_with_source("malformed auth ack from relay", e))?;
        match ack {
            RelayMessage::AuthAck { ok: true, .. } => {}
            RelayMessage::AuthAck { ok: false, message } => {
                return Err(DistioError::transport(format!(
                    "relay rejected authentication: {}",
                    message.unwrap_or_default()
                )));
            }
            _ => return Err(DistioError::transport("expected auth ack from relay")),
        }

        tokio::spawn(read_loop(reader, Arc::clone(&shared)));

        Ok(Self { shared })
    }

    /// Ask the relay to spawn a child registered under `local_id`, waiting
    /// for its `SpawnAck`.
    ///
    /// # Errors
    ///
    /// Returns [`DistioError::TransportError`] if the relay reports a spawn
    /// failure or the connection is lost before an ack arrives.
    pub async fn spawn(&self, local_id: u64, script: impl Into<String>) -> Result<(), DistioError> {
        let (tx, rx) = oneshot::channel();
        self.shared.pending_spawns.lock().await.insert(local_id, tx);
        self.shared
            .write_message(&RelayMessage::Spawn {
                local_id,
                script: script.into(),
            })
            .await?;
        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(DistioError::transport(format!("relay spawn failed: {message}"))),
            Err(_) => Err(DistioError::transport("relay connection lost awaiting spawn ack")),
        }
    }

    /// Open a per-slave [`RelayTransport`] view bound to `local_id`.
    ///
    /// Must be called after [`RelayConnection::spawn`] registers the route.
    pub fn transport_for(&self, local_id: u64) -> RelayTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.routes.lock().unwrap().insert(local_id, tx);
        RelayTransport {
            shared: Arc::clone(&self.shared),
            local_id,
            inbox: Mutex::new(rx),
        }
    }
}

async fn read_loop(mut reader: FrameReader<tokio::net::tcp::OwnedReadHalf>, shared: Arc<Shared>) {
    loop {
        let body = match reader.read_frame().await {
            Ok(Some(body)) => body,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("relay connection read error: {e}");
                break;
            }
        };
        let msg: RelayMessage = match serde_json::from_slice(&body) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("dropping malformed relay message: {e}");
                continue;
            }
        };
        match msg {
            RelayMessage::Data { local_id, envelope } => {
                let routes = shared.routes.lock().unwrap();
                if let Some(tx) = routes.get(&local_id) {
                    let _ = tx.send(envelope);
                } else {
                    tracing::warn!("relay data for unknown local_id {local_id}, dropping");
                }
            }
            RelayMessage::SpawnAck { local_id, ok, message } => {
                if let Some(tx) = shared.pending_spawns.lock().await.remove(&local_id) {
                    let _ = tx.send(if ok { Ok(()) } else { Err(message.unwrap_or_default()) });
                }
            }
            other => {
                tracing::debug!("ignoring relay control message on data loop: {other:?}");
            }
        }
    }
    shared.closed.store(true, Ordering::SeqCst);
    let routes = std::mem::take(&mut *shared.routes.lock().unwrap());
    drop(routes); // dropping the senders makes every RelayTransport::recv fail
}

/// A [`Transport`] view of one slave multiplexed over a shared
/// [`RelayConnection`]. `was_proxied` is always true for slaves reached this
/// way (tracked by the owning slave handle, not here).
pub struct RelayTransport {
    shared: Arc<Shared>,
    local_id: u64,
    inbox: Mutex<mpsc::UnboundedReceiver<Envelope>>,
}

#[async_trait]
impl Transport for RelayTransport {
    async fn send(&self, envelope: Envelope) -> Result<(), DistioError> {
        self.shared
            .write_message(&RelayMessage::data(self.local_id, envelope))
            .await
    }

    async fn recv(&self) -> Result<Envelope, DistioError> {
        let mut inbox = self.inbox.lock().await;
        inbox
            .recv()
            .await
            .ok_or_else(|| DistioError::transport("relay connection lost"))
    }

    async fn close(&self, mode: CloseMode) -> Result<(), DistioError> {
        self.shared.routes.lock().unwrap().remove(&self.local_id);
        match mode {
            CloseMode::Graceful => {
                let _ = timeout(
                    Duration::from_millis(500),
                    self.shared.write_message(&RelayMessage::Exit {
                        local_id: self.local_id,
                    }),
                )
                .await;
            }
            CloseMode::Force => {
                let _ = self
                    .shared
                    .write_message(&RelayMessage::Exit {
                        local_id: self.local_id,
                    })
                    .await;
            }
        }
        Ok(())
    }

    /// Ask the relay to signal the child it spawned for `local_id`, via the
    /// relay's own `RemoteKill` control message rather than a forwarded
    /// `Data` envelope.
    async fn remote_kill(&self, signal: distio_core::Signal) -> Result<(), DistioError> {
        self.shared
            .write_message(&RelayMessage::RemoteKill {
                local_id: self.local_id,
                signal: signal.name().to_string(),
            })
            .await
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
    }
}
