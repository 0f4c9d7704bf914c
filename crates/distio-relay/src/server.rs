//! The relay server: accepts master connections on one TCP listener, forks
//! child-process slaves on behalf of each, and bridges envelopes between
//! them.
//!
//! The accept loop races a `CancellationToken` against `listener.accept()` in
//! a `tokio::select!`, spawning one task per accepted connection and backing
//! off briefly on transient accept errors. Per connection, the relay treats
//! itself as an ordinary master toward its own children — it drives each
//! spawned child through the exact same
//! [`distio_transport::ChildProcessTransport`] used locally, and only adds a
//! thin multiplexing layer ([`distio_transport::RelayMessage`]) on top so one
//! TCP socket can carry many slave sessions.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use distio_core::{DistioError, Envelope, Signal};
use distio_transport::framing::{FrameReader, write_frame};
use distio_transport::transport::{CloseMode, Transport};
use distio_transport::{ChildProcessTransport, RelayMessage};
use tokio::net::TcpListener;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::RelayConfig;

/// Bind and serve `config.port` until `cancel` fires.
///
/// # Errors
///
/// Returns [`DistioError::TransportError`] if the listener cannot be bound.
pub async fn serve(config: RelayConfig, cancel: CancellationToken) -> Result<(), DistioError> {
    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| DistioError::transport_with_source(format!("failed to bind relay listener on {addr}"), e))?;
    info!("distio relay listening on {addr}");

    let config = Arc::new(config);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("relay shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let config = Arc::clone(&config);
                        let conn_cancel = cancel.child_token();
                        tokio::spawn(async move {
                            info!("relay connection from {peer}");
                            if let Err(e) = handle_connection(stream, config, conn_cancel).await {
                                warn!("relay connection from {peer} ended: {e}");
                            }
                        });
                    }
                    Err(e) => {
                        warn!("relay accept error: {e}");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }
}

/// One spawned child, tracked for the lifetime of the connection that asked
/// for it.
struct Child {
    transport: Arc<ChildProcessTransport>,
}

/// Drive one master connection: authenticate, then loop servicing
/// `Spawn`/`Data`/`Exit`/`RemoteKill` until the socket closes.
async fn handle_connection(stream: tokio::net::TcpStream, config: Arc<RelayConfig>, cancel: CancellationToken) -> Result<(), DistioError> {
    let (read_half, write_half) = stream.into_split();
    let writer = Arc::new(Mutex::new(write_half));
    let mut reader = FrameReader::new(read_half);

    if !authenticate(&mut reader, &writer, &config).await? {
        return Ok(());
    }

    let children: Arc<Mutex<HashMap<u64, Child>>> = Arc::new(Mutex::new(HashMap::new()));

    let result = service_loop(&mut reader, Arc::clone(&writer), Arc::clone(&children), &config, &cancel).await;

    let close_timeout = config.close_timeout();
    let to_close: Vec<_> = children.lock().await.drain().collect();
    for (local_id, child) in to_close {
        info!("closing child {local_id} on connection teardown");
        let _ = tokio::time::timeout(close_timeout, child.transport.close(CloseMode::Graceful)).await;
    }
    result
}

async fn authenticate(
    reader: &mut FrameReader<tokio::net::tcp::OwnedReadHalf>,
    writer: &Arc<Mutex<OwnedWriteHalf>>,
    config: &RelayConfig,
) -> Result<bool, DistioError> {
    let body = match reader.read_frame().await? {
        Some(body) => body,
        None => return Ok(false),
    };
    let msg: RelayMessage = serde_json::from_slice(&body)
        .map_err(|e| DistioError::transport_with_source("malformed auth frame from master", e))?;
    let RelayMessage::Auth { user, pass, passphrase } = msg else {
        send(writer, &RelayMessage::AuthAck {
            ok: false,
            message: Some("expected auth as first message".to_string()),
        })
        .await?;
        return Ok(false);
    };

    match config.authenticate(user.as_deref(), pass.as_deref(), passphrase.as_deref()) {
        Ok(()) => {
            send(writer, &RelayMessage::AuthAck { ok: true, message: None }).await?;
            Ok(true)
        }
        Err(reason) => {
            send(writer, &RelayMessage::AuthAck { ok: false, message: Some(reason) }).await?;
            Ok(false)
        }
    }
}

async fn service_loop(
    reader: &mut FrameReader<tokio::net::tcp::OwnedReadHalf>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    children: Arc<Mutex<HashMap<u64, Child>>>,
    config: &RelayConfig,
    cancel: &CancellationToken,
) -> Result<(), DistioError> {
    loop {
        let body = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            frame = reader.read_frame() => frame?,
        };
        let Some(body) = body else {
            info!("master disconnected");
            return Ok(());
        };
        let msg: RelayMessage = match serde_json::from_slice(&body) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("dropping malformed relay message: {e}");
                continue;
            }
        };

        match msg {
            RelayMessage::Spawn { local_id, script } => {
                match ChildProcessTransport::open(&script, &[], config.handshake_timeout()).await {
                    Ok((transport, _child_local_id)) => {
                        let transport = Arc::new(transport);
                        children.lock().await.insert(local_id, Child { transport: Arc::clone(&transport) });
                        tokio::spawn(forward_child_to_master(local_id, transport, Arc::clone(&writer)));
                        send(&writer, &RelayMessage::SpawnAck { local_id, ok: true, message: None }).await?;
                        info!("relay spawned child {local_id} ({script:?})");
                    }
                    Err(e) => {
                        warn!("failed to spawn child {local_id} ({script:?}): {e}");
                        send(&writer, &RelayMessage::SpawnAck {
                            local_id,
                            ok: false,
                            message: Some(e.to_string()),
                        })
                        .await?;
                    }
                }
            }
            RelayMessage::Data { local_id, envelope } => {
                let transport = children.lock().await.get(&local_id).map(|c| Arc::clone(&c.transport));
                match transport {
                    Some(transport) => {
                        if let Err(e) = transport.send(envelope).await {
                            warn!("failed forwarding envelope to child {local_id}: {e}");
                        }
                    }
                    None => warn!("data for unknown local_id {local_id}, dropping"),
                }
            }
            RelayMessage::Exit { local_id } => {
                if let Some(child) = children.lock().await.remove(&local_id) {
                    let _ = tokio::time::timeout(config.close_timeout(), child.transport.close(CloseMode::Graceful)).await;
                    info!("relay exited child {local_id} on request");
                }
            }
            RelayMessage::RemoteKill { local_id, signal } => {
                let transport = children.lock().await.get(&local_id).map(|c| Arc::clone(&c.transport));
                match (transport, Signal::parse(&signal)) {
                    (Some(transport), Ok(signal)) => {
                        let envelope = Envelope::remote_kill(0, 0, signal);
                        if let Err(e) = transport.send(envelope).await {
                            warn!("failed forwarding REMOTE_KILL to child {local_id}: {e}");
                        }
                    }
                    (None, _) => warn!("remote_kill for unknown local_id {local_id}, dropping"),
                    (_, Err(e)) => warn!("refusing remote_kill with invalid signal {signal:?}: {e}"),
                }
            }
            other @ (RelayMessage::Auth { .. } | RelayMessage::AuthAck { .. } | RelayMessage::SpawnAck { .. }) => {
                warn!("ignoring out-of-place relay message: {other:?}");
            }
        }
    }
}

/// One task per spawned child: drain its envelopes and forward them to the
/// master, rewriting `sender_id` to the logical `local_id` the master
/// addresses it by.
async fn forward_child_to_master(local_id: u64, transport: Arc<ChildProcessTransport>, writer: Arc<Mutex<OwnedWriteHalf>>) {
    loop {
        let mut envelope = match transport.recv().await {
            Ok(envelope) => envelope,
            Err(e) => {
                info!("child {local_id} connection ended: {e}");
                return;
            }
        };
        envelope.meta.sender_id = local_id;
        if send(&writer, &RelayMessage::data(local_id, envelope)).await.is_err() {
            info!("master connection gone, stopping forwarder for child {local_id}");
            return;
        }
    }
}

async fn send(writer: &Arc<Mutex<OwnedWriteHalf>>, msg: &RelayMessage) -> Result<(), DistioError> {
    let body = serde_json::to_vec(msg).map_err(|e| DistioError::transport_with_source("failed to encode relay message", e))?;
    let mut writer = writer.lock().await;
    write_frame(&mut *writer, &body).await
}
