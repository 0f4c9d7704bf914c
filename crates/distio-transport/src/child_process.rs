//! Child-process transport: a full-duplex, length-prefixed frame stream over
//! a spawned worker's stdio.
//!
//! Grounded on the teacher's `McpTransport::spawn` (`atm-agent-mcp/src/
//! transport.rs`) for the `tokio::process::Command` setup, and on
//! `ProxyServer::run`'s background-reader-task + oneshot-per-request shape
//! (`atm-agent-mcp/src/proxy.rs`) for how incoming frames are drained
//! without blocking `send`.

use std::ffi::OsStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use distio_core::envelope::ReservedTask;
use distio_core::{DistioError, Envelope};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;

use crate::framing::{FrameReader, write_frame};
use crate::transport::{CloseMode, Transport};

/// A transport backed by a spawned child process's stdin/stdout.
pub struct ChildProcessTransport {
    stdin: Mutex<ChildStdin>,
    inbox: Mutex<mpsc::UnboundedReceiver<Envelope>>,
    process: Mutex<Option<Child>>,
    closed: AtomicBool,
}

impl ChildProcessTransport {
    /// Spawn `program` and perform the handshake: send `NULL` with a nonce,
    /// wait for an `ACK` echoing the same nonce and carrying the child's
    /// declared `local_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DistioError::TransportError`] if the process cannot be
    /// spawned or its stdio cannot be piped, and
    /// [`DistioError::HandshakeTimeout`] if no matching `ACK` arrives within
    /// `handshake_timeout`.
    pub async fn open(
        program: impl AsRef<OsStr>,
        args: &[&str],
        handshake_timeout: Duration,
    ) -> Result<(Self, u64), DistioError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit());

        let mut child = cmd
            .spawn()
            .map_err(|e| DistioError::transport_with_source("failed to spawn child slave", e))?;

        let stdin = child
            .stdin
            .take()
            .expect("child stdin must be piped, spawn configured it above");
        let stdout = child
            .stdout
            .take()
            .expect("child stdout must be piped, spawn configured it above");

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(read_loop(stdout, tx));

        let transport = Self {
            stdin: Mutex::new(stdin),
            inbox: Mutex::new(rx),
            process: Mutex::new(Some(child)),
            closed: AtomicBool::new(false),
        };

        let nonce = uuid::Uuid::new_v4().to_string();
        let hello = Envelope::null(0, 0, nonce.clone());
        transport.write_envelope(&hello).await?;

        let local_id = match timeout(handshake_timeout, transport.await_ack(&nonce)).await {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(DistioError::HandshakeTimeout {
                    elapsed_ms: handshake_timeout.as_millis() as u64,
                });
            }
        };

        Ok((transport, local_id))
    }

    async fn write_envelope(&self, envelope: &Envelope) -> Result<(), DistioError> {
        let body = distio_core::codec::encode_envelope(envelope)?;
        let mut stdin = self.stdin.lock().await;
        write_frame(&mut *stdin, &body).await
    }

    /// Drain the inbox until an `ACK` whose payload echoes `nonce` appears,
    /// and pull the child's declared `local_id` out of it.
    async fn await_ack(&self, nonce: &str) -> Result<u64, DistioError> {
        let mut inbox = self.inbox.lock().await;
        loop {
            let envelope = inbox
                .recv()
                .await
                .ok_or_else(|| DistioError::transport("child closed stdout before handshake ack"))?;
            if envelope.task_name != ReservedTask::ACK {
                continue;
            }
            let echoed_nonce = envelope.payload.get("nonce").and_then(|v| v.as_str());
            if echoed_nonce != Some(nonce) {
                continue;
            }
            let local_id = envelope
                .payload
                .get("local_id")
                .and_then(|v| v.as_u64())
                .ok_or_else(|| DistioError::transport("handshake ack missing local_id"))?;
            return Ok(local_id);
        }
    }
}

async fn read_loop(stdout: tokio::process::ChildStdout, tx: mpsc::UnboundedSender<Envelope>) {
    let mut reader = FrameReader::new(stdout);
    loop {
        match reader.read_frame().await {
            Ok(Some(body)) => match distio_core::codec::decode_envelope(&body) {
                Ok(envelope) => {
                    if tx.send(envelope).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("dropping malformed envelope from child stdout: {e}");
                }
            },
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("child stdout read error, closing transport: {e}");
                break;
            }
        }
    }
}

#[async_trait]
impl Transport for ChildProcessTransport {
    async fn send(&self, envelope: Envelope) -> Result<(), DistioError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DistioError::transport("transport closed"));
        }
        self.write_envelope(&envelope).await
    }

    async fn recv(&self) -> Result<Envelope, DistioError> {
        let mut inbox = self.inbox.lock().await;
        inbox
            .recv()
            .await
            .ok_or_else(|| DistioError::transport("child slave connection lost"))
    }

    async fn close(&self, mode: CloseMode) -> Result<(), DistioError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match mode {
            CloseMode::Graceful => {
                // Drop stdin to signal EOF, give the child a moment to flush
                // and exit on its own before force-killing it.
                {
                    let mut stdin = self.stdin.lock().await;
                    let _ = stdin.shutdown().await;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
                if let Some(mut child) = self.process.lock().await.take()
                    && child.try_wait().ok().flatten().is_none()
                {
                    let _ = child.kill().await;
                }
            }
            CloseMode::Force => {
                if let Some(mut child) = self.process.lock().await.take() {
                    let _ = child.kill().await;
                }
            }
        }
        Ok(())
    }
}
