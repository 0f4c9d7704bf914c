//! Minimal slave-side task runtime: a name-to-handler map plus the reserved
//! control-frame responses (`ACK`/`EXIT`/`REMOTE_KILL`/`NULL`) a slave must
//! implement to be dispatchable at all.
//!
//! `SPEC_FULL.md` treats "user task registration ergonomics inside the slave
//! binary" as an external collaborator — this crate provides only the
//! smallest surface needed to exercise the dispatch core end to end (the
//! child-process handshake, a Tell/Scatter/Workpool/Pipeline round trip, and
//! the relay's bridged child lifecycle), not a batteries-included slave SDK.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use distio_core::envelope::ReservedTask;
use distio_core::{DistioError, Envelope, EnvelopeKind, Signal, TaskResult};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use distio_transport::framing::{FrameReader, write_frame};

/// The future a [`TaskHandler`] returns.
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<serde_json::Value, DistioError>> + Send>>;

/// A registered task handler: takes the request payload, returns a future
/// resolving to the task's result.
pub type TaskHandler = Arc<dyn Fn(serde_json::Value) -> TaskFuture + Send + Sync>;

/// The slave-side task runtime: a handler map plus the control-frame loop
/// that drives one child-process or relay-bridged session.
#[derive(Clone)]
pub struct SlaveRuntime {
    local_id: u64,
    handlers: HashMap<String, TaskHandler>,
}

impl SlaveRuntime {
    pub fn new(local_id: u64) -> Self {
        Self {
            local_id,
            handlers: HashMap::new(),
        }
    }

    /// Register a task handler under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`DistioError::InvalidArgument`] if `name` collides with a
    /// reserved task symbol (`EXIT`, `NULL`, `ACK`, `REMOTE_KILL`).
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, handler: F) -> Result<(), DistioError>
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, DistioError>> + Send + 'static,
    {
        let name = name.into();
        if ReservedTask::is_reserved(&name) {
            return Err(DistioError::invalid_argument(format!(
                "{name:?} is a reserved task name and cannot be registered as a user task"
            )));
        }
        self.handlers.insert(name, Arc::new(move |payload| Box::pin(handler(payload))));
        Ok(())
    }

    /// Serve one session over `stdin`/`stdout`: perform the handshake, then
    /// dispatch incoming requests to registered handlers until `EXIT` or a
    /// terminal `REMOTE_KILL`.
    ///
    /// # Errors
    ///
    /// Returns [`DistioError::TransportError`] on an I/O failure or EOF
    /// before a clean `EXIT`. Malformed frames are dropped with a warning,
    /// per the wire contract — they never tear the session down.
    pub async fn serve<R, W>(&self, stdin: R, mut stdout: W) -> Result<(), DistioError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = FrameReader::new(stdin);
        self.handshake(&mut reader, &mut stdout).await?;

        loop {
            let body = match reader.read_frame().await? {
                Some(body) => body,
                None => {
                    info!("upstream closed stdin, slave {} exiting", self.local_id);
                    return Ok(());
                }
            };
            let envelope = match distio_core::codec::decode_envelope(&body) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!("dropping malformed envelope: {e}");
                    continue;
                }
            };

            if envelope.kind != EnvelopeKind::Request && envelope.kind != EnvelopeKind::Exit && envelope.kind != EnvelopeKind::Control {
                debug!("ignoring non-request frame {:?}", envelope.kind);
                continue;
            }

            match envelope.task_name.as_str() {
                ReservedTask::EXIT => {
                    let ack = Envelope::ack(envelope.request_id, self.local_id, serde_json::json!(null));
                    self.write_envelope(&mut stdout, &ack).await?;
                    info!("slave {} received EXIT, shutting down", self.local_id);
                    return Ok(());
                }
                ReservedTask::NULL => {
                    let ack = Envelope::ack(envelope.request_id, self.local_id, envelope.payload.clone());
                    self.write_envelope(&mut stdout, &ack).await?;
                }
                ReservedTask::REMOTE_KILL => {
                    let ack = Envelope::ack(envelope.request_id, self.local_id, serde_json::json!(null));
                    self.write_envelope(&mut stdout, &ack).await?;
                    self.handle_remote_kill(&envelope);
                }
                task_name => {
                    let response = self.dispatch_task(task_name, envelope.payload.clone()).await;
                    let reply = Envelope::response(envelope.request_id, task_name, response.to_payload(), self.local_id);
                    self.write_envelope(&mut stdout, &reply).await?;
                }
            }
        }
    }

    async fn handshake<R, W>(&self, reader: &mut FrameReader<R>, stdout: &mut W) -> Result<(), DistioError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let body = reader
                .read_frame()
                .await?
                .ok_or_else(|| DistioError::transport("upstream closed stdin before handshake"))?;
            let envelope = match distio_core::codec::decode_envelope(&body) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!("dropping malformed handshake frame: {e}");
                    continue;
                }
            };
            if envelope.task_name != ReservedTask::NULL {
                warn!("ignoring non-handshake frame {:?} before handshake completed", envelope.task_name);
                continue;
            }
            let nonce = envelope.payload.clone();
            let ack = Envelope::ack(
                envelope.request_id,
                self.local_id,
                serde_json::json!({"nonce": nonce, "local_id": self.local_id}),
            );
            self.write_envelope(stdout, &ack).await?;
            return Ok(());
        }
    }

    async fn dispatch_task(&self, task_name: &str, payload: serde_json::Value) -> TaskResult {
        match self.handlers.get(task_name) {
            Some(handler) => handler(payload).await.into(),
            None => TaskResult::err("TaskError", format!("no handler registered for task {task_name:?}")),
        }
    }

    /// Self-signal with the requested POSIX signal. On non-Unix targets
    /// this is a no-op beyond logging, since there is no POSIX signal to
    /// deliver.
    fn handle_remote_kill(&self, envelope: &Envelope) {
        let Some(signal_name) = envelope.meta.signal.as_deref() else {
            warn!("REMOTE_KILL envelope missing signal name, ignoring");
            return;
        };
        match Signal::parse(signal_name) {
            Ok(signal) => {
                warn!("slave {} self-signalling {signal}", self.local_id);
                raise_signal(signal);
            }
            Err(e) => warn!("ignoring REMOTE_KILL with invalid signal: {e}"),
        }
    }

    async fn write_envelope<W: AsyncWrite + Unpin>(&self, writer: &mut W, envelope: &Envelope) -> Result<(), DistioError> {
        let body = distio_core::codec::encode_envelope(envelope)?;
        write_frame(writer, &body).await
    }
}

#[cfg(unix)]
fn raise_signal(signal: Signal) {
    let signum = match signal {
        Signal::Sigint => libc::SIGINT,
        Signal::Sigkill => libc::SIGKILL,
        Signal::Sigterm => libc::SIGTERM,
        Signal::Sigstop => libc::SIGSTOP,
        Signal::Sighup => libc::SIGHUP,
        // SIGBREAK has no POSIX equivalent; closest portable behavior on a
        // Unix build is to treat it like an interrupt.
        Signal::Sigbreak => libc::SIGINT,
    };
    unsafe {
        libc::raise(signum);
    }
}

#[cfg(not(unix))]
fn raise_signal(signal: Signal) {
    warn!("signal delivery ({signal}) is not implemented on this platform");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime_with_echo() -> SlaveRuntime {
        let mut runtime = SlaveRuntime::new(7);
        runtime
            .register("echo", |payload| async move { Ok(payload) })
            .unwrap();
        runtime
            .register("say hello", |_payload| async move { Ok(serde_json::json!("hello")) })
            .unwrap();
        runtime
    }

    #[test]
    fn registering_a_reserved_name_fails() {
        let mut runtime = SlaveRuntime::new(1);
        let err = runtime.register("EXIT", |p| async move { Ok(p) }).unwrap_err();
        assert!(matches!(err, DistioError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn unknown_task_name_returns_task_error_without_crashing() {
        let runtime = runtime_with_echo();
        let result = runtime.dispatch_task("no such task", serde_json::json!(null)).await;
        assert!(result.into_result().is_err());
    }

    #[tokio::test]
    async fn registered_handler_resolves_to_ok() {
        let runtime = runtime_with_echo();
        let result = runtime.dispatch_task("echo", serde_json::json!("hi")).await;
        assert_eq!(result.into_result().unwrap(), serde_json::json!("hi"));
    }

    #[tokio::test]
    async fn serve_handshakes_answers_requests_and_exits_cleanly() {
        let (slave_io, test_io) = tokio::io::duplex(4096);
        let (slave_read, slave_write) = tokio::io::split(slave_io);
        let (test_read, test_write) = tokio::io::split(test_io);

        let runtime = runtime_with_echo();
        let serve_task = tokio::spawn(async move { runtime.serve(slave_read, slave_write).await });

        let mut reader = FrameReader::new(test_read);
        let mut writer = test_write;

        let nonce = "nonce-123";
        let hello = Envelope::null(0, 0, nonce);
        write_frame(&mut writer, &distio_core::codec::encode_envelope(&hello).unwrap())
            .await
            .unwrap();
        let ack_bytes = reader.read_frame().await.unwrap().unwrap();
        let ack = distio_core::codec::decode_envelope(&ack_bytes).unwrap();
        assert_eq!(ack.payload.get("nonce").and_then(|v| v.as_str()), Some(nonce));
        assert_eq!(ack.payload.get("local_id").and_then(|v| v.as_u64()), Some(7));

        let req = Envelope::request(1, "say hello", serde_json::json!(null), 0);
        write_frame(&mut writer, &distio_core::codec::encode_envelope(&req).unwrap())
            .await
            .unwrap();
        let resp_bytes = reader.read_frame().await.unwrap().unwrap();
        let resp = distio_core::codec::decode_envelope(&resp_bytes).unwrap();
        let result = TaskResult::from_payload(&resp.payload).into_result().unwrap();
        assert_eq!(result, serde_json::json!("hello"));

        let exit = Envelope::exit(2, 0);
        write_frame(&mut writer, &distio_core::codec::encode_envelope(&exit).unwrap())
            .await
            .unwrap();
        let ack_bytes = reader.read_frame().await.unwrap().unwrap();
        let ack = distio_core::codec::decode_envelope(&ack_bytes).unwrap();
        assert_eq!(ack.kind, EnvelopeKind::Ack);

        serve_task.await.unwrap().unwrap();
    }
}
