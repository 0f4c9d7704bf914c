//! Integration coverage for slave lifecycle through the registry, using
//! `InProcessTransport` exclusively (no real sockets or child processes),
//! the same way the teacher's bridge tests stay off real I/O with
//! `MockTransport`.

use std::time::Duration;

use distio_core::DistioError;
use distio_master::{RegistryConfig, SlaveRegistry, SlaveState};
use distio_transport::{InProcessTransport, Transport};

#[tokio::test]
async fn close_cancels_pending_dispatch_and_rejects_further_ones() {
    let registry = SlaveRegistry::new(RegistryConfig::default());
    let (master_side, slave_side) = InProcessTransport::pair();
    // A peer that never replies, to exercise a dispatch that is still
    // pending when the handle is force-closed.
    drop(slave_side);

    let handle = registry.register_in_process(master_side, None).await;

    // The peer was already dropped, so the dispatch surfaces a transport
    // error once the reader loop observes the dead connection, rather than
    // hanging forever.
    let err = handle.dispatch("echo", serde_json::json!(1)).await.unwrap_err();
    assert!(matches!(err, DistioError::TransportError { .. }));

    let err = handle.dispatch("echo", serde_json::json!(1)).await.unwrap_err();
    assert!(matches!(err, DistioError::InvalidState { .. }));
}

#[tokio::test]
async fn registry_close_all_settles_every_slave() {
    let registry = SlaveRegistry::new(RegistryConfig::default());
    for _ in 0..3 {
        let (master_side, _slave_side) = InProcessTransport::pair();
        registry.register_in_process(master_side, Some("fleet")).await;
    }

    assert_eq!(registry.by_group("fleet").await.len(), 3);
    registry.close_all().await;

    for slave in registry.all().await {
        assert!(matches!(slave.state().await, SlaveState::Closed));
    }
}

#[tokio::test]
async fn remote_kill_rejects_unknown_signal_before_transmission() {
    let registry = SlaveRegistry::new(RegistryConfig::default());
    let (master_side, slave_side) = InProcessTransport::pair();
    let handle = registry.register_in_process(master_side, None).await;

    let err = handle.remote_kill("SIGFOO").await.unwrap_err();
    assert!(matches!(err, DistioError::InvalidArgument { .. }));

    // A rejected signal name must never reach the wire.
    let got_envelope = tokio::time::timeout(Duration::from_millis(20), slave_side.recv()).await;
    assert!(got_envelope.is_err(), "remote_kill with a bad signal must not transmit");
}

#[tokio::test]
async fn remote_kill_transmits_a_valid_signal() {
    let registry = SlaveRegistry::new(RegistryConfig::default());
    let (master_side, slave_side) = InProcessTransport::pair();
    let handle = registry.register_in_process(master_side, None).await;

    handle.remote_kill("SIGKILL").await.unwrap();

    let envelope = slave_side.recv().await.unwrap();
    assert_eq!(envelope.meta.signal.as_deref(), Some("SIGKILL"));
}

#[tokio::test]
async fn dispatch_timeout_is_the_callers_responsibility() {
    let registry = SlaveRegistry::new(RegistryConfig::default());
    let (master_side, _slave_side) = InProcessTransport::pair();
    let handle = registry.register_in_process(master_side, None).await;

    let result = tokio::time::timeout(Duration::from_millis(50), handle.dispatch("echo", serde_json::json!(1))).await;
    assert!(result.is_err(), "dispatch has no built-in timeout; the core never resolves it on its own");

    handle.close(Duration::from_millis(50)).await.unwrap();
}
