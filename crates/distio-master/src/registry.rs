//! [`SlaveRegistry`] — the process-wide directory of slaves by id and group.
//!
//! An explicit, user-constructed owning value rather than a global
//! singleton, so an application can hold multiple independent registries
//! (or none) without sharing hidden process-wide state.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use distio_core::DistioError;
use distio_transport::{ChildProcessTransport, InProcessTransport, RelayConnection};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::slave::SlaveHandle;

/// Tunables for slave lifecycle management.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// How long a child-process or relay handshake may take before the
    /// attempt fails with `HandshakeTimeout`.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Grace period `close_all` gives each slave's `EXIT`/`ACK` round trip
    /// before force-closing its transport.
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
}

fn default_handshake_timeout_ms() -> u64 {
    5_000
}

fn default_close_timeout_ms() -> u64 {
    3_000
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: default_handshake_timeout_ms(),
            close_timeout_ms: default_close_timeout_ms(),
        }
    }
}

impl RegistryConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

/// Where to reach a remote relay when creating relayed slaves.
#[derive(Debug, Clone)]
pub struct RemoteTarget {
    pub host: distio_transport::HostAddress,
    pub script: String,
    pub passphrase: Option<String>,
}

/// Process-wide directory of slaves, keyed by a single monotonically
/// increasing id counter. Owned explicitly by the caller's program, never a
/// static singleton.
pub struct SlaveRegistry {
    config: RegistryConfig,
    next_id: AtomicU64,
    slaves: tokio::sync::RwLock<HashMap<u64, Arc<SlaveHandle>>>,
    groups: tokio::sync::RwLock<HashMap<String, Vec<u64>>>,
}

impl SlaveRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(1),
            slaves: tokio::sync::RwLock::new(HashMap::new()),
            groups: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn register(&self, handle: Arc<SlaveHandle>, group: Option<&str>) {
        let id = handle.id;
        self.slaves.write().await.insert(id, Arc::clone(&handle));
        if let Some(group) = group {
            self.groups.write().await.entry(group.to_string()).or_default().push(id);
        }
    }

    /// Spawn `count` local child-process slaves running `script`, handshake
    /// each, and register them under `group` (if given).
    ///
    /// # Errors
    ///
    /// Returns [`DistioError::HandshakeTimeout`] or
    /// [`DistioError::TransportError`] if any spawn/handshake fails; slaves
    /// spawned before the failing one remain registered.
    pub async fn create_local(&self, script: &str, count: usize, group: Option<&str>) -> Result<Vec<Arc<SlaveHandle>>, DistioError> {
        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            let id = self.allocate_id();
            let (transport, local_id) = ChildProcessTransport::open(script, &[], self.config.handshake_timeout()).await?;
            let handle = SlaveHandle::new(id, local_id, group.map(str::to_string), false, Arc::new(transport));
            self.register(Arc::clone(&handle), group).await;
            info!("registered local slave {id} (local_id {local_id}) from {script:?}");
            created.push(handle);
        }
        Ok(created)
    }

    /// Create an in-process (loopback) slave out of an already-opened
    /// transport, skipping the handshake — used for tests and the
    /// in-process transport variant, which has no separate handshake phase.
    pub async fn register_in_process(&self, transport: InProcessTransport, group: Option<&str>) -> Arc<SlaveHandle> {
        let id = self.allocate_id();
        let handle = SlaveHandle::new(id, id, group.map(str::to_string), false, Arc::new(transport));
        self.register(Arc::clone(&handle), group).await;
        handle
    }

    /// Connect to a relay, spawn `count` children on its host, and register
    /// one slave per spawned child under `group`.
    ///
    /// # Errors
    ///
    /// Returns [`DistioError::TransportError`] on connection or relay-side
    /// spawn failure.
    pub async fn create_remote(&self, count: usize, target: RemoteTarget, group: Option<&str>) -> Result<Vec<Arc<SlaveHandle>>, DistioError> {
        let conn = Arc::new(RelayConnection::connect(&target.host, target.passphrase.clone()).await?);
        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            let id = self.allocate_id();
            conn.spawn(id, target.script.clone()).await?;
            let transport = conn.transport_for(id);
            let handle = SlaveHandle::new(id, id, group.map(str::to_string), true, Arc::new(transport));
            self.register(Arc::clone(&handle), group).await;
            info!("registered remote slave {id} via relay {}", target.host.socket_addr_string());
            created.push(handle);
        }
        Ok(created)
    }

    pub async fn by_id(&self, id: u64) -> Option<Arc<SlaveHandle>> {
        self.slaves.read().await.get(&id).cloned()
    }

    pub async fn by_group(&self, group: &str) -> Vec<Arc<SlaveHandle>> {
        let groups = self.groups.read().await;
        let Some(ids) = groups.get(group) else {
            return Vec::new();
        };
        let slaves = self.slaves.read().await;
        ids.iter().filter_map(|id| slaves.get(id).cloned()).collect()
    }

    pub async fn all(&self) -> Vec<Arc<SlaveHandle>> {
        self.slaves.read().await.values().cloned().collect()
    }

    /// Fan an `EXIT` to every registered non-`Closed` slave and wait for
    /// each to reach `Closed` (or its individual close timeout to elapse).
    ///
    /// Idempotent: calling `close_all` again once every slave is already
    /// `Closed` returns immediately.
    pub async fn close_all(&self) {
        let handles: Vec<_> = self.slaves.read().await.values().cloned().collect();
        let timeout = self.config.close_timeout();
        let closes = handles.into_iter().map(|h| async move {
            if !matches!(h.state().await, crate::slave::SlaveState::Closed) {
                let _ = h.close(timeout).await;
            }
        });
        futures_util::future::join_all(closes).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registers_in_process_slave_and_finds_it_by_id() {
        let registry = SlaveRegistry::new(RegistryConfig::default());
        let (a, _b) = InProcessTransport::pair();
        let handle = registry.register_in_process(a, Some("workers")).await;
        assert_eq!(registry.by_id(handle.id).await.unwrap().id, handle.id);
        assert_eq!(registry.by_group("workers").await.len(), 1);
        assert!(registry.by_group("nope").await.is_empty());
    }

    #[tokio::test]
    async fn ids_are_strictly_increasing() {
        let registry = SlaveRegistry::new(RegistryConfig::default());
        let (a1, _b1) = InProcessTransport::pair();
        let (a2, _b2) = InProcessTransport::pair();
        let h1 = registry.register_in_process(a1, None).await;
        let h2 = registry.register_in_process(a2, None).await;
        assert!(h2.id > h1.id);
    }

    #[tokio::test]
    async fn close_all_is_idempotent() {
        let registry = SlaveRegistry::new(RegistryConfig::default());
        let (a, _b) = InProcessTransport::pair();
        registry.register_in_process(a, None).await;
        registry.close_all().await;
        registry.close_all().await;
        for slave in registry.all().await {
            assert!(matches!(slave.state().await, crate::slave::SlaveState::Closed));
        }
    }
}
