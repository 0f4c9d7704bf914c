//! Slave lifecycle and the four dispatch composers (Tell, Scatter, Workpool,
//! Pipeline) built atop one request/response primitive, `SlaveHandle::dispatch`.
//!
//! `distio-master` knows nothing about how bytes actually move (that's
//! `distio-transport`) or about wire framing (`distio-core`) — it owns the
//! pending-request bookkeeping, the registry of slaves by id/group, and the
//! composition engines layered on top.

pub mod dispatch;
pub mod pipeline;
pub mod registry;
pub mod scatter;
pub mod slave;
pub mod workpool;

pub use dispatch::{Tell, TellOutcome, TellTarget, tell};
pub use pipeline::{Interceptor, Pipeline, Stage};
pub use registry::{RegistryConfig, RemoteTarget, SlaveRegistry};
pub use scatter::{ScatterBuilder, ScatterWithData, scatter};
pub use slave::{SlaveHandle, SlaveState};
pub use workpool::Workpool;
