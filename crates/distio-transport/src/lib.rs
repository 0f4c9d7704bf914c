//! Transport adapters implementing the [`Transport`] trait: a child-process
//! stdio pipe, a multiplexed relay TCP socket, and an in-process channel pair
//! for tests.
//!
//! All three present identical semantics to `distio-master`'s slave handle:
//! ordered delivery within one session, and a [`distio_core::DistioError`]
//! from `recv`/`send` once the underlying connection is gone rather than a
//! silent hang.

pub mod address;
pub mod child_process;
pub mod framing;
pub mod in_process;
pub mod relay_client;
pub mod relay_protocol;
pub mod transport;

pub use address::HostAddress;
pub use child_process::ChildProcessTransport;
pub use in_process::InProcessTransport;
pub use relay_client::{RelayConnection, RelayTransport};
pub use relay_protocol::RelayMessage;
pub use transport::{CloseMode, Transport};
