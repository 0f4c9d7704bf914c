//! Wire envelope, codec, and shared data model for distio.
//!
//! `distio-core` has no knowledge of sockets, child processes, or async
//! runtimes. It defines:
//!
//! - [`Envelope`], the single unit of transport (request, response, control,
//!   ack, exit) carried by every transport adapter.
//! - [`codec`], pure (no I/O) functions that encode an envelope to bytes and
//!   parse envelopes back out of a length-prefixed byte stream.
//! - [`Response`] and [`ResponseArray`], the observable result of a dispatch
//!   and the ordered collection produced by multi-target composers.
//! - [`DistioError`], the error taxonomy shared by every higher layer.
//! - [`Signal`], the closed set of POSIX signal names accepted by
//!   `REMOTE_KILL`.

pub mod codec;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod response;
pub mod signal;
pub mod task_result;

pub use envelope::{Envelope, EnvelopeKind, Meta, ReservedTask};
pub use error::DistioError;
pub use response::{Response, ResponseArray, SortOrder};
pub use signal::Signal;
pub use task_result::TaskResult;

/// Default relay TCP port, per the host-address grammar (`host:port`, missing
/// port defaults here).
pub const DEFAULT_RELAY_PORT: u16 = 1337;
