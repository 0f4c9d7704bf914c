//! A relay server: a host that accepts master connections over TCP, forks
//! child-process slaves on its own machine on their behalf, and bridges
//! envelopes between the two, so a master can run remote slaves without an
//! SSH-shaped deployment story.

pub mod config;
pub mod server;

pub use config::RelayConfig;
