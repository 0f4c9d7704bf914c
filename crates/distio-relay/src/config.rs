//! [`RelayConfig`] — relay server tunables, following the teacher's
//! layering convention (flags > env > file > defaults) scoped down to what
//! `SPEC_FULL.md` §6/§11 actually needs.

use serde::{Deserialize, Serialize};

/// Relay server configuration: listen port, optional shared passphrase, and
/// an optional HTTP-basic-style credential pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub basic_auth: Option<(String, String)>,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
}

fn default_port() -> u16 {
    distio_core::DEFAULT_RELAY_PORT
}

fn default_handshake_timeout_ms() -> u64 {
    5_000
}

fn default_close_timeout_ms() -> u64 {
    3_000
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            passphrase: None,
            basic_auth: None,
            handshake_timeout_ms: default_handshake_timeout_ms(),
            close_timeout_ms: default_close_timeout_ms(),
        }
    }
}

impl RelayConfig {
    pub fn handshake_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn close_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.close_timeout_ms)
    }

    /// Validate a connecting master's [`distio_transport::RelayMessage::Auth`]
    /// fields against this config. An anonymous relay (no passphrase, no
    /// basic-auth configured) accepts every connection.
    pub fn authenticate(&self, user: Option<&str>, pass: Option<&str>, passphrase: Option<&str>) -> Result<(), String> {
        if let Some(expected) = &self.passphrase
            && passphrase != Some(expected.as_str())
        {
            return Err("passphrase mismatch".to_string());
        }
        if let Some((expected_user, expected_pass)) = &self.basic_auth
            && (user != Some(expected_user.as_str()) || pass != Some(expected_pass.as_str()))
        {
            return Err("credential mismatch".to_string());
        }
        Ok(())
    }
}
