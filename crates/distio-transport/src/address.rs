//! Host-address grammar for the relay transport: `[user[:pass]@]host:port`.
//!
//! Grounded on the teacher's `config/bridge.rs::RemoteConfig` address field
//! (an SSH-style `user@host:port` string kept as an opaque field there) but
//! generalized here into an actually-parsed type, since the relay transport
//! needs the pieces separately to drive its auth frame.

use distio_core::{DEFAULT_RELAY_PORT, DistioError};

/// A parsed `[user[:pass]@]host:port` address.
///
/// Missing credentials mean an anonymous connection; a missing port falls
/// back to [`DEFAULT_RELAY_PORT`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAddress {
    pub user: Option<String>,
    pub pass: Option<String>,
    pub host: String,
    pub port: u16,
}

impl HostAddress {
    /// Parse a host address of the form `[user[:pass]@]host:port`.
    ///
    /// # Errors
    ///
    /// Returns [`DistioError::InvalidArgument`] if `host` is empty or `port`
    /// is not a valid `u16`.
    pub fn parse(raw: &str) -> Result<Self, DistioError> {
        let (credentials, host_port) = match raw.split_once('@') {
            Some((creds, rest)) => (Some(creds), rest),
            None => (None, raw),
        };

        let (user, pass) = match credentials {
            Some(creds) => match creds.split_once(':') {
                Some((u, p)) => (Some(u.to_string()), Some(p.to_string())),
                None => (Some(creds.to_string()), None),
            },
            None => (None, None),
        };

        let (host, port) = match host_port.split_once(':') {
            Some((h, p)) => {
                let port: u16 = p.parse().map_err(|_| {
                    DistioError::invalid_argument(format!("invalid port in host address {raw:?}"))
                })?;
                (h.to_string(), port)
            }
            None => (host_port.to_string(), DEFAULT_RELAY_PORT),
        };

        if host.is_empty() {
            return Err(DistioError::invalid_argument(format!(
                "host address {raw:?} is missing a host"
            )));
        }

        Ok(Self { user, pass, host, port })
    }

    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_anonymous(&self) -> bool {
        self.user.is_none() && self.pass.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_and_port() {
        let addr = HostAddress::parse("worker.internal:9000").unwrap();
        assert_eq!(addr.host, "worker.internal");
        assert_eq!(addr.port, 9000);
        assert!(addr.is_anonymous());
    }

    #[test]
    fn missing_port_defaults_to_1337() {
        let addr = HostAddress::parse("worker.internal").unwrap();
        assert_eq!(addr.port, DEFAULT_RELAY_PORT);
    }

    #[test]
    fn user_and_pass_are_parsed() {
        let addr = HostAddress::parse("alice:s3cret@worker.internal:1337").unwrap();
        assert_eq!(addr.user.as_deref(), Some("alice"));
        assert_eq!(addr.pass.as_deref(), Some("s3cret"));
        assert_eq!(addr.host, "worker.internal");
        assert_eq!(addr.port, 1337);
    }

    #[test]
    fn user_without_pass() {
        let addr = HostAddress::parse("alice@worker.internal:1337").unwrap();
        assert_eq!(addr.user.as_deref(), Some("alice"));
        assert_eq!(addr.pass, None);
    }

    #[test]
    fn empty_host_is_rejected() {
        assert!(HostAddress::parse(":1337").is_err());
    }

    #[test]
    fn malformed_port_is_rejected() {
        assert!(HostAddress::parse("worker.internal:notaport").is_err());
    }
}
