//! The closed set of POSIX signal names accepted by `REMOTE_KILL`.

use crate::error::DistioError;

/// A signal name accepted by `REMOTE_KILL`. Exactly the set named in the
/// wire contract — any other name fails the caller before transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Sigint,
    Sigkill,
    Sigterm,
    Sigbreak,
    Sigstop,
    Sighup,
}

impl Signal {
    /// The canonical wire name, e.g. `"SIGKILL"`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sigint => "SIGINT",
            Self::Sigkill => "SIGKILL",
            Self::Sigterm => "SIGTERM",
            Self::Sigbreak => "SIGBREAK",
            Self::Sigstop => "SIGSTOP",
            Self::Sighup => "SIGHUP",
        }
    }

    /// Parse a signal name, rejecting anything outside the accepted set.
    ///
    /// # Errors
    ///
    /// Returns [`DistioError::InvalidArgument`] for any name not in
    /// `{SIGINT, SIGKILL, SIGTERM, SIGBREAK, SIGSTOP, SIGHUP}`.
    pub fn parse(name: &str) -> Result<Self, DistioError> {
        match name {
            "SIGINT" => Ok(Self::Sigint),
            "SIGKILL" => Ok(Self::Sigkill),
            "SIGTERM" => Ok(Self::Sigterm),
            "SIGBREAK" => Ok(Self::Sigbreak),
            "SIGSTOP" => Ok(Self::Sigstop),
            "SIGHUP" => Ok(Self::Sighup),
            other => Err(DistioError::invalid_argument(format!(
                "unrecognized signal {other:?}; accepted signals are SIGINT, SIGKILL, SIGTERM, SIGBREAK, SIGSTOP, SIGHUP"
            ))),
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_exactly_the_six_named_signals() {
        for name in ["SIGINT", "SIGKILL", "SIGTERM", "SIGBREAK", "SIGSTOP", "SIGHUP"] {
            assert_eq!(Signal::parse(name).unwrap().name(), name);
        }
    }

    #[test]
    fn rejects_unknown_signal() {
        let err = Signal::parse("SIGFOO").unwrap_err();
        assert!(matches!(err, DistioError::InvalidArgument { .. }));
    }
}
