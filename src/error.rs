use std::io;

use serde::Serialize;
use thiserror::Error;

/// Stable, machine-readable category of a [`CoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    ResolutionFailed,
    #[serde(rename = "network_error")]
    Network,
    Timeout,
    #[serde(rename = "protocol_error")]
    Protocol,
}

impl ErrorKind {
    /// `Timeout` is a distinguished kind of network failure, so both count here.
    pub fn is_network(self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Timeout)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unable to resolve hostname: {0}")]
    ResolutionFailed(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("no response: {0}")]
    Timeout(String),
    #[error("malformed response: {0}")]
    Protocol(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidInput(_) => ErrorKind::InvalidInput,
            CoreError::ResolutionFailed(_) => ErrorKind::ResolutionFailed,
            CoreError::Network(_) => ErrorKind::Network,
            CoreError::Timeout(_) => ErrorKind::Timeout,
            CoreError::Protocol(_) => ErrorKind::Protocol,
        }
    }

    /// Map a socket error into the taxonomy, prefixing it with what was being attempted.
    ///
    /// A refused or reset datagram means nobody is listening, which callers treat
    /// the same as silence.
    pub(crate) fn from_io(context: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset => CoreError::Timeout(format!("{context}: {err}")),
            _ => CoreError::Network(format!("{context}: {err}")),
        }
    }
}
