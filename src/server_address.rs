//! Addresses as the caller supplies them, before any resolution happens.

use std::{
    fmt::Display,
    net::{AddrParseError, IpAddr, SocketAddr},
    str::FromStr,
};

use crate::error::CoreError;

/// Port a Call of Duty dedicated server listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 28960;

/// A host (name or IP literal) and port. Nothing guarantees the host resolves.
///
/// # Examples
///
/// `ServerAddress` implements TryFrom<&str>, so you can use it like this:
/// ```
/// use cod_rcon::ServerAddress;
///
/// let addr = ServerAddress::try_from("cod.example.com:28961").unwrap();
/// assert_eq!(addr.host, "cod.example.com");
/// assert_eq!(addr.port, 28961);
///
/// let addr = ServerAddress::try_from("10.0.0.5").unwrap();
/// assert_eq!(addr.port, 28960);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: &str, port: u16) -> Self {
        ServerAddress {
            host: host.trim().to_string(),
            port,
        }
    }

    /// Host must be non-empty and the port in 1..=65535.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.host.is_empty() {
            return Err(CoreError::InvalidInput("IP/Hostname not provided".into()));
        }
        if self.port == 0 {
            return Err(CoreError::InvalidInput(
                "Invalid port number. Must be between 1 and 65535.".into(),
            ));
        }
        Ok(())
    }
}

impl<'a> TryFrom<&'a str> for ServerAddress {
    type Error = CoreError;

    /// Parse `host:port`; the port is optional and defaults to [`DEFAULT_PORT`].
    fn try_from(string: &str) -> Result<Self, Self::Error> {
        let string = string.trim();
        if string.is_empty() {
            return Err(CoreError::InvalidInput("Empty address".into()));
        }

        // bracketed or bare IPv6 literals carry colons of their own
        let address = if let Ok(addr) = SocketAddr::from_str(string) {
            addr.into()
        } else if let Ok(ip) = IpAddr::from_str(string) {
            ServerAddress::new(&ip.to_string(), DEFAULT_PORT)
        } else {
            let mut parts = string.splitn(2, ':');
            let host = parts.next().unwrap_or_default();
            let port = match parts.next() {
                Some(port) => u16::from_str(port.trim()).map_err(|_| {
                    CoreError::InvalidInput(format!("Invalid port specified: {port}"))
                })?,
                None => DEFAULT_PORT,
            };
            ServerAddress::new(host, port)
        };

        address.validate()?;
        Ok(address)
    }
}

impl From<SocketAddr> for ServerAddress {
    /// The resolver recognizes the IP literal and skips DNS entirely.
    fn from(addr: SocketAddr) -> Self {
        ServerAddress {
            host: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}

impl TryFrom<ServerAddress> for SocketAddr {
    type Error = AddrParseError;

    /// Only works when the host is already an IP literal.
    fn try_from(addr: ServerAddress) -> Result<Self, Self::Error> {
        let ip = IpAddr::from_str(&addr.host)?;
        Ok(SocketAddr::new(ip, addr.port))
    }
}

impl Display for ServerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
