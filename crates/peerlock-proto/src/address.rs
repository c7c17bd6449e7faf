//! Reachable node addresses.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Host and port a node listens on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerAddress {
    /// Hostname or IP literal
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl PeerAddress {
    /// Create an address from its parts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Failure to parse a `host:port` string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    /// No `:port` suffix
    #[error("missing port in address {0:?}")]
    MissingPort(String),
    /// Empty host part
    #[error("missing host in address {0:?}")]
    MissingHost(String),
    /// Port is not a valid u16
    #[error("invalid port in address {0:?}")]
    InvalidPort(String),
}

impl FromStr for PeerAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) =
            s.rsplit_once(':').ok_or_else(|| AddressParseError::MissingPort(s.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(AddressParseError::MissingHost(s.to_string()));
        }
        let port = port.parse().map_err(|_| AddressParseError::InvalidPort(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}
