//! Proxy handshake interface.
//!
//! Before a tunnel stream is framed, the local side learns where the client
//! wants to go (HTTP CONNECT, SOCKS, transparent redirect). Those protocols
//! live outside this crate; they plug in through [`Handshake`] and report
//! failures as [`HandshakeError`], kept distinct from framing errors.

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::str::FromStr;
use thiserror::Error;

/// Longest domain name a SOCKS address can carry.
pub const MAX_DOMAIN_LEN: usize = 255;

#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("Malformed handshake: {0}")]
    Malformed(String),
    #[error("Unsupported request: {0}")]
    Unsupported(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Destination requested by the client.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TargetAddr {
    Ip(SocketAddr),
    Domain(String, u16),
}

impl TargetAddr {
    pub fn port(&self) -> u16 {
        match self {
            Self::Ip(addr) => addr.port(),
            Self::Domain(_, port) => *port,
        }
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip(addr) => write!(f, "{}", addr),
            Self::Domain(host, port) => write!(f, "{}:{}", host, port),
        }
    }
}

impl FromStr for TargetAddr {
    type Err = HandshakeError;

    /// Parse `host:port`, `a.b.c.d:port` or `[v6]:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(Self::Ip(addr));
        }
        let malformed = || HandshakeError::Malformed(format!("invalid address: {}", s));
        let (host, port) = s.rsplit_once(':').ok_or_else(malformed)?;
        if host.is_empty()
            || host.len() > MAX_DOMAIN_LEN
            || host.contains(':')
            || host.starts_with('[')
        {
            return Err(malformed());
        }
        let port = port.parse::<u16>().map_err(|_| malformed())?;
        Ok(Self::Domain(host.to_string(), port))
    }
}

/// Result of a successful handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeOutcome {
    pub target: TargetAddr,
    /// Bytes already consumed from the client that must be forwarded
    /// before raw relaying begins (e.g. a plain HTTP proxy request).
    pub pending: Vec<u8>,
}

impl HandshakeOutcome {
    pub fn new(target: TargetAddr) -> Self {
        Self {
            target,
            pending: Vec::new(),
        }
    }
}

/// Client-facing handshake run on stream `S` before tunnelling.
///
/// On success the stream must be positioned right after the handshake
/// bytes; anything read past them goes into [`HandshakeOutcome::pending`].
pub trait Handshake<S>: Send + Sync {
    fn handshake(
        &self,
        stream: &mut S,
    ) -> impl Future<Output = Result<HandshakeOutcome, HandshakeError>> + Send;
}
