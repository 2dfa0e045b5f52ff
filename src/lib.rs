//! # Tunnel AEAD
//!
//! **Obfuscated, authenticated, replay-resistant framing for proxy tunnels.**
//!
//! Every message on the wire is self-describing and independently verifiable:
//!
//! ```text
//! [salt: 16|32][padding: 16..=31][ AEAD( timestamp: 4 || payload ) ][tag: 16]
//! ```
//!
//! - The **salt** is fresh randomness per message. It selects the per-message
//!   AEAD subkey and is the replay-cache key.
//! - The **padding** is `HMAC-SHA256(key, salt)` truncated to a length derived
//!   from the same hash. It travels in clear and lets a receiver reject
//!   garbage or probing traffic before paying for decryption.
//! - The **timestamp** is sealed with the payload and must be within
//!   ±120 seconds of the receiver's clock.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tunnel_aead::crypto::{AeadCipher, CipherKind, ReplayCache};
//! use tunnel_aead::transport::PacketCodec;
//!
//! let cipher = Arc::new(AeadCipher::new(CipherKind::ChaCha20Poly1305, &[0x42u8; 32]).unwrap());
//!
//! // Each endpoint owns its replay cache. A sender records its own salts, so
//! // its traffic reflected back at it is rejected.
//! let client = PacketCodec::new(cipher.clone(), Arc::new(ReplayCache::default()));
//! let server = PacketCodec::new(cipher, Arc::new(ReplayCache::default()));
//!
//! let packet = client.pack_to_vec(b"ping").unwrap();
//! assert_eq!(server.unpack_to_vec(&packet).unwrap(), b"ping");
//! // A second delivery of the same bytes is a replay.
//! assert!(server.unpack_to_vec(&packet).is_err());
//! assert!(client.unpack_to_vec(&packet).is_err());
//! ```
//!
//! ## Architecture
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`crypto`] | Padding/timestamp framing, salt replay cache, cipher suites |
//! | [`transport`] | Packet codec, UDP socket wrapper, stream framing |
//! | [`handshake`] | Interface for the proxy handshake collaborator |
//! | [`config`] | Cipher suite, shared key and replay-cache settings |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `native` | Yes | tokio-based datagram socket, stream framing and handshake interface |

#![allow(
    clippy::empty_line_after_doc_comments,
    clippy::doc_lazy_continuation,
    clippy::type_complexity
)]

// ── Public modules ──────────────────────────────────────────────────────────

/// Framing primitives, replay cache and keyed-AEAD cipher suites.
pub mod crypto;

/// Packet codec, datagram socket wrapper and stream framing.
pub mod transport;

/// Proxy handshake collaborator interface.
#[cfg(feature = "native")]
pub mod handshake;

/// Tunnel configuration.
pub mod config;

// ── Re-exports for convenience ──────────────────────────────────────────────

pub use config::{ConfigError, TunnelConfig};
pub use crypto::{AeadCipher, Cipher, CipherKind, ReplayCache, ReplayCacheConfig};
pub use transport::{pack, unpack, PacketCodec, PacketError};

#[cfg(feature = "native")]
pub use transport::{PacketConn, PacketConnError, StreamError};

// ── Library metadata ────────────────────────────────────────────────────────

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate version string.
pub fn version() -> &'static str {
    VERSION
}

// ── Tests ───────────────────────────────────────────────────────────────────
