//! Keyed-AEAD cipher suites.
//!
//! The packet and stream codecs only see the [`Cipher`] and [`Aead`] traits:
//! a cipher knows its salt size and shared key, and hands out AEAD instances
//! whose key has already been derived from `(key, salt)`. [`AeadCipher`] is
//! the built-in implementation:
//!
//! ```text
//! subkey = HKDF-SHA256(salt = salt, ikm = key, info = "ss-subkey")
//! ```
//!
//! with AES-128-GCM, AES-256-GCM or ChaCha20-Poly1305 on top.

use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::aead::generic_array::typenum::Unsigned;
use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::ChaCha20Poly1305;
use hkdf::Hkdf;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// HKDF info string for per-salt subkeys.
const SUBKEY_INFO: &[u8] = b"ss-subkey";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
    #[error("Invalid salt length: expected {expected}, got {actual}")]
    InvalidSaltLength { expected: usize, actual: usize },
    #[error("Invalid nonce length")]
    InvalidNonceLength,
    #[error("Unknown cipher: {0}")]
    UnknownCipher(String),
    #[error("Key derivation failed")]
    KeyDerivationFailed,
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Authentication failed")]
    AuthenticationFailure,
    #[error("Buffer too small")]
    BufferTooSmall,
}

pub type Result<T> = std::result::Result<T, CipherError>;

// ─── Collaborator traits ─────────────────────────────────────────────────────

/// One keyed AEAD instance.
///
/// Both operations work in place with a detached tag, so callers choose
/// where ciphertext and tag live on the wire.
pub trait Aead: Send + Sync {
    /// Tag size in bytes.
    fn overhead(&self) -> usize;

    fn nonce_size(&self) -> usize;

    /// Encrypt `buf` in place and write the tag into `tag`
    /// (`tag.len()` must equal [`overhead`](Self::overhead)).
    fn seal_in_place(&self, nonce: &[u8], buf: &mut [u8], tag: &mut [u8]) -> Result<()>;

    /// Decrypt `buf` in place after verifying `tag`. On failure `buf` is
    /// left unspecified and must be discarded.
    fn open_in_place(&self, nonce: &[u8], buf: &mut [u8], tag: &[u8]) -> Result<()>;

    /// Allocating seal: returns `ciphertext || tag`.
    fn seal(&self, nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut out = vec![0u8; plaintext.len() + self.overhead()];
        let (body, tag) = out.split_at_mut(plaintext.len());
        body.copy_from_slice(plaintext);
        self.seal_in_place(nonce, body, tag)?;
        Ok(out)
    }

    /// Allocating open of `ciphertext || tag`.
    fn open(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        let split = ciphertext
            .len()
            .checked_sub(self.overhead())
            .ok_or(CipherError::AuthenticationFailure)?;
        let (body, tag) = ciphertext.split_at(split);
        let mut out = body.to_vec();
        self.open_in_place(nonce, &mut out, tag)?;
        Ok(out)
    }
}

/// Keyed-AEAD factory shared by every connection under one secret.
pub trait Cipher: Send + Sync {
    fn salt_size(&self) -> usize;

    /// Raw shared secret. Used for padding derivation, never for sealing.
    fn key(&self) -> &[u8];

    /// AEAD instance for sealing under the subkey of `salt`.
    fn encrypter(&self, salt: &[u8]) -> Result<Box<dyn Aead>>;

    /// AEAD instance for opening under the subkey of `salt`.
    fn decrypter(&self, salt: &[u8]) -> Result<Box<dyn Aead>>;
}

// ─── Cipher kinds ────────────────────────────────────────────────────────────

/// Supported AEAD suites.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CipherKind {
    Aes128Gcm,
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl CipherKind {
    /// Shared-secret length in bytes.
    pub fn key_size(self) -> usize {
        match self {
            Self::Aes128Gcm => 16,
            Self::Aes256Gcm | Self::ChaCha20Poly1305 => 32,
        }
    }

    /// Salt length equals key length for every suite.
    pub fn salt_size(self) -> usize {
        self.key_size()
    }

    pub fn tag_size(self) -> usize {
        16
    }

    /// Canonical name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Aes128Gcm => "aes-128-gcm",
            Self::Aes256Gcm => "aes-256-gcm",
            Self::ChaCha20Poly1305 => "chacha20-ietf-poly1305",
        }
    }
}

impl fmt::Display for CipherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CipherKind {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "aes-128-gcm" | "aead-aes-128-gcm" => Ok(Self::Aes128Gcm),
            "aes-256-gcm" | "aead-aes-256-gcm" => Ok(Self::Aes256Gcm),
            "chacha20-ietf-poly1305" | "chacha20-poly1305" | "aead-chacha20-poly1305" => {
                Ok(Self::ChaCha20Poly1305)
            }
            _ => Err(CipherError::UnknownCipher(s.to_string())),
        }
    }
}

impl Serialize for CipherKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for CipherKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(de::Error::custom)
    }
}

// ─── Secret key ──────────────────────────────────────────────────────────────

/// Pre-shared secret, wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    pub fn new(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

// ─── Built-in suites ─────────────────────────────────────────────────────────

/// Adapter from a RustCrypto AEAD to [`Aead`].
struct Subkeyed<C>(C);

impl<C: AeadInPlace + Send + Sync> Aead for Subkeyed<C> {
    fn overhead(&self) -> usize {
        C::TagSize::USIZE
    }

    fn nonce_size(&self) -> usize {
        C::NonceSize::USIZE
    }

    fn seal_in_place(&self, nonce: &[u8], buf: &mut [u8], tag: &mut [u8]) -> Result<()> {
        if nonce.len() != self.nonce_size() {
            return Err(CipherError::InvalidNonceLength);
        }
        if tag.len() != self.overhead() {
            return Err(CipherError::BufferTooSmall);
        }
        let computed = self
            .0
            .encrypt_in_place_detached(GenericArray::from_slice(nonce), &[], buf)
            .map_err(|_| CipherError::EncryptionFailed)?;
        tag.copy_from_slice(&computed);
        Ok(())
    }

    fn open_in_place(&self, nonce: &[u8], buf: &mut [u8], tag: &[u8]) -> Result<()> {
        if nonce.len() != self.nonce_size() {
            return Err(CipherError::InvalidNonceLength);
        }
        if tag.len() != self.overhead() {
            return Err(CipherError::AuthenticationFailure);
        }
        self.0
            .decrypt_in_place_detached(
                GenericArray::from_slice(nonce),
                &[],
                buf,
                GenericArray::from_slice(tag),
            )
            .map_err(|_| CipherError::AuthenticationFailure)
    }
}

/// Built-in [`Cipher`]: HKDF-SHA256 subkeys over a RustCrypto AEAD.
#[derive(Clone, Debug)]
pub struct AeadCipher {
    kind: CipherKind,
    key: SecretKey,
}

impl AeadCipher {
    /// Create a cipher; `key` must be exactly `kind.key_size()` bytes.
    pub fn new(kind: CipherKind, key: &[u8]) -> Result<Self> {
        if key.len() != kind.key_size() {
            return Err(CipherError::InvalidKeyLength {
                expected: kind.key_size(),
                actual: key.len(),
            });
        }
        log::debug!("Initialised {} cipher", kind);
        Ok(Self {
            kind,
            key: SecretKey::new(key),
        })
    }

    pub fn kind(&self) -> CipherKind {
        self.kind
    }

    fn subkey(&self, salt: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if salt.len() != self.kind.salt_size() {
            return Err(CipherError::InvalidSaltLength {
                expected: self.kind.salt_size(),
                actual: salt.len(),
            });
        }
        let hkdf = Hkdf::<Sha256>::new(Some(salt), self.key.as_bytes());
        let mut subkey = Zeroizing::new(vec![0u8; self.kind.key_size()]);
        hkdf.expand(SUBKEY_INFO, &mut subkey)
            .map_err(|_| CipherError::KeyDerivationFailed)?;
        Ok(subkey)
    }

    fn instance(&self, salt: &[u8]) -> Result<Box<dyn Aead>> {
        let subkey = self.subkey(salt)?;
        let invalid = |_| CipherError::InvalidKeyLength {
            expected: self.kind.key_size(),
            actual: subkey.len(),
        };
        let aead: Box<dyn Aead> = match self.kind {
            CipherKind::Aes128Gcm => {
                Box::new(Subkeyed(Aes128Gcm::new_from_slice(&subkey).map_err(invalid)?))
            }
            CipherKind::Aes256Gcm => {
                Box::new(Subkeyed(Aes256Gcm::new_from_slice(&subkey).map_err(invalid)?))
            }
            CipherKind::ChaCha20Poly1305 => Box::new(Subkeyed(
                ChaCha20Poly1305::new_from_slice(&subkey).map_err(invalid)?,
            )),
        };
        Ok(aead)
    }
}

impl Cipher for AeadCipher {
    fn salt_size(&self) -> usize {
        self.kind.salt_size()
    }

    fn key(&self) -> &[u8] {
        self.key.as_bytes()
    }

    fn encrypter(&self, salt: &[u8]) -> Result<Box<dyn Aead>> {
        self.instance(salt)
    }

    fn decrypter(&self, salt: &[u8]) -> Result<Box<dyn Aead>> {
        self.instance(salt)
    }
}
