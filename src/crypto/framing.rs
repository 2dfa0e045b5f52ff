//! Obfuscation and anti-replay framing fields.
//!
//! Two fields are derived per message:
//!
//! - **Padding** (16..=31 bytes, sent in clear): a prefix of
//!   `HMAC-SHA256(key, salt)`. Its length is also taken from the hash, so
//!   both length and content prove possession of the shared key before any
//!   AEAD work is done.
//! - **Timestamp** (4 bytes, sealed with the payload): Unix seconds,
//!   truncated to 32 bits, big-endian. Accepted within ±120 seconds.
//!
//! Everything here is pure. The packet codec and the stream codec are thin
//! adapters over these functions.

use super::constant_time;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Encoded timestamp size in bytes.
pub const TIMESTAMP_SIZE: usize = 4;
/// Maximum accepted distance between a timestamp and the local clock.
pub const TIMESTAMP_WINDOW_SECS: u64 = 120;
/// Shortest possible padding.
pub const MIN_PADDING: usize = 16;
/// Longest possible padding.
pub const MAX_PADDING: usize = 31;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    #[error("invalid padding")]
    InvalidPadding,
    #[error("invalid timestamp")]
    InvalidTimestamp,
}

pub type Result<T> = std::result::Result<T, FramingError>;

fn hmac_sha256(key: &[u8], salt: &[u8]) -> [u8; 32] {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(salt);
    mac.finalize().into_bytes().into()
}

/// Padding length for a 32-byte HMAC output: the sum of every nibble,
/// reduced mod 16, offset by 16.
pub fn padding_length(hash: &[u8; 32]) -> usize {
    let sum: usize = hash
        .iter()
        .map(|b| usize::from(b & 0x0f) + usize::from(b >> 4))
        .sum();
    sum % 16 + MIN_PADDING
}

/// Derive the padding the sender places after `salt`.
pub fn derive_padding(key: &[u8], salt: &[u8]) -> Vec<u8> {
    let hash = hmac_sha256(key, salt);
    hash[..padding_length(&hash)].to_vec()
}

/// Verify that `candidate` begins with the padding for `salt`.
///
/// `candidate` may run past the padding (the rest of the packet); only the
/// expected prefix is compared. Returns the padding length so the caller
/// knows how many bytes to skip.
pub fn verify_padding(key: &[u8], salt: &[u8], candidate: &[u8]) -> Result<usize> {
    match_padding(&derive_padding(key, salt), candidate)
}

/// Compare already-derived padding against received bytes.
pub(crate) fn match_padding(expected: &[u8], candidate: &[u8]) -> Result<usize> {
    if constant_time::has_prefix(candidate, expected) {
        Ok(expected.len())
    } else {
        Err(FramingError::InvalidPadding)
    }
}

/// Seconds since the Unix epoch. A clock set before 1970 reads as 0.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Encode `now` as 4 big-endian bytes, keeping the low 32 bits.
pub fn encode_timestamp(now: u64) -> [u8; TIMESTAMP_SIZE] {
    (now as u32).to_be_bytes()
}

/// Encode the current time.
pub fn current_timestamp() -> [u8; TIMESTAMP_SIZE] {
    encode_timestamp(unix_now())
}

/// Decode and validate a timestamp against the local clock.
pub fn verify_timestamp(bytes: &[u8]) -> Result<u32> {
    verify_timestamp_at(bytes, unix_now())
}

/// Decode and validate a timestamp against an explicit `now`.
///
/// The 32-bit value is compared with the full 64-bit clock, so after the
/// 2106 rollover every timestamp is rejected.
pub fn verify_timestamp_at(bytes: &[u8], now: u64) -> Result<u32> {
    let field: [u8; TIMESTAMP_SIZE] = bytes
        .get(..TIMESTAMP_SIZE)
        .and_then(|b| b.try_into().ok())
        .ok_or(FramingError::InvalidTimestamp)?;
    let timestamp = u32::from_be_bytes(field);
    if now.abs_diff(u64::from(timestamp)) > TIMESTAMP_WINDOW_SECS {
        return Err(FramingError::InvalidTimestamp);
    }
    Ok(timestamp)
}
