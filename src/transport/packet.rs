/// AEAD Packet Codec
///
/// Seals one datagram per call. Wire format:
/// ```text
/// [salt: S][padding: 16..=31][ciphertext of (timestamp: 4 || payload)][tag: T]
/// ```
///
/// `S` is the cipher's salt size and `T` its tag size. The AEAD key is
/// derived per salt by the [`Cipher`], so the nonce is always zero.
///
/// Receive-side checks run cheapest first, so garbage and replays are
/// dropped before any decryption:
/// 1. padding (one HMAC)
/// 2. replay cache (one locked map lookup)
/// 3. AEAD open
/// 4. timestamp window
use crate::crypto::framing::{self, FramingError, MAX_PADDING, TIMESTAMP_SIZE};
use crate::crypto::{Aead, Cipher, CipherError, ReplayCache, ReplayError};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use thiserror::Error;

/// Largest datagram the codec is sized for (64 KiB).
pub const MAX_PACKET_SIZE: usize = 64 * 1024;

/// Upper bound on tag size assumed by the allocating helpers.
const MAX_TAG_SIZE: usize = 32;

/// Read-only all-zero nonce, longer than any supported nonce.
const ZERO_NONCE: [u8; 32] = [0u8; 32];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("short packet")]
    ShortPacket,
    #[error("short buffer")]
    ShortBuffer,
    #[error("invalid padding")]
    InvalidPadding,
    #[error("invalid timestamp")]
    InvalidTimestamp,
    #[error("repeated salt detected")]
    RepeatedSalt,
    #[error("authentication failed")]
    AuthenticationFailure,
    #[error("Cipher error: {0}")]
    Cipher(CipherError),
    #[error("Random number generator failure")]
    Rng,
}

pub type Result<T> = std::result::Result<T, PacketError>;

impl From<FramingError> for PacketError {
    fn from(err: FramingError) -> Self {
        match err {
            FramingError::InvalidPadding => Self::InvalidPadding,
            FramingError::InvalidTimestamp => Self::InvalidTimestamp,
        }
    }
}

impl From<ReplayError> for PacketError {
    fn from(err: ReplayError) -> Self {
        match err {
            ReplayError::RepeatedSalt => Self::RepeatedSalt,
        }
    }
}

impl From<CipherError> for PacketError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::AuthenticationFailure => Self::AuthenticationFailure,
            other => Self::Cipher(other),
        }
    }
}

fn zero_nonce(aead: &dyn Aead) -> Result<&'static [u8]> {
    ZERO_NONCE
        .get(..aead.nonce_size())
        .ok_or(PacketError::Cipher(CipherError::InvalidNonceLength))
}

/// Largest payload that fits a [`MAX_PACKET_SIZE`] datagram in the worst case.
pub fn max_payload(salt_size: usize, tag_size: usize) -> usize {
    MAX_PACKET_SIZE.saturating_sub(salt_size + MAX_PADDING + TIMESTAMP_SIZE + tag_size)
}

/// Encrypt `plaintext` into `dst` under a fresh random salt.
///
/// Returns the populated prefix of `dst`. Fails with
/// [`PacketError::ShortBuffer`] if `dst` cannot hold
/// `salt + padding + timestamp + plaintext + tag`; in that case the salt is
/// not recorded.
pub fn pack<'a>(
    dst: &'a mut [u8],
    plaintext: &[u8],
    cipher: &dyn Cipher,
    cache: &ReplayCache,
) -> Result<&'a mut [u8]> {
    let salt_size = cipher.salt_size();
    if dst.len() < salt_size {
        return Err(PacketError::ShortBuffer);
    }
    let (salt, rest) = dst.split_at_mut(salt_size);
    OsRng.try_fill_bytes(salt).map_err(|_| PacketError::Rng)?;

    let aead = cipher.encrypter(salt)?;
    let tag_size = aead.overhead();
    let padding = framing::derive_padding(cipher.key(), salt);
    let staged_len = TIMESTAMP_SIZE + plaintext.len();
    if rest.len() < padding.len() + staged_len + tag_size {
        return Err(PacketError::ShortBuffer);
    }

    let (padding_area, body) = rest.split_at_mut(padding.len());
    padding_area.copy_from_slice(&padding);

    // Own salts are tracked too, so reflected traffic is rejected.
    cache.record(salt);

    let (staged, tail) = body.split_at_mut(staged_len);
    staged[..TIMESTAMP_SIZE].copy_from_slice(&framing::current_timestamp());
    staged[TIMESTAMP_SIZE..].copy_from_slice(plaintext);
    aead.seal_in_place(zero_nonce(aead.as_ref())?, staged, &mut tail[..tag_size])?;

    let total = salt_size + padding.len() + staged_len + tag_size;
    Ok(&mut dst[..total])
}

/// Validate the cleartext header and claim the salt.
///
/// Returns the offset of the sealed body and the decrypting AEAD. The
/// replay cache is touched only after the padding matched.
fn admit(packet: &[u8], cipher: &dyn Cipher, cache: &ReplayCache) -> Result<(usize, Box<dyn Aead>)> {
    let salt_size = cipher.salt_size();
    if packet.len() < salt_size {
        return Err(PacketError::ShortPacket);
    }
    let (salt, rest) = packet.split_at(salt_size);
    let padding_len = framing::verify_padding(cipher.key(), salt, rest)?;

    cache.admit(salt)?;

    let aead = cipher.decrypter(salt)?;
    if rest.len() < padding_len + aead.overhead() {
        return Err(PacketError::ShortPacket);
    }
    Ok((salt_size + padding_len, aead))
}

/// Open `body` in place and check its timestamp. Returns the payload range
/// within `body`.
fn open_body(aead: &dyn Aead, body: &mut [u8], tag: &[u8]) -> Result<Range<usize>> {
    aead.open_in_place(zero_nonce(aead)?, body, tag)?;
    framing::verify_timestamp(body)?;
    Ok(TIMESTAMP_SIZE..body.len())
}

/// Decrypt `packet` into `dst` and return the payload slice of `dst`.
///
/// `dst` must hold at least `packet.len() - salt - padding - tag` bytes.
pub fn unpack<'a>(
    dst: &'a mut [u8],
    packet: &[u8],
    cipher: &dyn Cipher,
    cache: &ReplayCache,
) -> Result<&'a mut [u8]> {
    let (start, aead) = admit(packet, cipher, cache)?;
    let (sealed, tag) = packet[start..].split_at(packet.len() - start - aead.overhead());
    if dst.len() < sealed.len() {
        return Err(PacketError::ShortBuffer);
    }

    let body = &mut dst[..sealed.len()];
    body.copy_from_slice(sealed);
    let payload = open_body(aead.as_ref(), body, tag)?;
    Ok(&mut dst[payload])
}

/// Decrypt the packet occupying `buf[..len]` in place.
///
/// On success the payload is moved to the front of `buf` and its length is
/// returned. Opened plaintext is always shorter than the packet, so no
/// extra space is needed.
pub fn unpack_in_place(
    buf: &mut [u8],
    len: usize,
    cipher: &dyn Cipher,
    cache: &ReplayCache,
) -> Result<usize> {
    let packet = buf.get(..len).ok_or(PacketError::ShortBuffer)?;
    let (start, aead) = admit(packet, cipher, cache)?;
    let tag_start = len - aead.overhead();

    let (body, tag) = buf[start..len].split_at_mut(tag_start - start);
    let payload = open_body(aead.as_ref(), body, tag)?;
    let payload_len = payload.len();
    buf.copy_within(start + payload.start..start + payload.end, 0);
    Ok(payload_len)
}

/// A cipher bound to the replay cache it reports salts to.
///
/// Cloning is cheap; clones share both the cipher and the cache.
#[derive(Clone)]
pub struct PacketCodec {
    cipher: Arc<dyn Cipher>,
    cache: Arc<ReplayCache>,
}

impl fmt::Debug for PacketCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketCodec")
            .field("salt_size", &self.cipher.salt_size())
            .field("cache", &self.cache)
            .finish()
    }
}

impl PacketCodec {
    pub fn new(cipher: Arc<dyn Cipher>, cache: Arc<ReplayCache>) -> Self {
        Self { cipher, cache }
    }

    pub fn cipher(&self) -> &dyn Cipher {
        self.cipher.as_ref()
    }

    pub fn cache(&self) -> &Arc<ReplayCache> {
        &self.cache
    }

    pub fn pack<'a>(&self, dst: &'a mut [u8], plaintext: &[u8]) -> Result<&'a mut [u8]> {
        pack(dst, plaintext, self.cipher.as_ref(), &self.cache)
    }

    pub fn unpack<'a>(&self, dst: &'a mut [u8], packet: &[u8]) -> Result<&'a mut [u8]> {
        unpack(dst, packet, self.cipher.as_ref(), &self.cache)
    }

    pub fn unpack_in_place(&self, buf: &mut [u8], len: usize) -> Result<usize> {
        unpack_in_place(buf, len, self.cipher.as_ref(), &self.cache)
    }

    /// Allocating [`pack`](Self::pack).
    pub fn pack_to_vec(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let capacity =
            self.cipher.salt_size() + MAX_PADDING + TIMESTAMP_SIZE + plaintext.len() + MAX_TAG_SIZE;
        let mut buf = vec![0u8; capacity];
        let len = self.pack(&mut buf, plaintext)?.len();
        buf.truncate(len);
        Ok(buf)
    }

    /// Allocating [`unpack`](Self::unpack).
    pub fn unpack_to_vec(&self, packet: &[u8]) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; packet.len()];
        Ok(self.unpack(&mut buf, packet)?.to_vec())
    }
}
