//! Stream framing.
//!
//! The same padding and timestamp fields as the packet codec, read from and
//! written to a byte stream. Reads use `read_exact` and suspend until the
//! whole field has arrived; a short stream surfaces as an I/O error.
//!
//! A stream opens with `salt || padding`, written by [`write_salt_header`]
//! and checked by [`read_salt_header`]. Any failure here desynchronises the
//! stream, so callers should close the connection.

use crate::crypto::framing::{self, FramingError, TIMESTAMP_SIZE};
use crate::crypto::{Cipher, CipherError, ReplayCache, ReplayError};
use rand::rngs::OsRng;
use rand::RngCore;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error(transparent)]
    Replay(#[from] ReplayError),
    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),
    #[error("Random number generator failure")]
    Rng,
}

pub type Result<T> = std::result::Result<T, StreamError>;

/// Write the padding for `salt`.
pub async fn write_padding<W>(stream: &mut W, salt: &[u8], key: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    stream.write_all(&framing::derive_padding(key, salt)).await?;
    Ok(())
}

/// Write the current timestamp.
pub async fn write_timestamp<W>(stream: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    stream.write_all(&framing::current_timestamp()).await?;
    Ok(())
}

/// Read exactly the padding length expected for `salt` and verify it.
/// Returns the number of bytes consumed.
pub async fn read_padding<R>(stream: &mut R, salt: &[u8], key: &[u8]) -> Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let expected = framing::derive_padding(key, salt);
    let mut received = vec![0u8; expected.len()];
    stream.read_exact(&mut received).await?;
    Ok(framing::match_padding(&expected, &received)?)
}

/// Read a 4-byte timestamp and check it against the local clock.
pub async fn read_timestamp<R>(stream: &mut R) -> Result<u32>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut field = [0u8; TIMESTAMP_SIZE];
    stream.read_exact(&mut field).await?;
    Ok(framing::verify_timestamp(&field)?)
}

/// Open a stream: write a fresh salt followed by its padding.
///
/// The salt is recorded in `cache` and returned so the caller can derive
/// the stream's AEAD from it.
pub async fn write_salt_header<W>(
    stream: &mut W,
    cipher: &dyn Cipher,
    cache: &ReplayCache,
) -> Result<Vec<u8>>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut header = vec![0u8; cipher.salt_size()];
    OsRng.try_fill_bytes(&mut header).map_err(|_| StreamError::Rng)?;
    let salt_size = header.len();
    let padding = framing::derive_padding(cipher.key(), &header);
    header.extend_from_slice(&padding);
    cache.record(&header[..salt_size]);

    stream.write_all(&header).await?;
    header.truncate(salt_size);
    Ok(header)
}

/// Accept a stream: read the salt and padding, then claim the salt.
///
/// Fails with [`ReplayError::RepeatedSalt`] if the salt was seen before.
pub async fn read_salt_header<R>(
    stream: &mut R,
    cipher: &dyn Cipher,
    cache: &ReplayCache,
) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut salt = vec![0u8; cipher.salt_size()];
    stream.read_exact(&mut salt).await?;
    read_padding(stream, &salt, cipher.key()).await?;
    cache.admit(&salt)?;
    Ok(salt)
}
