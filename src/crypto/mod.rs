pub mod cipher;
pub mod constant_time;
pub mod framing;
pub mod replay_cache;

pub use cipher::{Aead, AeadCipher, Cipher, CipherError, CipherKind, SecretKey};
pub use framing::{
    current_timestamp, derive_padding, encode_timestamp, padding_length, unix_now,
    verify_padding, verify_timestamp, verify_timestamp_at, FramingError, MAX_PADDING,
    MIN_PADDING, TIMESTAMP_SIZE, TIMESTAMP_WINDOW_SECS,
};
pub use replay_cache::{
    ReplayCache, ReplayCacheConfig, ReplayCacheStats, ReplayError, DEFAULT_RETENTION_SECS,
    DEFAULT_THRESHOLD,
};
