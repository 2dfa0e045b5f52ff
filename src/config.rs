//! Tunnel configuration.
//!
//! Both ends of a tunnel must agree on the cipher suite and the shared key;
//! nothing on the wire identifies either. Configuration is plain JSON:
//!
//! ```json
//! {
//!   "cipher": "chacha20-ietf-poly1305",
//!   "key": "QkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkI=",
//!   "replay": { "threshold": 10240, "retention_secs": 360 }
//! }
//! ```
//!
//! `replay` is optional and defaults as shown.

use crate::crypto::{AeadCipher, Cipher, CipherError, CipherKind, ReplayCache, ReplayCacheConfig};
use crate::transport::PacketCodec;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Key is not valid base64: {0}")]
    KeyEncoding(#[from] base64::DecodeError),
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error("Replay retention {0}s is shorter than twice the timestamp window")]
    RetentionTooShort(u64),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    pub cipher: CipherKind,
    /// Base64 (standard alphabet) encoded shared key.
    pub key: String,
    #[serde(default)]
    pub replay: ReplayCacheConfig,
}

impl std::fmt::Debug for TunnelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelConfig")
            .field("cipher", &self.cipher)
            .field("key", &"[REDACTED]")
            .field("replay", &self.replay)
            .finish()
    }
}

impl TunnelConfig {
    pub fn new(cipher: CipherKind, key: &[u8]) -> Self {
        Self {
            cipher,
            key: STANDARD.encode(key),
            replay: ReplayCacheConfig::default(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check key encoding, key length and replay retention.
    pub fn validate(&self) -> Result<()> {
        self.build_cipher()?;
        if !self.replay.is_sound() {
            return Err(ConfigError::RetentionTooShort(self.replay.retention_secs));
        }
        Ok(())
    }

    pub fn decode_key(&self) -> Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new(STANDARD.decode(self.key.trim())?))
    }

    pub fn build_cipher(&self) -> Result<Arc<dyn Cipher>> {
        let key = self.decode_key()?;
        Ok(Arc::new(AeadCipher::new(self.cipher, &key)?))
    }

    /// A new replay cache with this configuration's tuning.
    pub fn build_cache(&self) -> Result<Arc<ReplayCache>> {
        ReplayCache::new(self.replay)
            .map(Arc::new)
            .ok_or(ConfigError::RetentionTooShort(self.replay.retention_secs))
    }

    /// Build a codec. Pass `Some(cache)` to share an existing replay cache
    /// with other codecs, or `None` to give this codec its own.
    pub fn build_codec(&self, cache: Option<Arc<ReplayCache>>) -> Result<PacketCodec> {
        let cache = match cache {
            Some(cache) => cache,
            None => self.build_cache()?,
        };
        let cipher = self.build_cipher()?;
        log::info!(
            "Tunnel codec ready: {} (replay threshold {}, retention {}s)",
            self.cipher,
            cache.config().threshold,
            cache.config().retention_secs
        );
        Ok(PacketCodec::new(cipher, cache))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_B64: &str = "QkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkI=";

    #[test]
    fn test_parse_minimal() {
        let json = format!(r#"{{"cipher": "AEAD_CHACHA20_POLY1305", "key": "{}"}}"#, KEY_B64);
        let config = TunnelConfig::from_json(&json).unwrap();
        assert_eq!(config.cipher, CipherKind::ChaCha20Poly1305);
        assert_eq!(config.replay, ReplayCacheConfig::default());
        assert_eq!(config.decode_key().unwrap().as_slice(), &[0x42u8; 32]);
    }

    #[test]
    fn test_parse_with_replay_overrides() {
        let json = format!(
            r#"{{"cipher": "aes-256-gcm", "key": "{}", "replay": {{"threshold": 64}}}}"#,
            KEY_B64
        );
        let config = TunnelConfig::from_json(&json).unwrap();
        assert_eq!(config.replay.threshold, 64);
        assert_eq!(config.replay.retention_secs, 360);
    }

    #[test]
    fn test_rejects_bad_configs() {
        let unknown = format!(r#"{{"cipher": "rc4-md5", "key": "{}"}}"#, KEY_B64);
        assert!(matches!(
            TunnelConfig::from_json(&unknown),
            Err(ConfigError::Json(_))
        ));

        let bad_b64 = r#"{"cipher": "aes-256-gcm", "key": "not base64!"}"#;
        assert!(matches!(
            TunnelConfig::from_json(bad_b64),
            Err(ConfigError::KeyEncoding(_))
        ));

        // 32-byte key for a 16-byte suite.
        let wrong_len = format!(r#"{{"cipher": "aes-128-gcm", "key": "{}"}}"#, KEY_B64);
        assert!(matches!(
            TunnelConfig::from_json(&wrong_len),
            Err(ConfigError::Cipher(CipherError::InvalidKeyLength { .. }))
        ));

        let short_retention = format!(
            r#"{{"cipher": "aes-256-gcm", "key": "{}", "replay": {{"retention_secs": 100}}}}"#,
            KEY_B64
        );
        assert!(matches!(
            TunnelConfig::from_json(&short_retention),
            Err(ConfigError::RetentionTooShort(100))
        ));
    }

    #[test]
    fn test_json_roundtrip_and_redacted_debug() {
        let config = TunnelConfig::new(CipherKind::Aes128Gcm, &[7u8; 16]);
        let json = config.to_json().unwrap();
        assert!(json.contains("aes-128-gcm"));
        let back = TunnelConfig::from_json(&json).unwrap();
        assert_eq!(back.key, config.key);
        assert!(!format!("{:?}", config).contains(&config.key));
    }

    #[test]
    fn test_codecs_share_or_own_cache() {
        let config = TunnelConfig::new(CipherKind::ChaCha20Poly1305, &[0x42u8; 32]);
        let shared = config.build_cache().unwrap();

        let a = config.build_codec(Some(shared.clone())).unwrap();
        let b = config.build_codec(Some(shared.clone())).unwrap();
        let own = config.build_codec(None).unwrap();
        assert!(Arc::ptr_eq(a.cache(), b.cache()));
        assert!(!Arc::ptr_eq(a.cache(), own.cache()));

        // `a` packs, `b` shares its cache and so sees the salt as already used.
        let packet = a.pack_to_vec(b"shared").unwrap();
        assert!(matches!(b.unpack_to_vec(&packet), Err(crate::PacketError::RepeatedSalt)));
        assert_eq!(own.unpack_to_vec(&packet).unwrap(), b"shared");
    }
}
