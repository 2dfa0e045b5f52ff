//! Salt replay cache.
//!
//! Remembers every salt seen (sent or received) for at least
//! `2 × TIMESTAMP_WINDOW_SECS`. A packet whose timestamp is still acceptable
//! therefore always finds its salt here if it was seen before, and the
//! timestamp check rejects anything older.
//!
//! Pruning is lazy: once the map reaches `threshold` entries, the insert that
//! hit the threshold rebuilds the map with only entries newer than
//! `now - retention_secs`. The rebuild runs under the write lock.

use super::framing::{unix_now, TIMESTAMP_WINDOW_SECS};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

/// Map size at which a prune is triggered.
pub const DEFAULT_THRESHOLD: usize = 10_240;
/// How long a salt is kept after first sighting (6 minutes).
pub const DEFAULT_RETENTION_SECS: u64 = 360;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayError {
    #[error("repeated salt detected")]
    RepeatedSalt,
}

/// Replay cache tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayCacheConfig {
    /// Entry count that triggers pruning.
    pub threshold: usize,
    /// Minimum age (seconds) before an entry may be pruned.
    /// Must be at least `2 * TIMESTAMP_WINDOW_SECS`.
    pub retention_secs: u64,
}

impl Default for ReplayCacheConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            retention_secs: DEFAULT_RETENTION_SECS,
        }
    }
}

impl ReplayCacheConfig {
    /// Smallest retention that keeps the replay check sound.
    pub const MIN_RETENTION_SECS: u64 = 2 * TIMESTAMP_WINDOW_SECS;

    pub fn is_sound(&self) -> bool {
        self.retention_secs >= Self::MIN_RETENTION_SECS
    }
}

#[derive(Default)]
struct Inner {
    salts: HashMap<Box<[u8]>, u64>,
    prunes: u64,
    evicted: u64,
}

/// Bounded, time-pruned set of seen salts.
///
/// Shared between codecs with `Arc<ReplayCache>`. Every endpoint that uses
/// one shared secret should share one cache.
pub struct ReplayCache {
    config: ReplayCacheConfig,
    inner: RwLock<Inner>,
}

impl Default for ReplayCache {
    fn default() -> Self {
        Self {
            config: ReplayCacheConfig::default(),
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl fmt::Debug for ReplayCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayCache")
            .field("config", &self.config)
            .field("entries", &self.len())
            .finish()
    }
}

impl ReplayCache {
    /// Create a cache with custom tuning.
    ///
    /// Returns `None` when `retention_secs` is shorter than
    /// `2 * TIMESTAMP_WINDOW_SECS`, since salts of still-valid packets
    /// could then be forgotten.
    pub fn new(config: ReplayCacheConfig) -> Option<Self> {
        if !config.is_sound() {
            return None;
        }
        Some(Self {
            config,
            inner: RwLock::new(Inner {
                salts: HashMap::with_capacity(config.threshold.min(DEFAULT_THRESHOLD)),
                ..Inner::default()
            }),
        })
    }

    pub fn config(&self) -> &ReplayCacheConfig {
        &self.config
    }

    /// Insert or refresh `salt` with the current time.
    pub fn record(&self, salt: &[u8]) {
        self.record_at(salt, unix_now());
    }

    pub fn record_at(&self, salt: &[u8], now: u64) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.salts.insert(salt.into(), now);
        self.maybe_prune(&mut inner, now);
    }

    /// Read-only membership test.
    pub fn contains(&self, salt: &[u8]) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .salts
            .contains_key(salt)
    }

    /// Atomically test for `salt` and record it if absent.
    ///
    /// Returns `true` if the salt was already present (a replay; nothing is
    /// modified) and `false` on first sighting. Concurrent callers with the
    /// same salt are serialised by the write lock, so exactly one of them
    /// observes `false`.
    pub fn check_and_record(&self, salt: &[u8]) -> bool {
        self.check_and_record_at(salt, unix_now())
    }

    pub fn check_and_record_at(&self, salt: &[u8], now: u64) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.salts.contains_key(salt) {
            return true;
        }
        inner.salts.insert(salt.into(), now);
        self.maybe_prune(&mut inner, now);
        false
    }

    /// [`check_and_record`](Self::check_and_record) as a `Result`.
    pub fn admit(&self, salt: &[u8]) -> Result<(), ReplayError> {
        if self.check_and_record(salt) {
            Err(ReplayError::RepeatedSalt)
        } else {
            Ok(())
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .salts
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every salt. Counters are kept.
    pub fn clear(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .salts
            .clear();
    }

    /// Snapshot for monitoring.
    pub fn stats(&self) -> ReplayCacheStats {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        ReplayCacheStats {
            entries: inner.salts.len(),
            threshold: self.config.threshold,
            retention_secs: self.config.retention_secs,
            prunes: inner.prunes,
            evicted: inner.evicted,
        }
    }

    fn maybe_prune(&self, inner: &mut Inner, now: u64) {
        if inner.salts.len() < self.config.threshold {
            return;
        }
        let cutoff = now.saturating_sub(self.config.retention_secs);
        let before = inner.salts.len();
        let mut kept = HashMap::with_capacity(self.config.threshold.min(DEFAULT_THRESHOLD));
        kept.extend(inner.salts.drain().filter(|(_, seen)| *seen >= cutoff));
        inner.salts = kept;

        let evicted = before - inner.salts.len();
        inner.prunes += 1;
        inner.evicted += evicted as u64;

        if evicted == 0 {
            log::warn!(
                "Replay cache at {} entries with none older than {}s (threshold {})",
                before,
                self.config.retention_secs,
                self.config.threshold
            );
        } else {
            log::debug!(
                "Replay cache pruned {} salts ({} remain)",
                evicted,
                inner.salts.len()
            );
        }
    }
}

/// Replay cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayCacheStats {
    pub entries: usize,
    pub threshold: usize,
    pub retention_secs: u64,
    pub prunes: u64,
    pub evicted: u64,
}

impl fmt::Display for ReplayCacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Salts: {}/{} | Retention: {}s | Prunes: {} ({} evicted)",
            self.entries, self.threshold, self.retention_secs, self.prunes, self.evicted,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    fn small_cache(threshold: usize) -> ReplayCache {
        ReplayCache::new(ReplayCacheConfig {
            threshold,
            retention_secs: DEFAULT_RETENTION_SECS,
        })
        .expect("sound config")
    }

    #[test]
    fn test_check_and_record() {
        let cache = ReplayCache::default();
        let salt = [2u8; 32];

        assert!(!cache.check_and_record(&salt));
        assert!(cache.check_and_record(&salt));
        assert!(cache.contains(&salt));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_different_salts_allowed() {
        let cache = ReplayCache::default();
        assert!(!cache.check_and_record(&[2u8; 32]));
        assert!(!cache.check_and_record(&[3u8; 32]));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_record_then_check() {
        let cache = ReplayCache::default();
        let salt = [4u8; 16];
        assert!(!cache.contains(&salt));
        cache.record(&salt);
        cache.record(&salt);
        assert!(cache.contains(&salt));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.admit(&salt), Err(ReplayError::RepeatedSalt));
    }

    #[test]
    fn test_hit_does_not_refresh() {
        let cache = small_cache(2);
        let salt = [1u8; 32];
        assert!(!cache.check_and_record_at(&salt, 1_000));
        // A replay at a later time must not extend the entry's lifetime.
        assert!(cache.check_and_record_at(&salt, 1_300));
        cache.record_at(&[2u8; 32], 1_400);
        assert!(!cache.contains(&salt));
    }

    #[test]
    fn test_concurrent_same_salt_single_winner() {
        const THREADS: usize = 16;
        let cache = Arc::new(ReplayCache::default());
        let barrier = Arc::new(Barrier::new(THREADS));
        let first_sightings = Arc::new(AtomicUsize::new(0));
        let salt = [0x5Au8; 32];

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let cache = cache.clone();
                let barrier = barrier.clone();
                let first_sightings = first_sightings.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    if !cache.check_and_record(&salt) {
                        first_sightings.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(first_sightings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_prune_keeps_recent_entries() {
        let cache = small_cache(100);
        let start = 10_000u64;

        // 50 old salts and 49 young ones, one short of the threshold.
        for i in 0..50u32 {
            cache.record_at(&i.to_be_bytes(), start);
        }
        for i in 50..99u32 {
            cache.record_at(&i.to_be_bytes(), start + 200);
        }
        assert_eq!(cache.stats().prunes, 0);

        // The 100th insert prunes: old entries are 439s old, young ones 239s.
        cache.record_at(b"trigger", start + 439);

        let stats = cache.stats();
        assert_eq!(stats.prunes, 1);
        assert_eq!(stats.evicted, 50);
        assert_eq!(stats.entries, 50);
        for i in 0..50u32 {
            assert!(!cache.contains(&i.to_be_bytes()), "old salt {} kept", i);
        }
        for i in 50..99u32 {
            assert!(cache.contains(&i.to_be_bytes()), "young salt {} evicted", i);
        }
    }

    #[test]
    fn test_prune_never_evicts_within_two_windows() {
        let cache = small_cache(10);
        let now = 50_000u64;
        for i in 0..20u32 {
            // Ages from 0 to 2*window inclusive.
            let age = u64::from(i) * (2 * TIMESTAMP_WINDOW_SECS) / 19;
            cache.record_at(&i.to_be_bytes(), now - age);
        }
        cache.record_at(b"trigger", now);
        for i in 0..20u32 {
            assert!(cache.contains(&i.to_be_bytes()));
        }
        assert_eq!(cache.stats().evicted, 0);
    }

    #[test]
    fn test_entries_older_than_retention_eventually_evicted() {
        let cache = small_cache(4);
        cache.record_at(b"stale", 1_000);
        for i in 0..3u8 {
            cache.check_and_record_at(&[i], 1_000 + DEFAULT_RETENTION_SECS + 1);
        }
        assert!(!cache.contains(b"stale"));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_rejects_unsound_retention() {
        assert!(ReplayCache::new(ReplayCacheConfig {
            threshold: 10,
            retention_secs: 239,
        })
        .is_none());
        assert!(ReplayCache::new(ReplayCacheConfig {
            threshold: 10,
            retention_secs: 240,
        })
        .is_some());
    }

    #[test]
    fn test_clear_and_stats_display() {
        let cache = ReplayCache::default();
        cache.record(b"a");
        cache.record(b"b");
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
        let text = cache.stats().to_string();
        assert!(text.contains("Salts: 0/10240"), "{}", text);
    }
}
