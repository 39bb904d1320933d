//! Signal deduplication.
//!
//! A fingerprint is a SHA-256 over the normalized signal body plus a
//! coarse time bucket, so rapid re-deliveries of one alert collapse while
//! identical alerts far apart in time stay distinct. Check-and-mark is
//! atomic; a fingerprint is recorded at most once.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use relay_core::{SignalBody, SignalFingerprint};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

fn default_bucket_secs() -> u64 {
    60
}

fn default_ttl_buckets() -> u32 {
    2
}

/// Deduplication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupeConfig {
    /// Time bucket granularity (seconds). Re-deliveries within one bucket
    /// share a fingerprint.
    #[serde(default = "default_bucket_secs")]
    pub bucket_secs: u64,
    /// Recorded fingerprints are purged after this many buckets.
    #[serde(default = "default_ttl_buckets")]
    pub ttl_buckets: u32,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            bucket_secs: default_bucket_secs(),
            ttl_buckets: default_ttl_buckets(),
        }
    }
}

/// Fingerprint-based signal deduplicator.
pub struct Deduplicator {
    config: DedupeConfig,
    /// Fingerprint → record timestamp (unix ms).
    seen: DashMap<String, i64>,
}

impl Deduplicator {
    pub fn new(config: DedupeConfig) -> Self {
        Self {
            config,
            seen: DashMap::new(),
        }
    }

    /// Compute the fingerprint for a normalized signal body received at
    /// the given timestamp.
    pub fn fingerprint(&self, body: &SignalBody, received_at_ms: i64) -> SignalFingerprint {
        let bucket = received_at_ms / (self.config.bucket_secs as i64 * 1000);
        let mut hasher = Sha256::new();
        hasher.update(body.canonical().as_bytes());
        hasher.update(b"|");
        hasher.update(bucket.to_string().as_bytes());
        SignalFingerprint::from_string(hex::encode(hasher.finalize()))
    }

    /// Atomically check whether the fingerprint was already seen, marking
    /// it if not. Returns `true` for a duplicate.
    pub fn check_and_mark(&self, fingerprint: &SignalFingerprint, now_ms: i64) -> bool {
        self.purge_expired(now_ms);

        match self.seen.entry(fingerprint.as_str().to_string()) {
            Entry::Occupied(_) => {
                debug!(fingerprint = %fingerprint, "Duplicate signal");
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(now_ms);
                false
            }
        }
    }

    /// Number of fingerprints currently recorded.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn purge_expired(&self, now_ms: i64) {
        let ttl_ms = self.config.bucket_secs as i64 * 1000 * i64::from(self.config.ttl_buckets);
        self.seen.retain(|_, recorded_at| now_ms - *recorded_at <= ttl_ms);
    }
}
