//! Secondary store: the overflow tier behind the shard rings.
//!
//! Records evicted from a full ring are demoted here instead of being
//! discarded; a later read that finds a stale ring handle falls back to this
//! tier and schedules a promotion back into the ring. The store sees only
//! opaque 64-bit fingerprints and packed record blobs, never user keys.

use crate::clock::{Clock, SystemClock};
use crate::error::{CacheError, CacheResult};

use ahash::AHashMap;
use parking_lot::Mutex;

/// Namespace prefix for every key the cache writes into a shared store.
pub(crate) const KEY_PREFIX: &str = "ringcache::key::";

/// Build the namespaced store key for a fingerprint.
pub(crate) fn spill_key(fingerprint: u64) -> String {
    format!("{KEY_PREFIX}{fingerprint}")
}

/// A key/value store acting as the overflow tier.
///
/// `deadline` arguments are absolute epoch seconds; zero means the record
/// never expires. Write-side operations are best-effort: failures are the
/// adapter's to log, and the cache proceeds without them.
pub trait SecondaryStore: Send + Sync {
    /// Fetch the record stored for a fingerprint.
    fn get(&self, fingerprint: u64) -> CacheResult<Vec<u8>>;

    /// Store a record. Implementations translate the absolute deadline to
    /// their own TTL model and must not store a record whose deadline has
    /// already passed.
    fn set(&self, fingerprint: u64, record: &[u8], deadline: i64);

    /// Remove the record for a fingerprint, if any.
    fn del(&self, fingerprint: u64);

    /// Whether a live record exists for a fingerprint.
    fn exists(&self, fingerprint: u64) -> bool;

    /// Best-effort purge of every key under the cache's namespace.
    fn reset(&self);

    /// Release the store's resources. Must be idempotent.
    fn close(&self);
}

/// In-process [`SecondaryStore`] backed by a map.
///
/// Useful as an embedded overflow tier when no external store is available,
/// and as the store injected by tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<AHashMap<u64, StoredRecord>>,
}

#[derive(Debug)]
struct StoredRecord {
    record: Vec<u8>,
    deadline: i64,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records in the store.
    pub fn len(&self) -> usize {
        let now = SystemClock.epoch();
        self.entries
            .lock()
            .values()
            .filter(|stored| stored.deadline == 0 || stored.deadline >= now)
            .count()
    }

    /// Whether the store holds no live records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SecondaryStore for MemoryStore {
    fn get(&self, fingerprint: u64) -> CacheResult<Vec<u8>> {
        let entries = self.entries.lock();
        match entries.get(&fingerprint) {
            Some(stored) if stored.deadline == 0 || stored.deadline >= SystemClock.epoch() => {
                Ok(stored.record.clone())
            }
            _ => Err(CacheError::KeyNotFound),
        }
    }

    fn set(&self, fingerprint: u64, record: &[u8], deadline: i64) {
        if deadline < 0 || (deadline > 0 && deadline <= SystemClock.epoch()) {
            return;
        }
        self.entries.lock().insert(
            fingerprint,
            StoredRecord {
                record: record.to_vec(),
                deadline,
            },
        );
    }

    fn del(&self, fingerprint: u64) {
        self.entries.lock().remove(&fingerprint);
    }

    fn exists(&self, fingerprint: u64) -> bool {
        self.get(fingerprint).is_ok()
    }

    fn reset(&self) {
        self.entries.lock().clear();
    }

    fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spill_key_format() {
        assert_eq!(spill_key(0), "ringcache::key::0");
        assert_eq!(spill_key(123_456), "ringcache::key::123456");
        assert_eq!(
            spill_key(u64::MAX),
            format!("ringcache::key::{}", u64::MAX)
        );
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(matches!(store.get(1), Err(CacheError::KeyNotFound)));

        store.set(1, b"record-bytes", 0);
        assert!(store.exists(1));
        assert_eq!(store.get(1).unwrap(), b"record-bytes");
        assert_eq!(store.len(), 1);

        store.del(1);
        assert!(!store.exists(1));
        assert!(store.is_empty());
    }

    #[test]
    fn test_memory_store_skips_past_deadlines() {
        let store = MemoryStore::new();
        store.set(1, b"stale", 1);
        assert!(!store.exists(1));
        assert!(matches!(store.get(1), Err(CacheError::KeyNotFound)));
    }

    #[test]
    fn test_memory_store_honors_future_deadline() {
        let store = MemoryStore::new();
        let deadline = SystemClock.epoch() + 3600;
        store.set(1, b"fresh", deadline);
        assert!(store.exists(1));
    }

    #[test]
    fn test_memory_store_reset_and_close() {
        let store = MemoryStore::new();
        store.set(1, b"a", 0);
        store.set(2, b"b", 0);
        store.reset();
        assert!(store.is_empty());

        store.close();
        store.close();
    }
}
