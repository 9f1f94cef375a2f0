//! Cache statistics counters.
//!
//! Each shard owns a set of relaxed atomic counters that are incremented
//! without taking the shard lock. [`Stats`] is the plain snapshot handed to
//! callers; the cache sums snapshots across shards.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-shard atomic counters.
#[derive(Debug, Default)]
pub(crate) struct ShardStats {
    hits: AtomicU64,
    misses: AtomicU64,
    secondary_hits: AtomicU64,
    secondary_misses: AtomicU64,
    collisions: AtomicU64,
    modifications: AtomicU64,
    syncs: AtomicU64,
}

impl ShardStats {
    /// Record a key served from the primary ring.
    #[inline]
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a key found in neither tier.
    #[inline]
    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a key served from the secondary store.
    #[inline]
    pub(crate) fn record_secondary_hit(&self) {
        self.secondary_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a secondary lookup that came back empty.
    #[inline]
    pub(crate) fn record_secondary_miss(&self) {
        self.secondary_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a fingerprint match whose key checksum disagreed.
    #[inline]
    pub(crate) fn record_collision(&self) {
        self.collisions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a write or delete.
    #[inline]
    pub(crate) fn record_modification(&self) {
        self.modifications.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a promotion from the secondary store into the ring.
    #[inline]
    pub(crate) fn record_sync(&self) {
        self.syncs.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the current counter values.
    pub(crate) fn snapshot(&self) -> Stats {
        Stats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            secondary_hits: self.secondary_hits.load(Ordering::Relaxed),
            secondary_misses: self.secondary_misses.load(Ordering::Relaxed),
            collisions: self.collisions.load(Ordering::Relaxed),
            modifications: self.modifications.load(Ordering::Relaxed),
            syncs: self.syncs.load(Ordering::Relaxed),
        }
    }

    /// Zero all counters.
    pub(crate) fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.secondary_hits.store(0, Ordering::Relaxed);
        self.secondary_misses.store(0, Ordering::Relaxed);
        self.collisions.store(0, Ordering::Relaxed);
        self.modifications.store(0, Ordering::Relaxed);
        self.syncs.store(0, Ordering::Relaxed);
    }
}

/// Snapshot of cache statistics, summed across shards.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Keys served from the primary ring.
    pub hits: u64,
    /// Keys found in neither tier.
    pub misses: u64,
    /// Keys served from the secondary store.
    #[serde(rename = "hits-secondary")]
    pub secondary_hits: u64,
    /// Secondary lookups that came back empty.
    #[serde(rename = "misses-secondary")]
    pub secondary_misses: u64,
    /// Fingerprint matches whose key checksum disagreed.
    pub collisions: u64,
    /// Writes and deletes.
    pub modifications: u64,
    /// Promotions from the secondary store into the ring.
    pub syncs: u64,
}

impl Stats {
    /// Add another snapshot into this one.
    pub fn merge(&mut self, other: &Stats) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.secondary_hits += other.secondary_hits;
        self.secondary_misses += other.secondary_misses;
        self.collisions += other.collisions;
        self.modifications += other.modifications;
        self.syncs += other.syncs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let stats = ShardStats::default();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_secondary_hit();
        stats.record_secondary_miss();
        stats.record_collision();
        stats.record_modification();
        stats.record_sync();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.hits, 2);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.secondary_hits, 1);
        assert_eq!(snapshot.secondary_misses, 1);
        assert_eq!(snapshot.collisions, 1);
        assert_eq!(snapshot.modifications, 1);
        assert_eq!(snapshot.syncs, 1);
    }

    #[test]
    fn test_reset_zeroes_counters() {
        let stats = ShardStats::default();
        stats.record_hit();
        stats.record_modification();
        stats.reset();
        assert_eq!(stats.snapshot(), Stats::default());
    }

    #[test]
    fn test_merge_sums_every_counter() {
        let mut total = Stats {
            hits: 1,
            misses: 2,
            secondary_hits: 3,
            secondary_misses: 4,
            collisions: 5,
            modifications: 6,
            syncs: 7,
        };
        let other = total;
        total.merge(&other);
        assert_eq!(
            total,
            Stats {
                hits: 2,
                misses: 4,
                secondary_hits: 6,
                secondary_misses: 8,
                collisions: 10,
                modifications: 12,
                syncs: 14,
            }
        );
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(Stats::default()).unwrap();
        let object = json.as_object().unwrap();
        for field in [
            "hits",
            "misses",
            "hits-secondary",
            "misses-secondary",
            "collisions",
            "modifications",
            "syncs",
        ] {
            assert!(object.contains_key(field), "missing field {field}");
        }
    }
}
