//! A single cache partition: fingerprint index, record ring, lock, stats.
//!
//! The shard owns one readers-writer lock. Reads hold it shared from index
//! lookup through payload copy-out, so a concurrent writer can never
//! invalidate the record slice mid-read. Writes, deletes, sweeps, eviction,
//! and promotion hold it exclusive. The secondary store is only contacted
//! on the read path after the lock has been released.
//!
//! Overwrites and deletes never remove a record from the ring; they zero
//! its fingerprint field in place (a tombstone) and let FIFO eviction
//! reclaim the bytes when the pop cursor reaches them. This keeps every
//! handle in the index unambiguous.

use crate::clock::Clock;
use crate::config::Config;
use crate::entry;
use crate::error::{CacheError, CacheResult};
use crate::ring::ByteRing;
use crate::sampler::{EntropySampler, Sampler};
use crate::secondary::SecondaryStore;
use crate::stats::{ShardStats, Stats};
use crate::worker::Task;

use ahash::AHashMap;
use crossbeam_channel::Sender;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// Index and storage guarded by the shard lock.
struct ShardInner {
    /// Fingerprint to ring handle. Absent means handle 0.
    index: AHashMap<u64, usize>,
    ring: ByteRing,
    /// Scratch area for packing outgoing records, grown on demand.
    scratch: Vec<u8>,
    sampler: Box<dyn Sampler>,
}

/// One of the cache's independent partitions.
pub(crate) struct Shard {
    inner: RwLock<ShardInner>,
    stats: ShardStats,
    clock: Arc<dyn Clock>,
    secondary: Option<Arc<dyn SecondaryStore>>,
    tasks: Sender<Task>,
    evict_on_full: bool,
    initial_size: usize,
}

impl Shard {
    pub(crate) fn new(
        config: &Config,
        clock: Arc<dyn Clock>,
        secondary: Option<Arc<dyn SecondaryStore>>,
        tasks: Sender<Task>,
    ) -> Self {
        Self {
            inner: RwLock::new(ShardInner {
                index: AHashMap::new(),
                ring: ByteRing::new(config.initial_shard_size, config.max_shard_size()),
                scratch: vec![0; config.initial_shard_size],
                sampler: Box::new(EntropySampler::new()),
            }),
            stats: ShardStats::default(),
            clock,
            secondary,
            tasks,
            evict_on_full: config.evict_on_full,
            initial_size: config.initial_shard_size,
        }
    }

    /// Look up a key.
    ///
    /// The stored CRC of the key is compared before anything is returned:
    /// two keys sharing a fingerprint surface as misses, never as wrong
    /// values. An expired record is reported as such and its deletion is
    /// scheduled off this call path.
    pub(crate) fn get(&self, key: &str, fingerprint: u64) -> CacheResult<Vec<u8>> {
        let guard = self.inner.read();

        let handle = match guard.index.get(&fingerprint) {
            Some(&handle) => handle,
            None => {
                drop(guard);
                self.stats.record_miss();
                return Err(CacheError::KeyNotFound);
            }
        };

        let lookup = guard.ring.get(handle).and_then(|record| {
            if record.len() < entry::HEADER_LEN {
                Err(CacheError::OutOfBounds)
            } else {
                Ok(record)
            }
        });

        match lookup {
            Ok(record) => {
                if entry::read_crc(record) != crc32fast::hash(key.as_bytes()) {
                    drop(guard);
                    self.stats.record_collision();
                    return Err(CacheError::KeyNotFound);
                }

                let deadline = entry::read_deadline(record);
                if deadline != 0 && self.clock.epoch() > deadline {
                    drop(guard);
                    self.schedule(Task::Remove { fingerprint });
                    return Err(CacheError::Expired);
                }

                let value = entry::read_value(record);
                drop(guard);
                self.stats.record_hit();
                Ok(value)
            }
            Err(err) => {
                let Some(secondary) = &self.secondary else {
                    drop(guard);
                    self.stats.record_miss();
                    return Err(err);
                };
                drop(guard);

                let record = match secondary.get(fingerprint) {
                    Ok(record) if record.len() >= entry::HEADER_LEN => record,
                    _ => {
                        self.stats.record_secondary_miss();
                        return Err(CacheError::KeyNotFound);
                    }
                };

                // Promotion back into the ring happens off this call path;
                // the maintenance thread takes the write lock itself.
                self.schedule(Task::Promote {
                    fingerprint,
                    record: record.clone(),
                });
                self.stats.record_secondary_hit();

                if entry::read_crc(&record) != crc32fast::hash(key.as_bytes()) {
                    self.stats.record_collision();
                    return Err(CacheError::KeyNotFound);
                }
                let deadline = entry::read_deadline(&record);
                if deadline != 0 && self.clock.epoch() > deadline {
                    self.schedule(Task::Remove { fingerprint });
                    return Err(CacheError::Expired);
                }

                let value = entry::read_value(&record);
                self.stats.record_hit();
                Ok(value)
            }
        }
    }

    /// Store a value, tombstoning any prior record for the fingerprint and
    /// evicting the oldest records until the new one fits.
    pub(crate) fn set(
        &self,
        key: &str,
        fingerprint: u64,
        value: &[u8],
        ttl: Duration,
    ) -> CacheResult<()> {
        let deadline = self.clock.deadline(ttl);
        let crc = crc32fast::hash(key.as_bytes());

        let mut guard = self.inner.write();
        let inner = &mut *guard;

        if let Some(&prev) = inner.index.get(&fingerprint) {
            if let Ok(record) = inner.ring.get_mut(prev) {
                entry::reset_fingerprint(record);
            }
        }

        let len = entry::wrap(deadline, fingerprint, crc, value, &mut inner.scratch);

        let result = loop {
            match inner.ring.push(&inner.scratch[..len]) {
                Ok(handle) => {
                    inner.index.insert(fingerprint, handle);
                    break Ok(());
                }
                Err(_) => {
                    if !self.evict_on_full || self.evict_locked(inner).is_err() {
                        break Err(CacheError::MaxEntry);
                    }
                }
            }
        };
        drop(guard);

        if result.is_ok() {
            self.stats.record_modification();
        }
        result
    }

    /// Remove a key.
    ///
    /// Double-checked: a cheap read-locked probe first, so the write lock
    /// is only taken when the key plausibly exists in either tier.
    pub(crate) fn del(&self, fingerprint: u64) -> CacheResult<()> {
        self.stats.record_modification();

        {
            let guard = self.inner.read();
            match guard.index.get(&fingerprint) {
                None => {
                    let spilled = self
                        .secondary
                        .as_ref()
                        .is_some_and(|secondary| secondary.exists(fingerprint));
                    if !spilled {
                        return Err(CacheError::KeyNotFound);
                    }
                }
                Some(&handle) => guard.ring.check(handle)?,
            }
        }

        let mut guard = self.inner.write();
        let inner = &mut *guard;
        match inner.index.get(&fingerprint).copied() {
            None => {
                drop(guard);
                if let Some(secondary) = &self.secondary {
                    if secondary.exists(fingerprint) {
                        secondary.del(fingerprint);
                        return Ok(());
                    }
                }
                Err(CacheError::KeyNotFound)
            }
            Some(handle) => {
                let record = inner.ring.get_mut(handle)?;
                entry::reset_fingerprint(record);
                inner.index.remove(&fingerprint);
                Ok(())
            }
        }
    }

    /// Promote a record fetched from the secondary store into the ring.
    ///
    /// Aborts when the fingerprint is already indexed: a concurrent writer
    /// beat the promotion, and the write wins.
    pub(crate) fn promote(&self, fingerprint: u64, record: Vec<u8>) {
        let Some(secondary) = &self.secondary else {
            return;
        };

        let mut guard = self.inner.write();
        if guard.index.contains_key(&fingerprint) {
            return;
        }
        let inner = &mut *guard;

        let installed = loop {
            match inner.ring.push(&record) {
                Ok(handle) => {
                    inner.index.insert(fingerprint, handle);
                    break true;
                }
                Err(_) => {
                    if !self.evict_on_full || self.evict_locked(inner).is_err() {
                        break false;
                    }
                }
            }
        };
        drop(guard);

        if installed {
            secondary.del(fingerprint);
            self.stats.record_sync();
        }
    }

    /// Pop the oldest record, dropping its index entry and demoting it to
    /// the secondary store. Tombstoned records (and the growth filler) die
    /// silently.
    fn evict_locked(&self, inner: &mut ShardInner) -> CacheResult<()> {
        let record = inner.ring.pop()?;
        if record.len() < entry::HEADER_LEN {
            return Ok(());
        }

        let fingerprint = entry::read_fingerprint(&record);
        if fingerprint == 0 {
            return Ok(());
        }

        inner.index.remove(&fingerprint);
        if let Some(secondary) = &self.secondary {
            secondary.set(fingerprint, &record, entry::read_deadline(&record));
        }
        Ok(())
    }

    /// Evict the oldest record, if any.
    #[allow(dead_code)]
    pub(crate) fn evict_oldest(&self) -> CacheResult<()> {
        let mut guard = self.inner.write();
        self.evict_locked(&mut guard)
    }

    /// Purge expired records from a randomly bounded slice of the index.
    ///
    /// The bound is drawn in `[0, index_len)` so a single pass stays cheap;
    /// repeated passes cover the whole index over time.
    pub(crate) fn sweep_expired(&self) {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        if inner.index.is_empty() {
            return;
        }

        let mut budget = inner.sampler.sample(inner.index.len());
        let now = self.clock.epoch();
        let mut dead = Vec::new();

        for (&fingerprint, &handle) in inner.index.iter() {
            if budget == 0 {
                break;
            }
            let Ok(record) = inner.ring.get(handle) else {
                continue;
            };
            if record.len() < entry::HEADER_LEN {
                continue;
            }
            let deadline = entry::read_deadline(record);
            if deadline != 0 && now > deadline {
                dead.push((fingerprint, handle));
            }
            budget -= 1;
        }

        for &(fingerprint, handle) in &dead {
            if let Ok(record) = inner.ring.get_mut(handle) {
                entry::reset_fingerprint(record);
            }
            inner.index.remove(&fingerprint);
        }

        if !dead.is_empty() {
            tracing::debug!(purged = dead.len(), "sweep removed expired entries");
        }
    }

    /// Drop every record and zero the statistics. The secondary namespace
    /// is purged as well.
    pub(crate) fn reset(&self) {
        let mut guard = self.inner.write();
        guard.index.clear();
        guard.ring.reset();
        guard.scratch = vec![0; self.initial_size];
        drop(guard);

        self.stats.reset();
        if let Some(secondary) = &self.secondary {
            secondary.reset();
        }
    }

    pub(crate) fn close(&self) {
        if let Some(secondary) = &self.secondary {
            secondary.close();
        }
    }

    /// Number of indexed keys.
    pub(crate) fn len(&self) -> usize {
        self.inner.read().index.len()
    }

    /// Bytes allocated for this shard's ring.
    pub(crate) fn capacity(&self) -> usize {
        self.inner.read().ring.capacity()
    }

    pub(crate) fn stats(&self) -> Stats {
        self.stats.snapshot()
    }

    fn schedule(&self, task: Task) {
        // After close the maintenance thread is gone; drop the task.
        let _ = self.tasks.send(task);
    }
}
