//! Sharded in-memory byte cache with FIFO eviction and an optional
//! spill tier.
//!
//! Keys are UTF-8 strings, values are opaque byte payloads. The cache
//! splits its keyspace across a power-of-two number of shards, each backed
//! by a packed ring buffer of records, and enforces an overall byte budget
//! by evicting the oldest records of a full shard. Entries may carry a TTL
//! and are expired lazily on read plus periodically by a background
//! janitor. A secondary key/value store (an in-process map or a RESP
//! server such as Redis) can be attached as an overflow tier that receives
//! evicted records.
//!
//! # Architecture
//!
//! ```text
//!                      +---------------------+
//!                      |        Cache        |
//!                      | fnv1a(key) & (N-1)  |
//!                      +----------+----------+
//!                                 |
//!              +------------------+------------------+
//!              v                  v                  v
//!        +-----------+      +-----------+      +-----------+
//!        |  Shard 0  |      |  Shard 1  | ...  | Shard N-1 |
//!        | index     |      | index     |      | index     |
//!        | byte ring |      | byte ring |      | byte ring |
//!        +-----+-----+      +-----+-----+      +-----+-----+
//!              | evict            |                  |
//!              v                  v                  v
//!        +---------------------------------------------------+
//!        |           secondary store (optional)              |
//!        +---------------------------------------------------+
//! ```
//!
//! A single maintenance thread per cache runs the expiration janitor and
//! applies work deferred off the hot path (promotions from the secondary
//! store, deletions of entries observed to be expired).
//!
//! # Example
//!
//! ```ignore
//! use ringcache::{Cache, Config, MB};
//! use std::time::Duration;
//!
//! let cache = Cache::new(Config {
//!     shard_count: 64,
//!     initial_shard_size: MB,
//!     max_cache_size: 256 * MB,
//!     ..Config::default()
//! })?;
//!
//! cache.set("greeting", b"hello")?;
//! assert_eq!(cache.get("greeting")?, b"hello");
//!
//! cache.set_with_ttl("session", b"token", Duration::from_secs(60))?;
//! cache.delete("greeting")?;
//! cache.close();
//! # Ok::<(), ringcache::CacheError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod clock;
mod config;
mod entry;
mod error;
mod hasher;
mod resp;
mod ring;
mod sampler;
mod secondary;
mod shard;
mod stats;
mod worker;

pub use config::{
    Config, SecondaryConfig, DEFAULT_CLEAN_WINDOW, DEFAULT_INITIAL_SHARD_SIZE,
    DEFAULT_SHARD_COUNT, GB, KB, MB,
};
pub use error::{CacheError, CacheResult};
pub use resp::RespStore;
pub use secondary::{MemoryStore, SecondaryStore};
pub use stats::Stats;

use clock::{Clock, SystemClock};
use hasher::{Fnv1a, KeyHasher};
use shard::Shard;
use worker::{Task, Worker};

use crossbeam_channel::{bounded, unbounded, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// The cache: a router over independent shards plus one maintenance thread.
///
/// All operations take `&self`; the type is `Send + Sync` and is normally
/// shared behind an [`Arc`].
pub struct Cache {
    shards: Arc<[Shard]>,
    mask: u64,
    hasher: Fnv1a,
    default_ttl: Duration,
    shutdown: Sender<()>,
    janitor: Mutex<Option<JoinHandle<()>>>,
}

impl Cache {
    /// Build a cache from a configuration.
    ///
    /// Validates the configuration (shard count must be a power of two;
    /// zero fields are replaced with defaults), allocates every shard, and
    /// starts the maintenance thread. When a secondary store is configured
    /// and eviction is enabled, the process-wide RESP connection pool is
    /// established here.
    pub fn new(mut config: Config) -> CacheResult<Self> {
        config.validate()?;
        let secondary: Option<Arc<dyn SecondaryStore>> =
            match (&config.secondary, config.evict_on_full) {
                (Some(settings), true) => Some(RespStore::shared(settings)?),
                _ => None,
            };
        Self::build(config, secondary)
    }

    /// Build a cache around a caller-supplied secondary store.
    ///
    /// Like the config-wired adapter, the store is only consulted when
    /// `evict_on_full` is set; without eviction nothing ever reaches the
    /// overflow tier.
    pub fn with_secondary(config: Config, secondary: Arc<dyn SecondaryStore>) -> CacheResult<Self> {
        let secondary = config.evict_on_full.then_some(secondary);
        Self::build(config, secondary)
    }

    fn build(mut config: Config, secondary: Option<Arc<dyn SecondaryStore>>) -> CacheResult<Self> {
        config.validate()?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let (task_tx, task_rx) = unbounded();
        let (shutdown_tx, shutdown_rx) = bounded(1);

        let shards: Arc<[Shard]> = (0..config.shard_count)
            .map(|_| Shard::new(&config, clock.clone(), secondary.clone(), task_tx.clone()))
            .collect();

        let worker = Worker::new(shards.clone(), config.clean_window, task_rx, shutdown_rx);
        let janitor = std::thread::spawn(move || worker.run());

        Ok(Self {
            mask: (config.shard_count - 1) as u64,
            shards,
            hasher: Fnv1a,
            default_ttl: config.default_ttl,
            shutdown: shutdown_tx,
            janitor: Mutex::new(Some(janitor)),
        })
    }

    /// Read the value stored for a key.
    pub fn get(&self, key: &str) -> CacheResult<Vec<u8>> {
        let fingerprint = self.hasher.sum64(key);
        self.shard_for(fingerprint).get(key, fingerprint)
    }

    /// Store a value under a key with the configured default TTL.
    pub fn set(&self, key: &str, value: &[u8]) -> CacheResult<()> {
        self.set_with_ttl(key, value, self.default_ttl)
    }

    /// Store a value under a key. A zero TTL means the entry never expires.
    pub fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let fingerprint = self.hasher.sum64(key);
        self.shard_for(fingerprint).set(key, fingerprint, value, ttl)
    }

    /// Remove a key from both tiers.
    pub fn delete(&self, key: &str) -> CacheResult<()> {
        let fingerprint = self.hasher.sum64(key);
        self.shard_for(fingerprint).del(fingerprint)
    }

    /// Empty every shard and zero all statistics.
    pub fn reset(&self) {
        for shard in self.shards.iter() {
            shard.reset();
        }
    }

    /// Stop the maintenance thread and release secondary-store resources.
    ///
    /// Idempotent; also runs on drop. The cache remains usable afterwards,
    /// but expired entries are no longer swept and nothing is promoted from
    /// the secondary store.
    pub fn close(&self) {
        if let Some(handle) = self.janitor.lock().take() {
            let _ = self.shutdown.send(());
            let _ = handle.join();
            for shard in self.shards.iter() {
                shard.close();
            }
            tracing::debug!("cache closed");
        }
    }

    /// Number of keys currently indexed across all shards.
    pub fn len(&self) -> usize {
        self.shards.iter().map(Shard::len).sum()
    }

    /// Whether the cache holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes allocated across all shard rings.
    pub fn capacity(&self) -> usize {
        self.shards.iter().map(Shard::capacity).sum()
    }

    /// Statistics summed across all shards.
    pub fn stats(&self) -> Stats {
        let mut total = Stats::default();
        for shard in self.shards.iter() {
            total.merge(&shard.stats());
        }
        total
    }

    fn shard_for(&self, fingerprint: u64) -> &Shard {
        &self.shards[(fingerprint & self.mask) as usize]
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> Config {
        Config {
            shard_count: 4,
            initial_shard_size: 4 * KB,
            ..Config::default()
        }
    }

    #[test]
    fn test_invalid_shard_count_rejected() {
        let config = Config {
            shard_count: 12,
            ..small_config()
        };
        assert!(matches!(
            Cache::new(config),
            Err(CacheError::InvalidShardCount)
        ));
    }

    #[test]
    fn test_zero_shard_count_uses_default() {
        let cache = Cache::new(Config {
            shard_count: 0,
            initial_shard_size: KB,
            ..Config::default()
        })
        .unwrap();
        assert_eq!(cache.capacity(), DEFAULT_SHARD_COUNT * KB);
    }

    #[test]
    fn test_capacity_sums_shard_rings() {
        let cache = Cache::new(small_config()).unwrap();
        assert_eq!(cache.capacity(), 4 * 4 * KB);
    }

    #[test]
    fn test_keys_route_to_consistent_shards() {
        let cache = Cache::new(small_config()).unwrap();
        for i in 0..64 {
            let key = format!("key-{i}");
            cache.set(&key, key.as_bytes()).unwrap();
        }
        for i in 0..64 {
            let key = format!("key-{i}");
            assert_eq!(cache.get(&key).unwrap(), key.as_bytes());
        }
        assert_eq!(cache.len(), 64);
    }

    #[test]
    fn test_close_is_idempotent() {
        let cache = Cache::new(small_config()).unwrap();
        cache.close();
        cache.close();

        // Still usable after close.
        cache.set("late", b"entry").unwrap();
        assert_eq!(cache.get("late").unwrap(), b"entry");
    }

    #[test]
    fn test_cache_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Cache>();
    }
}
