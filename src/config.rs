//! Cache configuration: defaults, validation, and derived limits.

use crate::error::{CacheError, CacheResult};
use std::time::Duration;

/// One kibibyte.
pub const KB: usize = 1024;
/// One mebibyte.
pub const MB: usize = 1024 * KB;
/// One gibibyte.
pub const GB: usize = 1024 * MB;

/// Default number of shards.
pub const DEFAULT_SHARD_COUNT: usize = 1024;
/// Default initial ring size per shard.
pub const DEFAULT_INITIAL_SHARD_SIZE: usize = 5 * MB;
/// Default janitor period.
pub const DEFAULT_CLEAN_WINDOW: Duration = Duration::from_secs(30 * 60);

/// Cache configuration.
///
/// `Config::default()` gives a working setup; individual fields can be
/// overridden with struct-update syntax.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of shards. Must be a power of two; zero is replaced with
    /// [`DEFAULT_SHARD_COUNT`] during validation.
    pub shard_count: usize,

    /// Initial ring buffer size per shard, in bytes.
    pub initial_shard_size: usize,

    /// Total byte budget across all shard rings. Zero means unlimited.
    /// When set, each shard's ring is capped at
    /// `max(initial_shard_size, max_cache_size / shard_count)`.
    pub max_cache_size: usize,

    /// Period of the background expiration sweep. Zero is replaced with
    /// [`DEFAULT_CLEAN_WINDOW`] during validation.
    pub clean_window: Duration,

    /// TTL applied by [`Cache::set`](crate::Cache::set) when no explicit TTL
    /// is given. Zero means entries never expire.
    pub default_ttl: Duration,

    /// Whether a full shard may evict its oldest records to admit a new one.
    /// When false, writes into a full shard fail with
    /// [`CacheError::MaxEntry`].
    pub evict_on_full: bool,

    /// Optional secondary store receiving evicted records. Only honored
    /// when `evict_on_full` is set.
    pub secondary: Option<SecondaryConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
            initial_shard_size: DEFAULT_INITIAL_SHARD_SIZE,
            max_cache_size: 0,
            clean_window: DEFAULT_CLEAN_WINDOW,
            default_ttl: Duration::ZERO,
            evict_on_full: true,
            secondary: None,
        }
    }
}

impl Config {
    /// Replace zero fields with defaults and reject invalid combinations.
    pub(crate) fn validate(&mut self) -> CacheResult<()> {
        if self.shard_count == 0 {
            self.shard_count = DEFAULT_SHARD_COUNT;
        }
        if self.clean_window.is_zero() {
            self.clean_window = DEFAULT_CLEAN_WINDOW;
        }
        if !self.shard_count.is_power_of_two() {
            return Err(CacheError::InvalidShardCount);
        }
        Ok(())
    }

    /// Per-shard ring cap derived from the global budget. Zero when the
    /// cache is unbounded.
    pub(crate) fn max_shard_size(&self) -> usize {
        if self.max_cache_size == 0 {
            return 0;
        }
        (self.max_cache_size / self.shard_count).max(self.initial_shard_size)
    }
}

/// Connection settings for the secondary store adapter.
#[derive(Debug, Clone, Default)]
pub struct SecondaryConfig {
    /// Store address as `host:port`.
    pub addr: String,

    /// Optional password sent via `AUTH` after connecting.
    pub password: Option<String>,

    /// Connections opened eagerly at construction. Zero selects the
    /// adapter default.
    pub min_idle: usize,

    /// Maximum idle connections retained in the pool. Zero selects the
    /// adapter default.
    pub pool_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.shard_count, DEFAULT_SHARD_COUNT);
        assert_eq!(config.clean_window, DEFAULT_CLEAN_WINDOW);
    }

    #[test]
    fn test_zero_fields_replaced_with_defaults() {
        let mut config = Config {
            shard_count: 0,
            clean_window: Duration::ZERO,
            ..Config::default()
        };
        config.validate().unwrap();
        assert_eq!(config.shard_count, DEFAULT_SHARD_COUNT);
        assert_eq!(config.clean_window, DEFAULT_CLEAN_WINDOW);
    }

    #[test]
    fn test_non_power_of_two_shard_count_rejected() {
        for count in [3, 12, 100, 1000] {
            let mut config = Config {
                shard_count: count,
                ..Config::default()
            };
            assert_eq!(config.validate(), Err(CacheError::InvalidShardCount));
        }
    }

    #[test]
    fn test_one_shard_is_a_valid_count() {
        let mut config = Config {
            shard_count: 1,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_shard_cap_splits_global_budget() {
        let config = Config {
            shard_count: 4,
            initial_shard_size: KB,
            max_cache_size: 64 * KB,
            ..Config::default()
        };
        assert_eq!(config.max_shard_size(), 16 * KB);
    }

    #[test]
    fn test_shard_cap_never_below_initial_size() {
        // A global budget smaller than the initial allocation would starve
        // every shard; the cap floors at the initial size instead.
        let config = Config {
            shard_count: 8,
            initial_shard_size: 4 * KB,
            max_cache_size: 8 * KB,
            ..Config::default()
        };
        assert_eq!(config.max_shard_size(), 4 * KB);
    }

    #[test]
    fn test_unbounded_when_no_budget() {
        let config = Config::default();
        assert_eq!(config.max_shard_size(), 0);
    }
}
