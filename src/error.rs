//! Error types for cache operations.

use std::fmt;

/// Errors that can occur during cache operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    /// No live record for this key in the primary or the secondary tier.
    KeyNotFound,

    /// A record exists but its expiration has passed.
    /// The read schedules an asynchronous deletion of the record.
    Expired,

    /// The shard is at its size limit and eviction is disabled or
    /// produced no space for the new record.
    MaxEntry,

    /// The ring buffer holds no records.
    Empty,

    /// The ring buffer is at its maximum capacity.
    Full,

    /// A handle must be greater than zero (offset zero is reserved).
    InvalidHandle,

    /// A handle points outside the ring buffer's backing array.
    OutOfBounds,

    /// The configured shard count is not a power of two.
    InvalidShardCount,

    /// The secondary store could not be reached.
    SecondaryUnavailable,
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyNotFound => write!(f, "key not found"),
            Self::Expired => write!(f, "entry expired"),
            Self::MaxEntry => write!(f, "shard size limit reached"),
            Self::Empty => write!(f, "empty ring"),
            Self::Full => write!(f, "full ring, maximum size limit reached"),
            Self::InvalidHandle => write!(f, "handle must be greater than zero"),
            Self::OutOfBounds => write!(f, "handle out of range"),
            Self::InvalidShardCount => write!(f, "shard count must be a power of two"),
            Self::SecondaryUnavailable => write!(f, "secondary store unavailable"),
        }
    }
}

impl std::error::Error for CacheError {}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_all_variants() {
        assert_eq!(format!("{}", CacheError::KeyNotFound), "key not found");
        assert_eq!(format!("{}", CacheError::Expired), "entry expired");
        assert_eq!(format!("{}", CacheError::MaxEntry), "shard size limit reached");
        assert_eq!(format!("{}", CacheError::Empty), "empty ring");
        assert_eq!(
            format!("{}", CacheError::Full),
            "full ring, maximum size limit reached"
        );
        assert_eq!(
            format!("{}", CacheError::InvalidHandle),
            "handle must be greater than zero"
        );
        assert_eq!(format!("{}", CacheError::OutOfBounds), "handle out of range");
        assert_eq!(
            format!("{}", CacheError::InvalidShardCount),
            "shard count must be a power of two"
        );
        assert_eq!(
            format!("{}", CacheError::SecondaryUnavailable),
            "secondary store unavailable"
        );
    }

    #[test]
    fn test_error_is_error_trait() {
        fn assert_error<E: std::error::Error>() {}
        assert_error::<CacheError>();
    }

    #[test]
    fn test_cache_result() {
        let ok: CacheResult<u32> = Ok(7);
        assert!(matches!(ok, Ok(7)));

        let err: CacheResult<u32> = Err(CacheError::Empty);
        assert!(matches!(err, Err(CacheError::Empty)));
    }
}
