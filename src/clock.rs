//! Wall-clock abstraction injected into shards.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of the current time, in whole seconds since the Unix epoch.
///
/// Shards never read the system clock directly so that expiration logic can
/// be driven deterministically in tests.
pub(crate) trait Clock: Send + Sync {
    /// Current time as epoch seconds.
    fn epoch(&self) -> i64;

    /// Absolute expiration deadline for a TTL. A zero TTL means the entry
    /// never expires and maps to deadline 0.
    fn deadline(&self, ttl: Duration) -> i64 {
        if ttl.is_zero() {
            return 0;
        }
        self.epoch() + ttl.as_secs() as i64
    }
}

/// Production clock backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SystemClock;

impl Clock for SystemClock {
    fn epoch(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }
}

/// Manually advanced clock for tests.
#[cfg(test)]
pub(crate) struct ManualClock {
    now: std::sync::atomic::AtomicI64,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn at(now: i64) -> Self {
        Self {
            now: std::sync::atomic::AtomicI64::new(now),
        }
    }

    pub(crate) fn advance(&self, secs: i64) {
        self.now
            .fetch_add(secs, std::sync::atomic::Ordering::Relaxed);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn epoch(&self) -> i64 {
        self.now.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_past_2020() {
        assert!(SystemClock.epoch() > 1_577_836_800);
    }

    #[test]
    fn test_zero_ttl_means_no_deadline() {
        assert_eq!(SystemClock.deadline(Duration::ZERO), 0);
    }

    #[test]
    fn test_deadline_is_epoch_plus_ttl() {
        let clock = ManualClock::at(1_000);
        assert_eq!(clock.deadline(Duration::from_secs(30)), 1_030);
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::at(10);
        clock.advance(5);
        assert_eq!(clock.epoch(), 15);
    }
}
