//! Cache configuration.
//!
//! [`CacheConfig`] is the single entry point for building a
//! [`Cache`](crate::Cache): all tunables are fields, optional parameters
//! use fluent builder methods, and validation happens once at construction.
//!
//! # Examples
//!
//! ```
//! use shardcache::{CacheConfig, EvictionPolicy};
//! use std::time::Duration;
//!
//! let config = CacheConfig::new()
//!     .max_size(100_000)
//!     .eviction_policy(EvictionPolicy::AdmissionLfu)
//!     .cleanup_interval(Some(Duration::from_secs(30)));
//! assert!(config.validate().is_ok());
//! ```

use crate::error::CacheError;
use crate::policy::EvictionPolicy;
use core::fmt;
use std::time::Duration;

/// Expiration policy for a single `set` operation.
///
/// Distinguishes "use the cache-wide default" from "never expire": a cache
/// with no default TTL treats [`Ttl::Default`] as [`Ttl::Never`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ttl {
    /// Fall through to [`CacheConfig::default_ttl`]. If the cache has no
    /// default, the entry never expires.
    #[default]
    Default,
    /// The entry never expires; only eviction or explicit removal drops it.
    Never,
    /// The entry expires this long after insertion. Must be non-zero;
    /// a zero duration is rejected with
    /// [`CacheError::InvalidTtl`](crate::CacheError::InvalidTtl).
    After(Duration),
}

/// Configuration for a [`Cache`](crate::Cache).
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `max_size` | 10 000 entries |
/// | `shard_count` | 0 (auto: `min(256, next_pow2(4 × CPUs))`) |
/// | `cleanup_interval` | 5 minutes |
/// | `default_ttl` | none (entries never expire unless asked) |
/// | `eviction_policy` | [`EvictionPolicy::Lru`] |
/// | `stats_enabled` | `true` |
#[derive(Clone)]
pub struct CacheConfig {
    /// Maximum number of entries across all shards. `0` disables eviction
    /// entirely; only TTL expiration and explicit removal shrink the cache.
    pub max_size: usize,

    /// Number of shards. Must be a power of two, or `0` to size
    /// automatically from the CPU count.
    pub shard_count: usize,

    /// Interval of the background expiration sweeper. `None` disables the
    /// sweeper; expired entries are then only removed lazily on access or
    /// via [`Cache::trigger_cleanup`](crate::Cache::trigger_cleanup).
    pub cleanup_interval: Option<Duration>,

    /// TTL applied when a `set` uses [`Ttl::Default`]. `None` means such
    /// entries never expire.
    pub default_ttl: Option<Duration>,

    /// Which eviction policy every shard runs.
    pub eviction_policy: EvictionPolicy,

    /// When `false`, hit/miss/eviction counters are not maintained and
    /// [`Cache::stats`](crate::Cache::stats) reports zeros for them.
    pub stats_enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            shard_count: 0,
            cleanup_interval: Some(Duration::from_secs(300)),
            default_ttl: None,
            eviction_policy: EvictionPolicy::Lru,
            stats_enabled: true,
        }
    }
}

impl CacheConfig {
    /// Creates a configuration with the defaults listed in the type docs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum total entry count (`0` = unbounded).
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Sets the shard count (`0` = auto, otherwise a power of two).
    pub fn shard_count(mut self, shard_count: usize) -> Self {
        self.shard_count = shard_count;
        self
    }

    /// Sets the background sweeper interval (`None` disables it).
    pub fn cleanup_interval(mut self, interval: Option<Duration>) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Sets the TTL used by [`Ttl::Default`] writes.
    pub fn default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Sets the eviction policy.
    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    /// Enables or disables statistics counters.
    pub fn stats_enabled(mut self, enabled: bool) -> Self {
        self.stats_enabled = enabled;
        self
    }

    /// Checks the configuration for inconsistencies.
    ///
    /// The only rejectable state is a shard count that is neither zero nor
    /// a power of two: shard routing masks the fingerprint with
    /// `shard_count - 1`, which requires a power-of-two count.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.shard_count != 0 && !self.shard_count.is_power_of_two() {
            return Err(CacheError::InvalidConfig(
                "shard_count must be zero (auto) or a power of two",
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("max_size", &self.max_size)
            .field("shard_count", &self.shard_count)
            .field("cleanup_interval", &self.cleanup_interval)
            .field("default_ttl", &self.default_ttl)
            .field("eviction_policy", &self.eviction_policy)
            .field("stats_enabled", &self.stats_enabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::new();
        assert_eq!(config.max_size, 10_000);
        assert_eq!(config.shard_count, 0);
        assert_eq!(config.eviction_policy, EvictionPolicy::Lru);
        assert!(config.stats_enabled);
        assert!(config.default_ttl.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let config = CacheConfig::new()
            .max_size(64)
            .shard_count(4)
            .cleanup_interval(None)
            .default_ttl(Some(Duration::from_millis(50)))
            .eviction_policy(EvictionPolicy::AdmissionLfu)
            .stats_enabled(false);
        assert_eq!(config.max_size, 64);
        assert_eq!(config.shard_count, 4);
        assert!(config.cleanup_interval.is_none());
        assert_eq!(config.default_ttl, Some(Duration::from_millis(50)));
        assert_eq!(config.eviction_policy, EvictionPolicy::AdmissionLfu);
        assert!(!config.stats_enabled);
    }

    #[test]
    fn test_shard_count_validation() {
        for valid in [0usize, 1, 2, 4, 64, 256] {
            assert!(CacheConfig::new().shard_count(valid).validate().is_ok());
        }
        for invalid in [3usize, 6, 12, 100] {
            assert!(CacheConfig::new().shard_count(invalid).validate().is_err());
        }
    }

    #[test]
    fn test_ttl_default_is_fallthrough() {
        assert_eq!(Ttl::default(), Ttl::Default);
    }
}
