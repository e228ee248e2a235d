//! Cache statistics.
//!
//! Each shard owns a [`ShardStats`] block of 64-bit relaxed atomics so the
//! hot path can count without taking a lock. [`Stats`] is the aggregated,
//! point-in-time snapshot the facade hands to callers: counters are read
//! independently per shard, so the snapshot is eventually consistent, not
//! transactional.

use core::sync::atomic::{AtomicU64, Ordering};

/// Per-shard counters, updated with relaxed atomics from any lock level.
///
/// When statistics are disabled in the configuration, every record method
/// is a no-op and the counters stay zero.
#[derive(Debug)]
pub(crate) struct ShardStats {
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    rejected_inserts: AtomicU64,
    callback_panics: AtomicU64,
}

impl ShardStats {
    pub(crate) fn new(enabled: bool) -> Self {
        ShardStats {
            enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            rejected_inserts: AtomicU64::new(0),
            callback_panics: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn record_hit(&self) {
        if self.enabled {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn record_miss(&self) {
        if self.enabled {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn record_eviction(&self) {
        if self.enabled {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn record_expiration(&self) {
        if self.enabled {
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn record_rejected_insert(&self) {
        if self.enabled {
            self.rejected_inserts.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Callback panics are always counted, independent of `enabled`: they
    /// are an operational signal, not a performance statistic.
    #[inline]
    pub(crate) fn record_callback_panic(&self) {
        self.callback_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub(crate) fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub(crate) fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub(crate) fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    pub(crate) fn rejected_inserts(&self) -> u64 {
        self.rejected_inserts.load(Ordering::Relaxed)
    }

    /// Lifetime hit ratio of this shard; the admission policy's adaptive
    /// threshold samples this.
    pub(crate) fn hit_ratio(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Aggregated cache statistics.
///
/// Produced by [`Cache::stats`](crate::Cache::stats) by summing the
/// per-shard counters. Counters cover the cache's whole lifetime and
/// survive [`clear`](crate::Cache::clear).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[non_exhaustive]
pub struct Stats {
    /// Lookups that found a live entry.
    pub hits: u64,
    /// Lookups that found nothing, or only an expired entry.
    pub misses: u64,
    /// Entries removed by the eviction policy to make room.
    pub evictions: u64,
    /// Entries removed because their TTL had passed.
    pub expirations: u64,
    /// Inserts silently refused by the admission policy. Never counted as
    /// evictions.
    pub rejected_inserts: u64,
    /// Current number of resident entries (may transiently include entries
    /// whose expiry has passed but which no sweep has observed yet).
    pub size: u64,
    /// Configured maximum entry count; 0 when unbounded.
    pub capacity: u64,
    /// `hits / (hits + misses)`, or 0 when no lookups have happened.
    pub hit_ratio: f64,
    /// Number of shards serving the cache.
    pub shards: usize,
}

impl Stats {
    /// Derives the hit ratio from the hit and miss counters.
    pub(crate) fn finish(mut self) -> Self {
        let total = self.hits + self.misses;
        self.hit_ratio = if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        };
        self
    }
}
