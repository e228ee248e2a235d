//! Cache entry type and the monotonic clock it is stamped with.
//!
//! A [`CacheEntry`] holds the key, the value, the precomputed fingerprint,
//! the absolute expiry instant, and access bookkeeping. The bookkeeping
//! fields are atomics: recording a hit only needs a shared reference, so
//! policies that do not splice the recency list on access (FIFO, LFU) can
//! serve hits under the shard's read lock.
//!
//! Time is kept as nanoseconds on a cache-local monotonic [`Clock`] rather
//! than wall-clock time, so TTL arithmetic is immune to system clock
//! adjustments.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Callback invoked with the key and value of an entry when it leaves the
/// cache (eviction, expiration, deletion, overwrite, clear, or close).
///
/// Runs synchronously under the owning shard's write lock: it must be
/// quick and must not call back into the cache for the same key.
pub type EvictionCallback<K, V> = Arc<dyn Fn(&K, &V) + Send + Sync>;

/// Expiry stamp meaning "never expires".
pub(crate) const NO_EXPIRY: u64 = u64::MAX;

/// Monotonic nanosecond clock shared by a cache and its shards.
///
/// All entry timestamps are nanoseconds elapsed since the cache was built.
#[derive(Clone)]
pub(crate) struct Clock {
    base: Instant,
}

impl Clock {
    pub(crate) fn new() -> Self {
        Clock {
            base: Instant::now(),
        }
    }

    /// Nanoseconds since the cache was constructed.
    #[allow(clippy::cast_possible_truncation)] // ~584 years of uptime
    pub(crate) fn now(&self) -> u64 {
        self.base.elapsed().as_nanos() as u64
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock").field("now", &self.now()).finish()
    }
}

/// A single cached entry.
///
/// Owned by the shard's recency list; addressed by raw pointer from the
/// shard's map. Structural fields (`key`, `value`, expiry, callback) are
/// only mutated under the shard's write lock; the atomic access fields may
/// be updated under a read lock.
pub(crate) struct CacheEntry<K, V> {
    /// The cached key.
    pub(crate) key: K,

    /// The cached value.
    pub(crate) value: V,

    /// The key's fingerprint, fixed at insertion. Keyed into the admission
    /// sketch and doorkeeper so eviction scoring never re-hashes the key.
    pub(crate) hash: u64,

    /// Absolute expiry on the cache clock; [`NO_EXPIRY`] when the entry
    /// never expires.
    pub(crate) expires_at: u64,

    /// Creation instant on the cache clock.
    pub(crate) created_at: u64,

    /// Last access instant; updated on every hit.
    last_accessed: AtomicU64,

    /// Number of hits this entry has served. The LFU policy's per-entry
    /// frequency counter.
    accesses: AtomicU64,

    /// Callback fired exactly once when this entry leaves the cache.
    pub(crate) on_evict: Option<EvictionCallback<K, V>>,
}

impl<K, V> CacheEntry<K, V> {
    pub(crate) fn new(
        key: K,
        value: V,
        hash: u64,
        expires_at: u64,
        now: u64,
        on_evict: Option<EvictionCallback<K, V>>,
    ) -> Self {
        CacheEntry {
            key,
            value,
            hash,
            expires_at,
            created_at: now,
            last_accessed: AtomicU64::new(now),
            accesses: AtomicU64::new(0),
            on_evict,
        }
    }

    /// Whether the entry's expiry has passed at instant `now`.
    #[inline]
    pub(crate) fn is_expired(&self, now: u64) -> bool {
        self.expires_at <= now && self.expires_at != NO_EXPIRY
    }

    /// Records a hit: bumps the access counter and the last-access stamp.
    /// Returns the new access count.
    #[inline]
    pub(crate) fn record_access(&self, now: u64) -> u64 {
        self.last_accessed.store(now, Ordering::Relaxed);
        self.accesses.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Last access instant on the cache clock.
    #[inline]
    pub(crate) fn last_accessed(&self) -> u64 {
        self.last_accessed.load(Ordering::Relaxed)
    }

    /// Hits served by this entry since insertion.
    #[inline]
    pub(crate) fn access_count(&self) -> u64 {
        self.accesses.load(Ordering::Relaxed)
    }

    /// Remaining lifetime at instant `now`; `None` when the entry never
    /// expires. Callers check `is_expired` first, so saturation only
    /// covers the race between that check and this read.
    #[inline]
    pub(crate) fn ttl_remaining(&self, now: u64) -> Option<Duration> {
        if self.expires_at == NO_EXPIRY {
            None
        } else {
            Some(Duration::from_nanos(self.expires_at.saturating_sub(now)))
        }
    }
}

impl<K: fmt::Debug, V> fmt::Debug for CacheEntry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("hash", &self.hash)
            .field("expires_at", &self.expires_at)
            .field("created_at", &self.created_at)
            .field("accesses", &self.access_count())
            .field("has_callback", &self.on_evict.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(expires_at: u64, now: u64) -> CacheEntry<&'static str, i32> {
        CacheEntry::new("key", 42, 7, expires_at, now, None)
    }

    #[test]
    fn test_clock_is_monotonic() {
        let clock = Clock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_never_expires() {
        let e = entry(NO_EXPIRY, 0);
        assert!(!e.is_expired(0));
        assert!(!e.is_expired(u64::MAX - 1));
        assert_eq!(e.ttl_remaining(123), None);
    }

    #[test]
    fn test_expiry_boundary() {
        let e = entry(1_000, 0);
        assert!(!e.is_expired(999));
        assert!(e.is_expired(1_000));
        assert!(e.is_expired(1_001));
    }

    #[test]
    fn test_ttl_remaining() {
        let e = entry(1_000, 0);
        assert_eq!(e.ttl_remaining(400), Some(Duration::from_nanos(600)));
        // Saturates rather than underflowing once expired.
        assert_eq!(e.ttl_remaining(2_000), Some(Duration::ZERO));
    }

    #[test]
    fn test_record_access() {
        let e = entry(NO_EXPIRY, 5);
        assert_eq!(e.access_count(), 0);
        assert_eq!(e.last_accessed(), 5);
        assert_eq!(e.record_access(9), 1);
        assert_eq!(e.record_access(12), 2);
        assert_eq!(e.access_count(), 2);
        assert_eq!(e.last_accessed(), 12);
    }

    #[test]
    fn test_callback_is_carried() {
        let cb: EvictionCallback<&str, i32> = Arc::new(|_k, _v| {});
        let e = CacheEntry::new("key", 42, 7, NO_EXPIRY, 0, Some(cb));
        assert!(e.on_evict.is_some());
    }
}
