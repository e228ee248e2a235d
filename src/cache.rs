//! The cache facade.
//!
//! [`Cache`] fans every operation out to one of N independent shards,
//! picked by masking the key's fingerprint. Shards never interact: a
//! stalled writer in one shard cannot block readers of another, and
//! statistics are only merged when asked for.
//!
//! # Lifecycle
//!
//! Construction validates the configuration, builds the shards, and,
//! when a cleanup interval is configured, starts the janitor: a
//! background thread that periodically sweeps expired entries from every
//! shard. [`close`](Cache::close) stops the janitor (it observes the stop
//! signal within one tick), clears all shards firing their callbacks, and
//! leaves the cache in a terminal state where mutating calls fail with
//! [`CacheError::Closed`] and reads report absence. Dropping the cache
//! closes it.
//!
//! # Example
//!
//! ```
//! use shardcache::{Cache, CacheConfig, EvictionPolicy, Ttl};
//!
//! let cache = Cache::new(
//!     CacheConfig::new()
//!         .max_size(10_000)
//!         .eviction_policy(EvictionPolicy::AdmissionLfu),
//! )
//! .unwrap();
//!
//! cache.set("user:1".to_string(), 42u32, Ttl::Never).unwrap();
//! assert_eq!(cache.get(&"user:1".to_string()), Some(42));
//! cache.close();
//! ```

use crate::config::{CacheConfig, Ttl};
use crate::entry::{Clock, EvictionCallback, NO_EXPIRY};
use crate::error::CacheError;
use crate::fingerprint::{auto_shard_count, shard_index, Fingerprint};
use crate::shard::Shard;
use crate::stats::Stats;
use core::fmt;
use core::hash::Hash;
use core::sync::atomic::{AtomicBool, Ordering};
use parking_lot::Mutex;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Shared state: everything the shards and the janitor need.
struct CacheCore<K, V> {
    shards: Box<[Shard<K, V>]>,
    config: CacheConfig,
    clock: Clock,
    /// Shared with every shard, which re-checks it under its write lock:
    /// the closing thread flips this before clearing, so no insert can
    /// outlive the close.
    closed: Arc<AtomicBool>,
}

impl<K, V> CacheCore<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn cleanup_all(&self) -> usize {
        let now = self.clock.now();
        self.shards.iter().map(|shard| shard.cleanup(now)).sum()
    }
}

/// Handle to the background sweeper thread.
struct Janitor {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// A sharded, thread-safe, in-process key-value cache with TTL expiration
/// and pluggable eviction.
///
/// All methods take `&self`; share the cache across threads with `Arc`.
/// Values are cloned out of the cache on reads, so `V` is typically cheap
/// to clone (`Arc<T>`, small structs, handles).
///
/// See the [crate docs](crate) for the policy selection guide and the
/// architecture overview.
pub struct Cache<K, V> {
    core: Arc<CacheCore<K, V>>,
    janitor: Mutex<Option<Janitor>>,
}

impl<K, V> Cache<K, V>
where
    K: Fingerprint + Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Builds a cache from `config` and starts the background sweeper if
    /// a cleanup interval is configured.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidConfig`] when the configuration fails
    /// [`CacheConfig::validate`].
    pub fn new(config: CacheConfig) -> Result<Self, CacheError> {
        config.validate()?;

        let shard_count = if config.shard_count == 0 {
            auto_shard_count()
        } else {
            config.shard_count
        };
        // Each shard gets an equal slice of the budget, rounded up so the
        // configured total is always reachable.
        let shard_capacity = if config.max_size == 0 {
            0
        } else {
            config.max_size.div_ceil(shard_count)
        };

        let closed = Arc::new(AtomicBool::new(false));
        let shards: Box<[Shard<K, V>]> = (0..shard_count)
            .map(|_| {
                Shard::new(
                    shard_capacity,
                    config.eviction_policy,
                    config.stats_enabled,
                    Arc::clone(&closed),
                )
            })
            .collect();

        tracing::debug!(
            shards = shard_count,
            shard_capacity,
            policy = ?config.eviction_policy,
            "cache constructed"
        );

        let core = Arc::new(CacheCore {
            shards,
            config,
            clock: Clock::new(),
            closed,
        });

        let janitor = core
            .config
            .cleanup_interval
            .filter(|interval| !interval.is_zero())
            .map(|interval| Self::spawn_janitor(Arc::clone(&core), interval));

        Ok(Cache {
            core,
            janitor: Mutex::new(janitor),
        })
    }

    fn spawn_janitor(core: Arc<CacheCore<K, V>>, interval: Duration) -> Janitor {
        let (stop, ticks) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name("shardcache-janitor".into())
            .spawn(move || loop {
                match ticks.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if core.closed.load(Ordering::Acquire) {
                            break;
                        }
                        let swept = core.cleanup_all();
                        if swept > 0 {
                            tracing::debug!(swept, "janitor sweep");
                        }
                    }
                    // Stop signal or cache dropped: either way, done.
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .expect("failed to spawn janitor thread");
        Janitor { stop, handle }
    }

    #[inline]
    fn shard_for(&self, hash: u64) -> &Shard<K, V> {
        &self.core.shards[shard_index(hash, self.core.shards.len())]
    }

    /// Resolves a [`Ttl`] into an absolute expiry on the cache clock.
    fn resolve_expiry(&self, ttl: Ttl, now: u64) -> Result<u64, CacheError> {
        match ttl {
            Ttl::Never => Ok(NO_EXPIRY),
            Ttl::Default => Ok(match self.core.config.default_ttl {
                Some(default) => absolute_expiry(now, default),
                None => NO_EXPIRY,
            }),
            Ttl::After(duration) => {
                if duration.is_zero() {
                    return Err(CacheError::InvalidTtl);
                }
                Ok(absolute_expiry(now, duration))
            }
        }
    }

    /// Inserts or overwrites `key`.
    ///
    /// Under AdmissionLFU a brand-new key may be silently refused: the
    /// call still returns `Ok(())`; refusal is visible only as an
    /// unchanged cache and a bumped `rejected_inserts` counter.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidTtl`] for a zero [`Ttl::After`];
    /// [`CacheError::Closed`] after [`close`](Cache::close).
    pub fn set(&self, key: K, value: V, ttl: Ttl) -> Result<(), CacheError> {
        self.set_inner(key, value, ttl, None)
    }

    /// Like [`set`](Cache::set), registering a callback fired exactly once
    /// with the entry's key and value when it leaves the cache, whether by
    /// eviction, expiration, deletion, overwrite, clear, or close.
    ///
    /// The callback runs synchronously under the owning shard's write
    /// lock. It must not call back into the cache for the same key, and
    /// should defer anything slow. A panicking callback is caught, counted,
    /// and logged; it cannot corrupt the shard.
    ///
    /// Overwriting an entry with plain [`set`](Cache::set) keeps its
    /// callback; overwriting with `set_with_callback` replaces it.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Cache::set).
    pub fn set_with_callback(
        &self,
        key: K,
        value: V,
        ttl: Ttl,
        callback: EvictionCallback<K, V>,
    ) -> Result<(), CacheError> {
        self.set_inner(key, value, ttl, Some(callback))
    }

    fn set_inner(
        &self,
        key: K,
        value: V,
        ttl: Ttl,
        callback: Option<EvictionCallback<K, V>>,
    ) -> Result<(), CacheError> {
        if self.core.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }
        let now = self.core.clock.now();
        let expires_at = self.resolve_expiry(ttl, now)?;
        let hash = key.fingerprint();
        if !self.shard_for(hash).set(key, value, hash, expires_at, callback, now) {
            return Err(CacheError::Closed);
        }
        Ok(())
    }

    /// Returns the value for `key`, or `None` if absent or expired.
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_with_ttl(key).map(|(value, _)| value)
    }

    /// Returns the value and its remaining lifetime (`None` = no expiry).
    pub fn get_with_ttl(&self, key: &K) -> Option<(V, Option<Duration>)> {
        if self.core.closed.load(Ordering::Acquire) {
            return None;
        }
        let now = self.core.clock.now();
        let hash = key.fingerprint();
        self.shard_for(hash).get(key, hash, now)
    }

    /// Removes `key`, firing its callback. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// [`CacheError::Closed`] after [`close`](Cache::close).
    pub fn delete(&self, key: &K) -> Result<bool, CacheError> {
        if self.core.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }
        Ok(self.shard_for(key.fingerprint()).delete(key))
    }

    /// Whether `key` is present and unexpired. Unlike [`get`](Cache::get)
    /// this has no recency or frequency side effects.
    pub fn exists(&self, key: &K) -> bool {
        if self.core.closed.load(Ordering::Acquire) {
            return false;
        }
        let now = self.core.clock.now();
        self.shard_for(key.fingerprint()).exists(key, now)
    }

    /// Snapshot of all live, unexpired keys. Order is unspecified; the
    /// snapshot is assembled shard by shard and is not a consistent
    /// point-in-time view.
    pub fn keys(&self) -> Vec<K> {
        if self.core.closed.load(Ordering::Acquire) {
            return Vec::new();
        }
        let now = self.core.clock.now();
        self.core
            .shards
            .iter()
            .flat_map(|shard| shard.keys(now))
            .collect()
    }

    /// Number of resident entries. May transiently include entries whose
    /// expiry has passed but which no sweep or lookup has observed yet.
    pub fn size(&self) -> u64 {
        self.core.shards.iter().map(|shard| shard.len() as u64).sum()
    }

    /// Configured maximum entry count; 0 when unbounded.
    pub fn capacity(&self) -> u64 {
        self.core.config.max_size as u64
    }

    /// Whether the cache currently holds no entries.
    pub fn is_empty(&self) -> bool {
        self.core.shards.iter().all(|shard| shard.len() == 0)
    }

    /// Aggregated statistics. Counters are summed shard by shard without a
    /// global lock, so the snapshot is eventually consistent.
    pub fn stats(&self) -> Stats {
        let mut stats = Stats::default();
        for shard in self.core.shards.iter() {
            stats.hits += shard.stats.hits();
            stats.misses += shard.stats.misses();
            stats.evictions += shard.stats.evictions();
            stats.expirations += shard.stats.expirations();
            stats.rejected_inserts += shard.stats.rejected_inserts();
            stats.size += shard.len() as u64;
        }
        stats.capacity = self.capacity();
        stats.shards = self.core.shards.len();
        stats.finish()
    }

    /// Synchronously sweeps expired entries from every shard. Returns the
    /// number of entries removed.
    pub fn trigger_cleanup(&self) -> usize {
        if self.core.closed.load(Ordering::Acquire) {
            return 0;
        }
        self.core.cleanup_all()
    }

    /// Drops every entry, firing callbacks. Statistics counters keep
    /// their lifetime values.
    ///
    /// # Errors
    ///
    /// [`CacheError::Closed`] after [`close`](Cache::close).
    pub fn clear(&self) -> Result<(), CacheError> {
        if self.core.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }
        for shard in self.core.shards.iter() {
            shard.clear();
        }
        Ok(())
    }

    /// Closes the cache: stops the janitor, clears every shard (firing
    /// callbacks), and makes the closed state terminal. Idempotent.
    pub fn close(&self) {
        if self.core.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(janitor) = self.janitor.lock().take() {
            // The send fails only if the thread already exited.
            let _ = janitor.stop.send(());
            let _ = janitor.handle.join();
        }
        for shard in self.core.shards.iter() {
            shard.clear();
        }
        tracing::debug!("cache closed");
    }
}

impl<K, V> Drop for Cache<K, V> {
    fn drop(&mut self) {
        // Mirrors close() without the generic bounds: stop the janitor
        // and fire remaining callbacks.
        if !self.core.closed.swap(true, Ordering::AcqRel) {
            if let Some(janitor) = self.janitor.lock().take() {
                let _ = janitor.stop.send(());
                let _ = janitor.handle.join();
            }
            for shard in self.core.shards.iter() {
                shard.clear();
            }
        }
    }
}

impl<K, V> fmt::Debug for Cache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("shards", &self.core.shards.len())
            .field("capacity", &self.core.config.max_size)
            .field("closed", &self.core.closed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Saturating absolute expiry, clamped below the never-expires sentinel.
#[inline]
fn absolute_expiry(now: u64, ttl: Duration) -> u64 {
    now.saturating_add(duration_nanos(ttl)).min(NO_EXPIRY - 1)
}

#[inline]
#[allow(clippy::cast_possible_truncation)] // ~584 years
fn duration_nanos(duration: Duration) -> u64 {
    duration.as_nanos().min(u128::from(u64::MAX)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::EvictionPolicy;
    use std::sync::atomic::AtomicUsize;

    fn small_cache(policy: EvictionPolicy, max_size: usize, shards: usize) -> Cache<String, i32> {
        Cache::new(
            CacheConfig::new()
                .max_size(max_size)
                .shard_count(shards)
                .cleanup_interval(None)
                .eviction_policy(policy),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_shard_count_rejected() {
        let result: Result<Cache<String, i32>, _> =
            Cache::new(CacheConfig::new().shard_count(3));
        assert_eq!(
            result.err(),
            Some(CacheError::InvalidConfig(
                "shard_count must be zero (auto) or a power of two"
            ))
        );
    }

    #[test]
    fn test_auto_shard_count() {
        let cache: Cache<String, i32> =
            Cache::new(CacheConfig::new().cleanup_interval(None)).unwrap();
        let shards = cache.stats().shards;
        assert!(shards.is_power_of_two());
        assert!(shards <= 256);
    }

    #[test]
    fn test_set_get_across_shards() {
        let cache = small_cache(EvictionPolicy::Lru, 10_000, 16);
        for i in 0..500 {
            cache.set(format!("key_{i}"), i, Ttl::Never).unwrap();
        }
        for i in 0..500 {
            assert_eq!(cache.get(&format!("key_{i}")), Some(i));
        }
        assert_eq!(cache.size(), 500);
        assert!(!cache.is_empty());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let cache = small_cache(EvictionPolicy::Lru, 16, 1);
        assert_eq!(
            cache.set("k".to_string(), 1, Ttl::After(Duration::ZERO)),
            Err(CacheError::InvalidTtl)
        );
    }

    #[test]
    fn test_default_ttl_fallthrough() {
        let cache: Cache<String, i32> = Cache::new(
            CacheConfig::new()
                .shard_count(1)
                .cleanup_interval(None)
                .default_ttl(Some(Duration::from_secs(60))),
        )
        .unwrap();
        cache.set("k".to_string(), 1, Ttl::Default).unwrap();
        let (_, remaining) = cache.get_with_ttl(&"k".to_string()).unwrap();
        let remaining = remaining.expect("default ttl applies");
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(59));

        // Without a default, Default means never.
        let cache = small_cache(EvictionPolicy::Lru, 16, 1);
        cache.set("k".to_string(), 1, Ttl::Default).unwrap();
        let (_, remaining) = cache.get_with_ttl(&"k".to_string()).unwrap();
        assert_eq!(remaining, None);
    }

    #[test]
    fn test_closed_cache_semantics() {
        let cache = small_cache(EvictionPolicy::Lru, 16, 1);
        cache.set("k".to_string(), 1, Ttl::Never).unwrap();
        cache.close();
        // Idempotent.
        cache.close();

        assert_eq!(
            cache.set("x".to_string(), 2, Ttl::Never),
            Err(CacheError::Closed)
        );
        assert_eq!(cache.delete(&"k".to_string()), Err(CacheError::Closed));
        assert_eq!(cache.clear(), Err(CacheError::Closed));
        assert_eq!(cache.get(&"k".to_string()), None);
        assert!(!cache.exists(&"k".to_string()));
        assert!(cache.keys().is_empty());
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn test_close_fires_callbacks() {
        let fired = Arc::new(AtomicUsize::new(0));
        let cache = small_cache(EvictionPolicy::Lru, 16, 2);
        for i in 0..5 {
            let fired = Arc::clone(&fired);
            cache
                .set_with_callback(
                    format!("k{i}"),
                    i,
                    Ttl::Never,
                    Arc::new(move |_, _| {
                        fired.fetch_add(1, Ordering::SeqCst);
                    }),
                )
                .unwrap();
        }
        cache.close();
        assert_eq!(fired.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_janitor_sweeps_in_background() {
        let cache: Cache<String, i32> = Cache::new(
            CacheConfig::new()
                .shard_count(2)
                .cleanup_interval(Some(Duration::from_millis(10))),
        )
        .unwrap();
        for i in 0..20 {
            cache
                .set(format!("k{i}"), i, Ttl::After(Duration::from_millis(5)))
                .unwrap();
        }
        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.stats().expirations, 20);
        cache.close();
    }

    #[test]
    fn test_trigger_cleanup() {
        let cache = small_cache(EvictionPolicy::Lru, 100, 2);
        for i in 0..10 {
            cache
                .set(format!("k{i}"), i, Ttl::After(Duration::from_nanos(1)))
                .unwrap();
        }
        std::thread::sleep(Duration::from_millis(1));
        assert_eq!(cache.trigger_cleanup(), 10);
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_stats_aggregation() {
        let cache = small_cache(EvictionPolicy::Lru, 100, 4);
        cache.set("a".to_string(), 1, Ttl::Never).unwrap();
        cache.set("b".to_string(), 2, Ttl::Never).unwrap();
        cache.get(&"a".to_string());
        cache.get(&"missing".to_string());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 2);
        assert_eq!(stats.capacity, 100);
        assert_eq!(stats.shards, 4);
        assert!((stats.hit_ratio - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clear_keeps_counters() {
        let cache = small_cache(EvictionPolicy::Lru, 100, 2);
        cache.set("a".to_string(), 1, Ttl::Never).unwrap();
        cache.get(&"a".to_string());
        cache.clear().unwrap();
        assert_eq!(cache.size(), 0);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_keys_snapshot() {
        let cache = small_cache(EvictionPolicy::Lru, 100, 4);
        cache.set("a".to_string(), 1, Ttl::Never).unwrap();
        cache.set("b".to_string(), 2, Ttl::Never).unwrap();
        let mut keys = cache.keys();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_integer_keys() {
        let cache: Cache<u64, String> = Cache::new(
            CacheConfig::new()
                .max_size(100)
                .shard_count(4)
                .cleanup_interval(None),
        )
        .unwrap();
        cache.set(7, "seven".to_string(), Ttl::Never).unwrap();
        assert_eq!(cache.get(&7), Some("seven".to_string()));
        assert!(cache.exists(&7));
        assert!(!cache.exists(&8));
    }

    #[test]
    fn test_unbounded_cache_only_ttl_removes() {
        let cache: Cache<String, i32> = Cache::new(
            CacheConfig::new()
                .max_size(0)
                .shard_count(1)
                .cleanup_interval(None),
        )
        .unwrap();
        for i in 0..5_000 {
            cache.set(format!("k{i}"), i, Ttl::Never).unwrap();
        }
        assert_eq!(cache.size(), 5_000);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.capacity(), 0);
    }
}
