//! A single cache shard.
//!
//! The shard is the unit of concurrency: a hash map from key to list node,
//! the intrusive recency list those nodes live on, the policy state, and a
//! `parking_lot::RwLock` serializing structural mutation. Counters sit
//! outside the lock as atomics.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Shard                                 │
//! │  ShardStats (atomics, lock-free)                             │
//! │  RwLock<ShardInner>                                          │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │ HashMap<K, *node>      List (intrusive)                │  │
//! │  │ ┌───────────┐          front (hot) ◀──▶ ... ◀──▶ back  │  │
//! │  │ │ "a" ─────────────▶   ┌──────────┐        (cold)      │  │
//! │  │ │ "b" ─────────────▶   │CacheEntry│                    │  │
//! │  │ └───────────┘          └──────────┘                    │  │
//! │  │ PolicyState (sketch / doorkeeper / scan for admission) │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Locking discipline
//!
//! - Structural mutation (splices, inserts, removals) happens only under
//!   the write lock.
//! - Hit bookkeeping that is representable as atomics (access stamps,
//!   LFU counters, sketch and doorkeeper cells, scan windows) may run
//!   under the read lock. Policies whose hit path splices the list (LRU,
//!   AdmissionLFU) take the write lock for lookups instead.
//! - An expired entry observed under the read lock is treated as absent;
//!   the reader re-acquires exclusively to unlink it.
//!
//! Invariants, checked by the test suite: every mapped key is linked
//! exactly once, `map.len() == list.len()` at every quiescent point, and
//! `map.len()` never exceeds the shard capacity.

use crate::entry::{CacheEntry, EvictionCallback};
use crate::list::{List, ListEntry};
use crate::policy::{self, Admission, EvictionPolicy, PolicyState};
use crate::stats::ShardStats;
use core::hash::Hash;
use core::mem;
use core::sync::atomic::{AtomicBool, Ordering};
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

/// Expired entries unlinked per lock acquisition during a sweep, capping
/// write-lock hold time.
pub(crate) const CLEANUP_BATCH: usize = 256;

/// Map + list + policy guarded by one lock, plus lock-free counters.
pub(crate) struct Shard<K, V> {
    inner: RwLock<ShardInner<K, V>>,
    /// Whether a hit splices the recency list, fixed by the policy at
    /// construction. Hoisted out of the lock so the lookup path can pick
    /// its lock level without acquiring first.
    splice_on_hit: bool,
    /// The cache-wide closed flag, re-checked under the write lock so an
    /// insert racing `close()` cannot land after the closing clear. The
    /// closer flips the flag before taking any shard lock, so whichever
    /// order the two writers acquire this shard's lock, no entry survives.
    closed: Arc<AtomicBool>,
    pub(crate) stats: ShardStats,
}

struct ShardInner<K, V> {
    map: HashMap<K, *mut ListEntry<CacheEntry<K, V>>>,
    list: List<CacheEntry<K, V>>,
    policy: PolicyState,
    /// Maximum resident entries; 0 disables eviction.
    capacity: usize,
}

// SAFETY: the raw pointers in `map` only address nodes owned by `list`,
// and every structural mutation requires the enclosing write lock. Shared
// access touches entries only through &-references and atomic fields, so
// the container is Send/Sync whenever key and value are.
unsafe impl<K: Send + Sync, V: Send + Sync> Send for ShardInner<K, V> {}
// SAFETY: as above; &ShardInner exposes no unsynchronized mutation.
unsafe impl<K: Send + Sync, V: Send + Sync> Sync for ShardInner<K, V> {}

impl<K, V> Shard<K, V> {
    /// Resident entry count (may include not-yet-swept expired entries).
    pub(crate) fn len(&self) -> usize {
        self.inner.read().map.len()
    }

    /// Drops every entry, firing callbacks, and resets learned policy
    /// state. Lifetime counters are preserved. Unbounded so the cache's
    /// `Drop` can fire callbacks for any key/value types.
    pub(crate) fn clear(&self) {
        let mut inner = self.inner.write();
        inner.map.clear();
        let stats = &self.stats;
        inner.list.drain(|entry| {
            if let Some(cb) = &entry.on_evict {
                fire_callback(cb, &entry.key, &entry.value, stats);
            }
        });
        inner.policy.reset();
    }
}

impl<K, V> Shard<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub(crate) fn new(
        capacity: usize,
        policy: EvictionPolicy,
        stats_enabled: bool,
        closed: Arc<AtomicBool>,
    ) -> Self {
        let map_capacity = if capacity == 0 { 16 } else { capacity.next_power_of_two() };
        let policy_state = PolicyState::new(policy, capacity);
        Shard {
            splice_on_hit: policy_state.hit_needs_splice(),
            inner: RwLock::new(ShardInner {
                map: HashMap::with_capacity(map_capacity),
                list: List::new(),
                policy: policy_state,
                capacity,
            }),
            closed,
            stats: ShardStats::new(stats_enabled),
        }
    }

    /// Looks up `key`, returning the value and remaining TTL on a hit.
    ///
    /// Policy hit bookkeeping runs inline; under LRU/AdmissionLFU the
    /// entry is spliced to the hot end, which forces the write lock.
    pub(crate) fn get(&self, key: &K, hash: u64, now: u64) -> Option<(V, Option<Duration>)> {
        if self.splice_on_hit {
            return self.get_spliced(key, hash, now);
        }

        let inner = self.inner.read();
        match inner.map.get(key).copied() {
            Some(node) => {
                // SAFETY: node comes from our map and the read lock keeps
                // it alive; only atomic fields are updated through it.
                let entry = unsafe { (*node).get_value() };
                if entry.is_expired(now) {
                    drop(inner);
                    self.unlink_expired(key, now);
                    return None;
                }
                entry.record_access(now);
                inner.policy.record_lookup(hash, true);
                self.stats.record_hit();
                Some((entry.value.clone(), entry.ttl_remaining(now)))
            }
            None => {
                inner.policy.record_lookup(hash, false);
                self.stats.record_miss();
                None
            }
        }
    }

    /// Lookup path for policies whose hit splices the list.
    fn get_spliced(&self, key: &K, hash: u64, now: u64) -> Option<(V, Option<Duration>)> {
        let mut inner = self.inner.write();
        match inner.map.get(key).copied() {
            Some(node) => {
                // SAFETY: node comes from our map; we hold the write lock.
                let entry = unsafe { (*node).get_value() };
                if entry.is_expired(now) {
                    inner.remove_node(node, &self.stats);
                    self.stats.record_expiration();
                    inner.policy.record_lookup(hash, false);
                    self.stats.record_miss();
                    return None;
                }
                entry.record_access(now);
                let result = (entry.value.clone(), entry.ttl_remaining(now));
                inner.policy.record_lookup(hash, true);
                // SAFETY: node is linked in this shard's list.
                unsafe { inner.list.move_to_front(node) };
                self.stats.record_hit();
                Some(result)
            }
            None => {
                inner.policy.record_lookup(hash, false);
                self.stats.record_miss();
                None
            }
        }
    }

    /// Removes `key` if it is still present and still expired; counts the
    /// expiration and the miss that observed it.
    fn unlink_expired(&self, key: &K, now: u64) {
        let mut inner = self.inner.write();
        if let Some(&node) = inner.map.get(key) {
            // SAFETY: node comes from our map; we hold the write lock.
            let expired = unsafe { (*node).get_value().is_expired(now) };
            if expired {
                inner.remove_node(node, &self.stats);
                self.stats.record_expiration();
            }
        }
        self.stats.record_miss();
    }

    /// Inserts or overwrites `key`. Returns `false` when refused because
    /// the cache closed concurrently.
    ///
    /// Overwrites always succeed and fire the previous callback with the
    /// replaced value. New keys pass the policy's admission decision; a
    /// refusal leaves the shard untouched and is counted, not errored.
    pub(crate) fn set(
        &self,
        key: K,
        value: V,
        hash: u64,
        expires_at: u64,
        callback: Option<EvictionCallback<K, V>>,
        now: u64,
    ) -> bool {
        let mut inner = self.inner.write();
        if self.closed.load(Ordering::Relaxed) {
            // The closing clear either already swept this shard or is
            // waiting on our lock; inserting now would outlive it.
            return false;
        }

        if let Some(&node) = inner.map.get(&key) {
            // SAFETY: node comes from our map; we hold the write lock.
            let entry = unsafe { (*node).get_value_mut() };
            let old_value = mem::replace(&mut entry.value, value);
            entry.expires_at = expires_at;
            let old_callback = entry.on_evict.clone();
            if callback.is_some() {
                entry.on_evict = callback;
            }
            if let Some(cb) = &old_callback {
                fire_callback(cb, &entry.key, &old_value, &self.stats);
            }
            // The overwrite is a fresh insertion of the new value.
            // SAFETY: node is linked in this shard's list.
            unsafe { inner.list.move_to_front(node) };
            return true;
        }

        if inner.capacity > 0 {
            match inner.on_insert(hash, &self.stats) {
                Admission::Admit => {}
                Admission::Reject => {
                    self.stats.record_rejected_insert();
                    return true;
                }
            }
        }

        let entry = CacheEntry::new(key.clone(), value, hash, expires_at, now, callback);
        let node = inner.list.push_front(entry);
        inner.map.insert(key, node);
        true
    }

    /// Removes `key`, firing its callback. Returns whether it existed.
    pub(crate) fn delete(&self, key: &K) -> bool {
        let mut inner = self.inner.write();
        match inner.map.get(key).copied() {
            Some(node) => {
                inner.remove_node(node, &self.stats);
                true
            }
            None => false,
        }
    }

    /// Whether `key` is present and unexpired. No recency or frequency
    /// side effects.
    pub(crate) fn exists(&self, key: &K, now: u64) -> bool {
        let inner = self.inner.read();
        match inner.map.get(key) {
            // SAFETY: node comes from our map; the read lock keeps it alive.
            Some(&node) => !unsafe { (*node).get_value().is_expired(now) },
            None => false,
        }
    }

    /// Sweeps expired entries from the cold end of the list, unlinking in
    /// batches of [`CLEANUP_BATCH`] per lock acquisition. Stops at the
    /// first unexpired entry; entries that expired out of recency order
    /// are picked up lazily by lookups or a later sweep.
    pub(crate) fn cleanup(&self, now: u64) -> usize {
        let mut total = 0;
        loop {
            let mut inner = self.inner.write();
            let mut removed = 0;
            while removed < CLEANUP_BATCH {
                let node = inner.list.back();
                if node.is_null() {
                    break;
                }
                // SAFETY: back() returned a linked, non-sentinel node and
                // we hold the write lock.
                let expired = unsafe { (*node).get_value().is_expired(now) };
                if !expired {
                    break;
                }
                inner.remove_node(node, &self.stats);
                self.stats.record_expiration();
                removed += 1;
            }
            total += removed;
            if removed < CLEANUP_BATCH {
                return total;
            }
            // Batch exhausted: release the lock and take another pass.
        }
    }

    /// Snapshot of the live, unexpired keys. Order is unspecified.
    pub(crate) fn keys(&self, now: u64) -> Vec<K> {
        let inner = self.inner.read();
        inner
            .map
            .iter()
            .filter_map(|(key, &node)| {
                // SAFETY: node comes from our map; the read lock keeps it
                // alive.
                let expired = unsafe { (*node).get_value().is_expired(now) };
                (!expired).then(|| key.clone())
            })
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        let inner = self.inner.read();
        assert_eq!(inner.map.len(), inner.list.len(), "map/list length mismatch");
        if inner.capacity > 0 {
            assert!(inner.map.len() <= inner.capacity, "capacity exceeded");
        }
    }
}

impl<K, V> ShardInner<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Unlinks `node`, removes its key from the map, and fires its
    /// callback.
    ///
    /// The node pointer must have come from this shard's map while the
    /// write lock was held.
    fn remove_node(&mut self, node: *mut ListEntry<CacheEntry<K, V>>, stats: &ShardStats) {
        // SAFETY: per the method contract the node is linked in this
        // shard's list and owned by it.
        let entry = unsafe { self.list.unlink(node).into_value() };
        self.map.remove(&entry.key);
        if let Some(cb) = &entry.on_evict {
            fire_callback(cb, &entry.key, &entry.value, stats);
        }
    }

    /// Admission decision for a new key, including victim eviction when
    /// the shard is full. Only called when `capacity > 0`.
    fn on_insert(&mut self, hash: u64, stats: &ShardStats) -> Admission {
        // Mutable epoch upkeep first, immutable gating afterwards.
        let gate = self.policy.admission().map(|state| {
            state.note_admission(stats.hit_ratio());
            let candidate_freq = state.estimate(hash);
            let seen_before = state.record_sighting(hash);
            (candidate_freq, seen_before)
        });

        match gate {
            Some((candidate_freq, seen_before)) => {
                if self.map.len() >= self.capacity {
                    let victim = self.select_victim();
                    debug_assert!(!victim.is_null());
                    // SAFETY: select_victim returns a node linked in our
                    // list; we hold the write lock.
                    let victim_hash = unsafe { (*victim).get_value() }.hash;
                    let admitted = match &self.policy {
                        PolicyState::AdmissionLfu(state) => {
                            state.admit(candidate_freq, state.estimate(victim_hash), seen_before)
                        }
                        _ => unreachable!("gate is only produced for AdmissionLfu"),
                    };
                    if !admitted {
                        return Admission::Reject;
                    }
                    self.remove_node(victim, stats);
                    stats.record_eviction();
                }
                Admission::Admit
            }
            None => {
                // Unconditional policies: evict until there is room.
                while self.map.len() >= self.capacity {
                    let victim = self.select_victim();
                    if victim.is_null() {
                        break;
                    }
                    self.remove_node(victim, stats);
                    stats.record_eviction();
                }
                Admission::Admit
            }
        }
    }

    /// Picks the entry the current policy would evict. Null only when the
    /// shard is empty.
    fn select_victim(&self) -> *mut ListEntry<CacheEntry<K, V>> {
        match &self.policy {
            // Coldest recency (LRU) or oldest insertion (FIFO): the list
            // ordering already encodes both.
            PolicyState::Lru | PolicyState::Fifo => self.list.back(),
            PolicyState::Lfu => self.select_victim_by(|entry, _rank| entry.access_count() as f64),
            PolicyState::AdmissionLfu(state) => self.select_victim_by(|entry, rank| {
                policy::victim_score(state.estimate(entry.hash), rank)
            }),
        }
    }

    /// Samples up to [`policy::SAMPLE_SIZE`] entries from the cold end and
    /// returns the lowest-scored one; ties go to the older last access.
    fn select_victim_by<F>(&self, score: F) -> *mut ListEntry<CacheEntry<K, V>>
    where
        F: Fn(&CacheEntry<K, V>, usize) -> f64,
    {
        let mut best = core::ptr::null_mut();
        let mut best_score = f64::INFINITY;
        let mut best_accessed = u64::MAX;

        let mut cursor = self.list.back();
        let mut rank = 0;
        while !cursor.is_null() && rank < policy::SAMPLE_SIZE {
            // SAFETY: cursor walks linked nodes of our own list.
            let entry = unsafe { (*cursor).get_value() };
            let candidate_score = score(entry, rank);
            let accessed = entry.last_accessed();
            if candidate_score < best_score
                || (candidate_score == best_score && accessed < best_accessed)
            {
                best = cursor;
                best_score = candidate_score;
                best_accessed = accessed;
            }
            // SAFETY: cursor is a linked non-sentinel node.
            cursor = unsafe { self.list.toward_front(cursor) };
            rank += 1;
        }
        best
    }
}

/// Runs an eviction callback, isolating panics: a panicking callback is
/// counted and logged but cannot corrupt the shard or wedge its lock.
fn fire_callback<K, V>(cb: &EvictionCallback<K, V>, key: &K, value: &V, stats: &ShardStats) {
    if panic::catch_unwind(AssertUnwindSafe(|| cb(key, value))).is_err() {
        stats.record_callback_panic();
        tracing::warn!("eviction callback panicked; entry removal continues");
    }
}

impl<K, V> core::fmt::Debug for Shard<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Shard")
            .field("len", &inner.map.len())
            .field("capacity", &inner.capacity)
            .field("policy", &inner.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::NO_EXPIRY;
    use crate::fingerprint::Fingerprint;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn shard(capacity: usize, policy: EvictionPolicy) -> Shard<String, i32> {
        Shard::new(capacity, policy, true, Arc::new(AtomicBool::new(false)))
    }

    fn put(s: &Shard<String, i32>, key: &str, value: i32, now: u64) {
        s.set(key.to_string(), value, key.fingerprint(), NO_EXPIRY, None, now);
    }

    fn fetch(s: &Shard<String, i32>, key: &str, now: u64) -> Option<i32> {
        s.get(&key.to_string(), key.fingerprint(), now).map(|(v, _)| v)
    }

    #[test]
    fn test_set_get_roundtrip() {
        let s = shard(4, EvictionPolicy::Lru);
        put(&s, "a", 1, 0);
        assert_eq!(fetch(&s, "a", 1), Some(1));
        assert_eq!(fetch(&s, "missing", 1), None);
        assert_eq!(s.stats.hits(), 1);
        assert_eq!(s.stats.misses(), 1);
        s.assert_invariants();
    }

    #[test]
    fn test_lru_evicts_coldest() {
        let s = shard(2, EvictionPolicy::Lru);
        put(&s, "a", 1, 0);
        put(&s, "b", 2, 1);
        fetch(&s, "a", 2); // "b" is now coldest
        put(&s, "c", 3, 3);
        assert_eq!(fetch(&s, "b", 4), None);
        assert_eq!(fetch(&s, "a", 4), Some(1));
        assert_eq!(s.stats.evictions(), 1);
        s.assert_invariants();
    }

    #[test]
    fn test_fifo_ignores_hits() {
        let s = shard(2, EvictionPolicy::Fifo);
        put(&s, "a", 1, 0);
        put(&s, "b", 2, 1);
        fetch(&s, "a", 2); // does not refresh "a"
        put(&s, "c", 3, 3);
        assert_eq!(fetch(&s, "a", 4), None);
        assert_eq!(fetch(&s, "b", 4), Some(2));
        s.assert_invariants();
    }

    #[test]
    fn test_lfu_evicts_lowest_counter() {
        let s = shard(3, EvictionPolicy::Lfu);
        put(&s, "a", 1, 0);
        put(&s, "b", 2, 1);
        put(&s, "c", 3, 2);
        fetch(&s, "a", 3);
        fetch(&s, "a", 4);
        fetch(&s, "b", 5);
        put(&s, "d", 4, 6);
        assert_eq!(fetch(&s, "c", 7), None);
        assert_eq!(fetch(&s, "a", 7), Some(1));
        assert_eq!(fetch(&s, "b", 7), Some(2));
        assert_eq!(fetch(&s, "d", 7), Some(4));
        s.assert_invariants();
    }

    #[test]
    fn test_overwrite_keeps_size_and_fires_callback() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        let s = shard(2, EvictionPolicy::Lru);
        s.set(
            "a".to_string(),
            1,
            "a".fingerprint(),
            NO_EXPIRY,
            Some(Arc::new(move |_k: &String, v: &i32| {
                assert_eq!(*v, 1);
                fired_clone.fetch_add(1, Ordering::SeqCst);
            })),
            0,
        );
        put(&s, "a", 2, 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(s.len(), 1);
        assert_eq!(fetch(&s, "a", 2), Some(2));
        s.assert_invariants();
    }

    #[test]
    fn test_expired_entry_is_absent_and_counted() {
        let s = shard(4, EvictionPolicy::Lru);
        s.set("a".to_string(), 1, "a".fingerprint(), 100, None, 0);
        assert_eq!(fetch(&s, "a", 50), Some(1));
        assert_eq!(fetch(&s, "a", 100), None);
        assert_eq!(s.stats.expirations(), 1);
        assert_eq!(s.len(), 0);
        s.assert_invariants();
    }

    #[test]
    fn test_expired_entry_lazy_removal_under_read_policy() {
        // FIFO takes the read path; expiry must upgrade and unlink.
        let s = shard(4, EvictionPolicy::Fifo);
        s.set("a".to_string(), 1, "a".fingerprint(), 100, None, 0);
        assert_eq!(fetch(&s, "a", 200), None);
        assert_eq!(s.stats.expirations(), 1);
        assert_eq!(s.len(), 0);
    }

    #[test]
    fn test_exists_does_not_touch_recency() {
        let s = shard(2, EvictionPolicy::Lru);
        put(&s, "a", 1, 0);
        put(&s, "b", 2, 1);
        assert!(s.exists(&"a".to_string(), 2));
        // "a" stays coldest despite the exists() probe.
        put(&s, "c", 3, 3);
        assert_eq!(fetch(&s, "a", 4), None);
        assert!(!s.exists(&"a".to_string(), 4));
    }

    #[test]
    fn test_delete() {
        let s = shard(4, EvictionPolicy::Lru);
        put(&s, "a", 1, 0);
        assert!(s.delete(&"a".to_string()));
        assert!(!s.delete(&"a".to_string()));
        assert_eq!(fetch(&s, "a", 1), None);
        s.assert_invariants();
    }

    #[test]
    fn test_cleanup_sweeps_expired_tail() {
        let s = shard(0, EvictionPolicy::Lru);
        for i in 0..600 {
            s.set(format!("k{i}"), i, i as u64, 100, None, 0);
        }
        // All expired: multiple batches must drain everything.
        assert_eq!(s.cleanup(100), 600);
        assert_eq!(s.len(), 0);
        assert_eq!(s.stats.expirations(), 600);
        s.assert_invariants();
    }

    #[test]
    fn test_cleanup_stops_at_live_tail() {
        let s = shard(0, EvictionPolicy::Lru);
        s.set("old".to_string(), 1, 1, 50, None, 0);
        s.set("new".to_string(), 2, 2, NO_EXPIRY, None, 1);
        assert_eq!(s.cleanup(60), 1);
        assert_eq!(s.len(), 1);
        assert!(s.exists(&"new".to_string(), 61));
    }

    #[test]
    fn test_keys_excludes_expired() {
        let s = shard(0, EvictionPolicy::Lru);
        s.set("live".to_string(), 1, 1, NO_EXPIRY, None, 0);
        s.set("dead".to_string(), 2, 2, 10, None, 0);
        let keys = s.keys(20);
        assert_eq!(keys, vec!["live".to_string()]);
    }

    #[test]
    fn test_clear_fires_callbacks_and_resets() {
        let fired = Arc::new(AtomicUsize::new(0));
        let s = shard(4, EvictionPolicy::AdmissionLfu);
        for key in ["a", "b", "c"] {
            let fired = Arc::clone(&fired);
            s.set(
                key.to_string(),
                1,
                key.fingerprint(),
                NO_EXPIRY,
                Some(Arc::new(move |_: &String, _: &i32| {
                    fired.fetch_add(1, Ordering::SeqCst);
                })),
                0,
            );
        }
        s.clear();
        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert_eq!(s.len(), 0);
        s.assert_invariants();
    }

    #[test]
    fn test_admission_rejects_cold_candidate() {
        let s = shard(2, EvictionPolicy::AdmissionLfu);
        put(&s, "h1", 1, 0);
        put(&s, "h2", 2, 1);
        // Heat up both residents well past any threshold.
        for now in 2..8 {
            fetch(&s, "h1", now);
            fetch(&s, "h2", now);
        }
        put(&s, "cold", 9, 10);
        assert_eq!(s.len(), 2);
        assert_eq!(fetch(&s, "cold", 11), None);
        assert_eq!(s.stats.rejected_inserts(), 1);
        assert_eq!(s.stats.evictions(), 0);
        s.assert_invariants();
    }

    #[test]
    fn test_admission_admits_established_key() {
        let s = shard(2, EvictionPolicy::AdmissionLfu);
        put(&s, "h1", 1, 0);
        put(&s, "h2", 2, 1);
        // The candidate becomes hotter than the residents: its misses
        // feed the sketch.
        for now in 2..12 {
            fetch(&s, "hot-candidate", now);
        }
        put(&s, "hot-candidate", 3, 12);
        assert_eq!(s.len(), 2);
        assert_eq!(fetch(&s, "hot-candidate", 13), Some(3));
        assert_eq!(s.stats.evictions(), 1);
        s.assert_invariants();
    }

    #[test]
    fn test_unbounded_shard_never_evicts() {
        let s = shard(0, EvictionPolicy::Lru);
        for i in 0..1000 {
            s.set(format!("k{i}"), i, i as u64, NO_EXPIRY, None, 0);
        }
        assert_eq!(s.len(), 1000);
        assert_eq!(s.stats.evictions(), 0);
        s.assert_invariants();
    }

    #[test]
    fn test_callback_panic_is_isolated() {
        let s = shard(4, EvictionPolicy::Lru);
        s.set(
            "boom".to_string(),
            1,
            "boom".fingerprint(),
            NO_EXPIRY,
            Some(Arc::new(|_: &String, _: &i32| panic!("callback panic"))),
            0,
        );
        assert!(s.delete(&"boom".to_string()));
        // The shard stays fully usable.
        put(&s, "after", 2, 1);
        assert_eq!(fetch(&s, "after", 2), Some(2));
        s.assert_invariants();
    }
}
