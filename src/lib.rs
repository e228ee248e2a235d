//! # shardcache
//!
//! A high-throughput, thread-safe, in-process key-value cache with
//! bounded capacity, TTL expiration, and pluggable eviction, including
//! an admission-controlled frequency policy (AdmissionLFU) that combines
//! a doorkeeper Bloom filter, a Count-Min frequency sketch, sampled
//! victim selection, a scan detector, and an adaptive admission
//! threshold.
//!
//! ## Which Eviction Policy Should I Use?
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Is your workload...                                                │
//! │                                                                     │
//! │  ┌──────────────────┐                                               │
//! │  │ Recency-based?   │──Yes──▶ ┌───────┐                             │
//! │  │ (recent = hot)   │         │  LRU  │                             │
//! │  └────────┬─────────┘         └───────┘                             │
//! │           No                                                        │
//! │  ┌────────▼─────────┐                                               │
//! │  │ Frequency-based? │──Yes──▶ Exposed to scans / one-hit wonders?   │
//! │  │ (popular = hot)  │              │                                │
//! │  └────────┬─────────┘         Yes  │  No                            │
//! │           No                   ▼   ▼                                │
//! │  ┌────────▼─────────┐  ┌──────────────┐  ┌───────┐                  │
//! │  │ Pure streaming / │  │ AdmissionLFU │  │  LFU  │                  │
//! │  │ insertion order? │  └──────────────┘  └───────┘                  │
//! │  └────────┬─────────┘                                               │
//! │          Yes──▶ ┌────────┐                                          │
//! │                 │  FIFO  │                                          │
//! │                 └────────┘                                          │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! | Policy | On hit | Victim | Scan resistant |
//! |--------|--------|--------|----------------|
//! | [`EvictionPolicy::Lru`] | move to front | coldest entry | no |
//! | [`EvictionPolicy::Fifo`] | nothing | oldest insertion | no |
//! | [`EvictionPolicy::Lfu`] | count access | lowest count in tail sample | partial |
//! | [`EvictionPolicy::AdmissionLfu`] | move to front + sketch | lowest score in tail sample, gated | yes |
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              Cache                                   │
//! │                                                                      │
//! │   fingerprint(key) ──▶ hash & (N-1) ──▶ shard selection              │
//! │                                                                      │
//! │  ┌───────────┐ ┌───────────┐       ┌───────────┐   ┌──────────────┐  │
//! │  │  Shard 0  │ │  Shard 1  │  ...  │ Shard N-1 │   │   janitor    │  │
//! │  │ [RwLock]  │ │ [RwLock]  │       │ [RwLock]  │   │ (TTL sweep)  │  │
//! │  │ map+list  │ │ map+list  │       │ map+list  │   └──────────────┘  │
//! │  │ policy    │ │ policy    │       │ policy    │                     │
//! │  │ counters  │ │ counters  │       │ counters  │                     │
//! │  └───────────┘ └───────────┘       └───────────┘                     │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each shard owns a hash map, an intrusive recency list, its policy
//! state, and a reader/writer lock; operations on the same key are
//! linearizable with respect to that lock, and no ordering is guaranteed
//! across shards. Admission structures (sketch, doorkeeper, scan
//! detector) are shard-local, so the hit path shares nothing across
//! shards.
//!
//! ## Example
//!
//! ```
//! use shardcache::{Cache, CacheConfig, EvictionPolicy, Ttl};
//! use std::time::Duration;
//!
//! let cache = Cache::new(
//!     CacheConfig::new()
//!         .max_size(100_000)
//!         .eviction_policy(EvictionPolicy::AdmissionLfu)
//!         .default_ttl(Some(Duration::from_secs(300))),
//! )
//! .unwrap();
//!
//! cache.set("session:42".to_string(), "alice".to_string(), Ttl::Default).unwrap();
//! assert_eq!(cache.get(&"session:42".to_string()), Some("alice".to_string()));
//!
//! let stats = cache.stats();
//! assert_eq!(stats.hits, 1);
//! cache.close();
//! ```
//!
//! ## Modules
//!
//! - [`config`]: configuration and TTL sentinels
//! - [`policy`]: eviction policies and the admission machinery
//! - [`fingerprint`]: key fingerprinting and shard routing
//! - [`stats`]: statistics counters and snapshots
//! - [`error`]: the error taxonomy

pub mod config;

/// Error types for cache construction and mutation.
pub mod error;

/// Key fingerprinting and shard routing.
pub mod fingerprint;

/// Eviction policies and the admission machinery.
pub mod policy;

/// Statistics counters and snapshots.
pub mod stats;

/// Cache entry internals: timestamps, atomic access bookkeeping, and the
/// eviction callback type.
mod entry;

/// The cache facade: shard fan-out and lifecycle.
mod cache;

/// Doorkeeper Bloom filter for one-hit-wonder suppression.
mod doorkeeper;

/// Intrusive recency list. Internal infrastructure: raw pointer
/// operations whose invariants the shard maintains.
mod list;

/// Rolling miss-ratio scan detection.
mod scan;

/// A single cache shard: map + list + policy + lock + counters.
mod shard;

/// Count-Min frequency sketch with periodic aging.
mod sketch;

pub use cache::Cache;
pub use config::{CacheConfig, Ttl};
pub use entry::EvictionCallback;
pub use error::CacheError;
pub use fingerprint::{fingerprint_of, Fingerprint};
pub use policy::EvictionPolicy;
pub use stats::Stats;
