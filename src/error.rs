//! Error types for cache construction and mutation.
//!
//! All failures are synchronous and local: an invalid configuration is
//! rejected at construction time, an invalid TTL is rejected by the `set`
//! call that carried it, and mutating a closed cache fails with
//! [`CacheError::Closed`]. A silently rejected admission (the
//! AdmissionLFU policy declining to cache a key) is a design outcome, not
//! an error, and is observable only through the statistics counters.

use thiserror::Error;

/// Errors returned by cache operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The configuration passed to [`Cache::new`](crate::Cache::new) is
    /// invalid, e.g. a shard count that is neither zero nor a power of two.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// A finite, non-positive TTL was passed to a `set` operation.
    /// Use [`Ttl::Never`](crate::Ttl::Never) to store an entry forever.
    #[error("ttl must be a positive duration")]
    InvalidTtl,

    /// The cache has been closed; mutating operations are permanently
    /// rejected.
    #[error("cache is closed")]
    Closed,
}
