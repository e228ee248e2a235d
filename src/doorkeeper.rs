//! Doorkeeper Bloom filter.
//!
//! Suppresses one-hit wonders in front of the frequency sketch: a
//! fingerprint's first sighting only sets bits here, and only keys seen
//! again graduate into the sketch. The filter is cleared wholesale on a
//! cadence driven by the admission counter, so stale sightings fade.
//!
//! Bits live in atomic words so the filter can be probed and set under the
//! shard's read lock.

use core::sync::atomic::{AtomicU64, Ordering};

/// Bits per expected entry. With k=4 probes this keeps the false-positive
/// rate near 1%.
const BITS_PER_ENTRY: usize = 10;

/// Number of probe bits per fingerprint.
const PROBES: u64 = 4;

/// A fixed-size Bloom filter over key fingerprints.
#[derive(Debug)]
pub(crate) struct Doorkeeper {
    words: Box<[AtomicU64]>,
    bit_mask: u64,
}

impl Doorkeeper {
    /// Builds a filter sized for `capacity` entries, rounded up to a
    /// power-of-two bit count (min 64).
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let bits = (capacity * BITS_PER_ENTRY).max(64).next_power_of_two();
        let words = (0..bits / 64).map(|_| AtomicU64::new(0)).collect();
        Doorkeeper {
            words,
            bit_mask: bits as u64 - 1,
        }
    }

    /// Bit positions for `hash`: double hashing, probe i at `h1 + i·h2`.
    #[inline]
    fn probe_bits(&self, hash: u64) -> impl Iterator<Item = u64> + '_ {
        let h2 = (hash >> 17) | (hash << 47);
        (0..PROBES).map(move |i| hash.wrapping_add(i.wrapping_mul(h2)) & self.bit_mask)
    }

    /// Whether every probe bit for `hash` is set.
    pub(crate) fn contains(&self, hash: u64) -> bool {
        self.probe_bits(hash).all(|bit| {
            let word = self.words[(bit / 64) as usize].load(Ordering::Relaxed);
            word & (1u64 << (bit % 64)) != 0
        })
    }

    /// Sets the probe bits for `hash` and reports whether they were all
    /// already set, i.e. whether the key was (probably) seen before.
    pub(crate) fn probe_and_set(&self, hash: u64) -> bool {
        let mut seen = true;
        for bit in self.probe_bits(hash) {
            let mask = 1u64 << (bit % 64);
            let prev = self.words[(bit / 64) as usize].fetch_or(mask, Ordering::Relaxed);
            seen &= prev & mask != 0;
        }
        seen
    }

    /// Forgets every sighting.
    pub(crate) fn clear(&self) {
        for word in self.words.iter() {
            word.store(0, Ordering::Relaxed);
        }
    }
}
