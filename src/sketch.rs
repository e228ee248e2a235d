//! Count-Min frequency sketch.
//!
//! A probabilistic multiset estimating how often a fingerprint has been
//! seen. Four rows of 4-bit saturating counters are packed sixteen to a
//! 64-bit word; `increment` bumps one counter per row and `estimate`
//! returns the minimum, so collisions only ever over-estimate.
//!
//! Counters are halved by [`FrequencySketch::age`] so historically hot
//! keys decay; the admission policy triggers aging from its admission
//! counter rather than wall time, keeping decay independent of traffic
//! rate.
//!
//! Cells are atomics: lookups increment the sketch while holding only the
//! shard's read lock. Increments use relaxed compare-and-swap per word; a
//! lost race under-counts by at most one, which is noise for a structure
//! that is already an estimate.

use core::sync::atomic::{AtomicU64, Ordering};

/// Row seeds, one per sketch depth: a mixture of constants from FNV,
/// CityHash, and Murmur3.
const SEEDS: [u64; 4] = [
    0xc3a5_c85c_97cb_3127,
    0xb492_b66f_be98_f273,
    0x9ae1_6a3b_2f90_404f,
    0xcbf2_9ce4_8422_2325,
];

/// Keeps the low 3 bits of every 4-bit counter when halving.
const RESET_MASK: u64 = 0x7777_7777_7777_7777;

/// Per-counter saturation ceiling.
const COUNTER_MAX: u8 = 15;

/// A 4-row Count-Min sketch with 4-bit saturating counters.
#[derive(Debug)]
pub(crate) struct FrequencySketch {
    table: Box<[AtomicU64]>,
    table_mask: usize,
}

impl FrequencySketch {
    /// Builds a sketch sized for `capacity` entries: one 16-counter word
    /// per slot, slot count rounded up to a power of two.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let table_size = capacity.max(8).next_power_of_two();
        let table = (0..table_size).map(|_| AtomicU64::new(0)).collect();
        FrequencySketch {
            table,
            table_mask: table_size - 1,
        }
    }

    /// Number of counter slots; the admission policy ages the sketch every
    /// `width() * 10` admissions.
    pub(crate) fn width(&self) -> usize {
        self.table_mask + 1
    }

    /// Estimated occurrence count for `hash`, saturating at 15.
    pub(crate) fn estimate(&self, hash: u64) -> u8 {
        let start = ((hash & 3) << 2) as u8;
        let mut freq = COUNTER_MAX;
        for depth in 0..4 {
            let word = self.table[self.index_of(hash, depth)].load(Ordering::Relaxed);
            let count = ((word >> ((start + depth) << 2)) & 0xF) as u8;
            freq = freq.min(count);
        }
        freq
    }

    /// Bumps the counter for `hash` in every row, saturating at 15.
    pub(crate) fn increment(&self, hash: u64) {
        let start = ((hash & 3) << 2) as u8;
        for depth in 0..4 {
            self.increment_at(self.index_of(hash, depth), start + depth);
        }
    }

    fn increment_at(&self, index: usize, counter: u8) {
        let offset = u32::from(counter) << 2;
        let mask = 0xF_u64 << offset;
        let cell = &self.table[index];
        let mut current = cell.load(Ordering::Relaxed);
        loop {
            if current & mask == mask {
                return; // saturated
            }
            match cell.compare_exchange_weak(
                current,
                current + (1u64 << offset),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(seen) => current = seen,
            }
        }
    }

    /// Halves every counter. Concurrent increments may be absorbed by the
    /// halving; the sketch is an estimate either way.
    pub(crate) fn age(&self) {
        for cell in self.table.iter() {
            let word = cell.load(Ordering::Relaxed);
            cell.store((word >> 1) & RESET_MASK, Ordering::Relaxed);
        }
    }

    /// Zeroes every counter.
    pub(crate) fn clear(&self) {
        for cell in self.table.iter() {
            cell.store(0, Ordering::Relaxed);
        }
    }

    /// Slot index for `hash` in the given row.
    fn index_of(&self, hash: u64, depth: u8) -> usize {
        let seed = SEEDS[depth as usize];
        let mut h = hash.wrapping_add(seed).wrapping_mul(seed);
        h = h.wrapping_add(h >> 32);
        (h as usize) & self.table_mask
    }
}
