//! Eviction policies and the admission machinery.
//!
//! A policy is a small capability set consulted by the shard: how to react
//! to a hit, whether an insert is admitted, and how to pick a victim when
//! the shard is full. The set of policies is closed, so the per-shard
//! state is a tagged variant rather than trait objects: the shard
//! dispatches with a `match` and everything inlines.
//!
//! | Policy | On hit | Victim selection | Admission |
//! |--------|--------|------------------|-----------|
//! | `Lru` | move to list front | list tail | always |
//! | `Fifo` | nothing | list tail | always |
//! | `Lfu` | per-entry counter | lowest counter among tail sample | always |
//! | `AdmissionLfu` | move to front + sketch | lowest score among tail sample | gated |
//!
//! # AdmissionLFU
//!
//! The admission-controlled policy combines four estimators, all
//! shard-local so nothing is shared across locks:
//!
//! - a Count-Min sketch giving each fingerprint an approximate
//!   popularity,
//! - a doorkeeper Bloom filter suppressing one-hit wonders (a key's first
//!   sighting never reaches the sketch),
//! - a scan detector that raises the admission bar while the lookup
//!   stream is dominated by unique keys,
//! - an adaptive threshold `T` that hill-climbs on the shard's hit-ratio
//!   delta: every 4096 admissions the ratio is sampled, and `T` tightens
//!   by one (capped) when the ratio fell, loosens by one (floored at
//!   zero) when it rose.
//!
//! A candidate displaces a sampled victim only when its estimated
//! frequency beats the victim's by at least `T` (or the much larger scan
//! threshold during a scan) *and* the candidate is past the doorkeeper:
//! seen before, or already established in the sketch.

use crate::doorkeeper::Doorkeeper;
use crate::scan::ScanDetector;
use crate::sketch::FrequencySketch;

/// Entries examined from the cold end of the recency list when choosing a
/// victim (LFU and AdmissionLFU).
pub(crate) const SAMPLE_SIZE: usize = 5;

/// Weight of estimated frequency in the victim score.
const FREQ_WEIGHT: f64 = 1.0;

/// Weight of recency rank (distance from the cold end) in the victim
/// score.
const RECENCY_WEIGHT: f64 = 0.25;

/// Admissions between adaptive-threshold samples.
const ADAPT_INTERVAL: u64 = 4096;

/// Ceiling of the adaptive threshold.
const MAX_THRESHOLD: u32 = 3;

/// Admission margin required while a scan is in progress.
const SCAN_THRESHOLD: u32 = 4;

/// Sketch agings happen every `width × AGING_FACTOR` admissions.
const AGING_FACTOR: u64 = 10;

/// Eviction strategy run by every shard of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Least Recently Used: hits refresh recency, the coldest entry is
    /// evicted.
    #[default]
    Lru,
    /// Least Frequently Used: hits bump a per-entry counter; eviction
    /// samples the cold end and removes the lowest-counted entry.
    Lfu,
    /// First In First Out: hits change nothing, the oldest insertion is
    /// evicted.
    Fifo,
    /// Frequency-based eviction behind an admission gate (doorkeeper +
    /// frequency sketch + scan detector + adaptive threshold). Best
    /// hit-ratios under skewed or scan-polluted workloads.
    AdmissionLfu,
}

/// Outcome of consulting the policy about an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Link the entry (evicting the selected victim first if full).
    Admit,
    /// Refuse the insert; the cache is unchanged.
    Reject,
}

/// Per-shard state of the admission-controlled policy.
pub(crate) struct AdmissionState {
    sketch: FrequencySketch,
    doorkeeper: Doorkeeper,
    pub(crate) scan: ScanDetector,
    /// Adaptive admission threshold `T`.
    threshold: u32,
    /// Admission attempts since the last adaptive sample.
    since_adapt: u64,
    /// Admission attempts since the sketch was last aged.
    since_age: u64,
    /// Admission attempts since the doorkeeper was last cleared.
    since_clear: u64,
    /// Shard hit ratio at the last adaptive sample.
    last_hit_ratio: f64,
    /// Shard capacity, for the doorkeeper clearing cadence.
    capacity: usize,
}

impl AdmissionState {
    fn new(capacity: usize) -> Self {
        // Unbounded shards never evict, but keep nominal sizing so the
        // state machine behaves if capacity shows up later.
        let sizing = if capacity == 0 { 1024 } else { capacity };
        AdmissionState {
            sketch: FrequencySketch::with_capacity(sizing),
            doorkeeper: Doorkeeper::with_capacity(sizing),
            scan: ScanDetector::new(),
            threshold: 0,
            since_adapt: 0,
            since_age: 0,
            since_clear: 0,
            last_hit_ratio: 0.0,
            capacity: sizing,
        }
    }

    /// Records a sighting of `hash`: the first pass only marks the
    /// doorkeeper, later passes feed the sketch. Returns whether the key
    /// had been sighted before.
    pub(crate) fn record_sighting(&self, hash: u64) -> bool {
        let seen = self.doorkeeper.probe_and_set(hash);
        if seen {
            self.sketch.increment(hash);
        }
        seen
    }

    /// Estimated frequency of `hash`: the sketch minimum, plus one when
    /// the doorkeeper remembers a sighting the sketch never saw.
    pub(crate) fn estimate(&self, hash: u64) -> u32 {
        let mut freq = u32::from(self.sketch.estimate(hash));
        if self.doorkeeper.contains(hash) {
            freq += 1;
        }
        freq
    }

    /// Epoch upkeep, called once per admission attempt under the shard's
    /// write lock: ages the sketch, clears the doorkeeper, and re-samples
    /// the adaptive threshold on their respective cadences.
    pub(crate) fn note_admission(&mut self, shard_hit_ratio: f64) {
        self.since_age += 1;
        if self.since_age > self.sketch.width() as u64 * AGING_FACTOR {
            self.sketch.age();
            self.since_age = 0;
        }

        self.since_clear += 1;
        if self.since_clear > self.capacity as u64 {
            self.doorkeeper.clear();
            self.since_clear = 0;
        }

        self.since_adapt += 1;
        if self.since_adapt >= ADAPT_INTERVAL {
            self.since_adapt = 0;
            if shard_hit_ratio < self.last_hit_ratio {
                self.threshold = (self.threshold + 1).min(MAX_THRESHOLD);
            } else if shard_hit_ratio > self.last_hit_ratio {
                self.threshold = self.threshold.saturating_sub(1);
            }
            self.last_hit_ratio = shard_hit_ratio;
        }
    }

    /// The admission gate: is the candidate worth the selected victim?
    ///
    /// `seen_before` is the doorkeeper verdict from the candidate's
    /// sighting during this insert.
    pub(crate) fn admit(&self, candidate_freq: u32, victim_freq: u32, seen_before: bool) -> bool {
        let margin = if self.scan.scanning() {
            SCAN_THRESHOLD
        } else {
            self.threshold
        };
        if candidate_freq < victim_freq + margin {
            return false;
        }
        seen_before || candidate_freq >= 2
    }

    /// Current adaptive threshold (tests and debugging).
    #[cfg(test)]
    pub(crate) fn threshold(&self) -> u32 {
        self.threshold
    }

    fn reset(&mut self) {
        self.sketch.clear();
        self.doorkeeper.clear();
        self.scan.reset();
        self.threshold = 0;
        self.since_adapt = 0;
        self.since_age = 0;
        self.since_clear = 0;
        self.last_hit_ratio = 0.0;
    }
}

impl core::fmt::Debug for AdmissionState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AdmissionState")
            .field("threshold", &self.threshold)
            .field("capacity", &self.capacity)
            .field("scanning", &self.scan.scanning())
            .finish()
    }
}

/// Per-shard policy state: the tagged variant the shard dispatches on.
#[derive(Debug)]
pub(crate) enum PolicyState {
    Lru,
    Fifo,
    Lfu,
    AdmissionLfu(Box<AdmissionState>),
}

impl PolicyState {
    pub(crate) fn new(policy: EvictionPolicy, shard_capacity: usize) -> Self {
        match policy {
            EvictionPolicy::Lru => PolicyState::Lru,
            EvictionPolicy::Fifo => PolicyState::Fifo,
            EvictionPolicy::Lfu => PolicyState::Lfu,
            EvictionPolicy::AdmissionLfu => {
                PolicyState::AdmissionLfu(Box::new(AdmissionState::new(shard_capacity)))
            }
        }
    }

    /// Whether a hit must splice the recency list (and therefore needs the
    /// shard's write lock even on the read path).
    #[inline]
    pub(crate) fn hit_needs_splice(&self) -> bool {
        matches!(self, PolicyState::Lru | PolicyState::AdmissionLfu(_))
    }

    /// Feeds one lookup outcome into the frequency estimators. Only the
    /// admission policy keeps any; safe to call under a read lock.
    #[inline]
    pub(crate) fn record_lookup(&self, hash: u64, hit: bool) {
        if let PolicyState::AdmissionLfu(state) = self {
            state.record_sighting(hash);
            state.scan.record(hit);
        }
    }

    /// The admission state, when this shard runs AdmissionLFU.
    #[inline]
    pub(crate) fn admission(&mut self) -> Option<&mut AdmissionState> {
        match self {
            PolicyState::AdmissionLfu(state) => Some(state.as_mut()),
            _ => None,
        }
    }

    /// Resets learned state (sketch, doorkeeper, thresholds) after the
    /// shard is cleared.
    pub(crate) fn reset(&mut self) {
        if let PolicyState::AdmissionLfu(state) = self {
            state.reset();
        }
    }
}

/// Victim score under AdmissionLFU: estimated frequency weighted against
/// the entry's distance from the cold end of the list. Lowest score loses.
#[inline]
pub(crate) fn victim_score(freq: u32, recency_rank: usize) -> f64 {
    FREQ_WEIGHT * f64::from(freq) + RECENCY_WEIGHT * recency_rank as f64
}
