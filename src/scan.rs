//! Scan detection.
//!
//! A scan is an access pattern dominated by unique, non-repeating keys:
//! a table dump, a crawler, a batch export. Under a scan nearly every
//! lookup misses, and admitting the scanned keys would flush the working
//! set for entries that will never be touched again.
//!
//! The detector groups lookups into fixed-size windows, folds each
//! window's miss ratio into an exponentially weighted moving average, and
//! reports [`scanning`](ScanDetector::scanning) once the average has sat
//! above the threshold for a sustained run of windows. The admission
//! policy responds by switching to its (much higher) scan threshold.
//!
//! All state is relaxed atomics updated from the lookup path; losing a
//! sample to a race merely delays detection by a fraction of a window.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Lookups per sample window.
const WINDOW: u64 = 512;

/// EWMA miss-ratio level that marks a window as scan-like.
const MISS_THRESHOLD: f64 = 0.5;

/// Consecutive scan-like windows required before `scanning()` holds.
const SUSTAIN_WINDOWS: u32 = 2;

/// Rolling miss-ratio estimator over recent lookups.
#[derive(Debug)]
pub(crate) struct ScanDetector {
    /// Lookups observed in the current window.
    lookups: AtomicU64,
    /// Misses observed in the current window.
    misses: AtomicU64,
    /// EWMA of per-window miss ratios, stored as f64 bits.
    ewma_bits: AtomicU64,
    /// Consecutive windows whose EWMA exceeded the threshold.
    hot_windows: AtomicU32,
}

impl ScanDetector {
    pub(crate) fn new() -> Self {
        ScanDetector {
            lookups: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            ewma_bits: AtomicU64::new(0f64.to_bits()),
            hot_windows: AtomicU32::new(0),
        }
    }

    /// Records one lookup outcome. The thread that completes a window
    /// rolls it into the EWMA.
    pub(crate) fn record(&self, hit: bool) {
        if !hit {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        let seen = self.lookups.fetch_add(1, Ordering::Relaxed) + 1;
        if seen >= WINDOW {
            self.roll_window();
        }
    }

    /// Whether the recent lookup stream looks like a scan.
    pub(crate) fn scanning(&self) -> bool {
        self.hot_windows.load(Ordering::Relaxed) >= SUSTAIN_WINDOWS
    }

    /// Resets all state, e.g. when the shard is cleared.
    pub(crate) fn reset(&self) {
        self.lookups.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.ewma_bits.store(0f64.to_bits(), Ordering::Relaxed);
        self.hot_windows.store(0, Ordering::Relaxed);
    }

    fn roll_window(&self) {
        // Single-roller election: whoever swaps the lookup counter back to
        // zero owns this window. Misses recorded by stragglers land in the
        // next window.
        let lookups = self.lookups.swap(0, Ordering::Relaxed);
        if lookups == 0 {
            return;
        }
        let misses = self.misses.swap(0, Ordering::Relaxed);
        let ratio = misses as f64 / lookups as f64;

        let prev = f64::from_bits(self.ewma_bits.load(Ordering::Relaxed));
        let ewma = (prev + ratio) / 2.0;
        self.ewma_bits.store(ewma.to_bits(), Ordering::Relaxed);

        if ewma > MISS_THRESHOLD {
            self.hot_windows.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hot_windows.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(detector: &ScanDetector, hits: u64, misses: u64) {
        for _ in 0..hits {
            detector.record(true);
        }
        for _ in 0..misses {
            detector.record(false);
        }
    }

    #[test]
    fn test_quiet_stream_is_not_a_scan() {
        let detector = ScanDetector::new();
        // Many windows of pure hits.
        feed(&detector, WINDOW * 4, 0);
        assert!(!detector.scanning());
    }

    #[test]
    fn test_pure_miss_stream_trips_detection() {
        let detector = ScanDetector::new();
        // First hot window: EWMA = 0.5, not above the threshold yet.
        feed(&detector, 0, WINDOW);
        assert!(!detector.scanning());
        // Keep missing: EWMA climbs to 0.75, then 0.875.
        feed(&detector, 0, WINDOW);
        feed(&detector, 0, WINDOW);
        assert!(detector.scanning());
    }

    #[test]
    fn test_single_bad_window_is_forgiven() {
        let detector = ScanDetector::new();
        feed(&detector, 0, WINDOW);
        feed(&detector, 0, WINDOW);
        // Recovery: hit-heavy windows pull the EWMA back down and reset
        // the streak.
        feed(&detector, WINDOW, 0);
        feed(&detector, WINDOW, 0);
        assert!(!detector.scanning());
    }

    #[test]
    fn test_mixed_traffic_below_threshold() {
        let detector = ScanDetector::new();
        for _ in 0..8 {
            // 25% miss ratio per window.
            for i in 0..WINDOW {
                detector.record(i % 4 != 0);
            }
        }
        assert!(!detector.scanning());
    }

    #[test]
    fn test_reset_clears_detection() {
        let detector = ScanDetector::new();
        feed(&detector, 0, WINDOW * 3);
        assert!(detector.scanning());
        detector.reset();
        assert!(!detector.scanning());
    }
}
