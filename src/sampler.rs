//! Delta-rate sampling shared by the cumulative-counter engines
//!
//! Every delta engine (CPU, network, disk, Bluetooth, RAPL zones) keeps one
//! previous sample and its capture time in a [`CounterStore`]. The first
//! observation only calibrates; observations closer together than the
//! configured minimum leave the baseline untouched so the caller can return
//! its cached result; every other observation hands back the previous
//! counters and the elapsed time, and the current sample becomes the new
//! baseline.

use std::time::{Duration, Instant};

/// Previous-sample holder for one engine
#[derive(Debug, Clone)]
pub struct CounterStore<C> {
    baseline: Option<Baseline<C>>,
    min_elapsed: Duration,
}

#[derive(Debug, Clone)]
struct Baseline<C> {
    counters: C,
    taken_at: Instant,
}

/// Result of offering a fresh sample to a [`CounterStore`]
#[derive(Debug, Clone, PartialEq)]
pub enum Observation<C> {
    /// There was no baseline; the sample became the baseline
    Calibrated,
    /// Too little time has passed; the sample was discarded
    TooSoon,
    /// The previous baseline and the time elapsed since it was taken
    Delta { previous: C, elapsed: Duration },
}

impl<C> CounterStore<C> {
    /// Create an empty store rejecting intervals shorter than `min_elapsed`
    pub fn new(min_elapsed: Duration) -> Self {
        Self {
            baseline: None,
            min_elapsed,
        }
    }

    /// Counters of the current baseline
    pub fn baseline(&self) -> Option<&C> {
        self.baseline.as_ref().map(|b| &b.counters)
    }

    /// Time since the baseline, if one exists
    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.baseline
            .as_ref()
            .map(|b| now.saturating_duration_since(b.taken_at))
    }

    /// Whether a sample taken at `now` would be rejected as too soon.
    ///
    /// Lets engines skip reading the kernel at all on back-to-back calls.
    pub fn is_too_soon(&self, now: Instant) -> bool {
        self.elapsed(now)
            .map(|elapsed| elapsed < self.min_elapsed || elapsed.is_zero())
            .unwrap_or(false)
    }

    /// Offer a sample taken at `now`
    pub fn observe(&mut self, current: C, now: Instant) -> Observation<C> {
        if self.baseline.is_none() {
            self.rebase(current, now);
            return Observation::Calibrated;
        }
        if self.is_too_soon(now) {
            return Observation::TooSoon;
        }

        let previous = self
            .baseline
            .replace(Baseline {
                counters: current,
                taken_at: now,
            })
            .map(|b| (b.counters, now.saturating_duration_since(b.taken_at)));

        match previous {
            Some((previous, elapsed)) => Observation::Delta { previous, elapsed },
            None => Observation::Calibrated,
        }
    }

    /// Store `current` as the baseline without computing anything
    pub fn rebase(&mut self, current: C, now: Instant) {
        self.baseline = Some(Baseline {
            counters: current,
            taken_at: now,
        });
    }
}

/// Difference between two readings of a cumulative counter.
///
/// A counter that went backwards (driver reload, interface replaced) yields 0.
pub fn counter_delta(current: u64, previous: u64) -> u64 {
    current.saturating_sub(previous)
}

/// Convert a byte delta over `elapsed` into megabits per second
pub fn mbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    (bytes as f64 * 8.0 / secs / 1_000_000.0).max(0.0)
}

/// Clamp a percentage into [0, 100], mapping NaN to 0
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_calibrates() {
        let mut store = CounterStore::new(Duration::from_millis(1));
        let t0 = Instant::now();
        assert_eq!(store.baseline(), None);
        assert_eq!(store.observe(10u64, t0), Observation::Calibrated);
        assert_eq!(store.baseline(), Some(&10));
    }

    #[test]
    fn test_too_soon_keeps_baseline() {
        let mut store = CounterStore::new(Duration::from_millis(1));
        let t0 = Instant::now();
        store.observe(10u64, t0);

        assert_eq!(store.observe(99, t0), Observation::TooSoon);
        assert_eq!(
            store.observe(99, t0 + Duration::from_micros(500)),
            Observation::TooSoon
        );

        match store.observe(25, t0 + Duration::from_secs(1)) {
            Observation::Delta { previous, elapsed } => {
                assert_eq!(previous, 10);
                assert_eq!(elapsed, Duration::from_secs(1));
            }
            other => panic!("unexpected observation {:?}", other),
        }
    }

    #[test]
    fn test_delta_advances_baseline() {
        let mut store = CounterStore::new(Duration::from_millis(1));
        let t0 = Instant::now();
        store.observe(1u64, t0);
        store.observe(2, t0 + Duration::from_secs(1));
        match store.observe(3, t0 + Duration::from_secs(3)) {
            Observation::Delta { previous, elapsed } => {
                assert_eq!(previous, 2);
                assert_eq!(elapsed, Duration::from_secs(2));
            }
            other => panic!("unexpected observation {:?}", other),
        }
    }

    #[test]
    fn test_rebase_replaces_baseline() {
        let mut store = CounterStore::new(Duration::from_millis(1));
        let t0 = Instant::now();
        store.observe(1u64, t0);
        store.rebase(7, t0 + Duration::from_secs(1));
        assert_eq!(store.baseline(), Some(&7));
        match store.observe(9, t0 + Duration::from_secs(3)) {
            Observation::Delta { previous, elapsed } => {
                assert_eq!(previous, 7);
                assert_eq!(elapsed, Duration::from_secs(2));
            }
            other => panic!("unexpected observation {:?}", other),
        }
    }

    #[test]
    fn test_counter_regression_clamps_to_zero() {
        assert_eq!(counter_delta(150, 100), 50);
        assert_eq!(counter_delta(100, 150), 0);
    }

    #[test]
    fn test_mbps() {
        assert_eq!(mbps(1_000_000, Duration::from_secs(1)), 8.0);
        assert_eq!(mbps(500_000, Duration::from_millis(500)), 8.0);
        assert_eq!(mbps(1_000, Duration::ZERO), 0.0);
    }

    #[test]
    fn test_mbps_monotonic_in_current() {
        let elapsed = Duration::from_millis(750);
        let previous = 1_000u64;
        let mut last = 0.0;
        for current in (1_000u64..50_000).step_by(997) {
            let rate = mbps(counter_delta(current, previous), elapsed);
            assert!(rate >= last);
            assert!(rate >= 0.0);
            last = rate;
        }
    }

    #[test]
    fn test_clamp_percent() {
        assert_eq!(clamp_percent(-3.0), 0.0);
        assert_eq!(clamp_percent(140.0), 100.0);
        assert_eq!(clamp_percent(f64::NAN), 0.0);
        assert_eq!(clamp_percent(42.5), 42.5);
    }
}
