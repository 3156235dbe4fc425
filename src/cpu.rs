//! Aggregate CPU busy percentage from `/proc/stat`

use crate::config::{Config, PathsConfig};
use crate::error::{LxError, Result};
use crate::sampler::{clamp_percent, counter_delta, CounterStore, Observation};
use std::fs;
use std::time::Instant;

/// Cumulative tick counters of the aggregate `cpu` line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTicks {
    /// Sum of user, nice, system, idle, iowait, irq, softirq and steal
    pub total: u64,
    /// idle + iowait
    pub idle: u64,
}

impl CpuTicks {
    /// Parse the first `cpu` line of `/proc/stat`.
    ///
    /// Kernels older than 2.6.11 lack the trailing fields; at least
    /// user, nice, system and idle must be present.
    pub fn parse(proc_stat: &str) -> Result<Self> {
        let line = proc_stat
            .lines()
            .find(|l| l.split_whitespace().next() == Some("cpu"))
            .ok_or_else(|| LxError::Parse("no aggregate cpu line".to_string()))?;

        let fields: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .take(8)
            .map_while(|s| s.parse().ok())
            .collect();
        if fields.len() < 4 {
            return Err(LxError::Parse(format!("short cpu line: {:?}", line)));
        }

        let field = |i: usize| fields.get(i).copied().unwrap_or(0);
        let total = fields.iter().sum();
        let idle = field(3) + field(4);
        if total == 0 {
            return Err(LxError::Parse("cpu tick total is zero".to_string()));
        }
        Ok(Self { total, idle })
    }
}

/// Busy percentage between two tick samples, or `None` when no ticks elapsed
pub fn busy_percent(previous: CpuTicks, current: CpuTicks) -> Option<f64> {
    let total = counter_delta(current.total, previous.total);
    if total == 0 {
        return None;
    }
    let idle = counter_delta(current.idle, previous.idle);
    Some(clamp_percent(100.0 * (1.0 - idle as f64 / total as f64)))
}

/// CPU usage engine
pub struct CpuUsageEngine {
    paths: PathsConfig,
    store: CounterStore<CpuTicks>,
    last_value: f64,
}

impl CpuUsageEngine {
    /// Create an engine reading the live `/proc`
    pub fn new() -> Self {
        Self::from_config(&Config::default())
    }

    /// Create an engine from configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            paths: config.paths.clone(),
            store: CounterStore::new(config.sampling.min_elapsed()),
            last_value: 0.0,
        }
    }

    /// Total CPU busy percentage since the previous call
    pub fn get_usage(&mut self) -> f64 {
        self.get_usage_at(Instant::now())
    }

    /// [`get_usage`](Self::get_usage) with an explicit sample time
    pub fn get_usage_at(&mut self, now: Instant) -> f64 {
        if self.store.is_too_soon(now) {
            return self.last_value;
        }

        let ticks = match self.read_ticks() {
            Ok(ticks) => ticks,
            Err(e) => {
                log::debug!("cpu: keeping last value, read failed: {}", e);
                return self.last_value;
            }
        };
        log::trace!("cpu: total={} idle={}", ticks.total, ticks.idle);

        match self.store.observe(ticks, now) {
            Observation::Calibrated | Observation::TooSoon => self.last_value,
            Observation::Delta { previous, .. } => {
                if let Some(value) = busy_percent(previous, ticks) {
                    self.last_value = value;
                }
                self.last_value
            }
        }
    }

    fn read_ticks(&self) -> Result<CpuTicks> {
        let content = fs::read_to_string(self.paths.proc("stat"))?;
        CpuTicks::parse(&content)
    }
}

impl Default for CpuUsageEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeRoot;
    use std::time::Duration;

    fn stat_line(user: u64, idle: u64) -> String {
        format!(
            "cpu  {} 0 0 {} 0 0 0 0 0 0\ncpu0 {} 0 0 {} 0 0 0 0 0 0\nintr 1\n",
            user, idle, user, idle
        )
    }

    #[test]
    fn test_parse_full_line() {
        let ticks = CpuTicks::parse("cpu  10 20 30 40 5 6 7 8 9 10\n").unwrap();
        assert_eq!(ticks.total, 10 + 20 + 30 + 40 + 5 + 6 + 7 + 8);
        assert_eq!(ticks.idle, 45);
    }

    #[test]
    fn test_parse_short_line() {
        let ticks = CpuTicks::parse("cpu 1 2 3 4\n").unwrap();
        assert_eq!(ticks.total, 10);
        assert_eq!(ticks.idle, 4);
        assert!(CpuTicks::parse("cpu 1 2\n").is_err());
        assert!(CpuTicks::parse("intr 5\n").is_err());
    }

    #[test]
    fn test_busy_percent_range() {
        let prev = CpuTicks { total: 1000, idle: 800 };
        let cur = CpuTicks { total: 1100, idle: 850 };
        assert_eq!(busy_percent(prev, cur), Some(50.0));
        assert_eq!(busy_percent(prev, prev), None);

        // idle advancing faster than total (counter glitch) stays in range
        let glitch = CpuTicks { total: 1010, idle: 900 };
        assert_eq!(busy_percent(prev, glitch), Some(0.0));
    }

    #[test]
    fn test_busy_percent_monotonic_in_busy_ticks() {
        let prev = CpuTicks { total: 0, idle: 0 };
        let mut last = 0.0;
        for busy in 0..=100u64 {
            let cur = CpuTicks {
                total: 100 + busy,
                idle: 100,
            };
            let value = busy_percent(prev, cur).unwrap();
            assert!((0.0..=100.0).contains(&value));
            assert!(value >= last);
            last = value;
        }
    }

    #[test]
    fn test_engine_first_call_calibrates() {
        let root = FakeRoot::new();
        root.write("proc/stat", &stat_line(100, 900));
        let mut engine = CpuUsageEngine::from_config(&root.config());
        assert_eq!(engine.get_usage_at(Instant::now()), 0.0);
    }

    #[test]
    fn test_engine_computes_delta() {
        let root = FakeRoot::new();
        let mut engine = CpuUsageEngine::from_config(&root.config());
        let t0 = Instant::now();

        root.write("proc/stat", &stat_line(100, 900));
        engine.get_usage_at(t0);
        root.write("proc/stat", &stat_line(175, 925));
        let usage = engine.get_usage_at(t0 + Duration::from_secs(1));
        assert!((usage - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_engine_back_to_back_returns_cached() {
        let root = FakeRoot::new();
        let mut engine = CpuUsageEngine::from_config(&root.config());
        let t0 = Instant::now();

        root.write("proc/stat", &stat_line(100, 900));
        engine.get_usage_at(t0);
        root.write("proc/stat", &stat_line(150, 950));
        let t1 = t0 + Duration::from_secs(1);
        assert_eq!(engine.get_usage_at(t1), 50.0);

        root.write("proc/stat", &stat_line(250, 950));
        assert_eq!(engine.get_usage_at(t1), 50.0);
    }

    #[test]
    fn test_engine_missing_file_keeps_last_value() {
        let root = FakeRoot::new();
        let mut engine = CpuUsageEngine::from_config(&root.config());
        let t0 = Instant::now();
        assert_eq!(engine.get_usage_at(t0), 0.0);

        root.write("proc/stat", &stat_line(100, 900));
        engine.get_usage_at(t0 + Duration::from_secs(1));
        root.write("proc/stat", &stat_line(120, 980));
        let value = engine.get_usage_at(t0 + Duration::from_secs(2));
        assert!((value - 20.0).abs() < 1e-9);

        root.remove("proc/stat");
        assert_eq!(engine.get_usage_at(t0 + Duration::from_secs(3)), value);
    }
}
