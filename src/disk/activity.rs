//! Per-disk busy-time utilisation from `/proc/diskstats`

use super::inventory::{strip_partition_suffix, DiskIdentity, DiskInventory};
use crate::config::{Config, PathsConfig};
use crate::sampler::{clamp_percent, counter_delta, CounterStore, Observation};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::time::{Duration, Instant};

/// Busy-time counters of one tracked disk, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskCounters {
    /// Time spent doing I/O (field 10)
    pub io_ms: u64,
    /// Weighted time spent doing I/O (field 11)
    pub weighted_io_ms: u64,
}

/// Parse `/proc/diskstats`, bucketing partitions onto tracked parents.
///
/// Rows for untracked devices whose parent is also untracked are ignored.
/// Several rows landing in one bucket combine with `max` so that a disk
/// and its partitions are not counted twice.
pub fn parse_diskstats(
    content: &str,
    tracked: &BTreeSet<String>,
) -> HashMap<String, DiskCounters> {
    let mut out: HashMap<String, DiskCounters> = HashMap::new();

    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 14 {
            continue;
        }
        let name = fields[2];
        let (Ok(io_ms), Ok(weighted_io_ms)) = (fields[12].parse(), fields[13].parse()) else {
            continue;
        };

        let bucket = if tracked.contains(name) {
            name
        } else {
            let parent = strip_partition_suffix(name);
            if !tracked.contains(parent) {
                continue;
            }
            parent
        };

        let entry = out.entry(bucket.to_string()).or_default();
        entry.io_ms = entry.io_ms.max(io_ms);
        entry.weighted_io_ms = entry.weighted_io_ms.max(weighted_io_ms);
    }

    out
}

/// Utilisation percentage between two counter samples `elapsed` apart
pub fn utilisation(previous: DiskCounters, current: DiskCounters, elapsed: Duration) -> f64 {
    let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
    if elapsed_ms <= 0.0 {
        return 0.0;
    }
    let io = counter_delta(current.io_ms, previous.io_ms);
    let weighted = counter_delta(current.weighted_io_ms, previous.weighted_io_ms);
    clamp_percent(io.max(weighted) as f64 / elapsed_ms * 100.0)
}

/// Disk activity engine
pub struct DiskActivityEngine {
    paths: PathsConfig,
    inventory: DiskInventory,
    tracked: Vec<String>,
    identities: Vec<DiskIdentity>,
    store: CounterStore<HashMap<String, DiskCounters>>,
    last_by_disk: BTreeMap<String, f64>,
    last_average: f64,
}

impl DiskActivityEngine {
    /// Create an engine reading the live kernel surfaces
    pub fn new() -> Self {
        Self::from_config(&Config::default())
    }

    /// Create an engine from configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            paths: config.paths.clone(),
            inventory: DiskInventory::new(config.paths.clone()),
            tracked: Vec::new(),
            identities: Vec::new(),
            store: CounterStore::new(config.sampling.min_elapsed()),
            last_by_disk: BTreeMap::new(),
            last_average: 0.0,
        }
    }

    /// Mean utilisation over all tracked disks
    pub fn get_usage(&mut self) -> f64 {
        self.get_usage_at(Instant::now())
    }

    /// [`get_usage`](Self::get_usage) with an explicit sample time
    pub fn get_usage_at(&mut self, now: Instant) -> f64 {
        let by_disk = self.sample(now);
        if !by_disk.is_empty() {
            self.last_average = by_disk.values().sum::<f64>() / by_disk.len() as f64;
        }
        self.last_average
    }

    /// Utilisation keyed by display label
    pub fn get_all_usage(&mut self) -> BTreeMap<String, f64> {
        self.get_all_usage_at(Instant::now())
    }

    /// [`get_all_usage`](Self::get_all_usage) with an explicit sample time
    pub fn get_all_usage_at(&mut self, now: Instant) -> BTreeMap<String, f64> {
        let by_disk = self.sample(now);
        self.identities
            .iter()
            .filter_map(|id| by_disk.get(&id.name).map(|v| (id.label.clone(), *v)))
            .collect()
    }

    /// Utilisation keyed by kernel device name
    pub fn get_usage_by_device_at(&mut self, now: Instant) -> BTreeMap<String, f64> {
        self.sample(now)
    }

    /// Disks tracked after the most recent pass
    pub fn identities(&self) -> &[DiskIdentity] {
        &self.identities
    }

    fn zero_map(&self) -> BTreeMap<String, f64> {
        self.tracked.iter().map(|d| (d.clone(), 0.0)).collect()
    }

    fn read_counters(&self) -> HashMap<String, DiskCounters> {
        let tracked: BTreeSet<String> = self.tracked.iter().cloned().collect();
        match fs::read_to_string(self.paths.proc("diskstats")) {
            Ok(content) => parse_diskstats(&content, &tracked),
            Err(e) => {
                log::debug!("disk: diskstats unreadable: {}", e);
                HashMap::new()
            }
        }
    }

    fn sample(&mut self, now: Instant) -> BTreeMap<String, f64> {
        let fresh = self.inventory.detect();
        if fresh != self.tracked {
            log::debug!("disk: device set changed to {:?}", fresh);
            self.tracked = fresh;
            self.identities = self.inventory.identities(&self.tracked);
            let counters = self.read_counters();
            self.store.rebase(counters, now);
            self.last_by_disk = self.zero_map();
            return self.last_by_disk.clone();
        }

        if self.store.is_too_soon(now) {
            return self.last_by_disk.clone();
        }

        let current = self.read_counters();
        if current.is_empty() {
            return self.last_by_disk.clone();
        }

        let snapshot = current.clone();
        match self.store.observe(current, now) {
            Observation::TooSoon => {}
            Observation::Calibrated => self.last_by_disk = self.zero_map(),
            Observation::Delta { previous, elapsed } => {
                let mut out = BTreeMap::new();
                for disk in &self.tracked {
                    if let (Some(prev), Some(cur)) = (previous.get(disk), snapshot.get(disk)) {
                        out.insert(disk.clone(), utilisation(*prev, *cur, elapsed));
                    }
                }
                log::trace!("disk: {:?}", out);
                self.last_by_disk = if out.is_empty() { self.zero_map() } else { out };
            }
        }

        self.last_by_disk.clone()
    }
}

impl Default for DiskActivityEngine {
    fn default() -> Self {
        Self::new()
    }
}
