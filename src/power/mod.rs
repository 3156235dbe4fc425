//! Power Fusion Engine
//!
//! Produces one total-power figure out of overlapping kernel sensor
//! exposures. Each pass:
//!
//! 1. collects [`PowerSource`]s from hwmon, derived V×I, DRM GPU, NVMe,
//!    RAPL and power_supply ([`sources`])
//! 2. merges same-named sources
//! 3. removes the second copy of a CPU/GPU rail exposed under two paths
//!    ([`classify::likely_duplicate`])
//! 4. sorts by name and sums each functional domain ([`classify::classify`])
//! 5. reports the component total, else battery draw, else nothing
//!
//! # Examples
//!
//! ```no_run
//! use lxmon::PowerFusionEngine;
//!
//! let mut power = PowerFusionEngine::new();
//! let snap = power.get_all_usage();
//! println!("{:.1} W ({})", snap.total_w, snap.source);
//! for name in &snap.blocked_sources {
//!     println!("  unreadable: {}", name);
//! }
//! ```

pub mod classify;
pub mod sources;

pub use classify::{classify, SourceClass};
pub use sources::{energy_delta, BatteryState, Collection, RaplZones};

use crate::config::{Config, PathsConfig, PowerConfig};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::time::Instant;

/// One wattage reading and where it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSource {
    pub name: String,
    pub watts: f64,
}

/// Provenance of [`PowerSnapshot::total_w`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TotalSource {
    Components,
    Battery,
    #[default]
    None,
}

impl TotalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TotalSource::Components => "components",
            TotalSource::Battery => "battery",
            TotalSource::None => "none",
        }
    }
}

impl fmt::Display for TotalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fused result of one pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerSnapshot {
    pub total_w: f64,
    pub source: TotalSource,
    pub has_battery: bool,
    pub battery_count: u32,
    pub ac_online: bool,
    pub battery_total_w: f64,
    pub battery_discharge_w: f64,
    pub battery_charge_w: f64,
    pub battery_capacity_avg: f64,
    pub cpu_w: f64,
    pub gpu_w: f64,
    pub disk_w: f64,
    pub net_w: f64,
    pub board_w: f64,
    pub memory_w: f64,
    pub other_w: f64,
    /// Surviving sources, including battery rails
    pub sources: BTreeMap<String, f64>,
    /// Sources present but permission-blocked
    pub blocked_sources: BTreeSet<String>,
}

impl PowerSnapshot {
    /// Sum of the domain sub-totals
    pub fn component_total_w(&self) -> f64 {
        self.cpu_w
            + self.gpu_w
            + self.disk_w
            + self.net_w
            + self.memory_w
            + self.board_w
            + self.other_w
    }
}

/// Sum same-named sources, keeping first-appearance order
pub fn merge_by_name(sources: Vec<PowerSource>) -> Vec<PowerSource> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<PowerSource> = Vec::with_capacity(sources.len());
    for source in sources {
        match index.get(&source.name) {
            Some(&i) => merged[i].watts += source.watts,
            None => {
                index.insert(source.name.clone(), merged.len());
                merged.push(source);
            }
        }
    }
    merged
}

/// Drop the lower-scored source of every likely-duplicate pair.
///
/// Ties keep the earlier source.
pub fn dedup_sources(sources: Vec<PowerSource>, config: &PowerConfig) -> Vec<PowerSource> {
    let mut dropped = vec![false; sources.len()];

    for i in 0..sources.len() {
        if dropped[i] {
            continue;
        }
        for j in (i + 1)..sources.len() {
            if dropped[j] || !classify::likely_duplicate(&sources[i], &sources[j], config) {
                continue;
            }
            let (si, sj) = (
                classify::dedup_score(&sources[i].name),
                classify::dedup_score(&sources[j].name),
            );
            log::debug!(
                "power: {} ({:.2} W) duplicates {} ({:.2} W)",
                sources[i].name,
                sources[i].watts,
                sources[j].name,
                sources[j].watts
            );
            if si >= sj {
                dropped[j] = true;
            } else {
                dropped[i] = true;
                break;
            }
        }
    }

    sources
        .into_iter()
        .zip(dropped)
        .filter_map(|(s, drop)| (!drop).then_some(s))
        .collect()
}

/// Reconcile one collection pass into a snapshot
pub fn fuse(collection: Collection, config: &PowerConfig) -> PowerSnapshot {
    let Collection {
        sources,
        blocked,
        battery,
        ..
    } = collection;

    let mut sources = dedup_sources(merge_by_name(sources), config);
    sources.sort_by(|a, b| a.name.cmp(&b.name));

    let mut snap = PowerSnapshot {
        has_battery: battery.has_battery,
        battery_count: battery.battery_count,
        ac_online: battery.ac_online,
        battery_total_w: battery.total_w,
        battery_discharge_w: battery.discharge_w,
        battery_charge_w: battery.charge_w,
        battery_capacity_avg: battery.capacity_avg,
        blocked_sources: blocked,
        ..PowerSnapshot::default()
    };

    for source in &sources {
        let slot = match classify(&source.name) {
            SourceClass::Unknown => continue,
            SourceClass::Cpu => &mut snap.cpu_w,
            SourceClass::Gpu => &mut snap.gpu_w,
            SourceClass::Disk => &mut snap.disk_w,
            SourceClass::Net => &mut snap.net_w,
            SourceClass::Memory => &mut snap.memory_w,
            SourceClass::Board => &mut snap.board_w,
            SourceClass::Other => &mut snap.other_w,
        };
        *slot += source.watts;
    }

    let components = snap.component_total_w();
    if components > config.noise_floor_w {
        snap.total_w = components;
        snap.source = TotalSource::Components;
    } else if snap.battery_total_w > config.noise_floor_w {
        snap.total_w = snap.battery_total_w;
        snap.source = TotalSource::Battery;
    }

    snap.sources = sources.into_iter().map(|s| (s.name, s.watts)).collect();
    snap
}

/// Power fusion engine. Owns the RAPL zone baselines.
pub struct PowerFusionEngine {
    paths: PathsConfig,
    config: PowerConfig,
    rapl: RaplZones,
}

impl PowerFusionEngine {
    /// Create an engine reading the live `/sys`
    pub fn new() -> Self {
        Self::from_config(&Config::default())
    }

    /// Create an engine from configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            paths: config.paths.clone(),
            config: config.power.clone(),
            rapl: RaplZones::new(config.sampling.min_elapsed()),
        }
    }

    /// Best-effort total power in watts
    pub fn get_usage(&mut self) -> f64 {
        self.get_usage_at(Instant::now())
    }

    /// [`get_usage`](Self::get_usage) with an explicit sample time
    pub fn get_usage_at(&mut self, now: Instant) -> f64 {
        self.get_all_usage_at(now).total_w.max(0.0)
    }

    /// Full fused snapshot
    pub fn get_all_usage(&mut self) -> PowerSnapshot {
        self.get_all_usage_at(Instant::now())
    }

    /// [`get_all_usage`](Self::get_all_usage) with an explicit sample time
    pub fn get_all_usage_at(&mut self, now: Instant) -> PowerSnapshot {
        let mut collection = Collection::new(self.config.max_source_w);
        sources::collect_hwmon(&self.paths, &mut collection);
        sources::collect_drm_gpu(&self.paths, &mut collection);
        sources::collect_nvme(&self.paths, &mut collection);
        self.rapl.collect(&self.paths, now, &mut collection);
        sources::collect_power_supply(&self.paths, &mut collection);

        log::trace!(
            "power: {} sources, {} blocked",
            collection.sources.len(),
            collection.blocked.len()
        );
        fuse(collection, &self.config)
    }
}

impl Default for PowerFusionEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeRoot;
    use std::time::Duration;

    fn collection(sources: &[(&str, f64)]) -> Collection {
        let mut c = Collection::new(3000.0);
        for (name, watts) in sources {
            c.push(*name, *watts);
        }
        c
    }

    #[test]
    fn test_gpu_rail_seen_twice_collapses_to_hwmon() {
        let snap = fuse(
            collection(&[
                ("hwmon:amdgpu:ppt", 45.0),
                ("gpu:card0:0000:01:00.0:power1", 45.2),
            ]),
            &PowerConfig::default(),
        );
        assert_eq!(snap.sources.len(), 1);
        assert_eq!(snap.sources.get("hwmon:amdgpu:ppt"), Some(&45.0));
        assert_eq!(snap.gpu_w, 45.0);
        assert_eq!(snap.total_w, 45.0);
    }

    #[test]
    fn test_lower_score_first_is_replaced() {
        let snap = fuse(
            collection(&[
                ("gpu:card0:0000:01:00.0:power1", 45.2),
                ("hwmon:amdgpu:ppt", 45.0),
            ]),
            &PowerConfig::default(),
        );
        assert_eq!(snap.sources.keys().collect::<Vec<_>>(), vec!["hwmon:amdgpu:ppt"]);
    }

    #[test]
    fn test_dropped_anchor_stops_its_cluster_scan() {
        // power1 ~ PPT and power1 ~ power2, but PPT and power2 are 0.6 W apart
        let sources = ["gpu:card0:power1", "hwmon:amdgpu:PPT", "gpu:card0:power2"]
            .iter()
            .zip([10.0, 10.3, 9.7])
            .map(|(name, watts)| PowerSource {
                name: name.to_string(),
                watts,
            })
            .collect();

        let kept = dedup_sources(sources, &PowerConfig::default());
        let names: Vec<&str> = kept.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["hwmon:amdgpu:PPT", "gpu:card0:power2"]);
    }

    #[test]
    fn test_rapl_preferred_over_hwmon_cpu() {
        let snap = fuse(
            collection(&[
                ("hwmon:zenpower:SVI2_P_Core", 20.0),
                ("rapl:package-0", 20.3),
            ]),
            &PowerConfig::default(),
        );
        assert_eq!(snap.sources.keys().collect::<Vec<_>>(), vec!["rapl:package-0"]);
        assert_eq!(snap.cpu_w, 20.3);
    }

    #[test]
    fn test_merge_by_name_sums() {
        let merged = merge_by_name(vec![
            PowerSource {
                name: "rapl:core".into(),
                watts: 3.0,
            },
            PowerSource {
                name: "rapl:package-0".into(),
                watts: 10.0,
            },
            PowerSource {
                name: "rapl:core".into(),
                watts: 4.0,
            },
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "rapl:core");
        assert_eq!(merged[0].watts, 7.0);
    }

    #[test]
    fn test_domain_totals_sum_to_total() {
        let sets: Vec<Vec<(&str, f64)>> = vec![
            vec![
                ("rapl:package-0", 17.31),
                ("rapl:dram", 2.07),
                ("hwmon:amdgpu:PPT", 61.9),
                ("disk:nvme0:power1", 3.3),
                ("hwmon_vi:ina3221:wifi", 0.71),
                ("hwmon:foo:DDR_VDDQ", 1.13),
                ("supply:ucsi-psy", 4.4),
                ("hwmon:acpi_power_meter:power1", 88.8),
                ("battery:BAT0", 9.9),
            ],
            vec![("hwmon:it8792:power1", 0.1), ("gpu:card1:power1", 0.2)],
            vec![("rapl:core", 0.3), ("rapl:uncore", 0.7), ("rapl:psys", 1.1)],
        ];

        for set in sets {
            let snap = fuse(collection(&set), &PowerConfig::default());
            assert_eq!(snap.source, TotalSource::Components);
            assert_eq!(
                snap.cpu_w
                    + snap.gpu_w
                    + snap.disk_w
                    + snap.net_w
                    + snap.memory_w
                    + snap.board_w
                    + snap.other_w,
                snap.total_w
            );
            assert!(snap.total_w >= 0.0);
        }
    }

    #[test]
    fn test_battery_excluded_from_components() {
        let mut c = collection(&[("battery:BAT0", 11.0)]);
        c.battery = BatteryState {
            has_battery: true,
            battery_count: 1,
            total_w: 11.0,
            discharge_w: 11.0,
            ..BatteryState::default()
        };
        let snap = fuse(c, &PowerConfig::default());
        assert_eq!(snap.component_total_w(), 0.0);
        assert_eq!(snap.source, TotalSource::Battery);
        assert_eq!(snap.total_w, 11.0);
        assert_eq!(snap.sources.get("battery:BAT0"), Some(&11.0));
    }

    #[test]
    fn test_noise_floor_gives_none() {
        let snap = fuse(collection(&[("hwmon:foo:power1", 0.005)]), &PowerConfig::default());
        assert_eq!(snap.source, TotalSource::None);
        assert_eq!(snap.total_w, 0.0);
    }

    #[test]
    fn test_snapshot_serializes_expected_keys() {
        let snap = fuse(collection(&[("rapl:package-0", 5.0)]), &PowerConfig::default());
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["source"], "components");
        assert_eq!(json["cpu_w"], 5.0);
        assert!(json["blocked_sources"].as_array().unwrap().is_empty());
        assert_eq!(json["sources"]["rapl:package-0"], 5.0);
    }

    #[test]
    fn test_engine_end_to_end() {
        let root = FakeRoot::new();
        root.write("sys/class/hwmon/hwmon2/name", "amdgpu\n");
        root.write("sys/class/hwmon/hwmon2/power1_average", "45000000\n");
        root.write("sys/class/hwmon/hwmon2/power1_label", "PPT\n");
        root.write(
            "sys/class/drm/card0/device/uevent",
            "PCI_SLOT_NAME=0000:01:00.0\n",
        );
        root.write("sys/class/drm/card0/device/hwmon/hwmon2/power1_input", "45200000\n");
        root.write("sys/class/powercap/intel-rapl:0/name", "package-0\n");
        root.write("sys/class/powercap/intel-rapl:0/energy_uj", "0\n");

        let mut engine = PowerFusionEngine::from_config(&root.config());
        let t0 = Instant::now();

        let first = engine.get_all_usage_at(t0);
        assert_eq!(first.sources.len(), 1);
        assert_eq!(first.total_w, 45.0);

        root.write("sys/class/powercap/intel-rapl:0/energy_uj", "15000000\n");
        let second = engine.get_all_usage_at(t0 + Duration::from_secs(1));
        assert_eq!(second.cpu_w, 15.0);
        assert_eq!(second.gpu_w, 45.0);
        assert_eq!(second.total_w, 60.0);
        assert_eq!(second.source, TotalSource::Components);
    }

    #[test]
    fn test_empty_system() {
        let root = FakeRoot::new();
        let mut engine = PowerFusionEngine::from_config(&root.config());
        assert_eq!(engine.get_usage_at(Instant::now()), 0.0);
        let snap = engine.get_all_usage_at(Instant::now());
        assert_eq!(snap.source, TotalSource::None);
        assert!(!snap.has_battery);
    }
}
