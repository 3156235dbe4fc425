//! Power source collection
//!
//! Six independent families are gathered each pass:
//!
//! | Family | Path | Name |
//! |---|---|---|
//! | hwmon rails | `class/hwmon/*/power*_{input,average}` | `hwmon:<chip>:<label>` |
//! | derived V×I | `class/hwmon/*/in*_input` × `curr*_input` | `hwmon_vi:<chip>:<label>` |
//! | DRM GPU hwmon | `class/drm/cardN/device/hwmon/*/power*_input` | `gpu:<card>:<slot>:<powerN>` |
//! | NVMe hwmon | `class/nvme/*/device/hwmon/*/power*_input` | `disk:<ctrl>:<powerN>` |
//! | RAPL | `class/powercap/*/energy_uj` | `rapl:<zone>` |
//! | power_supply | `class/power_supply/*` | `battery:<name>`, `supply:<name>` |
//!
//! Readings outside `[0, max_source_w]` are dropped here and never reach
//! reconciliation.

use super::PowerSource;
use crate::config::PathsConfig;
use crate::platform::common::{
    file_name_string, is_blocked, list_dir_sorted, list_subdirs_sorted, probe, read_file_u64,
    read_first_line, uevent_value, Probe,
};
use crate::sampler::{CounterStore, Observation};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Battery and AC state gathered from `power_supply`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatteryState {
    pub has_battery: bool,
    pub battery_count: u32,
    pub ac_online: bool,
    pub total_w: f64,
    pub discharge_w: f64,
    pub charge_w: f64,
    /// Mean reported capacity over batteries that expose one
    pub capacity_avg: f64,
}

/// Everything gathered in one collection pass
#[derive(Debug, Clone, Default)]
pub struct Collection {
    /// Sources in collection order
    pub sources: Vec<PowerSource>,
    /// Sources that exist but could not be read
    pub blocked: BTreeSet<String>,
    pub battery: BatteryState,
    max_source_w: f64,
}

impl Collection {
    pub fn new(max_source_w: f64) -> Self {
        Self {
            max_source_w,
            ..Self::default()
        }
    }

    /// Record a reading, discarding implausible magnitudes
    pub fn push(&mut self, name: impl Into<String>, watts: f64) {
        let name = name.into();
        if !(0.0..=self.max_source_w).contains(&watts) {
            log::debug!("power: dropping {} at {:.3} W", name, watts);
            return;
        }
        self.sources.push(PowerSource { name, watts });
    }

    /// Record a source that exists but is permission-blocked
    pub fn block(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !name.is_empty() {
            self.blocked.insert(name);
        }
    }
}

/// Parse the channel index of `in3_input` / `curr1_label` style names
fn channel_index(file: &str, prefix: &str) -> Option<u32> {
    let rest = file.strip_prefix(prefix)?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// `power1_input` → `power1`, `power2_average` → `power2`
fn power_channel(file: &str) -> Option<&str> {
    if !file.starts_with("power") {
        return None;
    }
    file.strip_suffix("_input")
        .or_else(|| file.strip_suffix("_average"))
}

fn power_input_channel(file: &str) -> Option<&str> {
    if !file.starts_with("power") {
        return None;
    }
    file.strip_suffix("_input")
}

fn qualified(prefix: &str, chip: Option<&str>, label: &str) -> String {
    match chip {
        Some(chip) => format!("{}{}:{}", prefix, chip, label),
        None => format!("{}{}", prefix, label),
    }
}

/// Direct `hwmon` power rails, and V×I rails for chips that have none
pub fn collect_hwmon(paths: &PathsConfig, out: &mut Collection) {
    for chip_dir in list_subdirs_sorted(paths.sys("class/hwmon")) {
        let chip = read_first_line(chip_dir.join("name"));
        let chip = chip.as_deref();

        let mut has_direct = false;
        let mut in_mv: BTreeMap<u32, f64> = BTreeMap::new();
        let mut curr_ma: BTreeMap<u32, f64> = BTreeMap::new();
        let mut in_label: HashMap<u32, String> = HashMap::new();
        let mut curr_label: HashMap<u32, String> = HashMap::new();
        let mut blocked_rails: BTreeSet<u32> = BTreeSet::new();

        for file in list_dir_sorted(&chip_dir) {
            if !file.is_file() {
                continue;
            }
            let fname = file_name_string(&file);

            if let Some(channel) = power_channel(&fname) {
                has_direct = true;
                let label = read_first_line(chip_dir.join(format!("{}_label", channel)))
                    .unwrap_or_else(|| channel.to_string());
                let name = qualified("hwmon:", chip, &label);
                read_microwatts(&file, name, out);
            } else if fname.ends_with("_input") {
                let (idx, readings) = if let Some(idx) = channel_index(&fname, "in") {
                    (idx, &mut in_mv)
                } else if let Some(idx) = channel_index(&fname, "curr") {
                    (idx, &mut curr_ma)
                } else {
                    continue;
                };
                let reading = probe::<f64, _>(&file);
                if reading.is_blocked() {
                    blocked_rails.insert(idx);
                } else if let Some(v) = reading.value() {
                    readings.insert(idx, v);
                }
            } else if fname.ends_with("_label") {
                if let Some(label) = read_first_line(&file) {
                    if let Some(idx) = channel_index(&fname, "in") {
                        in_label.insert(idx, label);
                    } else if let Some(idx) = channel_index(&fname, "curr") {
                        curr_label.insert(idx, label);
                    }
                }
            }
        }

        if has_direct {
            continue;
        }

        let rail_name = |idx: u32| {
            let label = in_label
                .get(&idx)
                .or_else(|| curr_label.get(&idx))
                .cloned()
                .unwrap_or_else(|| format!("rail{}", idx));
            qualified("hwmon_vi:", chip, &label)
        };

        for idx in &blocked_rails {
            out.block(rail_name(*idx));
        }

        for (idx, mv) in in_mv {
            let Some(&ma) = curr_ma.get(&idx) else {
                continue;
            };
            if mv <= 0.0 || ma <= 0.0 {
                continue;
            }
            out.push(rail_name(idx), (mv / 1000.0) * (ma / 1000.0));
        }
    }
}

/// Read a microwatt attribute into `out`, recording it as blocked if needed.
/// Zero and negative readings contribute nothing.
fn read_microwatts(file: &Path, name: String, out: &mut Collection) {
    if is_blocked(file) {
        out.block(name);
        return;
    }
    match probe::<u64, _>(file) {
        Probe::Value(raw) if raw > 0 => out.push(name, raw as f64 / 1_000_000.0),
        Probe::Blocked => out.block(name),
        _ => {}
    }
}

/// `power*_input` files in every hwmon directory below `device`
fn device_power_inputs(device: &Path) -> Vec<(String, PathBuf)> {
    list_subdirs_sorted(device.join("hwmon"))
        .into_iter()
        .flat_map(|hw| list_dir_sorted(hw))
        .filter(|f| f.is_file())
        .filter_map(|f| {
            let channel = power_input_channel(&file_name_string(&f))?.to_string();
            Some((channel, f))
        })
        .collect()
}

/// GPU power rails reached through each DRM card's device node
pub fn collect_drm_gpu(paths: &PathsConfig, out: &mut Collection) {
    for card_dir in list_subdirs_sorted(paths.sys("class/drm")) {
        let card = file_name_string(&card_dir);
        if !card.starts_with("card") || card.contains('-') {
            continue;
        }
        let device = card_dir.join("device");
        if !device.is_dir() {
            continue;
        }
        let slot = uevent_value(device.join("uevent"), "PCI_SLOT_NAME");

        for (channel, file) in device_power_inputs(&device) {
            let name = match &slot {
                Some(slot) => format!("gpu:{}:{}:{}", card, slot, channel),
                None => format!("gpu:{}:{}", card, channel),
            };
            read_microwatts(&file, name, out);
        }
    }
}

/// NVMe controller power rails
pub fn collect_nvme(paths: &PathsConfig, out: &mut Collection) {
    for ctrl_dir in list_subdirs_sorted(paths.sys("class/nvme")) {
        let ctrl = file_name_string(&ctrl_dir);
        if !ctrl.starts_with("nvme") {
            continue;
        }
        for (channel, file) in device_power_inputs(&ctrl_dir.join("device")) {
            read_microwatts(&file, format!("disk:{}:{}", ctrl, channel), out);
        }
    }
}

/// Energy consumed between two RAPL counter reads, in µJ.
///
/// A counter that went backwards wrapped at `max_range`. Without a usable
/// range (absent, or not above the previous reading) the delta is unknown.
pub fn energy_delta(previous: u64, current: u64, max_range: Option<u64>) -> Option<u64> {
    if current >= previous {
        return Some(current - previous);
    }
    match max_range {
        Some(max) if max > previous => Some((max - previous) + current),
        _ => None,
    }
}

#[derive(Debug, Clone)]
struct ZoneState {
    store: CounterStore<u64>,
    last_watts: Option<f64>,
}

/// Per-zone RAPL baselines, owned by the fusion engine
#[derive(Debug, Clone)]
pub struct RaplZones {
    zones: HashMap<PathBuf, ZoneState>,
    min_elapsed: Duration,
}

impl RaplZones {
    pub fn new(min_elapsed: Duration) -> Self {
        Self {
            zones: HashMap::new(),
            min_elapsed,
        }
    }

    /// Convert every readable zone's energy counter into watts.
    ///
    /// The first read of a zone only records a baseline. Reads closer than
    /// the minimum interval repeat the zone's previous wattage.
    pub fn collect(&mut self, paths: &PathsConfig, now: Instant, out: &mut Collection) {
        for zone in list_subdirs_sorted(paths.sys("class/powercap")) {
            let energy_file = zone.join("energy_uj");
            if !energy_file.exists() {
                continue;
            }

            let key = read_first_line(zone.join("name"))
                .unwrap_or_else(|| file_name_string(&zone));
            let name = format!("rapl:{}", key);

            let energy = match probe::<u64, _>(&energy_file) {
                Probe::Value(v) => v,
                Probe::Blocked => {
                    out.block(name);
                    continue;
                }
                _ if is_blocked(&energy_file) => {
                    out.block(name);
                    continue;
                }
                _ => continue,
            };

            let min_elapsed = self.min_elapsed;
            let state = self.zones.entry(zone.clone()).or_insert_with(|| ZoneState {
                store: CounterStore::new(min_elapsed),
                last_watts: None,
            });

            let (previous, elapsed) = match state.store.observe(energy, now) {
                Observation::Calibrated => {
                    log::debug!("power: RAPL baseline for {}", name);
                    continue;
                }
                Observation::TooSoon => {
                    if let Some(watts) = state.last_watts {
                        out.push(name, watts);
                    }
                    continue;
                }
                Observation::Delta { previous, elapsed } => (previous, elapsed),
            };

            let max_range = read_file_u64(zone.join("max_energy_range_uj")).ok();
            state.last_watts = match energy_delta(previous, energy, max_range) {
                Some(uj) if uj > 0 => Some(uj as f64 / 1_000_000.0 / elapsed.as_secs_f64()),
                Some(_) => None,
                None => {
                    log::debug!("power: {} went backwards without a usable range", name);
                    None
                }
            };
            if let Some(watts) = state.last_watts {
                out.push(name, watts);
            }
        }
    }
}

/// `power_now`, or `current_now * voltage_now`, in µW (sign preserved)
fn supply_power_uw(dir: &Path) -> Option<f64> {
    if let Some(p) = probe::<f64, _>(dir.join("power_now")).value() {
        return Some(p);
    }
    let current = probe::<f64, _>(dir.join("current_now")).value()?;
    let voltage = probe::<f64, _>(dir.join("voltage_now")).value()?;
    Some(current * voltage / 1_000_000.0)
}

fn is_battery(name: &str, kind: Option<&str>) -> bool {
    name.starts_with("BAT") || kind == Some("Battery")
}

fn is_external_supply(name: &str, kind: Option<&str>) -> bool {
    matches!(kind, Some("Mains") | Some("USB")) || name.starts_with("AC") || name.starts_with("ADP")
}

/// Batteries, AC adapters and other `power_supply` devices
pub fn collect_power_supply(paths: &PathsConfig, out: &mut Collection) {
    let mut capacity_sum = 0.0;
    let mut capacity_count = 0u32;

    for dir in list_subdirs_sorted(paths.sys("class/power_supply")) {
        let name = file_name_string(&dir);
        let kind = read_first_line(dir.join("type"));
        let kind = kind.as_deref();

        if is_battery(&name, kind) {
            let battery = &mut out.battery;
            battery.has_battery = true;
            battery.battery_count += 1;

            // Some firmware reports discharge as a negative current
            if let Some(uw) = supply_power_uw(&dir).map(f64::abs) {
                let watts = uw / 1_000_000.0;
                if watts > 0.0 {
                    let status = read_first_line(dir.join("status"))
                        .unwrap_or_default()
                        .to_lowercase();
                    battery.total_w += watts;
                    if status.contains("discharg") {
                        battery.discharge_w += watts;
                    } else if status.contains("charg") {
                        battery.charge_w += watts;
                    }
                    out.push(format!("battery:{}", name), watts);
                }
            }

            if let Some(capacity) = probe::<f64, _>(dir.join("capacity")).value() {
                capacity_sum += capacity;
                capacity_count += 1;
            }
            continue;
        }

        if is_external_supply(&name, kind) {
            if let Some(online) = probe::<f64, _>(dir.join("online")).value() {
                if online > 0.5 {
                    out.battery.ac_online = true;
                }
            }
        }

        match supply_power_uw(&dir) {
            Some(uw) if uw > 0.0 => out.push(format!("supply:{}", name), uw / 1_000_000.0),
            _ => {
                let blocked = ["power_now", "current_now", "voltage_now"]
                    .iter()
                    .any(|f| is_blocked(dir.join(f)));
                if blocked {
                    out.block(format!("supply:{}", name));
                }
            }
        }
    }

    if capacity_count > 0 {
        out.battery.capacity_avg = capacity_sum / capacity_count as f64;
    }
}
