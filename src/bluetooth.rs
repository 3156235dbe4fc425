//! Bluetooth adapter throughput and metadata
//!
//! Each `hciN` entry of `/sys/class/bluetooth` with a `statistics`
//! directory is reported together with its identity (name, address,
//! bound driver, PCI slot, vendor/device ids) and RF-kill state.

use crate::config::{Config, PathsConfig};
use crate::network::InterfaceCounters;
use crate::platform::common::{
    file_name_string, list_dir_sorted, list_subdirs_sorted, read_file_u64, read_first_line,
    uevent_value,
};
use crate::sampler::{counter_delta, mbps, CounterStore, Observation};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

/// Throughput and identity of one adapter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BluetoothAdapterUsage {
    /// Device name, or the adapter id when the device has none
    pub name: String,
    pub rx_mbps: f64,
    pub tx_mbps: f64,
    /// rx + tx
    pub mbps: f64,
    pub address: String,
    /// Basename of the bound kernel driver
    pub driver: String,
    /// PCI slot (e.g. `0000:02:00.0`), empty for USB adapters
    pub slot: String,
    pub vendor_id: String,
    pub device_id: String,
    /// Soft- or hard-blocked by RF-kill
    pub rfkill_blocked: bool,
}

#[derive(Debug, Clone, Default)]
struct AdapterMeta {
    name: String,
    address: String,
    driver: String,
    slot: String,
    vendor_id: String,
    device_id: String,
    rfkill_blocked: bool,
}

/// Bluetooth activity engine
pub struct BluetoothActivityEngine {
    paths: PathsConfig,
    store: CounterStore<HashMap<String, InterfaceCounters>>,
    last_all: BTreeMap<String, BluetoothAdapterUsage>,
}

impl BluetoothActivityEngine {
    /// Create an engine reading the live `/sys`
    pub fn new() -> Self {
        Self::from_config(&Config::default())
    }

    /// Create an engine from configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            paths: config.paths.clone(),
            store: CounterStore::new(config.sampling.min_elapsed()),
            last_all: BTreeMap::new(),
        }
    }

    /// Summed throughput of all adapters in Mbps
    pub fn get_usage(&mut self) -> f64 {
        self.get_usage_at(Instant::now())
    }

    /// [`get_usage`](Self::get_usage) with an explicit sample time
    pub fn get_usage_at(&mut self, now: Instant) -> f64 {
        self.get_all_usage_at(now).values().map(|a| a.mbps).sum()
    }

    /// Per-adapter usage keyed by adapter id (`hci0`, ...)
    pub fn get_all_usage(&mut self) -> BTreeMap<String, BluetoothAdapterUsage> {
        self.get_all_usage_at(Instant::now())
    }

    /// [`get_all_usage`](Self::get_all_usage) with an explicit sample time
    pub fn get_all_usage_at(&mut self, now: Instant) -> BTreeMap<String, BluetoothAdapterUsage> {
        if self.store.is_too_soon(now) {
            return self.last_all.clone();
        }

        let current = self.read_all_bytes();
        let snapshot = current.clone();
        let (previous, elapsed) = match self.store.observe(current, now) {
            Observation::TooSoon => return self.last_all.clone(),
            Observation::Calibrated => (HashMap::new(), Duration::ZERO),
            Observation::Delta { previous, elapsed } => (previous, elapsed),
        };

        let mut out = BTreeMap::new();
        for (adapter, bytes) in &snapshot {
            let (rx_mbps, tx_mbps) = match previous.get(adapter) {
                Some(prev) => (
                    mbps(counter_delta(bytes.rx_bytes, prev.rx_bytes), elapsed),
                    mbps(counter_delta(bytes.tx_bytes, prev.tx_bytes), elapsed),
                ),
                None => (0.0, 0.0),
            };

            let meta = self.read_adapter_meta(adapter);
            out.insert(
                adapter.clone(),
                BluetoothAdapterUsage {
                    name: if meta.name.is_empty() {
                        adapter.clone()
                    } else {
                        meta.name
                    },
                    rx_mbps,
                    tx_mbps,
                    mbps: rx_mbps + tx_mbps,
                    address: meta.address,
                    driver: meta.driver,
                    slot: meta.slot,
                    vendor_id: meta.vendor_id,
                    device_id: meta.device_id,
                    rfkill_blocked: meta.rfkill_blocked,
                },
            );
        }

        self.last_all = out;
        self.last_all.clone()
    }

    fn read_all_bytes(&self) -> HashMap<String, InterfaceCounters> {
        let mut out = HashMap::new();
        for dir in list_subdirs_sorted(self.paths.sys("class/bluetooth")) {
            let adapter = file_name_string(&dir);
            if !adapter.starts_with("hci") {
                continue;
            }
            let stats = dir.join("statistics");
            if !stats.is_dir() {
                continue;
            }
            let rx = read_file_u64(stats.join("rx_bytes"));
            let tx = read_file_u64(stats.join("tx_bytes"));
            let counters = match (rx, tx) {
                (Ok(rx_bytes), Ok(tx_bytes)) => InterfaceCounters { rx_bytes, tx_bytes },
                // Carry the previous counters forward
                _ => match self.store.baseline().and_then(|b| b.get(&adapter)) {
                    Some(previous) => *previous,
                    None => {
                        log::debug!("bt: {} statistics unreadable", adapter);
                        continue;
                    }
                },
            };
            out.insert(adapter, counters);
        }
        log::trace!("bt: {} adapters", out.len());
        out
    }

    fn read_adapter_meta(&self, adapter: &str) -> AdapterMeta {
        let base = self.paths.sys("class/bluetooth").join(adapter);
        let dev = base.join("device");
        let text = |p: &Path| read_first_line(p).unwrap_or_default();

        let driver = fs::read_link(dev.join("driver"))
            .map(|target| file_name_string(&target))
            .unwrap_or_default();

        AdapterMeta {
            name: text(&dev.join("name")),
            address: text(&base.join("address")),
            driver,
            slot: uevent_value(dev.join("uevent"), "PCI_SLOT_NAME").unwrap_or_default(),
            vendor_id: text(&dev.join("vendor")),
            device_id: text(&dev.join("device")),
            rfkill_blocked: self.rfkill_blocked(adapter),
        }
    }

    fn rfkill_blocked(&self, adapter: &str) -> bool {
        list_dir_sorted(self.paths.sys("class/rfkill"))
            .into_iter()
            .filter(|entry| {
                read_first_line(entry.join("name"))
                    .map(|name| name.split(['-', ' ', ':']).any(|token| token == adapter))
                    .unwrap_or(false)
            })
            .any(|entry| {
                ["soft", "hard"]
                    .iter()
                    .any(|f| read_first_line(entry.join(f)).as_deref() == Some("1"))
            })
    }
}

impl Default for BluetoothActivityEngine {
    fn default() -> Self {
        Self::new()
    }
}
