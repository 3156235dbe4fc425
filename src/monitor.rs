//! One-stop facade polling every engine

use crate::bluetooth::{BluetoothActivityEngine, BluetoothAdapterUsage};
use crate::config::Config;
use crate::cpu::CpuUsageEngine;
use crate::disk::DiskActivityEngine;
use crate::gpu::{GpuTemperatureEngine, GpuUsageEngine};
use crate::memory::{MemoryInfo, MemoryUsageEngine};
use crate::network::NetworkUsageEngine;
use crate::power::{PowerFusionEngine, PowerSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// Network throughput of one pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub rx_mbps: f64,
    pub tx_mbps: f64,
    pub total_mbps: f64,
    /// Per-interface rx + tx
    pub interfaces: BTreeMap<String, f64>,
}

/// Complete telemetry snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub timestamp: DateTime<Utc>,
    /// CPU busy percentage
    pub cpu_percent: f64,
    pub memory: MemoryInfo,
    pub network: NetworkSnapshot,
    /// Mean disk utilisation
    pub disk_percent: f64,
    /// Utilisation keyed by disk label
    pub disks: BTreeMap<String, f64>,
    pub bluetooth: BTreeMap<String, BluetoothAdapterUsage>,
    /// GPU busy percentage
    pub gpu_percent: f64,
    /// `"nvml"` or `"sysfs"`
    pub gpu_backend: String,
    /// Hottest GPU sensor, `None` without one
    pub gpu_temperature_c: Option<f64>,
    pub power: PowerSnapshot,
}

/// Owns one instance of each engine.
///
/// Delta engines calibrate on the first [`snapshot`](Self::snapshot), so
/// the first result reports zero rates.
///
/// # Example
///
/// ```no_run
/// use lxmon::Monitor;
/// use std::{thread, time::Duration};
///
/// let mut monitor = Monitor::new();
/// monitor.snapshot();
/// thread::sleep(Duration::from_secs(1));
/// let snap = monitor.snapshot();
/// println!("CPU {:.1}%  power {:.1} W", snap.cpu_percent, snap.power.total_w);
/// ```
pub struct Monitor {
    cpu: CpuUsageEngine,
    memory: MemoryUsageEngine,
    network: NetworkUsageEngine,
    disk: DiskActivityEngine,
    bluetooth: BluetoothActivityEngine,
    gpu: GpuUsageEngine,
    gpu_temperature: GpuTemperatureEngine,
    power: PowerFusionEngine,
}

impl Monitor {
    pub fn new() -> Self {
        Self::from_config(&Config::default())
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            cpu: CpuUsageEngine::from_config(config),
            memory: MemoryUsageEngine::from_config(config),
            network: NetworkUsageEngine::from_config(config),
            disk: DiskActivityEngine::from_config(config),
            bluetooth: BluetoothActivityEngine::from_config(config),
            gpu: GpuUsageEngine::from_config(config),
            gpu_temperature: GpuTemperatureEngine::from_config(config),
            power: PowerFusionEngine::from_config(config),
        }
    }

    /// Poll every engine once
    pub fn snapshot(&mut self) -> TelemetrySnapshot {
        self.snapshot_at(Instant::now())
    }

    /// [`snapshot`](Self::snapshot) with an explicit sample time
    pub fn snapshot_at(&mut self, now: Instant) -> TelemetrySnapshot {
        let interfaces = self.network.get_all_usage_at(now);
        let network = NetworkSnapshot {
            rx_mbps: self.network.rx_mbps(),
            tx_mbps: self.network.tx_mbps(),
            total_mbps: self.network.total_mbps(),
            interfaces,
        };

        let disks = self.disk.get_all_usage_at(now);
        let disk_percent = self.disk.get_usage_at(now);

        TelemetrySnapshot {
            timestamp: Utc::now(),
            cpu_percent: self.cpu.get_usage_at(now),
            memory: self.memory.snapshot(),
            network,
            disk_percent,
            disks,
            bluetooth: self.bluetooth.get_all_usage_at(now),
            gpu_percent: self.gpu.get_usage(),
            gpu_backend: self.gpu.backend().to_string(),
            gpu_temperature_c: self.gpu_temperature.max_temperature(),
            power: self.power.get_all_usage_at(now),
        }
    }

    pub fn cpu(&mut self) -> &mut CpuUsageEngine {
        &mut self.cpu
    }

    pub fn memory(&self) -> &MemoryUsageEngine {
        &self.memory
    }

    pub fn network(&mut self) -> &mut NetworkUsageEngine {
        &mut self.network
    }

    pub fn disk(&mut self) -> &mut DiskActivityEngine {
        &mut self.disk
    }

    pub fn bluetooth(&mut self) -> &mut BluetoothActivityEngine {
        &mut self.bluetooth
    }

    pub fn gpu(&mut self) -> &mut GpuUsageEngine {
        &mut self.gpu
    }

    pub fn gpu_temperature(&self) -> &GpuTemperatureEngine {
        &self.gpu_temperature
    }

    pub fn power(&mut self) -> &mut PowerFusionEngine {
        &mut self.power
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeRoot;
    use std::time::Duration;

    fn fixture() -> FakeRoot {
        let root = FakeRoot::new();
        root.write("proc/stat", "cpu  100 0 100 800 0 0 0 0 0 0\n");
        root.write(
            "proc/meminfo",
            "MemTotal: 1000 kB\nMemFree: 200 kB\nMemAvailable: 250 kB\n",
        );
        root.write(
            "proc/net/dev",
            "Inter-|   Receive\n face |bytes\n  eth0: 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0\n",
        );
        root
    }

    #[test]
    fn test_first_snapshot_calibrates() {
        let root = fixture();
        let mut monitor = Monitor::from_config(&root.config());
        let snap = monitor.snapshot_at(Instant::now());

        assert_eq!(snap.cpu_percent, 0.0);
        assert_eq!(snap.network.total_mbps, 0.0);
        assert_eq!(snap.network.interfaces.get("eth0"), Some(&0.0));
        assert_eq!(snap.memory.percent, 75.0);
        assert!(snap.disks.is_empty());
        assert!(snap.bluetooth.is_empty());
        assert_eq!(snap.gpu_temperature_c, None);
    }

    #[test]
    fn test_second_snapshot_reports_rates() {
        let root = fixture();
        let mut monitor = Monitor::from_config(&root.config());
        let t0 = Instant::now();
        monitor.snapshot_at(t0);

        root.write("proc/stat", "cpu  150 0 150 900 0 0 0 0 0 0\n");
        root.write(
            "proc/net/dev",
            "Inter-|   Receive\n face |bytes\n  eth0: 1000000 0 0 0 0 0 0 0 250000 0 0 0 0 0 0 0\n",
        );
        let snap = monitor.snapshot_at(t0 + Duration::from_secs(1));

        assert_eq!(snap.cpu_percent, 50.0);
        assert_eq!(snap.network.rx_mbps, 8.0);
        assert_eq!(snap.network.tx_mbps, 2.0);
        assert_eq!(snap.network.interfaces.get("eth0"), Some(&10.0));
    }

    #[test]
    fn test_snapshot_serializes() {
        let root = fixture();
        let mut monitor = Monitor::from_config(&root.config());
        let json = serde_json::to_value(monitor.snapshot()).unwrap();
        assert!(json["timestamp"].is_string());
        assert_eq!(json["gpu_backend"], monitor.gpu().backend());
        assert_eq!(json["power"]["source"], "none");
    }
}
