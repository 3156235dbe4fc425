//! # LxMonitor engines (lxmon)
//!
//! Normalised Linux telemetry read straight from kernel counters: CPU busy
//! percentage, RAM usage, network and Bluetooth throughput, per-disk
//! utilisation, GPU busy percentage and temperature, and a fused
//! total-power figure reconciled from hwmon, DRM, NVMe, RAPL and
//! power_supply sensors.
//!
//! Every engine is an owned, single-threaded sampler. Construct it once,
//! then call `get_usage()` / `get_all_usage()` on your own timer. Delta
//! engines return a zero baseline on their first call and cache the last
//! good value when called again too soon or when a read fails; sampling
//! never returns an error.
//!
//! ## Quick Start
//!
//! ### CPU and network
//!
//! ```no_run
//! use lxmon::{CpuUsageEngine, NetworkUsageEngine};
//! use std::{thread, time::Duration};
//!
//! let mut cpu = CpuUsageEngine::new();
//! let mut net = NetworkUsageEngine::new();
//! cpu.get_usage();
//! net.get_usage();
//!
//! thread::sleep(Duration::from_secs(1));
//! println!("CPU {:.1}%", cpu.get_usage());
//! for (iface, mbps) in net.get_all_usage() {
//!     println!("{}: {:.2} Mbps", iface, mbps);
//! }
//! ```
//!
//! ### Power
//!
//! ```no_run
//! use lxmon::PowerFusionEngine;
//!
//! let mut power = PowerFusionEngine::new();
//! let snap = power.get_all_usage();
//! println!("total {:.1} W from {}", snap.total_w, snap.source);
//! println!("  cpu {:.1} W  gpu {:.1} W", snap.cpu_w, snap.gpu_w);
//! if !snap.blocked_sources.is_empty() {
//!     println!("  {} sensors need lxmon unlock", snap.blocked_sources.len());
//! }
//! ```
//!
//! ### Everything at once
//!
//! ```no_run
//! use lxmon::Monitor;
//!
//! let mut monitor = Monitor::new();
//! let snap = monitor.snapshot();
//! println!("{}", serde_json::to_string_pretty(&snap).unwrap());
//! ```
//!
//! ## Feature Flags
//!
//! - `nvidia` - NVIDIA GPU busy percentage via NVML
//! - `cli` - the `lxmon` command-line tool
//! - `full` - All features enabled
//!
//! ## Kernel surfaces
//!
//! | Engine | Reads |
//! |--------|-------|
//! | CPU | `/proc/stat` |
//! | Memory | `/proc/meminfo` |
//! | Network | `/proc/net/dev` |
//! | Disk | `/proc/self/mounts`, `/proc/diskstats`, `/sys/block` |
//! | Bluetooth | `/sys/class/bluetooth`, `/sys/class/rfkill` |
//! | GPU | `/sys/class/drm`, `/sys/class/hwmon`, NVML |
//! | Power | `/sys/class/{hwmon,drm,nvme,powercap,power_supply}` |
//!
//! Roots are configurable through [`config::PathsConfig`].

pub mod bluetooth; // Bluetooth adapter throughput and metadata
pub mod config; // Configuration management with TOML persistence
pub mod cpu; // Aggregate CPU busy percentage
pub mod disk; // Physical disk inventory and utilisation
pub mod error;
pub mod gpu; // GPU busy percentage and temperature
pub mod memory; // RAM utilisation
pub mod monitor; // Facade polling every engine
pub mod network; // Interface throughput
pub mod platform;
pub mod power; // Power fusion engine
#[cfg(unix)]
pub mod privilege; // sudo/pkexec helper for protected sensor paths
pub mod sampler; // Shared delta-sampling state

#[cfg(test)]
mod testutil;

// Re-export main types
pub use bluetooth::{BluetoothActivityEngine, BluetoothAdapterUsage};
pub use config::Config;
pub use cpu::CpuUsageEngine;
pub use disk::{DiskActivityEngine, DiskIdentity, DiskInventory};
pub use error::{LxError, Result};
pub use gpu::{GpuBusyEngine, GpuTemperatureEngine, GpuUsageEngine, NvidiaUsageEngine};
pub use memory::{MemoryInfo, MemoryUsageEngine};
pub use monitor::{Monitor, NetworkSnapshot, TelemetrySnapshot};
pub use network::NetworkUsageEngine;
pub use power::{PowerFusionEngine, PowerSnapshot, PowerSource, SourceClass, TotalSource};

#[cfg(unix)]
pub use privilege::{AccessResult, PrivilegeBackend};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
