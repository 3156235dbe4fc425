//! GPU busy and temperature probing
//!
//! - [`nvidia`]: NVML utilisation (feature `nvidia`)
//! - [`busy`]: generic sysfs busy percentage for the other drivers
//! - [`temperature`]: hottest GPU hwmon sensor
//!
//! [`GpuUsageEngine`] picks the driver-specific engine when it is usable and
//! falls back to the generic one otherwise.
//!
//! # Examples
//!
//! ```no_run
//! use lxmon::gpu::{GpuTemperatureEngine, GpuUsageEngine};
//!
//! let mut gpu = GpuUsageEngine::new();
//! let temp = GpuTemperatureEngine::new();
//! println!("GPU {:.0}% ({})", gpu.get_usage(), gpu.backend());
//! match temp.max_temperature() {
//!     Some(c) => println!("  {:.1}°C", c),
//!     None => println!("  no temperature sensor"),
//! }
//! ```

pub mod busy;
pub mod nvidia;
pub mod temperature;

pub use busy::GpuBusyEngine;
pub use nvidia::NvidiaUsageEngine;
pub use temperature::GpuTemperatureEngine;

use crate::config::Config;

/// GPU busy engine selecting NVML or sysfs at construction
pub enum GpuUsageEngine {
    Nvidia(NvidiaUsageEngine),
    Generic(GpuBusyEngine),
}

impl GpuUsageEngine {
    pub fn new() -> Self {
        Self::from_config(&Config::default())
    }

    pub fn from_config(config: &Config) -> Self {
        let nvidia = NvidiaUsageEngine::new();
        if nvidia.is_available() {
            GpuUsageEngine::Nvidia(nvidia)
        } else {
            GpuUsageEngine::Generic(GpuBusyEngine::from_config(config))
        }
    }

    /// Busy percentage, 0 when no source responds
    pub fn get_usage(&mut self) -> f64 {
        match self {
            GpuUsageEngine::Nvidia(engine) => engine.get_usage(),
            GpuUsageEngine::Generic(engine) => engine.get_usage(),
        }
    }

    /// `"nvml"` or `"sysfs"`
    pub fn backend(&self) -> &'static str {
        match self {
            GpuUsageEngine::Nvidia(_) => "nvml",
            GpuUsageEngine::Generic(_) => "sysfs",
        }
    }
}

impl Default for GpuUsageEngine {
    fn default() -> Self {
        Self::new()
    }
}
