//! Maximum GPU temperature from hwmon sensors
//!
//! DRM card hwmon directories are searched first. When none of them yields
//! a reading, flat `/sys/class/hwmon` chips whose name identifies a GPU
//! driver are tried instead.

use crate::config::{Config, PathsConfig};
use crate::platform::common::{
    file_name_string, list_dir_sorted, list_subdirs_sorted, read_file_f64, read_first_line,
};
use std::path::Path;

/// Driver names that mark a flat hwmon chip as a GPU
const GPU_DRIVER_KEYWORDS: &[&str] = &["amdgpu", "nouveau", "nvidia", "i915"];

/// Whether a hwmon chip `name` belongs to a GPU driver
pub fn is_gpu_hwmon_name(name: &str) -> bool {
    let name = name.to_lowercase();
    name == "xe" || GPU_DRIVER_KEYWORDS.iter().any(|k| name.contains(k))
}

/// Convert a raw `temp*_input` value to °C, rejecting out-of-range readings.
///
/// Values above 1000 are millidegrees.
pub fn normalize_temperature(raw: f64, max_c: f64) -> Option<f64> {
    let celsius = if raw > 1000.0 { raw / 1000.0 } else { raw };
    (0.0..=max_c).contains(&celsius).then_some(celsius)
}

fn is_temp_input(name: &str) -> bool {
    name.starts_with("temp") && name.ends_with("_input")
}

/// GPU temperature engine
pub struct GpuTemperatureEngine {
    paths: PathsConfig,
    max_c: f64,
}

impl GpuTemperatureEngine {
    /// Create an engine reading the live `/sys`
    pub fn new() -> Self {
        Self::from_config(&Config::default())
    }

    /// Create an engine from configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            paths: config.paths.clone(),
            max_c: config.gpu.max_temperature_c,
        }
    }

    /// Hottest GPU sensor in °C, 0 when there is none
    pub fn get_usage(&self) -> f64 {
        self.max_temperature().unwrap_or(0.0)
    }

    /// Hottest GPU sensor in °C, `None` when no sensor gave a valid reading
    pub fn max_temperature(&self) -> Option<f64> {
        self.scan_drm_hwmon().or_else(|| self.scan_named_hwmon())
    }

    fn scan_drm_hwmon(&self) -> Option<f64> {
        list_dir_sorted(self.paths.sys("class/drm"))
            .into_iter()
            .filter(|card| {
                let name = file_name_string(card);
                name.starts_with("card") && !name.contains('-')
            })
            .flat_map(|card| list_subdirs_sorted(card.join("device/hwmon")))
            .filter_map(|chip| self.chip_max(&chip))
            .reduce(f64::max)
    }

    fn scan_named_hwmon(&self) -> Option<f64> {
        list_subdirs_sorted(self.paths.sys("class/hwmon"))
            .into_iter()
            .filter(|chip| {
                read_first_line(chip.join("name"))
                    .map(|n| is_gpu_hwmon_name(&n))
                    .unwrap_or(false)
            })
            .filter_map(|chip| self.chip_max(&chip))
            .reduce(f64::max)
    }

    fn chip_max(&self, chip: &Path) -> Option<f64> {
        list_dir_sorted(chip)
            .into_iter()
            .filter(|p| p.is_file() && is_temp_input(&file_name_string(p)))
            .filter_map(|p| read_file_f64(&p).ok())
            .filter_map(|raw| normalize_temperature(raw, self.max_c))
            .reduce(f64::max)
    }
}

impl Default for GpuTemperatureEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeRoot;

    #[test]
    fn test_normalize_temperature() {
        assert_eq!(normalize_temperature(54000.0, 150.0), Some(54.0));
        assert_eq!(normalize_temperature(61.0, 150.0), Some(61.0));
        assert_eq!(normalize_temperature(200.0, 150.0), None);
        assert_eq!(normalize_temperature(-5.0, 150.0), None);
        assert_eq!(normalize_temperature(255000.0, 150.0), None);
    }

    #[test]
    fn test_gpu_hwmon_names() {
        assert!(is_gpu_hwmon_name("amdgpu"));
        assert!(is_gpu_hwmon_name("xe"));
        assert!(is_gpu_hwmon_name("i915"));
        assert!(!is_gpu_hwmon_name("k10temp"));
        assert!(!is_gpu_hwmon_name("nvme"));
    }

    #[test]
    fn test_drm_hwmon_max() {
        let root = FakeRoot::new();
        let chip = "sys/class/drm/card0/device/hwmon/hwmon4";
        root.write(&format!("{}/temp1_input", chip), "48000\n");
        root.write(&format!("{}/temp2_input", chip), "67000\n");
        root.write(&format!("{}/temp3_input", chip), "999999\n");
        root.write(&format!("{}/temp2_crit", chip), "110000\n");
        root.write("sys/class/drm/card1/device/hwmon/hwmon5/temp1_input", "52000\n");
        // Non-GPU chip with a hotter sensor is ignored
        root.write("sys/class/hwmon/hwmon0/name", "k10temp\n");
        root.write("sys/class/hwmon/hwmon0/temp1_input", "90000\n");

        let engine = GpuTemperatureEngine::from_config(&root.config());
        assert_eq!(engine.max_temperature(), Some(67.0));
    }

    #[test]
    fn test_falls_back_to_named_hwmon() {
        let root = FakeRoot::new();
        root.write("sys/class/hwmon/hwmon0/name", "k10temp\n");
        root.write("sys/class/hwmon/hwmon0/temp1_input", "90000\n");
        root.write("sys/class/hwmon/hwmon1/name", "nouveau\n");
        root.write("sys/class/hwmon/hwmon1/temp1_input", "58000\n");

        let engine = GpuTemperatureEngine::from_config(&root.config());
        assert_eq!(engine.get_usage(), 58.0);
    }

    #[test]
    fn test_no_sensor_is_none() {
        let root = FakeRoot::new();
        let engine = GpuTemperatureEngine::from_config(&root.config());
        assert_eq!(engine.max_temperature(), None);
        assert_eq!(engine.get_usage(), 0.0);
    }
}
