//! Configuration management for the LxMonitor engines
//!
//! This module provides TOML persistence for the kernel surface roots and
//! the tunable thresholds used by the sampling engines.

use crate::error::{LxError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// LxMonitor engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Pseudo-filesystem roots
    #[serde(default)]
    pub paths: PathsConfig,
    /// Delta-sampling options
    #[serde(default)]
    pub sampling: SamplingConfig,
    /// Network engine options
    #[serde(default)]
    pub network: NetworkConfig,
    /// Power fusion options
    #[serde(default)]
    pub power: PowerConfig,
    /// GPU probe options
    #[serde(default)]
    pub gpu: GpuConfig,
}

/// Where the kernel-exposed pseudo-filesystems are mounted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// sysfs mount point
    #[serde(default = "default_sys_root")]
    pub sys_root: PathBuf,
    /// procfs mount point
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,
    /// devtmpfs mount point, used to resolve mounted block devices
    #[serde(default = "default_dev_root")]
    pub dev_root: PathBuf,
}

/// Delta-sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Calls closer together than this return the cached result
    #[serde(default = "default_min_elapsed_ms")]
    pub min_elapsed_ms: f64,
}

/// Network engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Interface name prefixes treated as virtual and excluded
    #[serde(default = "default_virtual_prefixes")]
    pub virtual_prefixes: Vec<String>,
}

/// Power fusion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerConfig {
    /// Readings above this many watts are discarded as implausible
    #[serde(default = "default_max_source_w")]
    pub max_source_w: f64,
    /// Totals at or below this are treated as no reading
    #[serde(default = "default_noise_floor_w")]
    pub noise_floor_w: f64,
    /// Absolute part of the duplicate-sensor tolerance
    #[serde(default = "default_dedup_min_tolerance_w")]
    pub dedup_min_tolerance_w: f64,
    /// Relative part of the duplicate-sensor tolerance
    #[serde(default = "default_dedup_relative_tolerance")]
    pub dedup_relative_tolerance: f64,
}

/// GPU probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuConfig {
    /// Temperatures above this are rejected as noise
    #[serde(default = "default_max_temperature_c")]
    pub max_temperature_c: f64,
}

// Default value functions
fn default_sys_root() -> PathBuf {
    PathBuf::from("/sys")
}

fn default_proc_root() -> PathBuf {
    PathBuf::from("/proc")
}

fn default_dev_root() -> PathBuf {
    PathBuf::from("/dev")
}

fn default_min_elapsed_ms() -> f64 {
    1.0
}

fn default_virtual_prefixes() -> Vec<String> {
    [
        "lo",
        "docker",
        "veth",
        "br-",
        "virbr",
        "vmnet",
        "tun",
        "tap",
        "zt",
        "tailscale",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_source_w() -> f64 {
    3000.0
}

fn default_noise_floor_w() -> f64 {
    0.01
}

fn default_dedup_min_tolerance_w() -> f64 {
    0.35
}

fn default_dedup_relative_tolerance() -> f64 {
    0.03
}

fn default_max_temperature_c() -> f64 {
    150.0
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            sys_root: default_sys_root(),
            proc_root: default_proc_root(),
            dev_root: default_dev_root(),
        }
    }
}

impl PathsConfig {
    /// Path below the sysfs root
    pub fn sys<P: AsRef<Path>>(&self, rel: P) -> PathBuf {
        self.sys_root.join(rel)
    }

    /// Path below the procfs root
    pub fn proc<P: AsRef<Path>>(&self, rel: P) -> PathBuf {
        self.proc_root.join(rel)
    }

    /// Map an absolute `/dev/...` path onto the configured device root
    pub fn dev(&self, absolute: &str) -> Option<PathBuf> {
        absolute
            .strip_prefix("/dev/")
            .map(|rest| self.dev_root.join(rest))
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            min_elapsed_ms: default_min_elapsed_ms(),
        }
    }
}

impl SamplingConfig {
    /// Minimal interval between two computed samples.
    ///
    /// Negative values mean no minimum; values no `Duration` can hold fall
    /// back to the default.
    pub fn min_elapsed(&self) -> Duration {
        Duration::try_from_secs_f64(self.min_elapsed_ms.max(0.0) / 1000.0).unwrap_or_else(|e| {
            log::warn!(
                "sampling.min_elapsed_ms = {} unusable ({}), using default",
                self.min_elapsed_ms,
                e
            );
            Duration::from_secs_f64(default_min_elapsed_ms() / 1000.0)
        })
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            virtual_prefixes: default_virtual_prefixes(),
        }
    }
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            max_source_w: default_max_source_w(),
            noise_floor_w: default_noise_floor_w(),
            dedup_min_tolerance_w: default_dedup_min_tolerance_w(),
            dedup_relative_tolerance: default_dedup_relative_tolerance(),
        }
    }
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            max_temperature_c: default_max_temperature_c(),
        }
    }
}

impl Config {
    /// Get the default configuration directory
    ///
    /// Returns `~/.config/lxmon` on Unix-like systems.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|_| std::env::var("HOME").map(|home| PathBuf::from(home).join(".config")))
            .unwrap_or_else(|_| PathBuf::from(".config"));

        Ok(config_dir.join("lxmon"))
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_file = Self::default_path()?.join("config.toml");

        if !config_file.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&config_file)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| LxError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject thresholds that are not finite, non-negative numbers
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("sampling.min_elapsed_ms", self.sampling.min_elapsed_ms),
            ("power.max_source_w", self.power.max_source_w),
            ("power.noise_floor_w", self.power.noise_floor_w),
            ("power.dedup_min_tolerance_w", self.power.dedup_min_tolerance_w),
            ("power.dedup_relative_tolerance", self.power.dedup_relative_tolerance),
            ("gpu.max_temperature_c", self.gpu.max_temperature_c),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(LxError::Config(format!(
                    "{} must be a finite non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_dir = Self::default_path()?;
        std::fs::create_dir_all(&config_dir)?;
        self.save_to(&config_dir.join("config.toml"))
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| LxError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
