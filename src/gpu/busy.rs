//! Generic GPU busy percentage from sysfs
//!
//! Drivers expose the busy figure in different places. Discovery walks a
//! fixed priority order of candidate files and caches the first one that
//! yields a number:
//!
//! 1. well-known paths (`card0`/`card1` `gpu_busy_percent`, `card0` `usage`,
//!    the amdgpu debugfs `amdgpu_pm_info`)
//! 2. `gpu_busy_percent` below any `/sys/class/hwmon/hwmon*/device`
//! 3. every DRM `cardN` in index order, `gpu_busy_percent` then `usage`
//!
//! When the cached file stops being readable (driver reload, hot-unplug)
//! discovery runs once more before the engine reports 0.

use crate::config::{Config, PathsConfig};
use crate::platform::common::{file_name_string, list_dir_sorted, parse_leading_number};
use crate::sampler::clamp_percent;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Fixed,
    Hwmon,
    Drm,
    Done,
}

/// Lazy sequence of busy-percent candidate files, in priority order.
///
/// Each stage scans its directory only when the previous stage is
/// exhausted. Build a new one to restart discovery.
pub struct CandidatePaths {
    paths: PathsConfig,
    stage: Stage,
    pending: VecDeque<PathBuf>,
}

impl CandidatePaths {
    pub fn new(paths: PathsConfig) -> Self {
        Self {
            paths,
            stage: Stage::Fixed,
            pending: VecDeque::new(),
        }
    }

    fn fill(&mut self) {
        let drm = self.paths.sys("class/drm");
        match self.stage {
            Stage::Fixed => {
                self.pending.extend([
                    drm.join("card0/device/gpu_busy_percent"),
                    drm.join("card1/device/gpu_busy_percent"),
                    drm.join("card0/device/usage"),
                    self.paths.sys("kernel/debug/dri/0/amdgpu_pm_info"),
                ]);
                self.stage = Stage::Hwmon;
            }
            Stage::Hwmon => {
                self.pending.extend(
                    list_dir_sorted(self.paths.sys("class/hwmon"))
                        .into_iter()
                        .filter(|p| file_name_string(p).starts_with("hwmon"))
                        .map(|p| p.join("device/gpu_busy_percent")),
                );
                self.stage = Stage::Drm;
            }
            Stage::Drm => {
                let mut cards: Vec<(u32, PathBuf)> = list_dir_sorted(&drm)
                    .into_iter()
                    .filter_map(|p| {
                        let index = file_name_string(&p).strip_prefix("card")?.parse().ok()?;
                        Some((index, p))
                    })
                    .collect();
                cards.sort_by_key(|(index, _)| *index);
                for (_, card) in cards {
                    self.pending.push_back(card.join("device/gpu_busy_percent"));
                    self.pending.push_back(card.join("device/usage"));
                }
                self.stage = Stage::Done;
            }
            Stage::Done => {}
        }
    }
}

impl Iterator for CandidatePaths {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            if let Some(path) = self.pending.pop_front() {
                return Some(path);
            }
            if self.stage == Stage::Done {
                return None;
            }
            self.fill();
        }
    }
}

/// Read a busy percentage from one candidate file
pub fn read_busy_percent(path: &Path) -> Option<f64> {
    let content = fs::read_to_string(path).ok()?;
    let line = if file_name_string(path) == "amdgpu_pm_info" {
        content.lines().find(|l| l.contains("GPU Load"))?
    } else {
        content.lines().next()?
    };
    parse_leading_number(line).map(clamp_percent)
}

/// GPU busy engine for drivers without a vendor library
pub struct GpuBusyEngine {
    paths: PathsConfig,
    cached: Option<PathBuf>,
}

impl GpuBusyEngine {
    /// Create an engine reading the live `/sys`
    pub fn new() -> Self {
        Self::from_config(&Config::default())
    }

    /// Create an engine from configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            paths: config.paths.clone(),
            cached: None,
        }
    }

    /// Busy percentage, 0 when no source is readable
    pub fn get_usage(&mut self) -> f64 {
        self.busy_percent().unwrap_or(0.0)
    }

    /// Busy percentage, `None` when no source is readable
    pub fn busy_percent(&mut self) -> Option<f64> {
        if let Some(path) = &self.cached {
            if let Some(value) = read_busy_percent(path) {
                return Some(value);
            }
            log::debug!("gpu: {} stopped responding, rediscovering", path.display());
            self.cached = None;
        }
        self.discover()
    }

    /// File currently used as the busy source
    pub fn source_path(&self) -> Option<&Path> {
        self.cached.as_deref()
    }

    fn discover(&mut self) -> Option<f64> {
        for candidate in CandidatePaths::new(self.paths.clone()) {
            if let Some(value) = read_busy_percent(&candidate) {
                log::debug!("gpu: busy source {}", candidate.display());
                self.cached = Some(candidate);
                return Some(value);
            }
        }
        None
    }
}

impl Default for GpuBusyEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeRoot;

    #[test]
    fn test_candidate_order() {
        let root = FakeRoot::new();
        root.mkdir("sys/class/hwmon/hwmon3");
        root.mkdir("sys/class/drm/card10");
        root.mkdir("sys/class/drm/card2");
        root.mkdir("sys/class/drm/card2-DP-1");
        root.mkdir("sys/class/drm/renderD128");

        let sys = root.path("sys");
        let candidates: Vec<PathBuf> = CandidatePaths::new(root.config().paths).collect();
        let rel: Vec<String> = candidates
            .iter()
            .map(|p| p.strip_prefix(&sys).unwrap().display().to_string())
            .collect();
        assert_eq!(
            rel,
            vec![
                "class/drm/card0/device/gpu_busy_percent",
                "class/drm/card1/device/gpu_busy_percent",
                "class/drm/card0/device/usage",
                "kernel/debug/dri/0/amdgpu_pm_info",
                "class/hwmon/hwmon3/device/gpu_busy_percent",
                "class/drm/card2/device/gpu_busy_percent",
                "class/drm/card2/device/usage",
                "class/drm/card10/device/gpu_busy_percent",
                "class/drm/card10/device/usage",
            ]
        );
    }

    #[test]
    fn test_pm_info_parsing() {
        let root = FakeRoot::new();
        root.write(
            "sys/kernel/debug/dri/0/amdgpu_pm_info",
            "GFX Clocks and Power:\n\t1800 MHz (SCLK)\n\nGPU Temperature: 51 C\nGPU Load: 37 %\n",
        );
        let mut engine = GpuBusyEngine::from_config(&root.config());
        assert_eq!(engine.get_usage(), 37.0);
    }

    #[test]
    fn test_value_is_clamped() {
        let root = FakeRoot::new();
        root.write("sys/class/drm/card0/device/gpu_busy_percent", "140\n");
        assert_eq!(GpuBusyEngine::from_config(&root.config()).get_usage(), 100.0);
    }

    #[test]
    fn test_skips_unparsable_candidates() {
        let root = FakeRoot::new();
        root.write("sys/class/drm/card0/device/gpu_busy_percent", "n/a\n");
        root.write("sys/class/hwmon/hwmon0/device/gpu_busy_percent", "12\n");
        let mut engine = GpuBusyEngine::from_config(&root.config());
        assert_eq!(engine.busy_percent(), Some(12.0));
        assert!(engine.source_path().unwrap().ends_with("hwmon0/device/gpu_busy_percent"));
    }

    #[test]
    fn test_rediscovers_after_source_vanishes() {
        let root = FakeRoot::new();
        root.write("sys/class/drm/card0/device/gpu_busy_percent", "20\n");
        let mut engine = GpuBusyEngine::from_config(&root.config());
        assert_eq!(engine.get_usage(), 20.0);

        root.remove("sys/class/drm/card0");
        root.write("sys/class/drm/card3/device/usage", "65\n");
        assert_eq!(engine.get_usage(), 65.0);
        assert!(engine.source_path().unwrap().ends_with("card3/device/usage"));

        root.remove("sys/class/drm/card3");
        assert_eq!(engine.busy_percent(), None);
        assert_eq!(engine.get_usage(), 0.0);
    }
}
