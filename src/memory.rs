//! Instantaneous RAM utilisation from `/proc/meminfo`

use crate::config::{Config, PathsConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;

/// One parsed view of `/proc/meminfo`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    /// MemTotal in kB
    pub total_kb: i64,
    /// MemAvailable in kB (derived on kernels that lack it)
    pub available_kb: i64,
    /// total - available, in kB
    pub used_kb: i64,
    /// Used percentage, 0-100
    pub percent: f64,
}

impl MemoryInfo {
    /// Build from the contents of `/proc/meminfo`
    pub fn parse(meminfo: &str) -> Self {
        let fields = parse_meminfo(meminfo);
        let get = |key: &str| fields.get(key).copied().unwrap_or(0);

        let total_kb = get("MemTotal");
        if total_kb <= 0 {
            return Self::default();
        }

        // MemAvailable appeared in 3.14
        let available_kb = match fields.get("MemAvailable") {
            Some(&available) => available,
            None => (get("MemFree") + get("Buffers") + get("Cached") + get("SReclaimable")
                - get("Shmem"))
            .max(0),
        };

        let used_kb = total_kb - available_kb;
        let percent = (used_kb as f64 / total_kb as f64 * 100.0).clamp(0.0, 100.0);

        Self {
            total_kb,
            available_kb,
            used_kb,
            percent,
        }
    }
}

fn parse_meminfo(content: &str) -> HashMap<&str, i64> {
    content
        .lines()
        .filter_map(|line| {
            let (key, rest) = line.split_once(':')?;
            let value = rest.split_whitespace().next()?.parse().ok()?;
            Some((key.trim(), value))
        })
        .collect()
}

/// Memory usage engine. Holds no delta state.
pub struct MemoryUsageEngine {
    paths: PathsConfig,
}

impl MemoryUsageEngine {
    /// Create an engine reading the live `/proc`
    pub fn new() -> Self {
        Self::from_config(&Config::default())
    }

    /// Create an engine from configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            paths: config.paths.clone(),
        }
    }

    /// RAM usage percentage, 0 when meminfo is unreadable
    pub fn get_usage(&self) -> f64 {
        self.snapshot().percent
    }

    /// Full breakdown of the current reading
    pub fn snapshot(&self) -> MemoryInfo {
        match fs::read_to_string(self.paths.proc("meminfo")) {
            Ok(content) => MemoryInfo::parse(&content),
            Err(e) => {
                log::debug!("memory: meminfo unreadable: {}", e);
                MemoryInfo::default()
            }
        }
    }
}

impl Default for MemoryUsageEngine {
    fn default() -> Self {
        Self::new()
    }
}
