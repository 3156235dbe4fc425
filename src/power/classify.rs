//! Functional classification of power source names
//!
//! Source names carry their family prefix and the chip, card or zone they
//! were read from (`hwmon:amdgpu:PPT`, `gpu:card0:0000:03:00.0:power1`,
//! `rapl:package-0`). Everything the fusion engine infers from a name lives
//! here: the functional class used for the domain sub-totals, the entity
//! qualifier used to tell two GPUs or two RAPL zones apart, and the score
//! that decides which of two duplicate readings survives.

use super::PowerSource;
use crate::config::PowerConfig;
use serde::{Deserialize, Serialize};

/// Functional domain of a power source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceClass {
    Cpu,
    Gpu,
    Disk,
    Net,
    Memory,
    Board,
    Other,
    /// Battery rails: net system draw, not a component
    Unknown,
}

struct Rule {
    class: SourceClass,
    prefixes: &'static [&'static str],
    substrings: &'static [&'static str],
    tokens: &'static [&'static str],
}

/// Evaluated top to bottom; the first match wins
const RULES: &[Rule] = &[
    Rule {
        class: SourceClass::Gpu,
        prefixes: &["gpu:"],
        substrings: &["amdgpu", "radeon", "nvidia", "nouveau", "vddgfx", "gfx", "drm"],
        tokens: &["xe", "i915", "ppt"],
    },
    Rule {
        class: SourceClass::Cpu,
        prefixes: &["rapl:"],
        substrings: &[
            "cpu", "package", "coretemp", "k10temp", "vddcr_cpu", "vcore", "tctl", "tdie",
        ],
        tokens: &["core"],
    },
    Rule {
        class: SourceClass::Disk,
        prefixes: &["disk:"],
        substrings: &["nvme", "ssd", "hdd", "sata", "wdc", "seagate", "sandisk"],
        tokens: &["ata"],
    },
    Rule {
        class: SourceClass::Net,
        prefixes: &["net:"],
        substrings: &[
            "ethernet", "wifi", "wlan", "iwlwifi", "r816", "rtl", "ath9k", "ath10k", "ath11k",
            "ath12k",
        ],
        tokens: &["ath", "net"],
    },
    Rule {
        class: SourceClass::Memory,
        prefixes: &[],
        substrings: &["dram", "memory", "ddr"],
        tokens: &[],
    },
    Rule {
        class: SourceClass::Board,
        prefixes: &["supply:"],
        substrings: &[
            "pch", "soc", "board", "chipset", "vrm", "motherboard", "vddcr_soc", "aux", "3v",
            "5v", "12v",
        ],
        tokens: &[],
    },
];

const GPU_DRIVERS: &[&str] = &["amdgpu", "nvidia", "nouveau", "i915", "radeon"];

fn tokens(low: &str) -> impl Iterator<Item = &str> {
    low.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
}

impl Rule {
    fn matches(&self, low: &str) -> bool {
        self.prefixes.iter().any(|p| low.starts_with(p))
            || self.substrings.iter().any(|s| low.contains(s))
            || tokens(low).any(|t| self.tokens.contains(&t))
    }
}

/// Classify a source name into exactly one domain
pub fn classify(name: &str) -> SourceClass {
    let low = name.to_lowercase();
    if low.starts_with("battery:") {
        return SourceClass::Unknown;
    }
    RULES
        .iter()
        .find(|rule| rule.matches(&low))
        .map(|rule| rule.class)
        .unwrap_or(SourceClass::Other)
}

/// Which physical device a source belongs to, as far as the name tells
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entity {
    /// DRM card index (`card0` → `0`)
    pub card: Option<String>,
    /// GPU driver named in the source
    pub driver: Option<String>,
    /// RAPL zone name
    pub domain: Option<String>,
}

impl Entity {
    /// Parse the qualifiers present in `name`
    pub fn from_name(name: &str) -> Self {
        let low = name.to_lowercase();

        let card = low.find("card").and_then(|pos| {
            let digits: String = low[pos + 4..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            (!digits.is_empty()).then_some(digits)
        });

        let driver = GPU_DRIVERS
            .iter()
            .find(|d| low.contains(*d))
            .map(|d| d.to_string())
            .or_else(|| tokens(&low).any(|t| t == "xe").then(|| "xe".to_string()));

        let domain = low
            .strip_prefix("rapl:")
            .filter(|rest| !rest.is_empty())
            .map(str::to_string);

        Self {
            card,
            driver,
            domain,
        }
    }

    /// Two entities may be the same device unless a qualifier known on both
    /// sides differs.
    pub fn compatible(&self, other: &Entity) -> bool {
        fn agree(a: &Option<String>, b: &Option<String>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
        }
        agree(&self.card, &other.card)
            && agree(&self.driver, &other.driver)
            && agree(&self.domain, &other.domain)
    }
}

/// Everything inferred from one source name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMeta {
    pub class: SourceClass,
    pub entity: Entity,
    /// Base priority within the class
    pub priority: i32,
}

impl SourceMeta {
    pub fn from_name(name: &str) -> Self {
        let class = classify(name);
        let priority = match class {
            SourceClass::Gpu if name.starts_with("hwmon:") => 30,
            SourceClass::Gpu if name.starts_with("gpu:") => 20,
            SourceClass::Cpu if name.starts_with("rapl:") => 30,
            SourceClass::Cpu if name.starts_with("hwmon:") => 20,
            SourceClass::Gpu | SourceClass::Cpu => 10,
            _ => 0,
        };
        Self {
            class,
            entity: Entity::from_name(name),
            priority,
        }
    }
}

/// Score deciding which of two duplicate sources is kept; higher wins
pub fn dedup_score(name: &str) -> i32 {
    let mut score = SourceMeta::from_name(name).priority;
    if name.starts_with("hwmon:") {
        score += 3;
    }
    if name.starts_with("rapl:") {
        score += 3;
    }
    if name.starts_with("gpu:") {
        score += 1;
    }
    if name.starts_with("supply:") {
        score -= 1;
    }
    score
}

/// Whether two sources are the same physical rail exposed twice.
///
/// Only CPU and GPU sources are considered.
pub fn likely_duplicate(a: &PowerSource, b: &PowerSource, config: &PowerConfig) -> bool {
    let ma = SourceMeta::from_name(&a.name);
    let mb = SourceMeta::from_name(&b.name);
    if !matches!(ma.class, SourceClass::Cpu | SourceClass::Gpu) || ma.class != mb.class {
        return false;
    }
    if !ma.entity.compatible(&mb.entity) {
        return false;
    }

    let larger = a.watts.abs().max(b.watts.abs());
    let tolerance = config
        .dedup_min_tolerance_w
        .max(larger * config.dedup_relative_tolerance);
    (a.watts - b.watts).abs() <= tolerance
}
