//! Physical disk discovery and naming
//!
//! Candidates come from two places: block devices that are currently
//! mounted (resolved through `/dev` symlinks so mapper, LUKS and LVM
//! volumes land on their `dm-*` node) and the whole-disk entries of
//! `/sys/block`. Partition names are folded onto their parent disk.

use crate::config::PathsConfig;
use crate::platform::common::{file_name_string, list_subdirs_sorted, read_first_line};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

/// A tracked physical disk and its display label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskIdentity {
    /// Kernel block device name, e.g. `nvme0n1`
    pub name: String,
    /// `"Vendor Model (name)"`, `"Vendor Model (name) #2"` on a repeated
    /// vendor/model, or the bare name when no metadata exists
    pub label: String,
}

/// Whether a `/sys/block` entry names a whole physical disk
pub fn is_physical_disk_name(name: &str) -> bool {
    if ["sd", "hd", "vd", "xvd"].iter().any(|p| name.starts_with(p)) {
        return true;
    }
    if let Some(rest) = name.strip_prefix("nvme") {
        return rest.contains('n') && !rest.contains('p');
    }
    // mmcblk0boot0 and mmcblk0rpmb are eMMC hardware partitions
    if let Some(rest) = name.strip_prefix("mmcblk") {
        return !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit());
    }
    false
}

/// Fold a partition name onto its parent disk.
///
/// `nvme0n1p3` → `nvme0n1`, `mmcblk0p1` → `mmcblk0`, `sda2` → `sda`.
/// Names outside the known families are returned unchanged.
pub fn strip_partition_suffix(name: &str) -> &str {
    if name.starts_with("nvme") || name.starts_with("mmcblk") {
        if let Some(pos) = name.rfind('p') {
            let tail = &name[pos + 1..];
            if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) {
                return &name[..pos];
            }
        }
        return name;
    }

    if ["sd", "vd", "xvd", "hd"].iter().any(|p| name.starts_with(p)) {
        let trimmed = name.trim_end_matches(|c: char| c.is_ascii_digit());
        if !trimmed.is_empty() {
            return trimmed;
        }
    }
    name
}

fn normalize(name: &str) -> String {
    if name.starts_with("dm-") {
        name.to_string()
    } else {
        strip_partition_suffix(name).to_string()
    }
}

/// NVMe namespace to controller: `nvme0n1` → `nvme0`
fn nvme_controller(disk: &str) -> Option<&str> {
    let rest = disk.strip_prefix("nvme")?;
    let pos = rest.find('n')?;
    Some(&disk[..4 + pos])
}

/// Disk discovery over the configured kernel roots
#[derive(Debug, Clone)]
pub struct DiskInventory {
    paths: PathsConfig,
}

impl DiskInventory {
    pub fn new(paths: PathsConfig) -> Self {
        Self { paths }
    }

    /// Sorted, de-duplicated physical disk names present right now
    pub fn detect(&self) -> Vec<String> {
        let mut set = BTreeSet::new();

        for source in self.mounted_sources() {
            let name = normalize(&self.resolve_source(&source));
            if name.starts_with("dm-") || is_physical_disk_name(&name) {
                set.insert(name);
            } else {
                log::trace!("disk: ignoring mount source {} ({})", source, name);
            }
        }

        for entry in list_subdirs_sorted(self.paths.sys("block")) {
            let name = file_name_string(&entry);
            if is_physical_disk_name(&name) {
                set.insert(normalize(&name));
            }
        }

        set.remove("");
        set.into_iter().collect()
    }

    fn mounted_sources(&self) -> Vec<String> {
        let content = match fs::read_to_string(self.paths.proc("self/mounts")) {
            Ok(c) => c,
            Err(e) => {
                log::debug!("disk: mount table unreadable: {}", e);
                return Vec::new();
            }
        };
        content
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .filter(|source| source.starts_with("/dev/"))
            .map(str::to_string)
            .collect()
    }

    /// Kernel name behind a `/dev/...` mount source, following symlinks
    fn resolve_source(&self, source: &str) -> String {
        if let Some(dev_path) = self.paths.dev(source) {
            if let Ok(canonical) = fs::canonicalize(&dev_path) {
                let name = file_name_string(&canonical);
                if !name.is_empty() {
                    return name;
                }
            }
        }
        file_name_string(Path::new(source))
    }

    /// Vendor/model label for one disk, without the device-name suffix
    fn base_label(&self, disk: &str) -> Option<String> {
        let block = self.paths.sys("block").join(disk);

        if disk.starts_with("dm-") {
            return read_first_line(block.join("dm/name"));
        }

        let mut vendor = read_first_line(block.join("device/vendor"));
        let mut model = read_first_line(block.join("device/model"));

        if let Some(ctrl) = nvme_controller(disk) {
            let nvme = self.paths.sys("class/nvme").join(ctrl);
            if model.is_none() {
                model = read_first_line(nvme.join("model"));
            }
            if vendor.is_none() {
                vendor = read_first_line(nvme.join("vendor"));
            }
        }

        match (vendor, model) {
            (Some(vendor), Some(model)) => {
                if model.to_lowercase().contains(&vendor.to_lowercase()) {
                    Some(model)
                } else {
                    Some(format!("{} {}", vendor, model))
                }
            }
            (None, Some(model)) => Some(model),
            (Some(vendor), None) => Some(vendor),
            (None, None) => None,
        }
    }

    /// Labels for `disks`, numbering repeated vendor/model strings
    pub fn identities(&self, disks: &[String]) -> Vec<DiskIdentity> {
        let mut seen: HashMap<String, usize> = HashMap::new();

        disks
            .iter()
            .map(|disk| {
                let label = match self.base_label(disk) {
                    Some(base) if base != *disk => {
                        let count = seen.entry(base.clone()).or_insert(0);
                        *count += 1;
                        if *count > 1 {
                            format!("{} ({}) #{}", base, disk, count)
                        } else {
                            format!("{} ({})", base, disk)
                        }
                    }
                    _ => disk.clone(),
                };
                DiskIdentity {
                    name: disk.clone(),
                    label,
                }
            })
            .collect()
    }
}
