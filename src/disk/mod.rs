//! Disk Monitoring Module
//!
//! Physical disk discovery and busy-time utilisation:
//! - [`inventory`]: mounted and `/sys/block` disks, partition folding, labels
//! - [`activity`]: per-disk utilisation from `/proc/diskstats`

pub mod activity;
pub mod inventory;

pub use activity::{DiskActivityEngine, DiskCounters};
pub use inventory::{DiskIdentity, DiskInventory};
