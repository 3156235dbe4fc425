//! Fixture kernel trees for unit tests

use crate::config::{Config, PathsConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary directory standing in for `/`, with `sys`, `proc` and `dev`
/// beneath it.
pub struct FakeRoot {
    dir: TempDir,
}

impl FakeRoot {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        for sub in ["sys", "proc", "dev"] {
            fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    /// Write a file and strip all permission bits from it
    pub fn write_blocked(&self, rel: &str, content: &str) {
        use std::os::unix::fs::PermissionsExt;
        self.write(rel, content);
        fs::set_permissions(self.path(rel), fs::Permissions::from_mode(0o000)).unwrap();
    }

    pub fn mkdir(&self, rel: &str) {
        fs::create_dir_all(self.path(rel)).unwrap();
    }

    pub fn remove(&self, rel: &str) {
        let path = self.path(rel);
        if path.is_dir() {
            fs::remove_dir_all(path).unwrap();
        } else {
            fs::remove_file(path).unwrap();
        }
    }

    /// Create `link` (relative to the root) pointing at `target` verbatim
    pub fn symlink(&self, target: &str, link: &str) {
        let link = self.path(link);
        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        std::os::unix::fs::symlink(target, link).unwrap();
    }

    /// Default configuration re-rooted onto this tree
    pub fn config(&self) -> Config {
        Config {
            paths: PathsConfig {
                sys_root: self.path("sys"),
                proc_root: self.path("proc"),
                dev_root: self.path("dev"),
            },
            ..Config::default()
        }
    }
}

pub fn running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}
