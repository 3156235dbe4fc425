//! Common platform utilities
//!
//! Kernel pseudo-files are tiny, non-blocking and may vanish between a
//! directory scan and the read that follows it, so every reader here is
//! best-effort. [`Probe`] keeps the distinction between "absent",
//! "present but unreadable" and "unparsable" that the power engine needs
//! for blocked-source reporting.

use crate::error::{LxError, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Read file contents as string, trimming whitespace
pub fn read_file_string<P: AsRef<Path>>(path: P) -> Result<String> {
    Ok(fs::read_to_string(path)?.trim().to_string())
}

/// Read file and parse as u64
pub fn read_file_u64<P: AsRef<Path>>(path: P) -> Result<u64> {
    parse_trimmed(&read_file_string(path)?)
}

/// Read file and parse as f64
pub fn read_file_f64<P: AsRef<Path>>(path: P) -> Result<f64> {
    parse_trimmed(&read_file_string(path)?)
}

fn parse_trimmed<T>(content: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    // Some drivers append a unit or a second column; the first token is the value.
    let token = content.split_whitespace().next().unwrap_or("");
    token
        .parse()
        .map_err(|e| LxError::Parse(format!("Failed to parse {:?}: {}", token, e)))
}

/// Read the first line of a text attribute, with control whitespace
/// collapsed to single spaces. Empty results map to `None`.
pub fn read_first_line<P: AsRef<Path>>(path: P) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let line = content.lines().next()?;
    let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Outcome of reading a single numeric sensor attribute
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Probe<T> {
    /// Path does not exist (or vanished mid-scan)
    Missing,
    /// Path exists but read permission was denied
    Blocked,
    /// File was read but did not hold a number
    Malformed,
    /// Parsed value
    Value(T),
}

impl<T> Probe<T> {
    /// The parsed value, if any
    pub fn value(self) -> Option<T> {
        match self {
            Probe::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Whether the attribute exists but is permission-blocked
    pub fn is_blocked(&self) -> bool {
        matches!(self, Probe::Blocked)
    }
}

/// Read and parse a numeric attribute, classifying any failure
pub fn probe<T, P>(path: P) -> Probe<T>
where
    P: AsRef<Path>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match fs::read_to_string(path.as_ref()) {
        Ok(content) => match parse_trimmed(content.trim()) {
            Ok(v) => Probe::Value(v),
            Err(e) => {
                log::trace!("{}: {}", path.as_ref().display(), e);
                Probe::Malformed
            }
        },
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Probe::Blocked,
        Err(_) => Probe::Missing,
    }
}

/// Check if file/directory exists
pub fn path_exists<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref().exists()
}

/// Check if the calling process may read the file
pub fn is_readable<P: AsRef<Path>>(path: P) -> bool {
    #[cfg(unix)]
    {
        use nix::unistd::{access, AccessFlags};
        access(path.as_ref(), AccessFlags::R_OK).is_ok()
    }

    #[cfg(not(unix))]
    {
        path.as_ref().exists()
    }
}

/// Whether the path exists but cannot be read
pub fn is_blocked<P: AsRef<Path>>(path: P) -> bool {
    path_exists(&path) && !is_readable(&path)
}

/// List the entries of a directory, sorted by file name.
///
/// Missing or unreadable directories yield an empty list.
pub fn list_dir_sorted<P: AsRef<Path>>(path: P) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = match fs::read_dir(path) {
        Ok(rd) => rd.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => return Vec::new(),
    };
    entries.sort();
    entries
}

/// Sorted sub-directories of a directory (symlinks to directories included)
pub fn list_subdirs_sorted<P: AsRef<Path>>(path: P) -> Vec<PathBuf> {
    list_dir_sorted(path)
        .into_iter()
        .filter(|p| p.is_dir())
        .collect()
}

/// Final path component as an owned string
pub fn file_name_string(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Look up `KEY=value` in a uevent-style file
pub fn uevent_value<P: AsRef<Path>>(path: P, key: &str) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    content.lines().find_map(|line| {
        line.strip_prefix(key)
            .and_then(|rest| rest.strip_prefix('='))
            .map(|v| v.trim().to_string())
    })
}

/// Parse the first number embedded in a line such as `"42 %"` or `"GPU Load: 7 %"`
pub fn parse_leading_number(line: &str) -> Option<f64> {
    let start = line.find(|c: char| c.is_ascii_digit() || c == '-' || c == '.')?;
    let number: String = line[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    number.parse().ok()
}
