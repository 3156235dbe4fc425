//! Error types for the LxMonitor engines

use std::io;
use thiserror::Error;

/// Result type alias for lxmon operations
pub type Result<T> = std::result::Result<T, LxError>;

/// Error type shared by readers, configuration and the NVML backend.
///
/// Sampling entry points (`get_usage`, `get_all_usage`) never return these;
/// they fold failures into last-good values. Errors surface only from
/// configuration, [`NvidiaUsageEngine::try_new`](crate::NvidiaUsageEngine)
/// and the CLI.
#[derive(Error, Debug)]
pub enum LxError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// NVML error
    #[cfg(all(feature = "nvidia", target_os = "linux"))]
    #[error("NVML error: {0}")]
    Nvml(#[from] nvml_wrapper::error::NvmlError),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Command failed
    #[error("Command failed: {0}")]
    CommandFailed(String),
}
