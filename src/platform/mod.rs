//! Platform read helpers

// Common utilities
pub mod common;
