//! Application configuration and constants.
//!
//! This module provides:
//! - Configuration constants (defaults, markers, store keys)
//! - CLI option types and parsing

mod constants;
mod types;

// Re-export all constants
pub use constants::*;
pub use types::{LogFormat, LogLevel, Opt};
