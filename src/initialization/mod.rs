//! Application initialization and resource setup.
//!
//! This module provides functions to initialize process-wide resources:
//! - The logger (plain or JSON)
//! - The HTTP client used by the reqwest transport
//!
//! All initialization functions return `InitializationError` on failure.

mod client;
mod logger;

// Re-export public API
pub use client::init_client;
pub use logger::init_logger_with;
