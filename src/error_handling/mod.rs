//! Error handling.
//!
//! This module provides:
//! - The error taxonomy of the attenuation core (`AttenuatorError`)
//! - Transport failures (`TransportError`) and startup failures (`InitializationError`)
//! - Error classification into transient and terminal classes (`ErrorClassifier`)

mod categorization;
mod types;

// Re-export public API
pub use categorization::{ErrorClassifier, ERROR_CLASS_CONNRESET, ERROR_CLASS_DNS};
pub use types::{AttenuatorError, InitializationError, TransportError};
