//! Gateway assembly.
//!
//! This module provides:
//! - The JSON configuration schema (`GatewayConfig`) and its fail-fast build
//! - The built `Gateway`, which owns every registry
//! - A selection report that simulates backend and fault choices

mod config;
mod instance;
mod report;

// Re-export public API
pub use config::{
    AttenuatorConfig, BackendConfig, CircuitBreakerConfig, FailureModeConfig, GatewayConfig,
    ResponseConfig, UpstreamConfig,
};
pub use instance::Gateway;
pub use report::{Distribution, SelectionReport};
