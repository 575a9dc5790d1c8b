//! Backend selection.
//!
//! Maps a service name to one of its configured backends, honouring weights,
//! caller preferences and the health signal each backend carries.

mod backend;
mod service_broker;

// Re-export public API
pub use backend::{Backend, BackendState, Upstream};
pub use service_broker::{Route, ServiceBroker};
