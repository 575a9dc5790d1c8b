//! http_attenuator library: the request-shaping core of an API gateway
//!
//! This library provides rate pulses (in-process or on a shared store), traffic
//! lights and attenuators built on them, weighted backend and fault selection,
//! and a circuit breaker that retries transient failures with backoff.
//!
//! # Example
//!
//! ```no_run
//! use http_attenuator::GatewayConfig;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::from_json_str(r#"{
//!     "attenuators": { "search": { "max_hertz": 5.0, "max_inflight": 10 } },
//!     "upstreams": { "search": { "rule": "weighted", "backends": {
//!         "primary": { "url": "https://primary.internal", "weight": 9 },
//!         "canary":  { "url": "https://canary.internal",  "weight": 1 } } } }
//! }"#)?;
//! let gateway = config.build()?;
//!
//! if let Some(attenuator) = gateway.attenuator("search") {
//!     attenuator.wait_for_green(Duration::from_secs(2)).await?;
//! }
//! if let Some(route) = gateway.broker().route("/search/v1/query?q=rust") {
//!     println!("forwarding to {}", route.target);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. Pulse emitters are tokio tasks spawned
//! when a gateway (or a pulse) is built.

#![warn(missing_docs)]

pub mod attenuator;
pub mod broker;
pub mod circuit_breaker;
pub mod config;
pub mod duration;
pub mod error_handling;
pub mod gateway;
pub mod initialization;
pub mod metrics;
pub mod pathology;
pub mod pulse;
pub mod selection;
pub mod traffic_light;

// Re-export public API
pub use attenuator::Attenuator;
pub use broker::{Backend, BackendState, ServiceBroker, Upstream};
pub use circuit_breaker::{CallOutcome, CircuitBreaker, CircuitBreakerBuilder, HttpTransport};
pub use config::{LogFormat, LogLevel, Opt};
pub use duration::DurationSpec;
pub use error_handling::{AttenuatorError, InitializationError, TransportError};
pub use gateway::{Gateway, GatewayConfig, SelectionReport};
pub use metrics::{CounterSink, GatewayEvent, MetricsSink};
pub use pathology::{FailureMode, FaultPlan, PathologyRegistry};
pub use pulse::{Pulse, PulseRegistry};
pub use selection::{SelectionRule, WeightedSet};
pub use traffic_light::{TrafficLight, TrafficLightRegistry};
