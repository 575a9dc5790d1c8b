//! Circuit breaker for outbound calls.
//!
//! This module provides:
//! - A pluggable transport (`HttpTransport`) and its reqwest implementation
//! - Success predicates, including the "please retry" body convention
//! - The retrying breaker itself (`CircuitBreaker`, built with `CircuitBreakerBuilder`)

mod breaker;
mod success;
mod transport;

// Re-export public API
pub use breaker::{CallOutcome, CircuitBreaker, CircuitBreakerBuilder};
pub use success::{asks_for_retry, status_predicate, SuccessPredicate};
pub use transport::{Headers, HttpTransport, ReqwestTransport, TransportResponse};
