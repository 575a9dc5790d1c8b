//! Configuration constants.
//!
//! Defaults used when the gateway configuration leaves a value out, plus the
//! fixed names and markers shared between components.

use std::time::Duration;

/// Default number of permits an attenuator lets through concurrently.
pub const DEFAULT_ATTENUATOR_QUEUE_SIZE: usize = 10;

/// Default circuit-breaker retry budget (total attempts, including the first).
pub const DEFAULT_CIRCUIT_BREAKER_RETRIES: u32 = 3;
/// Default per-attempt timeout for outbound calls, in milliseconds.
pub const DEFAULT_CIRCUIT_BREAKER_TIMEOUT_MILLIS: u64 = 10_000;

/// The traffic light every registry starts with: no pulse, always green.
pub const DEFAULT_TRAFFIC_LIGHT: &str = "";

/// Body marker an upstream uses to ask for a retry: `{"error": "please retry"}`.
pub const PLEASE_RETRY_MARKER: &str = "please retry";

/// Prefix of the shared list key behind a distributed pulse.
pub const DISTRIBUTED_PULSE_KEY_PREFIX: &str = "attenuator:pulse:";

/// How long a single blocking pop waits on the shared store before re-polling.
///
/// Keeps a dropped waiter from holding a server-side pop open indefinitely.
pub const STORE_POP_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on the pause a shared-store failure imposes on a distributed emitter.
pub const STORE_ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Default number of draws in the startup selection report.
pub const DEFAULT_REPORT_DRAWS: usize = 10_000;

/// Status a fault server returns for a `timeout` failure mode, after the hang.
pub const TIMEOUT_FAILURE_STATUS: u16 = 504;

/// Stand-in deadline for delays too long to add to the current instant (about 30 years).
pub const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Dedicated connections kept open for blocking pops on a Redis store.
pub const STORE_POP_POOL_SIZE: usize = 4;
