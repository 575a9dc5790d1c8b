//! Rate pulses.
//!
//! A pulse emits "go" permits at a steady rate (hertz) and caps how many callers
//! may wait on it at once. Two implementations share one trait:
//!
//! - [`LocalPulse`]: a tokio emitter task feeding a bounded channel
//! - [`DistributedPulse`]: an emitter that keeps at most one token on a shared list,
//!   consumed by a blocking pop from every process in the fleet
//!
//! A rate of zero (or less) means "unlimited". Pulses cannot express that and
//! reject it at construction; callers represent it by attaching no pulse at all.

mod cadence;
mod distributed;
mod local;
#[cfg(feature = "redis-backend")]
mod pool;
mod registry;
mod store;

use std::fmt;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use crate::error_handling::AttenuatorError;

// Re-export public API
pub use distributed::DistributedPulse;
pub use local::LocalPulse;
pub use registry::PulseRegistry;
#[cfg(feature = "redis-backend")]
pub use store::RedisStore;
pub use store::{InMemoryStore, SharedStore};

/// A source of rate-limited permits.
#[async_trait]
pub trait Pulse: Send + Sync {
    /// Waits for an inflight slot and then for the next permit.
    ///
    /// Has no timeout of its own. Dropping the returned future abandons the wait
    /// and releases the slot.
    async fn wait_for_next(&self) -> Result<(), AttenuatorError>;

    /// Holds the next emission back for `duration`.
    fn set_pause_for_duration(&self, duration: Duration);

    /// Holds the next emission back until a wall-clock instant.
    fn set_pause_until(&self, wallclock: SystemTime);

    /// Registered name.
    fn name(&self) -> &str;

    /// Target emission rate.
    fn max_hertz(&self) -> f64;

    /// Concurrent waiter ceiling.
    fn max_inflight(&self) -> usize;

    /// Stops the emitter. Pending and future waits fail with `PulseStopped`.
    fn shutdown(&self);
}

/// Checks pulse parameters and returns the emission period.
///
/// A rate so small that its period does not fit in a `Duration` is an invalid rate.
pub(crate) fn validate(
    name: &str,
    max_inflight: usize,
    max_hertz: f64,
) -> Result<Duration, AttenuatorError> {
    if max_inflight == 0 {
        return Err(AttenuatorError::InvalidMaxInflight {
            name: name.to_string(),
            max_inflight,
        });
    }
    let invalid_rate = || AttenuatorError::InvalidRate {
        name: name.to_string(),
        hertz: max_hertz,
    };
    if !max_hertz.is_finite() || max_hertz <= 0.0 {
        return Err(invalid_rate());
    }
    Duration::try_from_secs_f64(1.0 / max_hertz).map_err(|_| invalid_rate())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_returns_period() {
        assert_eq!(validate("p", 1, 4.0).unwrap(), Duration::from_millis(250));
        assert_eq!(validate("p", 1, 0.5).unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn test_validate_rejects_rates_without_a_period() {
        for hertz in [1e-20, f64::MIN_POSITIVE, 5e-324] {
            let err = validate("trickle", 1, hertz).unwrap_err();
            assert!(
                matches!(err, AttenuatorError::InvalidRate { ref name, .. } if name == "trickle"),
                "{} Hz should be rejected",
                hertz
            );
        }
    }

    #[test]
    fn test_validate_checks_inflight_first() {
        let err = validate("p", 0, 1e-20).unwrap_err();
        assert!(matches!(err, AttenuatorError::InvalidMaxInflight { .. }));
    }
}

impl fmt::Debug for dyn Pulse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pulse").field("name", &self.name()).finish()
    }
}
