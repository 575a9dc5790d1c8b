//! Attenuators.
//!
//! An attenuator is the per-flow handle callers actually wait on. It wraps the
//! flow's pulse with a deadline and a cancellation token; the pulse layer itself
//! has neither.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error_handling::AttenuatorError;
use crate::metrics::{GatewayEvent, MetricsSink};
use crate::pulse::{Pulse, PulseRegistry};
use crate::traffic_light::TrafficLight;

/// Cancellable, deadline-aware access to one flow's pulse.
pub struct Attenuator {
    name: String,
    max_hertz: f64,
    max_inflight: usize,
    pulse: Option<Arc<dyn Pulse>>,
    sink: Arc<dyn MetricsSink>,
}

impl Attenuator {
    /// Creates an attenuator for flow `name`.
    ///
    /// A rate of zero or less means unlimited: no pulse is attached and every
    /// wait returns at once. Otherwise the pulse registered under `name` is
    /// reused, or a local one is created.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMaxInflight` if `max_inflight` is zero (checked before any
    /// pulse is touched) and `InvalidRate` for a non-finite rate.
    pub fn new(
        name: &str,
        max_hertz: f64,
        max_inflight: usize,
        pulses: &PulseRegistry,
        sink: Arc<dyn MetricsSink>,
    ) -> Result<Self, AttenuatorError> {
        if max_inflight == 0 {
            return Err(AttenuatorError::InvalidMaxInflight {
                name: name.to_string(),
                max_inflight,
            });
        }

        if max_hertz.is_nan() || max_hertz == f64::INFINITY {
            return Err(AttenuatorError::InvalidRate {
                name: name.to_string(),
                hertz: max_hertz,
            });
        }
        if max_hertz <= 0.0 {
            log::debug!("Attenuator '{}' has no rate limit", name);
            return Ok(Attenuator {
                name: name.to_string(),
                max_hertz,
                max_inflight,
                pulse: None,
                sink,
            });
        }

        let pulse = pulses.get_or_create_local(name, max_inflight, max_hertz)?;
        // a reused pulse keeps its own settings
        if pulse.max_hertz() != max_hertz || pulse.max_inflight() != max_inflight {
            log::warn!(
                "Attenuator '{}' asked for {:.2}Hz, {} max but shares pulse '{}' ({:.2}Hz, {} max)",
                name,
                max_hertz,
                max_inflight,
                pulse.name(),
                pulse.max_hertz(),
                pulse.max_inflight()
            );
        }
        Ok(Attenuator {
            name: name.to_string(),
            max_hertz: pulse.max_hertz(),
            max_inflight: pulse.max_inflight(),
            pulse: Some(pulse),
            sink,
        })
    }

    /// Wraps an existing pulse, e.g. a distributed one.
    pub fn with_pulse(pulse: Arc<dyn Pulse>, sink: Arc<dyn MetricsSink>) -> Self {
        Attenuator {
            name: pulse.name().to_string(),
            max_hertz: pulse.max_hertz(),
            max_inflight: pulse.max_inflight(),
            pulse: Some(pulse),
            sink,
        }
    }

    /// Flow name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rate the flow runs at (the attached pulse's); zero or less means unlimited.
    pub fn max_hertz(&self) -> f64 {
        self.max_hertz
    }

    /// Inflight ceiling the flow runs with (the attached pulse's, if any).
    pub fn max_inflight(&self) -> usize {
        self.max_inflight
    }

    /// The attached pulse, if any.
    pub fn pulse(&self) -> Option<&Arc<dyn Pulse>> {
        self.pulse.as_ref()
    }

    /// A traffic light bound to the same pulse.
    pub fn traffic_light(&self) -> TrafficLight {
        TrafficLight::new(self.name.clone(), self.pulse.clone())
    }

    /// Waits for permission, giving up after `timeout`.
    pub async fn wait_for_green(&self, timeout: Duration) -> Result<(), AttenuatorError> {
        self.wait_for_green_with_cancel(&CancellationToken::new(), Some(timeout))
            .await
    }

    /// Waits for permission until it is granted, `cancel` fires, or `timeout` expires.
    ///
    /// On cancellation or timeout the pending pulse wait is dropped, which releases
    /// its inflight slot; nothing is left running in the background.
    pub async fn wait_for_green_with_cancel(
        &self,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<(), AttenuatorError> {
        let Some(pulse) = &self.pulse else {
            return Ok(());
        };

        let start = Instant::now();
        let deadline = async {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let result = tokio::select! {
            granted = pulse.wait_for_next() => granted,
            _ = cancel.cancelled() => {
                self.sink.record(GatewayEvent::WaitCancelled, &self.name);
                Err(AttenuatorError::WaitCancelled { name: self.name.clone() })
            }
            _ = deadline => {
                let waited = start.elapsed();
                log::warn!("{}.wait_for_green(): timeout after {:?}", self.name, waited);
                self.sink.record(GatewayEvent::WaitTimeout, &self.name);
                Err(AttenuatorError::WaitTimeout { name: self.name.clone(), waited })
            }
        };

        self.sink.record_wait(&self.name, start.elapsed());
        result
    }
}

impl fmt::Display for Attenuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:.2}Hz, {} max)",
            self.name, self.max_hertz, self.max_inflight
        )
    }
}

impl fmt::Debug for Attenuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attenuator")
            .field("name", &self.name)
            .field("max_hertz", &self.max_hertz)
            .field("max_inflight", &self.max_inflight)
            .field("attenuated", &self.pulse.is_some())
            .finish()
    }
}
