//! In-process pulse.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::cadence::{Cadence, PauseState};
use super::{validate, Pulse};
use crate::error_handling::AttenuatorError;
use crate::metrics::{GatewayEvent, MetricsSink};

/// A pulse whose emitter runs as a tokio task in this process.
///
/// Permits flow through a bounded channel sized to `max_inflight`; when nobody
/// consumes them the emitter blocks on the full channel, so permits are never
/// produced faster than they are taken. A semaphore of the same size caps how
/// many callers may wait at once.
///
/// The emitter stops when the pulse is dropped or [`Pulse::shutdown`] is called.
pub struct LocalPulse {
    name: String,
    max_hertz: f64,
    max_inflight: usize,
    permits: async_channel::Receiver<()>,
    inflight: Semaphore,
    pause: Arc<PauseState>,
    shutdown: CancellationToken,
    sink: Arc<dyn MetricsSink>,
}

impl LocalPulse {
    /// Creates the pulse and spawns its emitter.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMaxInflight` if `max_inflight` is zero and `InvalidRate` if
    /// `max_hertz` is not a positive, finite number whose period fits in a `Duration`.
    pub fn new(
        name: &str,
        max_inflight: usize,
        max_hertz: f64,
        sink: Arc<dyn MetricsSink>,
    ) -> Result<Self, AttenuatorError> {
        let period = validate(name, max_inflight, max_hertz)?;

        let (tx, rx) = async_channel::bounded(max_inflight);
        let pause = Arc::new(PauseState::default());
        let shutdown = CancellationToken::new();

        let cadence = Cadence::new(period, Arc::clone(&pause));
        tokio::spawn(run_emitter(
            name.to_string(),
            cadence,
            tx,
            shutdown.clone(),
            Arc::clone(&sink),
        ));

        log::debug!(
            "Created pulse '{}' ({:.3}Hz, {} inflight)",
            name,
            max_hertz,
            max_inflight
        );

        Ok(LocalPulse {
            name: name.to_string(),
            max_hertz,
            max_inflight,
            permits: rx,
            inflight: Semaphore::new(max_inflight),
            pause,
            shutdown,
            sink,
        })
    }
}

async fn run_emitter(
    name: String,
    cadence: Cadence,
    tx: async_channel::Sender<()>,
    shutdown: CancellationToken,
    sink: Arc<dyn MetricsSink>,
) {
    loop {
        if !cadence.wait_for_tick(&shutdown).await {
            break;
        }
        tokio::select! {
            _ = shutdown.cancelled() => break,
            sent = tx.send(()) => {
                if sent.is_err() {
                    // every receiver is gone
                    break;
                }
                sink.record(GatewayEvent::PulseEmitted, &name);
            }
        }
    }
    log::debug!("Pulse '{}' emitter shutting down", name);
}

#[async_trait]
impl Pulse for LocalPulse {
    async fn wait_for_next(&self) -> Result<(), AttenuatorError> {
        let stopped = || AttenuatorError::PulseStopped {
            name: self.name.clone(),
        };
        // the slot is released when this future completes or is dropped
        let _slot = self.inflight.acquire().await.map_err(|_| stopped())?;
        self.permits.recv().await.map_err(|_| stopped())?;
        self.sink.record(GatewayEvent::PulseWait, &self.name);
        Ok(())
    }

    fn set_pause_for_duration(&self, duration: Duration) {
        self.pause.pause_for(duration);
    }

    fn set_pause_until(&self, wallclock: SystemTime) {
        self.pause.pause_until(wallclock);
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn max_hertz(&self) -> f64 {
        self.max_hertz
    }

    fn max_inflight(&self) -> usize {
        self.max_inflight
    }

    fn shutdown(&self) {
        self.shutdown.cancel();
        self.inflight.close();
    }
}

impl Drop for LocalPulse {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for LocalPulse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalPulse")
            .field("name", &self.name)
            .field("max_hertz", &self.max_hertz)
            .field("max_inflight", &self.max_inflight)
            .finish()
    }
}
