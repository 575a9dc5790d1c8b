//! Fleet-wide pulse on a shared store.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::cadence::{Cadence, PauseState};
use super::store::SharedStore;
use super::{validate, Pulse};
use crate::config::{DISTRIBUTED_PULSE_KEY_PREFIX, STORE_ERROR_BACKOFF};
use crate::error_handling::AttenuatorError;
use crate::metrics::{GatewayEvent, MetricsSink};

/// A pulse that shares one token stream with every process using the same store.
///
/// On each tick the emitter pushes a token only if the shared list is empty, so
/// the list holds at most one outstanding token. Processes racing between the
/// length check and the push can let one extra token through; the resulting
/// rate is approximate, fleet-wide.
pub struct DistributedPulse {
    name: String,
    key: String,
    max_hertz: f64,
    max_inflight: usize,
    store: Arc<dyn SharedStore>,
    inflight: Semaphore,
    pause: Arc<PauseState>,
    shutdown: CancellationToken,
    sink: Arc<dyn MetricsSink>,
}

impl DistributedPulse {
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
        store: Arc<dyn SharedStore>,
        sink: Arc<dyn MetricsSink>,
    ) -> Result<Self, AttenuatorError> {
        let period = validate(name, max_inflight, max_hertz)?;

        let key = format!("{}{}", DISTRIBUTED_PULSE_KEY_PREFIX, name.to_lowercase());
        let pause = Arc::new(PauseState::default());
        let shutdown = CancellationToken::new();

        tokio::spawn(run_emitter(
            name.to_string(),
            key.clone(),
            Cadence::new(period, Arc::clone(&pause)),
            Arc::clone(&store),
            shutdown.clone(),
            Arc::clone(&sink),
        ));

        log::debug!(
            "Created distributed pulse '{}' on key '{}' ({:.3}Hz)",
            name,
            key,
            max_hertz
        );

        Ok(DistributedPulse {
            name: name.to_string(),
            key,
            max_hertz,
            max_inflight,
            store,
            inflight: Semaphore::new(max_inflight),
            pause,
            shutdown,
            sink,
        })
    }

    /// The shared list key this pulse emits to.
    pub fn key(&self) -> &str {
        &self.key
    }
}

async fn send_pulse(store: &dyn SharedStore, key: &str) -> Result<bool, AttenuatorError> {
    if store.list_len(key).await? > 0 {
        return Ok(false);
    }
    let token = chrono::Utc::now().timestamp_millis().to_string();
    store.push(key, token).await?;
    Ok(true)
}

async fn run_emitter(
    name: String,
    key: String,
    cadence: Cadence,
    store: Arc<dyn SharedStore>,
    shutdown: CancellationToken,
    sink: Arc<dyn MetricsSink>,
) {
    loop {
        if !cadence.wait_for_tick(&shutdown).await {
            break;
        }
        match send_pulse(store.as_ref(), &key).await {
            Ok(true) => sink.record(GatewayEvent::PulseEmitted, &name),
            Ok(false) => {}
            Err(e) => {
                log::warn!("Pulse '{}' failed to emit: {}", name, e);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(STORE_ERROR_BACKOFF) => {}
                }
            }
        }
    }
    log::debug!("Distributed pulse '{}' emitter shutting down", name);
}

#[async_trait]
impl Pulse for DistributedPulse {
    async fn wait_for_next(&self) -> Result<(), AttenuatorError> {
        let stopped = || AttenuatorError::PulseStopped {
            name: self.name.clone(),
        };
        let _slot = self.inflight.acquire().await.map_err(|_| stopped())?;
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(stopped()),
            popped = self.store.blocking_pop(&self.key) => { popped?; }
        }
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

impl Drop for DistributedPulse {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for DistributedPulse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedPulse")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("max_hertz", &self.max_hertz)
            .field("max_inflight", &self.max_inflight)
            .finish()
    }
}
