//! Emitter timing shared by the local and distributed pulses.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::FAR_FUTURE;

/// `now + delay`, saturating at a far-future instant instead of overflowing.
fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE)
}

/// One-shot pause instant, last writer wins.
#[derive(Debug, Default)]
pub(crate) struct PauseState {
    until: Mutex<Option<Instant>>,
}

impl PauseState {
    pub(crate) fn pause_for(&self, duration: Duration) {
        self.store(deadline_after(duration));
    }

    pub(crate) fn pause_until(&self, wallclock: SystemTime) {
        // a wallclock instant already in the past releases on the next tick
        let remaining = wallclock
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO);
        self.store(deadline_after(remaining));
    }

    fn store(&self, until: Instant) {
        let mut guard = self.until.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(until);
    }

    fn take(&self) -> Option<Instant> {
        self.until.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// Decides how long the emitter sleeps before each emission.
#[derive(Debug)]
pub(crate) struct Cadence {
    period: Duration,
    pause: Arc<PauseState>,
}

impl Cadence {
    /// `period` comes from [`super::validate`].
    pub(crate) fn new(period: Duration, pause: Arc<PauseState>) -> Self {
        Cadence { period, pause }
    }

    /// Sleeps until the next emission is due.
    ///
    /// A pending pause replaces the regular period for one tick and is cleared.
    /// Returns false if `shutdown` fired first.
    pub(crate) async fn wait_for_tick(&self, shutdown: &CancellationToken) -> bool {
        let deadline = match self.pause.take() {
            Some(until) => until,
            None => deadline_after(self.period),
        };
        tokio::select! {
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep_until(deadline) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tick_follows_period() {
        let cadence = Cadence::new(Duration::from_millis(50), Arc::new(PauseState::default()));
        let shutdown = CancellationToken::new();
        let start = std::time::Instant::now();
        assert!(cadence.wait_for_tick(&shutdown).await);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(45), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(500), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn test_pause_is_consumed_once() {
        let pause = Arc::new(PauseState::default());
        let cadence = Cadence::new(Duration::from_millis(10), Arc::clone(&pause));
        let shutdown = CancellationToken::new();

        pause.pause_for(Duration::from_millis(200));
        let start = std::time::Instant::now();
        assert!(cadence.wait_for_tick(&shutdown).await);
        assert!(start.elapsed() >= Duration::from_millis(190));

        let start = std::time::Instant::now();
        assert!(cadence.wait_for_tick(&shutdown).await);
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_pause_until_past_releases_immediately() {
        let pause = Arc::new(PauseState::default());
        let cadence = Cadence::new(Duration::from_secs(2), Arc::clone(&pause));
        let shutdown = CancellationToken::new();

        pause.pause_until(SystemTime::now() - Duration::from_secs(5));
        let start = std::time::Instant::now();
        assert!(cadence.wait_for_tick(&shutdown).await);
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_huge_period_waits_for_shutdown() {
        let cadence = Cadence::new(Duration::MAX, Arc::new(PauseState::default()));
        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        assert!(!cadence.wait_for_tick(&shutdown).await);
    }

    #[test]
    fn test_pause_for_saturates() {
        let pause = PauseState::default();
        pause.pause_for(Duration::MAX);
        assert!(pause.take().is_some());
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_sleep() {
        let cadence = Cadence::new(Duration::from_secs(10), Arc::new(PauseState::default()));
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        assert!(!cadence.wait_for_tick(&shutdown).await);
    }
}
