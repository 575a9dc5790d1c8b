//! Observability sink.
//!
//! Components report what they do (pulses emitted, waits, retries, CDF choices)
//! to a `MetricsSink`. The sink is write-only: nothing in the core reads it back,
//! so every component behaves identically with `NoopSink`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use strum::IntoEnumIterator;
use strum_macros::EnumIter as EnumIterMacro;

/// Events reported by the gateway core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum GatewayEvent {
    /// A pulse emitted a permit.
    PulseEmitted,
    /// A caller received a permit from a pulse.
    PulseWait,
    /// An attenuator wait hit its deadline.
    WaitTimeout,
    /// An attenuator wait was cancelled.
    WaitCancelled,
    /// The circuit breaker backed off and retried.
    Retry,
    /// The circuit breaker ran out of retries.
    RetryBudgetExhausted,
    /// The circuit breaker gave up on a terminal error.
    TerminalFailure,
    /// An item was chosen from a weighted set.
    CdfChoice,
    /// An item was chosen from the caller's preference list.
    PreferredChoice,
    /// A selection found nothing to return.
    SelectionMiss,
}

impl GatewayEvent {
    /// Returns a human-readable label for the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayEvent::PulseEmitted => "pulse emitted",
            GatewayEvent::PulseWait => "pulse wait",
            GatewayEvent::WaitTimeout => "wait timeout",
            GatewayEvent::WaitCancelled => "wait cancelled",
            GatewayEvent::Retry => "retry",
            GatewayEvent::RetryBudgetExhausted => "retry budget exhausted",
            GatewayEvent::TerminalFailure => "terminal failure",
            GatewayEvent::CdfChoice => "cdf choice",
            GatewayEvent::PreferredChoice => "preferred choice",
            GatewayEvent::SelectionMiss => "selection miss",
        }
    }
}

/// Write-only destination for gateway events.
pub trait MetricsSink: Send + Sync {
    /// Records one occurrence of `event` for the flow, pulse or set called `name`.
    fn record(&self, event: GatewayEvent, name: &str);

    /// Records how long a caller waited for a green light on flow `name`.
    fn record_wait(&self, name: &str, waited: Duration);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn record(&self, _event: GatewayEvent, _name: &str) {}

    fn record_wait(&self, _name: &str, _waited: Duration) {}
}

/// Returns a shared no-op sink.
pub fn noop_sink() -> Arc<dyn MetricsSink> {
    Arc::new(NoopSink)
}

/// Thread-safe in-process counters.
///
/// Counters are keyed by event only; the name passed to `record` is ignored.
/// Every event is initialized to zero on creation, so reads never miss.
#[derive(Debug)]
pub struct CounterSink {
    counts: HashMap<GatewayEvent, AtomicUsize>,
    wait_millis: AtomicU64,
}

impl CounterSink {
    /// Creates a sink with every counter at zero.
    pub fn new() -> Self {
        let mut counts = HashMap::new();
        for event in GatewayEvent::iter() {
            counts.insert(event, AtomicUsize::new(0));
        }
        CounterSink {
            counts,
            wait_millis: AtomicU64::new(0),
        }
    }

    /// Returns the count for an event.
    pub fn count(&self, event: GatewayEvent) -> usize {
        self.counts
            .get(&event)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Returns the total across all events.
    pub fn total_events(&self) -> usize {
        self.counts.values().map(|c| c.load(Ordering::SeqCst)).sum()
    }

    /// Returns the cumulative time callers spent waiting for green lights.
    pub fn total_wait_millis(&self) -> u64 {
        self.wait_millis.load(Ordering::SeqCst)
    }

    /// Logs every non-zero counter at info level.
    pub fn log_summary(&self) {
        for event in GatewayEvent::iter() {
            let count = self.count(event);
            if count > 0 {
                log::info!("{}: {}", event.as_str(), count);
            }
        }
        let waited = self.total_wait_millis();
        if waited > 0 {
            log::info!("total wait: {}ms", waited);
        }
    }
}

impl Default for CounterSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for CounterSink {
    fn record(&self, event: GatewayEvent, _name: &str) {
        if let Some(counter) = self.counts.get(&event) {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            log::error!(
                "Attempted to increment counter for {:?} which is not in the map. \
                 This indicates a bug in CounterSink initialization.",
                event
            );
        }
    }

    fn record_wait(&self, _name: &str, waited: Duration) {
        let millis = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX);
        self.wait_millis.fetch_add(millis, Ordering::Relaxed);
    }
}
