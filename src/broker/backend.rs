//! Backends and upstreams.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use url::Url;

use crate::error_handling::AttenuatorError;
use crate::selection::{Named, SelectionRule, Weighted, WeightedSet};

/// Health signal for a backend, as reported by health-check workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendState {
    /// No health check has reported yet.
    #[default]
    Unknown,
    /// Last check passed.
    Healthy,
    /// Last check failed.
    Unhealthy,
    /// Taken out of rotation by an operator.
    Disabled,
}

impl BackendState {
    /// True if requests may be routed to a backend in this state.
    pub fn is_routable(&self) -> bool {
        matches!(self, BackendState::Unknown | BackendState::Healthy)
    }

    fn to_u8(self) -> u8 {
        match self {
            BackendState::Unknown => 0,
            BackendState::Healthy => 1,
            BackendState::Unhealthy => 2,
            BackendState::Disabled => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => BackendState::Healthy,
            2 => BackendState::Unhealthy,
            3 => BackendState::Disabled,
            _ => BackendState::Unknown,
        }
    }
}

/// One destination a service can be routed to.
#[derive(Debug)]
pub struct Backend {
    label: String,
    url: Url,
    weight: u32,
    cdf: f64,
    headers: Vec<(String, String)>,
    state: AtomicU8,
}

impl Backend {
    /// Creates a backend in the `Unknown` state.
    pub fn new(label: impl Into<String>, url: Url, weight: u32) -> Self {
        Backend {
            label: label.into(),
            url,
            weight,
            cdf: 0.0,
            headers: Vec::new(),
            state: AtomicU8::new(BackendState::Unknown.to_u8()),
        }
    }

    /// Adds a header to send with every request to this backend.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Label from configuration.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Base URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Headers to add to outgoing requests.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Current health signal.
    pub fn state(&self) -> BackendState {
        BackendState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Records a health signal.
    pub fn set_state(&self, state: BackendState) {
        self.state.store(state.to_u8(), Ordering::SeqCst);
    }

    /// True if the backend may receive requests.
    pub fn is_routable(&self) -> bool {
        self.state().is_routable()
    }
}

impl Weighted for Backend {
    fn weight(&self) -> u32 {
        self.weight
    }

    fn cdf(&self) -> f64 {
        self.cdf
    }

    fn set_cdf(&mut self, cdf: f64) {
        self.cdf = cdf;
    }
}

impl Named for Backend {
    fn name(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.label, self.url)
    }
}

/// A named service and the backends it can be routed to.
#[derive(Debug)]
pub struct Upstream {
    name: String,
    rule: SelectionRule,
    backends: WeightedSet<Backend>,
}

impl Upstream {
    /// Creates an upstream, backpatching the backends' CDF.
    ///
    /// # Errors
    ///
    /// Returns `ZeroTotalWeight` if every backend has weight zero.
    pub fn new(
        name: impl Into<String>,
        rule: SelectionRule,
        backends: Vec<Backend>,
    ) -> Result<Self, AttenuatorError> {
        let name = name.into();
        let backends = WeightedSet::new(format!("upstreams.{}.backends", name), backends)?;
        Ok(Upstream {
            name,
            rule,
            backends,
        })
    }

    /// Service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Selection rule.
    pub fn rule(&self) -> SelectionRule {
        self.rule
    }

    /// Backends in configuration order.
    pub fn backends(&self) -> &WeightedSet<Backend> {
        &self.backends
    }
}
