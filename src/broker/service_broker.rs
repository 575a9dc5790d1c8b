//! Service → backend routing.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use url::Url;

use super::backend::{Backend, BackendState, Upstream};
use crate::metrics::{GatewayEvent, MetricsSink};

/// A resolved request target.
#[derive(Debug)]
pub struct Route<'a> {
    /// Service name taken from the first path segment.
    pub service: String,
    /// Backend chosen for the request.
    pub backend: &'a Backend,
    /// Backend URL with the remaining path and query applied.
    pub target: Url,
}

/// Chooses backends for services.
pub struct ServiceBroker {
    upstreams: HashMap<String, Upstream>,
    sink: Arc<dyn MetricsSink>,
}

impl ServiceBroker {
    /// Creates a broker with no upstreams.
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        ServiceBroker {
            upstreams: HashMap::new(),
            sink,
        }
    }

    /// Adds or replaces an upstream (case-insensitive name).
    pub fn add_upstream(&mut self, upstream: Upstream) {
        self.upstreams
            .insert(upstream.name().to_lowercase(), upstream);
    }

    /// Looks an upstream up by service name.
    pub fn upstream(&self, service: &str) -> Option<&Upstream> {
        self.upstreams.get(&service.to_lowercase())
    }

    /// Service names, sorted.
    pub fn services(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.upstreams.values().map(|u| u.name()).collect();
        names.sort_unstable();
        names
    }

    /// Chooses a backend for `service` using the thread-local RNG.
    pub fn choose_backend<S: AsRef<str>>(&self, service: &str, preferred: &[S]) -> Option<&Backend> {
        self.choose_backend_with(service, preferred, &mut rand::rng())
    }

    /// Chooses a backend for `service`.
    ///
    /// A routable backend named in `preferred` wins outright. Otherwise the
    /// upstream's rule draws one; if that backend is not routable, a uniform pick
    /// among the routable ones is made. `None` means nothing can serve the request.
    pub fn choose_backend_with<S, R>(
        &self,
        service: &str,
        preferred: &[S],
        rng: &mut R,
    ) -> Option<&Backend>
    where
        S: AsRef<str>,
        R: Rng + ?Sized,
    {
        let Some(upstream) = self.upstream(service) else {
            log::warn!("No upstream registered for service '{}'", service);
            self.sink.record(GatewayEvent::SelectionMiss, service);
            return None;
        };
        let backends = upstream.backends();

        if let Some(backend) = preferred
            .iter()
            .filter_map(|name| backends.find(name.as_ref()))
            .find(|backend| backend.is_routable())
        {
            self.sink.record(GatewayEvent::PreferredChoice, service);
            return Some(backend);
        }

        match backends.choose_by_rule(upstream.rule(), rng) {
            Some(backend) if backend.is_routable() => {
                self.sink.record(GatewayEvent::CdfChoice, service);
                Some(backend)
            }
            Some(_) => {
                let routable: Vec<&Backend> =
                    backends.iter().filter(|b| b.is_routable()).collect();
                if routable.is_empty() {
                    log::warn!("Service '{}' has no routable backend", service);
                    self.sink.record(GatewayEvent::SelectionMiss, service);
                    return None;
                }
                self.sink.record(GatewayEvent::CdfChoice, service);
                Some(routable[rng.random_range(0..routable.len())])
            }
            None => {
                log::warn!("Service '{}' has no backends", service);
                self.sink.record(GatewayEvent::SelectionMiss, service);
                None
            }
        }
    }

    /// Records a health signal. Returns false if the service or backend is unknown.
    pub fn set_backend_state(&self, service: &str, backend: &str, state: BackendState) -> bool {
        match self
            .upstream(service)
            .and_then(|upstream| upstream.backends().find(backend))
        {
            Some(found) => {
                if found.state() != state {
                    log::info!("{}/{} is now {:?}", service, found.label(), state);
                }
                found.set_state(state);
                true
            }
            None => false,
        }
    }

    /// Resolves `/service/rest/of/path?query` to a backend and target URL.
    ///
    /// Returns `None` (a not-found condition) for an empty service name or when
    /// no backend can be chosen.
    pub fn route(&self, service_and_uri: &str) -> Option<Route<'_>> {
        let (path_part, query) = match service_and_uri.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (service_and_uri, None),
        };
        let trimmed = path_part.trim_start_matches('/');
        let (service, rest) = match trimmed.split_once('/') {
            Some((service, rest)) => (service, rest),
            None => (trimmed, ""),
        };
        if service.is_empty() {
            return None;
        }

        let no_preference: [&str; 0] = [];
        let backend = self.choose_backend(service, &no_preference)?;

        let mut target = backend.url().clone();
        let base = target.path().trim_end_matches('/').to_string();
        target.set_path(&format!("{}/{}", base, rest));
        target.set_query(query);

        Some(Route {
            service: service.to_string(),
            backend,
            target,
        })
    }
}
