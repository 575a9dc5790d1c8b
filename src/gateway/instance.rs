//! A built gateway.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::config::CircuitBreakerConfig;
use crate::attenuator::Attenuator;
use crate::broker::ServiceBroker;
use crate::circuit_breaker::{status_predicate, CircuitBreaker, HttpTransport};
use crate::error_handling::{AttenuatorError, ErrorClassifier};
use crate::metrics::MetricsSink;
use crate::pathology::PathologyRegistry;
use crate::pulse::PulseRegistry;
use crate::traffic_light::TrafficLightRegistry;

/// Everything a configuration builds, owned in one place.
///
/// Two gateways never share state; tests build as many as they like.
pub struct Gateway {
    pub(super) pulses: PulseRegistry,
    pub(super) traffic_lights: Arc<TrafficLightRegistry>,
    pub(super) attenuators: HashMap<String, Attenuator>,
    pub(super) broker: ServiceBroker,
    pub(super) pathologies: PathologyRegistry,
    pub(super) breaker: CircuitBreakerConfig,
    pub(super) classifier: ErrorClassifier,
    pub(super) sink: Arc<dyn MetricsSink>,
}

impl Gateway {
    /// Pulses created for the attenuators.
    pub fn pulses(&self) -> &PulseRegistry {
        &self.pulses
    }

    /// Traffic lights, including one per attenuator.
    pub fn traffic_lights(&self) -> &Arc<TrafficLightRegistry> {
        &self.traffic_lights
    }

    /// Looks an attenuator up (case-insensitive).
    pub fn attenuator(&self, name: &str) -> Option<&Attenuator> {
        self.attenuators.get(&name.to_lowercase())
    }

    /// Attenuator names, sorted.
    pub fn attenuator_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.attenuators.values().map(|a| a.name()).collect();
        names.sort_unstable();
        names
    }

    /// Backend selection.
    pub fn broker(&self) -> &ServiceBroker {
        &self.broker
    }

    /// Fault selection.
    pub fn pathologies(&self) -> &PathologyRegistry {
        &self.pathologies
    }

    /// Circuit-breaker defaults from the configuration.
    pub fn circuit_breaker_config(&self) -> &CircuitBreakerConfig {
        &self.breaker
    }

    /// Metrics sink shared by every component.
    pub fn sink(&self) -> &Arc<dyn MetricsSink> {
        &self.sink
    }

    /// Builds a circuit breaker on `transport` with the configured defaults.
    ///
    /// Responses are judged by status: 2xx succeeds, 429 and 503 are retried.
    pub fn circuit_breaker(
        &self,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<CircuitBreaker, AttenuatorError> {
        CircuitBreaker::builder()
            .retries(self.breaker.retries)
            .timeout_millis(self.breaker.timeout_millis)
            .traffic_light(self.breaker.traffic_light.clone())
            .traffic_lights(Arc::clone(&self.traffic_lights))
            .classifier(self.classifier.clone())
            .success_shared(status_predicate())
            .sink(Arc::clone(&self.sink))
            .build(transport)
    }

    /// Stops every pulse emitter.
    pub fn shutdown(&self) {
        log::debug!("Shutting down {} pulse(s)", self.pulses.names().len());
        self.pulses.shutdown_all();
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("attenuators", &self.attenuator_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::GatewayConfig;
    use super::*;
    use crate::circuit_breaker::{Headers, TransportResponse};
    use crate::error_handling::TransportError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyTransport {
        calls: AtomicU32,
    }

    #[async_trait]
    impl HttpTransport for FlakyTransport {
        async fn get(&self, _url: &str, _headers: &Headers) -> Result<TransportResponse, TransportError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(TransportResponse::new(503, ""))
            } else {
                Ok(TransportResponse::new(200, "ok"))
            }
        }

        async fn post(
            &self,
            url: &str,
            _body: &[u8],
            headers: &Headers,
        ) -> Result<TransportResponse, TransportError> {
            self.get(url, headers).await
        }
    }

    #[tokio::test]
    async fn test_circuit_breaker_uses_configured_defaults() {
        let config = GatewayConfig::from_json_str(
            r#"{ "circuit_breaker": { "retries": 2, "timeout_millis": 500 } }"#,
        )
        .unwrap();
        let gateway = config.build().unwrap();
        let transport = Arc::new(FlakyTransport {
            calls: AtomicU32::new(0),
        });
        let breaker = gateway.circuit_breaker(transport).unwrap();
        assert_eq!(breaker.retries(), 2);

        let outcome = breaker.get("http://backend/", &Vec::new()).await.unwrap();
        assert_eq!(outcome.response.status, 200);
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn test_attenuator_names_sorted() {
        let config = GatewayConfig::from_json_str(
            r#"{ "attenuators": { "b": { "max_hertz": 1.0 }, "a": { "max_hertz": 0 } } }"#,
        )
        .unwrap();
        let gateway = config.build().unwrap();
        assert_eq!(gateway.attenuator_names(), vec!["a", "b"]);
        assert_eq!(gateway.pulses().names(), vec!["b".to_string()]);
        gateway.shutdown();
    }
}
