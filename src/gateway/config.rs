//! Gateway configuration file.
//!
//! The file is JSON. Maps are read into `BTreeMap`s, so sibling sets (backends,
//! failure modes, responses) are laid out in key order when their CDF is built.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use url::Url;

use super::Gateway;
use crate::attenuator::Attenuator;
use crate::broker::{Backend, ServiceBroker, Upstream};
use crate::config::{
    DEFAULT_ATTENUATOR_QUEUE_SIZE, DEFAULT_CIRCUIT_BREAKER_RETRIES,
    DEFAULT_CIRCUIT_BREAKER_TIMEOUT_MILLIS, DEFAULT_TRAFFIC_LIGHT,
};
use crate::duration::DurationSpec;
use crate::error_handling::{AttenuatorError, ErrorClassifier, InitializationError};
use crate::metrics::{noop_sink, MetricsSink};
use crate::pathology::{FailureMode, HttpResponseSpec, Pathology, PathologyRegistry};
use crate::pulse::{PulseRegistry, SharedStore};
use crate::selection::SelectionRule;
use crate::traffic_light::{TrafficLight, TrafficLightRegistry};

/// The whole gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Per-flow rate limits, by flow name.
    pub attenuators: BTreeMap<String, AttenuatorConfig>,
    /// Traffic lights, each bound to an attenuator's pulse or to none (always green).
    pub traffic_lights: BTreeMap<String, Option<String>>,
    /// Defaults for circuit breakers built from the gateway.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Services and their backends.
    pub upstreams: BTreeMap<String, UpstreamConfig>,
    /// Fault pathologies, by name, then by failure mode.
    pub pathologies: BTreeMap<String, BTreeMap<String, FailureModeConfig>>,
}

/// One flow's rate limit.
#[derive(Debug, Clone, Deserialize)]
pub struct AttenuatorConfig {
    /// Permits per second; zero or less means unlimited.
    pub max_hertz: f64,
    /// Waiters allowed to hold a slot at once.
    #[serde(default = "default_max_inflight")]
    pub max_inflight: i64,
    /// Emit through the shared store instead of in-process.
    #[serde(default)]
    pub distributed: bool,
}

fn default_max_inflight() -> i64 {
    DEFAULT_ATTENUATOR_QUEUE_SIZE as i64
}

/// Circuit-breaker defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Total attempts per call.
    pub retries: u32,
    /// Per-attempt timeout.
    pub timeout_millis: u64,
    /// Traffic light waited on between attempts.
    pub traffic_light: String,
    /// Extra error classes: class name to regular expression.
    pub error_classes: BTreeMap<String, String>,
    /// Classes that are worth retrying, in addition to the built-in ones.
    pub transient: Vec<String>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        CircuitBreakerConfig {
            retries: DEFAULT_CIRCUIT_BREAKER_RETRIES,
            timeout_millis: DEFAULT_CIRCUIT_BREAKER_TIMEOUT_MILLIS,
            traffic_light: DEFAULT_TRAFFIC_LIGHT.to_string(),
            error_classes: BTreeMap::new(),
            transient: Vec::new(),
        }
    }
}

/// A service's backends and how to pick between them.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// `weighted`, `uniform` or `random`; empty means uniform.
    #[serde(default)]
    pub rule: String,
    /// Backends by label.
    #[serde(default)]
    pub backends: BTreeMap<String, BackendConfig>,
}

/// One backend.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Base URL.
    pub url: String,
    /// Relative weight.
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Headers added to every request sent to this backend.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_weight() -> u32 {
    1
}

/// One failure mode: `httpcode` (with `responses`) or `timeout` (with `duration`).
#[derive(Debug, Clone, Deserialize)]
pub struct FailureModeConfig {
    /// Relative weight inside the pathology.
    pub weight: u32,
    /// Replies by status code (`httpcode` only).
    #[serde(default)]
    pub responses: BTreeMap<String, ResponseConfig>,
    /// Hang duration (`timeout` only).
    #[serde(default)]
    pub duration: Option<String>,
}

/// One reply of an `httpcode` failure mode.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseConfig {
    /// Relative weight.
    pub weight: u32,
    /// Delay before replying.
    #[serde(default)]
    pub duration: Option<String>,
    /// Reply headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Reply body; a JSON value other than a string is sent as its JSON text.
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

impl GatewayConfig {
    /// Reads and parses a configuration file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read gateway configuration {}", path.display()))?;
        Self::from_json_str(&text)
            .with_context(|| format!("Failed to parse gateway configuration {}", path.display()))
    }

    /// Parses a configuration document.
    ///
    /// # Errors
    ///
    /// Returns `InitializationError::ConfigFileError` for malformed JSON or a
    /// document that does not match the schema.
    pub fn from_json_str(text: &str) -> Result<Self, InitializationError> {
        serde_json::from_str(text).map_err(|e| InitializationError::ConfigFileError(e.to_string()))
    }

    /// Builds a gateway with no metrics and no shared store.
    ///
    /// Must be called inside a tokio runtime: pulse emitters are spawned here.
    pub fn build(&self) -> Result<Gateway, AttenuatorError> {
        self.build_with(noop_sink(), None)
    }

    /// Validates the configuration and builds a gateway.
    ///
    /// Nothing is left half-checked: every error names the offending key.
    ///
    /// # Errors
    ///
    /// Returns `AttenuatorError::Config` on the first invalid entry.
    pub fn build_with(
        &self,
        sink: Arc<dyn MetricsSink>,
        store: Option<Arc<dyn SharedStore>>,
    ) -> Result<Gateway, AttenuatorError> {
        let pulses = PulseRegistry::new(Arc::clone(&sink));
        let attenuators = self.build_attenuators(&pulses, &sink, store)?;
        let traffic_lights = Arc::new(self.build_traffic_lights(&attenuators)?);
        let classifier = self.build_classifier(&traffic_lights)?;
        let broker = self.build_broker(&sink)?;
        let pathologies = self.build_pathologies(&sink)?;

        log::info!(
            "Gateway ready: {} attenuator(s), {} traffic light(s), {} upstream(s), {} pathology(ies)",
            attenuators.len(),
            traffic_lights.names().len(),
            broker.services().len(),
            pathologies.names().len()
        );

        Ok(Gateway {
            pulses,
            traffic_lights,
            attenuators,
            broker,
            pathologies,
            breaker: self.circuit_breaker.clone(),
            classifier,
            sink,
        })
    }

    fn build_attenuators(
        &self,
        pulses: &PulseRegistry,
        sink: &Arc<dyn MetricsSink>,
        store: Option<Arc<dyn SharedStore>>,
    ) -> Result<HashMap<String, Attenuator>, AttenuatorError> {
        let mut attenuators = HashMap::new();
        for (name, cfg) in &self.attenuators {
            let key = format!("attenuators.{}", name);
            if attenuators.contains_key(&name.to_lowercase()) {
                return Err(AttenuatorError::config(key, "duplicate pulse name"));
            }
            if cfg.max_inflight <= 0 {
                return Err(AttenuatorError::config(
                    format!("{}.max_inflight", key),
                    format!("cannot have an attenuator queue size of {}", cfg.max_inflight),
                ));
            }
            let max_inflight = cfg.max_inflight as usize;

            let attenuator = if cfg.distributed {
                let store = store.as_ref().ok_or_else(|| {
                    AttenuatorError::config(
                        format!("{}.distributed", key),
                        "no shared store is configured",
                    )
                })?;
                let pulse = pulses
                    .create_distributed(name, max_inflight, cfg.max_hertz, Arc::clone(store))
                    .map_err(|e| AttenuatorError::config(format!("{}.max_hertz", key), e.to_string()))?;
                Attenuator::with_pulse(pulse, Arc::clone(sink))
            } else {
                Attenuator::new(name, cfg.max_hertz, max_inflight, pulses, Arc::clone(sink))
                    .map_err(|e| match e {
                        AttenuatorError::InvalidRate { .. } => {
                            AttenuatorError::config(format!("{}.max_hertz", key), e.to_string())
                        }
                        _ => AttenuatorError::config(key.clone(), e.to_string()),
                    })?
            };
            log::debug!("Attenuator {}", attenuator);
            attenuators.insert(name.to_lowercase(), attenuator);
        }
        Ok(attenuators)
    }

    fn build_traffic_lights(
        &self,
        attenuators: &HashMap<String, Attenuator>,
    ) -> Result<TrafficLightRegistry, AttenuatorError> {
        let registry = TrafficLightRegistry::new();
        // every attenuator doubles as a light of the same name
        for attenuator in attenuators.values() {
            registry.register(attenuator.traffic_light());
        }
        for (name, target) in &self.traffic_lights {
            let pulse = match target {
                None => None,
                Some(target) => {
                    let attenuator = attenuators.get(&target.to_lowercase()).ok_or_else(|| {
                        AttenuatorError::config(
                            format!("traffic_lights.{}", name),
                            format!("unknown attenuator '{}'", target),
                        )
                    })?;
                    attenuator.pulse().cloned()
                }
            };
            registry.register(TrafficLight::new(name.clone(), pulse));
        }
        Ok(registry)
    }

    fn build_classifier(
        &self,
        traffic_lights: &TrafficLightRegistry,
    ) -> Result<ErrorClassifier, AttenuatorError> {
        let cfg = &self.circuit_breaker;
        if cfg.timeout_millis == 0 {
            return Err(AttenuatorError::config(
                "circuit_breaker.timeout_millis",
                "must be greater than zero",
            ));
        }
        if traffic_lights.get(&cfg.traffic_light).is_none() {
            return Err(AttenuatorError::config(
                "circuit_breaker.traffic_light",
                format!("unknown traffic light '{}'", cfg.traffic_light),
            ));
        }

        let mut classifier = ErrorClassifier::new();
        for (name, pattern) in &cfg.error_classes {
            classifier = classifier.with_class(name, pattern).map_err(|e| {
                AttenuatorError::config(
                    format!("circuit_breaker.error_classes.{}", name),
                    e.to_string(),
                )
            })?;
        }
        for name in &cfg.transient {
            if !classifier.has_class(name) {
                return Err(AttenuatorError::config(
                    "circuit_breaker.transient",
                    format!("unknown error class '{}'", name),
                ));
            }
            classifier = classifier.mark_transient(name);
        }
        Ok(classifier)
    }

    fn build_broker(&self, sink: &Arc<dyn MetricsSink>) -> Result<ServiceBroker, AttenuatorError> {
        let mut broker = ServiceBroker::new(Arc::clone(sink));
        for (service, cfg) in &self.upstreams {
            let key = format!("upstreams.{}", service);
            if broker.upstream(service).is_some() {
                return Err(AttenuatorError::config(key, "duplicate service name"));
            }
            let rule: SelectionRule = cfg
                .rule
                .parse()
                .map_err(|e: AttenuatorError| AttenuatorError::config(format!("{}.rule", key), e.to_string()))?;
            if cfg.backends.is_empty() {
                return Err(AttenuatorError::config(format!("{}.backends", key), "has no backends"));
            }

            let mut backends = Vec::with_capacity(cfg.backends.len());
            for (label, backend_cfg) in &cfg.backends {
                let url = Url::parse(&backend_cfg.url).map_err(|e| {
                    AttenuatorError::config(
                        format!("{}.backends.{}.url", key, label),
                        format!("'{}': {}", backend_cfg.url, e),
                    )
                })?;
                let backend = backend_cfg.headers.iter().fold(
                    Backend::new(label.clone(), url, backend_cfg.weight),
                    |backend, (name, value)| backend.with_header(name.clone(), value.clone()),
                );
                backends.push(backend);
            }

            let upstream = Upstream::new(service.clone(), rule, backends)
                .map_err(|e| AttenuatorError::config(format!("{}.backends", key), e.to_string()))?;
            broker.add_upstream(upstream);
        }
        Ok(broker)
    }

    fn build_pathologies(
        &self,
        sink: &Arc<dyn MetricsSink>,
    ) -> Result<PathologyRegistry, AttenuatorError> {
        let mut registry = PathologyRegistry::new(Arc::clone(sink));
        for (name, modes_cfg) in &self.pathologies {
            let key = format!("pathologies.{}", name);
            if registry.get(name).is_some() {
                return Err(AttenuatorError::config(key, "duplicate pathology name"));
            }
            let mut modes = Vec::with_capacity(modes_cfg.len());
            for (mode_name, mode_cfg) in modes_cfg {
                modes.push(build_failure_mode(&key, mode_name, mode_cfg)?);
            }
            let pathology = Pathology::new(name.clone(), modes)
                .map_err(|e| AttenuatorError::config(key.clone(), e.to_string()))?;
            registry.insert(pathology);
        }
        Ok(registry)
    }
}

fn parse_duration(key: &str, text: &str) -> Result<DurationSpec, AttenuatorError> {
    text.parse()
        .map_err(|e: AttenuatorError| AttenuatorError::config(key, e.to_string()))
}

fn build_failure_mode(
    pathology_key: &str,
    mode_name: &str,
    cfg: &FailureModeConfig,
) -> Result<FailureMode, AttenuatorError> {
    let key = format!("{}.{}", pathology_key, mode_name);
    match mode_name.to_lowercase().as_str() {
        "httpcode" => {
            if cfg.responses.is_empty() {
                return Err(AttenuatorError::config(format!("{}.responses", key), "has no values"));
            }
            let mut responses = Vec::with_capacity(cfg.responses.len());
            for (code_text, response_cfg) in &cfg.responses {
                let response_key = format!("{}.responses.{}", key, code_text);
                let code = code_text
                    .parse::<u16>()
                    .ok()
                    .filter(|code| (100..=599).contains(code))
                    .ok_or_else(|| {
                        AttenuatorError::config(response_key.clone(), "not an HTTP status code")
                    })?;

                let mut response = HttpResponseSpec::new(code, response_cfg.weight);
                if let Some(duration) = &response_cfg.duration {
                    response = response
                        .with_duration(parse_duration(&format!("{}.duration", response_key), duration)?);
                }
                for (name, value) in &response_cfg.headers {
                    response = response.with_header(name.clone(), value.clone());
                }
                match &response_cfg.body {
                    Some(serde_json::Value::String(text)) => {
                        response = response.with_body(text.clone());
                    }
                    Some(value) => response = response.with_body(value.to_string()),
                    None => {}
                }
                responses.push(response);
            }
            FailureMode::http_code(mode_name, cfg.weight, responses)
                .map_err(|e| AttenuatorError::config(format!("{}.responses", key), e.to_string()))
        }
        "timeout" => {
            let duration = cfg.duration.as_deref().ok_or_else(|| {
                AttenuatorError::config(format!("{}.duration", key), "a timeout needs a duration")
            })?;
            let duration = parse_duration(&format!("{}.duration", key), duration)?;
            Ok(FailureMode::timeout(mode_name, cfg.weight, duration))
        }
        _ => Err(AttenuatorError::config(key, format!("unknown failure mode '{}'", mode_name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse::InMemoryStore;

    const SAMPLE: &str = r#"{
        "attenuators": {
            "search": { "max_hertz": 5.0, "max_inflight": 4 },
            "unlimited": { "max_hertz": 0 }
        },
        "traffic_lights": { "backoff": "search", "open": null },
        "circuit_breaker": { "retries": 4, "timeout_millis": 2000, "traffic_light": "backoff" },
        "upstreams": {
            "search": {
                "rule": "weighted",
                "backends": {
                    "bing": { "url": "https://www.bing.com", "weight": 30 },
                    "google": { "url": "https://www.google.com", "weight": 70,
                                "headers": { "X-Api-Key": "k" } }
                }
            }
        },
        "pathologies": {
            "simple": {
                "httpcode": { "weight": 90, "responses": {
                    "200": { "weight": 80, "duration": "normal(1.0, 0.2)",
                             "body": { "success": true } },
                    "429": { "weight": 20, "headers": { "X-Backoff-Millis": "60000" } }
                } },
                "timeout": { "weight": 10, "duration": "10000ms" }
            }
        }
    }"#;

    fn config_error_key(err: AttenuatorError) -> String {
        match err {
            AttenuatorError::Config { key, .. } => key,
            other => panic!("expected a Config error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sample_builds() {
        let config = GatewayConfig::from_json_str(SAMPLE).unwrap();
        let gateway = config.build().unwrap();

        assert!(gateway.attenuator("SEARCH").is_some());
        assert!(gateway.attenuator("unlimited").unwrap().pulse().is_none());
        assert!(gateway.traffic_lights().get("backoff").is_some());
        assert!(gateway.traffic_lights().get("open").unwrap().is_always_green());
        assert_eq!(gateway.broker().services(), vec!["search"]);
        assert_eq!(gateway.pathologies().names(), vec!["simple"]);
        assert_eq!(gateway.circuit_breaker_config().retries, 4);

        let google = gateway.broker().choose_backend("search", &["google"]).unwrap();
        assert_eq!(google.headers(), &[("X-Api-Key".to_string(), "k".to_string())]);
        gateway.shutdown();
    }

    #[test]
    fn test_defaults_for_missing_sections() {
        let config = GatewayConfig::from_json_str("{}").unwrap();
        assert!(config.attenuators.is_empty());
        assert_eq!(config.circuit_breaker.retries, DEFAULT_CIRCUIT_BREAKER_RETRIES);
        assert_eq!(
            config.circuit_breaker.timeout_millis,
            DEFAULT_CIRCUIT_BREAKER_TIMEOUT_MILLIS
        );
        assert_eq!(config.circuit_breaker.traffic_light, DEFAULT_TRAFFIC_LIGHT);
    }

    #[test]
    fn test_malformed_json() {
        let err = GatewayConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, InitializationError::ConfigFileError(_)));
    }

    #[tokio::test]
    async fn test_zero_inflight_rejected() {
        let config = GatewayConfig::from_json_str(
            r#"{ "attenuators": { "search": { "max_hertz": 1.0, "max_inflight": 0 } } }"#,
        )
        .unwrap();
        let err = config.build().unwrap_err();
        assert_eq!(config_error_key(err), "attenuators.search.max_inflight");
    }

    #[tokio::test]
    async fn test_duplicate_pulse_rejected() {
        let config = GatewayConfig::from_json_str(
            r#"{ "attenuators": {
                "Search": { "max_hertz": 1.0 },
                "search": { "max_hertz": 2.0 }
            } }"#,
        )
        .unwrap();
        let err = config.build().unwrap_err();
        assert_eq!(config_error_key(err), "attenuators.search");
    }

    #[tokio::test]
    async fn test_unknown_rule_rejected() {
        let config = GatewayConfig::from_json_str(
            r#"{ "upstreams": { "search": { "rule": "round-robin",
                 "backends": { "a": { "url": "http://a" } } } } }"#,
        )
        .unwrap();
        let err = config.build().unwrap_err();
        assert_eq!(config_error_key(err), "upstreams.search.rule");
    }

    #[tokio::test]
    async fn test_bad_url_rejected() {
        let config = GatewayConfig::from_json_str(
            r#"{ "upstreams": { "search": { "backends": { "a": { "url": "not a url" } } } } }"#,
        )
        .unwrap();
        let err = config.build().unwrap_err();
        assert_eq!(config_error_key(err), "upstreams.search.backends.a.url");
    }

    #[tokio::test]
    async fn test_zero_weights_rejected() {
        let config = GatewayConfig::from_json_str(
            r#"{ "upstreams": { "search": { "rule": "weighted",
                 "backends": { "a": { "url": "http://a", "weight": 0 } } } } }"#,
        )
        .unwrap();
        let err = config.build().unwrap_err();
        assert_eq!(config_error_key(err), "upstreams.search.backends");
    }

    #[tokio::test]
    async fn test_malformed_duration_rejected() {
        let config = GatewayConfig::from_json_str(
            r#"{ "pathologies": { "simple": {
                "timeout": { "weight": 1, "duration": "forever" } } } }"#,
        )
        .unwrap();
        let err = config.build().unwrap_err();
        assert_eq!(config_error_key(err), "pathologies.simple.timeout.duration");
    }

    #[tokio::test]
    async fn test_unknown_failure_mode_rejected() {
        let config = GatewayConfig::from_json_str(
            r#"{ "pathologies": { "simple": { "brownout": { "weight": 1 } } } }"#,
        )
        .unwrap();
        let err = config.build().unwrap_err();
        assert_eq!(config_error_key(err), "pathologies.simple.brownout");
    }

    #[tokio::test]
    async fn test_unknown_traffic_light_target_rejected() {
        let config =
            GatewayConfig::from_json_str(r#"{ "traffic_lights": { "backoff": "nope" } }"#).unwrap();
        let err = config.build().unwrap_err();
        assert_eq!(config_error_key(err), "traffic_lights.backoff");
    }

    #[tokio::test]
    async fn test_zero_timeout_rejected() {
        let config =
            GatewayConfig::from_json_str(r#"{ "circuit_breaker": { "timeout_millis": 0 } }"#)
                .unwrap();
        let err = config.build().unwrap_err();
        assert_eq!(config_error_key(err), "circuit_breaker.timeout_millis");
    }

    #[tokio::test]
    async fn test_transient_class_must_exist() {
        let config = GatewayConfig::from_json_str(
            r#"{ "circuit_breaker": {
                "error_classes": { "refused": "connection refused" },
                "transient": ["refused", "timeouts"] } }"#,
        )
        .unwrap();
        let err = config.build().unwrap_err();
        assert_eq!(config_error_key(err), "circuit_breaker.transient");
    }

    #[tokio::test]
    async fn test_rate_too_small_for_a_period_rejected() {
        let config = GatewayConfig::from_json_str(
            r#"{ "attenuators": { "trickle": { "max_hertz": 1e-20, "max_inflight": 1 } } }"#,
        )
        .unwrap();
        let err = config.build().unwrap_err();
        assert_eq!(config_error_key(err), "attenuators.trickle.max_hertz");

        let store: Arc<dyn SharedStore> = Arc::new(InMemoryStore::new());
        let distributed = GatewayConfig::from_json_str(
            r#"{ "attenuators": { "trickle": { "max_hertz": 1e-20, "distributed": true } } }"#,
        )
        .unwrap();
        let err = distributed.build_with(noop_sink(), Some(store)).unwrap_err();
        assert_eq!(config_error_key(err), "attenuators.trickle.max_hertz");
    }

    #[tokio::test]
    async fn test_distributed_needs_store() {
        let config = GatewayConfig::from_json_str(
            r#"{ "attenuators": { "shared": { "max_hertz": 2.0, "distributed": true } } }"#,
        )
        .unwrap();
        let err = config.build().unwrap_err();
        assert_eq!(config_error_key(err), "attenuators.shared.distributed");

        let store: Arc<dyn SharedStore> = Arc::new(InMemoryStore::new());
        let gateway = config.build_with(noop_sink(), Some(store)).unwrap();
        assert!(gateway.attenuator("shared").unwrap().pulse().is_some());
        gateway.shutdown();
    }

    #[test]
    fn test_non_string_body_kept_as_json_text() {
        let cfg: ResponseConfig =
            serde_json::from_str(r#"{ "weight": 1, "body": { "success": true } }"#).unwrap();
        let mode = build_failure_mode(
            "pathologies.p",
            "httpcode",
            &FailureModeConfig {
                weight: 1,
                responses: BTreeMap::from([("200".to_string(), cfg)]),
                duration: None,
            },
        )
        .unwrap();
        assert_eq!(mode.plan().body.as_deref(), Some(r#"{"success":true}"#));
    }
}
