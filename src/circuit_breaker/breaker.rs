//! Retrying outbound calls.
//!
//! Each attempt is one transport call under a per-attempt timeout. A failure is
//! either transient (the classifier recognises it, or the response asks for a
//! retry) or terminal. Transient failures back off on a traffic light and try
//! again until the retry budget runs out.

use std::sync::Arc;
use std::time::Duration;

use super::success::{judge, SuccessPredicate};
use super::transport::{Headers, HttpTransport, TransportResponse};
use crate::config::{
    DEFAULT_CIRCUIT_BREAKER_RETRIES, DEFAULT_CIRCUIT_BREAKER_TIMEOUT_MILLIS, DEFAULT_TRAFFIC_LIGHT,
};
use crate::error_handling::{AttenuatorError, ErrorClassifier, TransportError};
use crate::metrics::{noop_sink, GatewayEvent, MetricsSink};
use crate::traffic_light::TrafficLightRegistry;

/// A successful call and how it got there.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    /// The accepted response.
    pub response: TransportResponse,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Traffic-light waits between attempts.
    pub backoffs: u32,
}

enum Request<'a> {
    Get {
        url: &'a str,
        headers: &'a Headers,
    },
    Post {
        url: &'a str,
        body: &'a [u8],
        headers: &'a Headers,
    },
}

impl Request<'_> {
    fn url(&self) -> &str {
        match self {
            Request::Get { url, .. } | Request::Post { url, .. } => *url,
        }
    }
}

/// Outcome of one attempt that did not end the call.
enum Transient {
    Error(TransportError),
    Response(TransportResponse),
}

/// Builder for [`CircuitBreaker`].
pub struct CircuitBreakerBuilder {
    retries: u32,
    timeout_millis: u64,
    traffic_light: String,
    traffic_lights: Option<Arc<TrafficLightRegistry>>,
    success: Vec<SuccessPredicate>,
    classifier: ErrorClassifier,
    sink: Arc<dyn MetricsSink>,
}

impl CircuitBreakerBuilder {
    /// Starts from the defaults: 3 attempts, 10s per attempt, the default
    /// (always green) traffic light, no success predicates.
    pub fn new() -> Self {
        CircuitBreakerBuilder {
            retries: DEFAULT_CIRCUIT_BREAKER_RETRIES,
            timeout_millis: DEFAULT_CIRCUIT_BREAKER_TIMEOUT_MILLIS,
            traffic_light: DEFAULT_TRAFFIC_LIGHT.to_string(),
            traffic_lights: None,
            success: Vec::new(),
            classifier: ErrorClassifier::default(),
            sink: noop_sink(),
        }
    }

    /// Total attempts, including the first. Values below 1 become 1.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Per-attempt timeout.
    pub fn timeout_millis(mut self, timeout_millis: u64) -> Self {
        self.timeout_millis = timeout_millis;
        self
    }

    /// Name of the traffic light to back off on.
    pub fn traffic_light(mut self, name: impl Into<String>) -> Self {
        self.traffic_light = name.into();
        self
    }

    /// Registry the traffic light is looked up in.
    pub fn traffic_lights(mut self, registry: Arc<TrafficLightRegistry>) -> Self {
        self.traffic_lights = Some(registry);
        self
    }

    /// Adds a success predicate.
    pub fn success<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&TransportResponse) -> (bool, bool) + Send + Sync + 'static,
    {
        self.success.push(Arc::new(predicate));
        self
    }

    /// Adds an already shared success predicate.
    pub fn success_shared(mut self, predicate: SuccessPredicate) -> Self {
        self.success.push(predicate);
        self
    }

    /// Replaces the error classifier.
    pub fn classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Metrics destination.
    pub fn sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Builds the breaker on `transport`.
    ///
    /// # Errors
    ///
    /// Returns `AttenuatorError::Config` if the per-attempt timeout is zero.
    pub fn build(self, transport: Arc<dyn HttpTransport>) -> Result<CircuitBreaker, AttenuatorError> {
        if self.timeout_millis == 0 {
            return Err(AttenuatorError::config(
                "circuit_breaker.timeout_millis",
                "must be greater than zero",
            ));
        }
        Ok(CircuitBreaker {
            retries: self.retries.max(1),
            timeout: Duration::from_millis(self.timeout_millis),
            traffic_light: self.traffic_light,
            traffic_lights: self
                .traffic_lights
                .unwrap_or_else(|| Arc::new(TrafficLightRegistry::new())),
            success: self.success,
            classifier: self.classifier,
            sink: self.sink,
            transport,
        })
    }
}

impl Default for CircuitBreakerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded-retry wrapper around an [`HttpTransport`].
pub struct CircuitBreaker {
    retries: u32,
    timeout: Duration,
    traffic_light: String,
    traffic_lights: Arc<TrafficLightRegistry>,
    success: Vec<SuccessPredicate>,
    classifier: ErrorClassifier,
    sink: Arc<dyn MetricsSink>,
    transport: Arc<dyn HttpTransport>,
}

impl CircuitBreaker {
    /// Starts a builder.
    pub fn builder() -> CircuitBreakerBuilder {
        CircuitBreakerBuilder::new()
    }

    /// Retry budget (total attempts).
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Performs a GET with retries.
    pub async fn get(&self, url: &str, headers: &Headers) -> Result<CallOutcome, AttenuatorError> {
        self.call(Request::Get { url, headers }).await
    }

    /// Performs a POST with retries. The body is resent on every attempt.
    pub async fn post(
        &self,
        url: &str,
        body: &[u8],
        headers: &Headers,
    ) -> Result<CallOutcome, AttenuatorError> {
        self.call(Request::Post { url, body, headers }).await
    }

    async fn send(&self, request: &Request<'_>) -> Result<TransportResponse, TransportError> {
        let call = async {
            match request {
                Request::Get { url, headers } => self.transport.get(url, headers).await,
                Request::Post { url, body, headers } => {
                    self.transport.post(url, body, headers).await
                }
            }
        };
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::new(format!(
                "request timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }

    fn terminal(&self, url: &str, error: AttenuatorError) -> AttenuatorError {
        log::warn!("{}: giving up: {}", url, error);
        self.sink.record(GatewayEvent::TerminalFailure, url);
        error
    }

    async fn call(&self, request: Request<'_>) -> Result<CallOutcome, AttenuatorError> {
        let url = request.url().to_string();
        let mut attempt: u32 = 0;
        let mut backoffs: u32 = 0;

        loop {
            attempt += 1;

            let transient = match self.send(&request).await {
                Err(e) if self.classifier.is_transient(&e) => Transient::Error(e),
                Err(e) => return Err(self.terminal(&url, AttenuatorError::Transport(e))),
                Ok(response) => {
                    let (success, retry) = judge(&self.success, &response);
                    if retry {
                        Transient::Response(response)
                    } else if success {
                        return Ok(CallOutcome {
                            response,
                            attempts: attempt,
                            backoffs,
                        });
                    } else {
                        let status = response.status;
                        return Err(
                            self.terminal(&url, AttenuatorError::UnsuccessfulResponse { status })
                        );
                    }
                }
            };

            if attempt >= self.retries {
                if self.retries > 1 {
                    log::warn!("{}: too many retries ({})", url, self.retries);
                    self.sink.record(GatewayEvent::RetryBudgetExhausted, &url);
                    return Err(AttenuatorError::TooManyRetries {
                        retries: self.retries,
                    });
                }
                // a single-shot breaker hands the transient result back as it came
                return match transient {
                    Transient::Error(e) => Err(self.terminal(&url, AttenuatorError::Transport(e))),
                    Transient::Response(response) => Ok(CallOutcome {
                        response,
                        attempts: attempt,
                        backoffs,
                    }),
                };
            }

            match &transient {
                Transient::Error(e) => {
                    log::info!("{}: attempt {} failed ({}), retrying", url, attempt, e)
                }
                Transient::Response(r) => log::info!(
                    "{}: attempt {} asked for a retry (status {})",
                    url,
                    attempt,
                    r.status
                ),
            }
            self.sink.record(GatewayEvent::Retry, &url);
            self.traffic_lights
                .wait_for_green(&self.traffic_light, attempt)
                .await?;
            backoffs += 1;
        }
    }
}
