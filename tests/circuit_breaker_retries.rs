//! Retry, backoff and budget behaviour of the circuit breaker.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use http_attenuator::circuit_breaker::{Headers, HttpTransport, TransportResponse};
use http_attenuator::error_handling::ErrorClassifier;
use http_attenuator::metrics::{CounterSink, GatewayEvent, MetricsSink};
use http_attenuator::{
    Attenuator, AttenuatorError, CircuitBreaker, PulseRegistry, TrafficLightRegistry,
    TransportError,
};

const RESET: &str = "error sending request: connection reset by peer";

/// Replays scripted results, then fails.
struct Script {
    steps: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
    calls: AtomicU32,
    bodies: Mutex<Vec<Vec<u8>>>,
}

impl Script {
    fn new(steps: Vec<Result<TransportResponse, TransportError>>) -> Arc<Self> {
        Arc::new(Script {
            steps: Mutex::new(steps.into()),
            calls: AtomicU32::new(0),
            bodies: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> Result<TransportResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::new("script exhausted")))
    }
}

#[async_trait]
impl HttpTransport for Script {
    async fn get(&self, _url: &str, _headers: &Headers) -> Result<TransportResponse, TransportError> {
        self.next()
    }

    async fn post(
        &self,
        _url: &str,
        body: &[u8],
        _headers: &Headers,
    ) -> Result<TransportResponse, TransportError> {
        self.bodies.lock().unwrap().push(body.to_vec());
        self.next()
    }
}

fn reset() -> Result<TransportResponse, TransportError> {
    Err(TransportError::new(RESET))
}

fn ok(body: &str) -> Result<TransportResponse, TransportError> {
    Ok(TransportResponse::new(200, body))
}

#[tokio::test]
async fn test_two_resets_then_success() {
    let counters = Arc::new(CounterSink::new());
    let sink: Arc<dyn MetricsSink> = counters.clone();
    let script = Script::new(vec![reset(), reset(), ok("done")]);
    let breaker = CircuitBreaker::builder()
        .retries(3)
        .sink(sink)
        .build(script.clone())
        .unwrap();

    let outcome = breaker.get("http://backend/search", &Vec::new()).await.unwrap();
    assert_eq!(outcome.response.body, b"done".to_vec());
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.backoffs, 2);
    assert_eq!(script.calls(), 3);
    assert_eq!(counters.count(GatewayEvent::Retry), 2);
}

#[tokio::test]
async fn test_resets_on_every_attempt_exhaust_the_budget() {
    let counters = Arc::new(CounterSink::new());
    let sink: Arc<dyn MetricsSink> = counters.clone();
    let script = Script::new(vec![reset(), reset(), reset(), ok("too late")]);
    let breaker = CircuitBreaker::builder()
        .retries(3)
        .sink(sink)
        .build(script.clone())
        .unwrap();

    let err = breaker
        .get("http://backend/search", &Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AttenuatorError::TooManyRetries { retries: 3 }));
    assert_eq!(script.calls(), 3);
    assert_eq!(counters.count(GatewayEvent::RetryBudgetExhausted), 1);
}

#[tokio::test]
async fn test_unknown_errors_are_terminal() {
    let script = Script::new(vec![Err(TransportError::new("tls handshake failed")), ok("never")]);
    let breaker = CircuitBreaker::builder().retries(5).build(script.clone()).unwrap();

    let err = breaker.get("http://backend/", &Vec::new()).await.unwrap_err();
    assert!(matches!(err, AttenuatorError::Transport(_)));
    assert_eq!(err.upstream_status(), 502);
    assert_eq!(script.calls(), 1);
}

#[tokio::test]
async fn test_please_retry_body_is_retried() {
    let script = Script::new(vec![
        ok(r#"{"error": "busy, please retry"}"#),
        ok(r#"{"result": 42}"#),
    ]);
    let breaker = CircuitBreaker::builder().retries(3).build(script.clone()).unwrap();

    let outcome = breaker
        .post("http://backend/jobs", b"payload", &Vec::new())
        .await
        .unwrap();
    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.backoffs, 1);
    // the body is resent on every attempt
    assert_eq!(script.bodies.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_custom_error_classes_can_be_transient() {
    let classifier = ErrorClassifier::new()
        .with_class("refused", "(?i)connection refused")
        .unwrap()
        .mark_transient("refused");
    let script = Script::new(vec![
        Err(TransportError::new("tcp connect error: Connection refused")),
        ok("up"),
    ]);
    let breaker = CircuitBreaker::builder()
        .retries(2)
        .classifier(classifier)
        .build(script.clone())
        .unwrap();

    let outcome = breaker.get("http://backend/", &Vec::new()).await.unwrap();
    assert_eq!(outcome.attempts, 2);
}

#[tokio::test]
async fn test_backoff_waits_on_the_configured_traffic_light() {
    let pulses = PulseRegistry::default();
    let attenuator = Attenuator::new("backoff", 5.0, 1, &pulses, Arc::new(CounterSink::new())).unwrap();
    let lights = Arc::new(TrafficLightRegistry::new());
    lights.register(attenuator.traffic_light());

    let script = Script::new(vec![reset(), reset(), ok("done")]);
    let breaker = CircuitBreaker::builder()
        .retries(3)
        .traffic_light("backoff")
        .traffic_lights(Arc::clone(&lights))
        .build(script)
        .unwrap();

    let start = Instant::now();
    let outcome = breaker.get("http://backend/", &Vec::new()).await.unwrap();
    // two backoffs at 5Hz
    let elapsed = start.elapsed();
    assert_eq!(outcome.backoffs, 2);
    assert!(elapsed >= Duration::from_millis(320), "took {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1_000), "took {:?}", elapsed);
    pulses.shutdown_all();
}

#[tokio::test]
async fn test_hanging_backend_hits_the_attempt_timeout() {
    struct Hang;

    #[async_trait]
    impl HttpTransport for Hang {
        async fn get(&self, _url: &str, _h: &Headers) -> Result<TransportResponse, TransportError> {
            std::future::pending().await
        }
        async fn post(
            &self,
            _url: &str,
            _b: &[u8],
            _h: &Headers,
        ) -> Result<TransportResponse, TransportError> {
            std::future::pending().await
        }
    }

    let breaker = CircuitBreaker::builder()
        .retries(3)
        .timeout_millis(100)
        .build(Arc::new(Hang))
        .unwrap();

    let start = Instant::now();
    let err = breaker.get("http://backend/", &Vec::new()).await.unwrap_err();
    assert!(matches!(err, AttenuatorError::Transport(_)));
    // a timeout is terminal: one attempt only
    assert!(start.elapsed() < Duration::from_millis(500));
}
