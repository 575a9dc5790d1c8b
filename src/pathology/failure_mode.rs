//! Failure modes and the replies they plan.

use std::time::Duration;

use rand::Rng;

use crate::config::TIMEOUT_FAILURE_STATUS;
use crate::duration::DurationSpec;
use crate::error_handling::AttenuatorError;
use crate::selection::{Named, SelectionRule, Weighted, WeightedSet};

/// One weighted HTTP reply inside an `httpcode` failure mode.
#[derive(Debug, Clone)]
pub struct HttpResponseSpec {
    code: u16,
    label: String,
    weight: u32,
    cdf: f64,
    duration: Option<DurationSpec>,
    headers: Vec<(String, String)>,
    body: Option<String>,
}

impl HttpResponseSpec {
    /// A reply with `code`, no delay, no headers and no body.
    pub fn new(code: u16, weight: u32) -> Self {
        HttpResponseSpec {
            code,
            label: code.to_string(),
            weight,
            cdf: 0.0,
            duration: None,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Delays the reply by a sample of `duration`.
    pub fn with_duration(mut self, duration: DurationSpec) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Adds a reply header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the reply body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// HTTP status code.
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Delay distribution, if any.
    pub fn duration(&self) -> Option<&DurationSpec> {
        self.duration.as_ref()
    }

    fn plan_with<R: Rng + ?Sized>(&self, rng: &mut R) -> FaultPlan {
        FaultPlan {
            status: self.code,
            delay: self
                .duration
                .as_ref()
                .map(|d| d.sample_with(rng))
                .unwrap_or(Duration::ZERO),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

impl Weighted for HttpResponseSpec {
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

impl Named for HttpResponseSpec {
    fn name(&self) -> &str {
        &self.label
    }
}

/// What a failure mode does.
#[derive(Debug, Clone)]
pub enum FailureModeKind {
    /// Reply with one of several weighted HTTP responses.
    HttpCode(WeightedSet<HttpResponseSpec>),
    /// Hang for a sampled duration, then give up.
    Timeout(DurationSpec),
}

/// A weighted failure mode inside a pathology.
#[derive(Debug, Clone)]
pub struct FailureMode {
    name: String,
    weight: u32,
    cdf: f64,
    kind: FailureModeKind,
}

/// The reply a fault server should produce.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultPlan {
    /// Status code to send.
    pub status: u16,
    /// How long to wait before replying.
    pub delay: Duration,
    /// Headers to send.
    pub headers: Vec<(String, String)>,
    /// Body to send, if any.
    pub body: Option<String>,
}

impl FailureMode {
    /// An `httpcode` mode drawing from `responses`.
    ///
    /// # Errors
    ///
    /// Fails if `responses` is empty or all of its weights are zero.
    pub fn http_code(
        name: impl Into<String>,
        weight: u32,
        responses: Vec<HttpResponseSpec>,
    ) -> Result<Self, AttenuatorError> {
        let name = name.into();
        if responses.is_empty() {
            return Err(AttenuatorError::config(
                format!("{}.responses", name),
                "has no values",
            ));
        }
        let responses = WeightedSet::new(format!("{}.responses", name), responses)?;
        Ok(FailureMode {
            name,
            weight,
            cdf: 0.0,
            kind: FailureModeKind::HttpCode(responses),
        })
    }

    /// A `timeout` mode hanging for a sample of `duration`.
    pub fn timeout(name: impl Into<String>, weight: u32, duration: DurationSpec) -> Self {
        FailureMode {
            name: name.into(),
            weight,
            cdf: 0.0,
            kind: FailureModeKind::Timeout(duration),
        }
    }

    /// What this mode does.
    pub fn kind(&self) -> &FailureModeKind {
        &self.kind
    }

    /// Plans a reply using the thread-local RNG.
    pub fn plan(&self) -> FaultPlan {
        self.plan_with(&mut rand::rng())
    }

    /// Plans a reply. Delays are sampled fresh on every call.
    pub fn plan_with<R: Rng + ?Sized>(&self, rng: &mut R) -> FaultPlan {
        match &self.kind {
            FailureModeKind::HttpCode(responses) => {
                match responses.choose_by_rule(SelectionRule::Weighted, rng) {
                    Some(response) => response.plan_with(rng),
                    // constructor guarantees a non-empty set
                    None => FaultPlan {
                        status: 500,
                        delay: Duration::ZERO,
                        headers: Vec::new(),
                        body: None,
                    },
                }
            }
            FailureModeKind::Timeout(duration) => FaultPlan {
                status: TIMEOUT_FAILURE_STATUS,
                delay: duration.sample_with(rng),
                headers: Vec::new(),
                body: None,
            },
        }
    }
}

impl Weighted for FailureMode {
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

impl Named for FailureMode {
    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn responses() -> Vec<HttpResponseSpec> {
        vec![
            HttpResponseSpec::new(200, 80)
                .with_header("Content-Type", "application/json")
                .with_body(r#"{"success": true}"#),
            HttpResponseSpec::new(401, 5),
            HttpResponseSpec::new(404, 1),
            HttpResponseSpec::new(429, 5).with_header("X-Backoff-Millis", "60000"),
            HttpResponseSpec::new(500, 9),
        ]
    }

    #[test]
    fn test_http_code_distribution() {
        let mode = FailureMode::http_code("httpcode", 90, responses()).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts: HashMap<u16, usize> = HashMap::new();
        for _ in 0..10_000 {
            *counts.entry(mode.plan_with(&mut rng).status).or_default() += 1;
        }
        let ok = counts[&200] as f64 / 10_000.0;
        assert!((0.77..=0.83).contains(&ok), "200 ratio {}", ok);
        assert!(counts[&404] < counts[&401]);
    }

    #[test]
    fn test_plan_carries_headers_and_body() {
        let mode = FailureMode::http_code(
            "httpcode",
            1,
            vec![HttpResponseSpec::new(429, 1).with_header("X-Backoff-Millis", "60000")],
        )
        .unwrap();
        let plan = mode.plan();
        assert_eq!(plan.status, 429);
        assert_eq!(plan.delay, Duration::ZERO);
        assert_eq!(
            plan.headers,
            vec![("X-Backoff-Millis".to_string(), "60000".to_string())]
        );
        assert_eq!(plan.body, None);
    }

    #[test]
    fn test_delay_is_sampled_per_call() {
        let mode = FailureMode::http_code(
            "httpcode",
            1,
            vec![HttpResponseSpec::new(200, 1).with_duration("uniform(1000ms)".parse().unwrap())],
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let delays: Vec<Duration> = (0..20).map(|_| mode.plan_with(&mut rng).delay).collect();
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(1000)));
        assert!(delays.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn test_timeout_mode_plans_gateway_timeout() {
        let mode = FailureMode::timeout("timeout", 10, "250ms".parse().unwrap());
        let plan = mode.plan();
        assert_eq!(plan.status, 504);
        assert_eq!(plan.delay, Duration::from_millis(250));
    }

    #[test]
    fn test_http_code_rejects_empty_responses() {
        let err = FailureMode::http_code("httpcode", 1, Vec::new()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_response_named_by_code() {
        assert_eq!(HttpResponseSpec::new(503, 1).name(), "503");
    }
}
