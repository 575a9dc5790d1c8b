//! Duration specs.
//!
//! A tiny grammar for injected latency and jitter:
//!
//! - `5000ms`, `10s`, `2m`: a constant delay
//! - `uniform(5s)`: a delay drawn uniformly from `[0, 5s]`
//! - `normal(10.0, 1.0)`: a delay drawn from a normal distribution whose mean
//!   and standard deviation are given in seconds
//!
//! Only the distribution parameters are stored at parse time. Every call to
//! [`DurationSpec::sample`] draws a fresh value.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use rand::Rng;
use regex::Regex;

use crate::error_handling::AttenuatorError;

/// Compiles a built-in pattern; a failure here is a programming error.
fn compile_regex_unsafe(pattern: &str, context: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| {
        panic!(
            "Failed to compile regex pattern '{}' in {}: {}. This is a programming error.",
            pattern, context, e
        )
    })
}

static RE_CONSTANT: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex_unsafe(r"^(?P<value>-?[0-9]+)(?P<units>[a-z]+)$", "constant duration")
});

static RE_UNIFORM: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex_unsafe(
        r"^uniform\(\s*(?P<value>-?[0-9]+)(?P<units>[a-z]+)\s*\)$",
        "uniform duration",
    )
});

static RE_NORMAL: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex_unsafe(
        r"^normal\(\s*(?P<mean>-?[0-9]+(?:\.[0-9]+)?)\s*,\s*(?P<stddev>-?[0-9]+(?:\.[0-9]+)?)\s*\)$",
        "normal duration",
    )
});

/// A parsed duration distribution.
#[derive(Debug, Clone, PartialEq)]
pub enum DurationSpec {
    /// Always the same delay.
    Constant(Duration),
    /// Uniform over `[0, upper]`.
    Uniform {
        /// Inclusive upper bound.
        upper: Duration,
    },
    /// Normal distribution, parameters in seconds. Non-positive draws clamp to zero.
    Normal {
        /// Mean, in seconds.
        mean_secs: f64,
        /// Standard deviation, in seconds.
        stddev_secs: f64,
    },
}

impl DurationSpec {
    /// Draws a delay using the thread-local RNG.
    pub fn sample(&self) -> Duration {
        self.sample_with(&mut rand::rng())
    }

    /// Draws a delay using the given RNG.
    pub fn sample_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        match self {
            DurationSpec::Constant(d) => *d,
            DurationSpec::Uniform { upper } => {
                let upper_ms = u64::try_from(upper.as_millis()).unwrap_or(u64::MAX);
                Duration::from_millis(rng.random_range(0..=upper_ms))
            }
            DurationSpec::Normal {
                mean_secs,
                stddev_secs,
            } => {
                let secs = mean_secs + stddev_secs * standard_normal(rng);
                if secs.is_finite() && secs > 0.0 {
                    // a draw far in the tail can still exceed what a Duration holds
                    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
                } else {
                    Duration::ZERO
                }
            }
        }
    }

    /// Returns true if every sample is the same value.
    pub fn is_constant(&self) -> bool {
        matches!(self, DurationSpec::Constant(_))
    }
}

/// Box-Muller transform.
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // u1 in (0, 1] keeps ln() finite
    let u1 = 1.0 - rng.random::<f64>();
    let u2 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn invalid(input: &str, reason: impl Into<String>) -> AttenuatorError {
    AttenuatorError::InvalidDuration {
        input: input.to_string(),
        reason: reason.into(),
    }
}

fn to_millis(input: &str, value: &str, units: &str) -> Result<u64, AttenuatorError> {
    let value: i64 = value
        .parse()
        .map_err(|_| invalid(input, format!("invalid value: {}", value)))?;
    if value <= 0 {
        return Err(invalid(input, "value must be positive"));
    }
    let multiplier: u64 = match units {
        "ms" => 1,
        "s" => 1000,
        "m" => 60 * 1000,
        other => return Err(invalid(input, format!("unknown units: '{}'", other))),
    };
    (value as u64)
        .checked_mul(multiplier)
        .ok_or_else(|| invalid(input, "value out of range"))
}

fn parse_seconds(input: &str, what: &str, value: &str) -> Result<f64, AttenuatorError> {
    let parsed: f64 = value
        .parse()
        .map_err(|_| invalid(input, format!("invalid {}: {}", what, value)))?;
    if !parsed.is_finite() || parsed <= 0.0 {
        return Err(invalid(input, format!("{} must be positive", what)));
    }
    if Duration::try_from_secs_f64(parsed).is_err() {
        return Err(invalid(input, format!("{} out of range", what)));
    }
    Ok(parsed)
}

impl FromStr for DurationSpec {
    type Err = AttenuatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let lowered = trimmed.to_ascii_lowercase();

        if let Some(caps) = RE_CONSTANT.captures(&lowered) {
            let millis = to_millis(trimmed, &caps["value"], &caps["units"])?;
            return Ok(DurationSpec::Constant(Duration::from_millis(millis)));
        }

        if let Some(caps) = RE_UNIFORM.captures(&lowered) {
            let millis = to_millis(trimmed, &caps["value"], &caps["units"])?;
            return Ok(DurationSpec::Uniform {
                upper: Duration::from_millis(millis),
            });
        }

        if let Some(caps) = RE_NORMAL.captures(&lowered) {
            let mean_secs = parse_seconds(trimmed, "mean", &caps["mean"])?;
            let stddev_secs = parse_seconds(trimmed, "stddev", &caps["stddev"])?;
            return Ok(DurationSpec::Normal {
                mean_secs,
                stddev_secs,
            });
        }

        if lowered.starts_with("normal(") {
            return Err(invalid(
                trimmed,
                "invalid normal distribution (must be `normal(mean, stddev)`)",
            ));
        }
        Err(invalid(trimmed, "invalid duration"))
    }
}

impl fmt::Display for DurationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DurationSpec::Constant(d) => write!(f, "{}ms", d.as_millis()),
            DurationSpec::Uniform { upper } => write!(f, "uniform({}ms)", upper.as_millis()),
            DurationSpec::Normal {
                mean_secs,
                stddev_secs,
            } => write!(f, "normal({:?}, {:?})", mean_secs, stddev_secs),
        }
    }
}
