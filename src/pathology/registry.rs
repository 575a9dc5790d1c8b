//! Named pathologies.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;

use super::failure_mode::FailureMode;
use crate::error_handling::AttenuatorError;
use crate::metrics::{noop_sink, GatewayEvent, MetricsSink};
use crate::selection::{SelectionRule, WeightedSet};

/// A named, weighted set of failure modes.
#[derive(Debug, Clone)]
pub struct Pathology {
    name: String,
    modes: WeightedSet<FailureMode>,
}

impl Pathology {
    /// Backpatches `modes` and wraps them.
    ///
    /// # Errors
    ///
    /// Fails for an empty mode list or when every weight is zero.
    pub fn new(name: impl Into<String>, modes: Vec<FailureMode>) -> Result<Self, AttenuatorError> {
        let name = name.into();
        let key = format!("pathologies.{}", name);
        if modes.is_empty() {
            return Err(AttenuatorError::config(key, "has no failure modes"));
        }
        let modes = WeightedSet::new(key, modes)?;
        Ok(Pathology { name, modes })
    }

    /// Pathology name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Failure modes in configuration order.
    pub fn modes(&self) -> &WeightedSet<FailureMode> {
        &self.modes
    }

    /// Draws a failure mode from the CDF.
    pub fn choose_failure_mode_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&FailureMode> {
        self.modes.choose_by_rule(SelectionRule::Weighted, rng)
    }
}

/// Pathologies keyed by lowercased name.
pub struct PathologyRegistry {
    pathologies: HashMap<String, Pathology>,
    sink: Arc<dyn MetricsSink>,
}

impl Default for PathologyRegistry {
    fn default() -> Self {
        Self::new(noop_sink())
    }
}

impl PathologyRegistry {
    /// Creates an empty registry.
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        PathologyRegistry {
            pathologies: HashMap::new(),
            sink,
        }
    }

    /// Adds or replaces a pathology.
    pub fn insert(&mut self, pathology: Pathology) {
        self.pathologies
            .insert(pathology.name().to_lowercase(), pathology);
    }

    /// Looks a pathology up (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&Pathology> {
        self.pathologies.get(&name.to_lowercase())
    }

    /// Pathology names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.pathologies.values().map(|p| p.name()).collect();
        names.sort_unstable();
        names
    }

    /// Draws a failure mode for `pathology` using the thread-local RNG.
    pub fn choose_failure_mode(&self, pathology: &str) -> Option<&FailureMode> {
        self.choose_failure_mode_with(pathology, &mut rand::rng())
    }

    /// Draws a failure mode for `pathology`. `None` if the pathology is unknown.
    pub fn choose_failure_mode_with<R: Rng + ?Sized>(
        &self,
        pathology: &str,
        rng: &mut R,
    ) -> Option<&FailureMode> {
        match self
            .get(pathology)
            .and_then(|p| p.choose_failure_mode_with(rng))
        {
            Some(mode) => {
                self.sink.record(GatewayEvent::CdfChoice, pathology);
                Some(mode)
            }
            None => {
                log::warn!("No failure mode available for pathology '{}'", pathology);
                self.sink.record(GatewayEvent::SelectionMiss, pathology);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::CounterSink;
    use crate::pathology::HttpResponseSpec;
    use crate::selection::{Named, Weighted};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn simple() -> Pathology {
        Pathology::new(
            "simple",
            vec![
                FailureMode::http_code(
                    "httpcode",
                    90,
                    vec![HttpResponseSpec::new(200, 80), HttpResponseSpec::new(500, 20)],
                )
                .unwrap(),
                FailureMode::timeout("timeout", 10, "10000ms".parse().unwrap()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_failure_mode_cdf() {
        let pathology = simple();
        let modes = pathology.modes().items();
        assert_eq!(modes.len(), 2);
        assert_eq!(modes[0].name(), "httpcode");
        assert_eq!(modes[0].weight(), 90);
        assert!((modes[0].cdf() - 0.9).abs() < 1e-9);
        assert_eq!(modes[1].name(), "timeout");
        assert_eq!(modes[1].weight(), 10);
        assert_eq!(modes[1].cdf(), 1.0);
    }

    #[test]
    fn test_choose_failure_mode_frequencies() {
        let mut registry = PathologyRegistry::default();
        registry.insert(simple());

        let mut rng = StdRng::seed_from_u64(7);
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..1_000 {
            let mode = registry
                .choose_failure_mode_with("Simple", &mut rng)
                .unwrap();
            *counts.entry(mode.name().to_string()).or_default() += 1;
        }
        let httpcode = counts["httpcode"];
        assert!((850..=950).contains(&httpcode), "httpcode={}", httpcode);
        assert_eq!(httpcode + counts["timeout"], 1_000);
    }

    #[test]
    fn test_unknown_pathology_is_a_miss() {
        let sink = Arc::new(CounterSink::new());
        let registry = PathologyRegistry::new(sink.clone());
        assert!(registry.choose_failure_mode("missing").is_none());
        assert_eq!(sink.count(GatewayEvent::SelectionMiss), 1);
    }

    #[test]
    fn test_empty_pathology_rejected() {
        let err = Pathology::new("empty", Vec::new()).unwrap_err();
        assert!(err.to_string().contains("pathologies.empty"));
    }
}
