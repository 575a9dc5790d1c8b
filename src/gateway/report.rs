//! Selection report: how traffic and faults would be spread.

use std::fmt;

use rand::Rng;

use super::Gateway;
use crate::selection::{Named, Weighted};

/// Observed frequencies for one weighted set.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    /// Upstream or pathology name.
    pub name: String,
    /// Draws made.
    pub draws: usize,
    /// `(choice, configured share, times chosen)` in configuration order.
    pub choices: Vec<(String, f64, usize)>,
    /// Draws that produced nothing.
    pub misses: usize,
}

impl Distribution {
    /// Observed share of `choice`, in `[0, 1]`.
    pub fn observed(&self, choice: &str) -> Option<f64> {
        if self.draws == 0 {
            return None;
        }
        self.choices
            .iter()
            .find(|(name, _, _)| name == choice)
            .map(|(_, _, count)| *count as f64 / self.draws as f64)
    }
}

/// Per-upstream and per-pathology distributions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionReport {
    /// Backend choices by service.
    pub upstreams: Vec<Distribution>,
    /// Failure-mode choices by pathology.
    pub pathologies: Vec<Distribution>,
}

impl SelectionReport {
    /// True if no upstream or pathology was reported on.
    pub fn is_empty(&self) -> bool {
        self.upstreams.is_empty() && self.pathologies.is_empty()
    }
}

fn shares<'a, T, I>(items: I) -> Vec<(String, f64, usize)>
where
    T: Weighted + Named + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut previous = 0.0;
    items
        .into_iter()
        .map(|item| {
            let share = item.cdf() - previous;
            previous = item.cdf();
            (item.name().to_string(), share, 0)
        })
        .collect()
}

fn tally(choices: &mut [(String, f64, usize)], chosen: &str) {
    if let Some(entry) = choices.iter_mut().find(|(name, _, _)| name == chosen) {
        entry.2 += 1;
    }
}

impl Gateway {
    /// Draws `draws` times from every upstream and pathology (or just the named ones).
    pub fn selection_report(
        &self,
        draws: usize,
        service: Option<&str>,
        pathology: Option<&str>,
    ) -> SelectionReport {
        self.selection_report_with(draws, service, pathology, &mut rand::rng())
    }

    /// Same as [`Gateway::selection_report`] with an explicit RNG.
    pub fn selection_report_with<R: Rng + ?Sized>(
        &self,
        draws: usize,
        service: Option<&str>,
        pathology: Option<&str>,
        rng: &mut R,
    ) -> SelectionReport {
        let mut report = SelectionReport::default();
        let no_preference: [&str; 0] = [];

        for name in self.broker.services() {
            if service.is_some_and(|wanted| !wanted.eq_ignore_ascii_case(name)) {
                continue;
            }
            let Some(upstream) = self.broker.upstream(name) else {
                continue;
            };
            let mut distribution = Distribution {
                name: name.to_string(),
                draws,
                choices: shares(upstream.backends()),
                misses: 0,
            };
            for _ in 0..draws {
                match self.broker.choose_backend_with(name, &no_preference, rng) {
                    Some(backend) => tally(&mut distribution.choices, backend.label()),
                    None => distribution.misses += 1,
                }
            }
            report.upstreams.push(distribution);
        }

        for name in self.pathologies.names() {
            if pathology.is_some_and(|wanted| !wanted.eq_ignore_ascii_case(name)) {
                continue;
            }
            let Some(found) = self.pathologies.get(name) else {
                continue;
            };
            let mut distribution = Distribution {
                name: name.to_string(),
                draws,
                choices: shares(found.modes()),
                misses: 0,
            };
            for _ in 0..draws {
                match self.pathologies.choose_failure_mode_with(name, rng) {
                    Some(mode) => tally(&mut distribution.choices, mode.name()),
                    None => distribution.misses += 1,
                }
            }
            report.pathologies.push(distribution);
        }

        report
    }
}

fn write_distribution(f: &mut fmt::Formatter<'_>, d: &Distribution) -> fmt::Result {
    writeln!(f, "  {} ({} draws)", d.name, d.draws)?;
    for (choice, share, count) in &d.choices {
        let observed = if d.draws == 0 {
            0.0
        } else {
            *count as f64 / d.draws as f64
        };
        writeln!(
            f,
            "    {:<16} configured {:>6.2}%  observed {:>6.2}%",
            choice,
            share * 100.0,
            observed * 100.0
        )?;
    }
    if d.misses > 0 {
        writeln!(f, "    {} draw(s) found nothing routable", d.misses)?;
    }
    Ok(())
}

impl fmt::Display for SelectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.upstreams.is_empty() {
            writeln!(f, "Upstreams:")?;
            for d in &self.upstreams {
                write_distribution(f, d)?;
            }
        }
        if !self.pathologies.is_empty() {
            writeln!(f, "Pathologies:")?;
            for d in &self.pathologies {
                write_distribution(f, d)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::GatewayConfig;
    use super::*;
    use crate::broker::BackendState;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const CONFIG: &str = r#"{
        "upstreams": {
            "search": { "rule": "weighted", "backends": {
                "a": { "url": "http://a", "weight": 75 },
                "b": { "url": "http://b", "weight": 25 } } },
            "images": { "backends": { "c": { "url": "http://c" } } }
        },
        "pathologies": {
            "simple": {
                "httpcode": { "weight": 90, "responses": { "500": { "weight": 1 } } },
                "timeout": { "weight": 10, "duration": "1000ms" }
            }
        }
    }"#;

    #[tokio::test]
    async fn test_report_frequencies() {
        let gateway = GatewayConfig::from_json_str(CONFIG).unwrap().build().unwrap();
        let mut rng = StdRng::seed_from_u64(99);
        let report = gateway.selection_report_with(4_000, None, None, &mut rng);

        assert_eq!(report.upstreams.len(), 2);
        let search = report.upstreams.iter().find(|d| d.name == "search").unwrap();
        let a = search.observed("a").unwrap();
        assert!((0.72..=0.78).contains(&a), "a={}", a);
        assert!((search.choices[0].1 - 0.75).abs() < 1e-9);

        let simple = &report.pathologies[0];
        let httpcode = simple.observed("httpcode").unwrap();
        assert!((0.87..=0.93).contains(&httpcode), "httpcode={}", httpcode);

        let text = report.to_string();
        assert!(text.contains("Upstreams:"));
        assert!(text.contains("Pathologies:"));
    }

    #[tokio::test]
    async fn test_report_filters() {
        let gateway = GatewayConfig::from_json_str(CONFIG).unwrap().build().unwrap();
        let report = gateway.selection_report(10, Some("IMAGES"), Some("none"));
        assert_eq!(report.upstreams.len(), 1);
        assert_eq!(report.upstreams[0].name, "images");
        assert!(report.pathologies.is_empty());

        let report = gateway.selection_report(10, Some("none"), Some("none"));
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn test_report_counts_misses() {
        let gateway = GatewayConfig::from_json_str(CONFIG).unwrap().build().unwrap();
        gateway.broker().set_backend_state("images", "c", BackendState::Disabled);
        let report = gateway.selection_report(50, Some("images"), Some("none"));
        assert_eq!(report.upstreams[0].misses, 50);
    }
}
