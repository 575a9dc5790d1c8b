//! Selection rules.

use std::fmt;
use std::str::FromStr;

use crate::error_handling::AttenuatorError;

/// How an item is drawn from a weighted set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionRule {
    /// Draw along the CDF built from the configured weights.
    Weighted,
    /// Uniform pick, ignoring weights.
    #[default]
    Uniform,
}

impl SelectionRule {
    /// Lenient parse for free-form input: anything unrecognised is `Uniform`.
    pub fn from_name(name: &str) -> Self {
        match name.parse() {
            Ok(rule) => rule,
            Err(_) => {
                log::warn!(
                    "Unknown selection rule '{}', falling back to uniform",
                    name
                );
                SelectionRule::Uniform
            }
        }
    }

    /// Canonical name of the rule.
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionRule::Weighted => "weighted",
            SelectionRule::Uniform => "uniform",
        }
    }
}

impl FromStr for SelectionRule {
    type Err = AttenuatorError;

    /// Strict parse: `weighted`, `uniform`, `random` or empty (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weighted" => Ok(SelectionRule::Weighted),
            "uniform" | "random" | "" => Ok(SelectionRule::Uniform),
            _ => Err(AttenuatorError::UnknownSelectionRule(s.to_string())),
        }
    }
}

impl fmt::Display for SelectionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
