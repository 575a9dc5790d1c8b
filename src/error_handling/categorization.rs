//! Error categorization.
//!
//! Transport errors arrive as free text from whatever HTTP stack produced them.
//! The classifier maps that text onto a small set of named error classes and
//! decides which classes are transient (worth a backoff-and-retry).

use std::collections::HashSet;

use regex::Regex;

use super::types::{AttenuatorError, TransportError};

/// Error class for DNS resolution failures.
pub const ERROR_CLASS_DNS: &str = "dns";
/// Error class for connections reset by the remote end.
pub const ERROR_CLASS_CONNRESET: &str = "connreset";

const DNS_PATTERN: &str = "lookup .* on .*: server misbehaving";
const CONNRESET_PATTERN: &str = "(?i)connection reset by peer";

/// Maps transport error text to named error classes.
///
/// Classes are checked in registration order and the first match wins.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    classes: Vec<(String, Regex)>,
    transient: HashSet<String>,
}

impl ErrorClassifier {
    /// Creates a classifier with the default classes.
    ///
    /// - `dns`: `lookup .* on .*: server misbehaving`
    /// - `connreset`: `connection reset by peer` (transient)
    pub fn new() -> Self {
        let mut classifier = Self::empty();
        for (name, pattern) in [
            (ERROR_CLASS_DNS, DNS_PATTERN),
            (ERROR_CLASS_CONNRESET, CONNRESET_PATTERN),
        ] {
            let re = Regex::new(pattern).unwrap_or_else(|e| {
                panic!(
                    "Built-in error class '{}' failed to compile: {}. This is a programming error.",
                    name, e
                )
            });
            classifier.classes.push((name.to_string(), re));
        }
        classifier.transient.insert(ERROR_CLASS_CONNRESET.to_string());
        classifier
    }

    /// Creates a classifier with no classes; nothing is transient.
    pub fn empty() -> Self {
        ErrorClassifier {
            classes: Vec::new(),
            transient: HashSet::new(),
        }
    }

    /// Registers an additional error class.
    ///
    /// # Errors
    ///
    /// Returns `AttenuatorError::Config` if `pattern` is not a valid regular expression.
    pub fn with_class(mut self, name: &str, pattern: &str) -> Result<Self, AttenuatorError> {
        let re = Regex::new(pattern).map_err(|e| {
            AttenuatorError::config(format!("error_classes.{}", name), e.to_string())
        })?;
        self.classes.push((name.to_string(), re));
        Ok(self)
    }

    /// Marks a class as transient.
    pub fn mark_transient(mut self, name: &str) -> Self {
        self.transient.insert(name.to_string());
        self
    }

    /// True if a class called `name` is registered.
    pub fn has_class(&self, name: &str) -> bool {
        self.classes.iter().any(|(class, _)| class == name)
    }

    /// Returns the first class whose pattern matches `message`.
    pub fn classify(&self, message: &str) -> Option<&str> {
        self.classes
            .iter()
            .find(|(_, re)| re.is_match(message))
            .map(|(name, _)| name.as_str())
    }

    /// Returns true if the error belongs to a transient class.
    pub fn is_transient(&self, error: &TransportError) -> bool {
        self.classify(&error.message)
            .map(|class| self.transient.contains(class))
            .unwrap_or(false)
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}
