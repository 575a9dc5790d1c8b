//! Error type definitions.
//!
//! This module defines the error taxonomy shared by every component of the
//! attenuation core: configuration errors that abort startup, the distinguished
//! wait timeout, and transport failures surfaced by the circuit breaker.

use std::time::Duration;

use log::SetLoggerError;
use reqwest::Error as ReqwestError;
use thiserror::Error;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the HTTP client.
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] ReqwestError),

    /// Error reading or parsing the gateway configuration file.
    #[error("Configuration file error: {0}")]
    ConfigFileError(String),
}

/// A failed outbound call.
///
/// Carries the transport's error text (which the error classifier matches
/// against) and the HTTP status, when one was received.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    /// Error text as reported by the transport.
    pub message: String,
    /// HTTP status code, if the failure happened after a response arrived.
    pub status: Option<u16>,
}

impl TransportError {
    /// Creates a transport error without a status code.
    pub fn new(message: impl Into<String>) -> Self {
        TransportError {
            message: message.into(),
            status: None,
        }
    }

    /// Creates a transport error that carries an HTTP status code.
    pub fn with_status(message: impl Into<String>, status: u16) -> Self {
        TransportError {
            message: message.into(),
            status: Some(status),
        }
    }
}

impl From<ReqwestError> for TransportError {
    fn from(e: ReqwestError) -> Self {
        let status = e.status().map(|s| s.as_u16());
        // reqwest hides the io error behind its own Display; the full chain is
        // needed so "connection reset by peer" stays visible to the classifier
        let mut message = e.to_string();
        let mut source = std::error::Error::source(&e);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        TransportError { message, status }
    }
}

/// Errors raised by the attenuation and selection core.
#[derive(Error, Debug)]
pub enum AttenuatorError {
    /// A pulse with this name is already registered.
    #[error("Pulse '{0}' already exists")]
    PulseAlreadyExists(String),

    /// The inflight ceiling must be at least one.
    #[error("{name}: cannot have an attenuator queue size of {max_inflight}")]
    InvalidMaxInflight {
        /// Flow name.
        name: String,
        /// Rejected value.
        max_inflight: usize,
    },

    /// A pulse needs a positive, finite rate.
    #[error("{name}: pulse rate must be a positive number of hertz, got {hertz}")]
    InvalidRate {
        /// Pulse name.
        name: String,
        /// Rejected value.
        hertz: f64,
    },

    /// The pulse emitter has stopped and will never issue another permit.
    #[error("pulse '{name}' has stopped")]
    PulseStopped {
        /// Pulse name.
        name: String,
    },

    /// The wait for a green light exceeded its deadline.
    #[error("{name}.wait_for_green(): timeout after {waited:?}")]
    WaitTimeout {
        /// Flow name.
        name: String,
        /// How long the caller waited.
        waited: Duration,
    },

    /// The wait for a green light was cancelled by the caller.
    #[error("{name}.wait_for_green(): cancelled")]
    WaitCancelled {
        /// Flow name.
        name: String,
    },

    /// A duration spec could not be parsed.
    #[error("'{input}': {reason}")]
    InvalidDuration {
        /// The offending spec.
        input: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A selection rule name was not recognised.
    #[error("unknown selection rule '{0}'")]
    UnknownSelectionRule(String),

    /// Every weight in a sibling set is zero, so no CDF can be built.
    #[error("{set}: total weight is zero")]
    ZeroTotalWeight {
        /// Name of the weighted set.
        set: String,
    },

    /// The shared store behind a distributed pulse failed.
    #[error("shared store error: {0}")]
    Store(String),

    /// A terminal transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The retry budget ran out while the last attempt still asked for a retry.
    #[error("too many retries ({retries})")]
    TooManyRetries {
        /// Configured retry budget.
        retries: u32,
    },

    /// Success predicates rejected the response without asking for a retry.
    #[error("unsuccessful response (status {status})")]
    UnsuccessfulResponse {
        /// Status of the rejected response.
        status: u16,
    },

    /// Invalid configuration, identified by its key.
    #[error("invalid configuration at '{key}': {reason}")]
    Config {
        /// Dotted path of the offending key.
        key: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl AttenuatorError {
    /// Builds a configuration error for `key`.
    pub fn config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        AttenuatorError::Config {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for the distinguished wait timeout (and cancellation).
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            AttenuatorError::WaitTimeout { .. } | AttenuatorError::WaitCancelled { .. }
        )
    }

    /// Returns true for errors that must abort startup.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AttenuatorError::PulseAlreadyExists(_)
                | AttenuatorError::InvalidMaxInflight { .. }
                | AttenuatorError::InvalidRate { .. }
                | AttenuatorError::InvalidDuration { .. }
                | AttenuatorError::UnknownSelectionRule(_)
                | AttenuatorError::ZeroTotalWeight { .. }
                | AttenuatorError::Config { .. }
        )
    }

    /// The HTTP status an upstream-facing handler should answer with.
    pub fn upstream_status(&self) -> u16 {
        match self {
            AttenuatorError::WaitTimeout { .. } | AttenuatorError::WaitCancelled { .. } => 503,
            AttenuatorError::Transport(_)
            | AttenuatorError::TooManyRetries { .. }
            | AttenuatorError::Store(_) => 502,
            AttenuatorError::PulseStopped { .. } => 503,
            AttenuatorError::UnsuccessfulResponse { status } => *status,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_distinguished_from_transport() {
        let timeout = AttenuatorError::WaitTimeout {
            name: "search".to_string(),
            waited: Duration::from_millis(100),
        };
        let transport = AttenuatorError::Transport(TransportError::new("connection refused"));

        assert!(timeout.is_timeout());
        assert!(!transport.is_timeout());
        assert_eq!(timeout.upstream_status(), 503);
        assert_eq!(transport.upstream_status(), 502);
    }

    #[test]
    fn test_configuration_errors() {
        assert!(AttenuatorError::PulseAlreadyExists("x".into()).is_configuration());
        assert!(AttenuatorError::config("upstreams.search.rule", "bad").is_configuration());
        assert!(!AttenuatorError::TooManyRetries { retries: 3 }.is_configuration());
    }

    #[test]
    fn test_error_messages_identify_offending_key() {
        let err = AttenuatorError::config("attenuators.search.max_inflight", "must be > 0");
        let msg = err.to_string();
        assert!(msg.contains("attenuators.search.max_inflight"));
        assert!(msg.contains("must be > 0"));

        let err = AttenuatorError::InvalidMaxInflight {
            name: "foo".into(),
            max_inflight: 0,
        };
        assert_eq!(err.to_string(), "foo: cannot have an attenuator queue size of 0");
    }

    #[test]
    fn test_unsuccessful_response_keeps_status() {
        let err = AttenuatorError::UnsuccessfulResponse { status: 418 };
        assert_eq!(err.upstream_status(), 418);
    }

    #[test]
    fn test_transport_error_constructors() {
        let e = TransportError::new("read: connection reset by peer");
        assert_eq!(e.status, None);
        assert_eq!(e.to_string(), "read: connection reset by peer");

        let e = TransportError::with_status("bad gateway", 502);
        assert_eq!(e.status, Some(502));
    }
}
