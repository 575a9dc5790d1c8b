//! Configuration types and CLI options.
//!
//! This module defines enums and structs used for command-line argument parsing.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::constants::DEFAULT_REPORT_DRAWS;

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Command-line options for the gateway binary.
#[derive(Debug, Parser)]
#[command(
    name = "http_attenuator",
    about = "Builds a gateway from its configuration and reports how traffic would be shaped."
)]
pub struct Opt {
    /// Gateway configuration file (JSON)
    #[arg(long, value_parser)]
    pub config: PathBuf,

    /// Log level: error|warn|info|debug|trace
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Log format: plain|json
    #[arg(long, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Number of draws per upstream and pathology in the selection report
    #[arg(long, default_value_t = DEFAULT_REPORT_DRAWS)]
    pub draws: usize,

    /// Only report on this upstream service
    #[arg(long)]
    pub service: Option<String>,

    /// Only report on this pathology
    #[arg(long)]
    pub pathology: Option<String>,

    /// Redis server backing distributed attenuators (e.g. redis://127.0.0.1:6379)
    #[cfg(feature = "redis-backend")]
    #[arg(long)]
    pub redis_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(
            log::LevelFilter::from(LogLevel::Error),
            log::LevelFilter::Error
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Warn),
            log::LevelFilter::Warn
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Info),
            log::LevelFilter::Info
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Debug),
            log::LevelFilter::Debug
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Trace),
            log::LevelFilter::Trace
        );
    }

    #[test]
    fn test_log_level_ordering() {
        let error = log::LevelFilter::from(LogLevel::Error);
        let warn = log::LevelFilter::from(LogLevel::Warn);
        let info = log::LevelFilter::from(LogLevel::Info);
        let debug = log::LevelFilter::from(LogLevel::Debug);
        let trace = log::LevelFilter::from(LogLevel::Trace);

        assert!(error < warn);
        assert!(warn < info);
        assert!(info < debug);
        assert!(debug < trace);
    }

    #[test]
    fn test_opt_defaults() {
        let opt = Opt::parse_from(["http_attenuator", "--config", "gateway.json"]);
        assert_eq!(opt.config, PathBuf::from("gateway.json"));
        assert_eq!(opt.draws, DEFAULT_REPORT_DRAWS);
        assert!(matches!(opt.log_level, LogLevel::Info));
        assert!(matches!(opt.log_format, LogFormat::Plain));
        assert!(opt.service.is_none());
        assert!(opt.pathology.is_none());
    }

    #[test]
    fn test_opt_overrides() {
        let opt = Opt::parse_from([
            "http_attenuator",
            "--config",
            "gateway.json",
            "--log-level",
            "debug",
            "--log-format",
            "json",
            "--draws",
            "500",
            "--service",
            "search",
        ]);
        assert_eq!(opt.draws, 500);
        assert!(matches!(opt.log_level, LogLevel::Debug));
        assert!(matches!(opt.log_format, LogFormat::Json));
        assert_eq!(opt.service.as_deref(), Some("search"));
    }

    #[test]
    fn test_opt_requires_config() {
        assert!(Opt::try_parse_from(["http_attenuator"]).is_err());
    }
}
