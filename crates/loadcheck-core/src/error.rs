//! Error types for loadcheck configuration and reporting

use thiserror::Error;

use crate::metrics::MetricKind;

/// Result type alias for loadcheck operations
pub type Result<T> = std::result::Result<T, LoadCheckError>;

/// Errors that can occur while configuring a run or producing its report.
///
/// Request failures are never surfaced through this type: they are recorded
/// into metrics and the run continues.
#[derive(Error, Debug)]
pub enum LoadCheckError {
    // === Configuration ===
    /// Duration literal could not be parsed
    #[error("Invalid duration: {0:?}")]
    InvalidDuration(String),

    /// Stage profile is unusable
    #[error("Invalid stage profile: {0}")]
    InvalidStages(String),

    /// Threshold expression could not be parsed
    #[error("Invalid threshold {expression:?} on {metric}: {reason}")]
    InvalidThreshold {
        metric: String,
        expression: String,
        reason: String,
    },

    /// Metric name not registered
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    /// Metric name registered twice
    #[error("Metric already registered: {0}")]
    DuplicateMetric(String),

    /// Metric exists with another kind
    #[error("Metric {name} is a {actual}, expected a {expected}")]
    MetricKindMismatch {
        name: String,
        expected: MetricKind,
        actual: MetricKind,
    },

    /// Metric name contains characters outside [A-Za-z0-9_]
    #[error("Invalid metric name: {0:?}")]
    InvalidMetricName(String),

    /// Trend histogram could not be allocated
    #[error("Histogram error: {0}")]
    Histogram(String),

    /// Random-choice pool has no entries
    #[error("Input pool {0} is empty")]
    EmptyPool(&'static str),

    /// Endpoint URL could not be built
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Configuration file could not be parsed
    #[error("Configuration error: {0}")]
    Config(String),

    // === Output ===
    /// Filesystem failure while writing artifacts
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LoadCheckError {
    /// Check if the error comes from run configuration rather than output
    pub fn is_config_error(&self) -> bool {
        !matches!(self, Self::Io(_) | Self::Serialization(_))
    }
}
