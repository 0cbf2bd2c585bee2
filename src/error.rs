//! Crate-wide error type
//!
//! Every variant except the configuration-loading and logging ones is a
//! caller-contract violation: it is returned immediately from the call that
//! broke the contract. Capacity exhaustion is never an error; it surfaces as a
//! `false` / `PointResult::*LimitReached` return value instead.

use std::io::Error as IoError;

/// Error type for metric definition, tracking and configuration
#[derive(Debug)]
pub enum MetricsError {
    /// Metric id was empty or whitespace
    InvalidMetricId,
    /// A dimension name was empty or whitespace (0-based position)
    InvalidDimensionName { position: usize },
    /// The same dimension name was supplied twice
    DuplicateDimensionName(String),
    /// More dimension names than the supported maximum
    TooManyDimensions { count: usize, max: usize },
    /// 1-based dimension number outside `1..=dimensions_count`
    InvalidDimensionNumber { number: usize, dimensions_count: usize },
    /// Number of supplied dimension values differs from the metric's dimensionality
    DimensionArityMismatch { expected: usize, actual: usize },
    /// A dimension value was empty or whitespace (0-based dimension index)
    InvalidDimensionValue { dimension_index: usize },
    /// Configuration rejected at construction
    InvalidConfiguration(String),
    /// A tracked value violated the series configuration
    InvalidValue(String),
    /// A metric with an equal identifier exists with a different shape or configuration
    MetricConflict(String),
    /// TOML settings could not be parsed
    ConfigParse(String),
    /// I/O error while reading settings
    Io(IoError),
    /// Tracing subscriber could not be installed
    LoggingInit(String),
}

impl MetricsError {
    /// True for caller-contract violations (the `InvalidArgument` class).
    pub fn is_invalid_argument(&self) -> bool {
        !matches!(
            self,
            MetricsError::ConfigParse(_) | MetricsError::Io(_) | MetricsError::LoggingInit(_)
        )
    }
}

impl std::fmt::Display for MetricsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricsError::InvalidMetricId => {
                write!(f, "Invalid metric id: must not be empty or whitespace")
            }
            MetricsError::InvalidDimensionName { position } => write!(
                f,
                "Invalid dimension name at position {}: must not be empty or whitespace",
                position
            ),
            MetricsError::DuplicateDimensionName(name) => {
                write!(f, "Dimension name '{}' is used more than once", name)
            }
            MetricsError::TooManyDimensions { count, max } => write!(
                f,
                "Too many dimensions: {} supplied, at most {} supported",
                count, max
            ),
            MetricsError::InvalidDimensionNumber {
                number,
                dimensions_count,
            } => write!(
                f,
                "Invalid dimension number {}: metric has {} dimension(s), numbers are 1-based",
                number, dimensions_count
            ),
            MetricsError::DimensionArityMismatch { expected, actual } => write!(
                f,
                "Dimension arity mismatch: metric has {} dimension(s) but {} value(s) were supplied",
                expected, actual
            ),
            MetricsError::InvalidDimensionValue { dimension_index } => write!(
                f,
                "Invalid value for dimension {}: must not be empty or whitespace",
                dimension_index + 1
            ),
            MetricsError::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
            MetricsError::InvalidValue(msg) => write!(f, "Invalid value: {}", msg),
            MetricsError::MetricConflict(msg) => write!(f, "Metric conflict: {}", msg),
            MetricsError::ConfigParse(msg) => write!(f, "Config parse error: {}", msg),
            MetricsError::Io(e) => write!(f, "I/O error: {}", e),
            MetricsError::LoggingInit(msg) => write!(f, "Logging init error: {}", msg),
        }
    }
}

impl std::error::Error for MetricsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MetricsError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<IoError> for MetricsError {
    fn from(e: IoError) -> Self {
        MetricsError::Io(e)
    }
}

impl From<toml::de::Error> for MetricsError {
    fn from(e: toml::de::Error) -> Self {
        MetricsError::ConfigParse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MetricsError>;
