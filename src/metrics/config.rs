//! Per-metric configuration
//!
//! Limits are validated once, when a [`Metric`](super::Metric) is constructed
//! against a concrete identifier, because the rules depend on how many
//! dimensions the metric has.

use crate::error::{MetricsError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default maximum number of series per metric (including the zero-dimension series)
pub const DEFAULT_SERIES_COUNT_LIMIT: usize = 1000;

/// Default maximum number of distinct values per dimension node
pub const DEFAULT_VALUES_PER_DIMENSION_LIMIT: usize = 100;

/// Configuration handed through to the series factory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesConfig {
    /// Reject values that are not whole numbers in `0..=u32::MAX`
    pub restrict_to_u32_values: bool,
}

/// Capacity limits and series configuration of one metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricConfiguration {
    /// Maximum series, the zero-dimension series included
    pub series_count_limit: usize,
    /// Distinct values allowed per dimension node, for every dimension
    pub values_per_dimension_limit: usize,
    /// Optional per-dimension override of `values_per_dimension_limit`
    pub values_per_dimension_limits: Option<Vec<usize>>,
    /// Passed to the series factory untouched
    pub series: SeriesConfig,
}

impl Default for MetricConfiguration {
    fn default() -> Self {
        MetricConfiguration {
            series_count_limit: DEFAULT_SERIES_COUNT_LIMIT,
            values_per_dimension_limit: DEFAULT_VALUES_PER_DIMENSION_LIMIT,
            values_per_dimension_limits: None,
            series: SeriesConfig::default(),
        }
    }
}

impl MetricConfiguration {
    pub fn new(series_count_limit: usize, values_per_dimension_limit: usize) -> Self {
        MetricConfiguration {
            series_count_limit,
            values_per_dimension_limit,
            ..Default::default()
        }
    }

    /// Use a distinct value limit for each dimension
    pub fn with_values_per_dimension_limits(mut self, limits: Vec<usize>) -> Self {
        self.values_per_dimension_limits = Some(limits);
        self
    }

    pub fn with_series_config(mut self, series: SeriesConfig) -> Self {
        self.series = series;
        self
    }

    /// Check the limits against a metric of the given dimensionality
    pub fn validate(&self, dimensions_count: usize) -> Result<()> {
        if self.series_count_limit < 1 {
            return Err(MetricsError::InvalidConfiguration(
                "series_count_limit must be at least 1".to_string(),
            ));
        }
        if dimensions_count > 0 && self.series_count_limit < 2 {
            return Err(MetricsError::InvalidConfiguration(format!(
                "series_count_limit must be at least 2 for a metric with {} dimension(s)",
                dimensions_count
            )));
        }
        if self.values_per_dimension_limit < 1 {
            return Err(MetricsError::InvalidConfiguration(
                "values_per_dimension_limit must be at least 1".to_string(),
            ));
        }
        if let Some(limits) = &self.values_per_dimension_limits {
            if limits.len() != dimensions_count {
                return Err(MetricsError::InvalidConfiguration(format!(
                    "values_per_dimension_limits has {} entries but the metric has {} dimension(s)",
                    limits.len(),
                    dimensions_count
                )));
            }
            if let Some(position) = limits.iter().position(|&limit| limit < 1) {
                return Err(MetricsError::InvalidConfiguration(format!(
                    "values_per_dimension_limits[{}] must be at least 1",
                    position
                )));
            }
        }
        Ok(())
    }

    /// Effective per-dimension value limits for a metric of the given dimensionality
    pub fn dimension_values_limits(&self, dimensions_count: usize) -> Vec<usize> {
        match &self.values_per_dimension_limits {
            Some(limits) => limits.clone(),
            None => vec![self.values_per_dimension_limit; dimensions_count],
        }
    }

    /// Parse from TOML. Dimension-dependent validation happens at metric construction.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: MetricConfiguration = toml::from_str(s)?;
        if config.series_count_limit < 1 || config.values_per_dimension_limit < 1 {
            return Err(MetricsError::InvalidConfiguration(
                "limits must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}
