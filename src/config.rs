//! Settings file
//!
//! ```toml
//! [logging]
//! filter = "info,metric_cube::index=debug"
//! json = false
//!
//! [default_metric]
//! series_count_limit = 1000
//! values_per_dimension_limit = 100
//! ```

use crate::error::{MetricsError, Result};
use crate::metrics::MetricConfiguration;
use crate::observability::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Whole-process SDK settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    pub logging: LoggingConfig,
    /// Configuration for metrics created without an explicit one
    pub default_metric: MetricConfiguration,
}

impl SdkConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: SdkConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Dimension-independent checks; the rest happens when a metric is built
    pub fn validate(&self) -> Result<()> {
        if self.default_metric.series_count_limit < 1 || self.default_metric.values_per_dimension_limit < 1 {
            return Err(MetricsError::InvalidConfiguration(
                "default_metric limits must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| MetricsError::ConfigParse(e.to_string()))
    }
}
