//! Logging Configuration
//!
//! Settings come from the `[logging]` table of a settings file, or from
//! environment variables:
//!
//! - `METRIC_CUBE_LOG`: `tracing` filter directives (default: `info`)
//! - `METRIC_CUBE_LOG_JSON`: `true`/`1` for JSON lines

use serde::{Deserialize, Serialize};

pub const LOG_FILTER_ENV: &str = "METRIC_CUBE_LOG";
pub const LOG_JSON_ENV: &str = "METRIC_CUBE_LOG_JSON";

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directives, e.g. `info,metric_cube::index=trace`
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            filter: DEFAULT_FILTER.to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply whichever environment variables are set on top of `self`
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(filter) = std::env::var(LOG_FILTER_ENV) {
            if !filter.trim().is_empty() {
                self.filter = filter;
            }
        }
        if let Ok(json) = std::env::var(LOG_JSON_ENV) {
            self.json = parse_flag(&json);
        }
        self
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}
