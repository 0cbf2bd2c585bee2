//! Completed aggregates handed to sinks at the end of a period

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregation kind emitted by [`MeasurementSeries`](super::MeasurementSeries)
pub const MEASUREMENT_AGGREGATION_KIND: &str = "measurement";

/// Half-open time window `[start_ms, start_ms + duration_ms)` in Unix milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationPeriod {
    pub start_ms: u64,
    pub duration_ms: u64,
}

impl AggregationPeriod {
    /// Period from `start_ms` up to `end_ms`; an end before the start yields zero duration
    pub fn between(start_ms: u64, end_ms: u64) -> Self {
        AggregationPeriod {
            start_ms,
            duration_ms: end_ms.saturating_sub(start_ms),
        }
    }

    pub fn end_ms(&self) -> u64 {
        self.start_ms.saturating_add(self.duration_ms)
    }
}

/// Streaming statistics of one measurement period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementData {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation
    pub std_dev: f64,
}

/// One series' result for one aggregation period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAggregate {
    pub metric_namespace: String,
    pub metric_id: String,
    pub aggregation_kind: String,
    pub period: AggregationPeriod,
    /// Dimension name -> value; empty for the zero-dimension series
    pub dimensions: BTreeMap<String, String>,
    pub data: MeasurementData,
}

impl MetricAggregate {
    /// Serialize to a single-line JSON document
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
