//! Series abstraction, series factory, and the default measurement series

use super::aggregate::{AggregationPeriod, MeasurementData, MetricAggregate, MEASUREMENT_AGGREGATION_KIND};
use super::config::SeriesConfig;
use super::identifier::MetricIdentifier;
use crate::error::{MetricsError, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::trace;

/// A single stream of tracked values aggregated per period
pub trait MetricSeries: Send + Sync + 'static {
    /// Record one value
    fn track_value(&self, value: f64) -> Result<()>;

    /// Reject a value `track_value` would refuse, without recording anything
    fn validate_value(&self, _value: f64) -> Result<()> {
        Ok(())
    }

    /// Close the current period, returning its aggregate and starting a new one.
    /// Returns `None` when nothing was tracked during the period.
    fn complete_aggregation_period(&self, period: AggregationPeriod) -> Option<MetricAggregate>;
}

/// Creates series for newly seen coordinates.
///
/// Called outside any index lock, possibly concurrently and possibly more than
/// once for the same coordinate; surplus results are dropped.
pub trait SeriesFactory<S>: Send + Sync {
    fn create(
        &self,
        identifier: &MetricIdentifier,
        dimensions: &[(String, String)],
        config: &SeriesConfig,
    ) -> S;
}

#[derive(Debug, Clone, Copy, Default)]
struct MeasurementState {
    count: u64,
    sum: f64,
    sum_of_squares: f64,
    min: f64,
    max: f64,
}

impl MeasurementState {
    fn record(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
        self.sum_of_squares += value * value;
    }

    fn data(&self) -> Option<MeasurementData> {
        if self.count == 0 {
            return None;
        }
        let count = self.count as f64;
        let mean = self.sum / count;
        let variance = (self.sum_of_squares / count - mean * mean).max(0.0);
        Some(MeasurementData {
            count: self.count,
            sum: self.sum,
            min: self.min,
            max: self.max,
            std_dev: variance.sqrt(),
        })
    }
}

/// Count/sum/min/max/std-dev series
#[derive(Debug)]
pub struct MeasurementSeries {
    metric_namespace: String,
    metric_id: String,
    dimensions: BTreeMap<String, String>,
    restrict_to_u32_values: bool,
    state: Mutex<MeasurementState>,
}

impl MeasurementSeries {
    pub fn new(identifier: &MetricIdentifier, dimensions: &[(String, String)], config: &SeriesConfig) -> Self {
        MeasurementSeries {
            metric_namespace: identifier.metric_namespace().to_string(),
            metric_id: identifier.metric_id().to_string(),
            dimensions: dimensions.iter().cloned().collect(),
            restrict_to_u32_values: config.restrict_to_u32_values,
            state: Mutex::new(MeasurementState::default()),
        }
    }

    pub fn dimensions(&self) -> &BTreeMap<String, String> {
        &self.dimensions
    }

    /// Statistics of the open period without closing it
    pub fn current_data(&self) -> Option<MeasurementData> {
        self.state.lock().data()
    }

    fn check_restrictions(&self, value: f64) -> Result<()> {
        if self.restrict_to_u32_values
            && (value.fract() != 0.0 || value < 0.0 || value > u32::MAX as f64)
        {
            return Err(MetricsError::InvalidValue(format!(
                "{} is not a whole number in 0..={} (series restricted to u32 values)",
                value,
                u32::MAX
            )));
        }
        Ok(())
    }
}

impl MetricSeries for MeasurementSeries {
    fn track_value(&self, value: f64) -> Result<()> {
        if value.is_nan() {
            trace!(metric_id = %self.metric_id, "ignoring NaN value");
            return Ok(());
        }
        self.check_restrictions(value)?;
        self.state.lock().record(value);
        Ok(())
    }

    fn validate_value(&self, value: f64) -> Result<()> {
        if value.is_nan() {
            return Ok(());
        }
        self.check_restrictions(value)
    }

    fn complete_aggregation_period(&self, period: AggregationPeriod) -> Option<MetricAggregate> {
        let closed = std::mem::take(&mut *self.state.lock());
        let data = closed.data()?;
        Some(MetricAggregate {
            metric_namespace: self.metric_namespace.clone(),
            metric_id: self.metric_id.clone(),
            aggregation_kind: MEASUREMENT_AGGREGATION_KIND.to_string(),
            period,
            dimensions: self.dimensions.clone(),
            data,
        })
    }
}

/// Factory for [`MeasurementSeries`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MeasurementSeriesFactory;

impl SeriesFactory<MeasurementSeries> for MeasurementSeriesFactory {
    fn create(
        &self,
        identifier: &MetricIdentifier,
        dimensions: &[(String, String)],
        config: &SeriesConfig,
    ) -> MeasurementSeries {
        MeasurementSeries::new(identifier, dimensions, config)
    }
}
