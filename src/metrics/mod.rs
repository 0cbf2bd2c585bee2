//! Metrics SDK surface
//!
//! - [`MetricIdentifier`]: namespace, id and ordered dimension names
//! - [`Metric`]: routes tracked values to one series per dimension-value coordinate,
//!   bounded by a [`MetricConfiguration`]
//! - [`MetricSeries`] / [`MeasurementSeries`]: per-coordinate aggregation
//! - [`MetricManager`]: registry plus period flushing into an [`AggregateSink`]

mod aggregate;
mod config;
mod identifier;
mod manager;
mod metric;
mod series;
mod sink;

pub use aggregate::{AggregationPeriod, MeasurementData, MetricAggregate, MEASUREMENT_AGGREGATION_KIND};
pub use config::{
    MetricConfiguration, SeriesConfig, DEFAULT_SERIES_COUNT_LIMIT, DEFAULT_VALUES_PER_DIMENSION_LIMIT,
};
pub use identifier::{MetricIdentifier, DEFAULT_METRIC_NAMESPACE, MAX_DIMENSIONS_COUNT};
pub use manager::{FlushSummary, MetricManager};
pub use metric::Metric;
pub use series::{MeasurementSeries, MeasurementSeriesFactory, MetricSeries, SeriesFactory};
pub use sink::{AggregateSink, ChannelSink, LogSink, MemorySink};
