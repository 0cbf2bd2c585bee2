//! metric-cube: client-side metric aggregation with bounded, concurrent series indexing
//!
//! Values are tracked against a [`Metric`], which routes each one to the series
//! for its dimension-value coordinate. Series live in a
//! [`MultidimensionalSeriesIndex`], a concurrent tree capped both per node and in
//! total, so a metric with unbounded input cardinality still uses bounded
//! memory. A [`MetricManager`] keeps the metrics of a process and flushes their
//! per-period aggregates into an [`AggregateSink`].
//!
//! ```no_run
//! use metric_cube::{Metric, MetricConfiguration, MetricIdentifier};
//!
//! let identifier = MetricIdentifier::new(Some("shop"), "items.sold", &["Color", "Size"])?;
//! let metric = Metric::measurement(identifier, MetricConfiguration::new(1000, 100))?;
//! let tracked = metric.track_value(1.0, &["Red", "S"])?;
//! assert!(tracked);
//! # Ok::<(), metric_cube::MetricsError>(())
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod metrics;
pub mod observability;

#[cfg(test)]
mod stateright;

pub use config::SdkConfig;
pub use error::{MetricsError, Result};
pub use index::{MultidimensionalSeriesIndex, PointResult};
pub use metrics::{
    AggregateSink, AggregationPeriod, ChannelSink, FlushSummary, LogSink, MeasurementData, MeasurementSeries,
    MeasurementSeriesFactory, MemorySink, Metric, MetricAggregate, MetricConfiguration, MetricIdentifier,
    MetricManager, MetricSeries, SeriesConfig, SeriesFactory,
};
pub use observability::{init_tracing, LoggingConfig};
