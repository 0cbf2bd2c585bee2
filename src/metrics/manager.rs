//! Metric registry and period flushing
//!
//! A [`MetricManager`] owns every metric created through it, shares one series
//! factory between them, and closes aggregation periods on demand. Time is
//! passed in by the caller; the manager never starts timers or threads.

use super::aggregate::AggregationPeriod;
use super::config::MetricConfiguration;
use super::identifier::MetricIdentifier;
use super::metric::Metric;
use super::series::{MeasurementSeries, MeasurementSeriesFactory, MetricSeries, SeriesFactory};
use super::sink::AggregateSink;
use crate::error::{MetricsError, Result};
use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one [`MetricManager::flush`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushSummary {
    pub period: AggregationPeriod,
    pub metrics: usize,
    pub series: usize,
    pub aggregates: usize,
}

pub struct MetricManager<S: MetricSeries = MeasurementSeries> {
    factory: Arc<dyn SeriesFactory<S>>,
    metrics: DashMap<MetricIdentifier, Arc<Metric<S>>, RandomState>,
    period_start_ms: Mutex<u64>,
}

impl MetricManager<MeasurementSeries> {
    /// Manager producing [`MeasurementSeries`], first period starting at `start_ms`
    pub fn measurement(start_ms: u64) -> Self {
        Self::new(Arc::new(MeasurementSeriesFactory), start_ms)
    }
}

impl<S: MetricSeries> MetricManager<S> {
    pub fn new(factory: Arc<dyn SeriesFactory<S>>, start_ms: u64) -> Self {
        MetricManager {
            factory,
            metrics: DashMap::with_hasher(RandomState::new()),
            period_start_ms: Mutex::new(start_ms),
        }
    }

    /// Return the registered metric for `identifier`, creating it if needed.
    ///
    /// Identifiers compare by namespace, id and dimension count, so an existing
    /// metric with different dimension names or a different configuration is a
    /// conflict rather than a match.
    pub fn get_or_create_metric(
        &self,
        identifier: MetricIdentifier,
        configuration: MetricConfiguration,
    ) -> Result<Arc<Metric<S>>> {
        if let Some(existing) = self.metric(&identifier) {
            Self::check_compatible(&existing, &identifier, &configuration)?;
            return Ok(existing);
        }

        // Built outside the map shard lock; a racing creator may win
        let candidate = Arc::new(Metric::new(
            identifier.clone(),
            configuration.clone(),
            Arc::clone(&self.factory),
        )?);

        let (registered, inserted) = self.register(candidate);
        if inserted {
            info!(metric = %identifier, "metric registered");
        } else {
            Self::check_compatible(&registered, &identifier, &configuration)?;
        }
        Ok(registered)
    }

    /// Insert `candidate` unless its identifier is taken. Returns the metric
    /// now registered and whether it is `candidate`.
    fn register(&self, candidate: Arc<Metric<S>>) -> (Arc<Metric<S>>, bool) {
        match self.metrics.entry(candidate.identifier().clone()) {
            Entry::Occupied(occupied) => (Arc::clone(occupied.get()), false),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&candidate));
                (candidate, true)
            }
        }
    }

    fn check_compatible(
        existing: &Metric<S>,
        identifier: &MetricIdentifier,
        configuration: &MetricConfiguration,
    ) -> Result<()> {
        if !existing.identifier().has_same_dimension_names(identifier) {
            return Err(MetricsError::MetricConflict(format!(
                "{} is already registered as {}",
                identifier,
                existing.identifier()
            )));
        }
        if existing.configuration() != configuration {
            return Err(MetricsError::MetricConflict(format!(
                "{} is already registered with a different configuration",
                identifier
            )));
        }
        Ok(())
    }

    pub fn metric(&self, identifier: &MetricIdentifier) -> Option<Arc<Metric<S>>> {
        self.metrics.get(identifier).map(|entry| Arc::clone(entry.value()))
    }

    pub fn metrics_count(&self) -> usize {
        self.metrics.len()
    }

    pub fn period_start_ms(&self) -> u64 {
        *self.period_start_ms.lock()
    }

    /// Close the period `[period_start, now_ms)` on every series, hand the
    /// aggregates to `sink` as one batch, and start the next period at `now_ms`.
    ///
    /// Concurrent flushes are serialized. Values tracked while a flush runs land
    /// in either the closing or the next period.
    pub fn flush(&self, now_ms: u64, sink: &dyn AggregateSink) -> FlushSummary {
        let mut period_start = self.period_start_ms.lock();
        if now_ms < *period_start {
            warn!(now_ms, period_start = *period_start, "flush time precedes period start, clamping duration");
        }
        let period = AggregationPeriod::between(*period_start, now_ms);

        let metrics: Vec<Arc<Metric<S>>> =
            self.metrics.iter().map(|entry| Arc::clone(entry.value())).collect();

        let mut series = 0;
        let mut aggregates = Vec::new();
        for metric in &metrics {
            series += metric.series_count();
            aggregates.extend(metric.complete_aggregation_period(period));
        }

        let summary = FlushSummary {
            period,
            metrics: metrics.len(),
            series,
            aggregates: aggregates.len(),
        };
        sink.accept(aggregates);
        *period_start = now_ms;

        info!(
            start_ms = period.start_ms,
            duration_ms = period.duration_ms,
            metrics = summary.metrics,
            series = summary.series,
            aggregates = summary.aggregates,
            "aggregation period flushed"
        );
        summary
    }
}

impl<S: MetricSeries> std::fmt::Debug for MetricManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricManager")
            .field("metrics_count", &self.metrics_count())
            .field("period_start_ms", &self.period_start_ms())
            .finish()
    }
}
