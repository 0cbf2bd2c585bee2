//! Metric: routes tracked values to the series for their coordinate

use super::aggregate::{AggregationPeriod, MetricAggregate};
use super::config::MetricConfiguration;
use super::identifier::MetricIdentifier;
use super::series::{MeasurementSeries, MeasurementSeriesFactory, MetricSeries, SeriesFactory};
use crate::error::{MetricsError, Result};
use crate::index::{is_blank, MultidimensionalSeriesIndex};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Fixed-arity spelling of [`Metric::track_value`].
///
/// ```ignore
/// track_value!(metric, 42.0, "Red", "S")?;
/// ```
#[macro_export]
macro_rules! track_value {
    ($metric:expr, $value:expr $(, $dim:expr)* $(,)?) => {
        $metric.track_value(
            $value,
            &[$(::std::convert::AsRef::<str>::as_ref(&$dim)),*] as &[&str],
        )
    };
}

/// A named, optionally multi-dimensional metric
pub struct Metric<S: MetricSeries = MeasurementSeries> {
    identifier: MetricIdentifier,
    configuration: MetricConfiguration,
    zero_dimension_series: Arc<S>,
    index: Option<MultidimensionalSeriesIndex<Arc<S>>>,
}

impl Metric<MeasurementSeries> {
    /// Metric backed by [`MeasurementSeries`]
    pub fn measurement(identifier: MetricIdentifier, configuration: MetricConfiguration) -> Result<Self> {
        Self::new(identifier, configuration, Arc::new(MeasurementSeriesFactory))
    }
}

impl<S: MetricSeries> Metric<S> {
    pub fn new(
        identifier: MetricIdentifier,
        configuration: MetricConfiguration,
        factory: Arc<dyn SeriesFactory<S>>,
    ) -> Result<Self> {
        let dimensions_count = identifier.dimensions_count();
        configuration.validate(dimensions_count)?;

        let zero_dimension_series = Arc::new(factory.create(&identifier, &[], &configuration.series));

        let index = if dimensions_count == 0 {
            None
        } else {
            let names = identifier.dimension_names().to_vec();
            let series_identifier = identifier.clone();
            let series_config = configuration.series.clone();
            let index = MultidimensionalSeriesIndex::new(
                configuration.dimension_values_limits(dimensions_count),
                // The zero-dimension series takes one slot of the limit
                configuration.series_count_limit - 1,
                move |coordinate: &[String]| {
                    let dimensions: Vec<(String, String)> =
                        names.iter().cloned().zip(coordinate.iter().cloned()).collect();
                    Arc::new(factory.create(&series_identifier, &dimensions, &series_config))
                },
            )?;
            Some(index)
        };

        debug!(metric = %identifier, series_count_limit = configuration.series_count_limit, "metric created");

        Ok(Metric {
            identifier,
            configuration,
            zero_dimension_series,
            index,
        })
    }

    pub fn identifier(&self) -> &MetricIdentifier {
        &self.identifier
    }

    pub fn configuration(&self) -> &MetricConfiguration {
        &self.configuration
    }

    pub fn zero_dimension_series(&self) -> &Arc<S> {
        &self.zero_dimension_series
    }

    /// Zero-dimension series plus every series created so far
    pub fn series_count(&self) -> usize {
        1 + self.index.as_ref().map_or(0, |index| index.total_points_count())
    }

    fn validate_dimension_values<V: AsRef<str>>(&self, dimension_values: &[V]) -> Result<()> {
        if dimension_values.len() != self.identifier.dimensions_count() {
            return Err(MetricsError::DimensionArityMismatch {
                expected: self.identifier.dimensions_count(),
                actual: dimension_values.len(),
            });
        }
        if let Some(dimension_index) = dimension_values.iter().position(|v| is_blank(v.as_ref())) {
            return Err(MetricsError::InvalidDimensionValue { dimension_index });
        }
        Ok(())
    }

    /// Resolve the series for a coordinate.
    ///
    /// `Ok(None)` means the series does not exist and either creation was not
    /// requested or a capacity limit prevented it.
    pub fn try_get_data_series<V: AsRef<str>>(
        &self,
        create_if_not_exists: bool,
        dimension_values: &[V],
    ) -> Result<Option<Arc<S>>> {
        self.validate_dimension_values(dimension_values)?;

        let index = match &self.index {
            None => return Ok(Some(Arc::clone(&self.zero_dimension_series))),
            Some(index) => index,
        };

        if create_if_not_exists {
            Ok(index.try_get_or_create_point(dimension_values)?.into_point())
        } else {
            index.try_get_point(dimension_values)
        }
    }

    /// Track a value for the given coordinate.
    ///
    /// Returns `Ok(false)` only when a capacity limit kept the series from being
    /// created; contract violations are errors.
    pub fn track_value<V: AsRef<str>>(&self, value: f64, dimension_values: &[V]) -> Result<bool> {
        // Every series of a metric shares one series config
        self.zero_dimension_series.validate_value(value)?;
        match self.try_get_data_series(true, dimension_values)? {
            Some(series) => {
                series.track_value(value)?;
                Ok(true)
            }
            None => {
                debug!(metric = %self.identifier, "series capacity exhausted, value not tracked");
                Ok(false)
            }
        }
    }

    /// Distinct values seen for a 1-based dimension number
    pub fn dimension_values(&self, dimension_number: usize) -> Result<BTreeSet<String>> {
        self.identifier
            .validate_dimension_number_for_getter(dimension_number)?;
        match &self.index {
            Some(index) => index.dimension_values(dimension_number - 1),
            None => Ok(BTreeSet::new()),
        }
    }

    /// Every series with its coordinate; the zero-dimension series comes first
    /// with an empty coordinate.
    pub fn all_series(&self) -> Vec<(Vec<String>, Arc<S>)> {
        let mut series = vec![(Vec::new(), Arc::clone(&self.zero_dimension_series))];
        if let Some(index) = &self.index {
            index.for_each_point(|coordinate, point| series.push((coordinate.to_vec(), Arc::clone(point))));
        }
        series
    }

    /// Close the period on every series and collect the non-empty aggregates
    pub fn complete_aggregation_period(&self, period: AggregationPeriod) -> Vec<MetricAggregate> {
        self.all_series()
            .into_iter()
            .filter_map(|(_, series)| series.complete_aggregation_period(period))
            .collect()
    }
}

impl<S: MetricSeries> std::fmt::Debug for Metric<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metric")
            .field("identifier", &self.identifier)
            .field("configuration", &self.configuration)
            .field("series_count", &self.series_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::config::SeriesConfig;

    fn color_size(series_count_limit: usize, values_per_dimension_limit: usize) -> Metric {
        let identifier = MetricIdentifier::new(Some("shop"), "items.sold", &["Color", "Size"]).unwrap();
        Metric::measurement(
            identifier,
            MetricConfiguration::new(series_count_limit, values_per_dimension_limit),
        )
        .unwrap()
    }

    #[test]
    fn test_total_limit_scenario() {
        let metric = color_size(3, 2);

        assert!(metric.track_value(1.0, &["Red", "S"]).unwrap());
        assert!(metric.track_value(1.0, &["Red", "M"]).unwrap());
        assert_eq!(metric.series_count(), 3);

        // "Blue" would fit the per-dimension limit, but the series limit is used up
        assert!(!metric.track_value(1.0, &["Blue", "S"]).unwrap());
        assert_eq!(metric.series_count(), 3);

        // Existing series keep tracking
        assert!(metric.track_value(2.0, &["Red", "S"]).unwrap());
    }

    #[test]
    fn test_dimension_limit_scenario() {
        let metric = color_size(100, 2);

        assert!(metric.track_value(1.0, &["Red", "S"]).unwrap());
        assert!(metric.track_value(1.0, &["Red", "M"]).unwrap());
        assert!(!metric.track_value(1.0, &["Red", "L"]).unwrap());
        assert_eq!(metric.series_count(), 3);

        let sizes: Vec<String> = metric.dimension_values(2).unwrap().into_iter().collect();
        assert_eq!(sizes, vec!["M", "S"]);
    }

    #[test]
    fn test_arity_mismatch_is_error() {
        let metric = color_size(10, 10);

        let too_few = metric.track_value(1.0, &["Red"]);
        assert!(matches!(
            too_few,
            Err(MetricsError::DimensionArityMismatch { expected: 2, actual: 1 })
        ));
        let too_many = metric.track_value(1.0, &["Red", "S", "x"]);
        assert!(matches!(
            too_many,
            Err(MetricsError::DimensionArityMismatch { expected: 2, actual: 3 })
        ));
        assert!(metric.track_value(1.0, &[] as &[&str]).is_err());
        assert!(matches!(
            metric.track_value(1.0, &["Red", ""]),
            Err(MetricsError::InvalidDimensionValue { dimension_index: 1 })
        ));

        assert_eq!(metric.series_count(), 1);
        assert!(metric.zero_dimension_series().current_data().is_none());
    }

    #[test]
    fn test_invalid_value_creates_no_series() {
        let identifier = MetricIdentifier::new(None, "queue.depth", &["Color", "Size"]).unwrap();
        let metric = Metric::measurement(
            identifier,
            MetricConfiguration::new(2, 10).with_series_config(SeriesConfig {
                restrict_to_u32_values: true,
            }),
        )
        .unwrap();

        assert!(matches!(
            metric.track_value(0.5, &["Red", "S"]),
            Err(MetricsError::InvalidValue(_))
        ));
        assert_eq!(metric.series_count(), 1);
        assert!(metric.dimension_values(1).unwrap().is_empty());

        // The one free slot is still available for a valid value
        assert!(metric.track_value(3.0, &["Blue", "M"]).unwrap());
        assert_eq!(metric.series_count(), 2);
    }

    #[test]
    fn test_zero_dimensional_metric() {
        let metric = Metric::measurement(
            MetricIdentifier::zero_dimensional("requests").unwrap(),
            MetricConfiguration::new(1, 1),
        )
        .unwrap();

        assert!(metric.track_value(5.0, &[] as &[&str]).unwrap());
        assert!(track_value!(metric, 7.0).unwrap());
        assert!(metric.track_value(1.0, &["extra"]).is_err());

        assert_eq!(metric.series_count(), 1);
        assert_eq!(metric.zero_dimension_series().current_data().unwrap().count, 2);
        assert!(metric.dimension_values(1).is_err());
        assert_eq!(metric.all_series().len(), 1);
    }

    #[test]
    fn test_invalid_configuration_rejected() {
        let identifier = MetricIdentifier::new(None, "m", &["a"]).unwrap();
        assert!(matches!(
            Metric::measurement(identifier, MetricConfiguration::new(1, 10)),
            Err(MetricsError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_try_get_data_series() {
        let metric = color_size(10, 10);

        assert!(metric.try_get_data_series(false, &["Red", "S"]).unwrap().is_none());
        assert_eq!(metric.series_count(), 1);

        let created = metric.try_get_data_series(true, &["Red", "S"]).unwrap().unwrap();
        let found = metric.try_get_data_series(false, &["Red", "S"]).unwrap().unwrap();
        assert!(Arc::ptr_eq(&created, &found));
        assert_eq!(
            created.dimensions().get("Color").map(String::as_str),
            Some("Red")
        );
    }

    #[test]
    fn test_all_series_and_macro() {
        let metric = color_size(10, 10);
        let size = String::from("M");
        track_value!(metric, 1.0, "Red", "S").unwrap();
        track_value!(metric, 2.0, "Blue", size).unwrap();

        let all = metric.all_series();
        assert_eq!(all.len(), 3);
        assert!(all[0].0.is_empty());

        let mut coordinates: Vec<Vec<String>> = all[1..].iter().map(|(c, _)| c.clone()).collect();
        coordinates.sort();
        assert_eq!(
            coordinates,
            vec![vec!["Blue".to_string(), "M".to_string()], vec!["Red".to_string(), "S".to_string()]]
        );
    }

    #[test]
    fn test_complete_aggregation_period() {
        let metric = color_size(10, 10);
        metric.track_value(1.0, &["Red", "S"]).unwrap();
        metric.track_value(3.0, &["Red", "S"]).unwrap();
        metric.try_get_data_series(true, &["Red", "M"]).unwrap();

        let aggregates = metric.complete_aggregation_period(AggregationPeriod::between(0, 60_000));
        // The zero-dimension series and "Red/M" saw no values
        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].data.sum, 4.0);
        assert_eq!(aggregates[0].dimensions.get("Size").map(String::as_str), Some("S"));
    }

    #[test]
    fn test_concurrent_tracking() {
        let metric = color_size(1000, 100);
        let threads = 8;
        let per_thread = 500;

        std::thread::scope(|s| {
            for t in 0..threads {
                let metric = &metric;
                s.spawn(move || {
                    for i in 0..per_thread {
                        let color = format!("c{}", i % 4);
                        let size = format!("s{}", (i + t) % 3);
                        assert!(metric.track_value(1.0, &[color, size]).unwrap());
                    }
                });
            }
        });

        assert_eq!(metric.series_count(), 1 + 4 * 3);
        let tracked: u64 = metric
            .all_series()
            .iter()
            .filter_map(|(_, series)| series.current_data())
            .map(|data| data.count)
            .sum();
        assert_eq!(tracked, (threads * per_thread) as u64);
    }
}
