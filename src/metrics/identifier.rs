//! Metric identity: namespace, id and ordered dimension names

use crate::error::{MetricsError, Result};
use std::hash::{Hash, Hasher};

/// Namespace used when none is supplied
pub const DEFAULT_METRIC_NAMESPACE: &str = "";

/// Maximum number of dimensions a metric may declare
pub const MAX_DIMENSIONS_COUNT: usize = 10;

/// Immutable identity of a metric.
///
/// Equality and hashing consider the namespace, the id and the number of
/// dimensions. Dimension *names* are not part of equality; the
/// [`MetricManager`](crate::metrics::MetricManager) rejects registering two
/// equal identifiers whose names differ.
#[derive(Debug, Clone)]
pub struct MetricIdentifier {
    metric_namespace: String,
    metric_id: String,
    dimension_names: Vec<String>,
}

impl MetricIdentifier {
    /// Create an identifier, validating the id and every dimension name
    pub fn new<N: AsRef<str>>(
        metric_namespace: Option<&str>,
        metric_id: &str,
        dimension_names: &[N],
    ) -> Result<Self> {
        if metric_id.trim().is_empty() {
            return Err(MetricsError::InvalidMetricId);
        }

        if dimension_names.len() > MAX_DIMENSIONS_COUNT {
            return Err(MetricsError::TooManyDimensions {
                count: dimension_names.len(),
                max: MAX_DIMENSIONS_COUNT,
            });
        }

        let mut names: Vec<String> = Vec::with_capacity(dimension_names.len());
        for (position, name) in dimension_names.iter().enumerate() {
            let name = name.as_ref();
            if name.trim().is_empty() {
                return Err(MetricsError::InvalidDimensionName { position });
            }
            if names.iter().any(|existing| existing == name) {
                return Err(MetricsError::DuplicateDimensionName(name.to_string()));
            }
            names.push(name.to_string());
        }

        let metric_namespace = match metric_namespace.map(str::trim) {
            Some(ns) if !ns.is_empty() => ns.to_string(),
            _ => DEFAULT_METRIC_NAMESPACE.to_string(),
        };

        Ok(MetricIdentifier {
            metric_namespace,
            metric_id: metric_id.to_string(),
            dimension_names: names,
        })
    }

    /// Identifier for a metric without dimensions in the default namespace
    pub fn zero_dimensional(metric_id: &str) -> Result<Self> {
        Self::new::<&str>(None, metric_id, &[])
    }

    pub fn metric_namespace(&self) -> &str {
        &self.metric_namespace
    }

    pub fn metric_id(&self) -> &str {
        &self.metric_id
    }

    pub fn dimensions_count(&self) -> usize {
        self.dimension_names.len()
    }

    pub fn dimension_names(&self) -> &[String] {
        &self.dimension_names
    }

    /// Name of the dimension with the given 1-based number
    pub fn dimension_name(&self, dimension_number: usize) -> Result<&str> {
        self.validate_dimension_number_for_getter(dimension_number)?;
        Ok(&self.dimension_names[dimension_number - 1])
    }

    /// Bounds-check a 1-based dimension number before a getter uses it
    pub fn validate_dimension_number_for_getter(&self, dimension_number: usize) -> Result<()> {
        if dimension_number < 1 || dimension_number > self.dimensions_count() {
            return Err(MetricsError::InvalidDimensionNumber {
                number: dimension_number,
                dimensions_count: self.dimensions_count(),
            });
        }
        Ok(())
    }

    /// True when both identifiers also agree on every dimension name
    pub fn has_same_dimension_names(&self, other: &MetricIdentifier) -> bool {
        self.dimension_names == other.dimension_names
    }
}

impl PartialEq for MetricIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.metric_namespace == other.metric_namespace
            && self.metric_id == other.metric_id
            && self.dimensions_count() == other.dimensions_count()
    }
}

impl Eq for MetricIdentifier {}

impl Hash for MetricIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.metric_namespace.hash(state);
        self.metric_id.hash(state);
        self.dimensions_count().hash(state);
    }
}

impl std::fmt::Display for MetricIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}::{}({})",
            self.metric_namespace,
            self.metric_id,
            self.dimension_names.join(", ")
        )
    }
}
