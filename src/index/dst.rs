//! Deterministic Simulation Testing for the series index
//!
//! Shadow-state harness for `MultidimensionalSeriesIndex` that enables:
//! - Deterministic random coordinate generation
//! - Outcome prediction from a shadow model (existing / created / which limit)
//! - Invariant checking after each operation
//! - Seed-based reproducibility for debugging

use super::{MultidimensionalSeriesIndex, PointResult};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Configuration for index DST
#[derive(Debug, Clone)]
pub struct IndexDSTConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Number of dimensions of the index
    pub dimensions: usize,
    /// Distinct candidate values drawn per dimension
    pub values_per_dimension: usize,
    /// Per-node value limit applied to every level
    pub dimension_values_limit: usize,
    /// Total points limit
    pub total_points_limit: usize,
    /// Probability of a pure lookup instead of get-or-create
    pub lookup_prob: f64,
}

impl Default for IndexDSTConfig {
    fn default() -> Self {
        IndexDSTConfig {
            seed: 0,
            dimensions: 3,
            values_per_dimension: 5,
            dimension_values_limit: 4,
            total_points_limit: 40,
            lookup_prob: 0.25,
        }
    }
}

impl IndexDSTConfig {
    pub fn new(seed: u64) -> Self {
        IndexDSTConfig {
            seed,
            ..Default::default()
        }
    }

    /// Total limit binds long before dimension limits
    pub fn tight_total(seed: u64) -> Self {
        IndexDSTConfig {
            seed,
            dimensions: 2,
            values_per_dimension: 6,
            dimension_values_limit: 6,
            total_points_limit: 5,
            lookup_prob: 0.2,
        }
    }

    /// Dimension limits bind, total has headroom
    pub fn tight_dimensions(seed: u64) -> Self {
        IndexDSTConfig {
            seed,
            dimensions: 3,
            values_per_dimension: 6,
            dimension_values_limit: 2,
            total_points_limit: 1_000,
            lookup_prob: 0.2,
        }
    }

    pub fn single_dimension(seed: u64) -> Self {
        IndexDSTConfig {
            seed,
            dimensions: 1,
            values_per_dimension: 20,
            dimension_values_limit: 12,
            total_points_limit: 10,
            lookup_prob: 0.3,
        }
    }

    /// Maximum dimensionality with a tiny value space
    pub fn wide(seed: u64) -> Self {
        IndexDSTConfig {
            seed,
            dimensions: 10,
            values_per_dimension: 2,
            dimension_values_limit: 2,
            total_points_limit: 64,
            lookup_prob: 0.25,
        }
    }
}

/// Operation type for logging
#[derive(Debug, Clone)]
pub enum IndexOp {
    GetOrCreate { coordinate: Vec<String> },
    Lookup { coordinate: Vec<String> },
}

/// Point stored by the harness: a creation sequence number plus its coordinate
#[derive(Debug)]
pub struct DstPoint {
    pub id: u64,
    pub coordinate: Vec<String>,
}

/// Result of an index DST run
#[derive(Debug, Clone)]
pub struct IndexDSTResult {
    pub seed: u64,
    pub total_operations: u64,
    pub created: u64,
    pub existing: u64,
    pub dimension_limited: u64,
    pub total_limited: u64,
    pub lookups: u64,
    pub invariant_violations: Vec<String>,
    pub last_op: Option<IndexOp>,
}

impl IndexDSTResult {
    pub fn new(seed: u64) -> Self {
        IndexDSTResult {
            seed,
            total_operations: 0,
            created: 0,
            existing: 0,
            dimension_limited: 0,
            total_limited: 0,
            lookups: 0,
            invariant_violations: Vec::new(),
            last_op: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.invariant_violations.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Seed {}: {} ops (created:{}, existing:{}, dim_limited:{}, total_limited:{}, lookups:{}), {} violations",
            self.seed,
            self.total_operations,
            self.created,
            self.existing,
            self.dimension_limited,
            self.total_limited,
            self.lookups,
            self.invariant_violations.len()
        )
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Expected {
    Existing(u64),
    Created,
    DimensionLimited(usize),
    TotalLimited,
}

/// DST harness for MultidimensionalSeriesIndex
pub struct IndexDSTHarness {
    config: IndexDSTConfig,
    rng: ChaCha8Rng,
    index: MultidimensionalSeriesIndex<Arc<DstPoint>>,
    result: IndexDSTResult,
    /// Coordinate -> id of the point the index must return
    expected_points: HashMap<Vec<String>, u64>,
    /// Coordinate prefix -> keys of the node at that prefix
    expected_nodes: HashMap<Vec<String>, BTreeSet<String>>,
}

impl IndexDSTHarness {
    pub fn new(config: IndexDSTConfig) -> Self {
        let next_id = Arc::new(AtomicU64::new(0));
        let index = MultidimensionalSeriesIndex::new(
            vec![config.dimension_values_limit; config.dimensions],
            config.total_points_limit,
            move |coordinate: &[String]| {
                Arc::new(DstPoint {
                    id: next_id.fetch_add(1, Ordering::SeqCst),
                    coordinate: coordinate.to_vec(),
                })
            },
        )
        .expect("DST configs use valid limits");

        IndexDSTHarness {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            result: IndexDSTResult::new(config.seed),
            config,
            index,
            expected_points: HashMap::new(),
            expected_nodes: HashMap::new(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(IndexDSTConfig::new(seed))
    }

    fn random_coordinate(&mut self) -> Vec<String> {
        (0..self.config.dimensions)
            .map(|d| {
                let v = self.rng.gen_range(0..self.config.values_per_dimension);
                format!("d{}v{}", d, v)
            })
            .collect()
    }

    fn predict(&self, coordinate: &[String]) -> Expected {
        if let Some(&id) = self.expected_points.get(coordinate) {
            return Expected::Existing(id);
        }
        if self.expected_points.len() >= self.config.total_points_limit {
            return Expected::TotalLimited;
        }
        for level in 0..coordinate.len() {
            let keys = self.expected_nodes.get(&coordinate[..level]);
            let present = keys.is_some_and(|k| k.contains(&coordinate[level]));
            if !present {
                let used = keys.map_or(0, BTreeSet::len);
                if used >= self.config.dimension_values_limit {
                    return Expected::DimensionLimited(level);
                }
                // Everything below a new key is a fresh node.
                return Expected::Created;
            }
        }
        Expected::Created
    }

    fn record_created(&mut self, coordinate: &[String], id: u64) {
        for level in 0..coordinate.len() {
            self.expected_nodes
                .entry(coordinate[..level].to_vec())
                .or_default()
                .insert(coordinate[level].clone());
        }
        self.expected_points.insert(coordinate.to_vec(), id);
    }

    fn run_single_op(&mut self) {
        let coordinate = self.random_coordinate();

        if self.rng.gen_bool(self.config.lookup_prob) {
            self.result.last_op = Some(IndexOp::Lookup {
                coordinate: coordinate.clone(),
            });
            self.result.lookups += 1;
            let before = self.index.total_points_count();
            let found = self.index.try_get_point(&coordinate).ok().flatten().map(|p| p.id);
            let expected = self.expected_points.get(&coordinate).copied();
            if found != expected {
                self.violation(format!("Lookup mismatch: expected {:?}, found {:?}", expected, found));
            }
            if self.index.total_points_count() != before {
                self.violation("Lookup changed the points count".to_string());
            }
        } else {
            self.result.last_op = Some(IndexOp::GetOrCreate {
                coordinate: coordinate.clone(),
            });
            let expected = self.predict(&coordinate);
            match (self.index.try_get_or_create_point(&coordinate), expected) {
                (Ok(PointResult::Existing(point)), Expected::Existing(id)) if point.id == id => {
                    self.result.existing += 1;
                }
                (Ok(PointResult::Created(point)), Expected::Created)
                    if point.coordinate == coordinate =>
                {
                    self.result.created += 1;
                    self.record_created(&coordinate, point.id);
                }
                (
                    Ok(PointResult::DimensionValuesLimitReached { dimension_index }),
                    Expected::DimensionLimited(level),
                ) if dimension_index == level => {
                    self.result.dimension_limited += 1;
                }
                (Ok(PointResult::TotalPointsLimitReached), Expected::TotalLimited) => {
                    self.result.total_limited += 1;
                }
                (actual, expected) => {
                    let actual = actual.map(|r| r.into_point().map(|p| p.id));
                    self.violation(format!(
                        "Outcome mismatch: expected {:?}, actual {:?}",
                        expected, actual
                    ));
                }
            }
        }

        self.result.total_operations += 1;

        if let Err(violation) = self.check_invariants() {
            self.violation(violation);
        }
    }

    fn violation(&mut self, message: String) {
        self.result.invariant_violations.push(format!(
            "Op #{}: {:?} - {}",
            self.result.total_operations, self.result.last_op, message
        ));
    }

    fn check_invariants(&self) -> Result<(), String> {
        // Invariant 1: counter matches the shadow model
        if self.index.total_points_count() != self.expected_points.len() {
            return Err(format!(
                "Count mismatch: actual={}, expected={}",
                self.index.total_points_count(),
                self.expected_points.len()
            ));
        }

        // Invariant 2: counter never exceeds the limit
        if self.index.total_points_count() > self.config.total_points_limit {
            return Err(format!(
                "Count {} exceeds limit {}",
                self.index.total_points_count(),
                self.config.total_points_limit
            ));
        }

        // Invariant 3: traversal yields every expected point exactly once
        let mut seen: HashMap<Vec<String>, u64> = HashMap::new();
        let mut duplicate = None;
        self.index.for_each_point(|coordinate, point| {
            if seen.insert(coordinate.to_vec(), point.id).is_some() {
                duplicate = Some(coordinate.to_vec());
            }
        });
        if let Some(coordinate) = duplicate {
            return Err(format!("Coordinate {:?} visited twice", coordinate));
        }
        if seen != self.expected_points {
            return Err(format!(
                "Traversal mismatch: {} visited, {} expected",
                seen.len(),
                self.expected_points.len()
            ));
        }

        // Invariant 4: per-level values match the union of shadow node keys
        for level in 0..self.config.dimensions {
            let expected: BTreeSet<String> = self
                .expected_nodes
                .iter()
                .filter(|(prefix, _)| prefix.len() == level)
                .flat_map(|(_, keys)| keys.iter().cloned())
                .collect();
            let actual = self.index.dimension_values(level).map_err(|e| e.to_string())?;
            if actual != expected {
                return Err(format!(
                    "Dimension {} values mismatch: actual={:?}, expected={:?}",
                    level, actual, expected
                ));
            }
        }

        Ok(())
    }

    pub fn run(&mut self, operations: usize) {
        for _ in 0..operations {
            self.run_single_op();
            if !self.result.invariant_violations.is_empty() {
                break;
            }
        }
        if self.result.invariant_violations.is_empty() {
            self.index.verify_invariants();
        }
    }

    pub fn result(&self) -> &IndexDSTResult {
        &self.result
    }

    pub fn index(&self) -> &MultidimensionalSeriesIndex<Arc<DstPoint>> {
        &self.index
    }
}

/// Run a batch of DST tests
pub fn run_index_batch(
    start_seed: u64,
    num_seeds: usize,
    ops_per_seed: usize,
    config_fn: fn(u64) -> IndexDSTConfig,
) -> Vec<IndexDSTResult> {
    (0..num_seeds)
        .map(|i| {
            let seed = start_seed + i as u64;
            let config = config_fn(seed);
            let mut harness = IndexDSTHarness::new(config);
            harness.run(ops_per_seed);
            harness.result().clone()
        })
        .collect()
}

/// Summarize batch results
pub fn summarize_index_batch(results: &[IndexDSTResult]) -> String {
    let total = results.len();
    let passed = results.iter().filter(|r| r.is_success()).count();
    let failed = total - passed;
    let total_ops: u64 = results.iter().map(|r| r.total_operations).sum();

    let mut summary = format!(
        "Index DST Summary\n\
         =================\n\
         Seeds: {} total, {} passed, {} failed\n\
         Total operations: {}\n",
        total, passed, failed, total_ops
    );

    if failed > 0 {
        summary.push_str("\nFailed seeds:\n");
        for result in results.iter().filter(|r| !r.is_success()) {
            summary.push_str(&format!("  Seed {}: {}\n", result.seed, result.summary()));
            for violation in &result.invariant_violations {
                summary.push_str(&format!("    - {}\n", violation));
            }
        }
    }

    summary
}
