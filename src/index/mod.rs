//! Multidimensional Series Index
//!
//! A concurrent, capacity-bounded N-ary tree that maps an ordered tuple of
//! dimension values (a coordinate) to exactly one lazily created point.
//!
//! ```text
//!   root (level 0)        "Red" ──► node (level 1)   "S" ──► point
//!                                                    "M" ──► point
//!                         "Blue" ─► node (level 1)   "S" ──► point
//! ```
//!
//! # Concurrency
//!
//! - Each node is a `DashMap` mutated only through insert-if-absent; nothing
//!   is ever removed.
//! - The missing suffix of a path (new branches plus the point) is built as a
//!   detached chain outside any map lock, then published with one
//!   insert-if-absent at the first missing level. Nothing is visible until
//!   the point is, so a rejected create leaves no trace.
//! - Capacity counters (per-node distinct keys, total points) are reserved
//!   with an atomic check-and-increment inside the vacant-entry critical
//!   section of the publishing insert, node first, then total. A node
//!   reservation is released if the total refuses.
//! - The loser of an insertion race drops its chain and adopts the winner;
//!   it never touches a counter, so a lost race still reports success.

pub mod dst;

use crate::error::{MetricsError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Shard count for per-node maps. Nodes are numerous and mostly small, so
/// they do not get the CPU-scaled default.
const NODE_SHARD_AMOUNT: usize = 4;

/// Builds the point stored at a newly created coordinate.
///
/// May be invoked more than once for the same coordinate under a race; only
/// one result is kept.
pub type PointFactory<P> = Box<dyn Fn(&[String]) -> P + Send + Sync>;

/// Outcome of [`MultidimensionalSeriesIndex::try_get_or_create_point`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointResult<P> {
    /// This call registered a new point
    Created(P),
    /// The point already existed (or a concurrent caller registered it first)
    Existing(P),
    /// A new value at `dimension_index` would exceed that level's per-node limit
    DimensionValuesLimitReached { dimension_index: usize },
    /// A new coordinate would exceed the total points limit
    TotalPointsLimitReached,
}

impl<P> PointResult<P> {
    pub fn is_success(&self) -> bool {
        matches!(self, PointResult::Created(_) | PointResult::Existing(_))
    }

    pub fn is_created(&self) -> bool {
        matches!(self, PointResult::Created(_))
    }

    /// The resolved point, if any
    pub fn into_point(self) -> Option<P> {
        match self {
            PointResult::Created(p) | PointResult::Existing(p) => Some(p),
            _ => None,
        }
    }
}

#[derive(Clone)]
enum Slot<P> {
    Branch(Arc<SubIndex<P>>),
    Point(P),
}

impl<P> Slot<P> {
    fn into_branch(self) -> Arc<SubIndex<P>> {
        match self {
            Slot::Branch(child) => child,
            Slot::Point(_) => unreachable!("inner levels only hold branches"),
        }
    }

    fn into_point(self) -> P {
        match self {
            Slot::Point(p) => p,
            Slot::Branch(_) => unreachable!("the last level only holds points"),
        }
    }
}

struct SubIndex<P> {
    entries: DashMap<String, Slot<P>, ahash::RandomState>,
    /// Committed keys plus in-flight reservations
    reserved_keys: AtomicUsize,
}

impl<P: Clone> SubIndex<P> {
    fn new() -> Self {
        SubIndex {
            entries: DashMap::with_hasher_and_shard_amount(
                ahash::RandomState::new(),
                NODE_SHARD_AMOUNT,
            ),
            reserved_keys: AtomicUsize::new(0),
        }
    }

    /// Unpublished node holding one committed key
    fn with_single(key: String, slot: Slot<P>) -> Self {
        let node = Self::new();
        node.entries.insert(key, slot);
        node.reserved_keys.store(1, Ordering::Release);
        node
    }

    /// Clone the slot out so no shard guard outlives the lookup
    fn get(&self, key: &str) -> Option<Slot<P>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn snapshot(&self) -> Vec<(String, Slot<P>)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

fn try_reserve(counter: &AtomicUsize, limit: usize) -> bool {
    counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            if current < limit {
                Some(current + 1)
            } else {
                None
            }
        })
        .is_ok()
}

fn release(counter: &AtomicUsize) {
    counter.fetch_sub(1, Ordering::AcqRel);
}

/// Where a lookup stopped
enum Descent<P> {
    Found(P),
    /// `node` sits at `level` and lacks the coordinate's key for that level
    Missing { node: Arc<SubIndex<P>>, level: usize },
}

enum Publish<P> {
    Inserted,
    /// Another caller registered the key first
    Occupied,
    Rejected(PointResult<P>),
}

pub(crate) fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Concurrent lookup structure from coordinates to points
pub struct MultidimensionalSeriesIndex<P> {
    root: Arc<SubIndex<P>>,
    dimension_values_count_limits: Vec<usize>,
    total_points_count_limit: usize,
    total_points_count: AtomicUsize,
    point_factory: PointFactory<P>,
}

impl<P: Clone> MultidimensionalSeriesIndex<P> {
    /// Create an index with one value limit per dimension.
    ///
    /// The number of dimensions is `dimension_values_count_limits.len()` and
    /// must be at least one; every limit must be at least one.
    pub fn new<F>(
        dimension_values_count_limits: Vec<usize>,
        total_points_count_limit: usize,
        point_factory: F,
    ) -> Result<Self>
    where
        F: Fn(&[String]) -> P + Send + Sync + 'static,
    {
        if dimension_values_count_limits.is_empty() {
            return Err(MetricsError::InvalidConfiguration(
                "an index needs at least one dimension".to_string(),
            ));
        }
        if let Some(level) = dimension_values_count_limits.iter().position(|&l| l == 0) {
            return Err(MetricsError::InvalidConfiguration(format!(
                "values limit for dimension {} must be at least 1",
                level + 1
            )));
        }
        if total_points_count_limit == 0 {
            return Err(MetricsError::InvalidConfiguration(
                "total points limit must be at least 1".to_string(),
            ));
        }

        Ok(MultidimensionalSeriesIndex {
            root: Arc::new(SubIndex::new()),
            dimension_values_count_limits,
            total_points_count_limit,
            total_points_count: AtomicUsize::new(0),
            point_factory: Box::new(point_factory),
        })
    }

    pub fn dimensions_count(&self) -> usize {
        self.dimension_values_count_limits.len()
    }

    pub fn total_points_count(&self) -> usize {
        self.total_points_count.load(Ordering::Acquire)
    }

    pub fn total_points_count_limit(&self) -> usize {
        self.total_points_count_limit
    }

    /// Per-node distinct value limit for a 0-based dimension index
    pub fn dimension_values_count_limit(&self, dimension_index: usize) -> Option<usize> {
        self.dimension_values_count_limits.get(dimension_index).copied()
    }

    fn validate_coordinate<V: AsRef<str>>(&self, coordinate: &[V]) -> Result<()> {
        if coordinate.len() != self.dimensions_count() {
            return Err(MetricsError::DimensionArityMismatch {
                expected: self.dimensions_count(),
                actual: coordinate.len(),
            });
        }
        if let Some(dimension_index) = coordinate.iter().position(|v| is_blank(v.as_ref())) {
            return Err(MetricsError::InvalidDimensionValue { dimension_index });
        }
        Ok(())
    }

    /// Advisory capacity check made before building a chain. Total first,
    /// then the node at `level`.
    fn capacity_rejection(&self, node: &SubIndex<P>, level: usize) -> Option<PointResult<P>> {
        if self.total_points_count.load(Ordering::Acquire) >= self.total_points_count_limit {
            return Some(PointResult::TotalPointsLimitReached);
        }
        if node.reserved_keys.load(Ordering::Acquire) >= self.dimension_values_count_limits[level] {
            return Some(PointResult::DimensionValuesLimitReached {
                dimension_index: level,
            });
        }
        None
    }

    fn descend<V: AsRef<str>>(&self, coordinate: &[V]) -> Descent<P> {
        let last = self.dimensions_count() - 1;
        let mut node = Arc::clone(&self.root);
        for (level, value) in coordinate[..last].iter().enumerate() {
            match node.get(value.as_ref()) {
                Some(slot) => node = slot.into_branch(),
                None => return Descent::Missing { node, level },
            }
        }
        match node.get(coordinate[last].as_ref()) {
            Some(slot) => Descent::Found(slot.into_point()),
            None => Descent::Missing { node, level: last },
        }
    }

    /// Look up a point without creating anything.
    pub fn try_get_point<V: AsRef<str>>(&self, coordinate: &[V]) -> Result<Option<P>> {
        self.validate_coordinate(coordinate)?;
        match self.descend(coordinate) {
            Descent::Found(point) => Ok(Some(point)),
            Descent::Missing { .. } => Ok(None),
        }
    }

    /// Resolve a coordinate to its point, creating the missing part of the path.
    ///
    /// Capacity exhaustion is reported through the returned [`PointResult`];
    /// only malformed coordinates produce an `Err`.
    pub fn try_get_or_create_point<V: AsRef<str>>(&self, coordinate: &[V]) -> Result<PointResult<P>> {
        self.validate_coordinate(coordinate)?;

        // Each pass either returns or finds the first missing level deeper
        // than before, since keys are never removed.
        loop {
            let (node, level) = match self.descend(coordinate) {
                Descent::Found(point) => return Ok(PointResult::Existing(point)),
                Descent::Missing { node, level } => (node, level),
            };
            let key = coordinate[level].as_ref();

            if let Some(rejected) = self.capacity_rejection(&node, level) {
                // A publisher of this very key may hold the counter right now.
                // Its shard lock orders this lookup after its insert.
                if node.get(key).is_some() {
                    continue;
                }
                debug!(
                    dimension_index = level,
                    value = key,
                    total_full = matches!(rejected, PointResult::TotalPointsLimitReached),
                    "capacity limit reached"
                );
                return Ok(rejected);
            }

            let (chain, point) = self.build_chain(coordinate, level);
            match self.publish(&node, level, key, chain) {
                Publish::Inserted => {
                    debug!(dimension_index = level, value = key, "created point");
                    return Ok(PointResult::Created(point));
                }
                Publish::Occupied => {
                    trace!(dimension_index = level, value = key, "lost insertion race");
                }
                Publish::Rejected(rejected) => {
                    debug!(
                        dimension_index = level,
                        value = key,
                        total_full = matches!(rejected, PointResult::TotalPointsLimitReached),
                        "capacity limit reached"
                    );
                    return Ok(rejected);
                }
            }
        }
    }

    /// Build the point and every branch below `level`, unpublished.
    /// Runs the point factory with no lock held.
    fn build_chain<V: AsRef<str>>(&self, coordinate: &[V], level: usize) -> (Slot<P>, P) {
        let owned: Vec<String> = coordinate.iter().map(|v| v.as_ref().to_string()).collect();
        let point = (self.point_factory)(&owned);

        let mut chain = Slot::Point(point.clone());
        for depth in (level + 1..owned.len()).rev() {
            chain = Slot::Branch(Arc::new(SubIndex::with_single(owned[depth].clone(), chain)));
        }
        (chain, point)
    }

    /// Insert-if-absent of a chain at `node`. Counters are reserved only while
    /// the entry for `key` is locked and vacant.
    fn publish(&self, node: &SubIndex<P>, level: usize, key: &str, chain: Slot<P>) -> Publish<P> {
        match node.entries.entry(key.to_string()) {
            Entry::Occupied(_) => Publish::Occupied,
            Entry::Vacant(vacant) => {
                if !try_reserve(&node.reserved_keys, self.dimension_values_count_limits[level]) {
                    return Publish::Rejected(PointResult::DimensionValuesLimitReached {
                        dimension_index: level,
                    });
                }
                if !try_reserve(&self.total_points_count, self.total_points_count_limit) {
                    release(&node.reserved_keys);
                    return Publish::Rejected(PointResult::TotalPointsLimitReached);
                }
                vacant.insert(chain);
                Publish::Inserted
            }
        }
    }

    /// Distinct values registered at a 0-based dimension index, across all nodes
    /// of that level. Concurrent insertions may or may not be included.
    pub fn dimension_values(&self, dimension_index: usize) -> Result<BTreeSet<String>> {
        if dimension_index >= self.dimensions_count() {
            return Err(MetricsError::InvalidDimensionNumber {
                number: dimension_index + 1,
                dimensions_count: self.dimensions_count(),
            });
        }
        let mut values = BTreeSet::new();
        collect_dimension_values(&self.root, 0, dimension_index, &mut values);
        Ok(values)
    }

    /// Depth-first visit of every point with its coordinate.
    ///
    /// Each node is snapshotted before its children are visited, so the
    /// callback runs without holding any map guard.
    pub fn for_each_point<F>(&self, mut f: F)
    where
        F: FnMut(&[String], &P),
    {
        let mut prefix = Vec::with_capacity(self.dimensions_count());
        visit_points(&self.root, &mut prefix, &mut f);
    }

    /// All points paired with their coordinates
    pub fn all_points(&self) -> Vec<(Vec<String>, P)> {
        let mut points = Vec::with_capacity(self.total_points_count());
        self.for_each_point(|coordinate, point| points.push((coordinate.to_vec(), point.clone())));
        points
    }

    /// Verify structural invariants. Only meaningful while no writer is active.
    #[cfg(debug_assertions)]
    pub fn verify_invariants(&self) {
        let leaves = self.verify_node(&self.root, 0);

        // Invariant 1: the counter equals the number of reachable points
        debug_assert_eq!(
            leaves,
            self.total_points_count(),
            "Invariant violated: {} reachable points but counter is {}",
            leaves,
            self.total_points_count()
        );

        // Invariant 2: the counter never exceeds its limit
        debug_assert!(
            self.total_points_count() <= self.total_points_count_limit,
            "Invariant violated: {} points exceeds limit {}",
            self.total_points_count(),
            self.total_points_count_limit
        );
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    pub fn verify_invariants(&self) {}

    #[cfg(debug_assertions)]
    fn verify_node(&self, node: &SubIndex<P>, level: usize) -> usize {
        let entries = node.snapshot();

        // Invariant 3: no node holds more keys than its level allows
        debug_assert!(
            entries.len() <= self.dimension_values_count_limits[level],
            "Invariant violated: level {} node holds {} keys, limit {}",
            level,
            entries.len(),
            self.dimension_values_count_limits[level]
        );

        // Invariant 4: no reservation is left behind once writers are idle
        debug_assert_eq!(
            entries.len(),
            node.reserved_keys.load(Ordering::Acquire),
            "Invariant violated: level {} node reservation count drifted",
            level
        );

        entries
            .into_iter()
            .map(|(_, slot)| match slot {
                Slot::Branch(child) => self.verify_node(&child, level + 1),
                Slot::Point(_) => 1,
            })
            .sum()
    }
}

fn collect_dimension_values<P: Clone>(
    node: &SubIndex<P>,
    depth: usize,
    target: usize,
    out: &mut BTreeSet<String>,
) {
    if depth == target {
        out.extend(node.entries.iter().map(|entry| entry.key().clone()));
        return;
    }
    for (_, slot) in node.snapshot() {
        if let Slot::Branch(child) = slot {
            collect_dimension_values(&child, depth + 1, target, out);
        }
    }
}

fn visit_points<P: Clone, F>(node: &SubIndex<P>, prefix: &mut Vec<String>, f: &mut F)
where
    F: FnMut(&[String], &P),
{
    for (key, slot) in node.snapshot() {
        prefix.push(key);
        match slot {
            Slot::Branch(child) => visit_points(&child, prefix, f),
            Slot::Point(point) => f(prefix, &point),
        }
        prefix.pop();
    }
}
