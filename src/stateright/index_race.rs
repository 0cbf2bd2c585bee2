//! Stateright Model for racing inserts into one index node
//!
//! Exhaustively verifies the publish protocol, both capacity counters included:
//! - POINT_UNIQUE: every finished writer for a key resolves to the same owner
//! - COUNT_BOUNDED: neither counter exceeds its limit
//! - COUNT_CONSISTENT: each counter == registered points + reservations held
//!   inside a vacant-entry critical section
//! - REJECTION_FINAL: a key rejected for capacity is never registered by any
//!   writer, in flight or not

use stateright::{Model, Property};
use std::collections::BTreeMap;

/// Configuration for the race model
#[derive(Clone, Debug)]
pub struct IndexRaceConfig {
    /// Key each writer tries to create; equal keys race each other
    pub writer_keys: Vec<u8>,
    /// Distinct keys the node may hold
    pub node_keys_limit: usize,
    pub total_points_limit: usize,
}

impl Default for IndexRaceConfig {
    fn default() -> Self {
        IndexRaceConfig {
            writer_keys: vec![0, 0, 1],
            node_keys_limit: 1,
            total_points_limit: 2,
        }
    }
}

/// Which advisory check failed before the chain was built
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Limit {
    Total,
    Node,
}

/// Program counter of one writer
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum WriterPc {
    /// Lookup plus advisory capacity checks
    Start,
    /// An advisory check failed; look the key up again under its shard lock
    Recheck(Limit),
    /// Running the point factory, no lock held
    Build,
    /// Chain built, about to take the entry for its key
    Publish,
    /// Entry vacant and locked, reserving the node counter
    ReserveNode,
    /// Entry locked, node slot held, reserving the total counter
    ReserveTotal,
    /// Entry locked, both slots held
    Insert,
    Done(Outcome),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    Created,
    /// Resolved to the point registered by the given writer
    Existing(usize),
    DimensionLimitReached,
    TotalLimitReached,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IndexRaceState {
    /// Key -> writer whose chain was published
    pub points: BTreeMap<u8, usize>,
    pub node_reserved: usize,
    pub total_points_count: usize,
    /// Key -> writer holding its entry lock
    pub locks: BTreeMap<u8, usize>,
    pub writers: Vec<WriterPc>,
    /// Publishes that found the key already registered
    pub races_lost: usize,
}

impl IndexRaceState {
    fn writers_at(&self, pcs: &[WriterPc]) -> usize {
        self.writers.iter().filter(|pc| pcs.contains(pc)).count()
    }

    fn locked_by_other(&self, key: u8, writer: usize) -> bool {
        self.locks.get(&key).is_some_and(|&holder| holder != writer)
    }

    fn resolve(&self, key: u8, rejected: Outcome) -> WriterPc {
        match self.points.get(&key) {
            Some(&owner) => WriterPc::Done(Outcome::Existing(owner)),
            None => WriterPc::Done(rejected),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IndexRaceAction {
    Step(usize),
}

/// Stateright model of concurrent `try_get_or_create_point` calls on one node
pub struct IndexRaceModel {
    pub config: IndexRaceConfig,
}

impl IndexRaceModel {
    pub fn new() -> Self {
        IndexRaceModel {
            config: IndexRaceConfig::default(),
        }
    }

    pub fn with_config(config: IndexRaceConfig) -> Self {
        IndexRaceModel { config }
    }

    /// A writer waiting on a shard lock held by someone else cannot step
    fn blocked(&self, state: &IndexRaceState, writer: usize) -> bool {
        let key = self.config.writer_keys[writer];
        match state.writers[writer] {
            WriterPc::Publish | WriterPc::Recheck(_) => state.locked_by_other(key, writer),
            _ => false,
        }
    }
}

impl Default for IndexRaceModel {
    fn default() -> Self {
        Self::new()
    }
}

impl Model for IndexRaceModel {
    type State = IndexRaceState;
    type Action = IndexRaceAction;

    fn init_states(&self) -> Vec<Self::State> {
        vec![IndexRaceState {
            points: BTreeMap::new(),
            node_reserved: 0,
            total_points_count: 0,
            locks: BTreeMap::new(),
            writers: vec![WriterPc::Start; self.config.writer_keys.len()],
            races_lost: 0,
        }]
    }

    fn actions(&self, state: &Self::State, actions: &mut Vec<Self::Action>) {
        for (writer, pc) in state.writers.iter().enumerate() {
            if !matches!(pc, WriterPc::Done(_)) && !self.blocked(state, writer) {
                actions.push(IndexRaceAction::Step(writer));
            }
        }
    }

    fn next_state(&self, state: &Self::State, action: Self::Action) -> Option<Self::State> {
        let IndexRaceAction::Step(writer) = action;
        if self.blocked(state, writer) {
            return None;
        }
        let key = self.config.writer_keys[writer];
        let node_limit = self.config.node_keys_limit;
        let total_limit = self.config.total_points_limit;
        let mut next = state.clone();

        next.writers[writer] = match &state.writers[writer] {
            WriterPc::Start => match next.points.get(&key) {
                Some(&owner) => WriterPc::Done(Outcome::Existing(owner)),
                None if next.total_points_count >= total_limit => WriterPc::Recheck(Limit::Total),
                None if next.node_reserved >= node_limit => WriterPc::Recheck(Limit::Node),
                None => WriterPc::Build,
            },
            WriterPc::Recheck(Limit::Total) => next.resolve(key, Outcome::TotalLimitReached),
            WriterPc::Recheck(Limit::Node) => next.resolve(key, Outcome::DimensionLimitReached),
            WriterPc::Build => WriterPc::Publish,
            WriterPc::Publish => match next.points.get(&key) {
                Some(&owner) => {
                    // Lost the race: drop the chain, no counter was touched
                    next.races_lost += 1;
                    WriterPc::Done(Outcome::Existing(owner))
                }
                None => {
                    next.locks.insert(key, writer);
                    WriterPc::ReserveNode
                }
            },
            WriterPc::ReserveNode => {
                if next.node_reserved < node_limit {
                    next.node_reserved += 1;
                    WriterPc::ReserveTotal
                } else {
                    next.locks.remove(&key);
                    WriterPc::Done(Outcome::DimensionLimitReached)
                }
            }
            WriterPc::ReserveTotal => {
                if next.total_points_count < total_limit {
                    next.total_points_count += 1;
                    WriterPc::Insert
                } else {
                    next.node_reserved -= 1;
                    next.locks.remove(&key);
                    WriterPc::Done(Outcome::TotalLimitReached)
                }
            }
            WriterPc::Insert => {
                next.points.insert(key, writer);
                next.locks.remove(&key);
                WriterPc::Done(Outcome::Created)
            }
            WriterPc::Done(_) => return None,
        };

        Some(next)
    }

    fn properties(&self) -> Vec<Property<Self>> {
        vec![
            // INVARIANT 1: Neither counter exceeds its limit
            Property::always("count_bounded", |model: &IndexRaceModel, state: &IndexRaceState| {
                state.node_reserved <= model.config.node_keys_limit
                    && state.total_points_count <= model.config.total_points_limit
            }),

            // INVARIANT 2: Counters = registered points + slots held under an entry lock
            Property::always("count_consistent", |_model: &IndexRaceModel, state: &IndexRaceState| {
                let registered = state.points.len();
                state.total_points_count == registered + state.writers_at(&[WriterPc::Insert])
                    && state.node_reserved
                        == registered + state.writers_at(&[WriterPc::ReserveTotal, WriterPc::Insert])
            }),

            // INVARIANT 3: All successful writers of a key agree on its owner
            Property::always("point_unique", |model: &IndexRaceModel, state: &IndexRaceState| {
                state.writers.iter().enumerate().all(|(writer, pc)| {
                    let key = model.config.writer_keys[writer];
                    match pc {
                        WriterPc::Done(Outcome::Created) => state.points.get(&key) == Some(&writer),
                        WriterPc::Done(Outcome::Existing(owner)) => state.points.get(&key) == Some(owner),
                        _ => true,
                    }
                })
            }),

            // INVARIANT 4: A rejected key stays unregistered, so no same-key
            // writer in flight at the time could have succeeded instead
            Property::always("rejected_key_never_registered", |model: &IndexRaceModel, state: &IndexRaceState| {
                state.writers.iter().enumerate().all(|(writer, pc)| match pc {
                    WriterPc::Done(Outcome::TotalLimitReached)
                    | WriterPc::Done(Outcome::DimensionLimitReached) => {
                        !state.points.contains_key(&model.config.writer_keys[writer])
                    }
                    _ => true,
                })
            }),

            // The losing path is reachable
            Property::sometimes("race_lost", |_model: &IndexRaceModel, state: &IndexRaceState| {
                state.races_lost > 0
            }),

            // Capacity rejection is reachable
            Property::sometimes("limit_rejected", |_model: &IndexRaceModel, state: &IndexRaceState| {
                state.writers.iter().any(|pc| {
                    matches!(
                        pc,
                        WriterPc::Done(Outcome::TotalLimitReached)
                            | WriterPc::Done(Outcome::DimensionLimitReached)
                    )
                })
            }),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_all(model: &IndexRaceModel, mut state: IndexRaceState, writers: &[usize]) -> IndexRaceState {
        for &writer in writers {
            state = model.next_state(&state, IndexRaceAction::Step(writer)).unwrap();
        }
        state
    }

    #[test]
    fn test_single_writer_creates() {
        let model = IndexRaceModel::with_config(IndexRaceConfig {
            writer_keys: vec![0],
            node_keys_limit: 1,
            total_points_limit: 1,
        });
        let state = step_all(&model, model.init_states().remove(0), &[0; 6]);
        assert_eq!(state.writers[0], WriterPc::Done(Outcome::Created));
        assert_eq!(state.total_points_count, 1);
        assert_eq!(state.node_reserved, 1);
        assert!(state.locks.is_empty());
        assert!(model.next_state(&state, IndexRaceAction::Step(0)).is_none());
    }

    #[test]
    fn test_builder_holds_no_slot_so_late_caller_succeeds() {
        let model = IndexRaceModel::with_config(IndexRaceConfig {
            writer_keys: vec![0, 0],
            node_keys_limit: 1,
            total_points_limit: 1,
        });
        // Writer 0 is still building when writer 1 passes its checks
        let mut state = step_all(&model, model.init_states().remove(0), &[0, 1, 1]);
        assert_eq!(state.writers[0], WriterPc::Build);
        assert_eq!(state.writers[1], WriterPc::Publish);
        assert_eq!(state.node_reserved, 0);

        state = step_all(&model, state, &[0, 0, 0, 0, 0]);
        assert_eq!(state.writers[0], WriterPc::Done(Outcome::Created));

        state = step_all(&model, state, &[1]);
        assert_eq!(state.writers[1], WriterPc::Done(Outcome::Existing(0)));
        assert_eq!(state.races_lost, 1);
        assert_eq!(state.total_points_count, 1);
    }

    #[test]
    fn test_recheck_waits_for_publisher_of_same_key() {
        let model = IndexRaceModel::with_config(IndexRaceConfig {
            writer_keys: vec![0, 0],
            node_keys_limit: 1,
            total_points_limit: 1,
        });
        // Writer 0 holds the entry lock and both slots
        let state = step_all(&model, model.init_states().remove(0), &[0, 0, 0, 0, 0]);
        assert_eq!(state.writers[0], WriterPc::Insert);

        let state = step_all(&model, state, &[1]);
        assert_eq!(state.writers[1], WriterPc::Recheck(Limit::Total));
        assert!(model.next_state(&state, IndexRaceAction::Step(1)).is_none());

        let state = step_all(&model, state, &[0, 1]);
        assert_eq!(state.writers[1], WriterPc::Done(Outcome::Existing(0)));
    }

    #[test]
    fn test_total_refusal_releases_node_slot() {
        let model = IndexRaceModel::with_config(IndexRaceConfig {
            writer_keys: vec![0, 1],
            node_keys_limit: 2,
            total_points_limit: 1,
        });
        // Both pass the advisory checks before either publishes
        let mut state = step_all(&model, model.init_states().remove(0), &[0, 1, 0, 1]);
        state = step_all(&model, state, &[0, 0, 0, 0]);
        assert_eq!(state.writers[0], WriterPc::Done(Outcome::Created));

        state = step_all(&model, state, &[1, 1, 1]);
        assert_eq!(state.writers[1], WriterPc::Done(Outcome::TotalLimitReached));
        assert_eq!(state.node_reserved, 1);
        assert_eq!(state.total_points_count, 1);
        assert!(!state.points.contains_key(&1));
    }

    #[test]
    #[ignore] // Run with: cargo test stateright_index_race -- --ignored --nocapture
    fn stateright_index_race_model_check() {
        use stateright::Checker;

        let model = IndexRaceModel::new();
        let checker = model.checker().spawn_bfs().join();

        println!("States explored: {}", checker.unique_state_count());

        checker.assert_properties();

        println!("Model check passed! All index race invariants hold.");
    }

    #[test]
    #[ignore]
    fn stateright_index_race_more_keys_than_capacity() {
        use stateright::Checker;

        let model = IndexRaceModel::with_config(IndexRaceConfig {
            writer_keys: vec![0, 0, 1, 2],
            node_keys_limit: 3,
            total_points_limit: 2,
        });
        let checker = model.checker().spawn_bfs().join();
        checker.assert_properties();
    }
}
