//! Stateright Model Checking for the series index
//!
//! Exhaustive state-space exploration of the index's insert-if-absent
//! protocol using Stateright. The DST harness in `index::dst` covers
//! sequential behaviour against a shadow model; this model covers every
//! interleaving of a handful of concurrent writers.
//!
//! ## Running Model Checks
//!
//! ```bash
//! # Run all Stateright tests (marked #[ignore] for CI speed)
//! cargo test stateright -- --ignored --nocapture
//! ```
//!
//! ## Available Models
//!
//! - `index_race`: node and total counter reservations inside the publishing
//!   insert of racing writers (POINT_UNIQUE, COUNT_BOUNDED, COUNT_CONSISTENT,
//!   REJECTION_FINAL)

pub mod index_race;

pub use index_race::IndexRaceModel;
