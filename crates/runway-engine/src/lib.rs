#![deny(warnings)]

//! Population-scale runway simulation engine.
//!
//! Agents live in parallel fixed-length columns ([`Population`]) that are
//! advanced month by month, chunk by chunk, through the transition
//! [`Kernel`]. After each month the [`aggregate`] module records population
//! counts and statistics over a fixed sample. Columns can be heap-resident or
//! memory-mapped files; see [`runway_storage`].
//!
//! Randomness is explicit: initialization uses a stream seeded with
//! `seed`, evolution uses per-agent streams derived from `seed + 1` and the
//! month, so results do not depend on chunk size or thread count.

pub mod aggregate;
pub mod driver;
pub mod init;
pub mod kernel;
pub mod population;
pub mod streams;

use rand::distributions::WeightedError;
use rand_distr::NormalError;
use runway_core::ValidationError;
use runway_storage::StorageError;
use thiserror::Error;

pub use aggregate::{FinalSummary, MonthStats, SampleStats, Series, StateCounts};
pub use driver::{run, ExecOptions, Simulation, SimulationOutput};
pub use init::initialize;
pub use kernel::{Kernel, MonthPlan};
pub use population::{ChunkMut, Population};
pub use runway_core::{SimParams, WorkerState};
pub use runway_storage::StorageKind;

/// Errors that abort a run. No partial run is ever attempted.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("invalid distribution parameters: {0}")]
    Distribution(#[from] NormalError),
    #[error("invalid tier weights: {0}")]
    TierWeights(#[from] WeightedError),
}
