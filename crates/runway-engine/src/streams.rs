//! Seeded random sources.
//!
//! Initialization draws from a single ChaCha8 stream. Evolution derives one
//! key per month and gives every agent its own ChaCha8 stream under that key,
//! so an agent's draws depend only on `(seed, month, agent index)` and never
//! on chunk size, chunk order or thread count.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Generator for the initialization stream.
pub fn init_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Key material for one month of evolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonthStreams {
    key: [u8; 32],
}

impl MonthStreams {
    pub fn new(evolution_seed: u64, month: u32) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(evolution_seed);
        rng.set_stream(u64::from(month));
        let mut key = [0u8; 32];
        rng.fill_bytes(&mut key);
        Self { key }
    }

    /// Independent generator for agent `index` this month.
    pub fn agent(&self, index: usize) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::from_seed(self.key);
        rng.set_stream(index as u64);
        rng
    }
}
