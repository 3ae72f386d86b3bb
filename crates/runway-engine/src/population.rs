//! Struct-of-arrays population and its chunk views.

use rayon::prelude::*;
use runway_core::WorkerState;
use runway_storage::{Column, ColumnBackend, StorageError};

/// Per-agent columns, all of length N, indexed by agent id.
#[derive(Debug)]
pub struct Population {
    /// Runway in months; unbounded below.
    pub capital: Column<f32>,
    /// Tier index in `0..TIER_COUNT`, fixed at creation.
    pub tier: Column<u8>,
    /// 1 when employed this month.
    pub employed: Column<u8>,
    /// Consecutive months unemployed, saturating.
    pub unemployment_months: Column<u8>,
    /// [`WorkerState`] code.
    pub state: Column<u8>,
    /// Fixed statistics sample, sorted ascending.
    pub sample: Vec<usize>,
}

impl Population {
    /// Allocate zeroed columns for `n` agents with an empty sample.
    pub fn allocate<B: ColumnBackend>(backend: &B, n: usize) -> Result<Self, StorageError> {
        Ok(Self {
            capital: backend.allocate("capital", n)?,
            tier: backend.allocate("tiers", n)?,
            employed: backend.allocate("employed", n)?,
            unemployment_months: backend.allocate("unemp_months", n)?,
            state: backend.allocate("state", n)?,
            sample: Vec::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.capital.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capital.is_empty()
    }

    /// Decoded state of agent `i`.
    pub fn state_of(&self, i: usize) -> Option<WorkerState> {
        self.state.get(i).copied().and_then(WorkerState::from_code)
    }

    /// Whole population as a single chunk starting at agent 0.
    pub fn as_chunk(&mut self) -> ChunkMut<'_> {
        ChunkMut {
            start: 0,
            capital: &mut self.capital,
            tier: &self.tier,
            employed: &mut self.employed,
            unemployment_months: &mut self.unemployment_months,
            state: &mut self.state,
        }
    }

    /// Contiguous chunks of `chunk_size` agents in index order.
    pub fn chunks_mut(&mut self, chunk_size: usize) -> impl Iterator<Item = ChunkMut<'_>> {
        self.as_chunk().split(chunk_size)
    }

    /// The same partition as [`Population::chunks_mut`], for rayon.
    pub fn par_chunks_mut(
        &mut self,
        chunk_size: usize,
    ) -> impl IndexedParallelIterator<Item = ChunkMut<'_>> {
        self.as_chunk().par_split(chunk_size)
    }

    /// Flush file-backed columns to disk.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.capital.flush()?;
        self.tier.flush()?;
        self.employed.flush()?;
        self.unemployment_months.flush()?;
        self.state.flush()
    }
}

/// Mutable view over agents `start..start + len()` of every column.
///
/// Chunks never overlap, so disjoint chunks can be advanced concurrently.
#[derive(Debug)]
pub struct ChunkMut<'a> {
    /// Global index of the first agent in the chunk.
    pub start: usize,
    pub capital: &'a mut [f32],
    pub tier: &'a [u8],
    pub employed: &'a mut [u8],
    pub unemployment_months: &'a mut [u8],
    pub state: &'a mut [u8],
}

impl<'a> ChunkMut<'a> {
    pub fn len(&self) -> usize {
        self.capital.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capital.is_empty()
    }

    /// Split into consecutive sub-chunks of at most `chunk_size` agents.
    ///
    /// # Panics
    /// Panics if `chunk_size` is zero.
    pub fn split(self, chunk_size: usize) -> impl Iterator<Item = ChunkMut<'a>> {
        let ChunkMut {
            start,
            capital,
            tier,
            employed,
            unemployment_months,
            state,
        } = self;
        capital
            .chunks_mut(chunk_size)
            .zip(tier.chunks(chunk_size))
            .zip(employed.chunks_mut(chunk_size))
            .zip(unemployment_months.chunks_mut(chunk_size))
            .zip(state.chunks_mut(chunk_size))
            .enumerate()
            .map(
                move |(i, ((((capital, tier), employed), unemployment_months), state))| ChunkMut {
                    start: start + i * chunk_size,
                    capital,
                    tier,
                    employed,
                    unemployment_months,
                    state,
                },
            )
    }

    /// Parallel counterpart of [`ChunkMut::split`].
    pub fn par_split(self, chunk_size: usize) -> impl IndexedParallelIterator<Item = ChunkMut<'a>> {
        let ChunkMut {
            start,
            capital,
            tier,
            employed,
            unemployment_months,
            state,
        } = self;
        capital
            .par_chunks_mut(chunk_size)
            .zip(tier.par_chunks(chunk_size))
            .zip(employed.par_chunks_mut(chunk_size))
            .zip(unemployment_months.par_chunks_mut(chunk_size))
            .zip(state.par_chunks_mut(chunk_size))
            .enumerate()
            .map(
                move |(i, ((((capital, tier), employed), unemployment_months), state))| ChunkMut {
                    start: start + i * chunk_size,
                    capital,
                    tier,
                    employed,
                    unemployment_months,
                    state,
                },
            )
    }
}
