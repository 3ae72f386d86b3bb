//! Month loop over the chunked population.

use rayon::prelude::*;
use runway_core::SimParams;
use runway_storage::{FileMapped, Resident, StorageKind};
use tracing::{debug, info};

use crate::aggregate::{month_stats, FinalSummary, MonthStats, Series};
use crate::init::initialize;
use crate::kernel::{Kernel, MonthPlan};
use crate::population::Population;
use crate::SimError;

/// How a run executes, as opposed to what it simulates.
#[derive(Clone, Debug)]
pub struct ExecOptions {
    pub storage: StorageKind,
    /// Log progress every this many months; 0 disables.
    pub progress_every: u32,
    /// Advance the chunks of a month on the rayon pool.
    pub parallel: bool,
    /// Return the ending per-agent columns with the series.
    pub keep_population: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            storage: StorageKind::Resident,
            progress_every: 12,
            parallel: false,
            keep_population: false,
        }
    }
}

/// Result of a run.
#[derive(Debug)]
pub struct SimulationOutput {
    pub population_size: usize,
    pub series: Series,
    /// Ending columns, when requested.
    pub population: Option<Population>,
}

impl SimulationOutput {
    pub fn summary(&self) -> Option<FinalSummary> {
        self.series.summary(self.population_size)
    }
}

/// A run in progress, advanced one month at a time.
pub struct Simulation {
    params: SimParams,
    options: ExecOptions,
    kernel: Kernel,
    population: Population,
    series: Series,
    month: u32,
}

impl Simulation {
    /// Validate inputs and draw the initial population.
    pub fn new(n: usize, params: SimParams, options: ExecOptions) -> Result<Self, SimError> {
        params.validate(n)?;
        let kernel = Kernel::new(&params)?;
        let population = match &options.storage {
            StorageKind::Resident => initialize(n, &params, params.seed, &Resident)?,
            StorageKind::FileMapped { dir } => {
                initialize(n, &params, params.seed, &FileMapped::new(dir))?
            }
        };
        info!(
            n,
            months = params.months,
            chunk_size = params.chunk_size,
            sample = population.sample.len(),
            storage = ?options.storage,
            parallel = options.parallel,
            "simulation initialized"
        );
        let series = Series::new(params.hist_bins.clone());
        Ok(Self {
            params,
            options,
            kernel,
            population,
            series,
            month: 0,
        })
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn series(&self) -> &Series {
        &self.series
    }

    /// Months simulated so far.
    pub fn months_run(&self) -> u32 {
        self.month
    }

    pub fn is_complete(&self) -> bool {
        self.month >= self.params.months
    }

    /// Advance one month and record its aggregates. Returns `None` once the
    /// configured horizon is reached.
    pub fn step(&mut self) -> Option<MonthStats> {
        if self.is_complete() {
            return None;
        }
        let plan = MonthPlan::new(&self.params, self.month);
        let chunk_size = self.params.chunk_size;
        let kernel = &self.kernel;
        if self.options.parallel {
            self.population
                .par_chunks_mut(chunk_size)
                .for_each(|chunk| kernel.advance_chunk(&plan, chunk));
        } else {
            for chunk in self.population.chunks_mut(chunk_size) {
                kernel.advance_chunk(&plan, chunk);
            }
        }

        let stats = month_stats(
            plan.month,
            plan.slot_ratio,
            &self.population,
            &self.params.hist_bins,
        );
        self.series.push(&stats);
        self.month += 1;

        debug!(
            month = plan.month,
            active = stats.counts.active(),
            exited = stats.counts.exited,
            "month complete"
        );
        let every = self.options.progress_every;
        if every > 0 && self.month % every == 0 {
            info!(
                month = self.month,
                months = self.params.months,
                active = stats.counts.active(),
                exited = stats.counts.exited,
                emp_rate = stats.counts.employment_rate(),
                unemp_rate = stats.counts.unemployment_rate(),
                median_runway = stats.sample.p50,
                slot_ratio = plan.slot_ratio,
                "progress"
            );
        }
        Some(stats)
    }

    /// Flush storage and hand back the series, plus the columns if requested.
    pub fn finish(self) -> Result<SimulationOutput, SimError> {
        self.population.flush()?;
        let population_size = self.population.len();
        let population = self.options.keep_population.then_some(self.population);
        Ok(SimulationOutput {
            population_size,
            series: self.series,
            population,
        })
    }
}

/// Simulate `n` agents for `params.months` months.
pub fn run(n: usize, params: SimParams, options: ExecOptions) -> Result<SimulationOutput, SimError> {
    let mut sim = Simulation::new(n, params, options)?;
    while sim.step().is_some() {}
    let out = sim.finish()?;
    if let Some(summary) = out.summary() {
        info!(
            exited = summary.exited,
            exited_pct = summary.exited_pct,
            unemployment_rate = summary.unemployment_rate,
            median_runway = summary.median_runway,
            "simulation finished"
        );
    }
    Ok(out)
}
