//! Per-month aggregate statistics and the time series they feed.
//!
//! Counts cover the full population. Runway statistics cover only the fixed
//! sample. Histogram bins are half-open `[e_i, e_{i+1})` except the last,
//! which is closed; sample values outside `[e_0, e_k]` are dropped and
//! tallied separately, never clamped into an edge bin.

use runway_core::WorkerState;
use serde::{Deserialize, Serialize};

use crate::population::Population;

/// Population-wide counts for one month.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub stable: u64,
    pub precarious: u64,
    pub insolvent: u64,
    pub exited: u64,
    /// Active and employed.
    pub employed: u64,
    /// Active and unemployed.
    pub unemployed: u64,
}

impl StateCounts {
    pub fn active(&self) -> u64 {
        self.stable + self.precarious + self.insolvent
    }

    pub fn employment_rate(&self) -> f64 {
        self.employed as f64 / self.active().max(1) as f64
    }

    pub fn unemployment_rate(&self) -> f64 {
        self.unemployed as f64 / self.active().max(1) as f64
    }
}

/// Runway statistics over the fixed sample.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleStats {
    pub mean: f32,
    pub p10: f32,
    pub p50: f32,
    pub p90: f32,
    pub histogram: Vec<u64>,
    /// Sample values outside the outermost edges.
    pub dropped: u64,
}

/// Everything recorded for one month.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonthStats {
    pub month: u32,
    pub slot_ratio: f64,
    pub counts: StateCounts,
    pub sample: SampleStats,
}

/// Count states and employment across full columns.
pub fn count_states(state: &[u8], employed: &[u8]) -> StateCounts {
    let mut counts = StateCounts::default();
    for (&s, &e) in state.iter().zip(employed) {
        match WorkerState::from_code(s) {
            Some(WorkerState::Exited) => {
                counts.exited += 1;
                continue;
            }
            Some(WorkerState::Stable) => counts.stable += 1,
            Some(WorkerState::Precarious) => counts.precarious += 1,
            Some(WorkerState::Insolvent) => counts.insolvent += 1,
            None => continue,
        }
        if e == 1 {
            counts.employed += 1;
        } else {
            counts.unemployed += 1;
        }
    }
    counts
}

/// Linear-interpolated percentile of an ascending slice, `q` in [0, 100].
pub fn percentile(sorted: &[f32], q: f64) -> f32 {
    match sorted.len() {
        0 => f32::NAN,
        1 => sorted[0],
        n => {
            let rank = (q / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            let frac = rank - lo as f64;
            let a = f64::from(sorted[lo]);
            let b = f64::from(sorted[hi]);
            (a + frac * (b - a)) as f32
        }
    }
}

/// Bin `values` against `edges`, returning per-bin counts and the number of
/// values dropped for lying outside the edges.
pub fn histogram(values: &[f32], edges: &[f64]) -> (Vec<u64>, u64) {
    let bins = edges.len().saturating_sub(1);
    let mut counts = vec![0u64; bins];
    let mut dropped = 0u64;
    let (Some(&lo), Some(&hi)) = (edges.first(), edges.last()) else {
        return (counts, values.len() as u64);
    };
    for &v in values {
        let v = f64::from(v);
        if !(lo..=hi).contains(&v) || bins == 0 {
            dropped += 1;
        } else if v == hi {
            counts[bins - 1] += 1;
        } else {
            let i = edges.partition_point(|&e| e <= v) - 1;
            counts[i] += 1;
        }
    }
    (counts, dropped)
}

/// Runway statistics for the agents listed in `sample`.
pub fn sample_stats(capital: &[f32], sample: &[usize], edges: &[f64]) -> SampleStats {
    let mut values: Vec<f32> = sample.iter().filter_map(|&i| capital.get(i).copied()).collect();
    let mean = if values.is_empty() {
        f32::NAN
    } else {
        (values.iter().map(|&v| f64::from(v)).sum::<f64>() / values.len() as f64) as f32
    };
    let (histogram, dropped) = histogram(&values, edges);
    values.sort_unstable_by(f32::total_cmp);
    SampleStats {
        mean,
        p10: percentile(&values, 10.0),
        p50: percentile(&values, 50.0),
        p90: percentile(&values, 90.0),
        histogram,
        dropped,
    }
}

/// Compute the statistics for `month` from the current population.
pub fn month_stats(month: u32, slot_ratio: f64, pop: &Population, edges: &[f64]) -> MonthStats {
    MonthStats {
        month,
        slot_ratio,
        counts: count_states(&pop.state, &pop.employed),
        sample: sample_stats(&pop.capital, &pop.sample, edges),
    }
}

/// Month-indexed aggregate series for a run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub active: Vec<u64>,
    pub exited: Vec<u64>,
    pub employed: Vec<u64>,
    pub unemployed: Vec<u64>,
    pub stable: Vec<u64>,
    pub precarious: Vec<u64>,
    pub insolvent: Vec<u64>,
    pub mean_runway_sample: Vec<f32>,
    pub p10_runway_sample: Vec<f32>,
    pub p50_runway_sample: Vec<f32>,
    pub p90_runway_sample: Vec<f32>,
    /// One row of bin counts per month.
    pub hist_runway_sample: Vec<Vec<u64>>,
    pub hist_dropped_sample: Vec<u64>,
    pub hist_bins: Vec<f64>,
    pub slot_ratio: Vec<f64>,
    /// Slot ratio of the last month recorded.
    pub final_effective_job_slot_ratio: f64,
}

impl Series {
    pub fn new(hist_bins: Vec<f64>) -> Self {
        Self {
            hist_bins,
            ..Self::default()
        }
    }

    /// Number of months recorded.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn push(&mut self, stats: &MonthStats) {
        let c = &stats.counts;
        self.active.push(c.active());
        self.exited.push(c.exited);
        self.employed.push(c.employed);
        self.unemployed.push(c.unemployed);
        self.stable.push(c.stable);
        self.precarious.push(c.precarious);
        self.insolvent.push(c.insolvent);

        let s = &stats.sample;
        self.mean_runway_sample.push(s.mean);
        self.p10_runway_sample.push(s.p10);
        self.p50_runway_sample.push(s.p50);
        self.p90_runway_sample.push(s.p90);
        self.hist_runway_sample.push(s.histogram.clone());
        self.hist_dropped_sample.push(s.dropped);

        self.slot_ratio.push(stats.slot_ratio);
        self.final_effective_job_slot_ratio = stats.slot_ratio;
    }

    /// End-of-run summary for a population of `n`, if any month was recorded.
    pub fn summary(&self, n: usize) -> Option<FinalSummary> {
        let last = self.len().checked_sub(1)?;
        let active = self.active[last];
        let exited = self.exited[last];
        Some(FinalSummary {
            months: self.len() as u32,
            population: n as u64,
            exited,
            exited_pct: exited as f64 / n.max(1) as f64 * 100.0,
            unemployment_rate: self.unemployed[last] as f64 / active.max(1) as f64,
            median_runway: self.p50_runway_sample[last],
            final_effective_job_slot_ratio: self.final_effective_job_slot_ratio,
        })
    }
}

/// Headline figures at the end of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinalSummary {
    pub months: u32,
    pub population: u64,
    pub exited: u64,
    pub exited_pct: f64,
    pub unemployment_rate: f64,
    pub median_runway: f32,
    pub final_effective_job_slot_ratio: f64,
}
