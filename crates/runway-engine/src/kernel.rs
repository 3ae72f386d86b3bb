//! Monthly transition kernel.
//!
//! Each active agent goes through, in order: employment draw, shock,
//! separation, unemployment-duration update, cashflow, reclassification and
//! the exit decision. Exited agents are skipped entirely. Agents never
//! interact, so a chunk is advanced agent by agent from its own stream.

use rand::Rng;
use rand_distr::{Distribution, LogNormal, Normal};
use runway_core::{SimParams, WorkerState, TIER_COUNT};

use crate::population::ChunkMut;
use crate::streams::MonthStreams;
use crate::SimError;

const EXITED: u8 = WorkerState::Exited.code();

/// Month-specific inputs shared by every chunk of that month.
#[derive(Clone, Debug)]
pub struct MonthPlan {
    pub month: u32,
    /// Effective job-slot ratio, already clamped to [0, 1].
    pub slot_ratio: f64,
    pub streams: MonthStreams,
}

impl MonthPlan {
    pub fn new(params: &SimParams, month: u32) -> Self {
        Self {
            month,
            slot_ratio: params.slot_ratio(month),
            streams: MonthStreams::new(params.evolution_seed(), month),
        }
    }
}

/// Distributions and thresholds derived once from a parameter set.
#[derive(Clone, Debug)]
pub struct Kernel {
    shock_prob: f64,
    shock_cost: LogNormal<f64>,
    separation_prob: f64,
    separation_hit: f32,
    /// Indexed by tier, then by employment flag.
    cashflow: [[Normal<f64>; 2]; TIER_COUNT],
    precarious_thresh: f64,
    insolvent_thresh: f64,
    exit_boost_after: u32,
    exit_prob_deep: f64,
    exit_prob_shallow: f64,
}

/// One agent's columns.
struct AgentMut<'a> {
    capital: &'a mut f32,
    tier: u8,
    employed: &'a mut u8,
    unemployment_months: &'a mut u8,
    state: &'a mut u8,
}

impl Kernel {
    pub fn new(params: &SimParams) -> Result<Self, SimError> {
        let mut cashflow = [[Normal::new(0.0, 0.0)?; 2]; TIER_COUNT];
        for (t, per_tier) in cashflow.iter_mut().enumerate() {
            let sigma = params.rev_sigma[t];
            per_tier[0] = Normal::new(params.rev_unemployed_mu[t], sigma)?;
            per_tier[1] = Normal::new(params.rev_employed_mu[t], sigma)?;
        }
        Ok(Self {
            shock_prob: params.shock_prob_monthly,
            shock_cost: LogNormal::new(params.shock_cost_mu, params.shock_cost_sigma)?,
            separation_prob: params.separation_prob_monthly,
            separation_hit: params.separation_income_hit as f32,
            cashflow,
            precarious_thresh: params.precarious_thresh,
            insolvent_thresh: params.insolvent_thresh,
            exit_boost_after: params.unemp_exit_boost_after,
            exit_prob_deep: params.exit_prob_monthly_if_insolvent_unemployed,
            exit_prob_shallow: params.exit_prob_monthly_if_insolvent_only,
        })
    }

    /// Advance every agent of `chunk` by one month in place.
    pub fn advance_chunk(&self, plan: &MonthPlan, chunk: ChunkMut<'_>) {
        let ChunkMut {
            start,
            capital,
            tier,
            employed,
            unemployment_months,
            state,
        } = chunk;
        let agents = capital
            .iter_mut()
            .zip(tier)
            .zip(employed.iter_mut())
            .zip(unemployment_months.iter_mut())
            .zip(state.iter_mut());
        for (offset, ((((capital, &tier), employed), unemployment_months), state)) in
            agents.enumerate()
        {
            if *state == EXITED {
                continue;
            }
            let agent = AgentMut {
                capital,
                tier,
                employed,
                unemployment_months,
                state,
            };
            self.advance_agent(plan, start + offset, agent);
        }
    }

    fn advance_agent(&self, plan: &MonthPlan, index: usize, agent: AgentMut<'_>) {
        let mut rng = plan.streams.agent(index);

        // Employment is recomputed every month.
        let mut employed = rng.gen::<f64>() < plan.slot_ratio;

        if rng.gen::<f64>() < self.shock_prob {
            *agent.capital -= self.shock_cost.sample(&mut rng) as f32;
        }

        if rng.gen::<f64>() < self.separation_prob {
            *agent.capital -= self.separation_hit;
            employed = false;
        }

        let mut months = if employed {
            0
        } else {
            agent.unemployment_months.saturating_add(1)
        };

        let delta = self.cashflow[usize::from(agent.tier)][usize::from(employed)].sample(&mut rng);
        *agent.capital += delta as f32;

        let mut state =
            WorkerState::classify(*agent.capital, self.precarious_thresh, self.insolvent_thresh);

        if state == WorkerState::Insolvent {
            let deep = !employed && u32::from(months) >= self.exit_boost_after;
            let exit_prob = if deep {
                self.exit_prob_deep
            } else {
                self.exit_prob_shallow
            };
            if rng.gen::<f64>() < exit_prob {
                state = WorkerState::Exited;
                employed = false;
                months = months.saturating_add(1);
            }
        }

        *agent.employed = u8::from(employed);
        *agent.unemployment_months = months;
        *agent.state = state.code();
    }
}
