//! Population initialization.

use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::index;
use rand_distr::LogNormal;
use runway_core::{SimParams, WorkerState};
use runway_storage::ColumnBackend;
use tracing::debug;

use crate::population::Population;
use crate::streams::init_rng;
use crate::SimError;

/// Draw a fresh population of `n` agents from `params` using `seed`.
///
/// Draw order on the single initialization stream: every capital, then every
/// tier, then the statistics sample. Employment flags and unemployment
/// counters start at zero.
pub fn initialize<B: ColumnBackend>(
    n: usize,
    params: &SimParams,
    seed: u64,
    backend: &B,
) -> Result<Population, SimError> {
    params.validate(n)?;
    let mut rng = init_rng(seed);
    let mut pop = Population::allocate(backend, n)?;

    let capital_dist = LogNormal::new(params.capital_logn_mu, params.capital_logn_sigma)?;
    let cap_max = params.capital_cap_max as f32;
    for c in pop.capital.iter_mut() {
        let drawn = capital_dist.sample(&mut rng) as f32;
        *c = drawn.min(cap_max);
    }

    let tiers = WeightedIndex::new(params.tier_probs)?;
    for t in pop.tier.iter_mut() {
        *t = tiers.sample(&mut rng) as u8;
    }

    for (s, &c) in pop.state.iter_mut().zip(pop.capital.iter()) {
        *s = WorkerState::classify(c, params.precarious_thresh, params.insolvent_thresh).code();
    }

    let mut sample = index::sample(&mut rng, n, params.effective_sample_size(n)).into_vec();
    sample.sort_unstable();
    pop.sample = sample;

    debug!(n, sample = pop.sample.len(), seed, "population initialized");
    Ok(pop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use runway_core::TIER_COUNT;
    use runway_storage::{FileMapped, Resident};
    use tempfile::tempdir;

    fn small_params() -> SimParams {
        SimParams {
            months: 12,
            chunk_size: 256,
            sample_size: 500,
            ..SimParams::default()
        }
    }

    #[test]
    fn initialization_is_bit_reproducible() {
        let p = small_params();
        let a = initialize(2_000, &p, p.seed, &Resident).unwrap();
        let b = initialize(2_000, &p, p.seed, &Resident).unwrap();
        let bits = |pop: &Population| pop.capital.iter().map(|c| c.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a), bits(&b));
        assert_eq!(&a.tier[..], &b.tier[..]);
        assert_eq!(a.sample, b.sample);
    }

    #[test]
    fn initialization_ignores_horizon() {
        let short = SimParams {
            months: 1,
            ..small_params()
        };
        let long = SimParams {
            months: 240,
            ..small_params()
        };
        let a = initialize(1_000, &short, short.seed, &Resident).unwrap();
        let b = initialize(1_000, &long, long.seed, &Resident).unwrap();
        assert_eq!(&a.capital[..], &b.capital[..]);
        assert_eq!(a.sample, b.sample);
    }

    #[test]
    fn different_seeds_differ() {
        let p = small_params();
        let a = initialize(1_000, &p, 1, &Resident).unwrap();
        let b = initialize(1_000, &p, 2, &Resident).unwrap();
        assert_ne!(&a.capital[..], &b.capital[..]);
    }

    #[test]
    fn columns_respect_construction_rules() {
        let p = small_params();
        let pop = initialize(5_000, &p, p.seed, &Resident).unwrap();
        assert!(pop.capital.iter().all(|&c| c <= p.capital_cap_max as f32 && c > 0.0));
        assert!(pop.tier.iter().all(|&t| (t as usize) < TIER_COUNT));
        assert!(pop.employed.iter().all(|&e| e == 0));
        assert!(pop.unemployment_months.iter().all(|&u| u == 0));
        for (i, &c) in pop.capital.iter().enumerate() {
            let expected = WorkerState::classify(c, p.precarious_thresh, p.insolvent_thresh);
            assert_eq!(pop.state_of(i), Some(expected));
        }
        assert!(pop.capital.iter().any(|&c| c < p.precarious_thresh as f32));
    }

    #[test]
    fn tier_mixture_follows_probabilities() {
        let p = small_params();
        let pop = initialize(20_000, &p, p.seed, &Resident).unwrap();
        let mut counts = [0usize; TIER_COUNT];
        for &t in pop.tier.iter() {
            counts[t as usize] += 1;
        }
        for (count, prob) in counts.iter().zip(p.tier_probs) {
            let share = *count as f64 / 20_000.0;
            assert!((share - prob).abs() < 0.02, "share {share} vs {prob}");
        }
    }

    #[test]
    fn degenerate_tier_mixture_pins_every_agent() {
        let p = SimParams {
            tier_probs: [0.0, 0.0, 1.0],
            ..small_params()
        };
        let pop = initialize(300, &p, p.seed, &Resident).unwrap();
        assert!(pop.tier.iter().all(|&t| t == 2));
    }

    #[test]
    fn sample_is_unique_sorted_and_capped() {
        let p = small_params();
        let pop = initialize(2_000, &p, p.seed, &Resident).unwrap();
        assert_eq!(pop.sample.len(), 500);
        assert!(pop.sample.windows(2).all(|w| w[0] < w[1]));
        assert!(pop.sample.iter().all(|&i| i < 2_000));

        let small = initialize(100, &p, p.seed, &Resident).unwrap();
        assert_eq!(small.sample, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn cap_clamps_from_above_only() {
        let p = SimParams {
            capital_logn_mu: 10.0,
            capital_logn_sigma: 0.1,
            capital_cap_max: 3.0,
            ..small_params()
        };
        let pop = initialize(200, &p, p.seed, &Resident).unwrap();
        assert!(pop.capital.iter().all(|&c| c == 3.0));
    }

    #[test]
    fn file_mapped_matches_resident() {
        let dir = tempdir().unwrap();
        let p = small_params();
        let a = initialize(1_500, &p, p.seed, &Resident).unwrap();
        let b = initialize(1_500, &p, p.seed, &FileMapped::new(dir.path())).unwrap();
        assert_eq!(&a.capital[..], &b.capital[..]);
        assert_eq!(&a.state[..], &b.state[..]);
        assert_eq!(a.sample, b.sample);
        assert!(dir.path().join("capital.dat").exists());
    }

    #[test]
    fn invalid_parameters_fail_before_allocation() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("never_created");
        let p = SimParams {
            tier_probs: [0.2, 0.2, 0.2],
            ..small_params()
        };
        let err = initialize(10, &p, p.seed, &FileMapped::new(&target)).unwrap_err();
        assert!(matches!(err, SimError::InvalidParameters(_)));
        assert!(!target.exists());
    }
}
