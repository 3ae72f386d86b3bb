#![deny(warnings)]

//! Core domain model for the runway simulation.
//!
//! Defines the immutable parameter set, the per-agent state and tier
//! encodings, and validation helpers that guard every run against
//! malformed input before any array is allocated.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Number of income/expense tiers.
pub const TIER_COUNT: usize = 3;

/// Largest value an unemployment-duration counter can hold.
pub const UNEMPLOYMENT_MONTHS_MAX: u8 = u8::MAX;

/// Tolerance used when checking that tier probabilities sum to one.
pub const TIER_SUM_TOLERANCE: f64 = 1e-6;

/// Categorical classification of an agent.
///
/// Stored as a single byte per agent; `Exited` is absorbing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum WorkerState {
    /// Runway at or above the precarious threshold.
    Stable = 0,
    /// Runway below the precarious threshold but above insolvency.
    Precarious = 1,
    /// Runway at or below the insolvency threshold.
    Insolvent = 2,
    /// Left the population; never updated again.
    Exited = 3,
}

impl WorkerState {
    pub const ALL: [WorkerState; 4] = [
        WorkerState::Stable,
        WorkerState::Precarious,
        WorkerState::Insolvent,
        WorkerState::Exited,
    ];

    /// Byte stored in the state column.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Decode a state byte. Returns `None` for bytes no state maps to.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            WorkerState::Stable => "stable",
            WorkerState::Precarious => "precarious",
            WorkerState::Insolvent => "insolvent",
            WorkerState::Exited => "exited",
        }
    }

    /// Classify an active agent from its runway.
    ///
    /// The insolvent check runs first, so a runway satisfying both
    /// thresholds is insolvent.
    pub fn classify(capital: f32, precarious_thresh: f64, insolvent_thresh: f64) -> Self {
        let c = f64::from(capital);
        if c <= insolvent_thresh {
            WorkerState::Insolvent
        } else if c < precarious_thresh {
            WorkerState::Precarious
        } else {
            WorkerState::Stable
        }
    }
}

/// Tunable rates, thresholds and sizes for one run.
///
/// Every field has a default, so partial YAML documents only override what
/// they name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimParams {
    /// Seed for initialization; evolution uses `seed + 1`.
    pub seed: u64,
    /// Number of monthly ticks.
    pub months: u32,

    /// Log-normal location of the starting runway.
    pub capital_logn_mu: f64,
    /// Log-normal scale of the starting runway.
    pub capital_logn_sigma: f64,
    /// Upper clamp on the starting runway.
    pub capital_cap_max: f64,

    /// Low/mid/high tier mixture. Must already sum to one.
    pub tier_probs: [f64; TIER_COUNT],

    /// Fraction of active agents that can be employed at month zero.
    pub job_slot_ratio0: f64,
    /// Geometric monthly decline of the slot ratio.
    pub job_slot_decline: f64,
    /// Fraction of slots that actually fill each month.
    pub hire_friction: f64,

    /// Mean monthly runway change while employed, per tier.
    pub rev_employed_mu: [f64; TIER_COUNT],
    /// Mean monthly runway change while unemployed, per tier.
    pub rev_unemployed_mu: [f64; TIER_COUNT],
    /// Standard deviation of the monthly runway change, per tier.
    pub rev_sigma: [f64; TIER_COUNT],

    pub shock_prob_monthly: f64,
    pub shock_cost_mu: f64,
    pub shock_cost_sigma: f64,

    pub separation_prob_monthly: f64,
    /// Runway lost on separation, on top of the forced unemployment.
    pub separation_income_hit: f64,

    pub precarious_thresh: f64,
    pub insolvent_thresh: f64,
    /// Consecutive unemployed months after which the escalated exit
    /// probability applies.
    pub unemp_exit_boost_after: u32,
    pub exit_prob_monthly_if_insolvent_unemployed: f64,
    pub exit_prob_monthly_if_insolvent_only: f64,

    /// Agents processed per kernel invocation.
    pub chunk_size: usize,
    /// Size of the fixed statistics sample.
    pub sample_size: usize,
    /// Histogram bin edges, strictly increasing.
    pub hist_bins: Vec<f64>,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            seed: 1234,
            months: 120,
            capital_logn_mu: 1.15,
            capital_logn_sigma: 0.85,
            capital_cap_max: 48.0,
            tier_probs: [0.45, 0.40, 0.15],
            job_slot_ratio0: 0.62,
            job_slot_decline: 0.0015,
            hire_friction: 0.92,
            rev_employed_mu: [0.02, 0.08, 0.20],
            rev_unemployed_mu: [-0.40, -0.32, -0.22],
            rev_sigma: [0.10, 0.08, 0.07],
            shock_prob_monthly: 0.02,
            shock_cost_mu: 0.5,
            shock_cost_sigma: 0.65,
            separation_prob_monthly: 0.030,
            separation_income_hit: 0.40,
            precarious_thresh: 1.5,
            insolvent_thresh: 0.0,
            unemp_exit_boost_after: 6,
            exit_prob_monthly_if_insolvent_unemployed: 0.06,
            exit_prob_monthly_if_insolvent_only: 0.02,
            chunk_size: 5_000_000,
            sample_size: 1_000_000,
            hist_bins: vec![0.0, 0.5, 1.0, 2.0, 3.0, 6.0, 12.0, 24.0, 36.0, 48.0],
        }
    }
}

/// Validation errors for a parameter set combined with a population size.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("population size must be > 0")]
    NonPositivePopulation,
    #[error("number of months must be > 0")]
    NonPositiveMonths,
    #[error("chunk size must be > 0")]
    ZeroChunkSize,
    #[error("sample size must be > 0")]
    ZeroSampleSize,
    /// Tier mixture entries must be finite and non-negative.
    #[error("tier probability {0} is negative or non-finite")]
    InvalidTierProbability(f64),
    /// Tier mixture must sum to one; the caller normalizes.
    #[error("tier probabilities sum to {0}, expected 1")]
    TierProbabilitiesNotNormalized(f64),
    #[error("{name} = {value} is not a probability in [0, 1]")]
    ProbabilityOutOfRange { name: &'static str, value: f64 },
    #[error("{name} = {value} must be finite and >= 0")]
    InvalidSigma { name: &'static str, value: f64 },
    #[error("{0} must be finite")]
    NonFinite(&'static str),
    #[error("histogram needs at least two strictly increasing finite edges")]
    InvalidHistogramBins,
    #[error("unemployment exit boost {0} exceeds the {} month counter ceiling", UNEMPLOYMENT_MONTHS_MAX)]
    ExitBoostOutOfRange(u32),
}

/// Errors while loading a parameter file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(String),
    #[error("invalid parameter file: {0}")]
    Parse(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

fn check_probability(name: &'static str, value: f64) -> Result<(), ValidationError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::ProbabilityOutOfRange { name, value });
    }
    Ok(())
}

fn check_sigma(name: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ValidationError::InvalidSigma { name, value });
    }
    Ok(())
}

fn check_finite(name: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFinite(name));
    }
    Ok(())
}

impl SimParams {
    /// Parse a (possibly partial) YAML parameter document.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Load a YAML parameter file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Evolution seed, independent of the initialization stream.
    pub fn evolution_seed(&self) -> u64 {
        self.seed.wrapping_add(1)
    }

    /// Effective job-slot ratio for `month`, clamped to [0, 1].
    pub fn slot_ratio(&self, month: u32) -> f64 {
        let decay = (1.0 - self.job_slot_decline).powf(f64::from(month));
        (self.job_slot_ratio0 * decay * self.hire_friction).clamp(0.0, 1.0)
    }

    /// Number of agents in the statistics sample for a population of `n`.
    pub fn effective_sample_size(&self, n: usize) -> usize {
        self.sample_size.min(n)
    }

    /// Validate the parameter set for a population of `n` agents.
    pub fn validate(&self, n: usize) -> Result<(), ValidationError> {
        if n == 0 {
            return Err(ValidationError::NonPositivePopulation);
        }
        if self.months == 0 {
            return Err(ValidationError::NonPositiveMonths);
        }
        if self.chunk_size == 0 {
            return Err(ValidationError::ZeroChunkSize);
        }
        if self.sample_size == 0 {
            return Err(ValidationError::ZeroSampleSize);
        }

        for &p in &self.tier_probs {
            if !p.is_finite() || p < 0.0 {
                return Err(ValidationError::InvalidTierProbability(p));
            }
        }
        let sum: f64 = self.tier_probs.iter().sum();
        if (sum - 1.0).abs() > TIER_SUM_TOLERANCE {
            return Err(ValidationError::TierProbabilitiesNotNormalized(sum));
        }

        check_finite("capital_logn_mu", self.capital_logn_mu)?;
        check_sigma("capital_logn_sigma", self.capital_logn_sigma)?;
        check_finite("capital_cap_max", self.capital_cap_max)?;

        check_finite("job_slot_ratio0", self.job_slot_ratio0)?;
        check_probability("job_slot_decline", self.job_slot_decline)?;
        check_finite("hire_friction", self.hire_friction)?;

        for t in 0..TIER_COUNT {
            check_finite("rev_employed_mu", self.rev_employed_mu[t])?;
            check_finite("rev_unemployed_mu", self.rev_unemployed_mu[t])?;
            check_sigma("rev_sigma", self.rev_sigma[t])?;
        }

        check_probability("shock_prob_monthly", self.shock_prob_monthly)?;
        check_finite("shock_cost_mu", self.shock_cost_mu)?;
        check_sigma("shock_cost_sigma", self.shock_cost_sigma)?;
        check_probability("separation_prob_monthly", self.separation_prob_monthly)?;
        check_finite("separation_income_hit", self.separation_income_hit)?;

        check_finite("precarious_thresh", self.precarious_thresh)?;
        check_finite("insolvent_thresh", self.insolvent_thresh)?;
        if self.unemp_exit_boost_after > u32::from(UNEMPLOYMENT_MONTHS_MAX) {
            return Err(ValidationError::ExitBoostOutOfRange(
                self.unemp_exit_boost_after,
            ));
        }
        check_probability(
            "exit_prob_monthly_if_insolvent_unemployed",
            self.exit_prob_monthly_if_insolvent_unemployed,
        )?;
        check_probability(
            "exit_prob_monthly_if_insolvent_only",
            self.exit_prob_monthly_if_insolvent_only,
        )?;

        let bins = &self.hist_bins;
        if bins.len() < 2
            || bins.iter().any(|e| !e.is_finite())
            || bins.windows(2).any(|w| w[0] >= w[1])
        {
            return Err(ValidationError::InvalidHistogramBins);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn defaults_are_valid() {
        let p = SimParams::default();
        assert!(p.validate(1_000).is_ok());
        assert_eq!(p.evolution_seed(), 1235);
    }

    #[test]
    fn state_codes_roundtrip() {
        for s in WorkerState::ALL {
            assert_eq!(WorkerState::from_code(s.code()), Some(s));
        }
        assert_eq!(WorkerState::from_code(4), None);
        assert_eq!(WorkerState::Exited.name(), "exited");
    }

    #[test]
    fn insolvent_boundary_is_inclusive() {
        assert_eq!(
            WorkerState::classify(0.0, 1.5, 0.0),
            WorkerState::Insolvent
        );
        assert_eq!(
            WorkerState::classify(1.0, 1.5, 0.0),
            WorkerState::Precarious
        );
        assert_eq!(WorkerState::classify(1.5, 1.5, 0.0), WorkerState::Stable);
        assert_eq!(
            WorkerState::classify(-30.0, 1.5, 0.0),
            WorkerState::Insolvent
        );
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let p = SimParams::from_yaml_str("months: 24\nchunk_size: 1000\n").unwrap();
        assert_eq!(p.months, 24);
        assert_eq!(p.chunk_size, 1000);
        assert_eq!(p.seed, SimParams::default().seed);
        assert_eq!(p.hist_bins, SimParams::default().hist_bins);
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let err = SimParams::from_yaml_str("months: [oops").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = SimParams::from_yaml_file("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn params_yaml_roundtrip() {
        let p = SimParams::default();
        let s = serde_yaml::to_string(&p).unwrap();
        let back = SimParams::from_yaml_str(&s).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn rejects_invalid_sizes() {
        let p = SimParams::default();
        assert_eq!(p.validate(0), Err(ValidationError::NonPositivePopulation));

        let p = SimParams {
            months: 0,
            ..SimParams::default()
        };
        assert_eq!(p.validate(10), Err(ValidationError::NonPositiveMonths));

        let p = SimParams {
            chunk_size: 0,
            ..SimParams::default()
        };
        assert_eq!(p.validate(10), Err(ValidationError::ZeroChunkSize));

        let p = SimParams {
            sample_size: 0,
            ..SimParams::default()
        };
        assert_eq!(p.validate(10), Err(ValidationError::ZeroSampleSize));
    }

    #[test]
    fn sample_larger_than_population_is_capped() {
        let p = SimParams::default();
        assert!(p.validate(10).is_ok());
        assert_eq!(p.effective_sample_size(10), 10);
    }

    #[test]
    fn rejects_unnormalized_tiers() {
        let p = SimParams {
            tier_probs: [0.5, 0.5, 0.5],
            ..SimParams::default()
        };
        assert!(matches!(
            p.validate(10),
            Err(ValidationError::TierProbabilitiesNotNormalized(_))
        ));

        let p = SimParams {
            tier_probs: [1.2, -0.2, 0.0],
            ..SimParams::default()
        };
        assert_eq!(
            p.validate(10),
            Err(ValidationError::InvalidTierProbability(-0.2))
        );
    }

    #[test]
    fn rejects_bad_probabilities_and_sigmas() {
        let p = SimParams {
            shock_prob_monthly: 1.5,
            ..SimParams::default()
        };
        assert_eq!(
            p.validate(10),
            Err(ValidationError::ProbabilityOutOfRange {
                name: "shock_prob_monthly",
                value: 1.5
            })
        );

        let p = SimParams {
            rev_sigma: [0.1, -0.1, 0.1],
            ..SimParams::default()
        };
        assert!(matches!(
            p.validate(10),
            Err(ValidationError::InvalidSigma {
                name: "rev_sigma",
                ..
            })
        ));
    }

    #[test]
    fn rejects_bad_histogram_and_boost() {
        let p = SimParams {
            hist_bins: vec![0.0, 2.0, 1.0],
            ..SimParams::default()
        };
        assert_eq!(p.validate(10), Err(ValidationError::InvalidHistogramBins));

        let p = SimParams {
            hist_bins: vec![1.0],
            ..SimParams::default()
        };
        assert_eq!(p.validate(10), Err(ValidationError::InvalidHistogramBins));

        let p = SimParams {
            unemp_exit_boost_after: 300,
            ..SimParams::default()
        };
        assert_eq!(p.validate(10), Err(ValidationError::ExitBoostOutOfRange(300)));
    }

    #[test]
    fn slot_ratio_declines_and_clamps() {
        let p = SimParams::default();
        assert!((p.slot_ratio(0) - 0.62 * 0.92).abs() < 1e-12);
        assert!(p.slot_ratio(12) < p.slot_ratio(0));

        let p = SimParams {
            job_slot_ratio0: 3.0,
            hire_friction: 1.0,
            ..SimParams::default()
        };
        assert_eq!(p.slot_ratio(0), 1.0);
    }

    proptest! {
        #[test]
        fn slot_ratio_stays_in_unit_interval(r0 in -2.0f64..4.0,
                                            decline in 0.0f64..1.0,
                                            friction in 0.0f64..2.0,
                                            month in 0u32..600) {
            let p = SimParams { job_slot_ratio0: r0, job_slot_decline: decline, hire_friction: friction, ..SimParams::default() };
            let r = p.slot_ratio(month);
            prop_assert!((0.0..=1.0).contains(&r));
        }

        #[test]
        fn classification_matches_thresholds(c in -100.0f32..100.0) {
            let s = WorkerState::classify(c, 1.5, 0.0);
            match s {
                WorkerState::Insolvent => prop_assert!(c <= 0.0),
                WorkerState::Precarious => prop_assert!(c > 0.0 && c < 1.5),
                WorkerState::Stable => prop_assert!(c >= 1.5),
                WorkerState::Exited => prop_assert!(false),
            }
        }
    }
}
