use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::{self, LossMetrics};
use crate::config::{SeedStrategy, SimulationConfig};
use crate::error::{Result, SimulationError};
use crate::hazard::HazardModel;
use crate::layers::InsuranceStructure;
use crate::types::{LossStage, YearIndex};
use crate::year::SimulatedYear;

/// Whether years are simulated on the calling thread or across the rayon pool.
/// Both modes produce identical results for the same seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel,
}

/// Annual losses at one stage of the risk-transfer chain, one entry per
/// simulated year in year order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LossSequence {
    pub stage: LossStage,
    pub values: Vec<f64>,
}

impl LossSequence {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn summarize(&self) -> Result<LossMetrics> {
        analysis::summarize(&self.values)
    }
}

/// Output of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResults {
    /// Seed the per-year streams were derived from. `None` when the caller
    /// supplied the random source directly.
    pub seed: Option<u64>,
    pub gross: LossSequence,
    pub net_of_insurance: LossSequence,
    pub net_of_reinsurance: LossSequence,
    pub insured: LossSequence,
    pub recovery: LossSequence,
    /// Per-year records, kept only when requested with [`Simulation::with_years`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub years: Option<Vec<SimulatedYear>>,
}

/// [`LossMetrics`] for every stage of one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResultsSummary {
    pub gross: LossMetrics,
    pub net_of_insurance: LossMetrics,
    pub net_of_reinsurance: LossMetrics,
    pub insured: LossMetrics,
    pub recovery: LossMetrics,
}

impl ResultsSummary {
    pub fn stage(&self, stage: LossStage) -> &LossMetrics {
        match stage {
            LossStage::Gross => &self.gross,
            LossStage::NetOfInsurance => &self.net_of_insurance,
            LossStage::NetOfReinsurance => &self.net_of_reinsurance,
            LossStage::Insured => &self.insured,
            LossStage::Recovery => &self.recovery,
        }
    }
}

impl SimulationResults {
    pub fn iterations(&self) -> usize {
        self.gross.len()
    }

    pub fn sequence(&self, stage: LossStage) -> &LossSequence {
        match stage {
            LossStage::Gross => &self.gross,
            LossStage::NetOfInsurance => &self.net_of_insurance,
            LossStage::NetOfReinsurance => &self.net_of_reinsurance,
            LossStage::Insured => &self.insured,
            LossStage::Recovery => &self.recovery,
        }
    }

    pub fn summarize(&self) -> Result<ResultsSummary> {
        Ok(ResultsSummary {
            gross: self.gross.summarize()?,
            net_of_insurance: self.net_of_insurance.summarize()?,
            net_of_reinsurance: self.net_of_reinsurance.summarize()?,
            insured: self.insured.summarize()?,
            recovery: self.recovery.summarize()?,
        })
    }

    /// Split per-year records into one sequence per stage, rejecting any
    /// non-finite value instead of letting it reach the metrics.
    fn from_years(seed: Option<u64>, years: Vec<SimulatedYear>, keep_years: bool) -> Result<Self> {
        let n = years.len();
        let mut columns: [Vec<f64>; 5] = std::array::from_fn(|_| Vec::with_capacity(n));

        for year in &years {
            for (column, stage) in columns.iter_mut().zip(LossStage::ALL) {
                let value = year.layers.stage(stage);
                if !value.is_finite() {
                    return Err(SimulationError::NonFiniteLoss { stage, year: year.index, value });
                }
                debug_assert!(value >= 0.0, "{stage} loss {value} in year {}", year.index);
                column.push(value);
            }
        }

        let [gross, net_of_insurance, net_of_reinsurance, insured, recovery] = columns;

        Ok(SimulationResults {
            seed,
            gross: LossSequence { stage: LossStage::Gross, values: gross },
            net_of_insurance: LossSequence {
                stage: LossStage::NetOfInsurance,
                values: net_of_insurance,
            },
            net_of_reinsurance: LossSequence {
                stage: LossStage::NetOfReinsurance,
                values: net_of_reinsurance,
            },
            insured: LossSequence { stage: LossStage::Insured, values: insured },
            recovery: LossSequence { stage: LossStage::Recovery, values: recovery },
            years: keep_years.then_some(years),
        })
    }
}

/// The random stream for year `index` of a run seeded with `seed`.
///
/// Every year gets its own ChaCha stream of the same key, so years never
/// share draws and the result does not depend on which thread ran them.
pub fn year_rng(seed: u64, index: YearIndex) -> ChaCha20Rng {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    rng.set_stream(index.0);
    rng
}

/// A configured Monte Carlo run. Holds no state between runs: calling
/// [`Simulation::run`] twice with a fixed seed gives identical results.
pub struct Simulation {
    config: SimulationConfig,
    structure: InsuranceStructure,
    hazard: HazardModel,
    mode: ExecutionMode,
    keep_years: bool,
}

impl Simulation {
    pub fn new(config: SimulationConfig, structure: InsuranceStructure) -> Result<Self> {
        let hazard = HazardModel::from_config(&config)?;
        Ok(Simulation {
            config,
            structure,
            hazard,
            mode: ExecutionMode::default(),
            keep_years: false,
        })
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Keep the per-year records (event counts, layered losses) in the results.
    pub fn with_years(mut self, keep: bool) -> Self {
        self.keep_years = keep;
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn structure(&self) -> &InsuranceStructure {
        &self.structure
    }

    /// Simulate `iterations` independent years using the configured seed strategy.
    pub fn run(&self) -> Result<SimulationResults> {
        let seed = match self.config.seed() {
            SeedStrategy::Fixed(seed) => seed,
            SeedStrategy::Entropy => {
                let seed: u64 = rand::rng().random();
                warn!(seed, "seeding from system entropy; pass this seed to replay the run");
                seed
            }
        };
        let iterations = self.config.iterations();
        info!(seed, iterations, mode = ?self.mode, "starting simulation");

        let years: Vec<SimulatedYear> = match self.mode {
            ExecutionMode::Sequential => {
                (0..iterations).map(|i| self.simulate_year(seed, YearIndex(i))).collect()
            }
            ExecutionMode::Parallel => (0..iterations)
                .into_par_iter()
                .map(|i| self.simulate_year(seed, YearIndex(i)))
                .collect(),
        };

        let results = SimulationResults::from_years(Some(seed), years, self.keep_years)?;
        self.log_summary(&results);
        Ok(results)
    }

    /// Simulate `iterations` years drawing sequentially from a caller-owned
    /// random source. The outcome depends on the source's current position;
    /// the source is left advanced past every draw the run made.
    pub fn run_with_rng(&self, rng: &mut impl Rng) -> Result<SimulationResults> {
        let iterations = self.config.iterations();
        info!(iterations, "starting simulation on caller-supplied random source");
        let years: Vec<SimulatedYear> = (0..iterations)
            .map(|i| {
                SimulatedYear::draw(
                    YearIndex(i),
                    &self.hazard,
                    &self.structure,
                    self.config.portfolio_value(),
                    rng,
                )
            })
            .collect();
        let results = SimulationResults::from_years(None, years, self.keep_years)?;
        self.log_summary(&results);
        Ok(results)
    }

    fn simulate_year(&self, seed: u64, index: YearIndex) -> SimulatedYear {
        let mut rng = year_rng(seed, index);
        SimulatedYear::draw(
            index,
            &self.hazard,
            &self.structure,
            self.config.portfolio_value(),
            &mut rng,
        )
    }

    fn log_summary(&self, results: &SimulationResults) {
        if !tracing::enabled!(tracing::Level::DEBUG) {
            return;
        }
        for stage in LossStage::ALL {
            let values = &results.sequence(stage).values;
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            debug!(%stage, mean, "stage expected annual loss");
        }
    }
}

/// Run `config` against `structure` sequentially. Shorthand for
/// `Simulation::new(..)?.run()`.
pub fn run(config: &SimulationConfig, structure: &InsuranceStructure) -> Result<SimulationResults> {
    Simulation::new(config.clone(), *structure)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationParams;
    use crate::hazard::{FrequencyModel, SeverityModel};
    use crate::error::ConfigError;
    use crate::layers::LayerTerms;
    use proptest::prelude::{
        Just, ProptestConfig, Strategy, any, prop_assert, prop_oneof, proptest,
    };

    fn small_config(seed: u64) -> SimulationConfig {
        SimulationConfig::canonical()
            .with_iterations(2_000)
            .unwrap()
            .with_seed(SeedStrategy::Fixed(seed))
    }

    fn sim(config: SimulationConfig) -> Simulation {
        Simulation::new(config, InsuranceStructure::canonical()).unwrap()
    }

    #[test]
    fn sequences_have_one_entry_per_year() {
        let results = sim(small_config(1)).run().unwrap();
        assert_eq!(results.iterations(), 2_000);
        for stage in LossStage::ALL {
            assert_eq!(results.sequence(stage).len(), 2_000, "{stage}");
            assert_eq!(results.sequence(stage).stage, stage);
        }
        assert_eq!(results.seed, Some(1));
        assert!(results.years.is_none());
    }

    #[test]
    fn all_values_finite_and_non_negative() {
        let results = sim(small_config(2)).run().unwrap();
        for stage in LossStage::ALL {
            for &v in &results.sequence(stage).values {
                assert!(v.is_finite() && v >= 0.0, "{stage} value {v}");
            }
        }
    }

    #[test]
    fn fixed_seed_is_reproducible() {
        let a = sim(small_config(99)).run().unwrap();
        let b = sim(small_config(99)).run().unwrap();
        for stage in LossStage::ALL {
            let bits_a: Vec<u64> = a.sequence(stage).values.iter().map(|v| v.to_bits()).collect();
            let bits_b: Vec<u64> = b.sequence(stage).values.iter().map(|v| v.to_bits()).collect();
            assert_eq!(bits_a, bits_b, "{stage} differs between identical runs");
        }
    }

    #[test]
    fn different_seeds_differ() {
        let a = sim(small_config(1)).run().unwrap();
        let b = sim(small_config(2)).run().unwrap();
        assert_ne!(a.gross.values, b.gross.values);
    }

    #[test]
    fn parallel_matches_sequential() {
        let seq = sim(small_config(5)).run().unwrap();
        let par = sim(small_config(5)).with_mode(ExecutionMode::Parallel).run().unwrap();
        assert_eq!(seq, par);
    }

    /// Guards against one draw being reused across years: with λ=2 a large
    /// share of years must have distinct non-zero gross losses.
    #[test]
    fn years_do_not_reuse_draws() {
        let results = sim(small_config(11)).with_years(true).run().unwrap();
        let years = results.years.as_ref().unwrap();
        let mut nonzero: Vec<u64> =
            years.iter().filter(|y| y.gross_loss > 0.0).map(|y| y.gross_loss.to_bits()).collect();
        let total = nonzero.len();
        nonzero.sort_unstable();
        nonzero.dedup();
        assert!(total > 1_000, "expected most years to have a loss, got {total}");
        assert_eq!(nonzero.len(), total, "repeated gross loss across years");

        let counts: std::collections::HashSet<u64> = years.iter().map(|y| y.event_count).collect();
        assert!(counts.len() > 3, "event counts should vary across years: {counts:?}");
    }

    #[test]
    fn adjacent_year_streams_are_distinct() {
        let mut a = year_rng(42, YearIndex(0));
        let mut b = year_rng(42, YearIndex(1));
        let xa: Vec<u64> = (0..8).map(|_| a.random()).collect();
        let xb: Vec<u64> = (0..8).map(|_| b.random()).collect();
        assert_ne!(xa, xb);
    }

    #[test]
    fn kept_years_match_sequences() {
        let results = sim(small_config(4)).with_years(true).run().unwrap();
        let years = results.years.as_ref().unwrap();
        for (i, y) in years.iter().enumerate() {
            assert_eq!(y.index, YearIndex(i as u64));
            assert_eq!(results.gross.values[i], y.gross_loss);
            assert_eq!(results.net_of_insurance.values[i], y.layers.net_of_insurance);
            assert_eq!(results.net_of_reinsurance.values[i], y.layers.net_of_reinsurance);
            if y.event_count == 0 {
                assert_eq!(y.gross_loss, 0.0);
            }
        }
    }

    #[test]
    fn zero_lambda_means_zero_loss_everywhere() {
        let config = SimulationConfig::new(SimulationParams {
            event_frequency_lambda: 0.0,
            iterations: 100,
            ..SimulationConfig::canonical().into()
        })
        .unwrap();
        let results = sim(config).run().unwrap();
        let summary = results.summarize().unwrap();
        for stage in LossStage::ALL {
            assert_eq!(summary.stage(stage).mean, 0.0);
            assert_eq!(summary.stage(stage).pml99, 0.0);
        }
    }

    #[test]
    fn no_coverage_leaves_gross_with_insured() {
        let structure = InsuranceStructure::new(LayerTerms {
            deductible_ratio: 0.2,
            limit_ratio: 0.2,
            reinsurance_retention_ratio: 0.0,
            reinsurance_limit_ratio: 0.1,
        })
        .unwrap();
        let results = Simulation::new(small_config(8), structure).unwrap().run().unwrap();
        assert_eq!(results.gross.values, results.net_of_insurance.values);
        assert!(results.insured.values.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn single_iteration_summary_is_degenerate() {
        let config = SimulationConfig::canonical().with_iterations(1).unwrap();
        let results = sim(config).run().unwrap();
        let summary = results.summarize().unwrap();
        for stage in LossStage::ALL {
            let v = results.sequence(stage).values[0];
            let m = summary.stage(stage);
            assert_eq!((m.mean, m.pml95, m.pml99), (v, v, v), "{stage}");
        }
    }

    /// Canonical scenario: E[gross] = λ · E[clamp(N(0.02, 0.05))] · V
    /// ≈ 2 · 0.03152 · 1e9 ≈ 6.30e7 (above the unclamped λ·μ·V = 4e7).
    #[test]
    fn canonical_gross_mean_matches_compound_poisson() {
        let results = sim(SimulationConfig::canonical()).run().unwrap();
        let summary = results.summarize().unwrap();
        let expected = 2.0 * 0.031_52 * 1e9;
        let rel = (summary.gross.mean - expected).abs() / expected;
        assert!(rel < 0.05, "gross EAL {:.0} vs expected {expected:.0}", summary.gross.mean);
        assert!(summary.gross.mean >= 4.0e7);
        assert!(summary.net_of_insurance.mean <= summary.gross.mean);
        assert!(summary.net_of_reinsurance.mean <= summary.insured.mean);
        assert!(summary.gross.pml99 >= summary.gross.pml95);
        assert!(summary.gross.pml95 >= summary.gross.mean);
    }

    #[test]
    fn beta_severity_mean_is_unbiased() {
        let config = SimulationConfig::new(SimulationParams {
            severity: SeverityModel::Beta,
            mean_damage_ratio: 0.05,
            std_damage_ratio: 0.03,
            iterations: 10_000,
            ..SimulationConfig::canonical().into()
        })
        .unwrap();
        let summary = sim(config).run().unwrap().summarize().unwrap();
        let expected = 2.0 * 0.05 * 1e9;
        let rel = (summary.gross.mean - expected).abs() / expected;
        assert!(rel < 0.05, "gross EAL {:.0} vs expected {expected:.0}", summary.gross.mean);
    }

    #[test]
    fn single_event_model_has_one_event_every_year() {
        let config = SimulationConfig::new(SimulationParams {
            frequency: FrequencyModel::SingleEvent,
            iterations: 500,
            ..SimulationConfig::canonical().into()
        })
        .unwrap();
        let results = sim(config).with_years(true).run().unwrap();
        assert!(results.years.unwrap().iter().all(|y| y.event_count == 1));
        assert!(results.gross.values.iter().all(|&v| v <= 1e9));
    }

    #[test]
    fn entropy_seed_is_reported_and_replayable() {
        let config = small_config(0).with_seed(SeedStrategy::Entropy);
        let first = sim(config).run().unwrap();
        let seed = first.seed.unwrap();
        let replay = sim(small_config(seed)).run().unwrap();
        assert_eq!(first.gross.values, replay.gross.values);
    }

    #[test]
    fn caller_supplied_rng_is_deterministic() {
        let s = sim(small_config(0));
        let a = s.run_with_rng(&mut ChaCha20Rng::seed_from_u64(3)).unwrap();
        let b = s.run_with_rng(&mut ChaCha20Rng::seed_from_u64(3)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.seed, None);
    }

    #[test]
    fn caller_supplied_rng_advances_between_runs() {
        let s = sim(small_config(0));
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let a = s.run_with_rng(&mut rng).unwrap();
        let b = s.run_with_rng(&mut rng).unwrap();
        assert_ne!(a.gross.values, b.gross.values);
    }

    #[test]
    fn overflowing_eal_fails_summary() {
        // Each year is finite (5e307) but 100 of them sum past f64::MAX.
        let config = SimulationConfig::new(SimulationParams {
            iterations: 100,
            portfolio_value: 1e308,
            mean_damage_ratio: 0.5,
            std_damage_ratio: 0.0,
            frequency: FrequencyModel::SingleEvent,
            ..SimulationConfig::canonical().into()
        })
        .unwrap();
        let results = run(&config, &InsuranceStructure::uninsured()).unwrap();
        assert!(results.gross.values.iter().all(|v| v.is_finite()));
        let err = results.summarize().unwrap_err();
        assert!(
            matches!(err, SimulationError::NonFiniteMetric { metric: "mean", .. }),
            "expected overflow error, got {err:?}"
        );
    }

    #[test]
    fn simulation_exposes_its_inputs() {
        let structure = InsuranceStructure::canonical();
        let s = Simulation::new(small_config(5), structure).unwrap();
        assert_eq!(s.config().iterations(), 2_000);
        assert_eq!(s.config().portfolio_value(), 1e9);
        assert_eq!(s.config().seed(), SeedStrategy::Fixed(5));
        assert_eq!(s.structure(), &structure);
        assert_eq!(s.structure().deductible_ratio(), 0.01);
        assert_eq!(s.structure().limit_ratio(), 0.5);
        assert_eq!(s.structure().reinsurance_retention_ratio(), 0.1);
        assert_eq!(s.structure().reinsurance_limit_ratio(), 0.3);
    }

    #[test]
    fn free_run_matches_simulation() {
        let config = small_config(21);
        let structure = InsuranceStructure::canonical();
        let a = run(&config, &structure).unwrap();
        let b = Simulation::new(config, structure).unwrap().run().unwrap();
        assert_eq!(a, b);
    }

    fn any_params() -> impl Strategy<Value = SimulationParams> {
        (
            1..50u64,
            prop_oneof![1.0..1e12f64, 1e300..1e308f64],
            0.0..=1.0f64,
            0.0..0.5f64,
            0.0..20.0f64,
            prop_oneof![Just(FrequencyModel::Poisson), Just(FrequencyModel::SingleEvent)],
            prop_oneof![Just(SeverityModel::ClampedNormal), Just(SeverityModel::Beta)],
            any::<u64>(),
        )
            .prop_map(|(iterations, portfolio_value, mean, std, lambda, frequency, severity, seed)| {
                SimulationParams {
                    iterations,
                    portfolio_value,
                    mean_damage_ratio: mean,
                    std_damage_ratio: std,
                    event_frequency_lambda: lambda,
                    frequency,
                    severity,
                    seed: SeedStrategy::Fixed(seed),
                }
            })
    }

    fn any_terms() -> impl Strategy<Value = LayerTerms> {
        (0.0..=1.0f64, 0.0..=1.0f64, 0.0..=1.0f64, 0.0..=1.0f64).prop_map(|(a, b, c, d)| LayerTerms {
            deductible_ratio: a.min(b),
            limit_ratio: a.max(b),
            reinsurance_retention_ratio: c.min(d),
            reinsurance_limit_ratio: c.max(d),
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn valid_inputs_give_finite_losses_or_fail_loudly(
            params in any_params(),
            terms in any_terms(),
        ) {
            let config = match SimulationConfig::new(params) {
                Ok(config) => config,
                Err(err) => {
                    // Only Beta parameters can be rejected inside these ranges.
                    prop_assert!(
                        matches!(
                            err,
                            ConfigError::InfeasibleBetaMoments { .. } | ConfigError::Severity(_)
                        ),
                        "unexpected config error {:?}", err
                    );
                    return Ok(());
                }
            };
            let structure = InsuranceStructure::new(terms).unwrap();

            match run(&config, &structure) {
                Ok(results) => {
                    for stage in LossStage::ALL {
                        for &v in &results.sequence(stage).values {
                            prop_assert!(v.is_finite() && v >= 0.0, "{} value {}", stage, v);
                        }
                    }
                    match results.summarize() {
                        Ok(summary) => {
                            for stage in LossStage::ALL {
                                let m = summary.stage(stage);
                                for v in [m.mean, m.std_dev, m.pml95, m.pml99, m.max] {
                                    prop_assert!(v.is_finite() && v >= 0.0, "{} metric {}", stage, v);
                                }
                            }
                        }
                        Err(err) => prop_assert!(
                            matches!(err, SimulationError::NonFiniteMetric { .. }),
                            "unexpected summary error {:?}", err
                        ),
                    }
                }
                Err(err) => prop_assert!(
                    matches!(err, SimulationError::NonFiniteLoss { .. }),
                    "unexpected run error {:?}", err
                ),
            }
        }
    }
}
