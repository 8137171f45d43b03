use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ScenarioLoadError};
use crate::hazard::{FrequencyModel, HazardModel, SeverityModel};
use crate::layers::InsuranceStructure;

/// Largest accepted mean event count per year. Every event costs one
/// severity draw, so λ bounds the work done per simulated year.
pub const MAX_EVENT_FREQUENCY_LAMBDA: f64 = 10_000.0;

/// Where a run gets its randomness from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedStrategy {
    /// Reproducible: the same seed always yields the same loss sequences.
    Fixed(u64),
    /// Draw a fresh seed from the operating system once per run. The drawn
    /// seed is logged and returned with the results so the run can be replayed.
    Entropy,
}

impl Default for SeedStrategy {
    fn default() -> Self {
        SeedStrategy::Fixed(42)
    }
}

/// Unvalidated hazard and portfolio parameters, as a caller or a scenario
/// file supplies them. Turn into a [`SimulationConfig`] with
/// [`SimulationConfig::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    pub iterations: u64,
    pub portfolio_value: f64,
    pub mean_damage_ratio: f64,
    pub std_damage_ratio: f64,
    pub event_frequency_lambda: f64,
    #[serde(default)]
    pub frequency: FrequencyModel,
    #[serde(default)]
    pub severity: SeverityModel,
    #[serde(default)]
    pub seed: SeedStrategy,
}

/// Validated, immutable parameters of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SimulationParams", into = "SimulationParams")]
pub struct SimulationConfig {
    iterations: u64,
    portfolio_value: f64,
    mean_damage_ratio: f64,
    std_damage_ratio: f64,
    event_frequency_lambda: f64,
    frequency: FrequencyModel,
    severity: SeverityModel,
    seed: SeedStrategy,
}

impl SimulationConfig {
    pub fn new(params: SimulationParams) -> Result<Self, ConfigError> {
        let SimulationParams {
            iterations,
            portfolio_value,
            mean_damage_ratio,
            std_damage_ratio,
            event_frequency_lambda,
            frequency,
            severity,
            seed,
        } = params;

        if iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if !(portfolio_value.is_finite() && portfolio_value > 0.0) {
            return Err(ConfigError::InvalidPortfolioValue(portfolio_value));
        }
        check_ratio("mean_damage_ratio", mean_damage_ratio)?;
        check_non_negative("std_damage_ratio", std_damage_ratio)?;
        check_non_negative("event_frequency_lambda", event_frequency_lambda)?;
        if event_frequency_lambda > MAX_EVENT_FREQUENCY_LAMBDA {
            return Err(ConfigError::LambdaTooLarge {
                value: event_frequency_lambda,
                max: MAX_EVENT_FREQUENCY_LAMBDA,
            });
        }

        let config = SimulationConfig {
            iterations,
            portfolio_value,
            mean_damage_ratio,
            std_damage_ratio,
            event_frequency_lambda,
            frequency,
            severity,
            seed,
        };
        // Distribution-specific limits (Poisson range, Beta feasibility).
        HazardModel::from_config(&config)?;
        Ok(config)
    }

    /// The dashboard's default scenario: 10k years of a ₹1bn portfolio hit
    /// by on average two events a year, each destroying 2% ± 5% of value.
    pub fn canonical() -> Self {
        SimulationConfig {
            iterations: 10_000,
            portfolio_value: 1_000_000_000.0,
            mean_damage_ratio: 0.02,
            std_damage_ratio: 0.05,
            event_frequency_lambda: 2.0,
            frequency: FrequencyModel::Poisson,
            severity: SeverityModel::ClampedNormal,
            seed: SeedStrategy::Fixed(42),
        }
    }

    pub fn with_seed(mut self, seed: SeedStrategy) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_iterations(mut self, iterations: u64) -> Result<Self, ConfigError> {
        if iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        self.iterations = iterations;
        Ok(self)
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn portfolio_value(&self) -> f64 {
        self.portfolio_value
    }

    pub fn mean_damage_ratio(&self) -> f64 {
        self.mean_damage_ratio
    }

    pub fn std_damage_ratio(&self) -> f64 {
        self.std_damage_ratio
    }

    pub fn event_frequency_lambda(&self) -> f64 {
        self.event_frequency_lambda
    }

    pub fn frequency(&self) -> FrequencyModel {
        self.frequency
    }

    pub fn severity(&self) -> SeverityModel {
        self.severity
    }

    pub fn seed(&self) -> SeedStrategy {
        self.seed
    }
}

impl TryFrom<SimulationParams> for SimulationConfig {
    type Error = ConfigError;

    fn try_from(params: SimulationParams) -> Result<Self, Self::Error> {
        SimulationConfig::new(params)
    }
}

impl From<SimulationConfig> for SimulationParams {
    fn from(c: SimulationConfig) -> Self {
        SimulationParams {
            iterations: c.iterations,
            portfolio_value: c.portfolio_value,
            mean_damage_ratio: c.mean_damage_ratio,
            std_damage_ratio: c.std_damage_ratio,
            event_frequency_lambda: c.event_frequency_lambda,
            frequency: c.frequency,
            severity: c.severity,
            seed: c.seed,
        }
    }
}

pub(crate) fn check_ratio(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::RatioOutOfRange { name, value })
    }
}

fn check_non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NegativeOrNonFinite { name, value })
    }
}

/// A complete scenario on disk: hazard assumptions plus the risk-transfer
/// structure applied to them.
///
/// ```json
/// {
///   "simulation": { "iterations": 10000, "portfolio_value": 1e9,
///                   "mean_damage_ratio": 0.02, "std_damage_ratio": 0.05,
///                   "event_frequency_lambda": 2.0 },
///   "structure":  { "deductible_ratio": 0.01, "limit_ratio": 0.5,
///                   "reinsurance_retention_ratio": 0.1,
///                   "reinsurance_limit_ratio": 0.3 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioFile {
    pub simulation: SimulationConfig,
    pub structure: InsuranceStructure,
}

impl ScenarioFile {
    pub fn canonical() -> Self {
        ScenarioFile {
            simulation: SimulationConfig::canonical(),
            structure: InsuranceStructure::canonical(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ScenarioLoadError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioLoadError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ScenarioLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }
}
