//! Error types for scenario validation and simulation runs.

use thiserror::Error;

use crate::types::{LossStage, YearIndex};

/// An input that can never produce a meaningful simulation.
///
/// Raised when a [`SimulationConfig`](crate::config::SimulationConfig) or
/// [`InsuranceStructure`](crate::layers::InsuranceStructure) is built, never
/// in the middle of a run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("iterations must be at least 1")]
    ZeroIterations,

    #[error("portfolio value must be positive and finite, got {0}")]
    InvalidPortfolioValue(f64),

    #[error("{name} must lie in [0, 1], got {value}")]
    RatioOutOfRange { name: &'static str, value: f64 },

    #[error("{name} must be non-negative and finite, got {value}")]
    NegativeOrNonFinite { name: &'static str, value: f64 },

    #[error("policy limit ratio {limit} is below deductible ratio {deductible}")]
    LimitBelowDeductible { deductible: f64, limit: f64 },

    #[error("reinsurance limit ratio {limit} is below retention ratio {retention}")]
    LimitBelowRetention { retention: f64, limit: f64 },

    #[error("event frequency lambda {value} exceeds the supported maximum {max}")]
    LambdaTooLarge { value: f64, max: f64 },

    #[error("event frequency lambda {0} is outside the range the Poisson sampler accepts")]
    UnsupportedLambda(f64),

    #[error("beta severity cannot match mean {mean} with std dev {std_dev}")]
    InfeasibleBetaMoments { mean: f64, std_dev: f64 },

    #[error("invalid severity parameters: {0}")]
    Severity(String),
}

/// Failure of a simulation run or of a metric computed over its output.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("non-finite {stage} loss {value} in year {year}")]
    NonFiniteLoss { stage: LossStage, year: YearIndex, value: f64 },

    #[error("cannot summarise an empty loss sequence")]
    EmptySequence,

    #[error("confidence level {0} is outside [0, 1]")]
    InvalidConfidenceLevel(f64),

    #[error("loss sequence contains a non-finite value at position {0}")]
    NonFiniteValue(usize),

    #[error("{metric} overflowed to {value}")]
    NonFiniteMetric { metric: &'static str, value: f64 },
}

pub type Result<T> = std::result::Result<T, SimulationError>;

/// Failure to read a scenario file from disk.
#[derive(Debug, Error)]
pub enum ScenarioLoadError {
    #[error("cannot read scenario {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Malformed JSON, or JSON describing an invalid scenario.
    #[error("invalid scenario: {0}")]
    Json(#[from] serde_json::Error),
}
