use rand::Rng;
use rand_distr::{Beta, Distribution, Normal, Poisson};
use serde::{Deserialize, Serialize};

use crate::config::SimulationConfig;
use crate::error::ConfigError;

/// How many events strike the portfolio in a year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyModel {
    /// Poisson(λ) events per year, λ = `event_frequency_lambda`.
    #[default]
    Poisson,
    /// Exactly one event per year; λ is ignored.
    SingleEvent,
}

/// Shape of the per-event damage ratio, parameterised by its mean and
/// standard deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityModel {
    /// Normal(mean, std) clamped to [0, 1]. Draws outside the interval are
    /// moved to the nearest bound, never resampled. Clamping at 0 lifts the
    /// realised mean above `mean` when `std` is large relative to it.
    #[default]
    ClampedNormal,
    /// Beta matched to (mean, std) by the method of moments. Bounded in
    /// [0, 1] without clamping, so the realised mean equals `mean`.
    Beta,
}

#[derive(Debug, Clone)]
enum EventCount {
    Never,
    Once,
    Poisson(Poisson<f64>),
}

#[derive(Debug, Clone)]
enum DamageRatio {
    Constant(f64),
    ClampedNormal(Normal<f64>),
    Beta(Beta<f64>),
}

/// Frequency and severity samplers for one scenario.
///
/// Holds no random state: every draw takes the caller's `Rng`, so the same
/// model can serve many independent streams.
#[derive(Debug, Clone)]
pub struct HazardModel {
    frequency: EventCount,
    severity: DamageRatio,
}

impl HazardModel {
    pub fn from_config(config: &SimulationConfig) -> Result<Self, ConfigError> {
        Self::new(
            config.frequency(),
            config.event_frequency_lambda(),
            config.severity(),
            config.mean_damage_ratio(),
            config.std_damage_ratio(),
        )
    }

    pub fn new(
        frequency: FrequencyModel,
        lambda: f64,
        severity: SeverityModel,
        mean: f64,
        std_dev: f64,
    ) -> Result<Self, ConfigError> {
        let frequency = match frequency {
            FrequencyModel::SingleEvent => EventCount::Once,
            // rand_distr rejects λ = 0; a zero rate simply never fires.
            FrequencyModel::Poisson if lambda == 0.0 => EventCount::Never,
            FrequencyModel::Poisson => EventCount::Poisson(
                Poisson::new(lambda).map_err(|_| ConfigError::UnsupportedLambda(lambda))?,
            ),
        };

        let severity = if std_dev == 0.0 {
            DamageRatio::Constant(mean)
        } else {
            match severity {
                SeverityModel::ClampedNormal => DamageRatio::ClampedNormal(
                    Normal::new(mean, std_dev).map_err(|e| ConfigError::Severity(e.to_string()))?,
                ),
                SeverityModel::Beta => {
                    let (alpha, beta) = beta_moments(mean, std_dev)?;
                    DamageRatio::Beta(
                        Beta::new(alpha, beta).map_err(|e| ConfigError::Severity(e.to_string()))?,
                    )
                }
            }
        };

        Ok(HazardModel { frequency, severity })
    }

    /// Number of events striking the portfolio in one year.
    pub fn draw_event_count(&self, rng: &mut impl Rng) -> u64 {
        match &self.frequency {
            EventCount::Never => 0,
            EventCount::Once => 1,
            EventCount::Poisson(poisson) => {
                let n: f64 = poisson.sample(rng);
                n as u64
            }
        }
    }

    /// Fraction of portfolio value destroyed by one event, in [0, 1].
    pub fn draw_damage_ratio(&self, rng: &mut impl Rng) -> f64 {
        match &self.severity {
            DamageRatio::Constant(ratio) => *ratio,
            DamageRatio::ClampedNormal(normal) => normal.sample(rng).clamp(0.0, 1.0),
            DamageRatio::Beta(beta) => beta.sample(rng),
        }
    }
}

/// Beta(α, β) with the given mean and std dev:
/// α = m·k, β = (1 − m)·k where k = m(1 − m)/σ² − 1.
fn beta_moments(mean: f64, std_dev: f64) -> Result<(f64, f64), ConfigError> {
    let variance = std_dev * std_dev;
    let spread = mean * (1.0 - mean);
    if variance >= spread {
        return Err(ConfigError::InfeasibleBetaMoments { mean, std_dev });
    }
    let k = spread / variance - 1.0;
    Ok((mean * k, (1.0 - mean) * k))
}
