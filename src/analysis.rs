use serde::Serialize;

use crate::error::{Result, SimulationError};

/// Confidence levels reported as PML unless the caller asks for others.
pub const DEFAULT_CONFIDENCE_LEVELS: [f64; 2] = [0.95, 0.99];

/// Summary statistics of one loss sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LossMetrics {
    /// Expected annual loss: arithmetic mean over all simulated years.
    pub mean: f64,
    /// Sample standard deviation (n − 1); zero for a single year.
    pub std_dev: f64,
    /// 95% probable maximum loss.
    pub pml95: f64,
    /// 99% probable maximum loss.
    pub pml99: f64,
    pub max: f64,
}

/// Empirical quantile at a requested confidence level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pml {
    pub level: f64,
    pub value: f64,
}

/// EAL and PML at the default 95% / 99% levels.
pub fn summarize(values: &[f64]) -> Result<LossMetrics> {
    let sorted = sorted_finite(values)?;
    let n = sorted.len();

    let mean = sorted.iter().sum::<f64>() / n as f64;
    let std_dev = if n > 1 {
        let ss = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>();
        (ss / (n - 1) as f64).sqrt()
    } else {
        0.0
    };

    let metrics = LossMetrics {
        mean,
        std_dev,
        pml95: quantile_sorted(&sorted, DEFAULT_CONFIDENCE_LEVELS[0]),
        pml99: quantile_sorted(&sorted, DEFAULT_CONFIDENCE_LEVELS[1]),
        max: sorted[n - 1],
    };
    // Finite inputs can still overflow once summed or squared.
    for (metric, value) in [("mean", metrics.mean), ("std_dev", metrics.std_dev)] {
        if !value.is_finite() {
            return Err(SimulationError::NonFiniteMetric { metric, value });
        }
    }
    Ok(metrics)
}

/// PML at arbitrary confidence levels, in the order requested.
pub fn summarize_at(values: &[f64], levels: &[f64]) -> Result<Vec<Pml>> {
    if let Some(&bad) = levels.iter().find(|l| !(0.0..=1.0).contains(*l)) {
        return Err(SimulationError::InvalidConfidenceLevel(bad));
    }
    let sorted = sorted_finite(values)?;
    Ok(levels
        .iter()
        .map(|&level| Pml { level, value: quantile_sorted(&sorted, level) })
        .collect())
}

/// Quantile of an ascending, non-empty slice by linear interpolation
/// between order statistics: position `h = p·(n − 1)`, value
/// `x[⌊h⌋] + (h − ⌊h⌋)·(x[⌊h⌋+1] − x[⌊h⌋])`.
///
/// This is not nearest-rank: with `1..=10`, p = 0.95 gives 9.55, not 10.
/// Callers guarantee `sorted` is non-empty and `p` lies in [0, 1].
fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    let h = p * (n - 1) as f64;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = h - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

fn sorted_finite(values: &[f64]) -> Result<Vec<f64>> {
    if values.is_empty() {
        return Err(SimulationError::EmptySequence);
    }
    if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
        return Err(SimulationError::NonFiniteValue(pos));
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Ok(sorted)
}
