use serde::{Deserialize, Serialize};

use crate::config::check_ratio;
use crate::error::ConfigError;
use crate::types::LossStage;

/// Unvalidated layer terms. All ratios are fractions of portfolio value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerTerms {
    pub deductible_ratio: f64,
    pub limit_ratio: f64,
    pub reinsurance_retention_ratio: f64,
    pub reinsurance_limit_ratio: f64,
}

/// A primary policy (deductible up to limit) with one reinsurance layer
/// (retention up to limit) sitting on the insurer's share of the loss.
///
/// Limits are exhaustion points, not widths: the policy pays at most
/// `(limit − deductible) × V`, the reinsurer at most
/// `(reinsurance_limit − retention) × V`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LayerTerms", into = "LayerTerms")]
pub struct InsuranceStructure {
    deductible_ratio: f64,
    limit_ratio: f64,
    reinsurance_retention_ratio: f64,
    reinsurance_limit_ratio: f64,
}

/// One gross loss split across the risk-transfer chain.
///
/// `net_of_insurance` is what the insured still bears after the policy
/// pays `insured`. `net_of_reinsurance` is what the insurer keeps of
/// `insured` after the reinsurer pays `recovery`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LayeredLoss {
    pub gross: f64,
    pub insured: f64,
    pub net_of_insurance: f64,
    pub recovery: f64,
    pub net_of_reinsurance: f64,
}

impl LayeredLoss {
    pub fn stage(&self, stage: LossStage) -> f64 {
        match stage {
            LossStage::Gross => self.gross,
            LossStage::NetOfInsurance => self.net_of_insurance,
            LossStage::NetOfReinsurance => self.net_of_reinsurance,
            LossStage::Insured => self.insured,
            LossStage::Recovery => self.recovery,
        }
    }
}

impl InsuranceStructure {
    pub fn new(terms: LayerTerms) -> Result<Self, ConfigError> {
        let LayerTerms {
            deductible_ratio,
            limit_ratio,
            reinsurance_retention_ratio,
            reinsurance_limit_ratio,
        } = terms;

        check_ratio("deductible_ratio", deductible_ratio)?;
        check_ratio("limit_ratio", limit_ratio)?;
        check_ratio("reinsurance_retention_ratio", reinsurance_retention_ratio)?;
        check_ratio("reinsurance_limit_ratio", reinsurance_limit_ratio)?;

        if limit_ratio < deductible_ratio {
            return Err(ConfigError::LimitBelowDeductible {
                deductible: deductible_ratio,
                limit: limit_ratio,
            });
        }
        if reinsurance_limit_ratio < reinsurance_retention_ratio {
            return Err(ConfigError::LimitBelowRetention {
                retention: reinsurance_retention_ratio,
                limit: reinsurance_limit_ratio,
            });
        }

        Ok(InsuranceStructure {
            deductible_ratio,
            limit_ratio,
            reinsurance_retention_ratio,
            reinsurance_limit_ratio,
        })
    }

    pub fn canonical() -> Self {
        InsuranceStructure {
            deductible_ratio: 0.01,
            limit_ratio: 0.5,
            reinsurance_retention_ratio: 0.1,
            reinsurance_limit_ratio: 0.3,
        }
    }

    /// No policy and no reinsurance: the insured keeps the whole loss.
    pub fn uninsured() -> Self {
        InsuranceStructure {
            deductible_ratio: 0.0,
            limit_ratio: 0.0,
            reinsurance_retention_ratio: 0.0,
            reinsurance_limit_ratio: 0.0,
        }
    }

    pub fn deductible_ratio(&self) -> f64 {
        self.deductible_ratio
    }

    pub fn limit_ratio(&self) -> f64 {
        self.limit_ratio
    }

    pub fn reinsurance_retention_ratio(&self) -> f64 {
        self.reinsurance_retention_ratio
    }

    pub fn reinsurance_limit_ratio(&self) -> f64 {
        self.reinsurance_limit_ratio
    }

    /// Amount the primary policy pays on a gross loss.
    pub fn insured_loss(&self, gross: f64, portfolio_value: f64) -> f64 {
        layer_loss(
            gross,
            self.deductible_ratio * portfolio_value,
            (self.limit_ratio - self.deductible_ratio) * portfolio_value,
        )
    }

    /// Amount the reinsurer pays on the insurer's insured loss.
    pub fn reinsurance_recovery(&self, insured: f64, portfolio_value: f64) -> f64 {
        layer_loss(
            insured,
            self.reinsurance_retention_ratio * portfolio_value,
            (self.reinsurance_limit_ratio - self.reinsurance_retention_ratio) * portfolio_value,
        )
    }

    /// Run a gross loss through the policy, then the reinsurance layer.
    /// Reinsurance attaches to the insured loss, never to the gross loss.
    pub fn apply(&self, gross: f64, portfolio_value: f64) -> LayeredLoss {
        debug_assert!(gross >= 0.0, "gross loss must be non-negative, got {gross}");
        let insured = self.insured_loss(gross, portfolio_value);
        let recovery = self.reinsurance_recovery(insured, portfolio_value);
        LayeredLoss {
            gross,
            insured,
            net_of_insurance: gross - insured,
            recovery,
            net_of_reinsurance: insured - recovery,
        }
    }
}

impl TryFrom<LayerTerms> for InsuranceStructure {
    type Error = ConfigError;

    fn try_from(terms: LayerTerms) -> Result<Self, Self::Error> {
        InsuranceStructure::new(terms)
    }
}

impl From<InsuranceStructure> for LayerTerms {
    fn from(s: InsuranceStructure) -> Self {
        LayerTerms {
            deductible_ratio: s.deductible_ratio,
            limit_ratio: s.limit_ratio,
            reinsurance_retention_ratio: s.reinsurance_retention_ratio,
            reinsurance_limit_ratio: s.reinsurance_limit_ratio,
        }
    }
}

/// Loss in excess of `attachment`, capped at `width`.
/// `width` is non-negative for any validated structure.
fn layer_loss(loss: f64, attachment: f64, width: f64) -> f64 {
    (loss - attachment).max(0.0).min(width)
}
