use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a simulated year within a run, in `[0, iterations)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct YearIndex(pub u64);

impl fmt::Display for YearIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The point in the risk-transfer chain a loss figure is measured at.
///
/// `Gross`, `NetOfInsurance` and `NetOfReinsurance` are the headline
/// figures. `Insured` (what the primary policy pays) and `Recovery` (what the
/// reinsurer pays the insurer) are the flows between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossStage {
    Gross,
    NetOfInsurance,
    NetOfReinsurance,
    Insured,
    Recovery,
}

impl LossStage {
    pub const ALL: [LossStage; 5] = [
        LossStage::Gross,
        LossStage::NetOfInsurance,
        LossStage::NetOfReinsurance,
        LossStage::Insured,
        LossStage::Recovery,
    ];
}

impl fmt::Display for LossStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LossStage::Gross => "gross",
            LossStage::NetOfInsurance => "net of insurance",
            LossStage::NetOfReinsurance => "net of reinsurance",
            LossStage::Insured => "insured",
            LossStage::Recovery => "reinsurance recovery",
        };
        f.write_str(label)
    }
}
