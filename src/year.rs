use rand::Rng;
use serde::Serialize;

use crate::hazard::HazardModel;
use crate::layers::{InsuranceStructure, LayeredLoss};
use crate::types::YearIndex;

/// One simulated year: how many events struck and what they cost at each
/// stage of the risk-transfer chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimulatedYear {
    pub index: YearIndex,
    pub event_count: u64,
    pub gross_loss: f64,
    pub layers: LayeredLoss,
}

impl SimulatedYear {
    /// Draw a year from `rng`: a frequency draw, that many i.i.d. severity
    /// draws, then the insurance structure applied to the annual total.
    pub fn draw(
        index: YearIndex,
        hazard: &HazardModel,
        structure: &InsuranceStructure,
        portfolio_value: f64,
        rng: &mut impl Rng,
    ) -> Self {
        let event_count = hazard.draw_event_count(rng);
        let gross_loss =
            aggregate_year(portfolio_value, event_count, || hazard.draw_damage_ratio(rng));
        SimulatedYear {
            index,
            event_count,
            gross_loss,
            layers: structure.apply(gross_loss, portfolio_value),
        }
    }
}

/// Gross annual loss: the sum of `event_count` independent severity draws,
/// each scaled by portfolio value. Zero events give exactly `0.0`.
pub fn aggregate_year(
    portfolio_value: f64,
    event_count: u64,
    mut draw_severity: impl FnMut() -> f64,
) -> f64 {
    (0..event_count).fold(0.0, |total, _| total + draw_severity() * portfolio_value)
}
