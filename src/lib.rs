//! Monte Carlo estimation of annual catastrophe losses for a single
//! portfolio, gross and after a primary policy and one reinsurance layer.
//!
//! ```no_run
//! use catloss::config::SimulationConfig;
//! use catloss::layers::InsuranceStructure;
//! use catloss::simulation::run;
//!
//! let results = run(&SimulationConfig::canonical(), &InsuranceStructure::canonical())?;
//! let summary = results.summarize()?;
//! println!("gross EAL {:.0}, 99% PML {:.0}", summary.gross.mean, summary.gross.pml99);
//! # Ok::<(), catloss::error::SimulationError>(())
//! ```

pub mod analysis;
pub mod config;
pub mod error;
pub mod hazard;
pub mod layers;
pub mod logging;
pub mod simulation;
pub mod types;
pub mod year;
