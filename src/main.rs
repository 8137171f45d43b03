use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use thiserror::Error;
use tracing::{error, info};

use catloss::analysis::LossMetrics;
use catloss::config::{ScenarioFile, SeedStrategy};
use catloss::error::{ConfigError, ScenarioLoadError, SimulationError};
use catloss::logging::init_tracing;
use catloss::simulation::{ExecutionMode, ResultsSummary, Simulation};
use catloss::types::LossStage;

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Scenario(#[from] ScenarioLoadError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error("cannot write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialise output: {0}")]
    Serialise(#[from] serde_json::Error),
}

type Result<T> = std::result::Result<T, CliError>;

/// Simulate annual catastrophe losses and report EAL / PML per stage.
#[derive(Parser)]
#[command(name = "catloss", version, about, long_about = None)]
struct Cli {
    /// Scenario JSON file; the built-in canonical scenario when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fixed seed, overriding the scenario's seed strategy.
    #[arg(long, conflicts_with = "entropy")]
    seed: Option<u64>,

    /// Seed from system entropy (the drawn seed is logged).
    #[arg(long)]
    entropy: bool,

    /// Number of simulated years, overriding the scenario.
    #[arg(short = 'n', long)]
    iterations: Option<u64>,

    /// Spread years across all cores.
    #[arg(long)]
    parallel: bool,

    /// Write one NDJSON record per simulated year to this file.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the summary as JSON instead of a table.
    #[arg(long)]
    json: bool,

    /// Suppress the summary.
    #[arg(short, long)]
    quiet: bool,

    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let scenario = match &cli.config {
        Some(path) => {
            info!(path = %path.display(), "loading scenario");
            ScenarioFile::load(path)?
        }
        None => ScenarioFile::canonical(),
    };

    let mut config = scenario.simulation;
    if let Some(seed) = cli.seed {
        config = config.with_seed(SeedStrategy::Fixed(seed));
    } else if cli.entropy {
        config = config.with_seed(SeedStrategy::Entropy);
    }
    if let Some(n) = cli.iterations {
        config = config.with_iterations(n)?;
    }

    let mode = if cli.parallel { ExecutionMode::Parallel } else { ExecutionMode::Sequential };
    let simulation = Simulation::new(config, scenario.structure)?
        .with_mode(mode)
        .with_years(cli.output.is_some());
    let results = simulation.run()?;

    if let (Some(path), Some(years)) = (&cli.output, &results.years) {
        let io_err = |source| CliError::Output { path: path.clone(), source };
        let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
        for year in years {
            serde_json::to_writer(&mut writer, year)?;
            writeln!(writer).map_err(io_err)?;
        }
        writer.flush().map_err(io_err)?;
        info!(path = %path.display(), years = years.len(), "wrote simulated years");
    }

    if !cli.quiet {
        let summary = results.summarize()?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            print_summary(&simulation, &summary, results.seed);
        }
    }
    Ok(())
}

fn print_summary(simulation: &Simulation, summary: &ResultsSummary, seed: Option<u64>) {
    let config = simulation.config();
    let structure = simulation.structure();
    let iterations = config.iterations();
    match seed {
        Some(seed) => println!("\n=== Loss metrics ({iterations} years, seed {seed}) ==="),
        None => println!("\n=== Loss metrics ({iterations} years) ==="),
    }
    println!(
        "  portfolio {:.0}, lambda {}, damage ratio {} ± {}",
        config.portfolio_value(),
        config.event_frequency_lambda(),
        config.mean_damage_ratio(),
        config.std_damage_ratio()
    );
    println!(
        "  policy layer {} to {}, reinsurance layer {} to {} (fractions of value)",
        structure.deductible_ratio(),
        structure.limit_ratio(),
        structure.reinsurance_retention_ratio(),
        structure.reinsurance_limit_ratio()
    );
    println!(
        "  {:<22} {:>16} {:>16} {:>16} {:>16}",
        "stage", "EAL", "PML 95%", "PML 99%", "max"
    );
    for stage in LossStage::ALL {
        let LossMetrics { mean, pml95, pml99, max, .. } = *summary.stage(stage);
        println!(
            "  {:<22} {mean:>16.0} {pml95:>16.0} {pml99:>16.0} {max:>16.0}",
            stage.to_string()
        );
    }
}
