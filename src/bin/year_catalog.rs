use std::collections::BTreeMap;
use std::env;
use std::process::ExitCode;

use catloss::config::ScenarioFile;
use catloss::logging::init_tracing;
use catloss::simulation::Simulation;

fn main() -> ExitCode {
    init_tracing(false);

    let scenario = ScenarioFile::canonical();
    let n_years = env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(scenario.simulation.iterations());

    let config = match scenario.simulation.with_iterations(n_years) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let lambda = config.event_frequency_lambda();
    let portfolio_value = config.portfolio_value();

    let results = match Simulation::new(config, scenario.structure).and_then(|s| s.with_years(true).run()) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let years = results.years.unwrap_or_default();

    // Write NDJSON to stdout.
    for year in &years {
        match serde_json::to_string(year) {
            Ok(line) => println!("{line}"),
            Err(e) => {
                tracing::error!("serialisation failed: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    // Event-count histogram and severity summary to stderr.
    let mut count_years: BTreeMap<u64, usize> = BTreeMap::new();
    let mut count_loss: BTreeMap<u64, f64> = BTreeMap::new();
    let mut total_events = 0u64;
    for y in &years {
        *count_years.entry(y.event_count).or_insert(0) += 1;
        *count_loss.entry(y.event_count).or_insert(0.0) += y.gross_loss;
        total_events += y.event_count;
    }

    eprintln!(
        "year_catalog: {} years, {} total events (expected ~{:.1})",
        years.len(),
        total_events,
        lambda * years.len() as f64
    );
    for (count, n) in &count_years {
        let mean_ratio = if *count == 0 {
            0.0
        } else {
            count_loss[count] / (*n as f64 * *count as f64 * portfolio_value)
        };
        eprintln!("  events={count:<3}  years={n:>6}  mean_damage_ratio={mean_ratio:.4}");
    }
    ExitCode::SUCCESS
}
