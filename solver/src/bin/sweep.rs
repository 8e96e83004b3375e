//! traffic-sweep: solve one dataset's transition calibration under a grid of
//! environment scenarios and write a JSON summary.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use traffic_mdp::cli::{pipeline_config, InputArgs, ModelArgs, SolverArgs};
use traffic_mdp::env_config::{init_base_path, init_logging, init_rayon_threads};
use traffic_mdp::pipeline::load_calibration;
use traffic_mdp::simulation::{resolve_grid, run_sweep, save_summary};
use traffic_mdp::types::State;
use traffic_mdp::SolverError;

#[derive(Debug, Parser)]
#[command(name = "traffic-sweep")]
struct Cli {
    #[command(flatten)]
    input: InputArgs,

    /// Summary path.
    #[arg(short, long, default_value = "sweep.json")]
    output: PathBuf,

    /// Scenario grid: all, weekdays, months.
    #[arg(long, default_value = "all")]
    grid: String,

    #[command(flatten)]
    model: ModelArgs,

    #[command(flatten)]
    solver: SolverArgs,
}

fn execute(cli: &Cli) -> Result<(), SolverError> {
    init_base_path()?;
    let num_threads = init_rayon_threads();
    let config = pipeline_config(&cli.input, &cli.model, &cli.solver, false);
    let base = config.calibration.environment.clone();
    let grid = resolve_grid(&cli.grid, &base)
        .ok_or_else(|| SolverError::Config(format!("unknown grid '{}'", cli.grid)))?;
    let calibration = load_calibration(&cli.input.source()?, &config)?;

    println!(
        "Traffic Sweep (grid '{}', {} scenarios, {} threads)",
        cli.grid,
        grid.len(),
        num_threads
    );
    let summary = run_sweep(&calibration, &base, &grid, &config.solver)?;

    let hhh: State = State::ALL[7];
    println!(
        "  {:<10} {:<10} {:<5} {:>8} {:>8} {:>8}  {:<6} {:>10}",
        "Weekday", "Month", "Rain", "N", "E", "W", "π(HHH)", "V(HHH)"
    );
    for outcome in &summary.scenarios {
        let s = &outcome.scenario;
        let costs = &outcome.route_costs.0;
        match (&outcome.policy, &outcome.expected_values) {
            (Some(policy), Some(values)) => println!(
                "  {:<10} {:<10} {:<5} {:>8.2} {:>8.2} {:>8.2}  {:<6} {:>10.3}",
                format!("{:?}", s.weekday),
                format!("{:?}", s.month),
                s.rain,
                costs[0],
                costs[1],
                costs[2],
                policy[&hhh].symbol(),
                values[&hhh]
            ),
            _ => println!(
                "  {:<10} {:<10} {:<5} {:>8.2} {:>8.2} {:>8.2}  FAILED: {}",
                format!("{:?}", s.weekday),
                format!("{:?}", s.month),
                s.rain,
                costs[0],
                costs[1],
                costs[2],
                outcome.error.as_deref().unwrap_or("")
            ),
        }
    }
    println!("  Solved: {}  Failed: {}", summary.solved, summary.failed);

    save_summary(&summary, &cli.output)?;
    println!("  Summary: {}", cli.output.display());
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();
    match execute(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "traffic-sweep failed");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
