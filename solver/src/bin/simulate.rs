//! traffic-simulate: solve, then roll the optimal policy out by Monte Carlo.
//!
//! Compares the mean simulated cost from a start state with `V(start)`.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use traffic_mdp::cli::{pipeline_config, InputArgs, ModelArgs, SolverArgs};
use traffic_mdp::env_config::{init_base_path, init_logging, init_rayon_threads};
use traffic_mdp::pipeline::run;
use traffic_mdp::simulation::simulate_batch;
use traffic_mdp::types::State;
use traffic_mdp::SolverError;

#[derive(Debug, Parser)]
#[command(name = "traffic-simulate")]
struct Cli {
    #[command(flatten)]
    input: InputArgs,

    /// Number of episodes.
    #[arg(long, default_value_t = 100_000)]
    episodes: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Start state code, e.g. HHL.
    #[arg(long, default_value = "HHH")]
    start: State,

    /// Episodes still running after this many steps are truncated.
    #[arg(long, default_value_t = 10_000)]
    max_steps: u32,

    #[command(flatten)]
    model: ModelArgs,

    #[command(flatten)]
    solver: SolverArgs,
}

fn execute(cli: &Cli) -> Result<(), SolverError> {
    init_base_path()?;
    let num_threads = init_rayon_threads();
    let config = pipeline_config(&cli.input, &cli.model, &cli.solver, false);
    let out = run(&cli.input.source()?, &config)?;

    println!(
        "Traffic Simulation ({} episodes from {}, {} threads)",
        cli.episodes, cli.start, num_threads
    );
    let result = simulate_batch(
        &out.model,
        &out.solution,
        cli.start,
        cli.episodes,
        cli.max_steps,
        cli.seed,
    );
    let expected = out.solution.value(cli.start);

    println!("  Policy action:  {}", out.solution.action(cli.start));
    println!("  V(start):       {:.4}", expected);
    println!("  Mean cost:      {:.4} ± {:.4}", result.mean, result.std_error());
    println!("  Std dev:        {:.4}", result.std_dev);
    println!("  Min / Max:      {:.4} / {:.4}", result.min, result.max);
    println!("  Mean steps:     {:.3}", result.mean_steps);
    println!("  Truncated:      {}", result.truncated);
    println!("  Gap:            {:+.4}", result.mean - expected);
    println!(
        "  Time:           {:.1} ms ({:.0} episodes/s)",
        result.elapsed.as_secs_f64() * 1000.0,
        result.episodes as f64 / result.elapsed.as_secs_f64().max(1e-9)
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();
    match execute(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "traffic-simulate failed");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
