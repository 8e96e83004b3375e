//! traffic-solve: calibrate from a performance dataset, solve the MDP, write the artifact.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use traffic_mdp::cli::{pipeline_config, InputArgs, ModelArgs, SolverArgs};
use traffic_mdp::env_config::{init_base_path, init_logging};
use traffic_mdp::export::write_artifact;
use traffic_mdp::pipeline::{run, RunOutput};
use traffic_mdp::types::State;
use traffic_mdp::SolverError;

/// Optimal routing policy for the three-route congestion model.
#[derive(Debug, Parser)]
#[command(name = "traffic-solve")]
struct Cli {
    #[command(flatten)]
    input: InputArgs,

    /// Artifact path.
    #[arg(short, long, default_value = "traffic_output.json")]
    output: PathBuf,

    /// Print the artifact to stdout instead of writing a file.
    #[arg(long)]
    stdout: bool,

    /// Export a run that hit --max-sweeps, flagged `converged: false`.
    #[arg(long)]
    allow_unconverged: bool,

    #[command(flatten)]
    model: ModelArgs,

    #[command(flatten)]
    solver: SolverArgs,
}

fn print_summary(out: &RunOutput) {
    let artifact = &out.artifact;
    println!("Traffic MDP ({} sweeps, converged: {})", artifact.iterations, artifact.converged);
    println!(
        "  Route costs: N={:.2}  E={:.2}  W={:.2}",
        artifact.route_costs.0[0], artifact.route_costs.0[1], artifact.route_costs.0[2]
    );
    println!("  Congestion penalty: {:.2}", out.model.congestion_penalty());
    println!();
    println!("  {:<6} {:<6} {:>12}  {}", "State", "Action", "E[cost]", "Meaning");
    for state in State::ALL {
        println!(
            "  {:<6} {:<6} {:>12.4}  {}",
            state.code(),
            out.solution.action(state).symbol(),
            out.solution.value(state),
            state.meaning()
        );
    }
}

fn execute(cli: &Cli) -> Result<(), SolverError> {
    init_base_path()?;
    let config = pipeline_config(&cli.input, &cli.model, &cli.solver, cli.allow_unconverged);
    let out = run(&cli.input.source()?, &config)?;

    if cli.stdout {
        let json = out.artifact.to_json().map_err(|e| SolverError::Write {
            path: PathBuf::from("<stdout>"),
            source: std::io::Error::other(e),
        })?;
        println!("{json}");
        return Ok(());
    }

    write_artifact(&out.artifact, &cli.output)?;
    print_summary(&out);
    println!();
    println!("  Artifact: {}", cli.output.display());
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();
    match execute(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "traffic-solve failed");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
