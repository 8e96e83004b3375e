//! Policy validation by simulation, and multi-scenario sweeps.
//!
//! - [`engine`]: Monte Carlo rollouts of a solved policy
//! - [`sweep`]: Solve one calibration under a grid of environments

pub mod engine;
pub mod sweep;

pub use engine::{simulate_batch, simulate_episode, EpisodeResult, SimulationResult};
pub use sweep::{
    resolve_grid, run_sweep, save_summary, Scenario, ScenarioOutcome, SweepSummary,
};
