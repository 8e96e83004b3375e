//! End-to-end run: calibration → transition model → value iteration → artifact.
//!
//! A run either produces a fully written artifact or fails with a
//! [`SolverError`] before anything reaches the output path.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::calibration::{calibrate, load_dataset, Calibration, CalibrationConfig, LoaderConfig};
use crate::error::SolverError;
use crate::export::{write_artifact, Artifact};
use crate::transition::TransitionModel;
use crate::value_iteration::{run_value_iteration, solve, Solution, SolverConfig};

/// Where model parameters come from.
#[derive(Clone, Debug)]
pub enum CalibrationSource {
    /// Estimate from a performance dataset.
    Dataset(PathBuf),
    /// Read a serialized [`Calibration`] verbatim.
    File(PathBuf),
}

#[derive(Clone, Debug, Default)]
pub struct PipelineConfig {
    pub loader: LoaderConfig,
    pub calibration: CalibrationConfig,
    pub solver: SolverConfig,
    /// Export a run that exhausted `max_sweeps` with `converged: false`
    /// instead of failing.
    pub allow_unconverged: bool,
}

/// Everything a run produced, for callers that go beyond the artifact.
#[derive(Clone, Debug)]
pub struct RunOutput {
    pub calibration: Calibration,
    pub model: TransitionModel,
    pub solution: Solution,
    pub artifact: Artifact,
}

pub fn load_calibration(
    source: &CalibrationSource,
    config: &PipelineConfig,
) -> Result<Calibration, SolverError> {
    match source {
        CalibrationSource::Dataset(path) => {
            let dataset = load_dataset(path, &config.loader)?;
            calibrate(&dataset, &config.calibration)
        }
        CalibrationSource::File(path) => {
            let calibration = Calibration::from_json_file(path)?;
            info!(path = %path.display(), "calibration loaded from file");
            Ok(calibration)
        }
    }
}

/// Solve from an existing calibration without touching the filesystem.
pub fn solve_calibration(
    calibration: Calibration,
    config: &PipelineConfig,
) -> Result<RunOutput, SolverError> {
    config.solver.validate()?;
    let model = TransitionModel::new(&calibration)?;
    let solution = if config.allow_unconverged {
        let solution = run_value_iteration(&model, &config.solver)?;
        if !solution.converged {
            warn!(
                iterations = solution.iterations,
                "exporting unconverged solution"
            );
        }
        solution
    } else {
        solve(&model, &config.solver)?
    };
    let artifact = Artifact::new(&solution, model.route_costs());
    Ok(RunOutput {
        calibration,
        model,
        solution,
        artifact,
    })
}

/// Calibrate and solve.
pub fn run(source: &CalibrationSource, config: &PipelineConfig) -> Result<RunOutput, SolverError> {
    let calibration = load_calibration(source, config)?;
    solve_calibration(calibration, config)
}

/// Calibrate, solve and write the artifact to `output`.
pub fn run_to_file(
    source: &CalibrationSource,
    output: &Path,
    config: &PipelineConfig,
) -> Result<RunOutput, SolverError> {
    let out = run(source, config)?;
    write_artifact(&out.artifact, output)?;
    Ok(out)
}
