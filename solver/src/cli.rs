//! Command-line flags shared by the traffic binaries.

use std::path::PathBuf;

use clap::Args;

use crate::calibration::{CalibrationConfig, LoaderConfig, TransitionMode};
use crate::constants::*;
use crate::environment::{CostMode, EnvConfig, Month, Weekday};
use crate::error::SolverError;
use crate::pipeline::{CalibrationSource, PipelineConfig};
use crate::transition::{RouteBias, TransitionBias};
use crate::value_iteration::SolverConfig;

/// Input selection and dataset parsing.
#[derive(Debug, Args)]
pub struct InputArgs {
    /// Performance dataset (delimited text).
    #[arg(required_unless_present = "calibration")]
    pub input: Option<PathBuf>,

    /// Serialized calibration JSON; replaces dataset estimation.
    #[arg(long, conflicts_with = "input")]
    pub calibration: Option<PathBuf>,

    /// Field delimiter of the dataset.
    #[arg(long, default_value_t = ';')]
    pub delimiter: char,

    /// Force header handling instead of auto-detecting it.
    #[arg(long)]
    pub header: Option<bool>,
}

impl InputArgs {
    pub fn source(&self) -> Result<CalibrationSource, SolverError> {
        match (&self.input, &self.calibration) {
            (_, Some(path)) => Ok(CalibrationSource::File(path.clone())),
            (Some(path), None) => Ok(CalibrationSource::Dataset(path.clone())),
            (None, None) => Err(SolverError::Config(
                "either an input dataset or --calibration is required".into(),
            )),
        }
    }

    pub fn loader(&self) -> LoaderConfig {
        LoaderConfig {
            delimiter: self.delimiter,
            has_header: self.header,
        }
    }
}

/// Value-iteration parameters.
#[derive(Debug, Args)]
pub struct SolverArgs {
    /// Discount factor in (0, 1].
    #[arg(long, default_value_t = DEFAULT_GAMMA)]
    pub gamma: f64,

    /// Stop when the max per-sweep delta drops below this.
    #[arg(long, default_value_t = DEFAULT_EPSILON_CONVERGE)]
    pub epsilon: f64,

    /// Q-values this close to the minimum are tied.
    #[arg(long, default_value_t = DEFAULT_EPSILON_TIE)]
    pub epsilon_tie: f64,

    /// Sweep bound.
    #[arg(long, default_value_t = DEFAULT_MAX_SWEEPS)]
    pub max_sweeps: usize,
}

impl SolverArgs {
    pub fn config(&self) -> SolverConfig {
        SolverConfig {
            gamma: self.gamma,
            epsilon_converge: self.epsilon,
            epsilon_tie: self.epsilon_tie,
            max_sweeps: self.max_sweeps,
        }
    }
}

/// Calibration and environment cost model.
#[derive(Debug, Args)]
pub struct ModelArgs {
    /// How transition probabilities are derived from the dataset.
    #[arg(long, value_enum, default_value_t = TransitionMode::Parametric)]
    pub transitions: TransitionMode,

    /// Cost added per congested route unless observed costs determine it.
    #[arg(long, default_value_t = DEFAULT_CONGESTION_PENALTY)]
    pub congestion_penalty: f64,

    /// Environment cost model.
    #[arg(long, value_enum, default_value_t = CostMode::General)]
    pub cost_mode: CostMode,

    #[arg(long, value_enum, default_value_t = Weekday::Friday)]
    pub weekday: Weekday,

    #[arg(long, value_enum, default_value_t = Month::May)]
    pub month: Month,

    /// Assume dry weather.
    #[arg(long)]
    pub no_rain: bool,

    /// Routes without an active event, e.g. `--no-event N --no-event W`.
    #[arg(long = "no-event", value_name = "ROUTE")]
    pub no_event: Vec<crate::types::Route>,

    /// Prior probability that a chosen congested route clears.
    #[arg(long, default_value_t = crate::transition::DEFAULT_RELIEF)]
    pub relief: f64,

    /// Prior probability that a chosen clear route congests.
    #[arg(long, default_value_t = crate::transition::DEFAULT_ONSET)]
    pub onset: f64,

    /// Prior probability that an unchosen clear route congests.
    #[arg(long, default_value_t = crate::transition::DEFAULT_SPILLOVER)]
    pub spillover: f64,

    /// Prior probability that an unchosen congested route clears.
    #[arg(long, default_value_t = crate::transition::DEFAULT_RECOVERY)]
    pub recovery: f64,
}

impl ModelArgs {
    pub fn environment(&self) -> EnvConfig {
        let mut events = [true; NUM_ROUTES];
        for route in &self.no_event {
            events[route.index()] = false;
        }
        EnvConfig {
            mode: self.cost_mode,
            rain: !self.no_rain,
            events,
            weekday: self.weekday,
            month: self.month,
            ..EnvConfig::default()
        }
    }

    pub fn calibration(&self) -> CalibrationConfig {
        CalibrationConfig {
            transition_mode: self.transitions,
            congestion_penalty: self.congestion_penalty,
            prior: TransitionBias::symmetric(RouteBias {
                relief: self.relief,
                onset: self.onset,
                spillover: self.spillover,
                recovery: self.recovery,
            }),
            environment: self.environment(),
        }
    }
}

pub fn pipeline_config(
    input: &InputArgs,
    model: &ModelArgs,
    solver: &SolverArgs,
    allow_unconverged: bool,
) -> PipelineConfig {
    PipelineConfig {
        loader: input.loader(),
        calibration: model.calibration(),
        solver: solver.config(),
        allow_unconverged,
    }
}
