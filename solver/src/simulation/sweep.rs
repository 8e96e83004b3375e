//! Scenario sweep: solve the same transition calibration under many environments.
//!
//! The transition model is fixed by the dataset; only the base route costs vary
//! with weekday, month and rain. Every scenario is solved independently, in
//! parallel, and reported in grid order.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::calibration::{Calibration, RouteCosts};
use crate::environment::{CostMode, EnvConfig, Month, Weekday};
use crate::error::SolverError;
use crate::export::write_atomic;
use crate::transition::TransitionModel;
use crate::types::{Action, State};
use crate::value_iteration::{solve, SolverConfig};

/// One environment point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Scenario {
    pub weekday: Weekday,
    pub month: Month,
    pub rain: bool,
}

impl Scenario {
    /// Specific-mode environment for this scenario, keeping flows and events from `base`.
    pub fn environment(&self, base: &EnvConfig) -> EnvConfig {
        EnvConfig {
            mode: CostMode::Specific,
            rain: self.rain,
            weekday: self.weekday,
            month: self.month,
            ..base.clone()
        }
    }
}

/// Named scenario grids.
///
/// | name | scenarios |
/// |------|-----------|
/// | `all` | 7 weekdays × 12 months × rain on/off |
/// | `weekdays` | 7 weekdays × rain on/off, base month |
/// | `months` | 12 months × rain on/off, base weekday |
pub fn resolve_grid(name: &str, base: &EnvConfig) -> Option<Vec<Scenario>> {
    let rains = [false, true];
    let grid = match name {
        "all" => Weekday::ALL
            .iter()
            .flat_map(|&weekday| {
                Month::ALL.iter().flat_map(move |&month| {
                    rains.into_iter().map(move |rain| Scenario {
                        weekday,
                        month,
                        rain,
                    })
                })
            })
            .collect(),
        "weekdays" => Weekday::ALL
            .iter()
            .flat_map(|&weekday| {
                rains.into_iter().map(move |rain| Scenario {
                    weekday,
                    month: base.month,
                    rain,
                })
            })
            .collect(),
        "months" => Month::ALL
            .iter()
            .flat_map(|&month| {
                rains.into_iter().map(move |rain| Scenario {
                    weekday: base.weekday,
                    month,
                    rain,
                })
            })
            .collect(),
        _ => return None,
    };
    Some(grid)
}

/// Per-scenario result. Exactly one of `policy`/`error` is present.
#[derive(Clone, Debug, Serialize)]
pub struct ScenarioOutcome {
    pub scenario: Scenario,
    pub route_costs: RouteCosts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<BTreeMap<State, Action>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_values: Option<BTreeMap<State, f64>>,
    pub iterations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SweepSummary {
    pub scenarios: Vec<ScenarioOutcome>,
    pub solved: usize,
    pub failed: usize,
}

fn solve_scenario(
    scenario: Scenario,
    calibration: &Calibration,
    base: &EnvConfig,
    solver: &SolverConfig,
) -> ScenarioOutcome {
    let route_costs = scenario.environment(base).route_costs();
    let outcome = TransitionModel::from_parts(
        &calibration.transitions,
        route_costs,
        calibration.congestion_penalty,
    )
    .and_then(|model| solve(&model, solver));

    match outcome {
        Ok(solution) => ScenarioOutcome {
            scenario,
            route_costs,
            policy: Some(State::ALL.iter().map(|&s| (s, solution.action(s))).collect()),
            expected_values: Some(State::ALL.iter().map(|&s| (s, solution.value(s))).collect()),
            iterations: solution.iterations,
            error: None,
        },
        Err(e) => {
            let iterations = match &e {
                SolverError::ConvergenceFailure { sweeps, .. } => *sweeps,
                _ => 0,
            };
            warn!(?scenario, error = %e, "scenario failed");
            ScenarioOutcome {
                scenario,
                route_costs,
                policy: None,
                expected_values: None,
                iterations,
                error: Some(e.to_string()),
            }
        }
    }
}

/// Solve every scenario in `grid` against `calibration`'s transitions.
pub fn run_sweep(
    calibration: &Calibration,
    base: &EnvConfig,
    grid: &[Scenario],
    solver: &SolverConfig,
) -> Result<SweepSummary, SolverError> {
    solver.validate()?;
    let start = Instant::now();

    let scenarios: Vec<ScenarioOutcome> = grid
        .par_iter()
        .map(|&scenario| solve_scenario(scenario, calibration, base, solver))
        .collect();

    let failed = scenarios.iter().filter(|o| o.error.is_some()).count();
    let solved = scenarios.len() - failed;
    info!(
        solved,
        failed,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "sweep complete"
    );
    Ok(SweepSummary {
        scenarios,
        solved,
        failed,
    })
}

/// Persist a sweep summary as pretty JSON.
pub fn save_summary(summary: &SweepSummary, path: &Path) -> Result<(), SolverError> {
    let write_err = |source: std::io::Error| SolverError::Write {
        path: path.to_path_buf(),
        source,
    };
    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| write_err(std::io::Error::other(e)))?;
    write_atomic(path, json.as_bytes()).map_err(write_err)?;
    info!(path = %path.display(), "sweep summary written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::{TransitionBias, TransitionSpec};

    fn calibration() -> Calibration {
        Calibration {
            route_costs: RouteCosts([1.0, 1.0, 1.0]),
            congestion_penalty: 10.0,
            transitions: TransitionSpec::Bias(TransitionBias::default()),
        }
    }

    fn solver() -> SolverConfig {
        SolverConfig {
            max_sweeps: 2000,
            ..SolverConfig::default()
        }
    }

    #[test]
    fn test_grid_sizes() {
        let base = EnvConfig::default();
        assert_eq!(resolve_grid("all", &base).unwrap().len(), 7 * 12 * 2);
        assert_eq!(resolve_grid("weekdays", &base).unwrap().len(), 14);
        assert_eq!(resolve_grid("months", &base).unwrap().len(), 24);
        assert!(resolve_grid("decades", &base).is_none());
    }

    #[test]
    fn test_full_grid_covers_every_combination_once() {
        let grid = resolve_grid("all", &EnvConfig::default()).unwrap();
        let unique: std::collections::HashSet<_> =
            grid.iter().map(|s| (s.weekday, s.month, s.rain)).collect();
        assert_eq!(unique.len(), grid.len());
        assert_eq!(
            grid[0],
            Scenario {
                weekday: Weekday::Monday,
                month: Month::January,
                rain: false,
            }
        );
        assert!(grid[1].rain);
    }

    #[test]
    fn test_months_grid_keeps_base_weekday() {
        let base = EnvConfig {
            weekday: Weekday::Sunday,
            ..EnvConfig::default()
        };
        let grid = resolve_grid("months", &base).unwrap();
        assert!(grid.iter().all(|s| s.weekday == Weekday::Sunday));
    }

    #[test]
    fn test_sweep_preserves_grid_order() {
        let base = EnvConfig::default();
        let grid = resolve_grid("weekdays", &base).unwrap();
        let summary = run_sweep(&calibration(), &base, &grid, &solver()).unwrap();
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.solved, grid.len());
        for (outcome, scenario) in summary.scenarios.iter().zip(&grid) {
            assert_eq!(outcome.scenario, *scenario);
            assert_eq!(outcome.route_costs, scenario.environment(&base).route_costs());
            let values = outcome.expected_values.as_ref().unwrap();
            assert_eq!(values[&State::GOAL], 0.0);
        }
    }

    #[test]
    fn test_failed_scenarios_are_reported() {
        let base = EnvConfig::default();
        let grid = resolve_grid("months", &base).unwrap();
        let tight = SolverConfig {
            max_sweeps: 2,
            ..SolverConfig::default()
        };
        let summary = run_sweep(&calibration(), &base, &grid, &tight).unwrap();
        assert_eq!(summary.failed, grid.len());
        assert!(summary.scenarios.iter().all(|o| o.policy.is_none()));
        assert!(summary.scenarios.iter().all(|o| o.iterations == 2));
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json["scenarios"][0]["error"].as_str().unwrap().contains("converge"));
    }

    #[test]
    fn test_invalid_solver_config_rejected_before_solving() {
        let base = EnvConfig::default();
        let bad = SolverConfig {
            gamma: 1.5,
            ..SolverConfig::default()
        };
        let err = run_sweep(&calibration(), &base, &[], &bad).unwrap_err();
        assert!(matches!(err, SolverError::Config(_)));
    }
}
