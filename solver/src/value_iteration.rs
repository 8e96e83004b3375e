//! Synchronous value iteration over the congestion MDP.
//!
//! Each sweep computes, for every non-goal state,
//!
//! ```text
//! V_new(s) = min_a [ cost(s, a) + γ · Σ_s' P(s' | s, a) · V_old(s') ]
//! ```
//!
//! reading only from `V_old`. The two buffers are swapped between sweeps, so
//! no update within a sweep sees another update from the same sweep.
//! `V(Goal)` is pinned to 0.
//!
//! The sweep delta `Δ_k = max_{s ≠ Goal} |V_new(s) − V_old(s)|` is appended to
//! the convergence trace; iteration stops once `Δ_k < ε_converge`. Running out
//! of sweeps is reported as [`SolverError::ConvergenceFailure`].
//!
//! After convergence the greedy policy is extracted once. Actions whose value
//! is within `ε_tie` of the minimum are tied and resolved North, then East,
//! then West.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, trace, warn};

use crate::constants::*;
use crate::error::SolverError;
use crate::transition::TransitionModel;
use crate::types::{Action, Route, State};

/// Value-iteration parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Discount factor γ ∈ (0, 1].
    pub gamma: f64,
    /// Convergence tolerance on the per-sweep max delta.
    pub epsilon_converge: f64,
    /// Values closer than this are treated as equal when choosing actions.
    pub epsilon_tie: f64,
    pub max_sweeps: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            gamma: DEFAULT_GAMMA,
            epsilon_converge: DEFAULT_EPSILON_CONVERGE,
            epsilon_tie: DEFAULT_EPSILON_TIE,
            max_sweeps: DEFAULT_MAX_SWEEPS,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<(), SolverError> {
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return Err(SolverError::Config(format!(
                "gamma must lie in (0, 1], got {}",
                self.gamma
            )));
        }
        if !(self.epsilon_converge.is_finite() && self.epsilon_converge > 0.0) {
            return Err(SolverError::Config(format!(
                "epsilon_converge must be positive, got {}",
                self.epsilon_converge
            )));
        }
        if !(self.epsilon_tie.is_finite() && self.epsilon_tie >= 0.0) {
            return Err(SolverError::Config(format!(
                "epsilon_tie must be non-negative, got {}",
                self.epsilon_tie
            )));
        }
        if self.max_sweeps == 0 {
            return Err(SolverError::Config("max_sweeps must be at least 1".into()));
        }
        Ok(())
    }
}

/// Result of a value-iteration run.
#[derive(Clone, Debug, PartialEq)]
pub struct Solution {
    /// Expected cost-to-goal, indexed by state index.
    pub values: [f64; NUM_STATES],
    /// Greedy action per state; [`Action::Goal`] at the goal.
    pub policy: [Action; NUM_STATES],
    /// Max value change of each sweep, in order.
    pub convergence: Vec<f64>,
    /// Number of sweeps performed (equals `convergence.len()`).
    pub iterations: usize,
    /// Whether the last delta fell below the tolerance.
    pub converged: bool,
}

impl Solution {
    pub fn value(&self, state: State) -> f64 {
        self.values[state.index()]
    }

    pub fn action(&self, state: State) -> Action {
        self.policy[state.index()]
    }
}

/// `Q(s, a)` for each route, in priority order.
#[inline(always)]
pub fn q_values(
    model: &TransitionModel,
    values: &[f64; NUM_STATES],
    state: State,
    gamma: f64,
) -> [f64; NUM_ROUTES] {
    Route::ALL.map(|route| {
        let action = Action::Route(route);
        let row = model.transition(state, action);
        let future: f64 = row.iter().zip(values).map(|(p, v)| p * v).sum();
        model.cost(state, action) + gamma * future
    })
}

/// Lowest-priority-index route among those within `epsilon_tie` of the minimum.
pub fn select_action(q: &[f64; NUM_ROUTES], epsilon_tie: f64) -> Route {
    let best = q.iter().copied().fold(f64::INFINITY, f64::min);
    Route::ALL
        .into_iter()
        .find(|r| q[r.index()] - best <= epsilon_tie)
        .unwrap_or(Route::North)
}

/// One synchronous sweep. Writes `next` from `current` and returns `Δ`.
fn sweep(
    model: &TransitionModel,
    current: &[f64; NUM_STATES],
    next: &mut [f64; NUM_STATES],
    gamma: f64,
) -> f64 {
    let mut delta = 0.0f64;
    for state in State::ALL {
        let s = state.index();
        if state.is_goal() {
            next[s] = 0.0;
            continue;
        }
        let q = q_values(model, current, state, gamma);
        next[s] = q.iter().copied().fold(f64::INFINITY, f64::min);
        delta = delta.max((next[s] - current[s]).abs());
    }
    delta
}

/// Greedy policy with respect to `values`.
pub fn extract_policy(
    model: &TransitionModel,
    values: &[f64; NUM_STATES],
    config: &SolverConfig,
) -> [Action; NUM_STATES] {
    State::ALL.map(|state| {
        if state.is_goal() {
            Action::Goal
        } else {
            let q = q_values(model, values, state, config.gamma);
            Action::Route(select_action(&q, config.epsilon_tie))
        }
    })
}

/// Run value iteration to convergence or the sweep bound, whichever comes
/// first. The returned solution is flagged with whether it converged.
pub fn run_value_iteration(
    model: &TransitionModel,
    config: &SolverConfig,
) -> Result<Solution, SolverError> {
    config.validate()?;
    let start = Instant::now();

    let mut current = [0.0f64; NUM_STATES];
    let mut next = [0.0f64; NUM_STATES];
    let mut convergence = Vec::new();
    let mut converged = false;

    for k in 0..config.max_sweeps {
        let delta = sweep(model, &current, &mut next, config.gamma);
        std::mem::swap(&mut current, &mut next);
        convergence.push(delta);
        trace!(sweep = k + 1, delta, "sweep complete");
        if !delta.is_finite() {
            warn!(sweep = k + 1, "value function diverged");
            break;
        }
        if delta < config.epsilon_converge {
            converged = true;
            break;
        }
    }

    let policy = extract_policy(model, &current, config);
    let iterations = convergence.len();
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    if converged {
        info!(
            iterations,
            final_delta = convergence.last().copied().unwrap_or(0.0),
            elapsed_ms,
            "value iteration converged"
        );
    } else {
        warn!(
            iterations,
            final_delta = convergence.last().copied().unwrap_or(f64::NAN),
            "value iteration stopped before convergence"
        );
    }

    Ok(Solution {
        values: current,
        policy,
        convergence,
        iterations,
        converged,
    })
}

/// Solve the model, treating a run that exhausts the sweep bound as an error.
///
/// The error carries the best-effort solution.
pub fn solve(model: &TransitionModel, config: &SolverConfig) -> Result<Solution, SolverError> {
    let solution = run_value_iteration(model, config)?;
    if solution.converged {
        return Ok(solution);
    }
    Err(SolverError::ConvergenceFailure {
        sweeps: solution.iterations,
        last_delta: solution.convergence.last().copied().unwrap_or(f64::NAN),
        tolerance: config.epsilon_converge,
        best_effort: Box::new(solution),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::RouteCosts;
    use crate::transition::{RouteBias, TransitionBias, TransitionSpec};

    fn model_with(bias: TransitionBias, costs: [f64; 3], penalty: f64) -> TransitionModel {
        TransitionModel::from_parts(&TransitionSpec::Bias(bias), RouteCosts(costs), penalty)
            .unwrap()
    }

    fn default_model() -> TransitionModel {
        model_with(TransitionBias::default(), [30.0, 50.0, 70.0], 10.0)
    }

    fn config() -> SolverConfig {
        SolverConfig {
            max_sweeps: 1_000,
            ..SolverConfig::default()
        }
    }

    #[test]
    fn test_goal_value_is_zero() {
        let sol = solve(&default_model(), &config()).unwrap();
        assert_eq!(sol.value(State::GOAL), 0.0);
        assert_eq!(sol.action(State::GOAL), Action::Goal);
    }

    #[test]
    fn test_trace_length_matches_iterations() {
        let sol = solve(&default_model(), &config()).unwrap();
        assert_eq!(sol.convergence.len(), sol.iterations);
        assert!(sol.iterations >= 2);
        assert!(*sol.convergence.last().unwrap() < DEFAULT_EPSILON_CONVERGE);
        assert!(sol.convergence.iter().all(|&d| d >= 0.0));
    }

    #[test]
    fn test_values_satisfy_bellman_equation() {
        let cfg = SolverConfig {
            epsilon_converge: 1e-10,
            max_sweeps: 10_000,
            ..SolverConfig::default()
        };
        let model = default_model();
        let sol = solve(&model, &cfg).unwrap();
        for s in State::ALL.into_iter().filter(|s| !s.is_goal()) {
            let q = q_values(&model, &sol.values, s, cfg.gamma);
            let best = q.iter().copied().fold(f64::INFINITY, f64::min);
            assert!((sol.value(s) - best).abs() < 1e-6, "state {s}");
        }
    }

    #[test]
    fn test_single_step_model_values_equal_cheapest_cost() {
        // Every action clears every route: one step from anywhere to the goal.
        let bias = TransitionBias::symmetric(RouteBias {
            relief: 1.0,
            onset: 0.0,
            spillover: 0.0,
            recovery: 1.0,
        });
        let model = model_with(bias, [40.0, 20.0, 30.0], 5.0);
        let sol = solve(&model, &SolverConfig::default()).unwrap();
        for s in State::ALL.into_iter().filter(|s| !s.is_goal()) {
            assert_eq!(sol.action(s), Action::Route(Route::East), "{s}");
            let expected = 20.0 + 5.0 * s.high_count() as f64;
            assert!((sol.value(s) - expected).abs() < 1e-12);
        }
        // Sweep 1 moves values off zero, sweep 2 sees no change.
        assert_eq!(sol.iterations, 2);
    }

    #[test]
    fn test_select_action_priority_on_ties() {
        assert_eq!(select_action(&[5.0, 5.0, 5.0], 1e-6), Route::North);
        assert_eq!(select_action(&[6.0, 5.0, 5.0], 1e-6), Route::East);
        assert_eq!(select_action(&[6.0, 5.0 + 1e-9, 5.0], 1e-6), Route::East);
        assert_eq!(select_action(&[6.0, 5.1, 5.0], 1e-6), Route::West);
    }

    #[test]
    fn test_sweep_bound_reports_failure_with_best_effort() {
        let cfg = SolverConfig {
            epsilon_converge: 1e-300,
            max_sweeps: 3,
            ..SolverConfig::default()
        };
        match solve(&default_model(), &cfg).unwrap_err() {
            SolverError::ConvergenceFailure {
                sweeps,
                best_effort,
                ..
            } => {
                assert_eq!(sweeps, 3);
                assert_eq!(best_effort.iterations, 3);
                assert!(!best_effort.converged);
                assert_eq!(best_effort.action(State::GOAL), Action::Goal);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unreachable_goal_never_converges() {
        // Congestion never clears.
        let bias = TransitionBias::symmetric(RouteBias {
            relief: 0.0,
            onset: 0.0,
            spillover: 0.0,
            recovery: 0.0,
        });
        let model = model_with(bias, [10.0, 10.0, 10.0], 1.0);
        let cfg = SolverConfig {
            max_sweeps: 50,
            ..SolverConfig::default()
        };
        assert!(matches!(
            solve(&model, &cfg),
            Err(SolverError::ConvergenceFailure { .. })
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let model = default_model();
        for cfg in [
            SolverConfig {
                gamma: 0.0,
                ..SolverConfig::default()
            },
            SolverConfig {
                gamma: 1.5,
                ..SolverConfig::default()
            },
            SolverConfig {
                epsilon_converge: 0.0,
                ..SolverConfig::default()
            },
            SolverConfig {
                max_sweeps: 0,
                ..SolverConfig::default()
            },
        ] {
            assert!(matches!(solve(&model, &cfg), Err(SolverError::Config(_))));
        }
    }

    #[test]
    fn test_discounting_lowers_values() {
        let model = default_model();
        let undiscounted = solve(&model, &config()).unwrap();
        let discounted = solve(
            &model,
            &SolverConfig {
                gamma: 0.9,
                ..config()
            },
        )
        .unwrap();
        for s in State::ALL.into_iter().filter(|s| !s.is_goal()) {
            assert!(discounted.value(s) <= undiscounted.value(s) + 1e-9, "{s}");
        }
    }
}
