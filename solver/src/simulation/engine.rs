//! Policy simulation engine: roll out a solved policy through the transition model.
//!
//! Each episode starts in a given state, follows the policy, samples successors
//! from `P(s' | s, a)` and accumulates immediate costs until the goal. The mean
//! episode cost converges to `V(start)` for undiscounted solutions, which makes
//! this a check on the value function independent of the Bellman sweeps.
//!
//! Episodes are independent and run in parallel; episode `i` is seeded with
//! `seed + i`, so a batch is reproducible regardless of thread count.

use std::time::{Duration, Instant};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::transition::{TransitionModel, TransitionRow};
use crate::types::{Action, State};
use crate::value_iteration::Solution;

/// Outcome of one episode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpisodeResult {
    pub cost: f64,
    pub steps: u32,
    /// Stopped at the step cap before reaching the goal.
    pub truncated: bool,
}

/// Aggregate over a batch of episodes.
#[derive(Clone, Debug)]
pub struct SimulationResult {
    pub start: State,
    pub episodes: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub mean_steps: f64,
    pub truncated: usize,
    pub elapsed: Duration,
}

impl SimulationResult {
    /// Standard error of the mean cost.
    pub fn std_error(&self) -> f64 {
        if self.episodes == 0 {
            return 0.0;
        }
        self.std_dev / (self.episodes as f64).sqrt()
    }
}

/// Draw a successor index from `row`.
#[inline(always)]
fn sample_successor(row: &TransitionRow, rng: &mut SmallRng) -> State {
    let u: f64 = rng.random();
    let mut acc = 0.0;
    let mut last_possible = State::GOAL;
    for next in State::ALL {
        let p = row[next.index()];
        if p <= 0.0 {
            continue;
        }
        acc += p;
        last_possible = next;
        if u < acc {
            return next;
        }
    }
    // Rounding can leave `acc` a hair below 1.
    last_possible
}

/// Play one episode under `policy`.
pub fn simulate_episode(
    model: &TransitionModel,
    policy: &[Action],
    start: State,
    max_steps: u32,
    rng: &mut SmallRng,
) -> EpisodeResult {
    let mut state = start;
    let mut cost = 0.0;
    let mut steps = 0;
    while !state.is_goal() {
        if steps >= max_steps {
            return EpisodeResult {
                cost,
                steps,
                truncated: true,
            };
        }
        let action = policy[state.index()];
        cost += model.cost(state, action);
        state = sample_successor(model.transition(state, action), rng);
        steps += 1;
    }
    EpisodeResult {
        cost,
        steps,
        truncated: false,
    }
}

/// Simulate `episodes` episodes from `start` in parallel.
pub fn simulate_batch(
    model: &TransitionModel,
    solution: &Solution,
    start: State,
    episodes: usize,
    max_steps: u32,
    seed: u64,
) -> SimulationResult {
    let t0 = Instant::now();

    let results: Vec<EpisodeResult> = (0..episodes)
        .into_par_iter()
        .map(|i| {
            let mut rng = SmallRng::seed_from_u64(seed.wrapping_add(i as u64));
            simulate_episode(model, &solution.policy, start, max_steps, &mut rng)
        })
        .collect();

    let elapsed = t0.elapsed();
    let n = episodes.max(1) as f64;
    let mean = results.iter().map(|r| r.cost).sum::<f64>() / n;
    let variance = results
        .iter()
        .map(|r| (r.cost - mean).powi(2))
        .sum::<f64>()
        / n;
    let min = results.iter().map(|r| r.cost).fold(f64::INFINITY, f64::min);
    let max = results.iter().map(|r| r.cost).fold(f64::NEG_INFINITY, f64::max);
    let mean_steps = results.iter().map(|r| r.steps as f64).sum::<f64>() / n;
    let truncated = results.iter().filter(|r| r.truncated).count();

    SimulationResult {
        start,
        episodes,
        mean,
        std_dev: variance.sqrt(),
        min: if results.is_empty() { 0.0 } else { min },
        max: if results.is_empty() { 0.0 } else { max },
        mean_steps,
        truncated,
        elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::RouteCosts;
    use crate::transition::{RouteBias, TransitionBias, TransitionSpec};
    use crate::types::Route;
    use crate::value_iteration::{solve, SolverConfig};

    fn setup(bias: TransitionBias) -> (TransitionModel, Solution) {
        let model = TransitionModel::from_parts(
            &TransitionSpec::Bias(bias),
            RouteCosts([30.0, 40.0, 50.0]),
            10.0,
        )
        .unwrap();
        let cfg = SolverConfig {
            epsilon_converge: 1e-9,
            max_sweeps: 10_000,
            ..SolverConfig::default()
        };
        let solution = solve(&model, &cfg).unwrap();
        (model, solution)
    }

    #[test]
    fn test_goal_start_costs_nothing() {
        let (model, solution) = setup(TransitionBias::default());
        let mut rng = SmallRng::seed_from_u64(1);
        let ep = simulate_episode(&model, &solution.policy, State::GOAL, 100, &mut rng);
        assert_eq!(
            ep,
            EpisodeResult {
                cost: 0.0,
                steps: 0,
                truncated: false,
            }
        );
    }

    #[test]
    fn test_deterministic_model_matches_value_exactly() {
        let bias = TransitionBias::symmetric(RouteBias {
            relief: 1.0,
            onset: 0.0,
            spillover: 0.0,
            recovery: 1.0,
        });
        let (model, solution) = setup(bias);
        let hhh: State = "HHH".parse().unwrap();
        let result = simulate_batch(&model, &solution, hhh, 100, 50, 7);
        assert_eq!(result.truncated, 0);
        assert!((result.mean - solution.value(hhh)).abs() < 1e-9);
        assert_eq!(result.std_dev, 0.0);
        assert_eq!(result.mean_steps, 1.0);
    }

    #[test]
    fn test_mean_cost_close_to_value() {
        let (model, solution) = setup(TransitionBias::default());
        let hhl: State = "HHL".parse().unwrap();
        let result = simulate_batch(&model, &solution, hhl, 20_000, 10_000, 42);
        assert_eq!(result.truncated, 0);
        let v = solution.value(hhl);
        assert!(
            (result.mean - v).abs() < 5.0 * result.std_error() + 1e-9,
            "mean {} vs V {} (se {})",
            result.mean,
            v,
            result.std_error()
        );
    }

    #[test]
    fn test_same_seed_same_result() {
        let (model, solution) = setup(TransitionBias::default());
        let hhh: State = "HHH".parse().unwrap();
        let a = simulate_batch(&model, &solution, hhh, 500, 1000, 3);
        let b = simulate_batch(&model, &solution, hhh, 500, 1000, 3);
        assert_eq!(a.mean, b.mean);
        assert_eq!(a.max, b.max);
    }

    #[test]
    fn test_step_cap_truncates() {
        // Nothing ever clears.
        let bias = TransitionBias::symmetric(RouteBias {
            relief: 0.0,
            onset: 0.0,
            spillover: 0.0,
            recovery: 0.0,
        });
        let model = TransitionModel::from_parts(
            &TransitionSpec::Bias(bias),
            RouteCosts([1.0, 1.0, 1.0]),
            0.0,
        )
        .unwrap();
        let mut policy = [Action::Route(Route::North); 8];
        policy[State::GOAL.index()] = Action::Goal;
        let mut rng = SmallRng::seed_from_u64(0);
        let ep = simulate_episode(&model, &policy, "LLH".parse().unwrap(), 25, &mut rng);
        assert!(ep.truncated);
        assert_eq!(ep.steps, 25);
        assert_eq!(ep.cost, 25.0);
    }
}
