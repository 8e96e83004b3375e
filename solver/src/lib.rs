//! # Traffic MDP: Optimal Three-Route Congestion Policy
//!
//! Computes the optimal routing decision for every congestion snapshot of three
//! routes (North, East, West) by **value iteration** over an 8-state Markov
//! decision process, and writes the policy, value function and convergence
//! trace as a JSON artifact for downstream reporting.
//!
//! ## Pipeline
//!
//! | Stage | Rust module | Description |
//! |-------|-------------|-------------|
//! | 1 | [`calibration`] | Parse the performance dataset, estimate bias parameters and route base costs |
//! | 2 | [`transition`] | Build and validate `P(s' \| s, a)` and `cost(s, a)` |
//! | 3 | [`value_iteration`] | Synchronous Bellman sweeps until `Δ < ε_converge`, then policy extraction |
//! | 4 | [`export`] | Serialize the artifact and write it atomically |
//!
//! [`pipeline`] chains the stages; [`simulation`] validates a solved policy by
//! Monte Carlo rollouts and sweeps the environment cost model across scenarios.
//!
//! ## State representation
//!
//! A state is one congestion level per route. Flat index:
//! `N << 2 | E << 1 | W` with High = 1, so index 0 (`LLL`) is the absorbing,
//! cost-free goal and index 7 is `HHH`. Iteration over [`types::State::ALL`]
//! is always in index order, which makes every run deterministic.
//!
//! ## Cost model
//!
//! `cost(s, a) = base_cost[a] + congestion_penalty × #High(s)`, zero at the goal.
//! Base costs come from observed costs when the dataset carries them, otherwise
//! from [`environment::EnvConfig`].
//!
//! ## Tie-breaking
//!
//! Q-values within `ε_tie` of the minimum are resolved North > East > West.

pub mod calibration;
pub mod cli;
pub mod constants;
pub mod env_config;
pub mod environment;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod simulation;
pub mod transition;
pub mod types;
pub mod value_iteration;

pub use error::SolverError;
