//! Model constants and state-indexing functions.
//!
//! A state packs one congestion bit per route into a 3-bit index:
//! `N << 2 | E << 1 | W`, with High = 1. Index 0 (`LLL`) is the goal.
//!
//! | index | code | index | code |
//! |-------|------|-------|------|
//! | 0 | LLL (goal) | 4 | HLL |
//! | 1 | LLH | 5 | HLH |
//! | 2 | LHL | 6 | HHL |
//! | 3 | LHH | 7 | HHH |

/// Number of routes (North, East, West).
pub const NUM_ROUTES: usize = 3;

/// Number of congestion states: 2^NUM_ROUTES.
pub const NUM_STATES: usize = 1 << NUM_ROUTES;

/// Index of the absorbing all-Low state.
pub const GOAL_INDEX: usize = 0;

/// Route indices, which are also the tie-break priority order.
pub const ROUTE_NORTH: usize = 0;
pub const ROUTE_EAST: usize = 1;
pub const ROUTE_WEST: usize = 2;

/// Human-readable route names, used as `route_costs` keys in the artifact.
pub const ROUTE_NAMES: [&str; NUM_ROUTES] = ["North", "East", "West"];

/// Single-letter action symbols.
pub const ROUTE_SYMBOLS: [&str; NUM_ROUTES] = ["N", "E", "W"];

/// Policy marker for the goal state.
pub const GOAL_SYMBOL: &str = "Goal";

/// Description of each state, indexed by state index.
pub const STATE_MEANINGS: [&str; NUM_STATES] = [
    "All Routes Optimal (GOAL STATE)",
    "North & East Clear, West Congested",
    "North & West Clear, East Congested",
    "North Clear, East & West Congested",
    "North Congested, East & West Clear",
    "East Clear, North & West Congested",
    "North & East Congested, West Clear",
    "All Routes Heavily Congested",
];

/// Tolerance on the sum of a transition row.
pub const DISTRIBUTION_TOLERANCE: f64 = 1e-9;

/// Default discount factor. The goal is absorbing, so no discounting is needed.
pub const DEFAULT_GAMMA: f64 = 1.0;

/// Default per-sweep convergence tolerance.
pub const DEFAULT_EPSILON_CONVERGE: f64 = 1e-6;

/// Default tolerance under which two action values count as tied.
pub const DEFAULT_EPSILON_TIE: f64 = 1e-6;

/// Default sweep bound.
pub const DEFAULT_MAX_SWEEPS: usize = 200;

/// Default cost added per High-congestion route in the current state.
pub const DEFAULT_CONGESTION_PENALTY: f64 = 10.0;

/// Bit position of route `route` inside a state index.
#[inline(always)]
pub fn route_bit(route: usize) -> usize {
    NUM_ROUTES - 1 - route
}

/// Test whether `route` is congested in state `state`.
#[inline(always)]
pub fn is_route_congested(state: usize, route: usize) -> bool {
    state & (1 << route_bit(route)) != 0
}

/// Number of High-congestion routes in `state`.
#[inline(always)]
pub fn congested_count(state: usize) -> u32 {
    (state as u32).count_ones()
}
