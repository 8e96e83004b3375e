//! Transition and cost model.
//!
//! `P(s' | s, a)` is stored as a dense 8 × 3 × 8 table built once from the
//! calibration and validated before any sweep runs. Rows that do not form a
//! probability distribution are rejected with
//! [`SolverError::InvalidDistribution`]; nothing is renormalized.
//!
//! ## Parametric bias
//!
//! Given the action, each route's congestion evolves independently:
//!
//! | route | current | P(next = High) |
//! |-------|---------|----------------|
//! | chosen | High | 1 − relief |
//! | chosen | Low | onset |
//! | unchosen | High | 1 − recovery |
//! | unchosen | Low | spillover |
//!
//! The successor distribution is the product of the three marginals.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calibration::{Calibration, RouteCosts};
use crate::constants::*;
use crate::error::SolverError;
use crate::types::{Action, Congestion, Route, State};

/// Distribution over successor states, in state index order.
pub type TransitionRow = [f64; NUM_STATES];

/// `table[state][route]` is the successor distribution for that pair.
pub type TransitionTable = [[TransitionRow; NUM_ROUTES]; NUM_STATES];

/// Successor distribution of the goal state under any action.
const ABSORBING_ROW: TransitionRow = {
    let mut row = [0.0; NUM_STATES];
    row[GOAL_INDEX] = 1.0;
    row
};

pub const DEFAULT_RELIEF: f64 = 0.7;
pub const DEFAULT_ONSET: f64 = 0.05;
pub const DEFAULT_SPILLOVER: f64 = 0.2;
pub const DEFAULT_RECOVERY: f64 = 0.5;

/// Congestion dynamics of one route.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteBias {
    /// P(High → Low) when traffic is routed onto this corridor.
    pub relief: f64,
    /// P(Low → High) when traffic is routed onto this corridor.
    pub onset: f64,
    /// P(Low → High) when traffic is routed elsewhere.
    pub spillover: f64,
    /// P(High → Low) when traffic is routed elsewhere.
    pub recovery: f64,
}

impl Default for RouteBias {
    fn default() -> Self {
        Self {
            relief: DEFAULT_RELIEF,
            onset: DEFAULT_ONSET,
            spillover: DEFAULT_SPILLOVER,
            recovery: DEFAULT_RECOVERY,
        }
    }
}

impl RouteBias {
    /// Probability that this route is High after one step.
    #[inline(always)]
    pub fn next_high(&self, current: Congestion, chosen: bool) -> f64 {
        match (chosen, current) {
            (true, Congestion::High) => 1.0 - self.relief,
            (true, Congestion::Low) => self.onset,
            (false, Congestion::High) => 1.0 - self.recovery,
            (false, Congestion::Low) => self.spillover,
        }
    }

    fn validate(&self, route: Route) -> Result<(), SolverError> {
        let fields = [
            ("relief", self.relief),
            ("onset", self.onset),
            ("spillover", self.spillover),
            ("recovery", self.recovery),
        ];
        for (name, p) in fields {
            if !(0.0..=1.0).contains(&p) {
                return Err(SolverError::InvalidDistribution {
                    row: format!("bias.{}.{}", route.name().to_lowercase(), name),
                    reason: format!("probability {p} outside [0, 1]"),
                });
            }
        }
        Ok(())
    }
}

/// Per-route congestion dynamics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionBias {
    pub north: RouteBias,
    pub east: RouteBias,
    pub west: RouteBias,
}

impl TransitionBias {
    /// Same dynamics on every route.
    pub fn symmetric(bias: RouteBias) -> Self {
        Self {
            north: bias,
            east: bias,
            west: bias,
        }
    }

    pub fn get(&self, route: Route) -> &RouteBias {
        match route {
            Route::North => &self.north,
            Route::East => &self.east,
            Route::West => &self.west,
        }
    }

    pub fn get_mut(&mut self, route: Route) -> &mut RouteBias {
        match route {
            Route::North => &mut self.north,
            Route::East => &mut self.east,
            Route::West => &mut self.west,
        }
    }

    pub fn validate(&self) -> Result<(), SolverError> {
        for r in Route::ALL {
            self.get(r).validate(r)?;
        }
        Ok(())
    }

    /// Successor distribution of `state` when traffic is routed onto `chosen`.
    pub fn row(&self, state: State, chosen: Route) -> TransitionRow {
        let next_high = Route::ALL.map(|r| self.get(r).next_high(state.congestion(r), r == chosen));
        let mut row = [0.0; NUM_STATES];
        for next in State::ALL {
            row[next.index()] = Route::ALL
                .iter()
                .map(|&r| match next.congestion(r) {
                    Congestion::High => next_high[r.index()],
                    Congestion::Low => 1.0 - next_high[r.index()],
                })
                .product();
        }
        row
    }
}

/// One explicitly supplied transition row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub state: State,
    pub action: Route,
    /// Successor probabilities in state index order (`LLL`, `LLH`, ..., `HHH`).
    pub probabilities: Vec<f64>,
}

/// How transition probabilities are specified by a calibration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionSpec {
    Bias(TransitionBias),
    Table(Vec<TableRow>),
}

fn row_label(state: State, route: Route) -> String {
    format!("{}/{}", state, route.symbol())
}

/// Check that `row` is a probability distribution.
pub fn validate_row(row: &[f64], label: &str) -> Result<(), SolverError> {
    let invalid = |reason: String| SolverError::InvalidDistribution {
        row: label.to_string(),
        reason,
    };
    if row.len() != NUM_STATES {
        return Err(invalid(format!(
            "expected {} entries, got {}",
            NUM_STATES,
            row.len()
        )));
    }
    if let Some(p) = row.iter().find(|p| !p.is_finite() || **p < 0.0) {
        return Err(invalid(format!("entry {p} is not a non-negative probability")));
    }
    let sum: f64 = row.iter().sum();
    if (sum - 1.0).abs() > DISTRIBUTION_TOLERANCE {
        return Err(invalid(format!("probabilities sum to {sum}")));
    }
    Ok(())
}

fn table_from_rows(rows: &[TableRow]) -> Result<TransitionTable, SolverError> {
    let mut table = [[ABSORBING_ROW; NUM_ROUTES]; NUM_STATES];
    let mut seen = [[false; NUM_ROUTES]; NUM_STATES];

    for row in rows {
        let label = row_label(row.state, row.action);
        if row.state.is_goal() {
            debug!(row = %label, "ignoring supplied goal row, goal is absorbing");
            continue;
        }
        validate_row(&row.probabilities, &label)?;
        let (s, a) = (row.state.index(), row.action.index());
        if seen[s][a] {
            return Err(SolverError::InvalidDistribution {
                row: label,
                reason: "row supplied more than once".to_string(),
            });
        }
        seen[s][a] = true;
        table[s][a].copy_from_slice(&row.probabilities);
    }

    for state in State::ALL.into_iter().filter(|s| !s.is_goal()) {
        for route in Route::ALL {
            if !seen[state.index()][route.index()] {
                return Err(SolverError::InvalidDistribution {
                    row: row_label(state, route),
                    reason: "row missing from transition table".to_string(),
                });
            }
        }
    }
    Ok(table)
}

fn table_from_bias(bias: &TransitionBias) -> Result<TransitionTable, SolverError> {
    bias.validate()?;
    let mut table = [[ABSORBING_ROW; NUM_ROUTES]; NUM_STATES];
    for state in State::ALL.into_iter().filter(|s| !s.is_goal()) {
        for route in Route::ALL {
            let row = bias.row(state, route);
            validate_row(&row, &row_label(state, route))?;
            table[state.index()][route.index()] = row;
        }
    }
    Ok(table)
}

/// Validated transition probabilities and immediate costs.
#[derive(Clone, Debug)]
pub struct TransitionModel {
    table: TransitionTable,
    route_costs: RouteCosts,
    congestion_penalty: f64,
}

impl TransitionModel {
    pub fn new(calibration: &Calibration) -> Result<Self, SolverError> {
        Self::from_parts(
            &calibration.transitions,
            calibration.route_costs,
            calibration.congestion_penalty,
        )
    }

    pub fn from_parts(
        spec: &TransitionSpec,
        route_costs: RouteCosts,
        congestion_penalty: f64,
    ) -> Result<Self, SolverError> {
        route_costs.validate()?;
        if !congestion_penalty.is_finite() || congestion_penalty < 0.0 {
            return Err(SolverError::Config(format!(
                "congestion penalty must be a finite non-negative number, got {congestion_penalty}"
            )));
        }
        let table = match spec {
            TransitionSpec::Bias(bias) => table_from_bias(bias)?,
            TransitionSpec::Table(rows) => table_from_rows(rows)?,
        };
        Ok(Self {
            table,
            route_costs,
            congestion_penalty,
        })
    }

    /// Successor distribution for `action` in `state`.
    #[inline(always)]
    pub fn transition(&self, state: State, action: Action) -> &TransitionRow {
        match action {
            Action::Route(route) if !state.is_goal() => &self.table[state.index()][route.index()],
            _ => &ABSORBING_ROW,
        }
    }

    /// Immediate cost of `action` in `state`; zero at the goal.
    #[inline(always)]
    pub fn cost(&self, state: State, action: Action) -> f64 {
        match action {
            Action::Route(route) if !state.is_goal() => {
                self.route_costs.get(route) + self.congestion_penalty * state.high_count() as f64
            }
            _ => 0.0,
        }
    }

    pub fn route_costs(&self) -> &RouteCosts {
        &self.route_costs
    }

    pub fn congestion_penalty(&self) -> f64 {
        self.congestion_penalty
    }
}
