//! Calibration: from historical route-performance rows to model parameters.
//!
//! The solver core only sees a [`Calibration`]: three base route costs, a
//! congestion penalty and a [`TransitionSpec`]. Everything about the dataset
//! format stays in this module.
//!
//! ## Dataset format
//!
//! Delimited text, one observed transition per row:
//!
//! ```text
//! n_start;e_start;w_start;action;n_end;e_end;w_end[;cost]
//! High;High;Low;N;Low;High;Low;41.5
//! ```
//!
//! A header row is detected when any cell names a known column; columns are
//! then located by name. A leading byte-order mark is ignored. Rows with
//! unrecognized symbols are filtered out.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::constants::*;
use crate::environment::EnvConfig;
use crate::error::SolverError;
use crate::transition::{RouteBias, TableRow, TransitionBias, TransitionSpec};
use crate::types::{Congestion, Route, State};

/// Required header names, in positional order.
const REQUIRED_COLUMNS: [&str; 7] = [
    "n_start", "e_start", "w_start", "action", "n_end", "e_end", "w_end",
];

const COST_COLUMN: &str = "cost";

/// Base cost of choosing each route (North, East, West).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "RouteCostsRepr", from = "RouteCostsRepr")]
pub struct RouteCosts(pub [f64; NUM_ROUTES]);

/// Named-field form used in calibration files and artifacts.
#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RouteCostsRepr {
    north: f64,
    east: f64,
    west: f64,
}

impl From<RouteCosts> for RouteCostsRepr {
    fn from(c: RouteCosts) -> Self {
        Self {
            north: c.0[ROUTE_NORTH],
            east: c.0[ROUTE_EAST],
            west: c.0[ROUTE_WEST],
        }
    }
}

impl From<RouteCostsRepr> for RouteCosts {
    fn from(r: RouteCostsRepr) -> Self {
        RouteCosts([r.north, r.east, r.west])
    }
}

impl RouteCosts {
    #[inline(always)]
    pub fn get(&self, route: Route) -> f64 {
        self.0[route.index()]
    }

    pub fn validate(&self) -> Result<(), SolverError> {
        for r in Route::ALL {
            let c = self.get(r);
            if !c.is_finite() || c < 0.0 {
                return Err(SolverError::Config(format!(
                    "route cost for {r} must be a finite non-negative number, got {c}"
                )));
            }
        }
        Ok(())
    }
}

/// Everything the transition and cost model needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub route_costs: RouteCosts,
    pub congestion_penalty: f64,
    pub transitions: TransitionSpec,
}

impl Calibration {
    /// Read a calibration file written as JSON.
    pub fn from_json_file(path: &Path) -> Result<Self, SolverError> {
        let content = std::fs::read_to_string(path).map_err(|source| SolverError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|e| SolverError::DataFormat {
            line: e.line(),
            reason: format!("calibration file {}: {}", path.display(), e),
        })
    }
}

/// How the dataset is tokenized.
#[derive(Clone, Debug)]
pub struct LoaderConfig {
    pub delimiter: char,
    /// `None` auto-detects a header from the first row.
    pub has_header: Option<bool>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            delimiter: ';',
            has_header: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransitionMode {
    /// Estimate per-route bias parameters.
    #[default]
    Parametric,
    /// Count (start, action, end) occurrences directly.
    Empirical,
}

/// How observations are turned into a [`Calibration`].
#[derive(Clone, Debug)]
pub struct CalibrationConfig {
    pub transition_mode: TransitionMode,
    /// Used when the dataset carries no cost column.
    pub congestion_penalty: f64,
    /// Fallback for bias parameters without observations.
    pub prior: TransitionBias,
    /// Source of base costs for routes without cost observations.
    pub environment: EnvConfig,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            transition_mode: TransitionMode::Parametric,
            congestion_penalty: DEFAULT_CONGESTION_PENALTY,
            prior: TransitionBias::default(),
            environment: EnvConfig::default(),
        }
    }
}

/// One observed transition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Observation {
    pub start: State,
    pub action: Route,
    pub end: State,
    /// Observed cost of the chosen route, when the dataset records it.
    pub cost: Option<f64>,
}

/// Parsed dataset.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    pub observations: Vec<Observation>,
    /// Rows dropped for unrecognized symbols or costs.
    pub skipped: usize,
    pub has_cost_column: bool,
}

/// Column positions inside a row.
struct ColumnLayout {
    required: [usize; 7],
    cost: Option<usize>,
}

impl ColumnLayout {
    fn positional(width: usize) -> Self {
        Self {
            required: [0, 1, 2, 3, 4, 5, 6],
            cost: (width > REQUIRED_COLUMNS.len()).then_some(REQUIRED_COLUMNS.len()),
        }
    }

    fn from_header(cells: &[&str], line: usize) -> Result<Self, SolverError> {
        let find = |name: &str| {
            cells
                .iter()
                .position(|c| c.trim().eq_ignore_ascii_case(name))
        };
        let mut required = [0usize; 7];
        for (slot, name) in required.iter_mut().zip(REQUIRED_COLUMNS) {
            *slot = find(name).ok_or_else(|| SolverError::DataFormat {
                line,
                reason: format!("missing required column '{name}'"),
            })?;
        }
        Ok(Self {
            required,
            cost: find(COST_COLUMN),
        })
    }

    fn width(&self) -> usize {
        let max_required = self.required.iter().copied().max().unwrap_or(0);
        max_required.max(self.cost.unwrap_or(0)) + 1
    }
}

fn looks_like_header(cells: &[&str]) -> bool {
    cells.iter().any(|c| {
        let c = c.trim();
        c.eq_ignore_ascii_case(COST_COLUMN)
            || REQUIRED_COLUMNS.iter().any(|name| c.eq_ignore_ascii_case(name))
    })
}

fn parse_state(cells: &[&str]) -> Option<State> {
    let mut levels = [Congestion::Low; NUM_ROUTES];
    for (level, cell) in levels.iter_mut().zip(cells) {
        *level = cell.parse().ok()?;
    }
    Some(State::from_congestion(levels))
}

fn parse_row(cells: &[&str], layout: &ColumnLayout) -> Option<Observation> {
    let pick = |i: usize| cells[layout.required[i]];
    let start = parse_state(&[pick(0), pick(1), pick(2)])?;
    let action: Route = pick(3).parse().ok()?;
    let end = parse_state(&[pick(4), pick(5), pick(6)])?;
    let cost = match layout.cost.and_then(|i| cells.get(i)) {
        Some(raw) if !raw.trim().is_empty() => {
            let c: f64 = raw.trim().parse().ok()?;
            if !c.is_finite() || c < 0.0 {
                return None;
            }
            Some(c)
        }
        _ => None,
    };
    Some(Observation {
        start,
        action,
        end,
        cost,
    })
}

/// Parse observations from any line-oriented reader.
pub fn parse_dataset<R: BufRead>(
    reader: R,
    config: &LoaderConfig,
) -> Result<Dataset, SolverError> {
    let mut dataset = Dataset::default();
    let mut layout: Option<ColumnLayout> = None;

    for (i, line) in reader.lines().enumerate() {
        let line_no = i + 1;
        let line = line.map_err(|e| SolverError::DataFormat {
            line: line_no,
            reason: e.to_string(),
        })?;
        let line = line.trim_start_matches('\u{feff}').trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let cells: Vec<&str> = line.split(config.delimiter).collect();

        if layout.is_none() {
            let header = config
                .has_header
                .unwrap_or_else(|| looks_like_header(&cells));
            if header {
                layout = Some(ColumnLayout::from_header(&cells, line_no)?);
                continue;
            }
            layout = Some(ColumnLayout::positional(cells.len()));
        }
        let Some(columns) = layout.as_ref() else {
            continue;
        };

        // The cost cell may be absent on individual rows.
        if columns.required.iter().any(|&c| c >= cells.len()) {
            return Err(SolverError::DataFormat {
                line: line_no,
                reason: format!(
                    "expected at least {} columns, found {}",
                    columns.width(),
                    cells.len()
                ),
            });
        }

        match parse_row(&cells, columns) {
            Some(obs) => dataset.observations.push(obs),
            None => {
                debug!(line = line_no, content = line, "skipping unrecognized row");
                dataset.skipped += 1;
            }
        }
    }

    dataset.has_cost_column = layout.is_some_and(|l| l.cost.is_some());
    if dataset.observations.is_empty() {
        return Err(SolverError::EmptyDataset {
            skipped: dataset.skipped,
        });
    }
    Ok(dataset)
}

/// Read and parse the dataset at `path`.
pub fn load_dataset(path: &Path, config: &LoaderConfig) -> Result<Dataset, SolverError> {
    let file = File::open(path).map_err(|source| SolverError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let dataset = parse_dataset(BufReader::new(file), config)?;
    info!(
        path = %path.display(),
        rows = dataset.observations.len(),
        skipped = dataset.skipped,
        cost_column = dataset.has_cost_column,
        "loaded performance dataset"
    );
    if dataset.skipped > 0 {
        warn!(skipped = dataset.skipped, "filtered rows with unrecognized symbols");
    }
    Ok(dataset)
}

/// Success/trial counter for one Bernoulli parameter.
#[derive(Clone, Copy, Default)]
struct Tally {
    hits: u64,
    trials: u64,
}

impl Tally {
    fn record(&mut self, hit: bool) {
        self.trials += 1;
        if hit {
            self.hits += 1;
        }
    }

    fn estimate(&self, prior: f64, route: Route, name: &str) -> f64 {
        if self.trials == 0 {
            warn!(route = %route, parameter = name, prior, "no observations, using prior");
            return prior;
        }
        self.hits as f64 / self.trials as f64
    }
}

/// Maximum-likelihood bias parameters for every route.
pub fn estimate_bias(observations: &[Observation], prior: &TransitionBias) -> TransitionBias {
    // [route][relief, onset, spillover, recovery]
    let mut tallies = [[Tally::default(); 4]; NUM_ROUTES];
    for obs in observations {
        for route in Route::ALL {
            let before = obs.start.congestion(route);
            let after = obs.end.congestion(route);
            let chosen = route == obs.action;
            let t = &mut tallies[route.index()];
            match (chosen, before) {
                (true, Congestion::High) => t[0].record(after == Congestion::Low),
                (true, Congestion::Low) => t[1].record(after == Congestion::High),
                (false, Congestion::Low) => t[2].record(after == Congestion::High),
                (false, Congestion::High) => t[3].record(after == Congestion::Low),
            }
        }
    }

    let mut bias = *prior;
    for route in Route::ALL {
        let t = &tallies[route.index()];
        let p = *prior.get(route);
        *bias.get_mut(route) = RouteBias {
            relief: t[0].estimate(p.relief, route, "relief"),
            onset: t[1].estimate(p.onset, route, "onset"),
            spillover: t[2].estimate(p.spillover, route, "spillover"),
            recovery: t[3].estimate(p.recovery, route, "recovery"),
        };
    }
    bias
}

/// Normalized (start, action) → end frequencies. Unobserved pairs take the
/// parametric row from `fallback`.
pub fn empirical_table(observations: &[Observation], fallback: &TransitionBias) -> Vec<TableRow> {
    let mut counts = [[[0u64; NUM_STATES]; NUM_ROUTES]; NUM_STATES];
    for obs in observations {
        counts[obs.start.index()][obs.action.index()][obs.end.index()] += 1;
    }

    let mut rows = Vec::with_capacity((NUM_STATES - 1) * NUM_ROUTES);
    for state in State::ALL.into_iter().filter(|s| !s.is_goal()) {
        for route in Route::ALL {
            let row = &counts[state.index()][route.index()];
            let total: u64 = row.iter().sum();
            let probabilities = if total == 0 {
                warn!(
                    state = %state,
                    action = route.symbol(),
                    "unobserved transition row, using parametric estimate"
                );
                fallback.row(state, route).to_vec()
            } else {
                row.iter().map(|&c| c as f64 / total as f64).collect()
            };
            rows.push(TableRow {
                state,
                action: route,
                probabilities,
            });
        }
    }
    rows
}

/// Base costs and congestion penalty fitted from observed costs.
///
/// Pooled within-route least squares of cost on `#High(start)`: a shared slope
/// (the penalty, clamped at zero) and one intercept per route (the base cost).
/// When `#High` never varies within a route the slope is unidentified and
/// `fallback_penalty` is used; intercepts are always fitted against the slope
/// that is returned. Routes without cost observations get `None`.
pub fn fit_route_costs(
    observations: &[Observation],
    fallback_penalty: f64,
) -> Option<([Option<f64>; NUM_ROUTES], f64)> {
    let mut groups: [Vec<(f64, f64)>; NUM_ROUTES] = Default::default();
    for obs in observations {
        if let Some(c) = obs.cost {
            groups[obs.action.index()].push((obs.start.high_count() as f64, c));
        }
    }
    if groups.iter().all(|g| g.is_empty()) {
        return None;
    }

    let means: Vec<(f64, f64)> = groups
        .iter()
        .map(|g| {
            let n = g.len().max(1) as f64;
            (
                g.iter().map(|p| p.0).sum::<f64>() / n,
                g.iter().map(|p| p.1).sum::<f64>() / n,
            )
        })
        .collect();

    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (g, &(mx, my)) in groups.iter().zip(&means) {
        for &(x, y) in g {
            sxy += (x - mx) * (y - my);
            sxx += (x - mx) * (x - mx);
        }
    }
    let slope = if sxx > 0.0 {
        (sxy / sxx).max(0.0)
    } else {
        fallback_penalty
    };

    let mut intercepts = [None; NUM_ROUTES];
    for (r, g) in groups.iter().enumerate() {
        if !g.is_empty() {
            let (mx, my) = means[r];
            intercepts[r] = Some((my - slope * mx).max(0.0));
        }
    }
    Some((intercepts, slope))
}

/// Turn a parsed dataset into model parameters.
pub fn calibrate(
    dataset: &Dataset,
    config: &CalibrationConfig,
) -> Result<Calibration, SolverError> {
    if dataset.observations.is_empty() {
        return Err(SolverError::EmptyDataset {
            skipped: dataset.skipped,
        });
    }

    let bias = estimate_bias(&dataset.observations, &config.prior);
    let transitions = match config.transition_mode {
        TransitionMode::Parametric => TransitionSpec::Bias(bias),
        TransitionMode::Empirical => {
            TransitionSpec::Table(empirical_table(&dataset.observations, &bias))
        }
    };

    let env_costs = config.environment.route_costs();
    let fitted = fit_route_costs(&dataset.observations, config.congestion_penalty);
    let (route_costs, congestion_penalty) = match fitted {
        Some((fitted, slope)) => {
            let mut costs = env_costs;
            for route in Route::ALL {
                match fitted[route.index()] {
                    Some(c) => costs.0[route.index()] = c,
                    None => warn!(route = %route, "no cost observations, using environment cost"),
                }
            }
            (costs, slope)
        }
        None => (env_costs, config.congestion_penalty),
    };

    for route in Route::ALL {
        let b = bias.get(route);
        info!(
            route = %route,
            base_cost = route_costs.get(route),
            relief = b.relief,
            onset = b.onset,
            spillover = b.spillover,
            recovery = b.recovery,
            "calibrated route"
        );
    }
    info!(congestion_penalty, mode = ?config.transition_mode, "calibration complete");

    Ok(Calibration {
        route_costs,
        congestion_penalty,
        transitions,
    })
}
