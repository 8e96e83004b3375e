//! Result artifact: JSON consumed by the reporting layer.
//!
//! | field | content |
//! |-------|---------|
//! | `policy` | state code → `N` / `E` / `W` / `Goal` |
//! | `expected_values` | state code → converged cost-to-goal |
//! | `route_costs` | route name → calibrated base cost |
//! | `convergence_data` | per-sweep max delta |
//! | `iterations` | sweep count |
//! | `state_meanings` | state code → description |
//! | `converged` | false only for explicitly exported best-effort runs |
//!
//! Writes go to a sibling temporary file that is synced and renamed over the
//! destination, so readers never observe a partial artifact.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::calibration::RouteCosts;
use crate::error::SolverError;
use crate::types::{Action, State};
use crate::value_iteration::Solution;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub policy: BTreeMap<State, Action>,
    pub expected_values: BTreeMap<State, f64>,
    pub route_costs: RouteCosts,
    pub convergence_data: Vec<f64>,
    pub iterations: usize,
    pub state_meanings: BTreeMap<State, String>,
    pub converged: bool,
}

impl Artifact {
    pub fn new(solution: &Solution, route_costs: &RouteCosts) -> Self {
        Self {
            policy: State::ALL.iter().map(|&s| (s, solution.action(s))).collect(),
            expected_values: State::ALL.iter().map(|&s| (s, solution.value(s))).collect(),
            route_costs: *route_costs,
            convergence_data: solution.convergence.clone(),
            iterations: solution.iterations,
            state_meanings: State::ALL
                .iter()
                .map(|&s| (s, s.meaning().to_string()))
                .collect(),
            converged: solution.converged,
        }
    }

    /// Pretty-printed JSON with 4-space indentation.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        // serde_json only emits valid UTF-8.
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    pub fn read(path: &Path) -> Result<Self, SolverError> {
        let content = fs::read_to_string(path).map_err(|source| SolverError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|e| SolverError::DataFormat {
            line: e.line(),
            reason: format!("artifact {}: {}", path.display(), e),
        })
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    path.with_file_name(format!(".{}.tmp-{}", name, std::process::id()))
}

pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    let result = (|| {
        let mut f = File::create(&tmp)?;
        f.write_all(content)?;
        f.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Serialize `artifact` and persist it at `path`.
pub fn write_artifact(artifact: &Artifact, path: &Path) -> Result<(), SolverError> {
    let write_err = |source: io::Error| SolverError::Write {
        path: path.to_path_buf(),
        source,
    };
    let json = artifact.to_json().map_err(|e| write_err(io::Error::other(e)))?;
    write_atomic(path, json.as_bytes()).map_err(write_err)?;
    info!(path = %path.display(), bytes = json.len(), "artifact written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::NUM_STATES;
    use crate::types::Route;

    fn sample_solution() -> Solution {
        let mut policy = [Action::Route(Route::North); NUM_STATES];
        policy[0] = Action::Goal;
        policy[7] = Action::Route(Route::West);
        Solution {
            values: [0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0],
            policy,
            convergence: vec![70.0, 3.5, 1e-7],
            iterations: 3,
            converged: true,
        }
    }

    #[test]
    fn test_artifact_fields() {
        let art = Artifact::new(&sample_solution(), &RouteCosts([49.2, 83.8, 88.4]));
        let json: serde_json::Value = serde_json::from_str(&art.to_json().unwrap()).unwrap();
        assert_eq!(json["policy"]["LLL"], "Goal");
        assert_eq!(json["policy"]["HHH"], "W");
        assert_eq!(json["policy"]["HLL"], "N");
        assert_eq!(json["expected_values"]["HHL"], 60.0);
        assert_eq!(json["route_costs"]["East"], 83.8);
        assert_eq!(json["convergence_data"].as_array().unwrap().len(), 3);
        assert_eq!(json["iterations"], 3);
        assert_eq!(json["state_meanings"]["LLL"], "All Routes Optimal (GOAL STATE)");
        assert_eq!(json["policy"].as_object().unwrap().len(), NUM_STATES);
        assert_eq!(json["converged"], true);
    }

    #[test]
    fn test_json_uses_four_space_indent() {
        let art = Artifact::new(&sample_solution(), &RouteCosts([1.0, 2.0, 3.0]));
        let text = art.to_json().unwrap();
        assert!(text.contains("\n    \"policy\": {\n        \"LLL\": \"Goal\""), "{text}");
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = std::env::temp_dir().join(format!("traffic_export_{}", std::process::id()));
        let path = dir.join("nested").join("traffic_output.json");
        let art = Artifact::new(&sample_solution(), &RouteCosts([1.0, 2.0, 3.0]));
        write_artifact(&art, &path).unwrap();
        assert_eq!(Artifact::read(&path).unwrap(), art);
        // No temporary file left behind.
        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_write_into_missing_root_fails_with_write_error() {
        let path = Path::new("/proc/traffic_mdp_cannot_write_here/out.json");
        let art = Artifact::new(&sample_solution(), &RouteCosts([1.0, 2.0, 3.0]));
        match write_artifact(&art, path).unwrap_err() {
            SolverError::Write { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!path.exists());
    }
}
