//! Error taxonomy for a solver run.
//!
//! Every variant aborts the current run; none is retried internally.
//! [`SolverError::exit_code`] gives each class a distinct process status.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::value_iteration::Solution;

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("data format error at line {line}: {reason}")]
    DataFormat { line: usize, reason: String },

    #[error("dataset has no usable rows ({skipped} rows filtered)")]
    EmptyDataset { skipped: usize },

    #[error("invalid transition distribution for {row}: {reason}")]
    InvalidDistribution { row: String, reason: String },

    #[error(
        "value iteration did not converge within {sweeps} sweeps \
         (last delta {last_delta:.3e}, tolerance {tolerance:.3e})"
    )]
    ConvergenceFailure {
        sweeps: usize,
        last_delta: f64,
        tolerance: f64,
        /// Values and policy after the final sweep, for callers that accept them.
        best_effort: Box<Solution>,
    },

    #[error("cannot write artifact {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SolverError {
    /// Process exit status for this error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            SolverError::Read { .. }
            | SolverError::DataFormat { .. }
            | SolverError::EmptyDataset { .. }
            | SolverError::Config(_) => 2,
            SolverError::InvalidDistribution { .. } => 3,
            SolverError::ConvergenceFailure { .. } => 4,
            SolverError::Write { .. } => 5,
        }
    }
}

/// Unrecognized route, congestion, state or action symbol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized {kind} symbol '{symbol}'")]
pub struct SymbolError {
    pub kind: &'static str,
    pub symbol: String,
}

impl SymbolError {
    pub fn new(kind: &'static str, symbol: &str) -> Self {
        Self {
            kind,
            symbol: symbol.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_per_class() {
        let data = SolverError::EmptyDataset { skipped: 3 };
        let dist = SolverError::InvalidDistribution {
            row: "HHL/N".into(),
            reason: "sums to 1.5".into(),
        };
        let write = SolverError::Write {
            path: PathBuf::from("out.json"),
            source: io::Error::other("disk full"),
        };
        assert_eq!(data.exit_code(), 2);
        assert_eq!(dist.exit_code(), 3);
        assert_eq!(write.exit_code(), 5);
        assert!(dist.to_string().contains("HHL/N"));
    }
}
