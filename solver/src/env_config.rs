//! Shared process setup for the traffic binaries.
//!
//! Consolidates `TRAFFIC_BASE_PATH`, `RAYON_NUM_THREADS` and `RUST_LOG`
//! handling so every binary starts the same way.

use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::SolverError;

/// Install the stderr log subscriber. `RUST_LOG` overrides the default `info`.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Read `TRAFFIC_BASE_PATH` (default `"."`) and make it the working directory.
pub fn init_base_path() -> Result<PathBuf, SolverError> {
    let base_path = std::env::var("TRAFFIC_BASE_PATH").unwrap_or_else(|_| ".".to_string());
    let path = PathBuf::from(&base_path);
    std::env::set_current_dir(&path).map_err(|source| SolverError::Read {
        path: path.clone(),
        source,
    })?;
    if let Ok(cwd) = std::env::current_dir() {
        info!(cwd = %cwd.display(), "working directory");
    }
    Ok(path)
}

/// Read `RAYON_NUM_THREADS` (fallback `OMP_NUM_THREADS`, default: all cores)
/// and build the global pool. Tolerates an already-initialized pool.
pub fn init_rayon_threads() -> usize {
    let requested = std::env::var("RAYON_NUM_THREADS")
        .or_else(|_| std::env::var("OMP_NUM_THREADS"))
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&n| n > 0);
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = requested {
        builder = builder.num_threads(n);
    }
    // May fail if already initialized.
    let _ = builder.build_global();
    let num_threads = rayon::current_num_threads();
    info!(num_threads, "rayon pool ready");
    num_threads
}
