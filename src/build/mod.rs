//! Build strategies turning a pipeline configuration into bundles and a catalog.
//!
//! [`PackedBuilder`] drives a [`crate::engine::BundleEngine`] and installs its output;
//! [`VirtualBuilder`] fabricates bundle metadata without compiling anything. Both report a
//! [`BuildOutcome`] instead of returning errors.

pub mod content_state;
mod packed;
mod plan;
mod simulated;
pub mod writer;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::error::BuildResult;
use crate::models::BundleBuildResult;

pub use packed::PackedBuilder;
pub use simulated::{VirtualAssetBundle, VirtualAssetBundleEntry, VirtualBuilder};

/// Result of a build entry point.
#[derive(Debug, Clone, Default)]
pub struct BuildOutcome {
  /// Failure message. Empty when the build succeeded.
  pub error: String,
  /// Number of locations in the written catalog.
  pub location_count: usize,
  /// Wall clock time spent.
  pub duration: Duration,
  /// Catalog JSON written by the build.
  pub catalog_path: Option<PathBuf>,
  /// Settings document written by the build.
  pub settings_path: Option<PathBuf>,
  /// Path the runtime loads its settings from.
  pub runtime_settings_path: Option<String>,
  /// Content state snapshot, packed builds only.
  pub content_state_path: Option<PathBuf>,
  /// Per-bundle results.
  pub bundles: Vec<BundleBuildResult>,
}

impl BuildOutcome {
  /// Whether the build finished without error.
  pub fn is_success(&self) -> bool {
    self.error.is_empty()
  }
}

/// Run `body` and fold its result into an outcome, logging the summary.
pub(crate) fn run_build(
  mode: &'static str,
  body: impl FnOnce(&mut BuildOutcome) -> BuildResult<()>,
) -> BuildOutcome {
  let started = Instant::now();
  let mut outcome = BuildOutcome::default();
  let result = body(&mut outcome);
  if let Err(err) = result {
    outcome = BuildOutcome {
      error: err.to_string(),
      ..BuildOutcome::default()
    };
  }
  outcome.duration = started.elapsed();

  if outcome.is_success() {
    info!(
      mode,
      locations = outcome.location_count,
      bundles = outcome.bundles.len(),
      elapsed_ms = outcome.duration.as_millis() as u64,
      "content build finished"
    );
  } else {
    error!(mode, error = %outcome.error, "content build failed");
  }
  outcome
}
