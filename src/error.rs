//! Error taxonomy shared by both build strategies.

use std::path::PathBuf;

use thiserror::Error;

use crate::engine::ReturnCode;

/// Errors raised while running a content build.
///
/// These never cross the public build entry points: [`crate::build::BuildOutcome`] carries
/// the rendered message instead.
#[derive(Debug, Error)]
pub enum BuildError {
  /// The configuration or build input is unusable. Detected before any task runs.
  #[error("invalid build input: {0}")]
  Precondition(String),

  /// The bundle engine reported a non-success status.
  #[error("bundle engine task `{task}` failed with status {code}: {message}")]
  Engine {
    /// Task that reported the failure.
    task: String,
    /// Status code returned by the engine.
    code: ReturnCode,
    /// Diagnostic supplied by the engine.
    message: String,
  },

  /// Every numeric suffix up to the retry bound was already taken.
  #[error("could not find a unique bundle name for `{name}` after {attempts} attempts")]
  NameCollision {
    /// Bundle name that kept colliding.
    name: String,
    /// Number of suffixes that were tried.
    attempts: usize,
  },

  /// A finished catalog violates dependency integrity.
  #[error("catalog integrity violation: {0}")]
  Catalog(String),

  /// Filesystem failure while reading inputs or writing artifacts.
  #[error("i/o failure on {}: {source}", path.display())]
  Io {
    /// Path that caused the error.
    path: PathBuf,
    /// Source I/O error.
    #[source]
    source: std::io::Error,
  },

  /// Failed to serialize a build artifact.
  #[error("failed to serialize {what}: {source}")]
  Serialize {
    /// Artifact being serialized.
    what: &'static str,
    /// Source serializer error.
    #[source]
    source: serde_json::Error,
  },
}

impl BuildError {
  pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Io {
      path: path.into(),
      source,
    }
  }
}

/// Result alias used by the pipeline internals.
pub type BuildResult<T> = Result<T, BuildError>;
