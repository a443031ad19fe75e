//! Interface to the external bundle compilation engine.
//!
//! The engine is opaque to the pipeline: it receives the declared task list, the bundle
//! input definitions and a compression mode per bundle, and answers with one
//! [`BundleBuildResult`] per bundle or an [`EngineFailure`].

mod archive;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use tracing::debug;

use crate::error::BuildError;
use crate::models::{BuildTarget, BundleBuildResult, BundleInputDefinition, CompressionMode};

pub use archive::ArchiveEngine;

/// Status reported by an engine task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
  /// The task did its work.
  Success,
  /// The task reused cached output.
  SuccessCached,
  /// The task had nothing to do.
  SuccessNotRun,
  /// Generic failure.
  Error,
  /// The task crashed.
  Exception,
  /// The task was cancelled.
  Canceled,
  /// The source project has unsaved changes.
  UnsavedChanges,
  /// Inputs required by the task are missing.
  MissingRequiredObjects,
}

impl ReturnCode {
  /// Whether the pipeline may continue after this status.
  pub fn is_success(self) -> bool {
    matches!(
      self,
      Self::Success | Self::SuccessCached | Self::SuccessNotRun
    )
  }

  /// Numeric status code.
  pub fn code(self) -> i32 {
    match self {
      Self::Success => 0,
      Self::SuccessCached => 1,
      Self::SuccessNotRun => 2,
      Self::Error => -1,
      Self::Exception => -2,
      Self::Canceled => -3,
      Self::UnsavedChanges => -4,
      Self::MissingRequiredObjects => -5,
    }
  }
}

impl fmt::Display for ReturnCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:?} ({})", self, self.code())
  }
}

/// One step of the engine pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BuildTask {
  /// Select the target platform.
  SwitchToBuildPlatform,
  /// Resolve the objects each asset references.
  CalculateAssetDependencyData,
  /// Drop sprite sources no bundle needs.
  StripUnusedSpriteSources,
  /// Collect built-in shaders into their own bundle.
  CreateBuiltInShadersBundle,
  /// Assign assets to bundles.
  GenerateBundlePacking,
  /// Reorder objects inside each bundle.
  UpdateBundleObjectLayout,
  /// Emit the write commands of each bundle.
  GenerateBundleCommands,
  /// Map sub-assets to their load paths.
  GenerateSubAssetPathMaps,
  /// Check every bundle against its asset list.
  GenerateBundleMaps,
  /// Produce the engine's own location lists.
  GenerateLocationLists,
  /// Serialize asset payloads.
  WriteSerializedFiles,
  /// Write the final bundle archives.
  ArchiveAndCompressBundles,
}

impl BuildTask {
  /// Stable display name of the task.
  pub fn name(self) -> &'static str {
    match self {
      Self::SwitchToBuildPlatform => "switch_to_build_platform",
      Self::CalculateAssetDependencyData => "calculate_asset_dependency_data",
      Self::StripUnusedSpriteSources => "strip_unused_sprite_sources",
      Self::CreateBuiltInShadersBundle => "create_built_in_shaders_bundle",
      Self::GenerateBundlePacking => "generate_bundle_packing",
      Self::UpdateBundleObjectLayout => "update_bundle_object_layout",
      Self::GenerateBundleCommands => "generate_bundle_commands",
      Self::GenerateSubAssetPathMaps => "generate_sub_asset_path_maps",
      Self::GenerateBundleMaps => "generate_bundle_maps",
      Self::GenerateLocationLists => "generate_location_lists",
      Self::WriteSerializedFiles => "write_serialized_files",
      Self::ArchiveAndCompressBundles => "archive_and_compress_bundles",
    }
  }
}

impl fmt::Display for BuildTask {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Ordered task list of a packed build.
pub const PACKED_BUILD_TASKS: &[BuildTask] = &[
  BuildTask::SwitchToBuildPlatform,
  BuildTask::CalculateAssetDependencyData,
  BuildTask::StripUnusedSpriteSources,
  BuildTask::CreateBuiltInShadersBundle,
  BuildTask::GenerateBundlePacking,
  BuildTask::UpdateBundleObjectLayout,
  BuildTask::GenerateBundleCommands,
  BuildTask::GenerateSubAssetPathMaps,
  BuildTask::GenerateBundleMaps,
  BuildTask::GenerateLocationLists,
  BuildTask::WriteSerializedFiles,
  BuildTask::ArchiveAndCompressBundles,
];

/// Inputs handed to the engine besides the bundle definitions.
#[derive(Debug, Clone)]
pub struct EngineParameters {
  /// Platform being built.
  pub target: BuildTarget,
  /// Directory asset paths are relative to.
  pub content_root: PathBuf,
  /// Directory compiled bundles are written to, named after the bundle.
  pub output_dir: PathBuf,
  /// Compression mode per bundle name.
  pub compression: BTreeMap<String, CompressionMode>,
}

impl EngineParameters {
  /// Compression for `bundle`, falling back to the platform default.
  pub fn compression_for(&self, bundle: &str) -> CompressionMode {
    self
      .compression
      .get(bundle)
      .copied()
      .unwrap_or_else(|| CompressionMode::platform_default(self.target))
  }

  /// Where the engine leaves the compiled artifact of `bundle`.
  pub fn artifact_path(&self, bundle: &str) -> PathBuf {
    self.output_dir.join(bundle)
  }
}

/// Output of a successful engine run.
#[derive(Debug, Clone, Default)]
pub struct EngineResults {
  /// One result per compiled bundle.
  pub bundles: Vec<BundleBuildResult>,
}

/// A task reported a non-success status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFailure {
  /// Task that failed.
  pub task: BuildTask,
  /// Status it reported.
  pub code: ReturnCode,
  /// Diagnostic message.
  pub message: String,
}

impl From<EngineFailure> for BuildError {
  fn from(failure: EngineFailure) -> Self {
    BuildError::Engine {
      task: failure.task.name().to_string(),
      code: failure.code,
      message: failure.message,
    }
  }
}

/// Bundle compilation engine driven by the packed builder.
pub trait BundleEngine {
  /// Run `tasks` in order. The first failing task aborts the run.
  fn run(
    &mut self,
    tasks: &[BuildTask],
    parameters: &EngineParameters,
    bundles: &[BundleInputDefinition],
  ) -> Result<EngineResults, EngineFailure>;
}

/// Failure raised by a single stage function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageError {
  /// Status to report.
  pub code: ReturnCode,
  /// Diagnostic message.
  pub message: String,
}

impl StageError {
  /// Failure with a status and message.
  pub fn new(code: ReturnCode, message: impl Into<String>) -> Self {
    Self {
      code,
      message: message.into(),
    }
  }
}

/// Stage function operating on an engine-specific context.
pub type Stage<C> = fn(&mut C) -> Result<ReturnCode, StageError>;

/// Run the stage mapped to each task in order, stopping at the first non-success status.
pub fn run_stages<C>(
  tasks: &[BuildTask],
  context: &mut C,
  stage_for: impl Fn(BuildTask) -> Stage<C>,
) -> Result<(), EngineFailure> {
  for &task in tasks {
    let stage = stage_for(task);
    match stage(context) {
      Ok(code) if code.is_success() => {
        debug!(task = task.name(), %code, "engine task finished");
      }
      Ok(code) => {
        return Err(EngineFailure {
          task,
          code,
          message: format!("task `{task}` returned {code}"),
        });
      }
      Err(StageError { code, message }) => {
        return Err(EngineFailure {
          task,
          code,
          message,
        });
      }
    }
  }
  Ok(())
}
