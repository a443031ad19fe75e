//! Reference engine writing each bundle as a flat archive of its source files.
//!
//! Archive layout: the magic `CPAB`, a little-endian `u32` header length, a JSON header
//! listing every entry with its offset and size, then the concatenated payloads. The
//! requested compression is recorded in the header; payloads are stored as-is.

use std::collections::{BTreeMap, HashMap};
use std::fs;

use crc::{CRC_32_ISO_HDLC, Crc};
use serde::Serialize;
use tracing::{debug, info, instrument};

use super::{
  BuildTask, BundleEngine, EngineFailure, EngineParameters, EngineResults, ReturnCode, Stage,
  StageError, run_stages,
};
use crate::models::{BundleBuildResult, BundleInputDefinition, CompressionMode};
use crate::naming::short_hash;

const ARCHIVE_MAGIC: &[u8; 4] = b"CPAB";
const BUNDLE_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Engine that packs source files into uncompressed archives on disk.
#[derive(Debug, Default)]
pub struct ArchiveEngine;

impl ArchiveEngine {
  /// Create the engine.
  pub fn new() -> Self {
    Self
  }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ArchiveHeader<'a> {
  bundle: &'a str,
  compression: CompressionMode,
  entries: Vec<ArchiveEntry<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ArchiveEntry<'a> {
  asset_id: &'a str,
  offset: u64,
  size: u64,
}

struct BundleLayout {
  name: String,
  compression: CompressionMode,
  asset_ids: Vec<String>,
}

struct ArchiveContext<'a> {
  parameters: &'a EngineParameters,
  bundles: &'a [BundleInputDefinition],
  source_paths: HashMap<String, std::path::PathBuf>,
  layouts: Vec<BundleLayout>,
  payloads: HashMap<String, Vec<u8>>,
  results: Vec<BundleBuildResult>,
}

impl BundleEngine for ArchiveEngine {
  #[instrument(level = "debug", skip_all, fields(bundles = bundles.len()))]
  fn run(
    &mut self,
    tasks: &[BuildTask],
    parameters: &EngineParameters,
    bundles: &[BundleInputDefinition],
  ) -> Result<EngineResults, EngineFailure> {
    let mut context = ArchiveContext {
      parameters,
      bundles,
      source_paths: HashMap::new(),
      layouts: Vec::new(),
      payloads: HashMap::new(),
      results: Vec::new(),
    };

    run_stages(tasks, &mut context, stage_for)?;
    info!(bundles = context.results.len(), "archive engine finished");
    Ok(EngineResults {
      bundles: context.results,
    })
  }
}

fn stage_for<'a>(task: BuildTask) -> Stage<ArchiveContext<'a>> {
  match task {
    BuildTask::SwitchToBuildPlatform => switch_platform as Stage<ArchiveContext<'a>>,
    BuildTask::CalculateAssetDependencyData => calculate_dependency_data as Stage<ArchiveContext<'a>>,
    BuildTask::GenerateBundlePacking => generate_packing as Stage<ArchiveContext<'a>>,
    BuildTask::GenerateBundleMaps => check_bundle_maps as Stage<ArchiveContext<'a>>,
    BuildTask::WriteSerializedFiles => write_serialized_files as Stage<ArchiveContext<'a>>,
    BuildTask::ArchiveAndCompressBundles => archive_bundles as Stage<ArchiveContext<'a>>,
    BuildTask::StripUnusedSpriteSources
    | BuildTask::CreateBuiltInShadersBundle
    | BuildTask::UpdateBundleObjectLayout
    | BuildTask::GenerateBundleCommands
    | BuildTask::GenerateSubAssetPathMaps
    | BuildTask::GenerateLocationLists => not_run as Stage<ArchiveContext<'a>>,
  }
}

fn not_run(_context: &mut ArchiveContext<'_>) -> Result<ReturnCode, StageError> {
  Ok(ReturnCode::SuccessNotRun)
}

fn switch_platform(context: &mut ArchiveContext<'_>) -> Result<ReturnCode, StageError> {
  debug!(target_platform = %context.parameters.target, "building for platform");
  fs::create_dir_all(&context.parameters.output_dir).map_err(|err| {
    StageError::new(
      ReturnCode::Error,
      format!(
        "failed to create {}: {err}",
        context.parameters.output_dir.display()
      ),
    )
  })?;
  Ok(ReturnCode::Success)
}

fn calculate_dependency_data(context: &mut ArchiveContext<'_>) -> Result<ReturnCode, StageError> {
  for bundle in context.bundles {
    for asset in &bundle.assets {
      let source = context.parameters.content_root.join(&asset.path);
      if !source.is_file() {
        return Err(StageError::new(
          ReturnCode::MissingRequiredObjects,
          format!(
            "asset `{}` of bundle `{}` not found at {}",
            asset.asset_id,
            bundle.name,
            source.display()
          ),
        ));
      }
      context.source_paths.insert(asset.asset_id.clone(), source);
    }
  }
  Ok(ReturnCode::Success)
}

fn generate_packing(context: &mut ArchiveContext<'_>) -> Result<ReturnCode, StageError> {
  context.layouts = context
    .bundles
    .iter()
    .map(|bundle| BundleLayout {
      name: bundle.name.clone(),
      compression: context.parameters.compression_for(&bundle.name),
      asset_ids: bundle.asset_ids().map(str::to_string).collect(),
    })
    .collect();
  Ok(ReturnCode::Success)
}

fn check_bundle_maps(context: &mut ArchiveContext<'_>) -> Result<ReturnCode, StageError> {
  let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
  for layout in &context.layouts {
    for asset_id in &layout.asset_ids {
      if let Some(previous) = owners.insert(asset_id.as_str(), layout.name.as_str()) {
        return Err(StageError::new(
          ReturnCode::Error,
          format!(
            "asset `{asset_id}` is packed into both `{previous}` and `{}`",
            layout.name
          ),
        ));
      }
    }
  }
  Ok(ReturnCode::Success)
}

fn write_serialized_files(context: &mut ArchiveContext<'_>) -> Result<ReturnCode, StageError> {
  for (asset_id, source) in &context.source_paths {
    let bytes = fs::read(source).map_err(|err| {
      StageError::new(
        ReturnCode::Error,
        format!("failed to read {}: {err}", source.display()),
      )
    })?;
    context.payloads.insert(asset_id.clone(), bytes);
  }
  Ok(ReturnCode::Success)
}

fn archive_bundles(context: &mut ArchiveContext<'_>) -> Result<ReturnCode, StageError> {
  for layout in &context.layouts {
    let mut entries = Vec::with_capacity(layout.asset_ids.len());
    let mut offset = 0u64;
    for asset_id in &layout.asset_ids {
      let size = context.payloads.get(asset_id).map_or(0, |bytes| bytes.len() as u64);
      entries.push(ArchiveEntry {
        asset_id,
        offset,
        size,
      });
      offset += size;
    }

    let header = serde_json::to_vec(&ArchiveHeader {
      bundle: &layout.name,
      compression: layout.compression,
      entries,
    })
    .map_err(|err| StageError::new(ReturnCode::Exception, err.to_string()))?;

    let mut archive = Vec::with_capacity(8 + header.len() + offset as usize);
    archive.extend_from_slice(ARCHIVE_MAGIC);
    archive.extend_from_slice(&(header.len() as u32).to_le_bytes());
    archive.extend_from_slice(&header);
    for asset_id in &layout.asset_ids {
      if let Some(bytes) = context.payloads.get(asset_id) {
        archive.extend_from_slice(bytes);
      }
    }

    let destination = context.parameters.artifact_path(&layout.name);
    if let Some(parent) = destination.parent() {
      fs::create_dir_all(parent).map_err(|err| {
        StageError::new(
          ReturnCode::Error,
          format!("failed to create {}: {err}", parent.display()),
        )
      })?;
    }
    // Replace the entry instead of truncating it so earlier copies keep their bytes.
    let staging = destination.with_extension("partial");
    fs::write(&staging, &archive)
      .and_then(|()| fs::rename(&staging, &destination))
      .map_err(|err| {
        StageError::new(
          ReturnCode::Error,
          format!("failed to write {}: {err}", destination.display()),
        )
      })?;

    context.results.push(BundleBuildResult {
      name: layout.name.clone(),
      hash: short_hash(&archive),
      crc: BUNDLE_CRC.checksum(&archive),
      size: archive.len() as u64,
    });
  }
  Ok(ReturnCode::Success)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::engine::PACKED_BUILD_TASKS;
  use crate::models::{BuildTarget, BundleAsset};
  use tempfile::tempdir;

  fn asset(id: &str, path: &str) -> BundleAsset {
    BundleAsset {
      asset_id: id.into(),
      address: id.into(),
      path: path.into(),
      labels: Default::default(),
      dependencies: Vec::new(),
      is_scene: false,
    }
  }

  fn parameters(root: &std::path::Path) -> EngineParameters {
    EngineParameters {
      target: BuildTarget::Linux,
      content_root: root.join("content"),
      output_dir: root.join("out"),
      compression: BTreeMap::new(),
    }
  }

  #[test]
  fn writes_archives_with_hash_and_crc() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("content")).unwrap();
    fs::write(dir.path().join("content/a.txt"), b"alpha").unwrap();
    fs::write(dir.path().join("content/b.txt"), b"beta").unwrap();
    let params = parameters(dir.path());
    let bundles = vec![BundleInputDefinition {
      name: "g_assets_all.bundle".into(),
      group: "g".into(),
      assets: vec![asset("a", "a.txt"), asset("b", "b.txt")],
    }];

    let results = ArchiveEngine::new()
      .run(PACKED_BUILD_TASKS, &params, &bundles)
      .unwrap();
    assert_eq!(results.bundles.len(), 1);

    let result = &results.bundles[0];
    let written = fs::read(params.artifact_path("g_assets_all.bundle")).unwrap();
    assert_eq!(&written[..4], ARCHIVE_MAGIC);
    assert!(written.ends_with(b"alphabeta"));
    assert_eq!(result.size, written.len() as u64);
    assert_eq!(result.crc, BUNDLE_CRC.checksum(&written));
    assert_eq!(result.hash, short_hash(&written));

    let again = ArchiveEngine::new()
      .run(PACKED_BUILD_TASKS, &params, &bundles)
      .unwrap();
    assert_eq!(again.bundles, results.bundles);
  }

  #[test]
  fn missing_sources_fail_dependency_calculation() {
    let dir = tempdir().unwrap();
    let params = parameters(dir.path());
    let bundles = vec![BundleInputDefinition {
      name: "g_assets_all.bundle".into(),
      group: "g".into(),
      assets: vec![asset("ghost", "ghost.txt")],
    }];

    let failure = ArchiveEngine::new()
      .run(PACKED_BUILD_TASKS, &params, &bundles)
      .unwrap_err();
    assert_eq!(failure.task, BuildTask::CalculateAssetDependencyData);
    assert_eq!(failure.code, ReturnCode::MissingRequiredObjects);
    assert!(!params.artifact_path("g_assets_all.bundle").exists());
  }

  #[test]
  fn assets_packed_twice_are_rejected() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("content")).unwrap();
    fs::write(dir.path().join("content/a.txt"), b"alpha").unwrap();
    let params = parameters(dir.path());
    let bundles = vec![
      BundleInputDefinition {
        name: "one.bundle".into(),
        group: "g".into(),
        assets: vec![asset("a", "a.txt")],
      },
      BundleInputDefinition {
        name: "two.bundle".into(),
        group: "g".into(),
        assets: vec![asset("a", "a.txt")],
      },
    ];

    let failure = ArchiveEngine::new()
      .run(PACKED_BUILD_TASKS, &params, &bundles)
      .unwrap_err();
    assert_eq!(failure.task, BuildTask::GenerateBundleMaps);
    assert_eq!(failure.code, ReturnCode::Error);
  }
}
