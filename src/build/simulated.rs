//! Virtual build: fabricate bundle metadata for fast iteration without compiling anything.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use rand::RngCore;
use rand::rngs::ThreadRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::build::plan::BuildPlan;
use crate::build::writer::ArtifactWriter;
use crate::build::{BuildOutcome, run_build};
use crate::catalog::{CatalogBuilder, RequestOptions, catalog_locations};
use crate::config::PipelineConfig;
use crate::error::BuildResult;
use crate::models::{BundleBuildResult, BundleInputDefinition, LoadOrigin};
use crate::providers::ProviderIds;
use crate::selection::GroupInclusion;
use crate::settings::{RuntimeSettings, initialization_objects, write_json};

/// File stem of the virtual catalog.
pub const VIRTUAL_CATALOG_STEM: &str = "catalog_virtual";
/// Settings document of virtual builds.
pub const VIRTUAL_SETTINGS_FILE_NAME: &str = "settings_virtual.json";
/// Fabricated bundle list read by the simulated loader.
pub const VIRTUAL_BUNDLES_FILE_NAME: &str = "virtual_bundles.json";

const EMPTY_BUNDLE_DATA_SIZE: u64 = 100 * 1024;
const EMPTY_BUNDLE_HEADER_SIZE: u64 = 1024;

/// One asset inside a virtual bundle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualAssetBundleEntry {
  /// Internal id of the asset.
  pub name: String,
  /// Estimated size in bytes.
  pub size: u64,
}

/// Fabricated stand-in for a compiled bundle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualAssetBundle {
  /// Resolved bundle name.
  pub name: String,
  /// Whether the bundle ships with the player or is downloaded.
  pub origin: LoadOrigin,
  /// Random CRC.
  pub crc: u32,
  /// Freshly generated hash.
  pub hash: String,
  /// Estimated payload size.
  pub data_size: u64,
  /// Estimated header size.
  pub header_size: u64,
  /// Simulated throughput for this bundle's origin.
  pub bytes_per_second: u64,
  /// Assets in the bundle.
  pub entries: Vec<VirtualAssetBundleEntry>,
}

impl VirtualAssetBundle {
  /// Payload plus header.
  pub fn total_size(&self) -> u64 {
    self.data_size + self.header_size
  }

  /// Time the simulated loader takes to fetch the whole bundle.
  pub fn simulated_load_time(&self) -> Duration {
    if self.bytes_per_second == 0 {
      return Duration::ZERO;
    }
    Duration::from_secs_f64(self.total_size() as f64 / self.bytes_per_second as f64)
  }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VirtualBundleRuntimeData<'a> {
  local_load_speed: u64,
  remote_load_speed: u64,
  asset_bundles: &'a [VirtualAssetBundle],
}

/// Builds a catalog backed by fabricated bundles.
pub struct VirtualBuilder<'a, R = ThreadRng> {
  config: &'a PipelineConfig,
  rng: R,
}

impl<'a> VirtualBuilder<'a, ThreadRng> {
  /// Builder for `config` using the thread-local random generator.
  pub fn new(config: &'a PipelineConfig) -> Self {
    Self::with_rng(config, rand::thread_rng())
  }
}

impl<'a, R: RngCore> VirtualBuilder<'a, R> {
  /// Builder drawing CRCs from `rng`.
  pub fn with_rng(config: &'a PipelineConfig, rng: R) -> Self {
    Self { config, rng }
  }

  /// Run the simulated build for the groups accepted by `selection`.
  #[instrument(skip_all, fields(target = %self.config.build_target))]
  pub fn build(&mut self, selection: &dyn GroupInclusion) -> BuildOutcome {
    run_build("virtual", |outcome| self.try_build(selection, outcome))
  }

  fn try_build(
    &mut self,
    selection: &dyn GroupInclusion,
    outcome: &mut BuildOutcome,
  ) -> BuildResult<()> {
    let config = self.config;
    let mut plan = BuildPlan::new(config, selection, ProviderIds::VIRTUAL)?;

    let mut bundles = Vec::with_capacity(plan.bundles.len());
    for definition in &plan.bundles {
      let origin = plan
        .bundle_groups
        .get(&definition.name)
        .map_or(LoadOrigin::Local, |group| group.load_path.origin());
      bundles.push(self.simulate_bundle(definition, origin));
    }
    for bundle in bundles.iter().filter(|bundle| bundle.origin == LoadOrigin::Remote) {
      attach_request_options(&mut plan, bundle);
    }

    let writer = ArtifactWriter::new(config.resolve(&config.runtime_data_dir));
    write_json(
      &writer.runtime_dir().join(VIRTUAL_BUNDLES_FILE_NAME),
      &VirtualBundleRuntimeData {
        local_load_speed: config.virtual_mode.local_load_speed,
        remote_load_speed: config.virtual_mode.remote_load_speed,
        asset_bundles: &bundles,
      },
      "virtual bundles",
    )?;

    let local_base = writer.runtime_dir().to_string_lossy().replace('\\', "/");
    let catalog_locations = catalog_locations(&local_base, VIRTUAL_CATALOG_STEM, None);
    let initialization = initialization_objects(config);
    let mut catalog = CatalogBuilder::new(&config.provider_cache, plan.layout_hash());
    catalog.extend(std::mem::take(&mut plan.locations));
    let catalog = catalog.build(&catalog_locations, &initialization)?;

    let written = writer.write_catalog(VIRTUAL_CATALOG_STEM, &catalog)?;
    let settings = RuntimeSettings::new(
      config,
      &catalog.fingerprint,
      catalog_locations,
      initialization,
    );
    let settings_path = writer.write_settings(VIRTUAL_SETTINGS_FILE_NAME, &settings)?;

    outcome.location_count = catalog.data.entries.len();
    outcome.catalog_path = Some(written.json);
    outcome.runtime_settings_path = Some(settings_path.to_string_lossy().replace('\\', "/"));
    outcome.settings_path = Some(settings_path);
    outcome.bundles = bundles
      .into_iter()
      .map(|bundle| BundleBuildResult {
        size: bundle.total_size(),
        name: bundle.name,
        hash: bundle.hash,
        crc: bundle.crc,
      })
      .collect();
    Ok(())
  }

  /// Fabricate the metadata of one bundle.
  ///
  /// The payload is the sum of the assets' compiled artifact sizes and the header grows
  /// with the length of every asset id. A bundle without assets gets fixed sizes.
  pub fn simulate_bundle(
    &mut self,
    definition: &BundleInputDefinition,
    origin: LoadOrigin,
  ) -> VirtualAssetBundle {
    let model = &self.config.virtual_mode;
    let entries: Vec<_> = definition
      .assets
      .iter()
      .map(|asset| VirtualAssetBundleEntry {
        name: asset.path.clone(),
        size: self.artifact_size(&asset.asset_id),
      })
      .collect();

    let (data_size, header_size) = if entries.is_empty() {
      (EMPTY_BUNDLE_DATA_SIZE, EMPTY_BUNDLE_HEADER_SIZE)
    } else {
      let id_bytes: u64 = definition.asset_ids().map(|id| id.len() as u64).sum();
      (
        entries.iter().map(|entry| entry.size).sum(),
        model.header_size_multiplier * id_bytes,
      )
    };
    let bytes_per_second = match origin {
      LoadOrigin::Local => model.local_load_speed,
      LoadOrigin::Remote => model.remote_load_speed,
    };

    let bundle = VirtualAssetBundle {
      name: definition.name.clone(),
      origin,
      crc: self.rng.next_u32(),
      hash: Uuid::new_v4().simple().to_string(),
      data_size,
      header_size,
      bytes_per_second,
      entries,
    };
    debug!(
      bundle = %bundle.name,
      data_size,
      header_size,
      "simulated bundle"
    );
    bundle
  }

  /// Size of the compiled artifact of `asset_id`, or the configured fallback.
  fn artifact_size(&self, asset_id: &str) -> u64 {
    let prefix = asset_id.get(..2).unwrap_or(asset_id);
    let path: PathBuf = self
      .config
      .resolve(&self.config.artifacts_dir)
      .join(prefix)
      .join(asset_id);
    fs::metadata(&path)
      .ok()
      .filter(|metadata| metadata.is_file())
      .map_or(self.config.virtual_mode.missing_artifact_size, |metadata| {
        metadata.len()
      })
  }
}

/// Request options of a remote virtual bundle. The random hash and CRC stay out of the
/// catalog so that it remains deterministic.
fn attach_request_options(plan: &mut BuildPlan<'_>, bundle: &VirtualAssetBundle) {
  let Some(group) = plan.bundle_groups.get(&bundle.name).copied() else {
    return;
  };
  let Some(location) = plan.bundle_location_mut(&bundle.name) else {
    return;
  };
  let sized = BundleBuildResult {
    name: bundle.name.clone(),
    hash: String::new(),
    crc: 0,
    size: bundle.total_size(),
  };
  location.data = Some(RequestOptions::from_schema(&group.request_options, &sized));
}

#[cfg(test)]
mod tests {
  use std::path::Path;

  use rand::SeedableRng;
  use rand::rngs::StdRng;
  use tempfile::tempdir;

  use super::*;
  use crate::catalog::ContentCatalogData;
  use crate::config::DEFAULT_MISSING_ARTIFACT_SIZE;
  use crate::models::{AssetEntry, AssetGroup, BundleAsset, LoadPath, PackingMode};
  use crate::providers::{VIRTUAL_ASSET_BUNDLE_PROVIDER, VIRTUAL_BUNDLED_ASSET_PROVIDER};
  use crate::selection::AllGroups;

  fn asset(id: &str) -> BundleAsset {
    BundleAsset {
      asset_id: id.into(),
      address: id.into(),
      path: format!("{id}.prefab"),
      labels: Default::default(),
      dependencies: Vec::new(),
      is_scene: false,
    }
  }

  fn definition(assets: Vec<BundleAsset>) -> BundleInputDefinition {
    BundleInputDefinition {
      name: "g_assets_all.bundle".into(),
      group: "g".into(),
      assets,
    }
  }

  fn config(root: &Path) -> PipelineConfig {
    let mut characters = AssetGroup::new("Characters");
    characters.packing = PackingMode::PackSeparately;
    characters.load_path = LoadPath::Remote {
      url: "https://cdn.example.com".into(),
    };
    characters.entries = vec![
      AssetEntry {
        address: "hero".into(),
        asset_id: "a1b2".into(),
        path: "characters/hero.prefab".into(),
        labels: Default::default(),
        dependencies: Vec::new(),
      },
      AssetEntry {
        address: "villain".into(),
        asset_id: "c3d4".into(),
        path: "characters/villain.prefab".into(),
        labels: Default::default(),
        dependencies: Vec::new(),
      },
    ];
    PipelineConfig {
      root: root.to_path_buf(),
      groups: vec![characters],
      ..PipelineConfig::default()
    }
  }

  #[test]
  fn empty_bundles_get_fixed_sizes() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let mut builder = VirtualBuilder::with_rng(&config, StdRng::seed_from_u64(7));
    let bundle = builder.simulate_bundle(&definition(Vec::new()), LoadOrigin::Local);
    assert_eq!(bundle.data_size, 102_400);
    assert_eq!(bundle.header_size, 1024);
    assert_eq!(bundle.bytes_per_second, config.virtual_mode.local_load_speed);
  }

  #[test]
  fn sizes_come_from_artifacts_with_fallback() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let artifact = dir.path().join("library/artifacts/ab/abcdef");
    fs::create_dir_all(artifact.parent().unwrap()).unwrap();
    fs::write(&artifact, vec![0u8; 300]).unwrap();

    let mut builder = VirtualBuilder::with_rng(&config, StdRng::seed_from_u64(7));
    let bundle = builder.simulate_bundle(
      &definition(vec![asset("abcdef"), asset("zz9")]),
      LoadOrigin::Remote,
    );
    assert_eq!(bundle.data_size, 300 + DEFAULT_MISSING_ARTIFACT_SIZE);
    assert_eq!(bundle.header_size, 5 * 9);
    assert_eq!(bundle.entries[0].size, 300);
    assert_eq!(bundle.bytes_per_second, config.virtual_mode.remote_load_speed);
    assert_eq!(bundle.hash.len(), 32);
    assert!(bundle.simulated_load_time() > Duration::ZERO);
  }

  #[test]
  fn writes_virtual_catalog_without_copying_bundles() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let outcome = VirtualBuilder::with_rng(&config, StdRng::seed_from_u64(1)).build(&AllGroups);
    assert!(outcome.is_success(), "{}", outcome.error);
    assert_eq!(outcome.bundles.len(), 2);

    let runtime = dir.path().join("library/content/StandaloneWindows64");
    assert!(runtime.join(VIRTUAL_BUNDLES_FILE_NAME).is_file());
    assert!(runtime.join("catalog_virtual.hash").is_file());
    assert!(runtime.join(VIRTUAL_SETTINGS_FILE_NAME).is_file());
    assert!(outcome.content_state_path.is_none());
    assert!(!dir.path().join("server_data").exists());
    assert!(
      outcome
        .runtime_settings_path
        .unwrap()
        .ends_with("settings_virtual.json")
    );

    let catalog = ContentCatalogData::from_json(
      &fs::read_to_string(outcome.catalog_path.unwrap()).unwrap(),
    )
    .unwrap();
    let providers: Vec<_> = catalog
      .resource_provider_data
      .iter()
      .map(|record| record.id.as_str())
      .collect();
    assert!(providers.contains(&VIRTUAL_ASSET_BUNDLE_PROVIDER));
    assert!(providers.contains(&VIRTUAL_BUNDLED_ASSET_PROVIDER));
    let hero = catalog
      .entries
      .iter()
      .find(|location| location.primary_key() == "characters_assets_hero.bundle")
      .unwrap();
    assert_eq!(
      hero.internal_id,
      "https://cdn.example.com/characters_assets_hero.bundle"
    );
    let options = hero.data.as_ref().unwrap();
    assert_eq!(options.bundle_name, "characters_assets_hero.bundle");
    assert_eq!(options.bundle_size, DEFAULT_MISSING_ARTIFACT_SIZE + 5 * 4);
    assert_eq!(options.redirect_limit, -1);
    assert!(options.hash.is_empty());
    assert_eq!(options.crc, 0);
  }

  #[test]
  fn local_virtual_bundles_carry_no_request_options() {
    let dir = tempdir().unwrap();
    let mut config = config(dir.path());
    config.groups[0].load_path = LoadPath::default();
    let outcome = VirtualBuilder::with_rng(&config, StdRng::seed_from_u64(3)).build(&AllGroups);
    assert!(outcome.is_success(), "{}", outcome.error);

    let catalog = ContentCatalogData::from_json(
      &fs::read_to_string(outcome.catalog_path.unwrap()).unwrap(),
    )
    .unwrap();
    assert!(catalog.entries.iter().all(|location| location.data.is_none()));
  }

  #[test]
  fn catalog_is_deterministic_despite_random_metadata() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let hash_path = dir
      .path()
      .join("library/content/StandaloneWindows64/catalog_virtual.hash");

    let first = VirtualBuilder::with_rng(&config, StdRng::seed_from_u64(1)).build(&AllGroups);
    assert!(first.is_success());
    let first_hash = fs::read_to_string(&hash_path).unwrap();
    let second = VirtualBuilder::new(&config).build(&AllGroups);
    assert!(second.is_success());
    assert_eq!(fs::read_to_string(&hash_path).unwrap(), first_hash);
    assert_ne!(first.bundles[0].hash, second.bundles[0].hash);
  }
}
