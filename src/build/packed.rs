//! Packed build: compile bundles through an engine and install the results.

use std::path::PathBuf;

use tracing::{debug, instrument, warn};

use crate::asset_paths::{expand_profile_variables, join_internal_id};
use crate::build::content_state::{CONTENT_STATE_FILE, ContentState};
use crate::build::plan::BuildPlan;
use crate::build::writer::{ArtifactWriter, install_artifact};
use crate::build::{BuildOutcome, run_build};
use crate::catalog::{CatalogBuilder, RequestOptions, runtime_catalog_locations};
use crate::config::PipelineConfig;
use crate::engine::{BundleEngine, EngineParameters, PACKED_BUILD_TASKS};
use crate::error::BuildResult;
use crate::models::{BundleBuildResult, LoadOrigin, RUNTIME_PATH_PLACEHOLDER};
use crate::naming::{final_file_name, short_hash};
use crate::providers::ProviderIds;
use crate::selection::GroupInclusion;
use crate::settings::{RuntimeSettings, initialization_objects, write_json};

/// Settings document written next to the catalog.
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Builds content by running the declared task list on a [`BundleEngine`].
pub struct PackedBuilder<'a, E> {
  config: &'a PipelineConfig,
  engine: E,
}

impl<'a, E: BundleEngine> PackedBuilder<'a, E> {
  /// Builder for `config` compiling through `engine`.
  pub fn new(config: &'a PipelineConfig, engine: E) -> Self {
    Self { config, engine }
  }

  /// Run the build for the groups accepted by `selection`.
  #[instrument(skip_all, fields(target = %self.config.build_target))]
  pub fn build(&mut self, selection: &dyn GroupInclusion) -> BuildOutcome {
    run_build("packed", |outcome| self.try_build(selection, outcome))
  }

  fn try_build(
    &mut self,
    selection: &dyn GroupInclusion,
    outcome: &mut BuildOutcome,
  ) -> BuildResult<()> {
    let config = self.config;
    let target = config.build_target;
    let mut plan = BuildPlan::new(config, selection, ProviderIds::PACKED)?;

    let parameters = EngineParameters {
      target,
      content_root: plan.content_root.clone(),
      output_dir: config.resolve(&config.engine_output_dir),
      compression: plan.compression(),
    };
    let results = self
      .engine
      .run(PACKED_BUILD_TASKS, &parameters, &plan.bundles)?;
    let installs: Vec<_> = results
      .bundles
      .iter()
      .map(|result| place_bundle(&mut plan, result))
      .collect();

    let stem = format!("catalog_{}", config.catalog_version);
    let remote_url = config
      .remote_catalog
      .as_ref()
      .map(|remote| expand_profile_variables(&remote.load_path, target));
    let catalog_locations = runtime_catalog_locations(&stem, remote_url.as_deref());
    let initialization = initialization_objects(config);

    let mut catalog = CatalogBuilder::new(&config.provider_cache, results_hash(&results.bundles));
    catalog.extend(std::mem::take(&mut plan.locations));
    let catalog = catalog.build(&catalog_locations, &initialization)?;

    for (result, destination) in results.bundles.iter().zip(&installs) {
      debug!(bundle = %result.name, destination = %destination.display(), "installing bundle");
      install_artifact(&parameters.artifact_path(&result.name), destination)?;
    }

    let writer = ArtifactWriter::new(config.resolve(&config.runtime_data_dir));
    let written = writer.write_catalog(&stem, &catalog)?;
    if let Some(remote) = &config.remote_catalog {
      writer.publish_catalog(&written, &config.resolve(&remote.build_path))?;
    }
    let settings = RuntimeSettings::new(
      config,
      &catalog.fingerprint,
      catalog_locations,
      initialization,
    );
    let settings_path = writer.write_settings(SETTINGS_FILE_NAME, &settings)?;
    writer.write_link(&catalog.retained_types)?;

    let state = ContentState::capture(
      &config.catalog_version,
      target,
      &catalog.fingerprint,
      &plan.content_root,
      &plan.bundles,
    )?;
    let state_path = config
      .resolve(&config.content_state_dir)
      .join(CONTENT_STATE_FILE);
    write_json(&state_path, &state, "content state")?;

    outcome.location_count = catalog.data.entries.len();
    outcome.catalog_path = Some(written.json);
    outcome.settings_path = Some(settings_path);
    outcome.runtime_settings_path = Some(format!(
      "{RUNTIME_PATH_PLACEHOLDER}/{SETTINGS_FILE_NAME}"
    ));
    outcome.content_state_path = Some(state_path);
    outcome.bundles = results.bundles;
    Ok(())
  }
}

/// Attach request options and hashed names to remote bundles and pick the install
/// destination in the group build path.
fn place_bundle(plan: &mut BuildPlan<'_>, result: &BundleBuildResult) -> PathBuf {
  let config = plan.config;
  let group = plan.bundle_groups.get(&result.name).copied();
  let mut file_name = result.name.clone();

  match (group, plan.bundle_location_mut(&result.name)) {
    (Some(group), Some(location)) if group.load_path.origin() == LoadOrigin::Remote => {
      file_name = final_file_name(&result.name, &result.hash, group.bundle_naming);
      location.internal_id =
        join_internal_id(&group.load_path.base(config.build_target), &file_name);
      location.data = Some(RequestOptions::from_schema(&group.request_options, result));
    }
    (Some(_), Some(_)) => {}
    _ => {
      warn!(bundle = %result.name, "no location planned for bundle, installing as local");
    }
  }

  let build_dir = match group {
    Some(group) => config.group_build_path(group),
    None => config.resolve(&config.local_build_path),
  };
  build_dir.join(file_name)
}

/// Hash over the name and content hash of every compiled bundle.
fn results_hash(results: &[BundleBuildResult]) -> String {
  let mut lines: Vec<String> = results
    .iter()
    .map(|result| format!("{}:{}", result.name, result.hash))
    .collect();
  lines.sort();
  short_hash(lines.join("\n").as_bytes())
}

#[cfg(test)]
mod tests {
  use std::fs;
  use std::path::Path;

  use tempfile::tempdir;

  use super::*;
  use crate::catalog::{ContentCatalogData, Location, fingerprint};
  use crate::config::RemoteCatalogConfig;
  use crate::engine::{
    ArchiveEngine, BuildTask, EngineFailure, EngineResults, ReturnCode,
  };
  use crate::models::{AssetEntry, AssetGroup, BundleInputDefinition, LoadPath, PackingMode};
  use crate::selection::AllGroups;

  fn entry(address: &str, path: &str) -> AssetEntry {
    AssetEntry {
      address: address.into(),
      asset_id: format!("id-{address}"),
      path: path.into(),
      labels: Default::default(),
      dependencies: Vec::new(),
    }
  }

  fn project(root: &Path) -> PipelineConfig {
    let content = root.join("content");
    fs::create_dir_all(content.join("characters")).unwrap();
    fs::create_dir_all(content.join("ui")).unwrap();
    fs::write(content.join("characters/hero.prefab"), b"hero").unwrap();
    fs::write(content.join("characters/villain.prefab"), b"villain").unwrap();
    fs::write(content.join("ui/menu.prefab"), b"menu").unwrap();

    let mut characters = AssetGroup::new("Characters");
    characters.packing = PackingMode::PackSeparately;
    characters.load_path = LoadPath::Remote {
      url: "https://cdn.example.com/[BuildTarget]".into(),
    };
    characters.entries = vec![
      entry("hero", "characters/hero.prefab"),
      entry("villain", "characters/villain.prefab"),
    ];
    let mut ui = AssetGroup::new("UI");
    ui.entries = vec![entry("menu", "ui/menu.prefab")];

    PipelineConfig {
      root: root.to_path_buf(),
      content_root: "content".into(),
      catalog_version: "1.0".into(),
      groups: vec![characters, ui],
      ..PipelineConfig::default()
    }
  }

  fn catalog_entry<'c>(catalog: &'c ContentCatalogData, key: &str) -> &'c Location {
    catalog
      .entries
      .iter()
      .find(|location| location.primary_key() == key)
      .unwrap()
  }

  #[test]
  fn builds_catalog_and_installs_bundles() {
    let dir = tempdir().unwrap();
    let config = project(dir.path());
    let outcome = PackedBuilder::new(&config, ArchiveEngine::new()).build(&AllGroups);
    assert!(outcome.is_success(), "{}", outcome.error);
    assert_eq!(
      outcome.runtime_settings_path.as_deref(),
      Some("{RuntimePath}/settings.json")
    );

    let catalog_path = outcome.catalog_path.clone().unwrap();
    assert_eq!(
      catalog_path,
      dir.path().join("library/content/StandaloneWindows64/catalog_1.0.json")
    );
    let json = fs::read_to_string(&catalog_path).unwrap();
    let catalog = ContentCatalogData::from_json(&json).unwrap();
    assert_eq!(catalog.entries.len(), outcome.location_count);
    assert_eq!(
      fs::read_to_string(catalog_path.with_extension("hash")).unwrap(),
      fingerprint(&json)
    );

    let hero = outcome
      .bundles
      .iter()
      .find(|bundle| bundle.name == "characters_assets_hero.bundle")
      .unwrap();
    let remote = catalog_entry(&catalog, "characters_assets_hero.bundle");
    let hashed = format!("characters_assets_hero_{}.bundle", hero.hash);
    assert_eq!(
      remote.internal_id,
      format!("https://cdn.example.com/StandaloneWindows64/{hashed}")
    );
    let options = remote.data.as_ref().unwrap();
    assert_eq!(options.crc, hero.crc);
    assert_eq!(options.bundle_size, hero.size);
    assert!(
      dir
        .path()
        .join("server_data/StandaloneWindows64")
        .join(&hashed)
        .is_file()
    );

    let local = catalog_entry(&catalog, "ui_assets_all.bundle");
    assert_eq!(
      local.internal_id,
      "{RuntimePath}/StandaloneWindows64/ui_assets_all.bundle"
    );
    assert!(local.data.is_none());
    assert!(
      dir
        .path()
        .join("library/content/StandaloneWindows64/ui_assets_all.bundle")
        .is_file()
    );

    let runtime = dir.path().join("library/content/StandaloneWindows64");
    assert!(runtime.join("settings.json").is_file());
    assert!(runtime.join("link.json").is_file());
    assert!(outcome.content_state_path.unwrap().is_file());
  }

  #[test]
  fn identical_inputs_produce_identical_fingerprints() {
    let dir = tempdir().unwrap();
    let config = project(dir.path());
    let first = PackedBuilder::new(&config, ArchiveEngine::new()).build(&AllGroups);
    let first_hash = fs::read_to_string(first.catalog_path.unwrap().with_extension("hash")).unwrap();
    let second = PackedBuilder::new(&config, ArchiveEngine::new()).build(&AllGroups);
    let second_hash =
      fs::read_to_string(second.catalog_path.unwrap().with_extension("hash")).unwrap();
    assert_eq!(first_hash, second_hash);
  }

  fn hero_bundle_file(dir: &Path, outcome: &BuildOutcome) -> std::path::PathBuf {
    let hero = outcome
      .bundles
      .iter()
      .find(|bundle| bundle.name == "characters_assets_hero.bundle")
      .unwrap();
    dir
      .join("server_data/StandaloneWindows64")
      .join(format!("characters_assets_hero_{}.bundle", hero.hash))
  }

  #[test]
  fn rebuilding_keeps_previously_published_bundles_intact() {
    let dir = tempdir().unwrap();
    let config = project(dir.path());
    let first = PackedBuilder::new(&config, ArchiveEngine::new()).build(&AllGroups);
    assert!(first.is_success(), "{}", first.error);
    let published = hero_bundle_file(dir.path(), &first);
    let published_bytes = fs::read(&published).unwrap();

    fs::write(dir.path().join("content/characters/hero.prefab"), b"hero v2").unwrap();
    let second = PackedBuilder::new(&config, ArchiveEngine::new()).build(&AllGroups);
    assert!(second.is_success(), "{}", second.error);

    let republished = hero_bundle_file(dir.path(), &second);
    assert_ne!(published, republished);
    assert_eq!(fs::read(&published).unwrap(), published_bytes);
    let name = published.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.contains(&short_hash(&published_bytes)));
  }

  #[test]
  fn remote_catalog_is_published() {
    let dir = tempdir().unwrap();
    let mut config = project(dir.path());
    config.remote_catalog = Some(RemoteCatalogConfig {
      build_path: "server_data/catalog".into(),
      load_path: "https://cdn.example.com/catalog".into(),
    });
    let outcome = PackedBuilder::new(&config, ArchiveEngine::new()).build(&AllGroups);
    assert!(outcome.is_success(), "{}", outcome.error);
    assert!(dir.path().join("server_data/catalog/catalog_1.0.json").is_file());
    assert!(dir.path().join("server_data/catalog/catalog_1.0.hash").is_file());

    let settings: RuntimeSettings =
      serde_json::from_str(&fs::read_to_string(outcome.settings_path.unwrap()).unwrap()).unwrap();
    assert_eq!(settings.catalog_locations.len(), 3);
    assert_eq!(
      settings.catalog_locations[1].internal_id,
      "https://cdn.example.com/catalog/catalog_1.0.hash"
    );
  }

  struct FailingEngine;

  impl BundleEngine for FailingEngine {
    fn run(
      &mut self,
      _tasks: &[BuildTask],
      _parameters: &EngineParameters,
      _bundles: &[BundleInputDefinition],
    ) -> Result<EngineResults, EngineFailure> {
      Err(EngineFailure {
        task: BuildTask::CalculateAssetDependencyData,
        code: ReturnCode::MissingRequiredObjects,
        message: "source asset missing".into(),
      })
    }
  }

  #[test]
  fn engine_failures_are_reported_without_catalog() {
    let dir = tempdir().unwrap();
    let config = project(dir.path());
    let outcome = PackedBuilder::new(&config, FailingEngine).build(&AllGroups);
    assert!(!outcome.is_success());
    assert!(outcome.error.contains("-5"));
    assert_eq!(outcome.location_count, 0);
    assert!(outcome.catalog_path.is_none());
    assert!(
      !dir
        .path()
        .join("library/content/StandaloneWindows64/catalog_1.0.json")
        .exists()
    );
  }

  /// Writes a placeholder artifact per bundle plus one bundle nobody asked for.
  struct OrphanEngine;

  impl BundleEngine for OrphanEngine {
    fn run(
      &mut self,
      _tasks: &[BuildTask],
      parameters: &EngineParameters,
      bundles: &[BundleInputDefinition],
    ) -> Result<EngineResults, EngineFailure> {
      fs::create_dir_all(&parameters.output_dir).unwrap();
      let names = bundles
        .iter()
        .map(|bundle| bundle.name.clone())
        .chain(std::iter::once("orphan.bundle".to_string()));
      let mut results = EngineResults::default();
      for name in names {
        fs::write(parameters.artifact_path(&name), name.as_bytes()).unwrap();
        results.bundles.push(BundleBuildResult {
          hash: short_hash(name.as_bytes()),
          crc: 1,
          size: name.len() as u64,
          name,
        });
      }
      Ok(results)
    }
  }

  #[test]
  fn bundles_without_location_are_installed_as_local() {
    let dir = tempdir().unwrap();
    let config = project(dir.path());
    let outcome = PackedBuilder::new(&config, OrphanEngine).build(&AllGroups);
    assert!(outcome.is_success(), "{}", outcome.error);
    assert!(
      dir
        .path()
        .join("library/content/StandaloneWindows64/orphan.bundle")
        .is_file()
    );
  }

  #[test]
  fn catalog_validation_failures_install_nothing() {
    let dir = tempdir().unwrap();
    let mut config = project(dir.path());
    // An address equal to its own bundle key makes the asset depend on itself.
    config.groups[1].entries[0].address = "ui_assets_all.bundle".into();

    let outcome = PackedBuilder::new(&config, ArchiveEngine::new()).build(&AllGroups);
    assert!(!outcome.is_success());
    assert!(outcome.error.contains("cycle"), "{}", outcome.error);
    let runtime = dir.path().join("library/content/StandaloneWindows64");
    assert!(!runtime.join("ui_assets_all.bundle").exists());
    assert!(!dir.path().join("server_data").exists());
  }

  #[test]
  fn invalid_configuration_fails_before_the_engine_runs() {
    let dir = tempdir().unwrap();
    let mut config = project(dir.path());
    config.catalog_version = String::new();
    let outcome = PackedBuilder::new(&config, FailingEngine).build(&AllGroups);
    assert!(outcome.error.contains("catalog version"));
  }
}
