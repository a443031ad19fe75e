//! Pipeline configuration loaded from a declarative YAML or JSON file.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::asset_paths::{DEFAULT_SCENE_EXTENSIONS, expand_profile_variables};
use crate::error::BuildError;
use crate::models::{AssetGroup, BuildTarget, LoadOrigin};

/// File names searched for by [`PipelineConfig::discover`], in order.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["content.config.yaml", "content.config.yml", "content.config.json"];

/// Header bytes estimated per character of every asset id in virtual builds.
pub const DEFAULT_HEADER_SIZE_MULTIPLIER: u64 = 5;

/// Size assumed for an asset whose compiled artifact cannot be found.
pub const DEFAULT_MISSING_ARTIFACT_SIZE: u64 = 1024 * 1024;

/// Errors that can occur while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
  /// Failed to read the configuration from disk.
  #[error("failed to read {}: {source}", path.display())]
  Io {
    /// Path that caused the error.
    path: PathBuf,
    /// Source I/O error.
    #[source]
    source: std::io::Error,
  },
  /// Failed to parse a YAML configuration.
  #[error("failed to parse {}: {source}", path.display())]
  Yaml {
    /// Path that caused the error.
    path: PathBuf,
    /// Source parse error.
    #[source]
    source: serde_yaml::Error,
  },
  /// Failed to parse a JSON configuration.
  #[error("failed to parse {}: {source}", path.display())]
  Json {
    /// Path that caused the error.
    path: PathBuf,
    /// Source parse error.
    #[source]
    source: serde_json::Error,
  },
}

/// Location of the remotely hosted copy of the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RemoteCatalogConfig {
  /// Directory the remote catalog copy is written to.
  pub build_path: String,
  /// URL prefix the runtime downloads the remote catalog hash from.
  pub load_path: String,
}

/// Throughput and sizing model used by virtual builds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct VirtualModeConfig {
  /// Simulated bytes per second for bundles shipped with the player.
  pub local_load_speed: u64,
  /// Simulated bytes per second for downloaded bundles.
  pub remote_load_speed: u64,
  /// Header bytes estimated per character of every asset id in a bundle.
  pub header_size_multiplier: u64,
  /// Size assumed for assets without a compiled artifact.
  pub missing_artifact_size: u64,
}

impl Default for VirtualModeConfig {
  fn default() -> Self {
    Self {
      local_load_speed: 1024 * 1024 * 10,
      remote_load_speed: 1024 * 1024,
      header_size_multiplier: DEFAULT_HEADER_SIZE_MULTIPLIER,
      missing_artifact_size: DEFAULT_MISSING_ARTIFACT_SIZE,
    }
  }
}

/// Bounds of the cache provider wrapping bundle and asset providers.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderCacheConfig {
  /// Maximum number of released results kept alive.
  pub max_lru_count: u32,
  /// Seconds a released result stays cached.
  pub max_lru_age: f32,
}

impl Default for ProviderCacheConfig {
  fn default() -> Self {
    Self {
      max_lru_count: 10,
      max_lru_age: 30.0,
    }
  }
}

/// Settings for the runtime download cache, emitted as an initialization object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheInitializationConfig {
  /// Compress downloaded bundles when caching them.
  pub compression_enabled: bool,
  /// Override for the cache directory.
  pub cache_directory: Option<String>,
  /// Enforce `maximum_cache_size`.
  pub limit_cache_size: bool,
  /// Maximum cache size in bytes.
  pub maximum_cache_size: u64,
}

impl Default for CacheInitializationConfig {
  fn default() -> Self {
    Self {
      compression_enabled: true,
      cache_directory: None,
      limit_cache_size: false,
      maximum_cache_size: u64::from(u32::MAX),
    }
  }
}

/// Immutable description of a content build.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
  /// Platform the content is built for.
  pub build_target: BuildTarget,
  /// Version embedded in catalog file names.
  pub catalog_version: String,
  /// Directory authored asset paths are relative to.
  pub content_root: String,
  /// Directory receiving catalog, settings and link files.
  pub runtime_data_dir: String,
  /// Default build path for groups with a local load path.
  pub local_build_path: String,
  /// Default build path for groups with a remote load path.
  pub remote_build_path: String,
  /// Scratch directory the bundle engine writes into.
  pub engine_output_dir: String,
  /// Directory holding compiled artifacts, one file per asset id.
  pub artifacts_dir: String,
  /// Directory receiving the content state file of packed builds.
  pub content_state_dir: String,
  /// Remotely hosted catalog copy, if any.
  pub remote_catalog: Option<RemoteCatalogConfig>,
  /// Emit profiler events at runtime.
  pub profile_events: bool,
  /// Log exceptions raised by the runtime loader.
  pub log_resource_manager_exceptions: bool,
  /// Upper bound on simultaneous downloads at runtime.
  pub max_concurrent_web_requests: u32,
  /// Virtual build model.
  pub virtual_mode: VirtualModeConfig,
  /// Cache provider bounds.
  pub provider_cache: ProviderCacheConfig,
  /// Extensions classified as scenes.
  pub scene_extensions: Vec<String>,
  /// Download cache initialization, if any.
  pub cache_initialization: Option<CacheInitializationConfig>,
  /// Authored asset groups.
  pub groups: Vec<AssetGroup>,
  /// Directory relative paths are resolved against. Set when loading from a file.
  #[serde(skip)]
  pub root: PathBuf,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      build_target: BuildTarget::default(),
      catalog_version: "0.1.0".into(),
      content_root: ".".into(),
      runtime_data_dir: "library/content/[BuildTarget]".into(),
      local_build_path: "library/content/[BuildTarget]".into(),
      remote_build_path: "server_data/[BuildTarget]".into(),
      engine_output_dir: "library/bundle_cache/[BuildTarget]".into(),
      artifacts_dir: "library/artifacts".into(),
      content_state_dir: "content_state/[BuildTarget]".into(),
      remote_catalog: None,
      profile_events: false,
      log_resource_manager_exceptions: true,
      max_concurrent_web_requests: 500,
      virtual_mode: VirtualModeConfig::default(),
      provider_cache: ProviderCacheConfig::default(),
      scene_extensions: DEFAULT_SCENE_EXTENSIONS
        .iter()
        .map(|extension| extension.to_string())
        .collect(),
      cache_initialization: None,
      groups: Vec::new(),
      root: PathBuf::from("."),
    }
  }
}

impl PipelineConfig {
  /// Look for a configuration file in the provided directory.
  ///
  /// A directory without any configuration file yields the defaults rooted at `dir`; a file
  /// that exists but fails to parse is reported.
  pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
    for name in DEFAULT_CONFIG_FILES {
      let candidate = dir.join(name);
      if candidate.exists() {
        return Self::from_path(&candidate);
      }
    }
    Ok(Self {
      root: dir.to_path_buf(),
      ..Self::default()
    })
  }

  /// Read configuration from a specific YAML or JSON file.
  pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;

    let is_json = path
      .extension()
      .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));
    let mut config: Self = if is_json {
      serde_json::from_str(&content).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
      })?
    } else {
      serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
      })?
    };

    config.root = path
      .parent()
      .filter(|parent| !parent.as_os_str().is_empty())
      .map(Path::to_path_buf)
      .unwrap_or_else(|| PathBuf::from("."));
    Ok(config)
  }

  /// Resolve a configured path against the config root, expanding profile variables.
  pub fn resolve(&self, value: &str) -> PathBuf {
    self
      .root
      .join(expand_profile_variables(value, self.build_target))
  }

  /// Absolute content root.
  pub fn content_root_path(&self) -> PathBuf {
    self.resolve(&self.content_root)
  }

  /// Output directory of a group's bundles.
  pub fn group_build_path(&self, group: &AssetGroup) -> PathBuf {
    match (&group.build_path, group.load_path.origin()) {
      (Some(path), _) => self.resolve(path),
      (None, LoadOrigin::Local) => self.resolve(&self.local_build_path),
      (None, LoadOrigin::Remote) => self.resolve(&self.remote_build_path),
    }
  }

  /// Check the configuration before any build step runs.
  pub fn validate(&self) -> Result<(), BuildError> {
    if self.catalog_version.trim().is_empty() {
      return Err(BuildError::Precondition(
        "catalog version must not be empty".into(),
      ));
    }
    if self.catalog_version.contains(['/', '\\']) {
      return Err(BuildError::Precondition(format!(
        "catalog version `{}` must not contain path separators",
        self.catalog_version
      )));
    }

    let mut group_names = BTreeSet::new();
    let mut asset_ids = BTreeSet::new();
    for group in &self.groups {
      if group.name.trim().is_empty() {
        return Err(BuildError::Precondition("group name must not be empty".into()));
      }
      if !group_names.insert(group.name.to_lowercase()) {
        return Err(BuildError::Precondition(format!(
          "group `{}` is defined more than once",
          group.name
        )));
      }

      let mut addresses = BTreeSet::new();
      for entry in &group.entries {
        if entry.address.is_empty() || entry.asset_id.is_empty() {
          return Err(BuildError::Precondition(format!(
            "group `{}` has an entry without address or asset id",
            group.name
          )));
        }
        if !addresses.insert(entry.address.as_str()) {
          return Err(BuildError::Precondition(format!(
            "address `{}` appears more than once in group `{}`",
            entry.address, group.name
          )));
        }
        if !asset_ids.insert(entry.asset_id.as_str()) {
          return Err(BuildError::Precondition(format!(
            "asset `{}` is assigned to more than one entry",
            entry.asset_id
          )));
        }
      }
    }
    Ok(())
  }
}
