//! Runtime settings document and companion files.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::catalog::Location;
use crate::config::PipelineConfig;
use crate::error::{BuildError, BuildResult};
use crate::providers::ObjectInitializationData;

/// Initialization object configuring the runtime download cache.
pub const CACHE_INITIALIZATION_TYPE: &str = "CacheInitialization";

/// Settings the runtime reads before loading any catalog.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSettings {
  /// Platform name the content was built for.
  pub build_target: String,
  /// Fingerprint of the catalog these settings point at.
  pub settings_hash: String,
  /// Locations of the catalog and its hash files.
  pub catalog_locations: Vec<Location>,
  /// Emit profiler events.
  pub profile_events: bool,
  /// Log loader exceptions.
  pub log_resource_manager_exceptions: bool,
  /// Upper bound on simultaneous downloads.
  pub max_concurrent_web_requests: u32,
  /// Objects constructed when the runtime starts.
  pub initialization_objects: Vec<ObjectInitializationData>,
  /// Version of the pipeline that wrote the settings.
  pub crate_version: String,
}

impl RuntimeSettings {
  /// Settings for a catalog with the given fingerprint.
  pub fn new(
    config: &PipelineConfig,
    catalog_fingerprint: &str,
    catalog_locations: Vec<Location>,
    initialization_objects: Vec<ObjectInitializationData>,
  ) -> Self {
    Self {
      build_target: config.build_target.as_str().to_string(),
      settings_hash: catalog_fingerprint.to_string(),
      catalog_locations,
      profile_events: config.profile_events,
      log_resource_manager_exceptions: config.log_resource_manager_exceptions,
      max_concurrent_web_requests: config.max_concurrent_web_requests,
      initialization_objects,
      crate_version: env!("CARGO_PKG_VERSION").to_string(),
    }
  }
}

/// Types the player build must keep when stripping unused code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LinkFile {
  /// Implementation type names.
  pub types: Vec<String>,
}

/// Initialization objects derived from the configuration.
pub fn initialization_objects(config: &PipelineConfig) -> Vec<ObjectInitializationData> {
  config
    .cache_initialization
    .iter()
    .map(|cache| ObjectInitializationData {
      id: CACHE_INITIALIZATION_TYPE.to_string(),
      object_type: CACHE_INITIALIZATION_TYPE.to_string(),
      data: json!({
        "compressionEnabled": cache.compression_enabled,
        "cacheDirectoryOverride": cache.cache_directory.clone().unwrap_or_default(),
        "limitCacheSize": cache.limit_cache_size,
        "maximumCacheSize": cache.maximum_cache_size,
      }),
    })
    .collect()
}

/// Serialize `value` as pretty JSON into `path`, creating parent directories.
pub(crate) fn write_json<T: Serialize>(
  path: &Path,
  value: &T,
  what: &'static str,
) -> BuildResult<()> {
  let json =
    serde_json::to_string_pretty(value).map_err(|source| BuildError::Serialize { what, source })?;
  write_text(path, &json)
}

/// Write `contents` into `path`, creating parent directories.
pub(crate) fn write_text(path: &Path, contents: &str) -> BuildResult<()> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).map_err(|err| BuildError::io(parent, err))?;
  }
  fs::write(path, contents).map_err(|err| BuildError::io(path, err))
}

/// Record where the runtime settings of the last build live.
pub fn write_runtime_pointer(pointer_file: &Path, runtime_settings_path: &str) -> BuildResult<()> {
  write_text(pointer_file, runtime_settings_path)
}
