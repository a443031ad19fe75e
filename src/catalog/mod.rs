//! Content catalog assembly, serialization and fingerprinting.

mod location;
mod validate;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::config::ProviderCacheConfig;
use crate::error::{BuildError, BuildResult};
use crate::models::{PERSISTENT_DATA_PLACEHOLDER, RUNTIME_PATH_PLACEHOLDER};
use crate::providers::{
  CONTENT_CATALOG_PROVIDER, ObjectInitializationData, ResourceProviderRegistrar,
  TEXT_DATA_PROVIDER,
};

pub use location::{ContentCatalogDataEntry, Location, RequestOptions};
pub use validate::validate_dependencies;

/// Key of the main catalog location and locator id of the catalog document.
pub const MAIN_CATALOG_KEY: &str = "AddressablesMainContentCatalog";
/// Key of the location holding the hash of the remotely hosted catalog.
pub const REMOTE_HASH_KEY: &str = "AddressablesMainContentCatalogRemoteHash";
/// Key of the location holding the hash of the locally cached catalog.
pub const CACHE_HASH_KEY: &str = "AddressablesMainContentCatalogCacheHash";

/// Serialized catalog document.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentCatalogData {
  /// Identifier the runtime registers the catalog's locator under.
  pub locator_id: String,
  /// Hash of the bundle results the catalog was built from.
  pub build_result_hash: String,
  /// Providers needed by the entries.
  pub resource_provider_data: Vec<ObjectInitializationData>,
  /// Provider instantiating prefabs.
  pub instance_provider_data: ObjectInitializationData,
  /// Provider loading scenes.
  pub scene_provider_data: ObjectInitializationData,
  /// Locations ordered by primary key, then internal id.
  pub entries: Vec<Location>,
}

impl ContentCatalogData {
  /// Pretty printed JSON form written to disk.
  pub fn to_json(&self) -> BuildResult<String> {
    serde_json::to_string_pretty(self).map_err(|source| BuildError::Serialize {
      what: "content catalog",
      source,
    })
  }

  /// Parse a catalog previously produced by [`ContentCatalogData::to_json`].
  pub fn from_json(json: &str) -> BuildResult<Self> {
    serde_json::from_str(json).map_err(|source| BuildError::Serialize {
      what: "content catalog",
      source,
    })
  }
}

/// SHA-256 hex digest of a serialized catalog.
pub fn fingerprint(json: &str) -> String {
  hex::encode(Sha256::digest(json.as_bytes()))
}

/// A finished catalog together with its serialized form.
#[derive(Debug, Clone)]
pub struct SerializedCatalog {
  /// Catalog document.
  pub data: ContentCatalogData,
  /// JSON text written to disk.
  pub json: String,
  /// [`fingerprint`] of `json`.
  pub fingerprint: String,
  /// Implementation types referenced by the catalog and its initialization objects.
  pub retained_types: Vec<String>,
}

/// Collects locations and turns them into a validated catalog document.
pub struct CatalogBuilder<'a> {
  cache: &'a ProviderCacheConfig,
  build_result_hash: String,
  locations: Vec<Location>,
}

impl<'a> CatalogBuilder<'a> {
  /// Start an empty catalog whose cached providers use `cache` bounds.
  pub fn new(cache: &'a ProviderCacheConfig, build_result_hash: impl Into<String>) -> Self {
    Self {
      cache,
      build_result_hash: build_result_hash.into(),
      locations: Vec::new(),
    }
  }

  /// Append locations to the catalog.
  pub fn extend(&mut self, locations: impl IntoIterator<Item = Location>) {
    self.locations.extend(locations);
  }

  /// Sort, validate and serialize the collected locations.
  ///
  /// `catalog_locations` live in the settings document rather than in the catalog, but the
  /// providers they reference are registered here.
  #[instrument(level = "debug", skip_all, fields(locations = self.locations.len()))]
  pub fn build(
    mut self,
    catalog_locations: &[Location],
    initialization_objects: &[ObjectInitializationData],
  ) -> BuildResult<SerializedCatalog> {
    self.locations.sort_by(|left, right| {
      (left.primary_key(), left.internal_id.as_str())
        .cmp(&(right.primary_key(), right.internal_id.as_str()))
    });
    validate_dependencies(&self.locations)?;
    validate_dependencies(catalog_locations)?;

    let registration = ResourceProviderRegistrar::new(self.cache).register(
      self.locations.iter().chain(catalog_locations),
      initialization_objects,
    );
    let data = ContentCatalogData {
      locator_id: MAIN_CATALOG_KEY.to_string(),
      build_result_hash: self.build_result_hash,
      resource_provider_data: registration.resource_provider_data,
      instance_provider_data: registration.instance_provider_data,
      scene_provider_data: registration.scene_provider_data,
      entries: self.locations,
    };
    let json = data.to_json()?;
    let fingerprint = fingerprint(&json);
    debug!(%fingerprint, "serialized catalog");

    Ok(SerializedCatalog {
      data,
      json,
      fingerprint,
      retained_types: registration.retained_types,
    })
  }
}

/// Locations the runtime uses to find the catalog itself.
///
/// The first location is the main catalog at `<local_base>/<stem>.json`. With a remote
/// catalog, a remote hash and a cache hash location are appended and made dependencies of
/// the main one.
pub fn catalog_locations(local_base: &str, stem: &str, remote_url: Option<&str>) -> Vec<Location> {
  let mut main = Location::new(
    vec![MAIN_CATALOG_KEY.to_string()],
    format!("{}/{stem}.json", local_base.trim_end_matches('/')),
    CONTENT_CATALOG_PROVIDER,
  );
  let Some(remote_url) = remote_url else {
    return vec![main];
  };

  let remote_hash = Location::new(
    vec![REMOTE_HASH_KEY.to_string()],
    format!("{}/{stem}.hash", remote_url.trim_end_matches('/')),
    TEXT_DATA_PROVIDER,
  );
  let cache_hash = Location::new(
    vec![CACHE_HASH_KEY.to_string()],
    format!("{PERSISTENT_DATA_PLACEHOLDER}/{stem}.hash"),
    TEXT_DATA_PROVIDER,
  );
  main.dependencies = vec![REMOTE_HASH_KEY.to_string(), CACHE_HASH_KEY.to_string()];
  vec![main, remote_hash, cache_hash]
}

/// Catalog locations of a build shipped with the player.
pub fn runtime_catalog_locations(stem: &str, remote_url: Option<&str>) -> Vec<Location> {
  catalog_locations(RUNTIME_PATH_PLACEHOLDER, stem, remote_url)
}
