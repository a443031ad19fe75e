//! Provider registration: which loader implementations a catalog needs.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::catalog::Location;
use crate::config::ProviderCacheConfig;

/// Loads assets out of compiled bundles.
pub const BUNDLED_ASSET_PROVIDER: &str = "BundledAssetProvider";
/// Loads compiled bundles.
pub const ASSET_BUNDLE_PROVIDER: &str = "AssetBundleProvider";
/// Loads scenes out of compiled bundles.
pub const SCENE_PROVIDER: &str = "SceneProvider";
/// Loads assets shipped in the player's legacy resources folders.
pub const LEGACY_RESOURCES_PROVIDER: &str = "LegacyResourcesProvider";
/// Loads content catalogs.
pub const CONTENT_CATALOG_PROVIDER: &str = "ContentCatalogProvider";
/// Loads small text files such as catalog hashes.
pub const TEXT_DATA_PROVIDER: &str = "TextDataProvider";
/// Simulated bundle loader used by virtual builds.
pub const VIRTUAL_ASSET_BUNDLE_PROVIDER: &str = "VirtualAssetBundleProvider";
/// Simulated asset loader used by virtual builds.
pub const VIRTUAL_BUNDLED_ASSET_PROVIDER: &str = "VirtualBundledAssetProvider";
/// Instantiates loaded prefabs.
pub const INSTANCE_PROVIDER: &str = "InstanceProvider";
/// Wrapper keeping recently released results alive.
pub const CACHED_PROVIDER: &str = "CachedProvider";

/// Providers wrapped by [`CACHED_PROVIDER`].
const CACHE_WRAPPED_PROVIDERS: &[&str] = &[
  ASSET_BUNDLE_PROVIDER,
  BUNDLED_ASSET_PROVIDER,
  VIRTUAL_ASSET_BUNDLE_PROVIDER,
  VIRTUAL_BUNDLED_ASSET_PROVIDER,
];

/// Provider ids used for the locations of one build strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderIds {
  /// Provider of bundle locations.
  pub bundle: &'static str,
  /// Provider of non-scene asset locations.
  pub asset: &'static str,
  /// Provider of scene locations.
  pub scene: &'static str,
}

impl ProviderIds {
  /// Providers of packed builds.
  pub const PACKED: Self = Self {
    bundle: ASSET_BUNDLE_PROVIDER,
    asset: BUNDLED_ASSET_PROVIDER,
    scene: SCENE_PROVIDER,
  };

  /// Providers of virtual builds.
  pub const VIRTUAL: Self = Self {
    bundle: VIRTUAL_ASSET_BUNDLE_PROVIDER,
    asset: VIRTUAL_BUNDLED_ASSET_PROVIDER,
    scene: SCENE_PROVIDER,
  };
}

/// Type plus constructor settings of a runtime object.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInitializationData {
  /// Identifier the object is registered under.
  pub id: String,
  /// Implementation type to construct.
  pub object_type: String,
  /// Constructor settings.
  #[serde(default, skip_serializing_if = "Value::is_null")]
  pub data: Value,
}

impl ObjectInitializationData {
  /// Record without constructor settings.
  pub fn plain(id: &str) -> Self {
    Self {
      id: id.to_string(),
      object_type: id.to_string(),
      data: Value::Null,
    }
  }
}

/// Provider records of a catalog plus the types that must survive stripping.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRegistration {
  /// One record per distinct resource provider id.
  pub resource_provider_data: Vec<ObjectInitializationData>,
  /// Instance provider record.
  pub instance_provider_data: ObjectInitializationData,
  /// Scene provider record.
  pub scene_provider_data: ObjectInitializationData,
  /// Implementation types referenced by the records above and by initialization objects.
  pub retained_types: Vec<String>,
}

/// Determines the providers required by a set of locations.
pub struct ResourceProviderRegistrar<'a> {
  cache: &'a ProviderCacheConfig,
}

impl<'a> ResourceProviderRegistrar<'a> {
  /// Create a registrar wrapping bundle and asset providers with the given cache bounds.
  pub fn new(cache: &'a ProviderCacheConfig) -> Self {
    Self { cache }
  }

  /// Emit one record per distinct provider referenced by `locations`.
  ///
  /// The scene provider is reported separately in `scene_provider_data` and never appears
  /// among the resource providers.
  pub fn register<'l>(
    &self,
    locations: impl IntoIterator<Item = &'l Location>,
    initialization_objects: &[ObjectInitializationData],
  ) -> ProviderRegistration {
    let provider_ids: BTreeSet<&str> = locations
      .into_iter()
      .map(|location| location.provider.as_str())
      .filter(|provider| *provider != SCENE_PROVIDER)
      .collect();

    let mut retained = BTreeSet::new();
    let resource_provider_data: Vec<_> = provider_ids
      .into_iter()
      .map(|id| {
        retained.insert(id.to_string());
        if CACHE_WRAPPED_PROVIDERS.contains(&id) {
          retained.insert(CACHED_PROVIDER.to_string());
          self.cached(id)
        } else {
          ObjectInitializationData::plain(id)
        }
      })
      .collect();

    let instance_provider_data = ObjectInitializationData::plain(INSTANCE_PROVIDER);
    let scene_provider_data = ObjectInitializationData::plain(SCENE_PROVIDER);
    retained.insert(instance_provider_data.object_type.clone());
    retained.insert(scene_provider_data.object_type.clone());
    for object in initialization_objects {
      retained.insert(object.object_type.clone());
    }

    debug!(
      providers = resource_provider_data.len(),
      retained = retained.len(),
      "registered providers"
    );
    ProviderRegistration {
      resource_provider_data,
      instance_provider_data,
      scene_provider_data,
      retained_types: retained.into_iter().collect(),
    }
  }

  fn cached(&self, id: &str) -> ObjectInitializationData {
    ObjectInitializationData {
      id: id.to_string(),
      object_type: CACHED_PROVIDER.to_string(),
      data: json!({
        "providerType": id,
        "maxLruCount": self.cache.max_lru_count,
        "maxLruAge": self.cache.max_lru_age,
      }),
    }
  }
}
