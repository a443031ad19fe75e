//! Steps shared by both build strategies: validation, partitioning, naming and the initial
//! location list.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::PathBuf;

use tracing::{debug, info, instrument};

use crate::asset_paths::{expand_entry, join_internal_id};
use crate::catalog::Location;
use crate::config::PipelineConfig;
use crate::error::BuildResult;
use crate::models::{AssetGroup, BundleAsset, BundleInputDefinition, CompressionMode};
use crate::naming::{resolve_bundle_names, short_hash};
use crate::partition::GroupPartitioner;
use crate::providers::{LEGACY_RESOURCES_PROVIDER, ProviderIds};
use crate::selection::{GroupInclusion, selected_groups};

const RESOURCES_FOLDER: &str = "Resources/";

/// Bundles of a build with the groups and locations derived from them.
pub(crate) struct BuildPlan<'a> {
  pub config: &'a PipelineConfig,
  pub content_root: PathBuf,
  pub bundles: Vec<BundleInputDefinition>,
  /// Owning group of each resolved bundle name.
  pub bundle_groups: HashMap<String, &'a AssetGroup>,
  pub locations: Vec<Location>,
  providers: ProviderIds,
}

impl<'a> BuildPlan<'a> {
  /// Validate the configuration and lay out bundles and locations for the selected groups.
  #[instrument(level = "debug", skip_all)]
  pub fn new(
    config: &'a PipelineConfig,
    selection: &dyn GroupInclusion,
    providers: ProviderIds,
  ) -> BuildResult<Self> {
    config.validate()?;
    let content_root = config.content_root_path();
    let groups: Vec<&AssetGroup> = selected_groups(&config.groups, selection).collect();

    let partitioner = GroupPartitioner::new(&content_root, &config.scene_extensions);
    let mut definitions = Vec::new();
    let mut owners = Vec::new();
    for group in &groups {
      let partitioned = partitioner.partition(group)?;
      owners.extend(std::iter::repeat_n(*group, partitioned.len()));
      definitions.extend(partitioned);
    }
    let bundles = resolve_bundle_names(definitions)?;
    let bundle_groups = bundles
      .iter()
      .zip(owners)
      .map(|(bundle, group)| (bundle.name.clone(), group))
      .collect();

    let mut plan = Self {
      config,
      content_root,
      bundles,
      bundle_groups,
      locations: Vec::new(),
      providers,
    };
    let mut locations = plan.bundle_locations();
    locations.extend(plan.asset_locations());
    for group in groups.iter().filter(|group| group.legacy_resources) {
      locations.extend(plan.legacy_locations(group)?);
    }
    plan.locations = locations;

    info!(
      groups = groups.len(),
      bundles = plan.bundles.len(),
      locations = plan.locations.len(),
      "planned content build"
    );
    Ok(plan)
  }

  /// Compression mode of every bundle.
  pub fn compression(&self) -> BTreeMap<String, CompressionMode> {
    self
      .bundle_groups
      .iter()
      .map(|(name, group)| {
        (
          name.clone(),
          group.effective_compression(self.config.build_target),
        )
      })
      .collect()
  }

  /// Location loading the bundle `name`, if one was planned.
  pub fn bundle_location_mut(&mut self, name: &str) -> Option<&mut Location> {
    let provider = self.providers.bundle;
    self
      .locations
      .iter_mut()
      .find(|location| location.provider == provider && location.primary_key() == name)
  }

  /// Hash identifying the set of planned bundles and their contents.
  pub fn layout_hash(&self) -> String {
    let mut lines: Vec<String> = self
      .bundles
      .iter()
      .map(|bundle| format!("{}:{}", bundle.name, bundle.asset_ids().collect::<Vec<_>>().join(",")))
      .collect();
    lines.sort();
    short_hash(lines.join("\n").as_bytes())
  }

  fn bundle_locations(&self) -> Vec<Location> {
    self
      .bundles
      .iter()
      .filter_map(|bundle| {
        let group = self.bundle_groups.get(&bundle.name)?;
        let base = group.load_path.base(self.config.build_target);
        Some(Location::new(
          vec![bundle.name.clone()],
          join_internal_id(&base, &bundle.name),
          self.providers.bundle,
        ))
      })
      .collect()
  }

  fn asset_locations(&self) -> Vec<Location> {
    let owner: HashMap<&str, &str> = self
      .bundles
      .iter()
      .flat_map(|bundle| {
        bundle
          .assets
          .iter()
          .map(move |asset| (asset.asset_id.as_str(), bundle.name.as_str()))
      })
      .collect();
    let dependencies: HashMap<&str, &[String]> = self
      .bundles
      .iter()
      .flat_map(|bundle| &bundle.assets)
      .map(|asset| (asset.asset_id.as_str(), asset.dependencies.as_slice()))
      .collect();

    let mut locations = Vec::new();
    for bundle in &self.bundles {
      for asset in &bundle.assets {
        let provider = if asset.is_scene {
          self.providers.scene
        } else {
          self.providers.asset
        };
        locations.push(
          Location::new(location_keys(asset), asset.path.clone(), provider).with_dependencies(
            bundle_dependencies(&bundle.name, asset, &owner, &dependencies),
          ),
        );
      }
    }
    locations
  }

  fn legacy_locations(&self, group: &AssetGroup) -> BuildResult<Vec<Location>> {
    let mut locations = Vec::new();
    for entry in &group.entries {
      for expanded in expand_entry(&self.content_root, entry)? {
        let mut keys = vec![expanded.address.clone()];
        if expanded.asset_id != expanded.address {
          keys.push(expanded.asset_id.clone());
        }
        keys.extend(entry.labels.iter().cloned());
        locations.push(Location::new(
          keys,
          legacy_resource_id(&expanded.path),
          LEGACY_RESOURCES_PROVIDER,
        ));
      }
    }
    debug!(group = %group.name, locations = locations.len(), "legacy resource locations");
    Ok(locations)
  }
}

/// Address, asset id when it differs, then labels.
fn location_keys(asset: &BundleAsset) -> Vec<String> {
  let mut keys = vec![asset.address.clone()];
  if asset.asset_id != asset.address {
    keys.push(asset.asset_id.clone());
  }
  keys.extend(asset.labels.iter().cloned());
  keys
}

/// Own bundle first, then the sorted bundles of every asset reachable through explicit
/// dependencies. Ids without an owning bundle are skipped.
fn bundle_dependencies(
  own_bundle: &str,
  asset: &BundleAsset,
  owner: &HashMap<&str, &str>,
  dependencies: &HashMap<&str, &[String]>,
) -> Vec<String> {
  let mut visited: BTreeSet<&str> = BTreeSet::new();
  let mut bundles: BTreeSet<&str> = BTreeSet::new();
  let mut queue: VecDeque<&str> = asset.dependencies.iter().map(String::as_str).collect();
  visited.insert(asset.asset_id.as_str());

  while let Some(asset_id) = queue.pop_front() {
    if !visited.insert(asset_id) {
      continue;
    }
    if let Some(&bundle) = owner.get(asset_id) {
      bundles.insert(bundle);
    }
    if let Some(next) = dependencies.get(asset_id) {
      queue.extend(next.iter().map(String::as_str));
    }
  }
  bundles.remove(own_bundle);

  std::iter::once(own_bundle)
    .chain(bundles)
    .map(str::to_string)
    .collect()
}

/// Load path of a legacy resource: the part after `Resources/`, without extension.
fn legacy_resource_id(path: &str) -> String {
  let path = path.replace('\\', "/");
  let relative = match path.rfind(RESOURCES_FOLDER) {
    Some(index) => &path[index + RESOURCES_FOLDER.len()..],
    None => path.as_str(),
  };
  let file_start = relative.rfind('/').map_or(0, |index| index + 1);
  match relative[file_start..].rfind('.') {
    Some(dot) if dot > 0 => relative[..file_start + dot].to_string(),
    _ => relative.to_string(),
  }
}
