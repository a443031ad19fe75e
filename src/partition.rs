//! Splitting asset groups into bundle input definitions.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::{debug, instrument};

use crate::asset_paths::{expand_entry, is_scene_path, normalize_bundle_name};
use crate::error::BuildResult;
use crate::models::{AssetEntry, AssetGroup, BundleAsset, BundleInputDefinition, PackingMode};

/// Extension appended to every generated bundle name.
pub const BUNDLE_EXTENSION: &str = ".bundle";

/// Bundle name fragment used by pack-by-label for entries without labels.
pub const UNLABELED_KEY: &str = "unlabeled";

/// Partitions the entries of a group into bundles according to its packing policy.
pub struct GroupPartitioner<'a> {
  content_root: &'a Path,
  scene_extensions: &'a [String],
}

/// Assets and scenes collected for one bundle pair.
#[derive(Default)]
struct BundlePair {
  assets: Vec<BundleAsset>,
  scenes: Vec<BundleAsset>,
  seen: BTreeSet<String>,
}

impl BundlePair {
  fn push(&mut self, asset: BundleAsset) {
    if !self.seen.insert(asset.asset_id.clone()) {
      return;
    }
    if asset.is_scene {
      self.scenes.push(asset);
    } else {
      self.assets.push(asset);
    }
  }

  fn into_definitions(self, group: &str, suffix: &str, out: &mut Vec<BundleInputDefinition>) {
    if !self.assets.is_empty() {
      out.push(BundleInputDefinition {
        name: bundle_name(group, "assets", suffix),
        group: group.to_string(),
        assets: self.assets,
      });
    }
    if !self.scenes.is_empty() {
      out.push(BundleInputDefinition {
        name: bundle_name(group, "scenes", suffix),
        group: group.to_string(),
        assets: self.scenes,
      });
    }
  }
}

impl<'a> GroupPartitioner<'a> {
  /// Create a partitioner resolving entry paths against `content_root`.
  pub fn new(content_root: &'a Path, scene_extensions: &'a [String]) -> Self {
    Self {
      content_root,
      scene_extensions,
    }
  }

  /// Produce the bundle input definitions of a group.
  ///
  /// Legacy resource groups are loaded without bundles and yield nothing.
  #[instrument(level = "debug", skip_all, fields(group = %group.name))]
  pub fn partition(&self, group: &AssetGroup) -> BuildResult<Vec<BundleInputDefinition>> {
    if group.legacy_resources {
      return Ok(Vec::new());
    }

    let mut definitions = Vec::new();
    match group.packing {
      PackingMode::PackTogether => {
        let mut pair = BundlePair::default();
        for entry in &group.entries {
          for asset in self.bundle_assets(entry)? {
            pair.push(asset);
          }
        }
        pair.into_definitions(&group.name, "all", &mut definitions);
      }
      PackingMode::PackSeparately => {
        for entry in &group.entries {
          let mut pair = BundlePair::default();
          for asset in self.bundle_assets(entry)? {
            pair.push(asset);
          }
          pair.into_definitions(&group.name, &entry.address, &mut definitions);
        }
      }
      PackingMode::PackTogetherByLabel => {
        let mut by_label: BTreeMap<String, BundlePair> = BTreeMap::new();
        for entry in &group.entries {
          let key = label_key(entry);
          let pair = by_label.entry(key).or_default();
          for asset in self.bundle_assets(entry)? {
            pair.push(asset);
          }
        }
        for (key, pair) in by_label {
          pair.into_definitions(&group.name, &key, &mut definitions);
        }
      }
    }

    debug!(bundles = definitions.len(), "partitioned group");
    Ok(definitions)
  }

  /// Classify every file of an entry into bundle assets.
  fn bundle_assets(&self, entry: &AssetEntry) -> BuildResult<Vec<BundleAsset>> {
    Ok(
      expand_entry(self.content_root, entry)?
        .into_iter()
        .map(|expanded| BundleAsset {
          is_scene: is_scene_path(&expanded.path, self.scene_extensions),
          asset_id: expanded.asset_id,
          address: expanded.address,
          path: expanded.path,
          labels: entry.labels.clone(),
          dependencies: entry.dependencies.clone(),
        })
        .collect(),
    )
  }
}

fn label_key(entry: &AssetEntry) -> String {
  if entry.labels.is_empty() {
    UNLABELED_KEY.to_string()
  } else {
    entry
      .labels
      .iter()
      .map(String::as_str)
      .collect::<Vec<_>>()
      .join("_")
  }
}

fn bundle_name(group: &str, kind: &str, suffix: &str) -> String {
  normalize_bundle_name(&format!("{group}_{kind}_{suffix}{BUNDLE_EXTENSION}"))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::asset_paths::DEFAULT_SCENE_EXTENSIONS;
  use std::fs;
  use tempfile::tempdir;

  fn scene_extensions() -> Vec<String> {
    DEFAULT_SCENE_EXTENSIONS.iter().map(|s| s.to_string()).collect()
  }

  fn entry(address: &str, path: &str, labels: &[&str]) -> AssetEntry {
    AssetEntry {
      address: address.into(),
      asset_id: format!("id-{address}"),
      path: path.into(),
      labels: labels.iter().map(|label| label.to_string()).collect(),
      dependencies: Vec::new(),
    }
  }

  fn names(definitions: &[BundleInputDefinition]) -> Vec<&str> {
    definitions.iter().map(|def| def.name.as_str()).collect()
  }

  #[test]
  fn pack_together_splits_assets_and_scenes() {
    let root = tempdir().unwrap();
    let extensions = scene_extensions();
    let partitioner = GroupPartitioner::new(root.path(), &extensions);
    let mut group = AssetGroup::new("Levels");
    group.entries = vec![
      entry("crate", "props/crate.prefab", &[]),
      entry("main", "scenes/Main.unity", &[]),
      entry("barrel", "props/barrel.prefab", &[]),
      entry("boss", "scenes/boss.scene", &[]),
    ];

    let definitions = partitioner.partition(&group).unwrap();
    assert_eq!(names(&definitions), vec![
      "levels_assets_all.bundle",
      "levels_scenes_all.bundle"
    ]);
    assert_eq!(definitions[0].asset_ids().collect::<Vec<_>>(), vec![
      "id-crate",
      "id-barrel"
    ]);
    assert!(definitions[1].assets.iter().all(|asset| asset.is_scene));
  }

  #[test]
  fn pack_together_without_scenes_yields_single_bundle() {
    let root = tempdir().unwrap();
    let extensions = scene_extensions();
    let partitioner = GroupPartitioner::new(root.path(), &extensions);
    let mut group = AssetGroup::new("Props");
    group.entries = vec![entry("crate", "crate.prefab", &[])];

    let definitions = partitioner.partition(&group).unwrap();
    assert_eq!(names(&definitions), vec!["props_assets_all.bundle"]);
  }

  #[test]
  fn pack_separately_names_bundles_after_entries() {
    let root = tempdir().unwrap();
    let extensions = scene_extensions();
    let partitioner = GroupPartitioner::new(root.path(), &extensions);
    let mut group = AssetGroup::new("Characters");
    group.packing = PackingMode::PackSeparately;
    group.entries = vec![
      entry("hero", "chars/hero.prefab", &[]),
      entry("villain", "chars/villain.prefab", &[]),
    ];

    let definitions = partitioner.partition(&group).unwrap();
    assert_eq!(names(&definitions), vec![
      "characters_assets_hero.bundle",
      "characters_assets_villain.bundle"
    ]);
  }

  #[test]
  fn pack_separately_expands_folder_entries() {
    let root = tempdir().unwrap();
    fs::create_dir_all(root.path().join("world/sub")).unwrap();
    fs::write(root.path().join("world/tree.prefab"), b"t").unwrap();
    fs::write(root.path().join("world/sub/Forest.unity"), b"s").unwrap();
    let extensions = scene_extensions();
    let partitioner = GroupPartitioner::new(root.path(), &extensions);
    let mut group = AssetGroup::new("World");
    group.packing = PackingMode::PackSeparately;
    group.entries = vec![entry("World", "world", &[])];

    let definitions = partitioner.partition(&group).unwrap();
    assert_eq!(names(&definitions), vec![
      "world_assets_world.bundle",
      "world_scenes_world.bundle"
    ]);
    assert_eq!(definitions[1].assets[0].address, "World/sub/Forest.unity");
  }

  #[test]
  fn pack_by_label_groups_identical_label_sets() {
    let root = tempdir().unwrap();
    let extensions = scene_extensions();
    let partitioner = GroupPartitioner::new(root.path(), &extensions);
    let mut group = AssetGroup::new("Audio");
    group.packing = PackingMode::PackTogetherByLabel;
    group.entries = vec![
      entry("a", "a.wav", &["music", "intro"]),
      entry("b", "b.wav", &["intro", "music"]),
      entry("c", "c.wav", &["sfx"]),
      entry("d", "d.wav", &[]),
    ];

    let definitions = partitioner.partition(&group).unwrap();
    assert_eq!(names(&definitions), vec![
      "audio_assets_intro_music.bundle",
      "audio_assets_sfx.bundle",
      "audio_assets_unlabeled.bundle"
    ]);
    assert_eq!(definitions[0].assets.len(), 2);
  }

  #[test]
  fn legacy_groups_produce_no_bundles() {
    let root = tempdir().unwrap();
    let extensions = scene_extensions();
    let partitioner = GroupPartitioner::new(root.path(), &extensions);
    let mut group = AssetGroup::new("Resources");
    group.legacy_resources = true;
    group.entries = vec![entry("logo", "Resources/logo.png", &[])];
    assert!(partitioner.partition(&group).unwrap().is_empty());
  }

  #[test]
  fn duplicate_assets_are_packed_once() {
    let root = tempdir().unwrap();
    let extensions = scene_extensions();
    let partitioner = GroupPartitioner::new(root.path(), &extensions);
    let mut group = AssetGroup::new("Props");
    let mut alias = entry("crate-alias", "crate.prefab", &[]);
    alias.asset_id = "id-crate".into();
    group.entries = vec![entry("crate", "crate.prefab", &[]), alias];

    let definitions = partitioner.partition(&group).unwrap();
    assert_eq!(definitions[0].assets.len(), 1);
  }
}
