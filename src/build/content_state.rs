//! Content state snapshot written by packed builds for later update diffing.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{BuildError, BuildResult};
use crate::models::{BuildTarget, BundleInputDefinition};

/// File name of the snapshot inside the content state directory.
pub const CONTENT_STATE_FILE: &str = "content_state.json";

/// State of one bundled asset at build time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedAssetState {
  /// Identifier of the asset.
  pub asset_id: String,
  /// Runtime address.
  pub address: String,
  /// Owning group.
  pub group: String,
  /// Bundle the asset was packed into.
  pub bundle: String,
  /// SHA-256 hex digest of the source file.
  pub source_hash: String,
}

/// Snapshot of a packed build.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentState {
  /// Catalog version of the build.
  pub catalog_version: String,
  /// Platform the build targeted.
  pub build_target: BuildTarget,
  /// Fingerprint of the catalog written by the build.
  pub catalog_fingerprint: String,
  /// Bundled assets ordered by asset id.
  pub assets: Vec<CachedAssetState>,
}

impl ContentState {
  /// Capture the state of every asset in `bundles`, hashing sources below `content_root`.
  pub fn capture(
    catalog_version: &str,
    build_target: BuildTarget,
    catalog_fingerprint: &str,
    content_root: &Path,
    bundles: &[BundleInputDefinition],
  ) -> BuildResult<Self> {
    let mut assets = Vec::new();
    for bundle in bundles {
      for asset in &bundle.assets {
        let source = content_root.join(&asset.path);
        let bytes = fs::read(&source).map_err(|err| BuildError::io(&source, err))?;
        assets.push(CachedAssetState {
          asset_id: asset.asset_id.clone(),
          address: asset.address.clone(),
          group: bundle.group.clone(),
          bundle: bundle.name.clone(),
          source_hash: hex::encode(Sha256::digest(&bytes)),
        });
      }
    }
    assets.sort_by(|left, right| left.asset_id.cmp(&right.asset_id));

    Ok(Self {
      catalog_version: catalog_version.to_string(),
      build_target,
      catalog_fingerprint: catalog_fingerprint.to_string(),
      assets,
    })
  }

  /// Read a snapshot written by an earlier build.
  pub fn load(path: &Path) -> BuildResult<Self> {
    let content = fs::read_to_string(path).map_err(|err| BuildError::io(path, err))?;
    serde_json::from_str(&content).map_err(|source| BuildError::Serialize {
      what: "content state",
      source,
    })
  }

  /// Assets whose source changed or that did not exist in `previous`.
  pub fn modified_since<'a>(&'a self, previous: &ContentState) -> Vec<&'a CachedAssetState> {
    self
      .assets
      .iter()
      .filter(|asset| {
        previous
          .assets
          .iter()
          .find(|old| old.asset_id == asset.asset_id)
          .is_none_or(|old| old.source_hash != asset.source_hash)
      })
      .collect()
  }
}
