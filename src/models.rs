//! Data structures describing asset groups and the bundles produced from them.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Placeholder prefix identifying a runtime-relative (local) internal id.
pub const RUNTIME_PATH_PLACEHOLDER: &str = "{RuntimePath}";

/// Placeholder prefix for the runtime's persistent cache directory.
pub const PERSISTENT_DATA_PLACEHOLDER: &str = "{PersistentDataPath}";

/// Platform the content is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildTarget {
  /// Desktop Windows player.
  #[default]
  Windows,
  /// Desktop macOS player.
  MacOs,
  /// Desktop Linux player.
  Linux,
  /// Browser player.
  WebGl,
  /// Android player.
  Android,
  /// iOS player.
  Ios,
}

impl BuildTarget {
  /// Name substituted for the `[BuildTarget]` profile variable.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Windows => "StandaloneWindows64",
      Self::MacOs => "StandaloneOSX",
      Self::Linux => "StandaloneLinux64",
      Self::WebGl => "WebGL",
      Self::Android => "Android",
      Self::Ios => "iOS",
    }
  }

  /// Web-style targets favour fast decompression over ratio.
  pub fn is_web(self) -> bool {
    matches!(self, Self::WebGl)
  }
}

impl fmt::Display for BuildTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Rule governing how group entries are grouped into bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackingMode {
  /// One bundle for every asset in the group, one for every scene.
  #[default]
  PackTogether,
  /// One bundle pair per top-level entry.
  PackSeparately,
  /// One bundle pair per distinct label set.
  PackTogetherByLabel,
}

/// Compression applied to a compiled bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionMode {
  /// Stored as-is.
  Uncompressed,
  /// Chunk based, fast to decompress.
  Lz4,
  /// Whole-file, best ratio.
  Lzma,
}

impl CompressionMode {
  /// Compression used when a group does not choose one explicitly.
  pub fn platform_default(target: BuildTarget) -> Self {
    if target.is_web() { Self::Lz4 } else { Self::Lzma }
  }
}

/// How the final bundle file name is derived for remote bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleNamingStyle {
  /// Keep the resolved bundle name.
  Unchanged,
  /// `name_<hash>.bundle`
  #[default]
  AppendHash,
  /// `<hash>.bundle`
  HashOnly,
  /// `<hash of the name>.bundle`
  FilenameHash,
}

/// Where a bundle is loaded from at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOrigin {
  /// Shipped with the player, addressed relative to the runtime path.
  Local,
  /// Downloaded from a server.
  Remote,
}

/// Typed load path of a group, decided once when the configuration is read.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum LoadPath {
  /// Relative to the runtime data path. Defaults to `[BuildTarget]`.
  Local {
    /// Sub directory below the runtime path.
    #[serde(default)]
    path: Option<String>,
  },
  /// Absolute URL prefix.
  Remote {
    /// Base URL bundles are fetched from.
    url: String,
  },
}

impl Default for LoadPath {
  fn default() -> Self {
    Self::Local { path: None }
  }
}

impl LoadPath {
  /// Origin classification for this load path.
  pub fn origin(&self) -> LoadOrigin {
    match self {
      Self::Local { .. } => LoadOrigin::Local,
      Self::Remote { .. } => LoadOrigin::Remote,
    }
  }

  /// Prefix prepended to bundle file names to form their internal id.
  pub fn base(&self, target: BuildTarget) -> String {
    match self {
      Self::Local { path } => {
        let sub = path.as_deref().unwrap_or("[BuildTarget]");
        let sub = crate::asset_paths::expand_profile_variables(sub, target);
        let sub = sub.trim_matches('/');
        if sub.is_empty() {
          RUNTIME_PATH_PLACEHOLDER.to_string()
        } else {
          format!("{RUNTIME_PATH_PLACEHOLDER}/{sub}")
        }
      }
      Self::Remote { url } => crate::asset_paths::expand_profile_variables(url, target)
        .trim_end_matches('/')
        .to_string(),
    }
  }
}

/// Request options applied to remote bundles of a group.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestOptionsSchema {
  /// Seconds before a download is abandoned. Zero disables the timeout.
  pub timeout: u32,
  /// Number of retries after a failed download.
  pub retry_count: u32,
  /// Maximum redirects followed; negative means platform default.
  pub redirect_limit: i32,
  /// Use chunked transfer encoding.
  pub chunked_transfer: bool,
  /// Attach the bundle CRC so the loader can verify downloads.
  pub use_crc: bool,
  /// Attach the bundle hash so the loader can cache by version.
  pub use_hash: bool,
}

impl Default for RequestOptionsSchema {
  fn default() -> Self {
    Self {
      timeout: 0,
      retry_count: 0,
      redirect_limit: -1,
      chunked_transfer: false,
      use_crc: true,
      use_hash: true,
    }
  }
}

/// An addressable unit authored inside a group.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AssetEntry {
  /// Key used to request the asset at runtime. Unique within its group.
  pub address: String,
  /// Stable identifier of the asset.
  pub asset_id: String,
  /// Source path relative to the content root. May point at a folder.
  pub path: String,
  /// Labels attached to the entry.
  #[serde(default)]
  pub labels: BTreeSet<String>,
  /// Asset ids this entry references.
  #[serde(default)]
  pub dependencies: Vec<String>,
}

/// Named collection of entries sharing a packing and delivery policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssetGroup {
  /// Group name, used as the bundle name prefix.
  pub name: String,
  /// Packing policy.
  #[serde(default)]
  pub packing: PackingMode,
  /// Explicit compression. Falls back to the platform default.
  #[serde(default)]
  pub compression: Option<CompressionMode>,
  /// Runtime load path.
  #[serde(default)]
  pub load_path: LoadPath,
  /// Directory the final bundles are copied to.
  #[serde(default)]
  pub build_path: Option<String>,
  /// Naming style for remote bundle files.
  #[serde(default)]
  pub bundle_naming: BundleNamingStyle,
  /// Request options attached to remote bundles.
  #[serde(default)]
  pub request_options: RequestOptionsSchema,
  /// Whether the group takes part in builds.
  #[serde(default = "default_true")]
  pub include_in_build: bool,
  /// Entries are loaded through the legacy resources loader instead of bundles.
  #[serde(default)]
  pub legacy_resources: bool,
  /// Authored entries.
  #[serde(default)]
  pub entries: Vec<AssetEntry>,
}

fn default_true() -> bool {
  true
}

impl AssetGroup {
  /// Create an empty group using default policies.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      packing: PackingMode::default(),
      compression: None,
      load_path: LoadPath::default(),
      build_path: None,
      bundle_naming: BundleNamingStyle::default(),
      request_options: RequestOptionsSchema::default(),
      include_in_build: true,
      legacy_resources: false,
      entries: Vec::new(),
    }
  }

  /// Compression for bundles of this group on the given target.
  pub fn effective_compression(&self, target: BuildTarget) -> CompressionMode {
    self
      .compression
      .unwrap_or_else(|| CompressionMode::platform_default(target))
  }
}

/// A single underlying asset assigned to a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleAsset {
  /// Identifier of the asset.
  pub asset_id: String,
  /// Runtime address of the asset.
  pub address: String,
  /// Source path relative to the content root.
  pub path: String,
  /// Labels inherited from the owning entry.
  pub labels: BTreeSet<String>,
  /// Explicit dependencies inherited from the owning entry.
  pub dependencies: Vec<String>,
  /// Whether the asset is a scene.
  pub is_scene: bool,
}

/// Bundle name plus the ordered assets assigned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleInputDefinition {
  /// Bundle name, unique within a build after resolution.
  pub name: String,
  /// Owning group.
  pub group: String,
  /// Assets packed into the bundle.
  pub assets: Vec<BundleAsset>,
}

impl BundleInputDefinition {
  /// Asset ids in packing order.
  pub fn asset_ids(&self) -> impl Iterator<Item = &str> {
    self.assets.iter().map(|asset| asset.asset_id.as_str())
  }
}

/// Per-bundle output of a build strategy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleBuildResult {
  /// Resolved bundle name.
  pub name: String,
  /// Integrity hash.
  pub hash: String,
  /// CRC of the compiled artifact.
  pub crc: u32,
  /// Uncompressed size in bytes.
  pub size: u64,
}
