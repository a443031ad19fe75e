//! Catalog location records.

use serde::{Deserialize, Serialize};

use crate::models::{BundleBuildResult, RequestOptionsSchema};

/// Download options attached to remote bundle locations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
  /// Bundle hash used for cache versioning. Empty when disabled.
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub hash: String,
  /// CRC checked after download. Zero when disabled.
  #[serde(default)]
  pub crc: u32,
  /// Seconds before the download is abandoned.
  #[serde(default)]
  pub timeout: u32,
  /// Use chunked transfer encoding.
  #[serde(default)]
  pub chunked_transfer: bool,
  /// Maximum redirects followed.
  #[serde(default)]
  pub redirect_limit: i32,
  /// Retries after a failed download.
  #[serde(default)]
  pub retry_count: u32,
  /// Resolved bundle name.
  pub bundle_name: String,
  /// Compiled bundle size in bytes.
  #[serde(default)]
  pub bundle_size: u64,
}

impl RequestOptions {
  /// Combine a group's request schema with the result of a compiled bundle.
  pub fn from_schema(schema: &RequestOptionsSchema, result: &BundleBuildResult) -> Self {
    Self {
      hash: if schema.use_hash {
        result.hash.clone()
      } else {
        String::new()
      },
      crc: if schema.use_crc { result.crc } else { 0 },
      timeout: schema.timeout,
      chunked_transfer: schema.chunked_transfer,
      redirect_limit: schema.redirect_limit,
      retry_count: schema.retry_count,
      bundle_name: result.name.clone(),
      bundle_size: result.size,
    }
  }
}

/// One entry of a catalog describing how to load an item.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentCatalogDataEntry {
  /// Lookup keys. The first one is the primary key.
  pub keys: Vec<String>,
  /// Load identifier: a path, URL or runtime-relative template.
  pub internal_id: String,
  /// Identifier of the provider loading this location.
  pub provider: String,
  /// Keys of locations that must be loaded first, in order.
  #[serde(default)]
  pub dependencies: Vec<String>,
  /// Provider specific request data.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data: Option<RequestOptions>,
}

/// Shorter name used throughout the build code.
pub type Location = ContentCatalogDataEntry;

impl ContentCatalogDataEntry {
  /// Location without dependencies or data.
  pub fn new(
    keys: Vec<String>,
    internal_id: impl Into<String>,
    provider: impl Into<String>,
  ) -> Self {
    Self {
      keys,
      internal_id: internal_id.into(),
      provider: provider.into(),
      dependencies: Vec::new(),
      data: None,
    }
  }

  /// Attach dependency keys.
  pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
    self.dependencies = dependencies;
    self
  }

  /// Primary key, or the internal id for a keyless location.
  pub fn primary_key(&self) -> &str {
    self
      .keys
      .first()
      .map_or(self.internal_id.as_str(), String::as_str)
  }
}
