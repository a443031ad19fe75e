//! Bundle name deduplication and final file naming.

use std::collections::HashSet;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{BuildError, BuildResult};
use crate::models::{BundleInputDefinition, BundleNamingStyle};

/// Numeric suffixes tried before a colliding name is declared unresolvable.
pub const MAX_NAME_SUFFIX_ATTEMPTS: usize = 1000;

/// Hex characters kept from a SHA-256 digest when it names a file.
pub const SHORT_HASH_LEN: usize = 32;

/// Assigns globally unique bundle names within one build.
#[derive(Debug, Default)]
pub struct BundleNameResolver {
  assigned: HashSet<String>,
}

impl BundleNameResolver {
  /// Create a resolver with no names assigned.
  pub fn new() -> Self {
    Self::default()
  }

  /// Reserve `name`, or the first free `stem<N>.ext` variant of it.
  pub fn resolve(&mut self, name: &str) -> BuildResult<String> {
    if self.assigned.insert(name.to_string()) {
      return Ok(name.to_string());
    }

    let (stem, extension) = split_extension(name);
    for suffix in 1..=MAX_NAME_SUFFIX_ATTEMPTS {
      let candidate = format!("{stem}{suffix}{extension}");
      if self.assigned.insert(candidate.clone()) {
        debug!(original = name, resolved = %candidate, "renamed colliding bundle");
        return Ok(candidate);
      }
    }

    Err(BuildError::NameCollision {
      name: name.to_string(),
      attempts: MAX_NAME_SUFFIX_ATTEMPTS,
    })
  }
}

/// Give every definition of a build a unique name, preserving order.
pub fn resolve_bundle_names(
  definitions: Vec<BundleInputDefinition>,
) -> BuildResult<Vec<BundleInputDefinition>> {
  let mut resolver = BundleNameResolver::new();
  definitions
    .into_iter()
    .map(|mut definition| {
      definition.name = resolver.resolve(&definition.name)?;
      Ok(definition)
    })
    .collect()
}

/// Derive the on-disk file name of a bundle for a naming style.
///
/// Directory components of the bundle name are kept for every style.
pub fn final_file_name(name: &str, hash: &str, style: BundleNamingStyle) -> String {
  let (directory, file) = match name.rsplit_once('/') {
    Some((directory, file)) => (Some(directory), file),
    None => (None, name),
  };
  let (stem, extension) = split_extension(file);

  let file = match style {
    BundleNamingStyle::Unchanged => file.to_string(),
    BundleNamingStyle::AppendHash => format!("{stem}_{hash}{extension}"),
    BundleNamingStyle::HashOnly => format!("{hash}{extension}"),
    BundleNamingStyle::FilenameHash => format!("{}{extension}", short_hash(name.as_bytes())),
  };

  match directory {
    Some(directory) => format!("{directory}/{file}"),
    None => file,
  }
}

/// First [`SHORT_HASH_LEN`] hex characters of the SHA-256 digest of `bytes`.
pub fn short_hash(bytes: &[u8]) -> String {
  let mut digest = hex::encode(Sha256::digest(bytes));
  digest.truncate(SHORT_HASH_LEN);
  digest
}

fn split_extension(name: &str) -> (&str, &str) {
  let file_start = name.rfind('/').map_or(0, |index| index + 1);
  match name[file_start..].rfind('.') {
    Some(0) | None => (name, ""),
    Some(dot) => name.split_at(file_start + dot),
  }
}
