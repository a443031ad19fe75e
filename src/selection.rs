//! Group selection: which authored groups take part in a build.
//!
//! Selection combines each group's `include_in_build` flag with an optional
//! `groups.local.json` holding include and exclude scopes. Scopes compare
//! case-insensitively, and a scope on a parent (`Characters`) covers its children
//! (`Characters/Heroes`).

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::models::AssetGroup;

/// Filter deciding whether a group is built.
pub trait GroupInclusion {
  /// Returns `true` when the group should be built.
  fn is_included(&self, group_name: &str) -> bool;
}

/// Selection file looked up in the project directory.
pub const DEFAULT_SELECTION_FILE: &str = "groups.local.json";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SelectionFile {
  #[serde(default)]
  include: Vec<String>,
  #[serde(default)]
  exclude: Vec<String>,
}

/// Include and exclude scopes read from a selection file.
#[derive(Debug, Clone, Default)]
pub struct GroupSelection {
  /// `None` keeps every group that is not excluded.
  include: Option<BTreeSet<String>>,
  exclude: BTreeSet<String>,
}

/// Errors raised while reading the selection file.
#[derive(Debug, Error)]
pub enum GroupSelectionError {
  /// The file exists but could not be read.
  #[error("failed to read {}: {source}", path.display())]
  Io {
    /// Selection file.
    path: PathBuf,
    /// Source I/O error.
    #[source]
    source: std::io::Error,
  },
  /// The file is not a valid selection document.
  #[error("failed to parse {}: {source}", path.display())]
  Parse {
    /// Selection file.
    path: PathBuf,
    /// Source parse error.
    #[source]
    source: serde_json::Error,
  },
}

impl GroupSelection {
  /// Selection from explicit scope lists. Blank scopes are ignored.
  pub fn new(
    include: impl IntoIterator<Item = String>,
    exclude: impl IntoIterator<Item = String>,
  ) -> Self {
    let include = scopes(include);
    Self {
      include: (!include.is_empty()).then_some(include),
      exclude: scopes(exclude),
    }
  }

  /// Read the selection file at `path`. A missing file selects every group.
  pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, GroupSelectionError> {
    let path = path.as_ref();
    let contents = match fs::read_to_string(path) {
      Ok(contents) => contents,
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "no selection file, building every group");
        return Ok(Self::default());
      }
      Err(source) => {
        return Err(GroupSelectionError::Io {
          path: path.to_path_buf(),
          source,
        });
      }
    };

    let file: SelectionFile =
      serde_json::from_str(&contents).map_err(|source| GroupSelectionError::Parse {
        path: path.to_path_buf(),
        source,
      })?;
    Ok(Self::new(file.include, file.exclude))
  }

  /// Whether no scope narrows the build.
  pub fn is_unfiltered(&self) -> bool {
    self.include.is_none() && self.exclude.is_empty()
  }
}

impl GroupInclusion for GroupSelection {
  fn is_included(&self, group_name: &str) -> bool {
    let name = group_name.to_lowercase();
    if self.exclude.iter().any(|scope| covers(scope, &name)) {
      return false;
    }
    self
      .include
      .as_ref()
      .is_none_or(|include| include.iter().any(|scope| covers(scope, &name)))
  }
}

/// Selection that keeps every group.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllGroups;

impl GroupInclusion for AllGroups {
  fn is_included(&self, _group_name: &str) -> bool {
    true
  }
}

/// Groups taking part in a build: flagged for inclusion and accepted by the selection.
pub fn selected_groups<'a, 's, S: GroupInclusion + ?Sized>(
  groups: &'a [AssetGroup],
  selection: &'s S,
) -> impl Iterator<Item = &'a AssetGroup> {
  groups
    .iter()
    .filter(move |group| group.include_in_build && selection.is_included(&group.name))
}

fn scopes(values: impl IntoIterator<Item = String>) -> BTreeSet<String> {
  values
    .into_iter()
    .map(|value| value.trim().trim_matches('/').to_lowercase())
    .filter(|value| !value.is_empty())
    .collect()
}

/// `scope` equals `name` or is one of its parent scopes.
fn covers(scope: &str, name: &str) -> bool {
  match name.strip_prefix(scope) {
    Some(rest) => rest.is_empty() || rest.starts_with('/'),
    None => false,
  }
}
