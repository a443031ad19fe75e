//! Folder entry expansion.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::asset_paths::should_skip_file;
use crate::error::{BuildError, BuildResult};
use crate::models::AssetEntry;

/// A concrete file produced from an authored entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedAsset {
  /// Identifier of the file. Equal to the entry id for plain file entries.
  pub asset_id: String,
  /// Runtime address of the file.
  pub address: String,
  /// Source path relative to the content root.
  pub path: String,
}

/// Expand an entry into the files it stands for.
///
/// A file entry yields itself. A folder entry yields every file below it in sorted order,
/// addressed as `<entry address>/<relative path>`. Entries whose path does not exist on disk
/// are passed through unchanged; the engine decides whether that is fatal.
pub fn expand_entry(content_root: &Path, entry: &AssetEntry) -> BuildResult<Vec<ExpandedAsset>> {
  let source = content_root.join(&entry.path);
  if !source.is_dir() {
    return Ok(vec![ExpandedAsset {
      asset_id: entry.asset_id.clone(),
      address: entry.address.clone(),
      path: entry.path.replace('\\', "/"),
    }]);
  }

  let mut relatives = Vec::new();
  collect_files_recursively(&source, Path::new(""), &mut relatives)?;
  relatives.sort();
  debug!(
    entry = %entry.address,
    files = relatives.len(),
    "expanded folder entry"
  );

  let entry_path = entry.path.replace('\\', "/");
  let entry_path = entry_path.trim_end_matches('/');
  Ok(
    relatives
      .into_iter()
      .map(|relative| {
        let relative = relative.to_string_lossy().replace('\\', "/");
        ExpandedAsset {
          asset_id: format!("{}/{}", entry.asset_id, relative),
          address: format!("{}/{}", entry.address, relative),
          path: format!("{entry_path}/{relative}"),
        }
      })
      .collect(),
  )
}

fn collect_files_recursively(
  dir: &Path,
  relative_root: &Path,
  out: &mut Vec<PathBuf>,
) -> BuildResult<()> {
  let entries = fs::read_dir(dir).map_err(|err| BuildError::io(dir, err))?;
  for entry in entries {
    let entry = entry.map_err(|err| BuildError::io(dir, err))?;
    let file_name = entry.file_name();
    let name_str = file_name.to_string_lossy();
    if should_skip_file(&name_str) {
      continue;
    }

    let next_relative = if relative_root.as_os_str().is_empty() {
      PathBuf::from(&file_name)
    } else {
      relative_root.join(&file_name)
    };

    let file_type = entry
      .file_type()
      .map_err(|err| BuildError::io(entry.path(), err))?;
    if file_type.is_dir() {
      collect_files_recursively(&entry.path(), &next_relative, out)?;
    } else if file_type.is_file() {
      out.push(next_relative);
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  fn entry(address: &str, path: &str) -> AssetEntry {
    AssetEntry {
      address: address.into(),
      asset_id: "f00d".into(),
      path: path.into(),
      labels: Default::default(),
      dependencies: Vec::new(),
    }
  }

  #[test]
  fn file_entries_pass_through() {
    let dir = tempdir().unwrap();
    let expanded = expand_entry(dir.path(), &entry("hero", "chars\\hero.prefab")).unwrap();
    assert_eq!(expanded, vec![ExpandedAsset {
      asset_id: "f00d".into(),
      address: "hero".into(),
      path: "chars/hero.prefab".into(),
    }]);
  }

  #[test]
  fn folder_entries_expand_sorted_and_skip_side_files() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("ui/icons")).unwrap();
    fs::write(root.join("ui/panel.png"), b"p").unwrap();
    fs::write(root.join("ui/panel.png.meta"), b"m").unwrap();
    fs::write(root.join("ui/.hidden"), b"h").unwrap();
    fs::write(root.join("ui/icons/coin.png"), b"c").unwrap();

    let expanded = expand_entry(root, &entry("UI", "ui/")).unwrap();
    let addresses: Vec<_> = expanded.iter().map(|a| a.address.as_str()).collect();
    assert_eq!(addresses, vec!["UI/icons/coin.png", "UI/panel.png"]);
    assert_eq!(expanded[0].asset_id, "f00d/icons/coin.png");
    assert_eq!(expanded[0].path, "ui/icons/coin.png");
  }
}
