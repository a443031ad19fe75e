//! Writes catalogs, settings and bundle artifacts to their output directories.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use same_file::is_same_file;
use tracing::debug;

use crate::catalog::SerializedCatalog;
use crate::error::{BuildError, BuildResult};
use crate::settings::{LinkFile, RuntimeSettings, write_json, write_text};

/// File name of the retained type list.
pub const LINK_FILE_NAME: &str = "link.json";

/// Paths of a catalog written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenCatalog {
  /// Catalog JSON.
  pub json: PathBuf,
  /// Fingerprint file next to it.
  pub hash: PathBuf,
}

/// Output writer rooted at the runtime data directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
  runtime_dir: PathBuf,
}

impl ArtifactWriter {
  /// Writer placing runtime files below `runtime_dir`.
  pub fn new(runtime_dir: impl Into<PathBuf>) -> Self {
    Self {
      runtime_dir: runtime_dir.into(),
    }
  }

  /// Directory runtime files are written to.
  pub fn runtime_dir(&self) -> &Path {
    &self.runtime_dir
  }

  /// Write `<stem>.json` and `<stem>.hash`.
  pub fn write_catalog(&self, stem: &str, catalog: &SerializedCatalog) -> BuildResult<WrittenCatalog> {
    let written = WrittenCatalog {
      json: self.runtime_dir.join(format!("{stem}.json")),
      hash: self.runtime_dir.join(format!("{stem}.hash")),
    };
    write_text(&written.json, &catalog.json)?;
    write_text(&written.hash, &catalog.fingerprint)?;
    debug!(path = %written.json.display(), "wrote catalog");
    Ok(written)
  }

  /// Copy a written catalog and its hash into `directory`.
  pub fn publish_catalog(&self, written: &WrittenCatalog, directory: &Path) -> BuildResult<()> {
    for source in [&written.json, &written.hash] {
      let Some(file_name) = source.file_name() else {
        continue;
      };
      install_artifact(source, &directory.join(file_name))?;
    }
    Ok(())
  }

  /// Write the runtime settings document as `file_name`.
  pub fn write_settings(&self, file_name: &str, settings: &RuntimeSettings) -> BuildResult<PathBuf> {
    let path = self.runtime_dir.join(file_name);
    write_json(&path, settings, "runtime settings")?;
    Ok(path)
  }

  /// Write the retained type list.
  pub fn write_link(&self, types: &[String]) -> BuildResult<PathBuf> {
    let path = self.runtime_dir.join(LINK_FILE_NAME);
    write_json(
      &path,
      &LinkFile {
        types: types.to_vec(),
      },
      "link file",
    )?;
    Ok(path)
  }
}

/// Copy `source` to `destination`, creating parent directories.
///
/// The destination always ends up as its own file. A stale file or a link sharing storage
/// with another path is removed first, so later writes to `source` never reach it.
pub fn install_artifact(source: &Path, destination: &Path) -> BuildResult<()> {
  if let Some(parent) = destination.parent() {
    fs::create_dir_all(parent).map_err(|err| BuildError::io(parent, err))?;
  }
  copy_fresh(source, destination).map_err(|err| BuildError::io(destination, err))
}

fn copy_fresh(source: &Path, destination: &Path) -> std::io::Result<()> {
  match fs::symlink_metadata(destination) {
    Ok(_) => {
      if is_same_file(source, destination)?
        && fs::canonicalize(source)? == fs::canonicalize(destination)?
      {
        return Ok(());
      }
      fs::remove_file(destination)?;
    }
    Err(err) if err.kind() == ErrorKind::NotFound => {}
    Err(err) => return Err(err),
  }
  fs::copy(source, destination).map(|_| ())
}
