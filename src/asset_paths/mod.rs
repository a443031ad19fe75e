//! Helpers for normalising paths and classifying authored assets.
//!
//! Bundle names, internal ids and profile variables are handled in `normalize`; file
//! classification (scenes, ignored side files) lives in `filters`, and folder entries are
//! expanded into their underlying files by `expand`.

mod expand;
mod filters;
mod normalize;

pub use expand::{ExpandedAsset, expand_entry};
pub use filters::{DEFAULT_SCENE_EXTENSIONS, is_scene_path, should_skip_file};
pub use normalize::{expand_profile_variables, join_internal_id, normalize_bundle_name};
