use std::sync::OnceLock;

use regex::Regex;

/// Source extensions treated as scenes when the configuration does not override them.
pub const DEFAULT_SCENE_EXTENSIONS: &[&str] = &[".unity", ".scene"];

fn ignored_file_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            vec![
                Regex::new(r"^\.").expect("invalid hidden file regex"),
                Regex::new(r"(?i)\.meta$").expect("invalid meta file regex"),
                Regex::new(r"~$").expect("invalid backup file regex"),
            ]
        })
        .as_slice()
}

/// Determine whether a file found while expanding a folder entry should be left out.
///
/// Hidden files, `.meta` side files and editor backups never become addressable assets.
pub fn should_skip_file(file_name: &str) -> bool {
    ignored_file_patterns()
        .iter()
        .any(|pattern| pattern.is_match(file_name))
}

/// Classify a source path as a scene by its extension.
pub fn is_scene_path<S: AsRef<str>>(path: &str, scene_extensions: &[S]) -> bool {
    let lower = path.to_lowercase();
    scene_extensions.iter().any(|extension| {
        let extension = extension.as_ref().to_lowercase();
        let extension = extension.trim_start_matches('.');
        !extension.is_empty()
            && lower
                .rsplit_once('.')
                .is_some_and(|(_, candidate)| candidate == extension)
    })
}
