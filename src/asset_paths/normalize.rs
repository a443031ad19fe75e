use std::borrow::Cow;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::models::BuildTarget;

/// Produce the canonical form of a bundle name.
///
/// Names are lower-cased and always use single forward slashes so that the same group
/// configuration yields the same bundle names regardless of the host platform.
pub fn normalize_bundle_name(name: &str) -> String {
    let mut normalized = name.to_lowercase().replace('\\', "/");
    while normalized.contains("//") {
        normalized = normalized.replace("//", "/");
    }
    normalized
}

fn profile_variable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[(\w+)\]").expect("invalid profile variable regex"))
}

/// Replace `[BuildTarget]` tokens with the platform name.
///
/// Unknown variables are left untouched so that runtime placeholders survive.
pub fn expand_profile_variables(value: &str, target: BuildTarget) -> String {
    let expanded: Cow<'_, str> =
        profile_variable_pattern().replace_all(value, |caps: &Captures<'_>| match &caps[1] {
            "BuildTarget" => target.as_str().to_string(),
            _ => caps[0].to_string(),
        });
    expanded.into_owned()
}

/// Join a load path prefix and a bundle file name into an internal id.
pub fn join_internal_id(base: &str, file_name: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        file_name.to_string()
    } else {
        format!("{base}/{file_name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_normalises_separators() {
        assert_eq!(
            normalize_bundle_name("Characters\\\\Heroes//Hero_Assets_All.bundle"),
            "characters/heroes/hero_assets_all.bundle"
        );
    }

    #[test]
    fn expands_build_target_and_keeps_unknown_variables() {
        assert_eq!(
            expand_profile_variables("ServerData/[BuildTarget]/[Version]", BuildTarget::Ios),
            "ServerData/iOS/[Version]"
        );
    }

    #[test]
    fn joins_internal_ids_with_single_slash() {
        assert_eq!(
            join_internal_id("{RuntimePath}/Android/", "a.bundle"),
            "{RuntimePath}/Android/a.bundle"
        );
        assert_eq!(join_internal_id("", "a.bundle"), "a.bundle");
    }
}
