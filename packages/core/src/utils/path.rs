//! Path algebra for the node hierarchy
//!
//! Paths are absolute, `/`-separated and never end with a separator (the root
//! is the only path written as `/`). Node names are restricted to ASCII
//! letters, digits and `-`.

use crate::services::error::{RepositoryError, Result};
use regex::Regex;
use std::sync::LazyLock;

/// Path of the root node
pub const ROOT_PATH: &str = "/";

/// Longest path a node may carry
pub const MAX_PATH_LENGTH: usize = 4000;

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9\-]+$").unwrap());

static PATH_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/$|^(?:/[a-zA-Z0-9\-]+)+$").unwrap());

/// Check a single node name against the allowed character set
pub fn is_valid_name(name: &str) -> bool {
    NAME_PATTERN.is_match(name)
}

/// Check a complete absolute path
pub fn is_valid_path(path: &str) -> bool {
    path.len() <= MAX_PATH_LENGTH && PATH_PATTERN.is_match(path)
}

pub fn validate_name(name: &str) -> Result<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(RepositoryError::invalid_name(name))
    }
}

pub fn validate_path(path: &str) -> Result<()> {
    if path.len() > MAX_PATH_LENGTH {
        return Err(RepositoryError::invalid_path(
            path,
            format!("paths must not be longer than {} characters", MAX_PATH_LENGTH),
        ));
    }
    if !PATH_PATTERN.is_match(path) {
        return Err(RepositoryError::invalid_path(
            path,
            "expected an absolute path built from valid node names",
        ));
    }
    Ok(())
}

/// Resolve `path` against an optional absolute `base` path.
///
/// Handles `.` and `..` segments and tolerates a single trailing separator.
/// Relative input without a base, empty input, doubled separators and `..`
/// above the root are rejected.
pub fn normalize(base: Option<&str>, path: &str) -> Result<String> {
    if path.is_empty() {
        return Err(RepositoryError::invalid_path(path, "path is empty"));
    }
    if path.contains("//") {
        return Err(RepositoryError::invalid_path(path, "empty path segment"));
    }

    let absolute = if path.starts_with('/') {
        path.to_string()
    } else {
        let base = base.ok_or_else(|| {
            RepositoryError::invalid_path(path, "relative path given without a base path")
        })?;
        if !base.starts_with('/') {
            return Err(RepositoryError::invalid_path(base, "base path must be absolute"));
        }
        join(base, path)
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in absolute.split('/').skip(1) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(RepositoryError::invalid_path(path, "path leaves the root"));
                }
            }
            name => segments.push(name),
        }
    }

    if segments.is_empty() {
        Ok(ROOT_PATH.to_string())
    } else {
        Ok(format!("/{}", segments.join("/")))
    }
}

/// Number of segments below the root; the root has depth 0
pub fn depth(path: &str) -> usize {
    if path == ROOT_PATH {
        0
    } else {
        path.matches('/').count()
    }
}

/// Parent path; the root is its own parent
pub fn parent_of(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => ROOT_PATH.to_string(),
        Some(pos) => path[..pos].to_string(),
    }
}

/// Last segment of a path; empty for the root
pub fn name_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[pos + 1..],
        None => path,
    }
}

/// Path of the child called `name` below `parent`
pub fn child_path(parent: &str, name: &str) -> String {
    join(parent, name)
}

/// True when `path` lies strictly below `ancestor`
pub fn is_descendant_of(path: &str, ancestor: &str) -> bool {
    if ancestor == ROOT_PATH {
        return path != ROOT_PATH;
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

/// Replace the `old_prefix` of `path` with `new_prefix`.
///
/// `path` must be `old_prefix` itself or one of its descendants.
pub fn rebase(path: &str, old_prefix: &str, new_prefix: &str) -> Option<String> {
    if path == old_prefix {
        return Some(new_prefix.to_string());
    }
    if !is_descendant_of(path, old_prefix) {
        return None;
    }
    let rest = if old_prefix == ROOT_PATH {
        &path[1..]
    } else {
        &path[old_prefix.len() + 1..]
    };
    Some(join(new_prefix, rest))
}

fn join(base: &str, relative: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, relative)
    } else {
        format!("{}/{}", base, relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_resolves_dots() {
        assert_eq!(normalize(None, "/a/./b/../c").unwrap(), "/a/c");
        assert_eq!(normalize(Some("/a/b"), "..").unwrap(), "/a");
        assert_eq!(normalize(Some("/a/b"), ".").unwrap(), "/a/b");
        assert_eq!(normalize(Some("/"), "news").unwrap(), "/news");
        assert!(normalize(Some("/a"), "../../").is_err());
        assert_eq!(normalize(None, "/a/b/").unwrap(), "/a/b");
    }

    #[test]
    fn test_normalize_rejects_malformed_input() {
        assert!(matches!(
            normalize(None, "relative"),
            Err(RepositoryError::InvalidPath { .. })
        ));
        assert!(matches!(
            normalize(None, "/a//b"),
            Err(RepositoryError::InvalidPath { .. })
        ));
        assert!(matches!(normalize(Some("/"), ""), Err(RepositoryError::InvalidPath { .. })));
    }

    #[test]
    fn test_parent_and_name() {
        assert_eq!(parent_of("/"), "/");
        assert_eq!(parent_of("/a"), "/");
        assert_eq!(parent_of("/a/b/c"), "/a/b");
        assert_eq!(name_of("/"), "");
        assert_eq!(name_of("/a/b/c"), "c");
    }

    #[test]
    fn test_depth() {
        assert_eq!(depth("/"), 0);
        assert_eq!(depth("/news"), 1);
        assert_eq!(depth("/sites/news"), 2);
    }

    #[test]
    fn test_names_and_paths() {
        assert!(is_valid_name("news-2024"));
        assert!(!is_valid_name("news_2024"));
        assert!(!is_valid_name(""));
        assert!(is_valid_path("/"));
        assert!(is_valid_path("/a/b-c"));
        assert!(!is_valid_path("/a/"));
        assert!(!is_valid_path("a/b"));
        let too_long = format!("/{}", "a".repeat(MAX_PATH_LENGTH));
        assert!(!is_valid_path(&too_long));
        assert!(validate_path(&too_long).is_err());
    }

    #[test]
    fn test_rebase() {
        assert_eq!(rebase("/a/b/c", "/a/b", "/x").as_deref(), Some("/x/c"));
        assert_eq!(rebase("/a/b", "/a/b", "/x/y").as_deref(), Some("/x/y"));
        assert_eq!(rebase("/a/bc", "/a/b", "/x"), None);
        assert!(is_descendant_of("/a/b", "/"));
        assert!(!is_descendant_of("/ab", "/a"));
    }

    proptest! {
        #[test]
        fn prop_parent_and_name_reconstruct_path(
            segments in proptest::collection::vec("[a-z0-9][a-z0-9-]{0,7}", 1..6)
        ) {
            let path = format!("/{}", segments.join("/"));
            prop_assert_eq!(child_path(&parent_of(&path), name_of(&path)), path.clone());
            prop_assert_eq!(depth(&path), segments.len());
            prop_assert_eq!(normalize(None, &path).unwrap(), path);
        }
    }
}
