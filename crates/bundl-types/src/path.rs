//! Slash-separated resource paths.
//!
//! Paths are relative to the storage root, never start or end with `/`, and
//! the empty string names the root itself. Manifest paths and request
//! collection paths are both funnelled through [`normalize_path`] before they
//! reach the storage gateway.
//!
//! Valid file names:
//! - Must be non-empty and not `.` or `..`
//! - Must not contain `/`, `\` or control characters
//! - Must not end with whitespace

use crate::error::TypeError;

/// Split a path into `(folder, name)` at the last slash.
///
/// Leading and trailing slashes are ignored. A path without a slash lives in
/// the root folder, which is returned as `""`.
///
/// ```
/// use bundl_types::split_path;
///
/// assert_eq!(split_path("docs/a.txt"), ("docs", "a.txt"));
/// assert_eq!(split_path("/a.txt"), ("", "a.txt"));
/// ```
pub fn split_path(path: &str) -> (&str, &str) {
    let trimmed = path.trim_matches('/');
    match trimmed.rsplit_once('/') {
        Some((folder, name)) => (folder, name),
        None => ("", trimmed),
    }
}

/// Join two path fragments with a single slash.
pub fn join_path(base: &str, rel: &str) -> String {
    let base = base.trim_matches('/');
    let rel = rel.trim_matches('/');
    match (base.is_empty(), rel.is_empty()) {
        (true, _) => rel.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base}/{rel}"),
    }
}

/// Canonicalise a path: collapse repeated slashes, drop `.` components and
/// reject `..` so no path can climb above the root.
pub fn normalize_path(path: &str) -> Result<String, TypeError> {
    let mut components = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => continue,
            ".." => return Err(TypeError::path(path, "must not contain '..'")),
            c if c.chars().any(char::is_control) => {
                return Err(TypeError::path(path, "contains control characters"));
            }
            c => components.push(c),
        }
    }
    Ok(components.join("/"))
}

/// Validate the final component of a path before a file is created there.
pub fn validate_file_name(name: &str) -> Result<(), TypeError> {
    if name.is_empty() {
        return Err(TypeError::name(name, "file name must not be empty"));
    }
    if name == "." || name == ".." {
        return Err(TypeError::name(name, "file name must not be '.' or '..'"));
    }
    if let Some(ch) = name.chars().find(|c| *c == '/' || *c == '\\' || c.is_control()) {
        return Err(TypeError::name(name, format!("contains forbidden character: {ch:?}")));
    }
    if name.ends_with(char::is_whitespace) {
        return Err(TypeError::name(name, "must not end with whitespace"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn split_nested() {
        assert_eq!(split_path("a/b/c.txt"), ("a/b", "c.txt"));
        assert_eq!(split_path("c.txt"), ("", "c.txt"));
        assert_eq!(split_path("/a/b/"), ("a", "b"));
        assert_eq!(split_path(""), ("", ""));
    }

    #[test]
    fn join_handles_empty_sides() {
        assert_eq!(join_path("", "a.txt"), "a.txt");
        assert_eq!(join_path("alice", ""), "alice");
        assert_eq!(join_path("/alice/", "/docs/a.txt"), "alice/docs/a.txt");
    }

    #[test]
    fn normalize_collapses() {
        assert_eq!(normalize_path("//a/./b//c").unwrap(), "a/b/c");
        assert_eq!(normalize_path("/").unwrap(), "");
    }

    #[test]
    fn normalize_rejects_parent() {
        let err = normalize_path("a/../../etc").unwrap_err();
        assert!(matches!(err, TypeError::InvalidPath { .. }));
    }

    #[test]
    fn normalize_rejects_control() {
        assert!(normalize_path("a/b\0c").is_err());
    }

    #[test]
    fn file_names() {
        assert!(validate_file_name("report.pdf").is_ok());
        assert!(validate_file_name("with space.txt").is_ok());
        assert!(validate_file_name("").is_err());
        assert!(validate_file_name("..").is_err());
        assert!(validate_file_name("a\\b").is_err());
        assert!(validate_file_name("trailing ").is_err());
        assert!(validate_file_name("tab\there").is_err());
    }

    proptest! {
        #[test]
        fn split_then_join_is_identity(
            parts in proptest::collection::vec("[a-z0-9]{1,8}", 1..5)
        ) {
            let path = parts.join("/");
            let (folder, name) = split_path(&path);
            prop_assert_eq!(join_path(folder, name), path);
        }
    }
}
