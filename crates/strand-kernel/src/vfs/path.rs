//! `/`-separated relative path helpers shared by the in-process backends.

use super::error::{VfsError, VfsResult};

/// Normalize a relative path: drop leading `/`, `.` components and empty
/// segments, resolve `..`. The root is the empty string.
///
/// Fails if `..` climbs above the root or the path contains a NUL.
pub fn normalize(path: &str) -> VfsResult<String> {
    if path.contains('\0') {
        return Err(VfsError::invalid_path(path.replace('\0', "\\0")));
    }
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(VfsError::path_escapes_root(path));
                }
            }
            name => parts.push(name),
        }
    }
    Ok(parts.join("/"))
}

/// Join a base and a relative path, then normalize.
pub fn join(base: &str, path: &str) -> VfsResult<String> {
    if base.is_empty() {
        normalize(path)
    } else {
        normalize(&format!("{base}/{path}"))
    }
}

/// Parent of a normalized path (`None` for the root).
pub fn parent(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rsplit_once('/').map_or("", |(parent, _)| parent))
}

/// Last component of a normalized path.
pub fn file_name(path: &str) -> Option<&str> {
    if path.is_empty() {
        None
    } else {
        Some(path.rsplit_once('/').map_or(path, |(_, name)| name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/a/b/c").unwrap(), "a/b/c");
        assert_eq!(normalize("a/./b//c/").unwrap(), "a/b/c");
        assert_eq!(normalize("a/b/../c").unwrap(), "a/c");
        assert_eq!(normalize(".").unwrap(), "");
        assert!(matches!(normalize("../x"), Err(VfsError::PathEscapesRoot(_))));
        assert!(matches!(normalize("a\0b"), Err(VfsError::InvalidPath(_))));
    }

    #[test]
    fn test_parent_and_name() {
        assert_eq!(parent("tbl/col/READ"), Some("tbl/col"));
        assert_eq!(parent("READ"), Some(""));
        assert_eq!(parent(""), None);
        assert_eq!(file_name("tbl/col"), Some("col"));
        assert_eq!(file_name("col"), Some("col"));
        assert_eq!(file_name(""), None);
    }

    #[test]
    fn test_join() {
        assert_eq!(join("", "x").unwrap(), "x");
        assert_eq!(join("a/b", "../c").unwrap(), "a/c");
        assert_eq!(join("a", ".").unwrap(), "a");
    }
}
