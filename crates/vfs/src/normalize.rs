//! Path normalization with symlink resolution
//!
//! Collapses duplicate separators, `.` and `..`, and substitutes symlink
//! targets at every prefix. A substituted target may itself contain `..`
//! or further links, so passes repeat until the path stops changing.
//! Link cycles are cut off after [`MAX_SYMLINK_DEPTH`] passes.

use std::collections::HashMap;

use crate::error::{VfsError, VfsResult};

/// Maximum number of resolution passes (matches Linux `MAXSYMLINKS`)
pub const MAX_SYMLINK_DEPTH: usize = 40;

/// Source of symlink targets
pub trait LinkReader {
    /// Target of the link at `path`, or `None` if `path` is not a symlink
    fn read_link(&self, path: &str) -> Option<String>;
}

/// Reads links from the host filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct HostLinks;

impl LinkReader for HostLinks {
    fn read_link(&self, path: &str) -> Option<String> {
        std::fs::read_link(path)
            .ok()
            .map(|target| target.to_string_lossy().into_owned())
    }
}

/// Treats nothing as a symlink
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLinks;

impl LinkReader for NoLinks {
    fn read_link(&self, _path: &str) -> Option<String> {
        None
    }
}

/// Fixed link table, keyed by absolute link path
impl LinkReader for HashMap<String, String> {
    fn read_link(&self, path: &str) -> Option<String> {
        self.get(path).cloned()
    }
}

/// Apply `.`/`..` stack semantics to the segments of `path`
///
/// Popping past the root of an absolute path is a no-op. Leading `..` of a
/// relative path are kept.
fn collapse(path: &str) -> Vec<&str> {
    let absolute = path.starts_with('/');
    let mut stack: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match stack.last() {
                Some(&last) if last != ".." => {
                    stack.pop();
                }
                _ if absolute => {}
                _ => stack.push(".."),
            },
            other => stack.push(other),
        }
    }
    stack
}

fn finish(mut out: String, absolute: bool, trailing_slash: bool) -> String {
    if out.is_empty() {
        return if absolute { "/".to_string() } else { ".".to_string() };
    }
    if trailing_slash && !out.ends_with('/') {
        out.push('/');
    }
    out
}

/// Normalize without touching the filesystem (no symlink resolution)
pub fn normalize_lexical(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    let absolute = path.starts_with('/');
    let joined = collapse(path).join("/");
    let out = if absolute { format!("/{joined}") } else { joined };
    let out = if out == "/" { String::new() } else { out };
    finish(out, absolute, path.ends_with('/'))
}

/// One rebuild pass: collapse, then substitute symlinks prefix by prefix
fn resolve_pass(path: &str, links: &dyn LinkReader) -> String {
    let absolute = path.starts_with('/');
    let mut out = String::new();

    for segment in collapse(path) {
        let candidate = if out.is_empty() && !absolute {
            segment.to_string()
        } else {
            format!("{out}/{segment}")
        };

        if segment == ".." {
            out = candidate;
            continue;
        }

        match links.read_link(&candidate) {
            Some(target) if target.starts_with('/') => out = target,
            Some(target) if out.is_empty() && !absolute => out = target,
            Some(target) => out = format!("{out}/{target}"),
            None => out = candidate,
        }
    }

    if out == "/" {
        out.clear();
    }
    finish(out, absolute, path.ends_with('/'))
}

/// Normalize `path` against the host filesystem
pub fn normalize(path: &str) -> VfsResult<String> {
    normalize_with(path, &HostLinks)
}

/// Normalize `path`, reading symlinks through `links`
pub fn normalize_with(path: &str, links: &dyn LinkReader) -> VfsResult<String> {
    if path.is_empty() {
        return Ok(String::new());
    }

    let mut current = path.to_string();
    for _ in 0..=MAX_SYMLINK_DEPTH {
        let next = resolve_pass(&current, links);
        if next == current {
            return Ok(next);
        }
        current = next;
    }

    tracing::warn!("Symlink resolution did not settle for {}", path);
    Err(VfsError::too_many_symlinks(path))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::error::code;

    fn links(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_collapse_dots_and_slashes() {
        assert_eq!(normalize_with("/a//b/./c/../d", &NoLinks).unwrap(), "/a/b/d");
        assert_eq!(normalize_lexical("/a//b/./c/../d"), "/a/b/d");
    }

    #[test]
    fn test_pop_past_root() {
        assert_eq!(normalize_with("/..", &NoLinks).unwrap(), "/");
        assert_eq!(normalize_with("/../../x", &NoLinks).unwrap(), "/x");
        assert_eq!(normalize_lexical("/.."), "/");
    }

    #[test]
    fn test_relative_paths() {
        assert_eq!(normalize_lexical("a/./b/../c"), "a/c");
        assert_eq!(normalize_lexical("../x/.."), "..");
        assert_eq!(normalize_lexical("a/.."), ".");
        assert_eq!(normalize_lexical("a/b/"), "a/b/");
        assert_eq!(normalize_lexical(""), "");
    }

    #[test]
    fn test_absolute_symlink_replaces_prefix() {
        let table = links(&[("/bin", "/usr/bin")]);
        assert_eq!(normalize_with("/bin/ls", &table).unwrap(), "/usr/bin/ls");
    }

    #[test]
    fn test_relative_symlink_resolves_against_parent() {
        let table = links(&[("/opt/current", "releases/v2"), ("/srv/up", "../data")]);
        assert_eq!(
            normalize_with("/opt/current/bin", &table).unwrap(),
            "/opt/releases/v2/bin"
        );
        assert_eq!(normalize_with("/srv/up/x", &table).unwrap(), "/data/x");
    }

    #[test]
    fn test_chained_symlinks() {
        let table = links(&[("/a", "/b"), ("/b/c", "/d")]);
        assert_eq!(normalize_with("/a/c/e", &table).unwrap(), "/d/e");
    }

    #[test]
    fn test_symlink_loop_is_bounded() {
        let table = links(&[("/loop/a", "/loop/b"), ("/loop/b", "/loop/a")]);
        let err = normalize_with("/loop/a/x", &table).unwrap_err();
        assert_eq!(err.code(), code::TOO_MANY_SYMLINKS);
    }

    #[cfg(unix)]
    #[test]
    fn test_host_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir(root.join("real")).unwrap();
        std::os::unix::fs::symlink("real", root.join("alias")).unwrap();

        let input = format!("{}/alias/./file", root.display());
        let expected = format!("{}/real/file", root.display());
        assert_eq!(normalize(&input).unwrap(), expected);
    }

    fn clean_path() -> impl Strategy<Value = String> {
        (
            any::<bool>(),
            prop::collection::vec("[a-z][a-z0-9_]{0,7}", 0..6),
            any::<bool>(),
        )
            .prop_map(|(absolute, segments, trailing)| {
                let mut path = segments.join("/");
                if absolute {
                    path.insert(0, '/');
                }
                if trailing && !segments.is_empty() {
                    path.push('/');
                }
                path
            })
    }

    proptest! {
        #[test]
        fn clean_paths_are_fixed_points(path in clean_path()) {
            prop_assert_eq!(normalize_with(&path, &NoLinks).unwrap(), path.clone());
            prop_assert_eq!(normalize_lexical(&path), path);
        }

        #[test]
        fn normalization_is_idempotent(path in "[a-z./]{0,24}") {
            let once = normalize_with(&path, &NoLinks).unwrap();
            prop_assert_eq!(normalize_with(&once, &NoLinks).unwrap(), once.clone());
            prop_assert!(!once.contains("//"));
        }
    }
}
