//! VFS URL parsing - `backend::path`

use crate::error::{VfsError, VfsResult};
use crate::registry::{BackendHandle, Registry};

/// Separator between backend name and backend-local path
pub const DELIMITER: &str = "::";

/// Split a URL at the first `::` into `(backend, path)`
///
/// Pure string operation; does not consult the registry.
pub fn split(url: &str) -> Option<(&str, &str)> {
    url.split_once(DELIMITER)
}

/// Build a URL from its parts
pub fn join(backend: &str, path: &str) -> String {
    format!("{backend}{DELIMITER}{path}")
}

/// Resolves URLs against a registry
pub struct UrlResolver<'a> {
    registry: &'a Registry,
    default_backend: Option<&'a str>,
}

impl<'a> UrlResolver<'a> {
    pub const fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            default_backend: None,
        }
    }

    /// Route URLs without a `::` to `backend` instead of failing
    #[must_use]
    pub const fn with_default(mut self, backend: Option<&'a str>) -> Self {
        self.default_backend = backend;
        self
    }

    /// Resolve `url` to its backend and an owned backend-local path
    ///
    /// Unregistered backends are not loaded on demand.
    pub async fn parse(&self, url: &str) -> VfsResult<(BackendHandle, String)> {
        if url.is_empty() {
            return Err(VfsError::invalid_argument("empty URL"));
        }

        let (name, path) = match (split(url), self.default_backend) {
            (Some((name, path)), _) => (name, path),
            (None, Some(default)) => (default, url),
            (None, None) => {
                return Err(VfsError::invalid_argument(format!(
                    "'{url}' has no backend prefix (expected backend{DELIMITER}path)"
                )))
            }
        };

        if name.is_empty() {
            return Err(VfsError::bad_url(url));
        }

        let backend = self
            .registry
            .lookup(name)
            .await
            .ok_or_else(|| VfsError::plugin_not_found(name))?;

        Ok((backend, path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::code;

    #[test]
    fn test_split_first_delimiter() {
        assert_eq!(split("local::/tmp/a"), Some(("local", "/tmp/a")));
        assert_eq!(split("sftp::host::/x"), Some(("sftp", "host::/x")));
        assert_eq!(split("/tmp/a"), None);
        assert_eq!(join("local", "/etc"), "local::/etc");
    }

    #[tokio::test]
    async fn test_parse() {
        let registry = Registry::default();
        registry.load("local").await.unwrap();
        let resolver = UrlResolver::new(&registry);

        let (backend, path) = resolver.parse("local::/usr/share").await.unwrap();
        assert_eq!(backend.name(), "local");
        assert_eq!(path, "/usr/share");

        let err = resolver.parse("/usr/share").await.err().unwrap();
        assert_eq!(err.code(), code::INVALID_ARGUMENT);

        let err = resolver.parse("memory::/x").await.err().unwrap();
        assert_eq!(err.code(), code::PLUGIN_NOT_FOUND);
        assert!(registry.lookup("memory").await.is_none());

        let err = resolver.parse("::/x").await.err().unwrap();
        assert_eq!(err.code(), code::BAD_URL);
    }

    #[tokio::test]
    async fn test_default_backend() {
        let registry = Registry::default();
        registry.load("local").await.unwrap();
        let resolver = UrlResolver::new(&registry).with_default(Some("local"));

        let (backend, path) = resolver.parse("/home").await.unwrap();
        assert_eq!(backend.name(), "local");
        assert_eq!(path, "/home");
    }
}
