//! VFS error codes and contextual error descriptions
//!
//! Every failure carries a negative code from one of three ranges:
//! - `-1 ..= -999`: host OS errors, passed through as `-errno`
//! - `-1000 ..`: generic argument/operation errors
//! - `-1100 ..`: plugin errors
//!
//! Human-readable text comes from a static template table. Templates may
//! reference `${name}` placeholders which are filled from the
//! [`ErrorContext`] attached to the error value itself.

use std::io;

use thiserror::Error;

/// Codes with an absolute value below this are OS `errno` values
pub const SYSTEM_ERROR_LIMIT: i32 = 1000;

/// Error code constants
pub mod code {
    pub const FAILURE: i32 = -1000;
    pub const INVALID_ARGUMENT: i32 = -1001;
    pub const METHOD_NOT_FOUND: i32 = -1002;
    pub const TOO_MANY_SYMLINKS: i32 = -1003;
    pub const CROSS_BACKEND: i32 = -1004;

    pub const PLUGIN_FORMAT: i32 = -1100;
    pub const PLUGIN_INIT: i32 = -1101;
    pub const PLUGIN_NOT_FOUND: i32 = -1102;
    pub const BAD_URL: i32 = -1103;
}

/// Message templates, sorted by code (ascending) for binary search
static TEMPLATES: &[(i32, &str)] = &[
    (code::BAD_URL, "Malformed VFS URL '${url}'"),
    (code::PLUGIN_NOT_FOUND, "Plugin '${plugin}' is not loaded"),
    (code::PLUGIN_INIT, "Plugin '${module}' failed to initialize: ${reason}"),
    (code::PLUGIN_FORMAT, "Module '${module}' does not provide a VFS plugin entry point"),
    (code::CROSS_BACKEND, "Cannot ${method} between backends '${backend}' and '${other}'"),
    (code::TOO_MANY_SYMLINKS, "Too many levels of symbolic links in '${path}'"),
    (code::METHOD_NOT_FOUND, "Method '${method}' is not implemented by backend '${backend}'"),
    (code::INVALID_ARGUMENT, "Invalid argument: ${argument}"),
    (code::FAILURE, "Operation failed: ${reason}"),
];

/// Named string substitutions for error templates
///
/// Saving replaces the whole list; there is no merging with what was
/// stored before.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pairs: Vec<(String, String)>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from `(name, value)` pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut ctx = Self::new();
        ctx.save(pairs);
        ctx
    }

    /// Store a new list of substitutions, discarding the previous one
    pub fn save<I, K, V>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.pairs = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
    }

    /// Look up a substitution by name (first match wins)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Replace every `${name}` token in `template`
    ///
    /// Unknown names expand to the empty string. An unterminated `${` is
    /// copied through verbatim.
    pub fn interpolate(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    out.push_str(self.get(&after[..end]).unwrap_or(""));
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// Look up the template for `code`
fn template(code: i32) -> Option<&'static str> {
    TEMPLATES
        .binary_search_by_key(&code, |&(c, _)| c)
        .ok()
        .map(|idx| TEMPLATES[idx].1)
}

/// Host OS description of `errno`, without the "(os error N)" suffix
///
/// `None` when the host has no description for the number.
fn system_description(errno: i32) -> Option<String> {
    let text = io::Error::from_raw_os_error(errno).to_string();
    let text = match text.find(" (os error") {
        Some(idx) => &text[..idx],
        None => text.as_str(),
    };
    if text.starts_with("Unknown error") {
        return None;
    }
    Some(text.to_string())
}

/// Describe an error code, interpolating `ctx`
///
/// Returns `None` when neither the template table nor the host OS knows
/// the code.
pub fn describe(code: i32, ctx: &ErrorContext) -> Option<String> {
    if let Some(tpl) = template(code) {
        return Some(ctx.interpolate(tpl));
    }
    if code < 0 && code > -SYSTEM_ERROR_LIMIT {
        return system_description(-code).map(|text| ctx.interpolate(&text));
    }
    None
}

fn render(code: i32, ctx: &ErrorContext) -> String {
    describe(code, ctx).unwrap_or_else(|| format!("unknown VFS error {code}"))
}

fn render_os(errno: &i32, ctx: &ErrorContext) -> String {
    render(-*errno, ctx)
}

/// VFS error type
#[derive(Debug, Clone, Error)]
pub enum VfsError {
    #[error("{}", render(code::FAILURE, .0))]
    Failure(ErrorContext),

    #[error("{}", render(code::INVALID_ARGUMENT, .0))]
    InvalidArgument(ErrorContext),

    #[error("{}", render(code::METHOD_NOT_FOUND, .0))]
    MethodNotFound(ErrorContext),

    #[error("{}", render(code::TOO_MANY_SYMLINKS, .0))]
    TooManySymlinks(ErrorContext),

    #[error("{}", render(code::CROSS_BACKEND, .0))]
    CrossBackend(ErrorContext),

    #[error("{}", render(code::PLUGIN_FORMAT, .0))]
    PluginFormat(ErrorContext),

    #[error("{}", render(code::PLUGIN_INIT, .0))]
    PluginInit(ErrorContext),

    #[error("{}", render(code::PLUGIN_NOT_FOUND, .0))]
    PluginNotFound(ErrorContext),

    #[error("{}", render(code::BAD_URL, .0))]
    BadUrl(ErrorContext),

    /// Host OS error
    #[error("{}", render_os(.errno, .context))]
    Os { errno: i32, context: ErrorContext },
}

impl VfsError {
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure(ErrorContext::from_pairs([("reason", reason.into())]))
    }

    pub fn invalid_argument(argument: impl Into<String>) -> Self {
        Self::InvalidArgument(ErrorContext::from_pairs([("argument", argument.into())]))
    }

    pub fn method_not_found(method: &str, backend: &str) -> Self {
        Self::MethodNotFound(ErrorContext::from_pairs([
            ("method", method),
            ("backend", backend),
        ]))
    }

    pub fn too_many_symlinks(path: impl Into<String>) -> Self {
        Self::TooManySymlinks(ErrorContext::from_pairs([("path", path.into())]))
    }

    pub fn cross_backend(method: &str, backend: &str, other: &str) -> Self {
        Self::CrossBackend(ErrorContext::from_pairs([
            ("method", method),
            ("backend", backend),
            ("other", other),
        ]))
    }

    pub fn plugin_format(module: impl Into<String>) -> Self {
        Self::PluginFormat(ErrorContext::from_pairs([("module", module.into())]))
    }

    pub fn plugin_init(module: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PluginInit(ErrorContext::from_pairs([
            ("module", module.into()),
            ("reason", reason.into()),
        ]))
    }

    pub fn plugin_not_found(plugin: impl Into<String>) -> Self {
        Self::PluginNotFound(ErrorContext::from_pairs([("plugin", plugin.into())]))
    }

    pub fn bad_url(url: impl Into<String>) -> Self {
        Self::BadUrl(ErrorContext::from_pairs([("url", url.into())]))
    }

    pub fn os(errno: i32) -> Self {
        Self::Os {
            errno,
            context: ErrorContext::new(),
        }
    }

    /// Negative error code for this error
    pub const fn code(&self) -> i32 {
        match self {
            Self::Failure(_) => code::FAILURE,
            Self::InvalidArgument(_) => code::INVALID_ARGUMENT,
            Self::MethodNotFound(_) => code::METHOD_NOT_FOUND,
            Self::TooManySymlinks(_) => code::TOO_MANY_SYMLINKS,
            Self::CrossBackend(_) => code::CROSS_BACKEND,
            Self::PluginFormat(_) => code::PLUGIN_FORMAT,
            Self::PluginInit(_) => code::PLUGIN_INIT,
            Self::PluginNotFound(_) => code::PLUGIN_NOT_FOUND,
            Self::BadUrl(_) => code::BAD_URL,
            Self::Os { errno, .. } => -*errno,
        }
    }

    pub const fn context(&self) -> &ErrorContext {
        match self {
            Self::Failure(ctx)
            | Self::InvalidArgument(ctx)
            | Self::MethodNotFound(ctx)
            | Self::TooManySymlinks(ctx)
            | Self::CrossBackend(ctx)
            | Self::PluginFormat(ctx)
            | Self::PluginInit(ctx)
            | Self::PluginNotFound(ctx)
            | Self::BadUrl(ctx)
            | Self::Os { context: ctx, .. } => ctx,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::Failure(ctx)
            | Self::InvalidArgument(ctx)
            | Self::MethodNotFound(ctx)
            | Self::TooManySymlinks(ctx)
            | Self::CrossBackend(ctx)
            | Self::PluginFormat(ctx)
            | Self::PluginInit(ctx)
            | Self::PluginNotFound(ctx)
            | Self::BadUrl(ctx)
            | Self::Os { context: ctx, .. } => ctx,
        }
    }

    /// Replace the attached context
    #[must_use]
    pub fn with_context<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.context_mut().save(pairs);
        self
    }

    /// Render the human-readable description of this error
    pub fn describe(&self) -> Option<String> {
        describe(self.code(), self.context())
    }

    /// True for errors that come from the host OS with the given errno
    pub const fn is_errno(&self, errno: i32) -> bool {
        matches!(self, Self::Os { errno: e, .. } if *e == errno)
    }
}

impl From<io::Error> for VfsError {
    fn from(e: io::Error) -> Self {
        match e.raw_os_error() {
            Some(errno) => Self::os(errno),
            None => Self::failure(e.to_string()),
        }
    }
}

impl From<rustix::io::Errno> for VfsError {
    fn from(e: rustix::io::Errno) -> Self {
        Self::os(e.raw_os_error())
    }
}

impl From<tokio::task::JoinError> for VfsError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::failure(format!("blocking task failed: {e}"))
    }
}

/// VFS result type
pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_table_is_sorted() {
        assert!(TEMPLATES.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_interpolation() {
        let ctx = ErrorContext::from_pairs([("method", "chown"), ("backend", "ftp")]);
        let text = describe(code::METHOD_NOT_FOUND, &ctx).unwrap();
        assert_eq!(text, "Method 'chown' is not implemented by backend 'ftp'");
    }

    #[test]
    fn test_missing_name_expands_empty() {
        let ctx = ErrorContext::new();
        assert_eq!(ctx.interpolate("a${x}b"), "ab");
        assert_eq!(ctx.interpolate("tail ${open"), "tail ${open");
    }

    #[test]
    fn test_save_replaces_previous_context() {
        let mut ctx = ErrorContext::from_pairs([("method", "open"), ("backend", "local")]);
        ctx.save([("url", "bogus")]);
        assert_eq!(ctx.get("method"), None);
        assert_eq!(ctx.get("url"), Some("bogus"));
        assert_eq!(ctx.pairs().len(), 1);
    }

    #[test]
    fn test_system_fallback() {
        let text = describe(-2, &ErrorContext::new()).unwrap();
        assert!(!text.is_empty());
        assert!(!text.contains("os error"));
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(describe(-5000, &ErrorContext::new()), None);
        assert_eq!(describe(-1050, &ErrorContext::new()), None);
        assert_eq!(describe(-999, &ErrorContext::new()), None);
        assert_eq!(VfsError::os(999).to_string(), "unknown VFS error -999");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(VfsError::os(13).code(), -13);
        assert_eq!(VfsError::bad_url("x").code(), code::BAD_URL);
        let e = VfsError::method_not_found("link", "memory");
        assert_eq!(e.to_string(), "Method 'link' is not implemented by backend 'memory'");
        assert_eq!(e.context().get("backend"), Some("memory"));
    }

    #[test]
    fn test_io_error_conversion() {
        let e: VfsError = io::Error::from_raw_os_error(2).into();
        assert!(e.is_errno(2));
        assert_eq!(e.code(), -2);
    }
}
