//! tfm virtual filesystem
//!
//! Backends are registered by name and addressed with `backend::path`
//! URLs. The [`Vfs`] facade resolves a URL, dispatches to the backend and
//! reports failures as [`VfsError`] values carrying their own context.

pub mod backend;
pub mod error;
pub mod local;
pub mod memory;
pub mod mounts;
pub mod normalize;
pub mod registry;
pub mod url;
pub mod vfs;

pub use backend::{Backend, DirEntry, FileHandle, FileStat, FileType, MoveStrategy, OpenFlags};
pub use error::{ErrorContext, VfsError, VfsResult};
pub use local::LocalFs;
pub use memory::MemoryFs;
pub use mounts::MountPoint;
pub use normalize::{normalize, normalize_lexical, normalize_with, LinkReader};
pub use registry::{BackendHandle, PluginCatalog, PluginEntry, Registry, RegistryEvent};
pub use url::UrlResolver;
pub use vfs::{Vfs, VfsFile};
