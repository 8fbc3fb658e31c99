use std::io::SeekFrom;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::error::{VfsError, VfsResult};

/// File type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
    Symlink,
    /// FIFOs, sockets and device nodes
    Special,
}

impl FileType {
    pub const fn is_file(self) -> bool {
        matches!(self, Self::File)
    }

    pub const fn is_dir(self) -> bool {
        matches!(self, Self::Directory)
    }

    pub const fn is_symlink(self) -> bool {
        matches!(self, Self::Symlink)
    }
}

/// File metadata returned by stat operations
#[derive(Debug, Clone)]
pub struct FileStat {
    pub kind: FileType,
    pub size: u64,
    /// Unix permission bits (e.g. 0o644)
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    /// Last access time (if available)
    pub accessed: Option<SystemTime>,
    /// Last modification time (if available)
    pub modified: Option<SystemTime>,
}

impl FileStat {
    /// Create a simple file stat (for backends that don't support full metadata)
    pub const fn file(size: u64) -> Self {
        Self {
            kind: FileType::File,
            size,
            mode: 0o644,
            nlink: 1,
            uid: 0,
            gid: 0,
            accessed: None,
            modified: None,
        }
    }

    /// Create a simple directory stat
    pub const fn dir() -> Self {
        Self {
            kind: FileType::Directory,
            size: 0,
            mode: 0o755,
            nlink: 2,
            uid: 0,
            gid: 0,
            accessed: None,
            modified: None,
        }
    }

    pub const fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    pub const fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    pub const fn is_symlink(&self) -> bool {
        self.kind.is_symlink()
    }
}

/// Directory entry returned by `scandir`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name (not full path)
    pub name: String,
    pub kind: FileType,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, kind: FileType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Open file flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    /// Create if not exists
    pub create: bool,
    /// Truncate on open
    pub truncate: bool,
    /// Exclusive create (fail if exists)
    pub exclusive: bool,
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self::read_only()
    }
}

impl OpenFlags {
    pub const fn read_only() -> Self {
        Self {
            read: true,
            write: false,
            append: false,
            create: false,
            truncate: false,
            exclusive: false,
        }
    }

    /// Write, create and truncate
    pub const fn write_new() -> Self {
        Self {
            read: false,
            write: true,
            append: false,
            create: true,
            truncate: true,
            exclusive: false,
        }
    }

    pub const fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            append: false,
            create: false,
            truncate: false,
            exclusive: false,
        }
    }

    #[must_use]
    pub const fn with_append(mut self) -> Self {
        self.append = true;
        self
    }

    #[must_use]
    pub const fn with_exclusive(mut self) -> Self {
        self.create = true;
        self.exclusive = true;
        self
    }
}

/// How a move between two paths should be carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveStrategy {
    /// Same filesystem: a single rename suffices
    Rename,
    /// Different filesystems: copy then delete the source
    Copy,
}

/// Backend-private state of an open file
///
/// Returned by [`Backend::open`]. The VFS pairs it with the backend that
/// produced it; dropping it without `close` releases the host resources
/// but skips any flush the backend does on close.
#[async_trait]
pub trait FileHandle: Send + Sync {
    /// Read up to `len` bytes from the current position; empty at EOF
    async fn read(&mut self, len: usize) -> VfsResult<Vec<u8>>;

    /// Write `data` at the current position, returning bytes written
    async fn write(&mut self, data: &[u8]) -> VfsResult<usize>;

    /// Reposition the file offset, returning the new offset
    async fn lseek(&mut self, pos: SeekFrom) -> VfsResult<u64>;

    /// Flush and release the handle
    async fn close(self: Box<Self>) -> VfsResult<()>;
}

/// VFS backend trait - every operation a plugin can service
///
/// Only [`Backend::name`] is required. Every other operation defaults to a
/// `MethodNotFound` error naming the method and the backend, so a plugin
/// implements exactly the subset its storage supports.
///
/// Paths are backend-local: the `backend::` URL prefix has already been
/// stripped by the VFS.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Registry key for this backend
    fn name(&self) -> &str;

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle hooks
    // ─────────────────────────────────────────────────────────────────────────

    /// Called once after the backend is built, before it is registered
    async fn on_load(&self) -> VfsResult<()> {
        Ok(())
    }

    /// Called once before the backend is removed from the registry
    async fn on_unload(&self) {}

    // ─────────────────────────────────────────────────────────────────────────
    // File handles
    // ─────────────────────────────────────────────────────────────────────────

    async fn open(&self, _path: &str, _flags: OpenFlags, _mode: u32) -> VfsResult<Box<dyn FileHandle>> {
        Err(VfsError::method_not_found("open", self.name()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Namespace operations
    // ─────────────────────────────────────────────────────────────────────────

    async fn unlink(&self, _path: &str) -> VfsResult<()> {
        Err(VfsError::method_not_found("unlink", self.name()))
    }

    async fn mkdir(&self, _path: &str, _mode: u32) -> VfsResult<()> {
        Err(VfsError::method_not_found("mkdir", self.name()))
    }

    async fn rmdir(&self, _path: &str) -> VfsResult<()> {
        Err(VfsError::method_not_found("rmdir", self.name()))
    }

    async fn rename(&self, _src: &str, _dst: &str) -> VfsResult<()> {
        Err(VfsError::method_not_found("rename", self.name()))
    }

    /// Create a symlink at `linkpath` whose content is `target`
    async fn symlink(&self, _target: &str, _linkpath: &str) -> VfsResult<()> {
        Err(VfsError::method_not_found("symlink", self.name()))
    }

    /// Create a hard link `newpath` referring to `oldpath`
    async fn link(&self, _oldpath: &str, _newpath: &str) -> VfsResult<()> {
        Err(VfsError::method_not_found("link", self.name()))
    }

    async fn readlink(&self, _path: &str) -> VfsResult<String> {
        Err(VfsError::method_not_found("readlink", self.name()))
    }

    /// Create a filesystem node; `mode` carries both type and permission bits
    async fn mknod(&self, _path: &str, _mode: u32, _dev: u64) -> VfsResult<()> {
        Err(VfsError::method_not_found("mknod", self.name()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metadata
    // ─────────────────────────────────────────────────────────────────────────

    /// Metadata, following symlinks
    async fn stat(&self, _path: &str) -> VfsResult<FileStat> {
        Err(VfsError::method_not_found("stat", self.name()))
    }

    /// Metadata of the path itself, not following symlinks
    async fn lstat(&self, _path: &str) -> VfsResult<FileStat> {
        Err(VfsError::method_not_found("lstat", self.name()))
    }

    /// List directory contents, excluding `.` and `..`
    async fn scandir(&self, _path: &str) -> VfsResult<Vec<DirEntry>> {
        Err(VfsError::method_not_found("scandir", self.name()))
    }

    async fn chmod(&self, _path: &str, _mode: u32) -> VfsResult<()> {
        Err(VfsError::method_not_found("chmod", self.name()))
    }

    /// Change ownership; `None` leaves that id unchanged
    async fn chown(&self, _path: &str, _uid: Option<u32>, _gid: Option<u32>) -> VfsResult<()> {
        Err(VfsError::method_not_found("chown", self.name()))
    }

    /// Set access/modification times with one-second resolution
    async fn utime(&self, _path: &str, _atime: i64, _mtime: i64) -> VfsResult<()> {
        Err(VfsError::method_not_found("utime", self.name()))
    }

    /// Set access/modification times with sub-second resolution
    async fn utimes(&self, _path: &str, _atime: SystemTime, _mtime: SystemTime) -> VfsResult<()> {
        Err(VfsError::method_not_found("utimes", self.name()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Optional: move planning
    // ─────────────────────────────────────────────────────────────────────────

    /// Decide whether moving `src` to `dst` can be a rename
    ///
    /// `None` means the backend has no opinion; the VFS then plans a copy.
    async fn move_strategy(&self, _src: &str, _dst: &str) -> Option<VfsResult<MoveStrategy>> {
        None
    }
}
