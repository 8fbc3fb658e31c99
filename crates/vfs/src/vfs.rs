//! VFS facade - POSIX-like operations on `backend::path` URLs
//!
//! Every call resolves its URL through the registry, hands the
//! backend-local path to the backend and returns the backend's result
//! untouched. Operations a backend does not implement come back as
//! `MethodNotFound` carrying the method and backend names.

use std::io::SeekFrom;
use std::time::SystemTime;

use crate::backend::{DirEntry, FileHandle, FileStat, FileType, MoveStrategy, OpenFlags};
use crate::error::{VfsError, VfsResult};
use crate::registry::{BackendHandle, Registry};
use crate::url::{self, UrlResolver};

/// Chunk size used when copying between backends
const COPY_CHUNK: usize = 64 * 1024;

/// An open file: the backend that opened it plus its private handle
pub struct VfsFile {
    backend: BackendHandle,
    handle: Box<dyn FileHandle>,
}

impl std::fmt::Debug for VfsFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VfsFile")
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}

impl VfsFile {
    /// Name of the backend serving this file
    pub fn backend(&self) -> &str {
        self.backend.name()
    }

    pub async fn read(&mut self, len: usize) -> VfsResult<Vec<u8>> {
        self.handle.read(len).await
    }

    pub async fn write(&mut self, data: &[u8]) -> VfsResult<usize> {
        self.handle.write(data).await
    }

    pub async fn lseek(&mut self, pos: SeekFrom) -> VfsResult<u64> {
        self.handle.lseek(pos).await
    }

    /// Release the handle; the file cannot be used afterwards
    pub async fn close(self) -> VfsResult<()> {
        self.handle.close().await
    }
}

/// Reject empty required arguments before touching the registry
fn require(value: &str, what: &str) -> VfsResult<()> {
    if value.is_empty() {
        return Err(VfsError::invalid_argument(what));
    }
    Ok(())
}

/// The VFS entry point
pub struct Vfs {
    registry: Registry,
    default_backend: Option<String>,
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new(Registry::default())
    }
}

impl Vfs {
    pub const fn new(registry: Registry) -> Self {
        Self {
            registry,
            default_backend: None,
        }
    }

    /// Route URLs without a `::` prefix to `backend`
    #[must_use]
    pub fn with_default_backend(mut self, backend: Option<String>) -> Self {
        self.default_backend = backend;
        self
    }

    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn default_backend(&self) -> Option<&str> {
        self.default_backend.as_deref()
    }

    async fn resolve(&self, url: &str) -> VfsResult<(BackendHandle, String)> {
        UrlResolver::new(&self.registry)
            .with_default(self.default_backend.as_deref())
            .parse(url)
            .await
    }

    /// Backend-local form of a destination argument
    ///
    /// Plain paths pass through. A URL naming the source backend has its
    /// prefix stripped; a URL naming any other backend is refused.
    fn destination<'a>(method: &str, backend: &BackendHandle, dst: &'a str) -> VfsResult<&'a str> {
        match url::split(dst) {
            Some((name, path)) if name == backend.name() => Ok(path),
            Some((name, _)) => Err(VfsError::cross_backend(method, backend.name(), name)),
            None => Ok(dst),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // File handles
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn open(&self, url: &str, flags: OpenFlags, mode: u32) -> VfsResult<VfsFile> {
        require(url, "url")?;
        let (backend, path) = self.resolve(url).await?;
        tracing::debug!("vfs open {} on {} ({:?})", path, backend.name(), flags);
        let handle = backend.open(&path, flags, mode).await?;
        Ok(VfsFile { backend, handle })
    }

    pub async fn close(&self, file: VfsFile) -> VfsResult<()> {
        tracing::debug!("vfs close on {}", file.backend());
        file.close().await
    }

    pub async fn read(&self, file: &mut VfsFile, len: usize) -> VfsResult<Vec<u8>> {
        file.read(len).await
    }

    pub async fn write(&self, file: &mut VfsFile, data: &[u8]) -> VfsResult<usize> {
        file.write(data).await
    }

    pub async fn lseek(&self, file: &mut VfsFile, pos: SeekFrom) -> VfsResult<u64> {
        file.lseek(pos).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Namespace operations
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn unlink(&self, url: &str) -> VfsResult<()> {
        require(url, "url")?;
        let (backend, path) = self.resolve(url).await?;
        tracing::debug!("vfs unlink {} on {}", path, backend.name());
        backend.unlink(&path).await
    }

    pub async fn mkdir(&self, url: &str, mode: u32) -> VfsResult<()> {
        require(url, "url")?;
        let (backend, path) = self.resolve(url).await?;
        tracing::debug!("vfs mkdir {} on {}", path, backend.name());
        backend.mkdir(&path, mode).await
    }

    pub async fn rmdir(&self, url: &str) -> VfsResult<()> {
        require(url, "url")?;
        let (backend, path) = self.resolve(url).await?;
        tracing::debug!("vfs rmdir {} on {}", path, backend.name());
        backend.rmdir(&path).await
    }

    /// Rename within one backend; `dst` is a path or a same-backend URL
    pub async fn rename(&self, src_url: &str, dst: &str) -> VfsResult<()> {
        require(src_url, "source")?;
        require(dst, "destination")?;
        let (backend, path) = self.resolve(src_url).await?;
        let dst = Self::destination("rename", &backend, dst)?;
        tracing::debug!("vfs rename {} -> {} on {}", path, dst, backend.name());
        backend.rename(&path, dst).await
    }

    /// Create `linkpath` pointing at the path part of `target_url`
    pub async fn symlink(&self, target_url: &str, linkpath: &str) -> VfsResult<()> {
        require(target_url, "target")?;
        require(linkpath, "linkpath")?;
        let (backend, target) = self.resolve(target_url).await?;
        let linkpath = Self::destination("symlink", &backend, linkpath)?;
        tracing::debug!("vfs symlink {} -> {} on {}", linkpath, target, backend.name());
        backend.symlink(&target, linkpath).await
    }

    pub async fn link(&self, old_url: &str, newpath: &str) -> VfsResult<()> {
        require(old_url, "oldpath")?;
        require(newpath, "newpath")?;
        let (backend, old) = self.resolve(old_url).await?;
        let newpath = Self::destination("link", &backend, newpath)?;
        tracing::debug!("vfs link {} -> {} on {}", newpath, old, backend.name());
        backend.link(&old, newpath).await
    }

    pub async fn readlink(&self, url: &str) -> VfsResult<String> {
        require(url, "url")?;
        let (backend, path) = self.resolve(url).await?;
        tracing::debug!("vfs readlink {} on {}", path, backend.name());
        backend.readlink(&path).await
    }

    pub async fn mknod(&self, url: &str, mode: u32, dev: u64) -> VfsResult<()> {
        require(url, "url")?;
        let (backend, path) = self.resolve(url).await?;
        tracing::debug!("vfs mknod {} ({:o}) on {}", path, mode, backend.name());
        backend.mknod(&path, mode, dev).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metadata
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn stat(&self, url: &str) -> VfsResult<FileStat> {
        require(url, "url")?;
        let (backend, path) = self.resolve(url).await?;
        tracing::debug!("vfs stat {} on {}", path, backend.name());
        backend.stat(&path).await
    }

    pub async fn lstat(&self, url: &str) -> VfsResult<FileStat> {
        require(url, "url")?;
        let (backend, path) = self.resolve(url).await?;
        tracing::debug!("vfs lstat {} on {}", path, backend.name());
        backend.lstat(&path).await
    }

    pub async fn scandir(&self, url: &str) -> VfsResult<Vec<DirEntry>> {
        require(url, "url")?;
        let (backend, path) = self.resolve(url).await?;
        tracing::debug!("vfs scandir {} on {}", path, backend.name());
        backend.scandir(&path).await
    }

    pub async fn chmod(&self, url: &str, mode: u32) -> VfsResult<()> {
        require(url, "url")?;
        let (backend, path) = self.resolve(url).await?;
        tracing::debug!("vfs chmod {} {:o} on {}", path, mode, backend.name());
        backend.chmod(&path, mode).await
    }

    pub async fn chown(&self, url: &str, uid: Option<u32>, gid: Option<u32>) -> VfsResult<()> {
        require(url, "url")?;
        let (backend, path) = self.resolve(url).await?;
        tracing::debug!("vfs chown {} {:?}:{:?} on {}", path, uid, gid, backend.name());
        backend.chown(&path, uid, gid).await
    }

    pub async fn utime(&self, url: &str, atime: i64, mtime: i64) -> VfsResult<()> {
        require(url, "url")?;
        let (backend, path) = self.resolve(url).await?;
        tracing::debug!("vfs utime {} on {}", path, backend.name());
        backend.utime(&path, atime, mtime).await
    }

    pub async fn utimes(&self, url: &str, atime: SystemTime, mtime: SystemTime) -> VfsResult<()> {
        require(url, "url")?;
        let (backend, path) = self.resolve(url).await?;
        tracing::debug!("vfs utimes {} on {}", path, backend.name());
        backend.utimes(&path, atime, mtime).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Moves
    // ─────────────────────────────────────────────────────────────────────────

    /// Decide how `src_url` can be moved to `dst_url`
    ///
    /// URLs on different backends always need a copy, as do backends that
    /// cannot tell.
    pub async fn move_strategy(&self, src_url: &str, dst_url: &str) -> VfsResult<MoveStrategy> {
        require(src_url, "source")?;
        require(dst_url, "destination")?;
        let (src_backend, src) = self.resolve(src_url).await?;
        let (dst_backend, dst) = self.resolve(dst_url).await?;

        if src_backend.name() != dst_backend.name() {
            tracing::debug!(
                "vfs move_strategy across {} and {}: copy",
                src_backend.name(),
                dst_backend.name()
            );
            return Ok(MoveStrategy::Copy);
        }

        let strategy = src_backend
            .move_strategy(&src, &dst)
            .await
            .unwrap_or(Ok(MoveStrategy::Copy))?;
        tracing::debug!("vfs move_strategy {} -> {} on {}: {:?}", src, dst, src_backend.name(), strategy);
        Ok(strategy)
    }

    /// Move `src_url` to `dst_url`, renaming when possible and otherwise
    /// copying the tree and deleting the source
    pub async fn move_path(&self, src_url: &str, dst_url: &str) -> VfsResult<MoveStrategy> {
        let strategy = self.move_strategy(src_url, dst_url).await?;
        match strategy {
            MoveStrategy::Rename => self.rename(src_url, dst_url).await?,
            MoveStrategy::Copy => self.copy_and_delete(src_url, dst_url).await?,
        }
        tracing::info!("Moved {} to {} ({:?})", src_url, dst_url, strategy);
        Ok(strategy)
    }

    async fn copy_and_delete(&self, src_url: &str, dst_url: &str) -> VfsResult<()> {
        let (src_backend, src_root) = self.resolve(src_url).await?;
        let (dst_backend, dst_root) = self.resolve(dst_url).await?;

        // Pre-order walk so directories exist before their contents
        let mut plan: Vec<(String, String, FileStat)> = Vec::new();
        let mut pending = vec![(src_root, dst_root)];
        while let Some((src, dst)) = pending.pop() {
            let stat = src_backend.lstat(&src).await?;
            if stat.is_dir() {
                for entry in src_backend.scandir(&src).await? {
                    pending.push((
                        format!("{}/{}", src.trim_end_matches('/'), entry.name),
                        format!("{}/{}", dst.trim_end_matches('/'), entry.name),
                    ));
                }
            }
            plan.push((src, dst, stat));
        }

        for (src, dst, stat) in &plan {
            match stat.kind {
                // Owner-writable until the contents are in place
                FileType::Directory => dst_backend.mkdir(dst, stat.mode | 0o700).await?,
                FileType::Symlink => {
                    let target = src_backend.readlink(src).await?;
                    dst_backend.symlink(&target, dst).await?;
                }
                FileType::File => {
                    let mut reader = src_backend.open(src, OpenFlags::read_only(), 0).await?;
                    let mut writer = dst_backend
                        .open(dst, OpenFlags::write_new().with_exclusive(), stat.mode)
                        .await?;
                    loop {
                        let chunk = reader.read(COPY_CHUNK).await?;
                        if chunk.is_empty() {
                            break;
                        }
                        write_fully(writer.as_mut(), &chunk).await?;
                    }
                    reader.close().await?;
                    writer.close().await?;
                }
                FileType::Special => {
                    return Err(VfsError::failure(format!("cannot copy special file {src}")));
                }
            }
        }

        for (_, dst, stat) in plan.iter().rev() {
            if stat.is_dir() && stat.mode | 0o700 != stat.mode {
                dst_backend.chmod(dst, stat.mode).await?;
            }
        }

        // Children before parents
        for (src, _, stat) in plan.iter().rev() {
            if stat.is_dir() {
                src_backend.rmdir(src).await?;
            } else {
                src_backend.unlink(src).await?;
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Convenience
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether `url` names an existing entry (symlinks are not followed)
    pub async fn exists(&self, url: &str) -> VfsResult<bool> {
        match self.lstat(url).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_errno(2) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Read a whole file
    pub async fn read_to_end(&self, url: &str) -> VfsResult<Vec<u8>> {
        let mut file = self.open(url, OpenFlags::read_only(), 0).await?;
        let mut data = Vec::new();
        loop {
            let chunk = file.read(COPY_CHUNK).await?;
            if chunk.is_empty() {
                break;
            }
            data.extend_from_slice(&chunk);
        }
        file.close().await?;
        Ok(data)
    }

    /// Create or truncate a file and write `data` to it
    pub async fn write_all(&self, url: &str, data: &[u8], mode: u32) -> VfsResult<()> {
        let mut file = self.open(url, OpenFlags::write_new(), mode).await?;
        write_fully(file.handle.as_mut(), data).await?;
        file.close().await
    }
}

async fn write_fully(handle: &mut dyn FileHandle, mut data: &[u8]) -> VfsResult<()> {
    while !data.is_empty() {
        let written = handle.write(data).await?;
        if written == 0 {
            return Err(VfsError::failure("write returned zero bytes"));
        }
        data = &data[written..];
    }
    Ok(())
}
