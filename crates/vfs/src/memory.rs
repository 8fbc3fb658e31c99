//! In-memory filesystem backend
//!
//! Provides a fast, ephemeral filesystem that exists only in memory.
//! Useful for tests and scratch areas that need VFS operations without
//! disk I/O. Hard links, device nodes, ownership and timestamps are not
//! modelled; those operations report `MethodNotFound`.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::backend::{Backend, DirEntry, FileHandle, FileStat, FileType, MoveStrategy, OpenFlags};
use crate::error::{VfsError, VfsResult};
use crate::normalize::{normalize_lexical, MAX_SYMLINK_DEPTH};

const ENOENT: i32 = 2;
const EBADF: i32 = 9;
const EBUSY: i32 = 16;
const EEXIST: i32 = 17;
const ENOTDIR: i32 = 20;
const EISDIR: i32 = 21;
const EINVAL: i32 = 22;
const EFBIG: i32 = 27;
const ENOTEMPTY: i32 = 39;
const ELOOP: i32 = 40;

/// Largest size a write may grow a file to
pub const MAX_FILE_SIZE: usize = 1 << 30;

/// In-memory node
#[derive(Clone, Debug)]
enum Node {
    File(Vec<u8>),
    Directory,
    Symlink(String),
}

#[derive(Clone, Debug)]
struct MemoryEntry {
    node: Node,
    mode: u32,
}

impl MemoryEntry {
    const fn dir(mode: u32) -> Self {
        Self {
            node: Node::Directory,
            mode,
        }
    }

    fn stat(&self) -> FileStat {
        let mut stat = match &self.node {
            Node::File(data) => FileStat::file(data.len() as u64),
            Node::Directory => FileStat::dir(),
            Node::Symlink(target) => FileStat {
                kind: FileType::Symlink,
                ..FileStat::file(target.len() as u64)
            },
        };
        stat.mode = self.mode;
        stat
    }
}

type Entries = Arc<RwLock<HashMap<String, MemoryEntry>>>;

fn read_lock(entries: &Entries) -> VfsResult<RwLockReadGuard<'_, HashMap<String, MemoryEntry>>> {
    entries.read().map_err(|_| VfsError::failure("memory fs lock poisoned"))
}

fn write_lock(entries: &Entries) -> VfsResult<RwLockWriteGuard<'_, HashMap<String, MemoryEntry>>> {
    entries.write().map_err(|_| VfsError::failure("memory fs lock poisoned"))
}

/// Normalize path (ensure leading /, no trailing /, no . or ..)
fn normalize_path(path: &str) -> String {
    let path = normalize_lexical(&format!("/{}", path.trim()));
    match path.trim_end_matches('/') {
        "" => "/".to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// Get parent path
fn parent_path(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    let idx = path.rfind('/')?;
    if idx == 0 {
        Some("/".to_string())
    } else {
        Some(path[..idx].to_string())
    }
}

/// Follow symlinks until a non-link entry (or a missing one) is reached
fn follow(entries: &HashMap<String, MemoryEntry>, path: &str) -> VfsResult<String> {
    let mut current = path.to_string();
    for _ in 0..MAX_SYMLINK_DEPTH {
        match entries.get(&current) {
            Some(MemoryEntry {
                node: Node::Symlink(target),
                ..
            }) => {
                current = if target.starts_with('/') {
                    normalize_path(target)
                } else {
                    let parent = parent_path(&current).unwrap_or_else(|| "/".to_string());
                    normalize_path(&format!("{parent}/{target}"))
                };
            }
            _ => return Ok(current),
        }
    }
    Err(VfsError::os(ELOOP))
}

/// Fail unless the parent of `path` exists and is a directory
fn check_parent(entries: &HashMap<String, MemoryEntry>, path: &str) -> VfsResult<()> {
    let Some(parent) = parent_path(path) else {
        return Err(VfsError::os(EEXIST));
    };
    let parent = follow(entries, &parent)?;
    match entries.get(&parent) {
        Some(MemoryEntry {
            node: Node::Directory,
            ..
        }) => Ok(()),
        Some(_) => Err(VfsError::os(ENOTDIR)),
        None => Err(VfsError::os(ENOENT)),
    }
}

/// In-memory filesystem backend
///
/// All data is stored in memory and lost when the backend is dropped.
/// Thread-safe via internal `RwLock`.
pub struct MemoryFs {
    name: String,
    entries: Entries,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Create a new empty in-memory filesystem registered as `memory`
    pub fn new() -> Self {
        Self::named("memory")
    }

    /// Create an empty in-memory filesystem with a custom backend name
    pub fn named(name: impl Into<String>) -> Self {
        let mut entries = HashMap::new();
        // Root always exists
        entries.insert("/".to_string(), MemoryEntry::dir(0o755));
        Self {
            name: name.into(),
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// Create with initial file contents, adding parent directories
    pub fn with_files(files: &[(&str, &[u8])]) -> Self {
        let fs = Self::new();
        if let Ok(mut entries) = fs.entries.write() {
            for (path, content) in files {
                let path = normalize_path(path);
                let mut current = String::new();
                let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                for part in &parts[..parts.len().saturating_sub(1)] {
                    current = format!("{current}/{part}");
                    entries
                        .entry(current.clone())
                        .or_insert_with(|| MemoryEntry::dir(0o755));
                }
                entries.insert(
                    path,
                    MemoryEntry {
                        node: Node::File(content.to_vec()),
                        mode: 0o644,
                    },
                );
            }
        }
        fs
    }
}

#[async_trait]
impl Backend for MemoryFs {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self, path: &str, flags: OpenFlags, mode: u32) -> VfsResult<Box<dyn FileHandle>> {
        let path = normalize_path(path);
        let mut entries = write_lock(&self.entries)?;
        let target = follow(&entries, &path)?;

        match entries.get_mut(&target) {
            Some(_) if flags.exclusive => return Err(VfsError::os(EEXIST)),
            Some(MemoryEntry {
                node: Node::Directory,
                ..
            }) if flags.write => return Err(VfsError::os(EISDIR)),
            Some(MemoryEntry {
                node: Node::File(data),
                ..
            }) if flags.truncate && flags.write => data.clear(),
            Some(_) => {}
            None if flags.create => {
                check_parent(&entries, &target)?;
                entries.insert(
                    target.clone(),
                    MemoryEntry {
                        node: Node::File(Vec::new()),
                        mode: mode & 0o7777,
                    },
                );
            }
            None => return Err(VfsError::os(ENOENT)),
        }

        Ok(Box::new(MemoryFile {
            path: target,
            entries: self.entries.clone(),
            offset: 0,
            readable: flags.read,
            writable: flags.write || flags.append,
            append: flags.append,
        }))
    }

    async fn unlink(&self, path: &str) -> VfsResult<()> {
        let path = normalize_path(path);
        let mut entries = write_lock(&self.entries)?;
        match entries.get(&path) {
            Some(MemoryEntry {
                node: Node::Directory,
                ..
            }) => Err(VfsError::os(EISDIR)),
            Some(_) => {
                entries.remove(&path);
                Ok(())
            }
            None => Err(VfsError::os(ENOENT)),
        }
    }

    async fn mkdir(&self, path: &str, mode: u32) -> VfsResult<()> {
        let path = normalize_path(path);
        let mut entries = write_lock(&self.entries)?;
        if entries.contains_key(&path) {
            return Err(VfsError::os(EEXIST));
        }
        check_parent(&entries, &path)?;
        entries.insert(path, MemoryEntry::dir(mode & 0o7777));
        Ok(())
    }

    async fn rmdir(&self, path: &str) -> VfsResult<()> {
        let path = normalize_path(path);
        let mut entries = write_lock(&self.entries)?;
        match entries.get(&path) {
            Some(MemoryEntry {
                node: Node::Directory,
                ..
            }) => {}
            Some(_) => return Err(VfsError::os(ENOTDIR)),
            None => return Err(VfsError::os(ENOENT)),
        }
        if path == "/" {
            return Err(VfsError::os(EINVAL));
        }
        let prefix = format!("{path}/");
        if entries.keys().any(|k| k.starts_with(&prefix)) {
            return Err(VfsError::os(ENOTEMPTY));
        }
        entries.remove(&path);
        Ok(())
    }

    async fn rename(&self, src: &str, dst: &str) -> VfsResult<()> {
        let src = normalize_path(src);
        let dst = normalize_path(dst);
        let mut entries = write_lock(&self.entries)?;
        let src_is_dir = match entries.get(&src) {
            Some(entry) => matches!(entry.node, Node::Directory),
            None => return Err(VfsError::os(ENOENT)),
        };
        if src == "/" || dst == "/" {
            return Err(VfsError::os(EBUSY));
        }
        if src == dst {
            return Ok(());
        }
        let src_prefix = format!("{src}/");
        if dst.starts_with(&src_prefix) {
            return Err(VfsError::os(EINVAL));
        }
        check_parent(&entries, &dst)?;

        // An existing destination must be replaceable by the source
        let dst_prefix = format!("{dst}/");
        match entries.get(&dst).map(|entry| &entry.node) {
            Some(Node::Directory) if !src_is_dir => return Err(VfsError::os(EISDIR)),
            Some(Node::Directory) => {
                if entries.keys().any(|k| k.starts_with(&dst_prefix)) {
                    return Err(VfsError::os(ENOTEMPTY));
                }
            }
            Some(_) if src_is_dir => return Err(VfsError::os(ENOTDIR)),
            _ => {}
        }
        entries.remove(&dst);

        // Move the entry and everything below it
        let moved: Vec<String> = entries
            .keys()
            .filter(|k| **k == src || k.starts_with(&src_prefix))
            .cloned()
            .collect();
        for key in moved {
            if let Some(entry) = entries.remove(&key) {
                let new_key = format!("{dst}{}", &key[src.len()..]);
                entries.insert(new_key, entry);
            }
        }
        Ok(())
    }

    async fn symlink(&self, target: &str, linkpath: &str) -> VfsResult<()> {
        let linkpath = normalize_path(linkpath);
        let mut entries = write_lock(&self.entries)?;
        if entries.contains_key(&linkpath) {
            return Err(VfsError::os(EEXIST));
        }
        check_parent(&entries, &linkpath)?;
        entries.insert(
            linkpath,
            MemoryEntry {
                node: Node::Symlink(target.to_string()),
                mode: 0o777,
            },
        );
        Ok(())
    }

    async fn readlink(&self, path: &str) -> VfsResult<String> {
        let path = normalize_path(path);
        let entries = read_lock(&self.entries)?;
        match entries.get(&path) {
            Some(MemoryEntry {
                node: Node::Symlink(target),
                ..
            }) => Ok(target.clone()),
            Some(_) => Err(VfsError::os(EINVAL)),
            None => Err(VfsError::os(ENOENT)),
        }
    }

    async fn stat(&self, path: &str) -> VfsResult<FileStat> {
        let path = normalize_path(path);
        let entries = read_lock(&self.entries)?;
        let target = follow(&entries, &path)?;
        entries
            .get(&target)
            .map(MemoryEntry::stat)
            .ok_or_else(|| VfsError::os(ENOENT))
    }

    async fn lstat(&self, path: &str) -> VfsResult<FileStat> {
        let path = normalize_path(path);
        let entries = read_lock(&self.entries)?;
        entries
            .get(&path)
            .map(MemoryEntry::stat)
            .ok_or_else(|| VfsError::os(ENOENT))
    }

    async fn scandir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let path = normalize_path(path);
        let entries = read_lock(&self.entries)?;
        let path = follow(&entries, &path)?;

        // Verify path is a directory
        match entries.get(&path) {
            Some(MemoryEntry {
                node: Node::Directory,
                ..
            }) => {}
            Some(_) => return Err(VfsError::os(ENOTDIR)),
            None => return Err(VfsError::os(ENOENT)),
        }

        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        let mut results: Vec<DirEntry> = entries
            .iter()
            .filter_map(|(key, entry)| {
                let remainder = key.strip_prefix(&prefix)?;
                // Only direct children (no / in remainder)
                if remainder.is_empty() || remainder.contains('/') {
                    return None;
                }
                Some(DirEntry::new(remainder, entry.stat().kind))
            })
            .collect();

        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }

    async fn chmod(&self, path: &str, mode: u32) -> VfsResult<()> {
        let path = normalize_path(path);
        let mut entries = write_lock(&self.entries)?;
        let target = follow(&entries, &path)?;
        let entry = entries.get_mut(&target).ok_or_else(|| VfsError::os(ENOENT))?;
        entry.mode = mode & 0o7777;
        Ok(())
    }

    async fn move_strategy(&self, _src: &str, _dst: &str) -> Option<VfsResult<MoveStrategy>> {
        Some(Ok(MoveStrategy::Rename))
    }
}

/// Handle onto an in-memory file; writes are visible immediately
struct MemoryFile {
    path: String,
    entries: Entries,
    offset: u64,
    readable: bool,
    writable: bool,
    append: bool,
}

impl MemoryFile {
    fn with_data<T>(&self, f: impl FnOnce(&mut Vec<u8>) -> T) -> VfsResult<T> {
        let mut entries = write_lock(&self.entries)?;
        match entries.get_mut(&self.path) {
            Some(MemoryEntry {
                node: Node::File(data),
                ..
            }) => Ok(f(data)),
            Some(_) => Err(VfsError::os(EISDIR)),
            // Unlinked while open
            None => Err(VfsError::os(ENOENT)),
        }
    }
}

#[async_trait]
impl FileHandle for MemoryFile {
    async fn read(&mut self, len: usize) -> VfsResult<Vec<u8>> {
        if !self.readable {
            return Err(VfsError::os(EBADF));
        }
        let offset = usize::try_from(self.offset).unwrap_or(usize::MAX);
        let chunk = self.with_data(|data| {
            let start = offset.min(data.len());
            let end = start.saturating_add(len).min(data.len());
            data[start..end].to_vec()
        })?;
        self.offset += chunk.len() as u64;
        Ok(chunk)
    }

    async fn write(&mut self, bytes: &[u8]) -> VfsResult<usize> {
        if !self.writable {
            return Err(VfsError::os(EBADF));
        }
        let append = self.append;
        let offset = usize::try_from(self.offset).unwrap_or(usize::MAX);
        let end = self.with_data(|data| {
            let start = if append { data.len() } else { offset };
            let end = start
                .checked_add(bytes.len())
                .filter(|&end| end <= MAX_FILE_SIZE)
                .ok_or_else(|| VfsError::os(EFBIG))?;
            if data.len() < end {
                data.resize(end, 0);
            }
            data[start..end].copy_from_slice(bytes);
            Ok::<usize, VfsError>(end)
        })??;
        self.offset = end as u64;
        Ok(bytes.len())
    }

    async fn lseek(&mut self, pos: SeekFrom) -> VfsResult<u64> {
        let len = self.with_data(|data| data.len() as u64)?;
        let new_offset = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(delta) => len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.offset.checked_add_signed(delta),
        };
        self.offset = new_offset.ok_or_else(|| VfsError::os(EINVAL))?;
        Ok(self.offset)
    }

    async fn close(self: Box<Self>) -> VfsResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_operations() {
        let fs = MemoryFs::new();

        let mut handle = fs.open("/test.txt", OpenFlags::write_new(), 0o644).await.unwrap();
        handle.write(b"Hello").await.unwrap();
        handle.close().await.unwrap();

        let mut handle = fs.open("/test.txt", OpenFlags::read_only(), 0).await.unwrap();
        assert_eq!(handle.read(64).await.unwrap(), b"Hello");

        let stat = fs.stat("/test.txt").await.unwrap();
        assert!(stat.is_file());
        assert_eq!(stat.size, 5);
        assert_eq!(stat.mode, 0o644);

        assert!(fs.stat("/nonexistent").await.unwrap_err().is_errno(ENOENT));
    }

    #[tokio::test]
    async fn test_directory_operations() {
        let fs = MemoryFs::new();

        fs.mkdir("/mydir", 0o755).await.unwrap();
        assert!(fs.mkdir("/mydir", 0o755).await.unwrap_err().is_errno(EEXIST));
        assert!(fs.mkdir("/no/parent", 0o755).await.unwrap_err().is_errno(ENOENT));

        fs.open("/mydir/file.txt", OpenFlags::write_new(), 0o644)
            .await
            .unwrap();

        let entries = fs.scandir("/mydir").await.unwrap();
        assert_eq!(entries, vec![DirEntry::new("file.txt", FileType::File)]);

        let root = fs.scandir("/").await.unwrap();
        assert_eq!(root, vec![DirEntry::new("mydir", FileType::Directory)]);

        assert!(fs.rmdir("/mydir").await.unwrap_err().is_errno(ENOTEMPTY));
        fs.unlink("/mydir/file.txt").await.unwrap();
        fs.rmdir("/mydir").await.unwrap();
    }

    #[tokio::test]
    async fn test_seek_and_append() {
        let fs = MemoryFs::with_files(&[("/log", b"0123456789")]);

        let mut handle = fs.open("/log", OpenFlags::read_write(), 0).await.unwrap();
        assert_eq!(handle.lseek(SeekFrom::End(-3)).await.unwrap(), 7);
        assert_eq!(handle.read(10).await.unwrap(), b"789");
        assert!(handle.lseek(SeekFrom::Current(-20)).await.is_err());

        handle.lseek(SeekFrom::Start(12)).await.unwrap();
        handle.write(b"AB").await.unwrap();
        assert_eq!(fs.stat("/log").await.unwrap().size, 14);

        let mut appender = fs
            .open("/log", OpenFlags::read_write().with_append(), 0)
            .await
            .unwrap();
        appender.write(b"!").await.unwrap();
        assert_eq!(fs.stat("/log").await.unwrap().size, 15);
    }

    #[tokio::test]
    async fn test_rename_moves_subtree() {
        let fs = MemoryFs::with_files(&[("/a/b/c.txt", b"C"), ("/a/d.txt", b"D")]);
        fs.mkdir("/z", 0o755).await.unwrap();

        fs.rename("/a", "/z/a").await.unwrap();
        assert!(fs.stat("/z/a/b/c.txt").await.unwrap().is_file());
        assert!(fs.stat("/a").await.is_err());
        assert!(fs.rename("/z", "/z/a/inside").await.unwrap_err().is_errno(EINVAL));
    }

    #[tokio::test]
    async fn test_rename_over_existing_entries() {
        let fs = MemoryFs::with_files(&[
            ("/f", b"F"),
            ("/g", b"G"),
            ("/full/child", b"C"),
            ("/src/inner", b"I"),
        ]);
        fs.mkdir("/empty", 0o700).await.unwrap();

        assert!(fs.rename("/f", "/full").await.unwrap_err().is_errno(EISDIR));
        assert!(fs.stat("/full").await.unwrap().is_dir());
        assert!(fs.stat("/full/child").await.unwrap().is_file());

        assert!(fs.rename("/src", "/g").await.unwrap_err().is_errno(ENOTDIR));
        assert!(fs.rename("/src", "/full").await.unwrap_err().is_errno(ENOTEMPTY));
        assert!(fs.rename("/", "/moved").await.unwrap_err().is_errno(EBUSY));
        assert!(fs.stat("/").await.unwrap().is_dir());

        fs.rename("/src", "/empty").await.unwrap();
        let stat = fs.stat("/empty").await.unwrap();
        assert_eq!(stat.mode, 0o755);
        assert!(fs.stat("/empty/inner").await.unwrap().is_file());

        fs.rename("/f", "/g").await.unwrap();
        let mut handle = fs.open("/g", OpenFlags::read_only(), 0).await.unwrap();
        assert_eq!(handle.read(8).await.unwrap(), b"F");
    }

    #[tokio::test]
    async fn test_handles_respect_access_mode() {
        let fs = MemoryFs::with_files(&[("/ro.txt", b"hello")]);

        let mut reader = fs.open("/ro.txt", OpenFlags::read_only(), 0).await.unwrap();
        assert!(reader.write(b"CLOBBER").await.unwrap_err().is_errno(EBADF));
        assert_eq!(reader.read(16).await.unwrap(), b"hello");

        let mut writer = fs.open("/new.txt", OpenFlags::write_new(), 0o644).await.unwrap();
        writer.write(b"data").await.unwrap();
        assert!(writer.read(4).await.unwrap_err().is_errno(EBADF));
    }

    #[tokio::test]
    async fn test_write_past_size_limit() {
        let fs = MemoryFs::with_files(&[("/big", b"")]);
        let mut handle = fs.open("/big", OpenFlags::read_write(), 0).await.unwrap();

        handle.lseek(SeekFrom::Start(u64::MAX)).await.unwrap();
        assert!(handle.write(b"x").await.unwrap_err().is_errno(EFBIG));

        handle.lseek(SeekFrom::Start(MAX_FILE_SIZE as u64)).await.unwrap();
        assert!(handle.write(b"x").await.unwrap_err().is_errno(EFBIG));
        assert_eq!(fs.stat("/big").await.unwrap().size, 0);
    }

    #[tokio::test]
    async fn test_symlinks() {
        let fs = MemoryFs::with_files(&[("/data/real.txt", b"xyz")]);
        fs.symlink("data", "/alias").await.unwrap();
        fs.symlink("/loop2", "/loop1").await.unwrap();
        fs.symlink("/loop1", "/loop2").await.unwrap();

        assert_eq!(fs.readlink("/alias").await.unwrap(), "data");
        assert!(fs.lstat("/alias").await.unwrap().is_symlink());
        assert!(fs.stat("/alias").await.unwrap().is_dir());
        assert_eq!(fs.scandir("/alias").await.unwrap().len(), 1);
        assert!(fs.stat("/loop1").await.unwrap_err().is_errno(ELOOP));
    }

    #[tokio::test]
    async fn test_unmodelled_operations() {
        let fs = MemoryFs::new();
        let err = fs.link("/a", "/b").await.unwrap_err();
        assert_eq!(err.context().get("method"), Some("link"));
        assert_eq!(err.context().get("backend"), Some("memory"));
    }
}
