use std::fs::{self, DirBuilder, File, Metadata, OpenOptions, Permissions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{DirBuilderExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rustix::fs::{utimensat, AtFlags, Timespec, Timestamps, CWD};

use crate::backend::{Backend, DirEntry, FileHandle, FileStat, FileType, MoveStrategy, OpenFlags};
use crate::error::{VfsError, VfsResult};
use crate::mounts;

/// Run a blocking host call on tokio's blocking pool
async fn blocking<T, F>(f: F) -> VfsResult<T>
where
    F: FnOnce() -> VfsResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

fn file_type(ft: fs::FileType) -> FileType {
    if ft.is_dir() {
        FileType::Directory
    } else if ft.is_symlink() {
        FileType::Symlink
    } else if ft.is_file() {
        FileType::File
    } else {
        FileType::Special
    }
}

fn to_stat(meta: &Metadata) -> FileStat {
    FileStat {
        kind: file_type(meta.file_type()),
        size: meta.len(),
        mode: meta.mode() & 0o7777,
        nlink: meta.nlink(),
        uid: meta.uid(),
        gid: meta.gid(),
        accessed: meta.accessed().ok(),
        modified: meta.modified().ok(),
    }
}

fn from_unix_secs(secs: i64) -> SystemTime {
    let offset = Duration::from_secs(secs.unsigned_abs());
    if secs >= 0 {
        UNIX_EPOCH + offset
    } else {
        UNIX_EPOCH - offset
    }
}

fn out_of_range<E>(_: E) -> VfsError {
    VfsError::invalid_argument("timestamp out of range")
}

fn timespec(time: SystemTime) -> VfsResult<Timespec> {
    let (secs, nanos) = match time.duration_since(UNIX_EPOCH) {
        Ok(after) => (i64::try_from(after.as_secs()).map_err(out_of_range)?, after.subsec_nanos()),
        Err(before) => {
            let before = before.duration();
            let secs = -i64::try_from(before.as_secs()).map_err(out_of_range)?;
            match before.subsec_nanos() {
                0 => (secs, 0),
                nanos => (secs - 1, 1_000_000_000 - nanos),
            }
        }
    };
    Ok(Timespec {
        tv_sec: secs,
        tv_nsec: nanos.try_into().map_err(out_of_range)?,
    })
}

/// Set access and modification times by path, without opening the file
fn set_times(path: &str, atime: SystemTime, mtime: SystemTime) -> VfsResult<()> {
    let times = Timestamps {
        last_access: timespec(atime)?,
        last_modification: timespec(mtime)?,
    };
    utimensat(CWD, path, &times, AtFlags::empty())?;
    Ok(())
}

/// Local filesystem backend - maps `local::<path>` to host paths
///
/// Paths are handed to the host unchanged: absolute paths are absolute on
/// the host, relative paths resolve against the process working directory.
pub struct LocalFs {
    mount_tables: Vec<PathBuf>,
}

impl Default for LocalFs {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalFs {
    pub const NAME: &'static str = "local";

    /// Create a local backend reading the system mount tables
    pub fn new() -> Self {
        Self {
            mount_tables: mounts::default_mount_tables(),
        }
    }

    /// Create a local backend that plans moves from other mount tables
    pub fn with_mount_tables(tables: Vec<PathBuf>) -> Self {
        Self {
            mount_tables: tables,
        }
    }
}

#[async_trait]
impl Backend for LocalFs {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn open(&self, path: &str, flags: OpenFlags, mode: u32) -> VfsResult<Box<dyn FileHandle>> {
        let path = path.to_string();
        let handle = blocking(move || LocalFile::open(&path, flags, mode)).await?;
        Ok(Box::new(handle))
    }

    async fn unlink(&self, path: &str) -> VfsResult<()> {
        let path = path.to_string();
        blocking(move || fs::remove_file(path).map_err(Into::into)).await
    }

    async fn mkdir(&self, path: &str, mode: u32) -> VfsResult<()> {
        let path = path.to_string();
        blocking(move || DirBuilder::new().mode(mode).create(path).map_err(Into::into)).await
    }

    async fn rmdir(&self, path: &str) -> VfsResult<()> {
        let path = path.to_string();
        blocking(move || fs::remove_dir(path).map_err(Into::into)).await
    }

    async fn rename(&self, src: &str, dst: &str) -> VfsResult<()> {
        let (src, dst) = (src.to_string(), dst.to_string());
        blocking(move || fs::rename(src, dst).map_err(Into::into)).await
    }

    async fn symlink(&self, target: &str, linkpath: &str) -> VfsResult<()> {
        let (target, linkpath) = (target.to_string(), linkpath.to_string());
        blocking(move || std::os::unix::fs::symlink(target, linkpath).map_err(Into::into)).await
    }

    async fn link(&self, oldpath: &str, newpath: &str) -> VfsResult<()> {
        let (oldpath, newpath) = (oldpath.to_string(), newpath.to_string());
        blocking(move || fs::hard_link(oldpath, newpath).map_err(Into::into)).await
    }

    async fn readlink(&self, path: &str) -> VfsResult<String> {
        let path = path.to_string();
        blocking(move || Ok(fs::read_link(path)?.to_string_lossy().into_owned())).await
    }

    async fn mknod(&self, path: &str, mode: u32, dev: u64) -> VfsResult<()> {
        use rustix::fs::{mknodat, FileType as NodeType, Mode};

        let path = path.to_string();
        blocking(move || {
            mknodat(
                CWD,
                path.as_str(),
                NodeType::from_raw_mode(mode),
                Mode::from_raw_mode(mode),
                dev,
            )
            .map_err(Into::into)
        })
        .await
    }

    async fn stat(&self, path: &str) -> VfsResult<FileStat> {
        let path = path.to_string();
        blocking(move || Ok(to_stat(&fs::metadata(path)?))).await
    }

    async fn lstat(&self, path: &str) -> VfsResult<FileStat> {
        let path = path.to_string();
        blocking(move || Ok(to_stat(&fs::symlink_metadata(path)?))).await
    }

    async fn scandir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let path = path.to_string();
        blocking(move || {
            let mut entries = Vec::new();
            for entry in fs::read_dir(path)? {
                let entry = entry?;
                entries.push(DirEntry::new(
                    entry.file_name().to_string_lossy(),
                    file_type(entry.file_type()?),
                ));
            }
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(entries)
        })
        .await
    }

    async fn chmod(&self, path: &str, mode: u32) -> VfsResult<()> {
        let path = path.to_string();
        blocking(move || fs::set_permissions(path, Permissions::from_mode(mode)).map_err(Into::into))
            .await
    }

    async fn chown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> VfsResult<()> {
        let path = path.to_string();
        blocking(move || std::os::unix::fs::chown(path, uid, gid).map_err(Into::into)).await
    }

    async fn utime(&self, path: &str, atime: i64, mtime: i64) -> VfsResult<()> {
        let path = path.to_string();
        blocking(move || set_times(&path, from_unix_secs(atime), from_unix_secs(mtime))).await
    }

    async fn utimes(&self, path: &str, atime: SystemTime, mtime: SystemTime) -> VfsResult<()> {
        let path = path.to_string();
        blocking(move || set_times(&path, atime, mtime)).await
    }

    async fn move_strategy(&self, src: &str, dst: &str) -> Option<VfsResult<MoveStrategy>> {
        let tables = self.mount_tables.clone();
        let (src, dst) = (src.to_string(), dst.to_string());
        let result = blocking(move || {
            let mounts = mounts::read_mount_table(&tables)?;
            Ok(mounts::select_strategy(&mounts, &src, &dst))
        })
        .await;
        Some(result)
    }
}

/// Open file on the host
pub struct LocalFile {
    file: Arc<Mutex<File>>,
}

impl LocalFile {
    fn open(path: &str, flags: OpenFlags, mode: u32) -> VfsResult<Self> {
        let file = OpenOptions::new()
            .read(flags.read)
            .write(flags.write)
            .append(flags.append)
            .create(flags.create && !flags.exclusive)
            .create_new(flags.exclusive)
            .truncate(flags.truncate)
            .mode(mode)
            .open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Run `f` against the file on the blocking pool
    async fn with_file<T, F>(&self, f: F) -> VfsResult<T>
    where
        F: FnOnce(&mut File) -> VfsResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let file = self.file.clone();
        blocking(move || {
            let mut guard = file.lock().map_err(|_| VfsError::failure("file lock poisoned"))?;
            f(&mut *guard)
        })
        .await
    }
}

#[async_trait]
impl FileHandle for LocalFile {
    async fn read(&mut self, len: usize) -> VfsResult<Vec<u8>> {
        self.with_file(move |file| {
            let mut buffer = vec![0u8; len];
            let bytes_read = file.read(&mut buffer)?;
            buffer.truncate(bytes_read);
            Ok(buffer)
        })
        .await
    }

    async fn write(&mut self, data: &[u8]) -> VfsResult<usize> {
        let data = data.to_vec();
        self.with_file(move |file| Ok(file.write(&data)?)).await
    }

    async fn lseek(&mut self, pos: SeekFrom) -> VfsResult<u64> {
        self.with_file(move |file| Ok(file.seek(pos)?)).await
    }

    async fn close(self: Box<Self>) -> VfsResult<()> {
        self.with_file(|file| Ok(file.flush()?)).await
    }
}
