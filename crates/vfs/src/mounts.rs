//! System mount table and move-strategy selection
//!
//! A move inside one filesystem is a cheap `rename`; across filesystems
//! the kernel refuses the rename (EXDEV) and the move has to be done as
//! copy + delete. The decision is taken by finding the most specific mount
//! point covering each path.

use std::path::{Path, PathBuf};

use crate::backend::MoveStrategy;
use crate::error::{VfsError, VfsResult};

/// Mount tables tried in order; the first readable one wins
pub const DEFAULT_MOUNT_TABLES: &[&str] = &["/etc/mtab", "/proc/mounts"];

/// One line of the mount table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    pub fsname: String,
    /// Mount directory
    pub dir: String,
    pub fstype: String,
    pub opts: String,
    pub freq: u32,
    pub passno: u32,
}

/// Decode `\NNN` octal escapes (used for spaces, tabs and newlines)
pub fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal_triplet(&bytes[i + 1..i + 4]) {
            let value = bytes[i + 1..i + 4]
                .iter()
                .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
            // \400 and above do not fit a byte; keep them literal
            if let Ok(byte) = u8::try_from(value) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn is_octal_triplet(digits: &[u8]) -> bool {
    digits.len() == 3 && digits.iter().all(|d| (b'0'..=b'7').contains(d))
}

/// Parse mount table text, skipping blank and `#` comment lines
pub fn parse_mount_table(text: &str) -> Vec<MountPoint> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 2 {
                tracing::debug!("Skipping malformed mount table line: {}", line);
                return None;
            }
            let field = |i: usize| fields.get(i).map(|f| unescape_octal(f)).unwrap_or_default();
            let number = |i: usize| fields.get(i).and_then(|f| f.parse().ok()).unwrap_or(0);
            Some(MountPoint {
                fsname: field(0),
                dir: field(1),
                fstype: field(2),
                opts: field(3),
                freq: number(4),
                passno: number(5),
            })
        })
        .collect()
}

/// Read the first available mount table from `sources`
pub fn read_mount_table<P: AsRef<Path>>(sources: &[P]) -> VfsResult<Vec<MountPoint>> {
    let mut last_err = None;
    for source in sources {
        match std::fs::read_to_string(source) {
            Ok(text) => return Ok(parse_mount_table(&text)),
            Err(e) => {
                tracing::debug!("Mount table {} unavailable: {}", source.as_ref().display(), e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.map_or_else(|| VfsError::invalid_argument("no mount table sources"), Into::into))
}

/// Default mount table sources as owned paths
pub fn default_mount_tables() -> Vec<PathBuf> {
    DEFAULT_MOUNT_TABLES.iter().map(PathBuf::from).collect()
}

/// Path-prefix test on whole segments
///
/// `/mnt` prefixes `/mnt` and `/mnt/x` but not `/mnt2/x`; `/` prefixes
/// every absolute path.
pub fn is_prefix(prefix: &str, path: &str) -> bool {
    if !path.starts_with(prefix) {
        return false;
    }
    prefix == "/" || matches!(path.as_bytes().get(prefix.len()), None | Some(b'/'))
}

/// Pick a move strategy from a mount table
///
/// Mount points are scanned most specific (longest directory) first. The
/// first one covering both paths means they share a filesystem; one
/// covering only a single path means they do not.
pub fn select_strategy(mounts: &[MountPoint], src: &str, dst: &str) -> MoveStrategy {
    let mut by_specificity: Vec<&MountPoint> = mounts.iter().collect();
    by_specificity.sort_by(|a, b| b.dir.len().cmp(&a.dir.len()));

    for mount in by_specificity {
        match (is_prefix(&mount.dir, src), is_prefix(&mount.dir, dst)) {
            (true, true) => return MoveStrategy::Rename,
            (true, false) | (false, true) => return MoveStrategy::Copy,
            (false, false) => {}
        }
    }
    MoveStrategy::Copy
}
