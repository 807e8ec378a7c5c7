//! Units of work handed from the scanner to the worker pool.

use std::borrow::Cow;
use std::fmt;
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use filetime::FileTime;

/// Size in bytes of the unit `st_blocks` is reported in.
pub const BLOCK_UNIT: u64 = 512;

/// Identity of a file's data: the device it lives on plus its inode number.
///
/// All hardlinked paths of one file share the same key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InodeKey {
    /// Device identifier (`st_dev`).
    pub device: u64,
    /// Inode number (`st_ino`).
    pub inode: u64,
}

impl InodeKey {
    /// Creates a key from raw device and inode numbers.
    pub fn new(device: u64, inode: u64) -> Self {
        Self { device, inode }
    }

    /// Extracts the key from file metadata.
    pub fn from_metadata(meta: &Metadata) -> Self {
        Self::new(meta.dev(), meta.ino())
    }
}

impl fmt::Display for InodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device, self.inode)
    }
}

/// A regular file scheduled for evaluation, with metadata captured at scan time.
#[derive(Debug, Clone)]
pub struct FileTask {
    /// Path as discovered by the walk.
    pub path: PathBuf,
    /// Logical size in bytes.
    pub size: u64,
    /// Allocated 512-byte blocks.
    pub blocks: u64,
    /// Modification time before the rewrite.
    pub modified: FileTime,
    /// Access time before the rewrite.
    pub accessed: FileTime,
    /// Inode identity.
    pub inode: InodeKey,
}

impl FileTask {
    /// Captures a task from a path and its (non-followed) metadata.
    pub fn from_metadata(path: impl Into<PathBuf>, meta: &Metadata) -> Self {
        Self {
            path: path.into(),
            size: meta.len(),
            blocks: meta.blocks(),
            modified: FileTime::from_last_modification_time(meta),
            accessed: FileTime::from_last_access_time(meta),
            inode: InodeKey::from_metadata(meta),
        }
    }

    /// Stats `path` without following symlinks and captures a task from it.
    pub fn stat(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::symlink_metadata(path)?;
        Ok(Self::from_metadata(path, &meta))
    }

    /// On-disk footprint in bytes.
    pub fn allocated_bytes(&self) -> u64 {
        self.blocks.saturating_mul(BLOCK_UNIT)
    }

    /// File name used for pattern matching.
    ///
    /// Bytes that are not valid UTF-8 become U+FFFD, so the extension of such
    /// a name still matches.
    pub fn file_name(&self) -> Cow<'_, str> {
        match self.path.file_name() {
            Some(name) => name.to_string_lossy(),
            None => Cow::Borrowed(""),
        }
    }

    /// Builds a task from explicit values, without touching the filesystem.
    pub fn synthetic(path: impl Into<PathBuf>, size: u64, blocks: u64, inode: InodeKey) -> Self {
        let now = FileTime::from_system_time(SystemTime::now());
        Self {
            path: path.into(),
            size,
            blocks,
            modified: now,
            accessed: now,
            inode,
        }
    }
}
