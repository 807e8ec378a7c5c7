//! In-place rewrite of a file through the filesystem's normal write path.
//!
//! The file is opened twice and copied onto itself one buffer at a time: each
//! chunk is fully read before the same range is written back, so the write
//! cursor never passes the read cursor and nothing is read after being
//! overwritten. The file is never truncated, so its length is unchanged even
//! if the copy is interrupted part way.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::control::RunStats;
use crate::error::{RecompressError, RecompressResult};
use crate::ledger::CheckpointStore;
use crate::task::FileTask;

/// Copies `path` onto itself through `buffer` and returns the bytes moved.
///
/// With `sync_data` the written range is flushed to stable storage before
/// returning.
pub fn rewrite_in_place(path: &Path, buffer: &mut [u8], sync_data: bool) -> RecompressResult<u64> {
    let mut source = File::open(path).map_err(|e| RecompressError::io(path, e))?;
    let mut target = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| RecompressError::io(path, e))?;

    let mut copied = 0u64;
    loop {
        let n = match source.read(buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(RecompressError::io(path, e)),
        };
        target
            .write_all(&buffer[..n])
            .map_err(|e| RecompressError::io(path, e))?;
        copied += n as u64;
    }
    target.flush().map_err(|e| RecompressError::io(path, e))?;
    if sync_data {
        target.sync_data().map_err(|e| RecompressError::io(path, e))?;
    }
    Ok(copied)
}

/// Rewrites eligible files and records them as handled.
pub struct RewriteEngine {
    store: Arc<dyn CheckpointStore>,
    sync_data: bool,
}

impl RewriteEngine {
    /// Creates an engine recording into `store`.
    pub fn new(store: Arc<dyn CheckpointStore>, sync_data: bool) -> Self {
        Self { store, sync_data }
    }

    /// Rewrites `task`, verifies its length, restores its timestamps, marks
    /// it handled and counts it as processed.
    pub fn rewrite(
        &self,
        task: &FileTask,
        buffer: &mut [u8],
        stats: &RunStats,
    ) -> RecompressResult<()> {
        debug!(
            path = %task.path.display(),
            size = task.size,
            allocated = task.allocated_bytes(),
            "Processing file"
        );

        let copied = rewrite_in_place(&task.path, buffer, self.sync_data)?;
        if copied != task.size {
            return Err(RecompressError::SizeMismatch {
                path: task.path.clone(),
                expected: task.size,
                actual: copied,
            });
        }

        filetime::set_file_times(&task.path, task.accessed, task.modified).map_err(|e| {
            RecompressError::Timestamps {
                path: task.path.clone(),
                source: e,
            }
        })?;

        self.store.mark_handled(task.inode)?;
        stats.record_processed(task.size);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use filetime::FileTime;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[test]
    fn test_rewrite_preserves_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let data = pattern(100_000);
        std::fs::write(&path, &data).unwrap();

        let mut buf = vec![0u8; 4096];
        let copied = rewrite_in_place(&path, &mut buf, false).unwrap();
        assert_eq!(copied, data.len() as u64);
        assert_eq!(std::fs::read(&path).unwrap(), data);
    }

    #[test]
    fn test_rewrite_buffer_larger_than_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.bin");
        let data = pattern(777);
        std::fs::write(&path, &data).unwrap();

        let mut buf = vec![0u8; 1 << 16];
        assert_eq!(rewrite_in_place(&path, &mut buf, false).unwrap(), 777);
        assert_eq!(std::fs::read(&path).unwrap(), data);
    }

    #[test]
    fn test_rewrite_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut buf = vec![0u8; 4096];
        let err = rewrite_in_place(&dir.path().join("gone"), &mut buf, false).unwrap_err();
        assert!(matches!(err, RecompressError::Io { .. }));
    }

    #[test]
    fn test_engine_restores_mtime_and_marks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.log");
        std::fs::write(&path, pattern(50_000)).unwrap();
        let past = FileTime::from_unix_time(1_500_000_000, 0);
        filetime::set_file_times(&path, past, past).unwrap();

        let task = FileTask::stat(&path).unwrap();
        let store = Arc::new(MemoryLedger::new());
        let stats = RunStats::new();
        let engine = RewriteEngine::new(store.clone(), true);
        let mut buf = vec![0u8; 8192];
        engine.rewrite(&task, &mut buf, &stats).unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta), past);
        assert!(store.is_handled(task.inode).unwrap());
        let snap = stats.snapshot();
        assert_eq!(snap.processed_files, 1);
        assert_eq!(snap.processed_bytes, 50_000);
    }

    #[test]
    fn test_engine_size_mismatch_not_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("growing.log");
        std::fs::write(&path, pattern(10_000)).unwrap();
        let task = FileTask::stat(&path).unwrap();
        std::fs::write(&path, pattern(12_000)).unwrap();

        let store = Arc::new(MemoryLedger::new());
        let stats = RunStats::new();
        let engine = RewriteEngine::new(store.clone(), false);
        let mut buf = vec![0u8; 4096];
        let err = engine.rewrite(&task, &mut buf, &stats).unwrap_err();

        assert!(matches!(
            err,
            RecompressError::SizeMismatch {
                expected: 10_000,
                actual: 12_000,
                ..
            }
        ));
        assert!(!store.is_handled(task.inode).unwrap());
        assert_eq!(stats.snapshot().processed_files, 0);
    }
}
