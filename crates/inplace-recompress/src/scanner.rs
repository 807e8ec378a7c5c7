//! Directory scanner producing one task per distinct regular file.
//!
//! Inode identities are claimed here, before a task exists, so that a file
//! reachable through several hardlinks is dispatched once no matter which
//! path the walk reaches first. Unreadable directories and entries are logged
//! and skipped. The ledger directory is never descended into.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::control::RunControl;
use crate::ledger::LEDGER_DIR_NAME;
use crate::task::{FileTask, InodeKey};

/// Totals from one walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Tasks handed to the sink.
    pub files: u64,
    /// Directories visited.
    pub dirs: u64,
    /// Extra paths to an inode that was already scheduled.
    pub duplicates: u64,
    /// Entries that could not be read.
    pub errors: u64,
}

/// Walks one tree, honouring the run's stop signal.
pub struct Scanner {
    root: PathBuf,
    control: Arc<RunControl>,
    seen: HashSet<InodeKey>,
}

impl Scanner {
    /// Creates a scanner rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, control: Arc<RunControl>) -> Self {
        Self {
            root: root.into(),
            control,
            seen: HashSet::new(),
        }
    }

    /// The scanned root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walks the tree and hands each new task to `sink`.
    ///
    /// Stops early when the run is stopped, or when `sink` returns false
    /// because the consumer has gone away.
    pub fn scan(&mut self, mut sink: impl FnMut(FileTask) -> bool) -> ScanSummary {
        let mut summary = ScanSummary::default();
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !is_ledger_dir(e));

        for entry in walker {
            if self.control.is_stopped() {
                debug!("Scan stopped");
                break;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(
                        path = ?e.path(),
                        error = %e,
                        "Error walking directory, skipping entry"
                    );
                    summary.errors += 1;
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                summary.dirs += 1;
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(e) => {
                    warn!(
                        path = %entry.path().display(),
                        error = %e,
                        "Failed to stat file, skipping"
                    );
                    summary.errors += 1;
                    continue;
                }
            };

            let task = FileTask::from_metadata(entry.path(), &meta);
            if !self.seen.insert(task.inode) {
                debug!(
                    path = %task.path.display(),
                    inode = %task.inode,
                    "Inode already scheduled through another link"
                );
                summary.duplicates += 1;
                continue;
            }

            summary.files += 1;
            if !sink(task) {
                debug!("Task queue closed, ending scan");
                break;
            }
        }

        summary
    }
}

fn is_ledger_dir(entry: &DirEntry) -> bool {
    entry.depth() == 1 && entry.file_type().is_dir() && entry.file_name() == LEDGER_DIR_NAME
}
