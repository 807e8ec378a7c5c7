//! Checkpoint store: records which inodes have been rewritten.
//!
//! With resume enabled the ledger is an SQLite database kept in a hidden
//! directory at the root of the scanned tree. Each `mark_handled` commits on
//! its own with `synchronous = FULL`, so once it returns a crash can no longer
//! cause that file to be processed again. Without resume, an in-memory set
//! scoped to the run takes its place and nothing touches the disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{RecompressError, RecompressResult};
use crate::task::InodeKey;

/// Hidden directory holding the ledger, relative to the scanned root.
pub const LEDGER_DIR_NAME: &str = ".zfs-inplace-recompress-resume";

const LEDGER_FILE_NAME: &str = "ledger.sqlite3";
const HANDLED_MARKER: &str = "handled";
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Location of the ledger directory for `root`.
pub fn ledger_dir(root: &Path) -> PathBuf {
    root.join(LEDGER_DIR_NAME)
}

/// Persistent or transient record of handled inodes.
///
/// Implementations are shared by all workers and must be safe for
/// concurrent use.
pub trait CheckpointStore: Send + Sync {
    /// True when `key` was recorded as handled.
    fn is_handled(&self, key: InodeKey) -> RecompressResult<bool>;

    /// Records `key` as handled. Durable on return for persistent stores.
    fn mark_handled(&self, key: InodeKey) -> RecompressResult<()>;

    /// Number of recorded inodes.
    fn handled_count(&self) -> RecompressResult<u64>;

    /// Releases the store, keeping its contents for a later run.
    fn close(&self) -> RecompressResult<()>;

    /// Closes the store and deletes its contents.
    fn discard(&self) -> RecompressResult<()>;

    /// True when records survive the process.
    fn is_persistent(&self) -> bool;
}

/// Opens the store for a run over `root`.
///
/// Any failure to open the persistent ledger is reported as
/// [`RecompressError::LedgerUnavailable`].
pub fn open_store(root: &Path, resume: bool) -> RecompressResult<Arc<dyn CheckpointStore>> {
    if resume {
        Ok(Arc::new(SqliteLedger::open(root)?))
    } else {
        Ok(Arc::new(MemoryLedger::new()))
    }
}

/// SQLite-backed ledger keyed by `(device, inode)`.
pub struct SqliteLedger {
    dir: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl SqliteLedger {
    /// Opens or creates the ledger under `root`.
    pub fn open(root: &Path) -> RecompressResult<Self> {
        let dir = ledger_dir(root);
        let unavailable = |reason: String| RecompressError::LedgerUnavailable {
            path: dir.clone(),
            reason,
        };

        std::fs::create_dir_all(&dir).map_err(|e| unavailable(e.to_string()))?;
        let conn = Connection::open(dir.join(LEDGER_FILE_NAME))
            .and_then(|conn| {
                Self::prepare(&conn)?;
                Ok(conn)
            })
            .map_err(|e| unavailable(e.to_string()))?;

        let existing: i64 = conn
            .query_row("SELECT COUNT(*) FROM handled", [], |row| row.get(0))
            .map_err(|e| unavailable(e.to_string()))?;
        if existing > 0 {
            info!(
                path = %dir.display(),
                entries = existing,
                "Resuming from existing ledger"
            );
        } else {
            debug!(path = %dir.display(), "Opened empty ledger");
        }

        Ok(Self {
            dir,
            conn: Mutex::new(Some(conn)),
        })
    }

    fn prepare(conn: &Connection) -> rusqlite::Result<()> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS handled (
                dev INTEGER NOT NULL,
                ino INTEGER NOT NULL,
                marker TEXT NOT NULL,
                PRIMARY KEY (dev, ino)
            ) WITHOUT ROWID",
            [],
        )?;
        Ok(())
    }

    /// Directory holding the database files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> RecompressResult<T> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or_else(|| RecompressError::LedgerUnavailable {
            path: self.dir.clone(),
            reason: "ledger already closed".to_string(),
        })?;
        Ok(f(conn)?)
    }
}

// SQLite stores signed 64-bit integers; keys are bit-cast so the full u64
// range round-trips.
fn sql_key(key: InodeKey) -> (i64, i64) {
    (key.device as i64, key.inode as i64)
}

impl CheckpointStore for SqliteLedger {
    fn is_handled(&self, key: InodeKey) -> RecompressResult<bool> {
        let (dev, ino) = sql_key(key);
        let marker: Option<String> = self.with_conn(|conn| {
            conn.prepare_cached("SELECT marker FROM handled WHERE dev = ?1 AND ino = ?2")?
                .query_row(params![dev, ino], |row| row.get(0))
                .optional()
        })?;
        Ok(marker.as_deref() == Some(HANDLED_MARKER))
    }

    fn mark_handled(&self, key: InodeKey) -> RecompressResult<()> {
        let (dev, ino) = sql_key(key);
        self.with_conn(|conn| {
            conn.prepare_cached(
                "INSERT OR REPLACE INTO handled (dev, ino, marker) VALUES (?1, ?2, ?3)",
            )?
            .execute(params![dev, ino, HANDLED_MARKER])
        })?;
        Ok(())
    }

    fn handled_count(&self) -> RecompressResult<u64> {
        let count: i64 =
            self.with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM handled", [], |row| row.get(0)))?;
        Ok(count.max(0) as u64)
    }

    fn close(&self) -> RecompressResult<()> {
        if let Some(conn) = self.conn.lock().take() {
            conn.close().map_err(|(_, e)| RecompressError::Ledger(e))?;
            debug!(path = %self.dir.display(), "Closed ledger");
        }
        Ok(())
    }

    fn discard(&self) -> RecompressResult<()> {
        self.close()?;
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {
                debug!(path = %self.dir.display(), "Removed ledger");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RecompressError::io(&self.dir, e)),
        }
    }

    fn is_persistent(&self) -> bool {
        true
    }
}

/// Transient ledger for runs without resume.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    handled: DashSet<InodeKey>,
}

impl MemoryLedger {
    /// Creates an empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryLedger {
    fn is_handled(&self, key: InodeKey) -> RecompressResult<bool> {
        Ok(self.handled.contains(&key))
    }

    fn mark_handled(&self, key: InodeKey) -> RecompressResult<()> {
        self.handled.insert(key);
        Ok(())
    }

    fn handled_count(&self) -> RecompressResult<u64> {
        Ok(self.handled.len() as u64)
    }

    fn close(&self) -> RecompressResult<()> {
        Ok(())
    }

    fn discard(&self) -> RecompressResult<()> {
        self.handled.clear();
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        false
    }
}
