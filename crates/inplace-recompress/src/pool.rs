//! Dispatcher and worker pool driving one recompression run.
//!
//! The scanner runs on a blocking thread and feeds a bounded queue whose
//! capacity equals the worker count, so it never runs far ahead of the
//! workers. Each worker owns one copy buffer for the whole run and moves it
//! into a blocking task per file. Once the scan returns the queue is closed
//! and workers drain whatever is still queued, even after a stop request.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::RunConfig;
use crate::control::{RunControl, StatsSnapshot, StopReason};
use crate::error::{RecompressError, RecompressResult};
use crate::filter::{evaluate, Decision};
use crate::ledger::{open_store, CheckpointStore};
use crate::rewrite::RewriteEngine;
use crate::scanner::{ScanSummary, Scanner};
use crate::task::FileTask;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The whole tree was walked and every eligible file rewritten.
    Completed,
    /// The whole tree was walked but some files failed.
    CompletedWithErrors,
    /// An interrupt stopped the scan; queued work was drained.
    Interrupted,
    /// An interrupt stopped the scan and some files failed before or while
    /// draining.
    InterruptedWithErrors,
    /// A file error stopped the scan.
    Aborted,
}

impl RunOutcome {
    /// Process exit status for this outcome.
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::Completed | RunOutcome::Interrupted => 0,
            RunOutcome::CompletedWithErrors
            | RunOutcome::InterruptedWithErrors
            | RunOutcome::Aborted => 1,
        }
    }

    fn classify(reason: Option<StopReason>, failed_files: u64) -> Self {
        match (reason, failed_files) {
            (Some(StopReason::Interrupted), 0) => RunOutcome::Interrupted,
            (Some(StopReason::Interrupted), _) => RunOutcome::InterruptedWithErrors,
            (Some(StopReason::FileError), _) => RunOutcome::Aborted,
            (None, 0) => RunOutcome::Completed,
            (None, _) => RunOutcome::CompletedWithErrors,
        }
    }
}

/// Summary returned when a run finishes.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Final counter values.
    pub stats: StatsSnapshot,
    /// Walk totals.
    pub scan: ScanSummary,
    /// True when a persistent ledger was left on disk for resuming.
    pub ledger_kept: bool,
}

struct Worker {
    config: Arc<RunConfig>,
    store: Arc<dyn CheckpointStore>,
    engine: Arc<RewriteEngine>,
    control: Arc<RunControl>,
}

impl Worker {
    async fn run(self, id: usize, queue: Arc<Mutex<mpsc::Receiver<FileTask>>>) {
        let mut buffer = vec![0u8; self.config.buffer_size];
        loop {
            let next = queue.lock().await.recv().await;
            let Some(task) = next else {
                break;
            };

            let config = Arc::clone(&self.config);
            let store = Arc::clone(&self.store);
            let engine = Arc::clone(&self.engine);
            let control = Arc::clone(&self.control);
            let path = task.path.clone();

            let joined = tokio::task::spawn_blocking(move || {
                let result = process(&task, &config, store.as_ref(), &engine, &control, &mut buffer);
                (buffer, result)
            })
            .await;

            let result = match joined {
                Ok((returned, result)) => {
                    buffer = returned;
                    result
                }
                Err(e) => {
                    buffer = vec![0u8; self.config.buffer_size];
                    Err(RecompressError::Join(e))
                }
            };

            if let Err(e) = result {
                self.fail(&path, e);
            }
        }
        debug!(worker = id, "Worker finished");
    }

    fn fail(&self, path: &Path, err: RecompressError) {
        error!(path = %path.display(), error = %err, "Error processing file");
        self.control.stats().record_failed();
        if !self.config.continue_on_error && self.control.request_stop(StopReason::FileError) {
            warn!("Stopping scan after file error, waiting for workers to finish");
        }
    }
}

/// Filters one task and rewrites it when eligible.
fn process(
    task: &FileTask,
    config: &RunConfig,
    store: &dyn CheckpointStore,
    engine: &RewriteEngine,
    control: &RunControl,
    buffer: &mut [u8],
) -> RecompressResult<()> {
    match evaluate(task, config, store)? {
        Decision::Skip(reason) => {
            debug!(path = %task.path.display(), %reason, "Skipping file");
            control.stats().record_skipped(task.size);
            Ok(())
        }
        Decision::Process => engine.rewrite(task, buffer, control.stats()),
    }
}

/// Runs the engine over `root` with an already-opened store.
pub async fn run_with_store(
    root: PathBuf,
    config: RunConfig,
    store: Arc<dyn CheckpointStore>,
    control: Arc<RunControl>,
) -> RecompressResult<RunReport> {
    let config = Arc::new(config);
    let engine = Arc::new(RewriteEngine::new(Arc::clone(&store), config.sync_data));
    let (tx, rx) = mpsc::channel::<FileTask>(config.workers);
    let queue = Arc::new(Mutex::new(rx));

    info!(
        root = %root.display(),
        workers = config.workers,
        buffer_size = config.buffer_size,
        resume = store.is_persistent(),
        "Starting recompression run"
    );

    let mut workers = JoinSet::new();
    for id in 0..config.workers {
        let worker = Worker {
            config: Arc::clone(&config),
            store: Arc::clone(&store),
            engine: Arc::clone(&engine),
            control: Arc::clone(&control),
        };
        workers.spawn(worker.run(id, Arc::clone(&queue)));
    }

    let mut scanner = Scanner::new(root, Arc::clone(&control));
    let scan = tokio::task::spawn_blocking(move || {
        scanner.scan(|task| tx.blocking_send(task).is_ok())
    })
    .await;

    // The sender is dropped with the scan closure, so workers see the queue
    // close once it is empty.
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Worker task failed");
        }
    }
    let scan = match scan {
        Ok(scan) => scan,
        Err(e) => {
            if let Err(close_err) = store.close() {
                warn!(error = %close_err, "Failed to close ledger after scan failure");
            }
            return Err(RecompressError::Join(e));
        }
    };

    let stats = control.stats().snapshot();
    let outcome = RunOutcome::classify(control.stop_reason(), stats.failed_files);
    let discard = outcome == RunOutcome::Completed && !config.keep_ledger;
    let ledger_kept = finish_store(store.as_ref(), discard);

    debug!(
        files = scan.files,
        dirs = scan.dirs,
        duplicates = scan.duplicates,
        walk_errors = scan.errors,
        "Scan finished"
    );

    Ok(RunReport {
        outcome,
        stats,
        scan,
        ledger_kept,
    })
}

/// Closes or discards the store at the end of a run.
///
/// Returns true when a persistent ledger is left on disk. Failures are logged
/// so the run's report survives them.
fn finish_store(store: &dyn CheckpointStore, discard: bool) -> bool {
    if discard {
        match store.discard() {
            Ok(()) => false,
            Err(e) => {
                error!(error = %e, "Failed to remove ledger after a clean run");
                store.is_persistent()
            }
        }
    } else {
        if let Err(e) = store.close() {
            error!(error = %e, "Failed to close ledger");
        }
        store.is_persistent()
    }
}

/// Opens the store for `config.resume` and runs the engine over `root`.
///
/// Fails before touching any file if `root` is not a directory or the
/// persistent ledger cannot be opened.
pub async fn run(
    root: impl AsRef<Path>,
    config: RunConfig,
    control: Arc<RunControl>,
) -> RecompressResult<RunReport> {
    let root = root.as_ref().to_path_buf();
    let config = config.validate()?;
    if !root.is_dir() {
        return Err(RecompressError::NotADirectory { path: root });
    }
    let store = {
        let root = root.clone();
        let resume = config.resume;
        tokio::task::spawn_blocking(move || open_store(&root, resume)).await??
    };
    run_with_store(root, config, store, control).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunOutcome::Completed.exit_code(), 0);
        assert_eq!(RunOutcome::Interrupted.exit_code(), 0);
        assert_eq!(RunOutcome::CompletedWithErrors.exit_code(), 1);
        assert_eq!(RunOutcome::InterruptedWithErrors.exit_code(), 1);
        assert_eq!(RunOutcome::Aborted.exit_code(), 1);
    }

    #[test]
    fn test_classify_outcome() {
        use crate::control::StopReason::{FileError, Interrupted};

        assert_eq!(RunOutcome::classify(None, 0), RunOutcome::Completed);
        assert_eq!(RunOutcome::classify(None, 3), RunOutcome::CompletedWithErrors);
        assert_eq!(RunOutcome::classify(Some(Interrupted), 0), RunOutcome::Interrupted);
        assert_eq!(
            RunOutcome::classify(Some(Interrupted), 1),
            RunOutcome::InterruptedWithErrors
        );
        assert_eq!(RunOutcome::classify(Some(FileError), 1), RunOutcome::Aborted);
    }

    #[tokio::test]
    async fn test_run_rejects_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("not-there");
        let err = run(&missing, RunConfig::default(), Arc::new(RunControl::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, RecompressError::NotADirectory { .. }));
        assert!(!missing.exists());
    }

    #[tokio::test]
    async fn test_run_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig {
            workers: 2,
            buffer_size: 4096,
            ..RunConfig::default()
        };
        let report = run(dir.path(), config, Arc::new(RunControl::new()))
            .await
            .unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.stats, StatsSnapshot::default());
        assert!(!report.ledger_kept);
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig {
            workers: 0,
            ..RunConfig::default()
        };
        let err = run(dir.path(), config, Arc::new(RunControl::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, RecompressError::Config(_)));
    }
}
