//! Shared run context: the stop signal and the run counters.
//!
//! One [`RunControl`] is created per run and shared by `Arc` between the
//! scanner, the worker pool and the signal listener. Stopping is cooperative:
//! the scanner stops producing tasks and workers drain what is queued, but a
//! rewrite in progress is never interrupted.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Why a run was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// An operating-system interrupt was received.
    Interrupted,
    /// A worker reported a per-file error and errors are fatal.
    FileError,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Interrupted => write!(f, "interrupted"),
            StopReason::FileError => write!(f, "aborted due to a file error"),
        }
    }
}

/// Monotonic counters updated by all workers.
#[derive(Debug, Default)]
pub struct RunStats {
    processed_files: AtomicU64,
    processed_bytes: AtomicU64,
    skipped_files: AtomicU64,
    skipped_bytes: AtomicU64,
    failed_files: AtomicU64,
}

impl RunStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one successfully rewritten file.
    pub fn record_processed(&self, bytes: u64) {
        self.processed_files.fetch_add(1, Ordering::Relaxed);
        self.processed_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Records one skipped file.
    pub fn record_skipped(&self, bytes: u64) {
        self.skipped_files.fetch_add(1, Ordering::Relaxed);
        self.skipped_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Records one file that failed to rewrite.
    pub fn record_failed(&self) {
        self.failed_files.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads all counters at once.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed_files: self.processed_files.load(Ordering::Relaxed),
            processed_bytes: self.processed_bytes.load(Ordering::Relaxed),
            skipped_files: self.skipped_files.load(Ordering::Relaxed),
            skipped_bytes: self.skipped_bytes.load(Ordering::Relaxed),
            failed_files: self.failed_files.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RunStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Files rewritten.
    pub processed_files: u64,
    /// Logical bytes rewritten.
    pub processed_bytes: u64,
    /// Files skipped by the eligibility filter.
    pub skipped_files: u64,
    /// Logical bytes of skipped files.
    pub skipped_bytes: u64,
    /// Files whose rewrite failed.
    pub failed_files: u64,
}

/// Stop signal plus counters for one run.
#[derive(Debug, Default)]
pub struct RunControl {
    token: CancellationToken,
    reason: OnceLock<StopReason>,
    stats: RunStats,
}

impl RunControl {
    /// Creates a fresh, running context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the stop signal. Only the first reason is kept; returns true
    /// for the call that actually set it.
    pub fn request_stop(&self, reason: StopReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        self.token.cancel();
        first
    }

    /// True once any component has raised the stop signal.
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The reason recorded by the first `request_stop`, if any.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.reason.get().copied()
    }

    /// Token that resolves when the run is stopped.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The shared counters.
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Spawns a task that turns Ctrl-C into a graceful stop.
    ///
    /// The task ends on its own once the run is stopped for any reason.
    pub fn spawn_interrupt_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let control = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => {
                        warn!("Terminating, please wait for workers to finish their files");
                        control.request_stop(StopReason::Interrupted);
                    }
                    Err(e) => error!(error = %e, "Failed to listen for interrupt"),
                },
                _ = control.token().cancelled() => {}
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_accumulate() {
        let stats = RunStats::new();
        stats.record_processed(100);
        stats.record_processed(50);
        stats.record_skipped(7);
        stats.record_failed();

        let snap = stats.snapshot();
        assert_eq!(snap.processed_files, 2);
        assert_eq!(snap.processed_bytes, 150);
        assert_eq!(snap.skipped_files, 1);
        assert_eq!(snap.skipped_bytes, 7);
        assert_eq!(snap.failed_files, 1);
    }

    #[test]
    fn test_stats_concurrent_updates() {
        let stats = Arc::new(RunStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record_skipped(2);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snap = stats.snapshot();
        assert_eq!(snap.skipped_files, 8000);
        assert_eq!(snap.skipped_bytes, 16000);
    }

    #[test]
    fn test_new_control_is_running() {
        let control = RunControl::new();
        assert!(!control.is_stopped());
        assert_eq!(control.stop_reason(), None);
    }

    #[test]
    fn test_first_stop_reason_wins() {
        let control = RunControl::new();
        assert!(control.request_stop(StopReason::Interrupted));
        assert!(!control.request_stop(StopReason::FileError));
        assert!(control.is_stopped());
        assert_eq!(control.stop_reason(), Some(StopReason::Interrupted));
    }

    #[test]
    fn test_stop_reason_display() {
        assert_eq!(StopReason::Interrupted.to_string(), "interrupted");
        assert_eq!(
            StopReason::FileError.to_string(),
            "aborted due to a file error"
        );
    }

    #[tokio::test]
    async fn test_token_resolves_on_stop() {
        let control = Arc::new(RunControl::new());
        let waiter = {
            let control = Arc::clone(&control);
            tokio::spawn(async move { control.token().cancelled().await })
        };
        control.request_stop(StopReason::FileError);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_interrupt_listener_exits_on_stop() {
        let control = Arc::new(RunControl::new());
        let listener = control.spawn_interrupt_listener();
        control.request_stop(StopReason::FileError);
        listener.await.unwrap();
        assert_eq!(control.stop_reason(), Some(StopReason::FileError));
    }
}
