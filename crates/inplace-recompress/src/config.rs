//! Run policy: built-in defaults, optional config file, and validation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RecompressError, RecompressResult};
use crate::patterns::{IgnoreSet, DEFAULT_IGNORE_PATTERNS};

/// Files smaller than this are not worth rewriting.
pub const DEFAULT_MIN_FILE_SIZE: u64 = 16 * 1024;

/// Default allocated-to-logical ratio threshold; 0 disables the check.
pub const DEFAULT_SKIP_RATIO: f64 = 1.5;

/// Default per-worker copy buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024 * 1024;

const MIN_BUFFER_SIZE: usize = 4096;

/// Twice the available parallelism, as the default worker count.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        * 2
}

/// Immutable policy for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Compiled ignore patterns.
    pub ignore: IgnoreSet,
    /// Files below this many bytes are skipped.
    pub min_file_size: u64,
    /// Allocated-to-logical threshold; 0 disables the ratio check.
    pub skip_ratio: f64,
    /// Number of concurrent workers, also the queue capacity.
    pub workers: usize,
    /// Copy buffer size per worker.
    pub buffer_size: usize,
    /// Persist handled inodes so an interrupted run can resume.
    pub resume: bool,
    /// Count per-file errors instead of stopping the run on the first one.
    pub continue_on_error: bool,
    /// fdatasync each rewritten file before recording it as handled.
    pub sync_data: bool,
    /// Keep the ledger after a clean run so the next run skips handled files.
    pub keep_ledger: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            ignore: IgnoreSet::defaults(),
            min_file_size: DEFAULT_MIN_FILE_SIZE,
            skip_ratio: DEFAULT_SKIP_RATIO,
            workers: default_workers(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            resume: true,
            continue_on_error: false,
            sync_data: false,
            keep_ledger: false,
        }
    }
}

impl RunConfig {
    /// Checks value ranges and returns the config unchanged when valid.
    pub fn validate(self) -> RecompressResult<Self> {
        if self.workers == 0 {
            return Err(RecompressError::Config("worker count must be at least 1".into()));
        }
        if self.buffer_size < MIN_BUFFER_SIZE {
            return Err(RecompressError::Config(format!(
                "buffer size must be at least {} bytes, got {}",
                MIN_BUFFER_SIZE, self.buffer_size
            )));
        }
        if !self.skip_ratio.is_finite() || self.skip_ratio < 0.0 {
            return Err(RecompressError::Config(format!(
                "skip ratio must be a finite value >= 0, got {}",
                self.skip_ratio
            )));
        }
        Ok(self)
    }
}

/// Optional on-disk defaults, loaded from TOML or JSON.
///
/// Every field is optional; unset fields fall back to the built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Replaces the default ignore set.
    pub ignore: Option<Vec<String>>,
    /// Added to the active ignore set.
    pub ignore_add: Vec<String>,
    /// Minimum file size in bytes.
    pub min_file_size: Option<u64>,
    /// Skip ratio threshold.
    pub skip_ratio: Option<f64>,
    /// Worker count.
    pub threads: Option<usize>,
    /// Per-worker buffer size in bytes.
    pub buffer_size: Option<usize>,
    /// Resume ledger on/off.
    pub resume: Option<bool>,
    /// Keep going after per-file errors.
    pub continue_on_error: Option<bool>,
    /// fdatasync before recording a file as handled.
    pub sync: Option<bool>,
    /// Keep the ledger after a clean run.
    pub keep_ledger: Option<bool>,
}

impl FileConfig {
    /// Reads a config file, choosing the format by extension.
    pub fn from_file(path: &Path) -> RecompressResult<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| RecompressError::io(path, e))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)
                .map_err(|e| RecompressError::Config(format!("{}: {}", path.display(), e))),
            "json" => serde_json::from_str(&contents)
                .map_err(|e| RecompressError::Config(format!("{}: {}", path.display(), e))),
            _ => Err(RecompressError::Config(format!(
                "unsupported config file extension: {:?}",
                ext
            ))),
        }
    }

    /// Resolves these values over the built-in defaults.
    pub fn into_run_config(self) -> RecompressResult<RunConfig> {
        let base = RunConfig::default();
        let ignore = match &self.ignore {
            Some(list) => IgnoreSet::new(list)?,
            None => IgnoreSet::new(DEFAULT_IGNORE_PATTERNS)?,
        };
        let ignore = if self.ignore_add.is_empty() {
            ignore
        } else {
            ignore.extended(&self.ignore_add)?
        };

        RunConfig {
            ignore,
            min_file_size: self.min_file_size.unwrap_or(base.min_file_size),
            skip_ratio: self.skip_ratio.unwrap_or(base.skip_ratio),
            workers: self.threads.unwrap_or(base.workers),
            buffer_size: self.buffer_size.unwrap_or(base.buffer_size),
            resume: self.resume.unwrap_or(base.resume),
            continue_on_error: self.continue_on_error.unwrap_or(base.continue_on_error),
            sync_data: self.sync.unwrap_or(base.sync_data),
            keep_ledger: self.keep_ledger.unwrap_or(base.keep_ledger),
        }
        .validate()
    }
}
