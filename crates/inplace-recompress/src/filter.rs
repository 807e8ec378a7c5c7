//! Eligibility filter: decides whether a scanned file is rewritten.
//!
//! Checks run in a fixed order and the first match wins: size, ignore
//! pattern, allocation ratio, then the ledger. The ledger lookup is last
//! since it is the only check that leaves the process.

use std::fmt;

use crate::config::RunConfig;
use crate::error::RecompressResult;
use crate::ledger::CheckpointStore;
use crate::task::FileTask;

/// Why a file was not rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Empty, or smaller than the minimum size.
    TooSmall,
    /// File name matches an ignore pattern.
    IgnoredType,
    /// Allocated footprint is not below the ratio threshold.
    Ratio,
    /// Already handled by this or an earlier run.
    AlreadyDone,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::TooSmall => "too-small",
            SkipReason::IgnoredType => "ignored-type",
            SkipReason::Ratio => "ratio",
            SkipReason::AlreadyDone => "already-done",
        };
        f.write_str(s)
    }
}

/// Outcome of the eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Rewrite the file.
    Process,
    /// Leave the file alone.
    Skip(SkipReason),
}

/// True when `allocated * ratio` is strictly below `size`, i.e. the file
/// passes the ratio check and stays eligible. A ratio of 0 always passes.
pub fn passes_ratio(allocated: u64, size: u64, ratio: f64) -> bool {
    if ratio == 0.0 {
        return true;
    }
    (allocated as f64) * ratio < size as f64
}

/// Decides skip-vs-process for `task`.
pub fn evaluate(
    task: &FileTask,
    config: &RunConfig,
    store: &dyn CheckpointStore,
) -> RecompressResult<Decision> {
    if task.size == 0 || task.size < config.min_file_size {
        return Ok(Decision::Skip(SkipReason::TooSmall));
    }
    if config.ignore.matches(&task.file_name()) {
        return Ok(Decision::Skip(SkipReason::IgnoredType));
    }
    if !passes_ratio(task.allocated_bytes(), task.size, config.skip_ratio) {
        return Ok(Decision::Skip(SkipReason::Ratio));
    }
    if store.is_handled(task.inode)? {
        return Ok(Decision::Skip(SkipReason::AlreadyDone));
    }
    Ok(Decision::Process)
}
