#![warn(missing_docs)]

//! inplace-recompress: forces a compressing copy-on-write filesystem to
//! recompress existing files by rewriting each one onto itself.
//!
//! The crate is organised leaf-first: the immutable [`RunConfig`] policy, the
//! [`CheckpointStore`] resume ledger, the pure eligibility [`filter`], the
//! in-place [`rewrite`] engine, the tree [`scanner`] and the bounded worker
//! [`pool`] that ties them together under one [`RunControl`].

pub mod config;
pub mod control;
pub mod error;
pub mod filter;
pub mod ledger;
pub mod patterns;
pub mod pool;
pub mod rewrite;
pub mod scanner;
pub mod task;

pub use config::{FileConfig, RunConfig, DEFAULT_BUFFER_SIZE, DEFAULT_MIN_FILE_SIZE, DEFAULT_SKIP_RATIO};
pub use control::{RunControl, RunStats, StatsSnapshot, StopReason};
pub use error::{RecompressError, RecompressResult};
pub use filter::{evaluate, Decision, SkipReason};
pub use ledger::{open_store, CheckpointStore, MemoryLedger, SqliteLedger, LEDGER_DIR_NAME};
pub use patterns::{IgnoreSet, DEFAULT_IGNORE_PATTERNS};
pub use pool::{run, RunOutcome, RunReport};
pub use rewrite::{rewrite_in_place, RewriteEngine};
pub use scanner::Scanner;
pub use task::{FileTask, InodeKey, BLOCK_UNIT};
