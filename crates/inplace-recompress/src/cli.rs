use std::path::PathBuf;

use clap::Parser;
use inplace_recompress::{FileConfig, IgnoreSet, RecompressResult, RunConfig};

#[derive(Parser, Debug)]
#[command(name = "inplace-recompress")]
#[command(
    about = "Rewrite files in place so a compressing filesystem recompresses them",
    long_about = None
)]
pub struct Cli {
    /// Tree to process.
    #[arg(default_value = ".")]
    pub root: PathBuf,

    /// Comma-separated ignore patterns replacing the built-in set.
    #[arg(long, env = "INPLACE_RECOMPRESS_IGNORE")]
    pub ignore: Option<String>,

    /// Comma-separated ignore patterns added to the active set.
    #[arg(long, env = "INPLACE_RECOMPRESS_IGNORE_ADD")]
    pub ignore_add: Option<String>,

    /// Minimum file size in bytes.
    #[arg(long, env = "INPLACE_RECOMPRESS_MIN_FILE_SIZE")]
    pub min_file_size: Option<u64>,

    /// Skip files whose allocated size times this ratio is not below their
    /// logical size (0 disables).
    #[arg(long, env = "INPLACE_RECOMPRESS_SKIP_RATIO")]
    pub skip_ratio: Option<f64>,

    /// Do not create or use the resume ledger.
    #[arg(long, env = "INPLACE_RECOMPRESS_NO_RESUME")]
    pub no_resume: bool,

    /// Number of parallel file I/O workers.
    #[arg(long, env = "INPLACE_RECOMPRESS_THREADS")]
    pub threads: Option<usize>,

    /// Copy buffer size per worker in bytes.
    #[arg(long, env = "INPLACE_RECOMPRESS_BUFFER_SIZE")]
    pub buffer_size: Option<usize>,

    /// Keep going after per-file errors.
    #[arg(long, env = "INPLACE_RECOMPRESS_CONTINUE_ON_ERROR")]
    pub continue_on_error: bool,

    /// fdatasync each file before recording it as handled.
    #[arg(long, env = "INPLACE_RECOMPRESS_SYNC")]
    pub sync: bool,

    /// Keep the resume ledger after a clean run.
    #[arg(long, env = "INPLACE_RECOMPRESS_KEEP_LEDGER")]
    pub keep_ledger: bool,

    /// TOML or JSON file providing defaults.
    #[arg(short, long, env = "INPLACE_RECOMPRESS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log every per-file decision.
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Resolves flags over the config file and built-in defaults.
    pub fn run_config(&self) -> RecompressResult<RunConfig> {
        let mut file = match &self.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };

        if let Some(list) = &self.ignore {
            file.ignore = Some(IgnoreSet::parse_list(list)?.as_strings());
        }
        if let Some(list) = &self.ignore_add {
            file.ignore_add.extend(list.split(',').map(str::to_string));
        }
        if let Some(size) = self.min_file_size {
            file.min_file_size = Some(size);
        }
        if let Some(ratio) = self.skip_ratio {
            file.skip_ratio = Some(ratio);
        }
        if let Some(threads) = self.threads {
            file.threads = Some(threads);
        }
        if let Some(size) = self.buffer_size {
            file.buffer_size = Some(size);
        }
        if self.no_resume {
            file.resume = Some(false);
        }
        if self.continue_on_error {
            file.continue_on_error = Some(true);
        }
        if self.sync {
            file.sync = Some(true);
        }
        if self.keep_ledger {
            file.keep_ledger = Some(true);
        }

        file.into_run_config()
    }
}
