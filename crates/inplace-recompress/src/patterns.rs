//! Compiled, case-insensitive ignore patterns.
//!
//! Patterns are matched against the file name only. A bare extension such as
//! `jpg` or `.jpg` expands to `*.jpg`; anything carrying glob metacharacters
//! is compiled verbatim.

use glob::{MatchOptions, Pattern};

use crate::error::{RecompressError, RecompressResult};

/// Formats that carry no useful entropy left to recompress.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    // Compressed images
    "jpg", "jpeg", "png", "gif", "webp",
    // Compressed archives
    "zip", "gz", "bz2", "xz", "7z", "z77", "rar",
    // Compressed video
    "mp4", "avi", "mkv", "flv", "webm",
    // Compressed audio
    "mp3", "wav", "ogg", "flac",
    // Compound office documents and other packed formats
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "odp", "odg", "odf",
    "odc", "odm", "ncf", "deb",
];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Immutable set of ignore globs built once per run.
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    patterns: Vec<Pattern>,
}

impl IgnoreSet {
    /// Compiles a set from pattern strings. Empty entries are dropped and
    /// duplicates are compiled once.
    pub fn new<I, S>(patterns: I) -> RecompressResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut compiled: Vec<Pattern> = Vec::new();
        for raw in patterns {
            let Some(text) = normalize(raw.as_ref()) else {
                continue;
            };
            if compiled.iter().any(|p| p.as_str() == text) {
                continue;
            }
            let pattern = Pattern::new(&text).map_err(|e| RecompressError::InvalidPattern {
                pattern: raw.as_ref().to_string(),
                reason: e.msg.to_string(),
            })?;
            compiled.push(pattern);
        }
        Ok(Self { patterns: compiled })
    }

    /// The built-in set of [`DEFAULT_IGNORE_PATTERNS`].
    pub fn defaults() -> Self {
        // The built-in list holds only plain extensions, which always compile.
        Self::new(DEFAULT_IGNORE_PATTERNS).unwrap_or_default()
    }

    /// Parses a comma-separated list as given on the command line.
    pub fn parse_list(list: &str) -> RecompressResult<Self> {
        Self::new(list.split(','))
    }

    /// Returns a new set holding these patterns followed by `extra`.
    pub fn extended<I, S>(&self, extra: I) -> RecompressResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let current: Vec<String> = self.patterns.iter().map(|p| p.as_str().to_string()).collect();
        let extra: Vec<String> = extra.into_iter().map(|s| s.as_ref().to_string()).collect();
        Self::new(current.iter().chain(extra.iter()))
    }

    /// True when `file_name` matches any pattern, ignoring case.
    pub fn matches(&self, file_name: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches_with(file_name, MATCH_OPTIONS))
    }

    /// Number of compiled patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// True when no pattern is configured.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Compiled pattern strings, in insertion order.
    pub fn as_strings(&self) -> Vec<String> {
        self.patterns.iter().map(|p| p.as_str().to_string()).collect()
    }
}

fn normalize(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.contains(['*', '?', '[']) {
        return Some(trimmed.to_string());
    }
    let ext = trimmed.trim_start_matches('.');
    if ext.is_empty() {
        return None;
    }
    Some(format!("*.{}", ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_case_insensitively() {
        let set = IgnoreSet::defaults();
        assert!(set.matches("photo.JPG"));
        assert!(set.matches("photo.jpg"));
        assert!(set.matches("Archive.Tar.Gz"));
        assert!(!set.matches("notes.txt"));
    }

    #[test]
    fn test_extension_must_follow_dot() {
        let set = IgnoreSet::defaults();
        assert!(!set.matches("jpg"));
        assert!(!set.matches("catalog"));
    }

    #[test]
    fn test_bare_and_dotted_extensions_are_equivalent() {
        let set = IgnoreSet::new(["iso", ".img"]).unwrap();
        assert_eq!(set.as_strings(), vec!["*.iso", "*.img"]);
        assert!(set.matches("disk.IMG"));
    }

    #[test]
    fn test_globs_are_kept_verbatim() {
        let set = IgnoreSet::new(["core.[0-9]*", "*.tar.*"]).unwrap();
        assert!(set.matches("core.1234"));
        assert!(set.matches("backup.TAR.zst"));
        assert!(!set.matches("core.dump"));
    }

    #[test]
    fn test_parse_list_drops_empty_and_duplicates() {
        let set = IgnoreSet::parse_list("jpg, ,png,jpg,").unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_extended_appends() {
        let set = IgnoreSet::parse_list("jpg").unwrap().extended(["qcow2"]).unwrap();
        assert!(set.matches("vm.qcow2"));
        assert!(set.matches("a.jpg"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = IgnoreSet::new(["[abc"]).unwrap_err();
        assert!(matches!(err, RecompressError::InvalidPattern { .. }));
    }

    #[test]
    fn test_empty_set_matches_nothing() {
        let set = IgnoreSet::new(Vec::<String>::new()).unwrap();
        assert!(set.is_empty());
        assert!(!set.matches("a.jpg"));
    }
}
