//! Cleanup step: delete transient build files.
//!
//! The compiler leaves command files behind (`tscommand*.tmp.txt` in the
//! stock project); this step removes anything matching the configured glob
//! patterns. Missing matches are not an error: running the step twice in a
//! row leaves the filesystem in the same state and reports nothing the
//! second time.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::CleanConfig;
use crate::util::resolve_globs;
use crate::{nlog_debug, Result};

/// Report of one cleanup run.
#[derive(Debug, Clone, Default)]
pub struct CleanReport {
    /// Files that were successfully removed.
    pub removed: Vec<PathBuf>,
    /// Files that matched but could not be removed.
    pub failed: Vec<(PathBuf, String)>,
}

impl CleanReport {
    /// Create a new empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files removed.
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }

    /// Number of files that failed to be removed.
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Whether every matched file was removed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Deletes files matching the configured patterns.
pub struct Cleaner {
    patterns: Vec<String>,
    project_root: PathBuf,
}

impl Cleaner {
    pub fn new(config: &CleanConfig, project_root: &Path) -> Self {
        Self {
            patterns: config.patterns.clone(),
            project_root: project_root.to_path_buf(),
        }
    }

    /// Remove everything matching the patterns.
    ///
    /// A file that disappears between matching and removal counts as
    /// removed; only a real I/O failure lands in `failed`.
    pub fn run(&self) -> Result<CleanReport> {
        let mut report = CleanReport::new();
        for path in resolve_globs(&self.project_root, &self.patterns)? {
            match fs::remove_file(&path) {
                Ok(()) => report.removed.push(path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    report.removed.push(path);
                }
                Err(e) => report.failed.push((path, e.to_string())),
            }
        }
        nlog_debug!(
            "clean: removed {}, failed {}",
            report.removed_count(),
            report.failed_count()
        );
        Ok(report)
    }
}
