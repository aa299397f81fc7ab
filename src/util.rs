//! Shared utility functions.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::Result;

/// Resolve a set of glob patterns against a project root into a sorted,
/// deduplicated file list.
///
/// Patterns that match nothing contribute nothing; an empty result is legal
/// and left to the caller to interpret (compile and clean treat it as a
/// successful no-op).
pub fn resolve_globs(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = BTreeSet::new();
    for pattern in patterns {
        let absolute = root.join(pattern);
        let pattern_str = absolute.to_string_lossy();
        for entry in glob::glob(&pattern_str)? {
            let path = entry?;
            if path.is_file() {
                files.insert(path);
            }
        }
    }
    Ok(files.into_iter().collect())
}

/// Relativize a path against the project root for display, falling back to
/// the path itself when it lies outside the root.
pub fn display_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}
