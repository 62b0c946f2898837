//! Folder scanning (pure, no side effects).
//!
//! Walks a directory tree and returns the files that may be delivered
//! through the remote store. Output is sorted so an unchanged tree always
//! yields the same index.

use std::path::{Component, Path, PathBuf};

use jwalk::WalkDir;
use serde::{Deserialize, Serialize};

/// Directory names never descended into.
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &["node_modules", "vendor"];

/// Extensions never delivered (source, metadata and server-side files).
pub const DEFAULT_EXCLUDE_EXT: &[&str] = &["php", "json", "map", "scss", "md", "txt", "xml", "crt"];

/// Filters applied while scanning a folder.
///
/// ```toml
/// [cache.scan]
/// exclude_dirs = ["node_modules", "vendor"]
/// exclude_ext = ["php", "map"]
/// include_ext = []          # empty: every extension not excluded
/// max_depth = 16
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanRules {
    pub exclude_dirs: Vec<String>,
    pub exclude_ext: Vec<String>,
    pub include_ext: Vec<String>,
    pub max_depth: usize,
}

impl Default for ScanRules {
    fn default() -> Self {
        Self {
            exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(|s| s.to_string()).collect(),
            exclude_ext: DEFAULT_EXCLUDE_EXT.iter().map(|s| s.to_string()).collect(),
            include_ext: Vec::new(),
            max_depth: usize::MAX,
        }
    }
}

impl ScanRules {
    /// Check whether a file (relative to the scanned root) passes the filters.
    pub fn accepts(&self, relative: &Path) -> bool {
        let mut components = relative.components().peekable();
        while let Some(component) = components.next() {
            // Only directories count against `exclude_dirs`
            if components.peek().is_none() {
                break;
            }
            if let Component::Normal(name) = component
                && self.exclude_dirs.iter().any(|d| name == d.as_str())
            {
                return false;
            }
        }

        let ext = relative
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if self.exclude_ext.iter().any(|e| e.eq_ignore_ascii_case(&ext)) {
            return false;
        }
        self.include_ext.is_empty() || self.include_ext.iter().any(|e| e.eq_ignore_ascii_case(&ext))
    }
}

/// Collect all eligible files under `root`, sorted lexicographically.
///
/// A missing root yields an empty list.
pub fn scan_folder(root: &Path, rules: &ScanRules) -> Vec<PathBuf> {
    if !root.is_dir() {
        return Vec::new();
    }

    let mut files: Vec<_> = WalkDir::new(root)
        .max_depth(rules.max_depth)
        .skip_hidden(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path())
        .filter(|path| {
            path.strip_prefix(root)
                .is_ok_and(|relative| rules.accepts(relative))
        })
        .collect();
    files.sort();
    files
}
