//! Versioned folder index.
//!
//! Maps the public URL of every eligible file under a folder to the local
//! file tagged with the folder's version. The map is persisted per folder
//! and rebuilt only when the version changes (or the stored map is empty).

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use super::scan::{ScanRules, scan_folder};
use crate::store::{Store, StoreError};
use crate::utils::hash;
use crate::utils::path::forward_slashes;
use crate::{debug, log};

/// Store key prefix for folder entries
pub const INDEX_PREFIX: &str = "folder_";

/// Query-style suffix carrying the version of an indexed file
const VERSION_MARKER: &str = "?ver=";

/// Local file plus the version it was indexed under.
///
/// Serialized as `"<path>?ver=<version>"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct VersionedPath {
    pub path: String,
    pub version: String,
}

impl VersionedPath {
    pub fn new(path: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            version: version.into(),
        }
    }

    /// Split a `?ver=` suffix off an indexed value. No suffix means no version.
    pub fn parse(value: &str) -> Self {
        match value.rsplit_once(VERSION_MARKER) {
            Some((path, version)) => Self::new(path, version),
            None => Self::new(value, ""),
        }
    }
}

impl fmt::Display for VersionedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.path, VERSION_MARKER, self.version)
    }
}

impl From<String> for VersionedPath {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<VersionedPath> for String {
    fn from(value: VersionedPath) -> Self {
        value.to_string()
    }
}

/// Persisted index of one folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderCacheEntry {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub files: BTreeMap<String, VersionedPath>,
}

impl FolderCacheEntry {
    fn is_fresh(&self, version: &str) -> bool {
        !self.files.is_empty() && self.version == version
    }
}

/// Which prefix is removed from a scanned path before building its URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripMode {
    /// Relative to the folder itself (`style.css`)
    Folder,
    /// Relative to the folder's parent, keeping its name (`my-plugin/style.css`)
    Parent,
}

/// Folder index backed by the shared store.
#[derive(Debug)]
pub struct FolderIndex {
    store: Arc<Store>,
    rules: ScanRules,
    scans: AtomicUsize,
}

impl FolderIndex {
    pub fn new(store: Arc<Store>, rules: ScanRules) -> Self {
        Self {
            store,
            rules,
            scans: AtomicUsize::new(0),
        }
    }

    /// Store key of a folder.
    pub fn key(root: &Path) -> String {
        format!("{INDEX_PREFIX}{}", hash::fingerprint_path(root))
    }

    /// Number of filesystem scans performed so far.
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::Relaxed)
    }

    /// Return the URL → versioned file map of `root`, rescanning only when
    /// the stored entry is empty or was built for another version.
    pub fn index<F>(
        &self,
        root: &Path,
        version: &str,
        url_builder: F,
        strip: StripMode,
    ) -> BTreeMap<String, VersionedPath>
    where
        F: Fn(&str) -> String,
    {
        let key = Self::key(root);
        let cached: FolderCacheEntry = self.store.get_or_default(&key);
        if cached.is_fresh(version) {
            return cached.files;
        }

        let entry = self.rebuild(root, version, &url_builder, strip);
        log!("index"; "indexed {} files in {}", entry.files.len(), root.display());

        if let Err(e) = self.store.set(&key, &entry) {
            log!("error"; "failed to persist index of {}: {}", root.display(), e);
        }
        entry.files
    }

    /// Forget the index of `root`. Returns whether an entry existed.
    pub fn invalidate(&self, root: &Path) -> Result<bool, StoreError> {
        let removed = self.store.delete(&Self::key(root))?;
        if removed {
            debug!("index"; "invalidated {}", root.display());
        }
        Ok(removed)
    }

    fn rebuild(
        &self,
        root: &Path,
        version: &str,
        url_builder: &dyn Fn(&str) -> String,
        strip: StripMode,
    ) -> FolderCacheEntry {
        self.scans.fetch_add(1, Ordering::Relaxed);

        let base = match strip {
            StripMode::Folder => root,
            StripMode::Parent => root.parent().unwrap_or(root),
        };

        let files = scan_folder(root, &self.rules)
            .into_iter()
            .filter_map(|file| {
                let relative = forward_slashes(file.strip_prefix(base).ok()?);
                let url = url_builder(&relative);
                let local = VersionedPath::new(file.to_string_lossy(), version);
                Some((url, local))
            })
            .collect();

        FolderCacheEntry {
            version: version.to_string(),
            files,
        }
    }
}
