//! Upload pipeline: local file → remote URL.
//!
//! Resolution is keyed by the file's public URL inside its scope bucket.
//! Until an upload succeeds the URL resolves to itself (the pending
//! sentinel), which is how the rewrite pass knows to leave it alone.
//!
//! Failed uploads are counted per file. After [`MAX_ATTEMPTS`] failures a
//! file is skipped until its counter is reset.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::index::VersionedPath;
use super::scope::{BUCKET_PREFIX, ScopeBucket, ScopeRoots};
use crate::remote::{IMAGE_EAGER, RemoteError, RemoteStore, ResourceType, UploadOptions, UploadSource};
use crate::store::{Store, StoreError};
use crate::utils::path::strip_base;
use crate::{debug, log};

/// Store key of the per-file error counter
pub const ERRORS_KEY: &str = "_upload_errors";

/// Store key of the sweep-in-progress flag
pub const SWEEP_FLAG: &str = "_uploading_cache";

/// Lifetime of the sweep flag
pub const SWEEP_TTL: Duration = Duration::from_secs(20);

/// Failed attempts after which a file is no longer uploaded automatically
pub const MAX_ATTEMPTS: u32 = 3;

/// Cached resolution of one local URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCacheEntry {
    #[serde(rename = "ver")]
    pub version: String,
    pub url: String,
}

type Bucket = BTreeMap<String, UploadCacheEntry>;

/// How uploaded files are named remotely.
#[derive(Debug, Clone, Default)]
pub struct UploadNaming {
    /// Local files are named relative to this directory
    pub site_root: PathBuf,
    /// Top-level remote folder
    pub remote_folder: String,
    /// Folder under `remote_folder` holding cached static files
    pub cache_folder: String,
}

impl UploadNaming {
    /// `<remote_folder>/<cache_folder>/<relative dir>/<file stem>`
    pub fn public_id(&self, file: &Path) -> String {
        let relative = strip_base(file, &self.site_root).unwrap_or_else(|| {
            file.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        let without_ext = match relative.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() && !stem.ends_with('/') => stem,
            _ => relative.as_str(),
        };

        [
            self.remote_folder.trim_matches('/'),
            self.cache_folder.trim_matches('/'),
            without_ext,
        ]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub uploaded: usize,
    pub failed: usize,
    /// Pending files skipped because they hit the retry ceiling
    pub skipped: usize,
}

pub struct UploadPipeline {
    store: Arc<Store>,
    remote: Arc<dyn RemoteStore>,
    roots: ScopeRoots,
    naming: UploadNaming,
}

impl UploadPipeline {
    pub fn new(
        store: Arc<Store>,
        remote: Arc<dyn RemoteStore>,
        roots: ScopeRoots,
        naming: UploadNaming,
    ) -> Self {
        Self {
            store,
            remote,
            roots,
            naming,
        }
    }

    /// Resolve `local_url` to its remote URL.
    ///
    /// Returns `local_url` unchanged while the file is pending. With
    /// `allow_upload` a pending file is uploaded first; without it no
    /// remote call is ever made.
    pub fn resolve(&self, local_url: &str, version: &str, file: &Path, allow_upload: bool) -> String {
        let key = ScopeBucket::for_file(file, &self.roots).key();
        let bucket: Bucket = self.store.get_or_default(&key);

        if let Some(entry) = bucket.get(local_url)
            && entry.version == version
            && entry.url != local_url
        {
            return entry.url.clone();
        }

        if !allow_upload {
            return local_url.to_string();
        }

        match self.upload(file) {
            Ok(remote_url) => {
                let entry = UploadCacheEntry {
                    version: version.to_string(),
                    url: remote_url.clone(),
                };
                let stored = self.store.update(&key, |bucket: &mut Bucket| {
                    bucket.insert(local_url.to_string(), entry);
                    Ok::<_, StoreError>(())
                });
                if let Err(e) = stored {
                    log!("error"; "failed to persist {}: {}", key, e);
                }
                remote_url
            }
            Err(RemoteError::RetryCeiling { file, attempts }) => {
                debug!("upload"; "skipping {} after {} failed attempts", file, attempts);
                local_url.to_string()
            }
            Err(e) => {
                let attempts = self.record_failure(file);
                log!("upload"; "{} (attempt {}/{})", e, attempts, MAX_ATTEMPTS);
                local_url.to_string()
            }
        }
    }

    /// Upload every pending entry of `paths`.
    ///
    /// Returns `None` when another sweep holds the flag. The flag is left
    /// to expire on its own.
    pub fn sweep(&self, paths: &BTreeMap<String, VersionedPath>) -> Option<SweepReport> {
        if self.is_sweeping() {
            debug!("sweep"; "sweep already in progress");
            return None;
        }
        self.flag_sweep();

        let mut report = SweepReport::default();
        for (url, local) in paths {
            let file = Path::new(&local.path);
            if self.resolve(url, &local.version, file, false) != *url {
                continue;
            }
            if self.attempts(file) >= MAX_ATTEMPTS {
                report.skipped += 1;
                continue;
            }
            // Keep the flag alive while uploads take time
            self.flag_sweep();
            if self.resolve(url, &local.version, file, true) == *url {
                report.failed += 1;
            } else {
                report.uploaded += 1;
            }
        }

        log!(
            "sweep";
            "{} uploaded, {} failed, {} skipped",
            report.uploaded,
            report.failed,
            report.skipped
        );
        Some(report)
    }

    /// Entries of `paths` that still resolve to themselves.
    pub fn pending<'a>(&self, paths: &'a BTreeMap<String, VersionedPath>) -> Vec<&'a str> {
        paths
            .iter()
            .filter(|(url, local)| {
                self.resolve(url, &local.version, Path::new(&local.path), false) == **url
            })
            .map(|(url, _)| url.as_str())
            .collect()
    }

    pub fn is_sweeping(&self) -> bool {
        self.store.contains(SWEEP_FLAG)
    }

    fn flag_sweep(&self) {
        if let Err(e) = self.store.set_transient(SWEEP_FLAG, &true, SWEEP_TTL) {
            log!("error"; "failed to set sweep flag: {}", e);
        }
    }

    /// Failed upload attempts recorded for `file`.
    pub fn attempts(&self, file: &Path) -> u32 {
        self.errors().get(&error_key(file)).copied().unwrap_or(0)
    }

    /// Reset the error counter of one file, or of every file.
    ///
    /// Returns how many counters were cleared.
    pub fn reset_errors(&self, file: Option<&Path>) -> Result<usize, StoreError> {
        self.store
            .update(ERRORS_KEY, |errors: &mut BTreeMap<String, u32>| {
                Ok(match file {
                    Some(file) => usize::from(errors.remove(&error_key(file)).is_some()),
                    None => std::mem::take(errors).len(),
                })
            })
    }

    /// Drop every upload bucket. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, StoreError> {
        let keys = self.store.keys_with_prefix(BUCKET_PREFIX);
        for key in &keys {
            self.store.delete(key)?;
        }
        Ok(keys.len())
    }

    /// Drop the bucket `file` belongs to.
    pub fn clear_bucket_of(&self, file: &Path) -> Result<bool, StoreError> {
        self.store
            .delete(&ScopeBucket::for_file(file, &self.roots).key())
    }

    /// Number of resolved entries across all buckets.
    pub fn cached_count(&self) -> usize {
        self.store
            .keys_with_prefix(BUCKET_PREFIX)
            .iter()
            .map(|key| self.store.get_or_default::<Bucket>(key).len())
            .sum()
    }

    fn upload(&self, file: &Path) -> Result<String, RemoteError> {
        let attempts = self.attempts(file);
        if attempts >= MAX_ATTEMPTS {
            return Err(RemoteError::RetryCeiling {
                file: file.display().to_string(),
                attempts,
            });
        }

        let resource_type = ResourceType::for_path(file);
        let options = UploadOptions {
            resource_type,
            public_id: self.naming.public_id(file),
            overwrite: true,
            unique_filename: false,
            eager: (resource_type == ResourceType::Image).then(|| IMAGE_EAGER.to_string()),
        };

        let response = self
            .remote
            .upload(&UploadSource::File(file.to_path_buf()), &options)?;
        log!("upload"; "{} -> {}", file.display(), response.public_id);
        Ok(strip_version_segment(response.delivery_url()))
    }

    fn record_failure(&self, file: &Path) -> u32 {
        let recorded = self
            .store
            .update(ERRORS_KEY, |errors: &mut BTreeMap<String, u32>| {
                let count = errors.entry(error_key(file)).or_insert(0);
                *count += 1;
                Ok::<_, StoreError>(*count)
            });
        recorded.unwrap_or_else(|e| {
            log!("error"; "failed to persist upload errors: {}", e);
            self.attempts(file) + 1
        })
    }

    fn errors(&self) -> BTreeMap<String, u32> {
        self.store.get_or_default(ERRORS_KEY)
    }
}

fn error_key(file: &Path) -> String {
    file.to_string_lossy().into_owned()
}

/// Remove the first `/v<digits>/` segment so the URL outlives remote revisions.
pub fn strip_version_segment(url: &str) -> String {
    let is_version = |segment: &str| {
        segment
            .strip_prefix('v')
            .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
    };

    let mut segments: Vec<&str> = url.split('/').collect();
    // The last segment is the file name, never a version
    let dirs = segments.len().saturating_sub(1);
    match segments[..dirs].iter().position(|&s| is_version(s)) {
        Some(index) => {
            segments.remove(index);
            segments.join("/")
        }
        None => url.to_string(),
    }
}
