//! Rewrite of rendered HTML.
//!
//! For each request the indexed URLs found in the document are resolved
//! through the upload pipeline (never uploading) and the resolved ones are
//! substituted literally. The substitution list is cached per request URI:
//! briefly while uploads are pending, longer once everything resolved.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use aho_corasick::{AhoCorasick, MatchKind};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::index::VersionedPath;
use super::upload::UploadPipeline;
use crate::store::Store;
use crate::utils::hash;
use crate::{debug, log};

/// Store key prefix of cached rewrite results
pub const REWRITE_PREFIX: &str = "rewrite_";

/// Lifetime of a result with pending uploads
pub const PENDING_TTL: Duration = Duration::from_secs(5);

/// Lifetime of a fully resolved result
pub const SETTLED_TTL: Duration = Duration::from_secs(60);

/// Characters allowed after an indexed URL (path, query and fragment)
const URL_TAIL: &str = r"[-a-zA-Z0-9@:%_+.~#?&/=]*";

/// Substitutions computed for one request.
///
/// `urls[i]` is replaced by `remote_urls[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteCacheEntry {
    pub urls: Vec<String>,
    pub remote_urls: Vec<String>,
    #[serde(default)]
    pub upload_pending: bool,
}

impl RewriteCacheEntry {
    fn ttl(&self) -> Duration {
        if self.upload_pending {
            PENDING_TTL
        } else {
            SETTLED_TTL
        }
    }
}

/// Fire-and-forget trigger for a background sweep.
pub trait BackgroundRequest: Send + Sync {
    fn request_sweep(&self);
}

/// Records sweep requests so the caller can act on them later.
#[derive(Debug, Default)]
pub struct DeferredRequest {
    requests: AtomicUsize,
}

impl DeferredRequest {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl BackgroundRequest for DeferredRequest {
    fn request_sweep(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct RewriteCache {
    store: Arc<Store>,
    pipeline: Arc<UploadPipeline>,
    background: Arc<dyn BackgroundRequest>,
}

impl RewriteCache {
    pub fn new(
        store: Arc<Store>,
        pipeline: Arc<UploadPipeline>,
        background: Arc<dyn BackgroundRequest>,
    ) -> Self {
        Self {
            store,
            pipeline,
            background,
        }
    }

    /// Store key of the result cached for `request_uri`.
    pub fn key(request_uri: &str) -> String {
        format!("{REWRITE_PREFIX}{}", hash::fingerprint(request_uri))
    }

    /// Rewrite `html` rendered for `request_uri` against the indexed `paths`.
    pub fn rewrite(
        &self,
        html: &str,
        request_uri: &str,
        paths: &BTreeMap<String, VersionedPath>,
    ) -> String {
        if paths.is_empty() {
            return html.to_string();
        }

        let key = Self::key(request_uri);
        let entry = match self.store.get::<RewriteCacheEntry>(&key) {
            Some(entry) => entry,
            None => {
                debug!("rewrite"; "cache miss for {}", request_uri);
                let Some(entry) = self.build(html, paths) else {
                    return html.to_string();
                };
                if let Err(e) = self.store.set_transient(&key, &entry, entry.ttl()) {
                    log!("error"; "failed to cache rewrite of {}: {}", request_uri, e);
                }
                entry
            }
        };

        apply(html, &entry)
    }

    /// Find indexed URLs in `html` and resolve them.
    ///
    /// `None` only when the combined pattern cannot be compiled.
    fn build(&self, html: &str, paths: &BTreeMap<String, VersionedPath>) -> Option<RewriteCacheEntry> {
        let mut found: Vec<&str> = paths
            .keys()
            .map(String::as_str)
            .filter(|url| html.contains(url))
            .collect();
        if found.is_empty() {
            return Some(RewriteCacheEntry::default());
        }

        // Longest first, so a URL never loses to one of its own prefixes
        found.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let alternation = found
            .iter()
            .map(|url| regex::escape(url))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = match Regex::new(&format!("({alternation})(?-u:\\b){URL_TAIL}")) {
            Ok(pattern) => pattern,
            Err(e) => {
                log!("error"; "cannot build rewrite pattern: {}", e);
                return None;
            }
        };

        let mut entry = RewriteCacheEntry::default();
        let mut seen = BTreeSet::new();
        for captures in pattern.captures_iter(html) {
            let Some(url) = captures.get(1).map(|m| m.as_str()) else {
                continue;
            };
            if !seen.insert(url) {
                continue;
            }
            let Some(local) = paths.get(url) else {
                continue;
            };

            let remote = self
                .pipeline
                .resolve(url, &local.version, Path::new(&local.path), false);
            if remote == url {
                entry.upload_pending = true;
            } else {
                entry.urls.push(url.to_string());
                entry.remote_urls.push(remote);
            }
        }

        if entry.upload_pending && !self.pipeline.is_sweeping() {
            debug!("rewrite"; "requesting background sweep");
            self.background.request_sweep();
        }
        Some(entry)
    }
}

/// Replace every `urls[i]` with `remote_urls[i]` in one pass.
fn apply(html: &str, entry: &RewriteCacheEntry) -> String {
    if entry.urls.is_empty() || entry.urls.len() != entry.remote_urls.len() {
        return html.to_string();
    }

    let matcher = AhoCorasick::builder()
        .match_kind(MatchKind::LeftmostLongest)
        .build(&entry.urls);
    match matcher {
        Ok(matcher) => matcher.replace_all(html, &entry.remote_urls),
        Err(e) => {
            log!("error"; "cannot apply rewrite: {}", e);
            html.to_string()
        }
    }
}
