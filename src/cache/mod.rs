//! Static file delivery through the remote store.
//!
//! ```text
//! scan ──► index ──► paths ──► rewrite ──► HTML with remote URLs
//!                                 │
//!                                 ▼
//!                              upload ──► RemoteStore
//! ```
//!
//! [`SiteCache`] wires the pieces together for one settings snapshot.

mod index;
mod paths;
mod rewrite;
mod scan;
mod scope;
mod upload;

use std::sync::Arc;

pub use index::{FolderCacheEntry, FolderIndex, StripMode, VersionedPath};
pub use paths::{CacheToggle, PathMap, PathSources};
pub use rewrite::{BackgroundRequest, DeferredRequest, RewriteCache, RewriteCacheEntry};
pub use scan::{ScanRules, scan_folder};
pub use scope::{ScopeBucket, ScopeRoots};
pub use upload::{MAX_ATTEMPTS, SweepReport, UploadCacheEntry, UploadNaming, UploadPipeline};

use crate::config::Settings;
use crate::remote::RemoteStore;
use crate::store::{Store, StoreError};
use crate::log;

/// Static delivery engine for one settings snapshot.
pub struct SiteCache {
    settings: Arc<Settings>,
    index: FolderIndex,
    pipeline: Arc<UploadPipeline>,
    rewrite: RewriteCache,
}

impl SiteCache {
    pub fn new(
        settings: Arc<Settings>,
        store: Arc<Store>,
        remote: Arc<dyn RemoteStore>,
        background: Arc<dyn BackgroundRequest>,
    ) -> Self {
        let site = &settings.site;
        let roots = ScopeRoots {
            plugins: site.plugins_dir(),
            themes: site.themes_dir(),
            admin: site.admin_dir(),
            includes: site.includes_dir(),
        };
        let naming = UploadNaming {
            site_root: site.root.clone(),
            remote_folder: settings.remote.folder.clone(),
            cache_folder: settings.cache.folder.clone(),
        };

        let index = FolderIndex::new(store.clone(), settings.cache.scan.clone());
        let pipeline = Arc::new(UploadPipeline::new(store.clone(), remote, roots, naming));
        let rewrite = RewriteCache::new(store, pipeline.clone(), background);

        Self {
            settings,
            index,
            pipeline,
            rewrite,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn index(&self) -> &FolderIndex {
        &self.index
    }

    pub fn pipeline(&self) -> &UploadPipeline {
        &self.pipeline
    }

    /// Every URL → file entry the settings enable.
    pub fn paths(&self) -> PathMap {
        PathSources::new(&self.settings, &self.index).all()
    }

    /// Rewrite a rendered document for `request_uri`.
    pub fn html_rewrite(&self, html: &str, request_uri: &str) -> String {
        self.rewrite.rewrite(html, request_uri, &self.paths())
    }

    /// Upload everything still pending. `None` if a sweep is in progress.
    pub fn upload_cache(&self) -> Option<SweepReport> {
        self.pipeline.sweep(&self.paths())
    }

    /// Number of enabled entries still waiting for an upload.
    pub fn pending_count(&self) -> usize {
        self.pipeline.pending(&self.paths()).len()
    }

    /// React to a `[cache]` toggle being saved.
    ///
    /// Turning a toggle off forgets the folder indexes it covers; turning
    /// it on indexes them right away. Returns the number of folders touched.
    pub fn on_setting_saved(&self, toggle: CacheToggle, enabled: bool) -> Result<usize, StoreError> {
        let sources = PathSources::new(&self.settings, &self.index);
        if enabled {
            let indexed = sources.paths_of(toggle).len();
            log!("index"; "{:?} caching on, {} files indexed", toggle, indexed);
            return Ok(sources.folders(toggle).len());
        }

        let mut removed = 0;
        for folder in sources.folders(toggle) {
            if self.index.invalidate(&folder)? {
                removed += 1;
            }
        }
        log!("index"; "{:?} caching off, {} folder indexes dropped", toggle, removed);
        Ok(removed)
    }
}
