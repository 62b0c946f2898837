//! Two-phase child creation.
//!
//! While a document is processed, every media URL that no managed record
//! claims is offered to [`Discovery::observe`]; the ones that fall under an
//! active parent are queued. URLs that stay unresolved once processing is
//! done are added as candidates. [`Discovery::finish`] creates children
//! only for URLs present in both sets.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use super::kind::MediaKind;
use super::records::{AssetChild, NewChild, RecordError};
use super::registry::AssetRegistry;
use crate::utils::mime;
use crate::utils::url::url_path;
use crate::{debug, log};

/// Media URLs in `src`, `href`, `poster` and `data-src` attributes.
static ATTR_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:src|href|poster|data-src)[[:space:]]*=[[:space:]]*["']([^"'[:space:]]+)["']"#)
        .unwrap()
});

/// A child whose remote copy cannot be used any more.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unusable {
    pub child_id: u64,
    /// Cleaned path of the parent the child was found under.
    pub parent_path: String,
}

/// What a finished discovery pass changed.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub created: Vec<AssetChild>,
    /// Children queued for upload again.
    pub resynced: usize,
}

/// Collects discovery state for one unit of work.
pub struct Discovery<'a> {
    registry: &'a AssetRegistry,
    to_create: BTreeMap<String, u64>,
    candidates: BTreeSet<String>,
    unusable: Vec<Unusable>,
}

impl<'a> Discovery<'a> {
    pub fn new(registry: &'a AssetRegistry) -> Self {
        Self {
            registry,
            to_create: BTreeMap::new(),
            candidates: BTreeSet::new(),
            unusable: Vec::new(),
        }
    }

    /// Offer a URL that `is_local` says is (or is not) already managed.
    ///
    /// Returns the updated flag: URLs under an active parent count as
    /// local from now on and are queued for creation.
    pub fn observe(&mut self, url: &str, is_local: bool) -> bool {
        if is_local {
            return true;
        }
        match self.registry.classify(url) {
            Some(parent_id) => {
                self.to_create.insert(url.to_string(), parent_id);
                true
            }
            None => false,
        }
    }

    /// Record a URL still unresolved after processing.
    pub fn add_candidate(&mut self, url: &str) {
        self.candidates.insert(url.to_string());
    }

    pub fn mark_unusable(&mut self, child_id: u64, parent_path: &str) {
        self.unusable.push(Unusable {
            child_id,
            parent_path: parent_path.to_string(),
        });
    }

    pub fn queued(&self) -> usize {
        self.to_create.len()
    }

    /// Observe every media URL of a rendered document.
    ///
    /// URLs that already belong to a child are managed; the rest are both
    /// observed and recorded as candidates.
    pub fn scan_document(&mut self, html: &str) {
        let registry = self.registry;
        let records = registry.records();
        for url in media_urls(html) {
            let managed = records.child_by_url(&url).is_some();
            self.observe(&url, managed);
            if !managed {
                self.add_candidate(&url);
            }
        }
    }

    /// Apply the pass: reset unusable children, create queued candidates.
    ///
    /// Nothing happens while the lock is held.
    pub fn finish(self) -> Result<DiscoveryReport, RecordError> {
        let mut report = DiscoveryReport::default();
        let registry = self.registry;
        if registry.lock().is_locked() {
            debug!("assets"; "locked, dropping discovery of {} urls", self.to_create.len());
            return Ok(report);
        }

        let mut seen = BTreeSet::new();
        for unusable in &self.unusable {
            if !registry.is_active_path(&unusable.parent_path) || !seen.insert(unusable.child_id) {
                continue;
            }
            if let Some(mut child) = registry.records().child(unusable.child_id) {
                child.remote_public_id = None;
                registry.records().update_child(&child)?;
                report.resynced += 1;
            }
        }

        for url in &self.candidates {
            let Some(&parent_id) = self.to_create.get(url) else {
                continue;
            };
            if registry.records().child_by_url(url).is_some() {
                continue;
            }
            if let Some(child) = create_child(registry, url, parent_id)? {
                report.created.push(child);
            }
        }

        if !report.created.is_empty() || report.resynced > 0 {
            log!(
                "assets";
                "discovered {} new, {} to resync",
                report.created.len(),
                report.resynced
            );
        }
        Ok(report)
    }
}

/// Media URLs referenced by a document, first occurrence order.
pub fn media_urls(html: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    ATTR_URL
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|url| MediaKind::of(&url_path(url)).is_some())
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Create the child record for a URL. `None` when the file is missing.
fn create_child(
    registry: &AssetRegistry,
    url: &str,
    parent_id: u64,
) -> Result<Option<AssetChild>, RecordError> {
    let Some(file) = file_for_url(registry, url).filter(|file| file.is_file()) else {
        debug!("assets"; "no file behind {}", url);
        return Ok(None);
    };

    let mime = mime::from_path(&file);
    let size_label = if mime::is_image(mime) {
        image::image_dimensions(&file)
            .map(|(w, h)| format!("{w}x{h}"))
            .unwrap_or_default()
    } else {
        String::new()
    };

    let child = registry.records().insert_child(NewChild {
        parent_id,
        url: url.to_string(),
        size_label,
        mime: mime.to_string(),
        file,
    })?;
    Ok(Some(child))
}

/// Local file behind a URL: the URL's path below the site root.
///
/// `None` when the file is missing or resolves outside the root, through
/// `..` segments or a symlink.
fn file_for_url(registry: &AssetRegistry, url: &str) -> Option<PathBuf> {
    let path = url_path(url);
    if path.split(['/', '\\']).any(|segment| segment == "..") {
        return None;
    }
    let root = &registry.settings().site.root;
    let file = root.join(path.trim_start_matches('/'));
    let inside = file.canonicalize().ok()?.starts_with(root.canonicalize().ok()?);
    inside.then_some(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::lock::AssetLock;
    use crate::asset::records::StoredRecords;
    use crate::config::test_parse_config;
    use crate::store::Store;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, AssetRegistry) {
        let dir = TempDir::new().unwrap();
        let gallery = dir.path().join("wp-content/gallery");
        fs::create_dir_all(&gallery).unwrap();
        image::RgbImage::new(3, 2)
            .save(gallery.join("a.png"))
            .unwrap();
        fs::write(gallery.join("b.mp3"), b"id3").unwrap();

        let mut settings = test_parse_config(
            r#"
[site]
url = "https://a.test"

[assets]
enable = true

[[assets.paths]]
url = "https://a.test/wp-content/gallery"
version = "1"
"#,
        );
        settings.site.root = dir.path().to_path_buf();

        let store = Arc::new(Store::in_memory());
        let records = Arc::new(StoredRecords::new(store.clone()));
        let registry = AssetRegistry::new(Arc::new(settings), records, AssetLock::new(store));
        registry.run_pass().unwrap();
        (dir, registry)
    }

    #[test]
    fn test_creates_only_rendered_candidates() {
        let (_dir, registry) = fixture();
        let mut discovery = Discovery::new(&registry);

        assert!(discovery.observe("https://a.test/wp-content/gallery/a.png", false));
        assert!(discovery.observe("https://a.test/wp-content/gallery/b.mp3", false));
        assert!(!discovery.observe("https://a.test/other/c.png", false));
        assert_eq!(discovery.queued(), 2);

        discovery.add_candidate("https://a.test/wp-content/gallery/a.png");
        discovery.add_candidate("https://a.test/other/c.png");
        let report = discovery.finish().unwrap();

        assert_eq!(report.created.len(), 1);
        let child = &report.created[0];
        assert_eq!(child.url, "https://a.test/wp-content/gallery/a.png");
        assert_eq!(child.size_label, "3x2");
        assert_eq!(child.mime, "image/png");
        assert!(registry.records().child_by_url("https://a.test/wp-content/gallery/b.mp3").is_none());
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let (_dir, registry) = fixture();
        let mut discovery = Discovery::new(&registry);
        let url = "https://a.test/wp-content/gallery/gone.png";
        discovery.observe(url, false);
        discovery.add_candidate(url);
        assert!(discovery.finish().unwrap().created.is_empty());
    }

    #[test]
    fn test_scan_document() {
        let (_dir, registry) = fixture();
        let html = r#"<img src="https://a.test/wp-content/gallery/a.png">
<audio src='/wp-content/gallery/b.mp3'></audio>
<script src="https://a.test/wp-content/gallery/app.js"></script>
<img src="https://a.test/wp-content/gallery/a.png">"#;

        let mut discovery = Discovery::new(&registry);
        discovery.scan_document(html);
        let report = discovery.finish().unwrap();
        let urls: Vec<_> = report.created.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["/wp-content/gallery/b.mp3", "https://a.test/wp-content/gallery/a.png"]
        );
        assert_eq!(report.created[0].size_label, "");

        // a second pass finds them managed
        let mut discovery = Discovery::new(&registry);
        discovery.scan_document(html);
        assert!(discovery.finish().unwrap().created.is_empty());
    }

    #[test]
    fn test_media_urls() {
        let html = "<img src = \"https://a.test/x/a.png?v=1\">\n<a href='/b.mp3'>b</a>\n\
                    <video poster=\"/c.jpg\" data-src=\"/d.js\"><img src=\"https://a.test/x/a.png?v=1\">";
        assert_eq!(
            media_urls(html),
            vec!["https://a.test/x/a.png?v=1", "/b.mp3", "/c.jpg"]
        );
    }

    #[test]
    fn test_traversal_outside_root_is_skipped() {
        let (dir, registry) = fixture();
        let outside = TempDir::new().unwrap();
        let secret = outside.path().join("secret.png");
        image::RgbImage::new(1, 1).save(&secret).unwrap();
        let climb = "../".repeat(dir.path().components().count() + 2);
        let url = format!(
            "/wp-content/gallery/{climb}{}",
            secret.to_string_lossy().trim_start_matches('/')
        );

        assert!(file_for_url(&registry, &url).is_none());
        assert!(file_for_url(&registry, "https://a.test/wp-content/gallery/..%2F..%2Fa.png").is_none());
        assert!(file_for_url(&registry, "/wp-content/gallery/a.png").is_some());

        let mut discovery = Discovery::new(&registry);
        discovery.observe(&url, false);
        discovery.add_candidate(&url);
        assert!(discovery.finish().unwrap().created.is_empty());
        assert!(registry.records().children().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_outside_root_is_skipped() {
        let (dir, registry) = fixture();
        let outside = TempDir::new().unwrap();
        let secret = outside.path().join("secret.png");
        image::RgbImage::new(1, 1).save(&secret).unwrap();
        std::os::unix::fs::symlink(&secret, dir.path().join("wp-content/gallery/link.png")).unwrap();

        let url = "https://a.test/wp-content/gallery/link.png";
        let mut discovery = Discovery::new(&registry);
        assert!(discovery.observe(url, false));
        discovery.add_candidate(url);
        assert!(discovery.finish().unwrap().created.is_empty());
    }

    #[test]
    fn test_locked_finish_does_nothing() {
        let (_dir, registry) = fixture();
        let mut discovery = Discovery::new(&registry);
        let url = "https://a.test/wp-content/gallery/a.png";
        discovery.observe(url, false);
        discovery.add_candidate(url);

        let _guard = registry.lock().acquire();
        assert!(discovery.finish().unwrap().created.is_empty());
        assert!(registry.records().children().is_empty());
    }

    #[test]
    fn test_unusable_children_resynced() {
        let (_dir, registry) = fixture();
        let url = "https://a.test/wp-content/gallery/a.png";
        let mut discovery = Discovery::new(&registry);
        discovery.observe(url, false);
        discovery.add_candidate(url);
        let mut child = discovery.finish().unwrap().created.remove(0);
        child.remote_public_id = Some("wp-content/gallery/a".into());
        registry.records().update_child(&child).unwrap();

        let mut discovery = Discovery::new(&registry);
        discovery.mark_unusable(child.id, "wp-content/gallery/");
        discovery.mark_unusable(child.id, "wp-content/gallery/");
        discovery.mark_unusable(child.id, "wp-content/inactive/");
        let report = discovery.finish().unwrap();

        assert_eq!(report.resynced, 1);
        assert_eq!(registry.records().child(child.id).unwrap().remote_public_id, None);
    }
}
