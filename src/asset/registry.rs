//! Registered path prefixes and their lifecycle.
//!
//! ```text
//! absent ──register──► created ──activate──► active ◄──► inactive
//!                                              │
//!                                  reconcile / purge ──► absent
//! ```
//!
//! Activation is tracked per pass: [`AssetRegistry::run_pass`] forgets the
//! active set, registers every enabled path again and purges the parents
//! that were not registered.

use std::sync::Arc;

use dashmap::DashMap;

use super::lock::AssetLock;
use super::path::{ancestors, clean_path, path_key};
use super::records::{AssetParent, AssetRecords, RecordError};
use super::kind;
use crate::config::Settings;
use crate::utils::plural::{plural_count, plural_count_irregular};
use crate::{debug, log};

/// Children deleted per purge page
pub const PURGE_PAGE: usize = 100;

/// Version of the content (uploads) parent
const CONTENT_VERSION: &str = "0";

/// Outcome of a registration pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub registered: usize,
    pub purged: usize,
    /// The lock was held, nothing was reconciled.
    pub deferred: bool,
}

pub struct AssetRegistry {
    settings: Arc<Settings>,
    records: Arc<dyn AssetRecords>,
    lock: AssetLock,
    /// Path key → parent id of parents active in this pass.
    active: DashMap<String, u64>,
}

impl AssetRegistry {
    /// Parents persisted as active stay active until the next pass.
    pub fn new(settings: Arc<Settings>, records: Arc<dyn AssetRecords>, lock: AssetLock) -> Self {
        let active = DashMap::new();
        for parent in records.parents().into_iter().filter(|p| p.active) {
            active.insert(path_key(&parent.path).to_string(), parent.id);
        }
        Self {
            settings,
            records,
            lock,
            active,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn records(&self) -> &dyn AssetRecords {
        self.records.as_ref()
    }

    pub fn lock(&self) -> &AssetLock {
        &self.lock
    }

    pub fn clean_path(&self, path: &str) -> String {
        clean_path(&self.settings.site.url, path)
    }

    /// Register a path prefix and activate it for this pass.
    ///
    /// Creates the parent when unknown and updates its version in place
    /// when it changed. Returns `None` without touching anything while the
    /// lock is held.
    pub fn register(&self, path: &str, version: &str) -> Result<Option<AssetParent>, RecordError> {
        if self.lock.is_locked() {
            debug!("assets"; "locked, deferring registration of {}", path);
            return Ok(None);
        }

        let clean = self.clean_path(path);
        let mut parent = match self.records.parent_by_path(&clean) {
            Some(parent) => parent,
            None => {
                let parent = self.records.insert_parent(&clean, version)?;
                log!("assets"; "registered {}", clean);
                parent
            }
        };

        if parent.version != version || !parent.active {
            parent.version = version.to_string();
            parent.active = true;
            self.records.update_parent(&parent)?;
        }
        self.active.insert(path_key(&clean).to_string(), parent.id);
        Ok(Some(parent))
    }

    /// Drop a parent from the active set. The next reconcile purges it.
    pub fn deactivate(&self, path: &str) -> Result<bool, RecordError> {
        let clean = self.clean_path(path);
        let Some((_, id)) = self.active.remove(path_key(&clean)) else {
            return Ok(false);
        };
        if let Some(mut parent) = self.records.parent(id) {
            parent.active = false;
            self.records.update_parent(&parent)?;
        }
        Ok(true)
    }

    /// Active parent registered for exactly this path.
    pub fn find_parent(&self, path: &str) -> Option<AssetParent> {
        let clean = self.clean_path(path);
        let id = *self.active.get(path_key(&clean))?;
        self.records.parent(id)
    }

    pub fn is_active(&self, parent_id: u64) -> bool {
        self.active.iter().any(|entry| *entry.value() == parent_id)
    }

    /// Whether `parent_path` (a cleaned path) names an active parent.
    pub fn is_active_path(&self, parent_path: &str) -> bool {
        self.active.contains_key(path_key(parent_path))
    }

    /// Parent id a media URL belongs to.
    ///
    /// Walks the URL's directories from the deepest up and stops at the
    /// first active parent, so the longest registered prefix wins.
    pub fn classify(&self, url: &str) -> Option<u64> {
        let clean = self.clean_path(url);
        if !kind::is_syncable(&clean) {
            return None;
        }
        ancestors(&clean).find_map(|candidate| self.active.get(candidate).map(|id| *id))
    }

    /// Delete a parent and all of its children.
    ///
    /// Children go in pages of [`PURGE_PAGE`]; a page that removes nothing
    /// ends the loop. Returns the number of children deleted, or `None`
    /// when another work unit holds the lock.
    pub fn purge(&self, parent_id: u64) -> Result<Option<usize>, RecordError> {
        if self.lock.is_locked() {
            debug!("assets"; "locked, deferring purge of parent {}", parent_id);
            return Ok(None);
        }
        let guard = self.lock.acquire();

        let mut removed = 0;
        let mut remaining = self.records.child_count(parent_id);
        while remaining > 0 {
            guard.refresh();
            let page: Vec<u64> = self
                .records
                .children_page(parent_id, PURGE_PAGE)
                .iter()
                .map(|child| child.id)
                .collect();
            removed += self.records.delete_children(&page)?;
            let left = self.records.child_count(parent_id);
            if left == remaining {
                debug!("assets"; "purge of parent {} stalled at {} children", parent_id, left);
                break;
            }
            remaining = left;
        }

        self.records.delete_parent(parent_id)?;
        self.active.retain(|_, id| *id != parent_id);
        log!(
            "assets";
            "purged parent {}, {} removed",
            parent_id,
            plural_count_irregular(removed, "child", "children")
        );
        Ok(Some(removed))
    }

    /// Purge every known parent that is not active in this pass.
    pub fn reconcile(&self) -> Result<usize, RecordError> {
        let mut purged = 0;
        for parent in self.records.parents() {
            if self.is_active(parent.id) {
                continue;
            }
            if self.purge(parent.id)?.is_some() {
                purged += 1;
            }
        }
        Ok(purged)
    }

    /// Register every enabled path of the settings, then reconcile.
    ///
    /// When a registration is deferred by the lock nothing is purged: the
    /// active set is incomplete and the next pass will finish the job.
    pub fn run_pass(&self) -> Result<PassReport, RecordError> {
        let mut report = PassReport::default();
        if self.lock.is_locked() {
            report.deferred = true;
            return Ok(report);
        }

        self.active.clear();
        for (path, version) in self.pass_paths() {
            match self.register(&path, &version)? {
                Some(_) => report.registered += 1,
                None => report.deferred = true,
            }
        }
        if report.deferred {
            return Ok(report);
        }

        report.purged = self.reconcile()?;
        debug!(
            "assets";
            "pass: {} active, {} purged",
            plural_count(report.registered, "parent"),
            report.purged
        );
        Ok(report)
    }

    /// Purge every parent, active or not.
    pub fn purge_all(&self) -> Result<usize, RecordError> {
        let mut purged = 0;
        for parent in self.records.parents() {
            if self.purge(parent.id)?.is_some() {
                purged += 1;
            }
        }
        Ok(purged)
    }

    /// Paths registered by a pass, each with a trailing separator.
    fn pass_paths(&self) -> Vec<(String, String)> {
        let assets = &self.settings.assets;
        if !assets.enable {
            return Vec::new();
        }

        let mut paths: Vec<_> = assets
            .enabled_paths()
            .map(|entry| (trailing_slash(&entry.url), entry.version.clone()))
            .collect();
        if assets.content_enabled {
            let site = &self.settings.site;
            let uploads = site.dir_url(&site.dirs.uploads);
            paths.push((trailing_slash(&uploads), CONTENT_VERSION.to_string()));
        }
        paths
    }
}

fn trailing_slash(url: &str) -> String {
    format!("{}/", url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::records::{AssetChild, NewChild, StoredRecords};
    use crate::config::test_parse_config;
    use crate::store::Store;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn settings() -> Settings {
        test_parse_config(
            r#"
[site]
url = "https://a.test"

[assets]
enable = true

[[assets.paths]]
url = "https://a.test/wp-content/gallery"
version = "1"

[[assets.paths]]
url = "https://a.test/wp-content/gallery/2024"
version = "1"
"#,
        )
    }

    fn registry_with(settings: Settings, records: Arc<dyn AssetRecords>) -> (Arc<Store>, AssetRegistry) {
        let store = Arc::new(Store::in_memory());
        let lock = AssetLock::new(store.clone());
        (store, AssetRegistry::new(Arc::new(settings), records, lock))
    }

    fn registry() -> AssetRegistry {
        let records = Arc::new(StoredRecords::new(Arc::new(Store::in_memory())));
        registry_with(settings(), records).1
    }

    fn add_children(registry: &AssetRegistry, parent_id: u64, n: usize) {
        for i in 0..n {
            registry
                .records()
                .insert_child(NewChild {
                    parent_id,
                    url: format!("/c/{i}.png"),
                    size_label: String::new(),
                    mime: "image/png".into(),
                    file: PathBuf::from("/tmp/c.png"),
                })
                .unwrap();
        }
    }

    #[test]
    fn test_register_creates_and_updates_version() {
        let registry = registry();
        let first = registry
            .register("https://a.test/wp-content/gallery/", "1")
            .unwrap()
            .unwrap();
        assert_eq!(first.path, "wp-content/gallery/");
        assert!(first.active);

        let again = registry
            .register("http://a.test/wp-content/gallery", "2")
            .unwrap()
            .unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(registry.records().parent(first.id).unwrap().version, "2");
        assert_eq!(registry.records().parents().len(), 1);
    }

    #[test]
    fn test_register_deferred_while_locked() {
        let registry = registry();
        let _guard = registry.lock().acquire();
        assert!(registry.register("https://a.test/g/", "1").unwrap().is_none());
        assert!(registry.records().parents().is_empty());
        assert!(registry.find_parent("https://a.test/g/").is_none());
    }

    #[test]
    fn test_classify_longest_prefix() {
        let registry = registry();
        let report = registry.run_pass().unwrap();
        assert_eq!(report.registered, 2);

        let outer = registry.find_parent("https://a.test/wp-content/gallery/").unwrap();
        let inner = registry
            .find_parent("https://a.test/wp-content/gallery/2024/")
            .unwrap();

        assert_eq!(
            registry.classify("https://a.test/wp-content/gallery/2024/05/a.png"),
            Some(inner.id)
        );
        assert_eq!(
            registry.classify("//a.test/wp-content/gallery/b.jpg?ver=3"),
            Some(outer.id)
        );
        assert_eq!(registry.classify("https://a.test/wp-content/gallery/x.js"), None);
        assert_eq!(registry.classify("https://a.test/elsewhere/a.png"), None);
    }

    #[test]
    fn test_purge_cascade() {
        let registry = registry();
        let parent = registry.register("https://a.test/g/", "1").unwrap().unwrap();
        add_children(&registry, parent.id, 250);
        let empty = registry.register("https://a.test/e/", "1").unwrap().unwrap();

        assert_eq!(registry.purge(parent.id).unwrap(), Some(250));
        assert!(registry.records().children().is_empty());
        assert!(registry.records().parent(parent.id).is_none());
        assert!(registry.find_parent("https://a.test/g/").is_none());

        assert_eq!(registry.purge(empty.id).unwrap(), Some(0));
        assert!(registry.records().parents().is_empty());
        assert!(!registry.lock().is_locked());
    }

    #[test]
    fn test_purge_deferred_while_locked() {
        let registry = registry();
        let parent = registry.register("https://a.test/g/", "1").unwrap().unwrap();
        let _guard = registry.lock().acquire();
        assert_eq!(registry.purge(parent.id).unwrap(), None);
        assert!(registry.records().parent(parent.id).is_some());
    }

    /// Records that count batch deletes; `stuck` ones never delete a child.
    struct FakeRecords {
        inner: StoredRecords,
        stuck: bool,
        batches: AtomicUsize,
    }

    impl FakeRecords {
        fn new(stuck: bool) -> Self {
            Self {
                inner: StoredRecords::new(Arc::new(Store::in_memory())),
                stuck,
                batches: AtomicUsize::new(0),
            }
        }
    }

    impl AssetRecords for FakeRecords {
        fn parents(&self) -> Vec<AssetParent> {
            self.inner.parents()
        }
        fn parent(&self, id: u64) -> Option<AssetParent> {
            self.inner.parent(id)
        }
        fn parent_by_path(&self, path: &str) -> Option<AssetParent> {
            self.inner.parent_by_path(path)
        }
        fn insert_parent(&self, path: &str, version: &str) -> Result<AssetParent, RecordError> {
            self.inner.insert_parent(path, version)
        }
        fn update_parent(&self, parent: &AssetParent) -> Result<(), RecordError> {
            self.inner.update_parent(parent)
        }
        fn delete_parent(&self, id: u64) -> Result<bool, RecordError> {
            self.inner.delete_parent(id)
        }
        fn child(&self, id: u64) -> Option<AssetChild> {
            self.inner.child(id)
        }
        fn child_by_url(&self, url: &str) -> Option<AssetChild> {
            self.inner.child_by_url(url)
        }
        fn children(&self) -> Vec<AssetChild> {
            self.inner.children()
        }
        fn children_page(&self, parent_id: u64, limit: usize) -> Vec<AssetChild> {
            self.inner.children_page(parent_id, limit)
        }
        fn child_count(&self, parent_id: u64) -> usize {
            self.inner.child_count(parent_id)
        }
        fn insert_child(&self, child: NewChild) -> Result<AssetChild, RecordError> {
            self.inner.insert_child(child)
        }
        fn update_child(&self, child: &AssetChild) -> Result<(), RecordError> {
            self.inner.update_child(child)
        }
        fn delete_child(&self, id: u64) -> Result<bool, RecordError> {
            if self.stuck {
                return Ok(false);
            }
            self.inner.delete_child(id)
        }
        fn delete_children(&self, ids: &[u64]) -> Result<usize, RecordError> {
            self.batches.fetch_add(1, Ordering::Relaxed);
            if self.stuck {
                return Ok(0);
            }
            self.inner.delete_children(ids)
        }
    }

    #[test]
    fn test_purge_stops_without_progress() {
        let records = Arc::new(FakeRecords::new(true));
        let (_store, registry) = registry_with(settings(), records);
        let parent = registry.register("https://a.test/g/", "1").unwrap().unwrap();
        add_children(&registry, parent.id, 3);

        assert_eq!(registry.purge(parent.id).unwrap(), Some(0));
        assert!(registry.records().parent(parent.id).is_none());
    }

    #[test]
    fn test_purge_deletes_one_batch_per_page() {
        let records = Arc::new(FakeRecords::new(false));
        let (_store, registry) = registry_with(settings(), records.clone());
        let parent = registry.register("https://a.test/g/", "1").unwrap().unwrap();
        add_children(&registry, parent.id, 2 * PURGE_PAGE + 1);

        assert_eq!(registry.purge(parent.id).unwrap(), Some(2 * PURGE_PAGE + 1));
        assert_eq!(records.batches.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_pass_purges_unregistered_parents() {
        let registry = registry();
        let stale = registry.register("https://a.test/old/", "1").unwrap().unwrap();
        add_children(&registry, stale.id, 2);

        let report = registry.run_pass().unwrap();
        assert_eq!(report.registered, 2);
        assert_eq!(report.purged, 1);
        assert!(!report.deferred);
        assert!(registry.records().parent(stale.id).is_none());
        assert!(registry.records().children().is_empty());
        assert_eq!(registry.records().parents().len(), 2);
    }

    #[test]
    fn test_pass_deferred_keeps_parents() {
        let registry = registry();
        let stale = registry.register("https://a.test/old/", "1").unwrap().unwrap();
        let _guard = registry.lock().acquire();
        let report = registry.run_pass().unwrap();
        assert!(report.deferred);
        assert!(registry.records().parent(stale.id).is_some());
    }

    #[test]
    fn test_content_path_registered() {
        let mut settings = settings();
        settings.assets.content_enabled = true;
        let records = Arc::new(StoredRecords::new(Arc::new(Store::in_memory())));
        let (_store, registry) = registry_with(settings, records);

        assert_eq!(registry.run_pass().unwrap().registered, 3);
        let uploads = registry
            .find_parent("https://a.test/wp-content/uploads/")
            .unwrap();
        assert_eq!(uploads.version, "0");
    }

    #[test]
    fn test_deactivate_then_reconcile() {
        let registry = registry();
        registry.run_pass().unwrap();
        assert!(registry.deactivate("https://a.test/wp-content/gallery/2024/").unwrap());
        assert!(!registry.deactivate("https://a.test/nope/").unwrap());
        assert_eq!(registry.reconcile().unwrap(), 1);
        assert_eq!(registry.records().parents().len(), 1);
    }

    #[test]
    fn test_active_set_survives_restart() {
        let store = Arc::new(Store::in_memory());
        let records: Arc<dyn AssetRecords> = Arc::new(StoredRecords::new(store.clone()));
        let settings = Arc::new(settings());
        let first = AssetRegistry::new(settings.clone(), records.clone(), AssetLock::new(store.clone()));
        first.run_pass().unwrap();

        let second = AssetRegistry::new(settings, records, AssetLock::new(store));
        assert!(second.classify("https://a.test/wp-content/gallery/a.png").is_some());
    }

    #[test]
    fn test_purge_all() {
        let registry = registry();
        registry.run_pass().unwrap();
        assert_eq!(registry.purge_all().unwrap(), 2);
        assert!(registry.records().parents().is_empty());
    }
}
