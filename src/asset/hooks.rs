//! Host integration points.
//!
//! The media layer asks the registry how to treat an identifier: whether
//! it is an asset child, which file and URL back it, whether it may sync
//! and how it uploads. Each question is a plain method here.

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::records::{AssetChild, RecordError};
use super::registry::AssetRegistry;
use crate::remote::{RemoteError, RemoteStore, ResourceType, UploadOptions, UploadResponse, UploadSource};
use crate::utils::path::forward_slashes;
use crate::utils::url::url_path;
use crate::{debug, log};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{0} is not an asset")]
    NotAsset(u64),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// How the sync layer schedules asset uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStrategy {
    pub key: &'static str,
    pub priority: u8,
    pub state: &'static str,
    pub note: &'static str,
    pub required: bool,
    pub asset_state: u8,
}

/// Strategy registered for asset children
pub const ASSET_SYNC: SyncStrategy = SyncStrategy {
    key: "cld_asset",
    priority: 2,
    state: "disabled",
    note: "Caching",
    required: true,
    asset_state: 0,
};

/// Result of uploading every pending child.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChildSyncReport {
    pub uploaded: usize,
    pub failed: usize,
}

impl AssetRegistry {
    /// Whether `id` names an asset child (parents are not assets).
    pub fn is_asset_type(&self, id: u64) -> bool {
        self.records().child(id).is_some()
    }

    pub fn is_media(&self, id: u64, is_media: bool) -> bool {
        is_media || self.is_asset_type(id)
    }

    /// The URL an asset was discovered under.
    pub fn local_url(&self, id: u64) -> Option<String> {
        self.records().child(id).map(|child| child.url)
    }

    /// Asset files missing below the uploads folder live below the site root.
    pub fn attached_file(&self, id: u64, file: &Path) -> PathBuf {
        if file.exists() || !self.is_asset_type(id) {
            return file.to_path_buf();
        }
        let site = &self.settings().site;
        let uploads = site.dir(&site.dirs.uploads);
        match file.strip_prefix(&uploads) {
            Ok(rest) => site.root.join(rest),
            Err(_) => file.to_path_buf(),
        }
    }

    /// Assets never get resized variants.
    pub fn intermediate_sizes(&self, id: u64, sizes: Vec<String>) -> Vec<String> {
        if self.is_asset_type(id) {
            Vec::new()
        } else {
            sizes
        }
    }

    /// Assets always sync; content does when auto sync is off but content
    /// delivery is on.
    pub fn can_sync(&self, id: u64, can: bool) -> bool {
        let assets = &self.settings().assets;
        can || self.is_asset_type(id) || (!assets.auto_sync && assets.content_enabled)
    }

    /// Assets, and anything never synced, report state 0.
    pub fn asset_state(&self, id: u64, state: u8, been_synced: bool) -> u8 {
        if self.is_asset_type(id) || !been_synced {
            ASSET_SYNC.asset_state
        } else {
            state
        }
    }

    /// Assets are never folder synced.
    pub fn folder_synced(&self, id: u64, is_synced: bool) -> bool {
        is_synced && !self.is_asset_type(id)
    }

    pub fn sync_strategy(&self) -> SyncStrategy {
        ASSET_SYNC
    }

    /// Changes when the asset or its parent is recreated.
    pub fn file_signature(&self, id: u64) -> String {
        let parent = self
            .records()
            .child(id)
            .and_then(|child| self.records().parent(child.parent_id));
        match parent {
            Some(parent) => format!("{id}{}", parent.created_at),
            None => id.to_string(),
        }
    }

    /// An asset may sync while its parent is active.
    pub fn validate_sync(&self, id: u64) -> bool {
        self.records()
            .child(id)
            .is_some_and(|child| self.is_active(child.parent_id))
    }

    /// Remote public id of a child: its URL path without extension.
    pub fn public_id(&self, child: &AssetChild) -> String {
        let site_path = url_path(&self.settings().site.url);
        let path = url_path(&child.url);
        let relative = path
            .strip_prefix(site_path.trim_end_matches('/'))
            .unwrap_or(&path)
            .trim_matches('/');
        forward_slashes(&Path::new(relative).with_extension(""))
    }

    /// Upload a child and record its public id.
    pub fn upload_child(
        &self,
        id: u64,
        remote: &dyn RemoteStore,
    ) -> Result<UploadResponse, SyncError> {
        let mut child = self.records().child(id).ok_or(SyncError::NotAsset(id))?;
        let public_id = self.public_id(&child);
        let options = UploadOptions {
            resource_type: ResourceType::for_path(&child.file),
            public_id: public_id.clone(),
            overwrite: true,
            unique_filename: false,
            eager: None,
        };
        let source = UploadSource::Asset {
            id,
            file: child.file.clone(),
        };

        let response = remote.upload(&source, &options)?;
        child.remote_public_id = Some(public_id);
        child.enabled = true;
        self.records().update_child(&child)?;
        debug!("assets"; "uploaded {} as {}", child.url, response.public_id);
        Ok(response)
    }

    /// Enabled children that have no remote copy yet.
    pub fn pending_children(&self) -> Vec<AssetChild> {
        self.records()
            .children()
            .into_iter()
            .filter(|c| c.enabled && c.remote_public_id.is_none())
            .collect()
    }

    /// Upload every pending child that may sync.
    pub fn sync_pending(&self, remote: &dyn RemoteStore) -> ChildSyncReport {
        let mut report = ChildSyncReport::default();
        for child in self.pending_children() {
            if !self.validate_sync(child.id) {
                continue;
            }
            match self.upload_child(child.id, remote) {
                Ok(_) => report.uploaded += 1,
                Err(e) => {
                    log!("assets"; "upload of {} failed: {}", child.url, e);
                    report.failed += 1;
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::lock::AssetLock;
    use crate::asset::records::{NewChild, StoredRecords};
    use crate::config::test_parse_config;
    use crate::remote::LocalMirror;
    use crate::store::{Clock, Store};
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        site: TempDir,
        registry: AssetRegistry,
        child: AssetChild,
    }

    fn fixture() -> Fixture {
        let site = TempDir::new().unwrap();
        let file = site.path().join("wp-content/gallery/a.png");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"png").unwrap();

        let mut settings = test_parse_config(
            r#"
[site]
url = "https://a.test"

[assets]
enable = true
auto_sync = true

[[assets.paths]]
url = "https://a.test/wp-content/gallery"
version = "1"
"#,
        );
        settings.site.root = site.path().to_path_buf();

        let store = Arc::new(Store::in_memory().with_clock(Clock::manual(42_000)));
        let records = Arc::new(StoredRecords::new(store.clone()));
        let registry = AssetRegistry::new(Arc::new(settings), records, AssetLock::new(store));
        registry.run_pass().unwrap();
        let parent = registry
            .find_parent("https://a.test/wp-content/gallery/")
            .unwrap();
        let child = registry
            .records()
            .insert_child(NewChild {
                parent_id: parent.id,
                url: "https://a.test/wp-content/gallery/a.png".into(),
                size_label: String::new(),
                mime: "image/png".into(),
                file,
            })
            .unwrap();
        Fixture {
            site,
            registry,
            child,
        }
    }

    #[test]
    fn test_identity_hooks() {
        let fx = fixture();
        let registry = &fx.registry;
        let id = fx.child.id;
        let parent_id = fx.child.parent_id;

        assert!(registry.is_asset_type(id));
        assert!(!registry.is_asset_type(parent_id));
        assert!(registry.is_media(id, false));
        assert!(!registry.is_media(999, false));
        assert_eq!(registry.local_url(id).as_deref(), Some(fx.child.url.as_str()));
        assert!(registry.intermediate_sizes(id, vec!["thumb".into()]).is_empty());
        assert_eq!(registry.intermediate_sizes(999, vec!["thumb".into()]).len(), 1);
    }

    #[test]
    fn test_sync_hooks() {
        let fx = fixture();
        let registry = &fx.registry;
        let id = fx.child.id;

        assert!(registry.can_sync(id, false));
        assert!(!registry.can_sync(999, false));
        assert_eq!(registry.asset_state(id, 1, true), 0);
        assert_eq!(registry.asset_state(999, 1, false), 0);
        assert_eq!(registry.asset_state(999, 1, true), 1);
        assert!(!registry.folder_synced(id, true));
        assert!(registry.folder_synced(999, true));
        assert_eq!(registry.sync_strategy().key, "cld_asset");
        assert_eq!(registry.file_signature(id), format!("{id}42"));
        assert_eq!(registry.file_signature(999), "999");
        assert!(registry.validate_sync(id));
        assert!(!registry.validate_sync(999));
    }

    #[test]
    fn test_validate_sync_needs_active_parent() {
        let fx = fixture();
        fx.registry
            .deactivate("https://a.test/wp-content/gallery/")
            .unwrap();
        assert!(!fx.registry.validate_sync(fx.child.id));
    }

    #[test]
    fn test_attached_file_falls_back_to_root() {
        let fx = fixture();
        let registry = &fx.registry;
        let missing = fx.site.path().join("wp-content/uploads/wp-content/gallery/a.png");
        assert_eq!(
            registry.attached_file(fx.child.id, &missing),
            fx.site.path().join("wp-content/gallery/a.png")
        );
        assert_eq!(registry.attached_file(999, &missing), missing);
    }

    #[test]
    fn test_upload_child() {
        let fx = fixture();
        let mirror = TempDir::new().unwrap();
        let remote = LocalMirror::new(mirror.path(), "https://cdn.example");

        assert_eq!(fx.registry.public_id(&fx.child), "wp-content/gallery/a");
        assert_eq!(fx.registry.pending_children().len(), 1);

        let report = fx.registry.sync_pending(&remote);
        assert_eq!(report, ChildSyncReport { uploaded: 1, failed: 0 });
        assert!(mirror.path().join("wp-content/gallery/a.png").is_file());

        let child = fx.registry.records().child(fx.child.id).unwrap();
        assert_eq!(child.remote_public_id.as_deref(), Some("wp-content/gallery/a"));
        assert!(fx.registry.pending_children().is_empty());

        assert!(matches!(
            fx.registry.upload_child(999, &remote).unwrap_err(),
            SyncError::NotAsset(999)
        ));
    }
}
