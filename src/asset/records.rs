//! Persisted parent/child forest.
//!
//! Parents are registered path prefixes, children are single files
//! discovered below them. [`AssetRecords`] is the storage seam the
//! registry works against; [`StoredRecords`] keeps the whole forest as one
//! document in the [`Store`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{Store, StoreError};

/// Store key of the forest document
pub const RECORDS_KEY: &str = "asset_records";

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("no asset parent with id {0}")]
    MissingParent(u64),

    #[error("no asset child with id {0}")]
    MissingChild(u64),

    #[error("asset parent {0} is not active")]
    InactiveParent(u64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A registered path prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetParent {
    pub id: u64,
    /// Normalized path, see [`clean_path`](super::clean_path).
    pub path: String,
    pub version: String,
    pub active: bool,
    /// Creation time in seconds.
    pub created_at: u64,
}

/// A discovered file below a parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetChild {
    pub id: u64,
    pub parent_id: u64,
    /// URL the file was found under in rendered content.
    pub url: String,
    /// Remote public id once uploaded.
    #[serde(default)]
    pub remote_public_id: Option<String>,
    /// `WxH` for images, empty otherwise.
    #[serde(default)]
    pub size_label: String,
    pub mime: String,
    pub file: PathBuf,
    pub enabled: bool,
}

/// Fields of a child about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChild {
    pub parent_id: u64,
    pub url: String,
    pub size_label: String,
    pub mime: String,
    pub file: PathBuf,
}

/// Storage of the parent/child forest.
pub trait AssetRecords: Send + Sync {
    fn parents(&self) -> Vec<AssetParent>;
    fn parent(&self, id: u64) -> Option<AssetParent>;
    fn parent_by_path(&self, path: &str) -> Option<AssetParent>;
    fn insert_parent(&self, path: &str, version: &str) -> Result<AssetParent, RecordError>;
    fn update_parent(&self, parent: &AssetParent) -> Result<(), RecordError>;
    fn delete_parent(&self, id: u64) -> Result<bool, RecordError>;

    fn child(&self, id: u64) -> Option<AssetChild>;
    fn child_by_url(&self, url: &str) -> Option<AssetChild>;
    fn children(&self) -> Vec<AssetChild>;
    /// Up to `limit` children of a parent, lowest id first.
    fn children_page(&self, parent_id: u64, limit: usize) -> Vec<AssetChild>;
    fn child_count(&self, parent_id: u64) -> usize;
    /// Create a child. The parent must exist and be active.
    fn insert_child(&self, child: NewChild) -> Result<AssetChild, RecordError>;
    fn update_child(&self, child: &AssetChild) -> Result<(), RecordError>;
    fn delete_child(&self, id: u64) -> Result<bool, RecordError>;
    /// Delete several children in one write. Returns how many existed.
    fn delete_children(&self, ids: &[u64]) -> Result<usize, RecordError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Forest {
    next_id: u64,
    parents: BTreeMap<u64, AssetParent>,
    children: BTreeMap<u64, AssetChild>,
}

impl Forest {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// [`AssetRecords`] backed by a single store entry.
pub struct StoredRecords {
    store: Arc<Store>,
}

impl StoredRecords {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    fn load(&self) -> Forest {
        self.store.get_or_default(RECORDS_KEY)
    }

    /// Read-modify-write of the forest under the store's key lock.
    fn update<T>(
        &self,
        f: impl FnOnce(&mut Forest) -> Result<T, RecordError>,
    ) -> Result<T, RecordError> {
        self.store.update(RECORDS_KEY, f)
    }
}

impl AssetRecords for StoredRecords {
    fn parents(&self) -> Vec<AssetParent> {
        self.load().parents.into_values().collect()
    }

    fn parent(&self, id: u64) -> Option<AssetParent> {
        self.load().parents.remove(&id)
    }

    fn parent_by_path(&self, path: &str) -> Option<AssetParent> {
        self.load().parents.into_values().find(|p| p.path == path)
    }

    fn insert_parent(&self, path: &str, version: &str) -> Result<AssetParent, RecordError> {
        let created_at = self.store.clock().now_secs();
        self.update(|forest| {
            let parent = AssetParent {
                id: forest.allocate(),
                path: path.to_string(),
                version: version.to_string(),
                active: false,
                created_at,
            };
            forest.parents.insert(parent.id, parent.clone());
            Ok(parent)
        })
    }

    fn update_parent(&self, parent: &AssetParent) -> Result<(), RecordError> {
        self.update(|forest| {
            let slot = forest
                .parents
                .get_mut(&parent.id)
                .ok_or(RecordError::MissingParent(parent.id))?;
            *slot = parent.clone();
            Ok(())
        })
    }

    fn delete_parent(&self, id: u64) -> Result<bool, RecordError> {
        self.update(|forest| Ok(forest.parents.remove(&id).is_some()))
    }

    fn child(&self, id: u64) -> Option<AssetChild> {
        self.load().children.remove(&id)
    }

    fn child_by_url(&self, url: &str) -> Option<AssetChild> {
        self.load().children.into_values().find(|c| c.url == url)
    }

    fn children(&self) -> Vec<AssetChild> {
        self.load().children.into_values().collect()
    }

    fn children_page(&self, parent_id: u64, limit: usize) -> Vec<AssetChild> {
        self.load()
            .children
            .into_values()
            .filter(|c| c.parent_id == parent_id)
            .take(limit)
            .collect()
    }

    fn child_count(&self, parent_id: u64) -> usize {
        self.load()
            .children
            .values()
            .filter(|c| c.parent_id == parent_id)
            .count()
    }

    fn insert_child(&self, child: NewChild) -> Result<AssetChild, RecordError> {
        self.update(|forest| {
            let parent = forest
                .parents
                .get(&child.parent_id)
                .ok_or(RecordError::MissingParent(child.parent_id))?;
            if !parent.active {
                return Err(RecordError::InactiveParent(parent.id));
            }
            let record = AssetChild {
                id: forest.allocate(),
                parent_id: child.parent_id,
                url: child.url,
                remote_public_id: None,
                size_label: child.size_label,
                mime: child.mime,
                file: child.file,
                enabled: true,
            };
            forest.children.insert(record.id, record.clone());
            Ok(record)
        })
    }

    fn update_child(&self, child: &AssetChild) -> Result<(), RecordError> {
        self.update(|forest| {
            let slot = forest
                .children
                .get_mut(&child.id)
                .ok_or(RecordError::MissingChild(child.id))?;
            *slot = child.clone();
            Ok(())
        })
    }

    fn delete_child(&self, id: u64) -> Result<bool, RecordError> {
        self.update(|forest| Ok(forest.children.remove(&id).is_some()))
    }

    fn delete_children(&self, ids: &[u64]) -> Result<usize, RecordError> {
        self.update(|forest| {
            Ok(ids
                .iter()
                .filter(|id| forest.children.remove(*id).is_some())
                .count())
        })
    }
}
