//! `[store]` section configuration.
//!
//! ```toml
//! [store]
//! dir = ".edgeshift/cache"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Persisted state directory (inside project root)
pub const DEFAULT_STORE_DIR: &str = ".edgeshift/cache";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSectionConfig {
    pub dir: PathBuf,
}

impl Default for StoreSectionConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_STORE_DIR),
        }
    }
}

impl StoreSectionConfig {
    pub fn normalize(&mut self, base: &Path) {
        self.dir = crate::utils::path::normalize_path(&base.join(&self.dir));
    }
}
