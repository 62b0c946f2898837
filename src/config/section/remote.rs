//! `[remote]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [remote]
//! folder = "example-site"
//! mirror = ".edgeshift/mirror"
//! base_url = "https://cdn.example.com"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

/// `[remote]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSectionConfig {
    /// Top-level remote folder every public id starts with.
    pub folder: String,
    /// Directory the local mirror copies uploads into.
    pub mirror: PathBuf,
    /// Delivery base URL of the mirror.
    pub base_url: String,
}

impl Default for RemoteSectionConfig {
    fn default() -> Self {
        Self {
            folder: String::new(),
            mirror: PathBuf::from(".edgeshift/mirror"),
            base_url: "http://localhost:5280".into(),
        }
    }
}

impl RemoteSectionConfig {
    const BASE_URL: FieldPath = FieldPath::new("remote.base_url");

    pub fn normalize(&mut self, base: &Path) {
        self.mirror = crate::utils::path::normalize_path(&base.join(&self.mirror));
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if ::url::Url::parse(&self.base_url).is_err() {
            diag.error(
                Self::BASE_URL,
                format!("'{}' is not an absolute URL", self.base_url),
            );
        }
    }
}
