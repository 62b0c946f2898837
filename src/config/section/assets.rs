//! `[assets]` section configuration.
//!
//! External path prefixes whose media files become asset children once
//! they are seen in rendered content.
//!
//! # Example
//!
//! ```toml
//! [assets]
//! enable = true
//! auto_sync = true
//!
//! [[assets.paths]]
//! url = "https://example.com/wp-content/gallery"
//! version = "3"
//! ```

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

/// A registered path prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPathEntry {
    pub url: String,
    #[serde(default)]
    pub version: String,
    #[serde(default = "enabled")]
    pub enabled: bool,
}

const fn enabled() -> bool {
    true
}

/// `[assets]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsSectionConfig {
    pub enable: bool,
    /// Upload discovered children without manual confirmation.
    pub auto_sync: bool,
    /// Also register `[site.dirs].uploads`-relative content paths.
    pub content_enabled: bool,
    /// Initial state of the front-end overlay.
    pub overlay: bool,
    pub paths: Vec<AssetPathEntry>,
}

impl AssetsSectionConfig {
    const PATHS: FieldPath = FieldPath::new("assets.paths");

    /// Enabled path entries.
    pub fn enabled_paths(&self) -> impl Iterator<Item = &AssetPathEntry> {
        self.paths.iter().filter(|p| p.enabled)
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        for (idx, entry) in self.paths.iter().enumerate() {
            if entry.url.trim_matches('/').is_empty() {
                diag.error(Self::PATHS, format!("[{idx}] url is empty"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::test_parse_config;

    #[test]
    fn test_assets_config() {
        let config = test_parse_config(
            r#"
[assets]
enable = true

[[assets.paths]]
url = "https://example.com/gallery"
version = "2"

[[assets.paths]]
url = "https://example.com/old"
enabled = false
"#,
        );
        assert!(config.assets.enable);
        assert_eq!(config.assets.paths.len(), 2);
        assert_eq!(config.assets.enabled_paths().count(), 1);
    }
}
