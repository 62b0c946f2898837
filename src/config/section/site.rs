//! `[site]` section configuration.
//!
//! Describes the site whose files are delivered: its public URL, its
//! document root on disk and where plugins, themes and core files live.
//!
//! # Example
//!
//! ```toml
//! [site]
//! url = "https://example.com"
//! root = "/var/www/html"
//! version = "6.5.2"            # core version, tags core file URLs
//!
//! [site.dirs]
//! plugins = "wp-content/plugins"
//! themes = "wp-content/themes"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};
use crate::utils::url::join_url;

/// Directories below the site root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteDirs {
    pub plugins: PathBuf,
    pub themes: PathBuf,
    pub admin: PathBuf,
    pub includes: PathBuf,
    pub uploads: PathBuf,
}

impl Default for SiteDirs {
    fn default() -> Self {
        Self {
            plugins: "wp-content/plugins".into(),
            themes: "wp-content/themes".into(),
            admin: "wp-admin".into(),
            includes: "wp-includes".into(),
            uploads: "wp-content/uploads".into(),
        }
    }
}

/// `[site]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSectionConfig {
    /// Public base URL of the site.
    pub url: String,
    /// Document root on disk.
    pub root: PathBuf,
    /// Core version.
    pub version: String,
    pub dirs: SiteDirs,
}

impl Default for SiteSectionConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost".into(),
            root: PathBuf::from("."),
            version: String::new(),
            dirs: SiteDirs::default(),
        }
    }
}

impl SiteSectionConfig {
    const URL: FieldPath = FieldPath::new("site.url");
    const ROOT: FieldPath = FieldPath::new("site.root");

    /// Absolute directory of a `[site.dirs]` entry.
    pub fn dir(&self, dir: &Path) -> PathBuf {
        self.root.join(dir)
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.dir(&self.dirs.plugins)
    }

    pub fn themes_dir(&self) -> PathBuf {
        self.dir(&self.dirs.themes)
    }

    pub fn admin_dir(&self) -> PathBuf {
        self.dir(&self.dirs.admin)
    }

    pub fn includes_dir(&self) -> PathBuf {
        self.dir(&self.dirs.includes)
    }

    /// Public URL of a path relative to the site root.
    pub fn url_for(&self, relative: &str) -> String {
        join_url(&self.url, relative)
    }

    /// Public URL of a directory below the site root.
    pub fn dir_url(&self, dir: &Path) -> String {
        self.url_for(&crate::utils::path::forward_slashes(dir))
    }

    /// Normalize `root` against the config directory.
    pub fn normalize(&mut self, base: &Path) {
        self.root = crate::utils::path::normalize_path(&base.join(&self.root));
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        match ::url::Url::parse(&self.url) {
            Ok(url) if url.has_host() => {}
            _ => diag.error_with_hint(
                Self::URL,
                format!("'{}' is not an absolute URL", self.url),
                "use a full URL such as \"https://example.com\"",
            ),
        }
        if !self.root.is_dir() {
            diag.error(
                Self::ROOT,
                format!("directory '{}' does not exist", self.root.display()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::test_parse_config;
    use std::path::PathBuf;

    #[test]
    fn test_site_defaults() {
        let config = test_parse_config("");
        assert_eq!(config.site.url, "http://localhost");
        assert_eq!(config.site.dirs.admin, PathBuf::from("wp-admin"));
    }

    #[test]
    fn test_site_urls() {
        let config = test_parse_config(
            "[site]\nurl = \"https://example.com/\"\nroot = \"/srv\"\n[site.dirs]\nthemes = \"content/themes\"",
        );
        assert_eq!(config.site.themes_dir(), PathBuf::from("/srv/content/themes"));
        assert_eq!(
            config.site.dir_url(&config.site.dirs.themes),
            "https://example.com/content/themes"
        );
        assert_eq!(config.site.url_for("/x.js"), "https://example.com/x.js");
    }
}
