//! `[cache]` section configuration.
//!
//! Selects which static files are delivered through the remote store.
//!
//! # Example
//!
//! ```toml
//! [cache]
//! enable = true
//! theme = true               # active theme and its parent
//! wordpress = true           # wp-admin and wp-includes
//! all_plugins = false        # when off, only `selected` files are delivered
//! folder = "static"          # remote folder below [remote].folder
//! selected = ["akismet/_inc/akismet.js"]
//!
//! [[cache.plugins]]
//! slug = "akismet"
//! dir = "akismet"
//! version = "5.3"
//!
//! [[cache.themes]]
//! dir = "child"
//! version = "1.2"
//!
//! [cache.scan]
//! exclude_dirs = ["node_modules", "vendor"]
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cache::ScanRules;
use crate::config::{ConfigDiagnostics, FieldPath};

/// An installed plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginEntry {
    pub slug: String,
    /// Folder below the plugins directory.
    pub dir: PathBuf,
    #[serde(default)]
    pub version: String,
    #[serde(default = "enabled")]
    pub enabled: bool,
}

/// An installed theme. The first entry is the active theme, the second its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeEntry {
    /// Folder below the themes directory.
    pub dir: PathBuf,
    #[serde(default)]
    pub version: String,
}

const fn enabled() -> bool {
    true
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSectionConfig {
    pub enable: bool,
    pub theme: bool,
    pub wordpress: bool,
    pub all_plugins: bool,
    pub folder: String,
    /// Plugin files (relative to the plugins directory) delivered when
    /// `all_plugins` is off.
    pub selected: Vec<PathBuf>,
    pub plugins: Vec<PluginEntry>,
    pub themes: Vec<ThemeEntry>,
    pub scan: ScanRules,
}

impl Default for CacheSectionConfig {
    fn default() -> Self {
        Self {
            enable: false,
            theme: true,
            wordpress: true,
            all_plugins: true,
            folder: "static".into(),
            selected: Vec::new(),
            plugins: Vec::new(),
            themes: Vec::new(),
            scan: ScanRules::default(),
        }
    }
}

impl CacheSectionConfig {
    const THEMES: FieldPath = FieldPath::new("cache.themes");
    const PLUGINS: FieldPath = FieldPath::new("cache.plugins");

    /// Active theme and, when present, its parent.
    pub fn active_themes(&self) -> &[ThemeEntry] {
        &self.themes[..self.themes.len().min(2)]
    }

    pub fn plugin(&self, slug: &str) -> Option<&PluginEntry> {
        self.plugins.iter().find(|p| p.slug == slug)
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.themes.len() > 2 {
            diag.error_with_hint(
                Self::THEMES,
                format!("{} themes listed, at most 2 are used", self.themes.len()),
                "list the active theme first, then its parent",
            );
        }
        let mut slugs: Vec<_> = self.plugins.iter().map(|p| p.slug.as_str()).collect();
        slugs.sort_unstable();
        if let Some(dup) = slugs.windows(2).find(|w| w[0] == w[1]) {
            diag.error(Self::PLUGINS, format!("plugin '{}' listed twice", dup[0]));
        }
    }
}
