//! Active path sources.
//!
//! The rewrite and sweep passes work on one URL → file map: the union of
//! the plugin, theme and core folders that the settings enable. When two
//! sources index the same URL the first one wins.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::index::{FolderIndex, StripMode, VersionedPath};
use crate::config::Settings;
use crate::utils::path::forward_slashes;
use crate::utils::url::join_url;

pub type PathMap = BTreeMap<String, VersionedPath>;

/// Groups of folders toggled together in `[cache]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheToggle {
    Plugins,
    Theme,
    Core,
}

/// Builds path maps from a settings snapshot.
pub struct PathSources<'a> {
    settings: &'a Settings,
    index: &'a FolderIndex,
}

impl<'a> PathSources<'a> {
    pub fn new(settings: &'a Settings, index: &'a FolderIndex) -> Self {
        Self { settings, index }
    }

    /// Union of every enabled source; empty when caching is off.
    pub fn all(&self) -> PathMap {
        let cache = &self.settings.cache;
        let mut paths = PathMap::new();
        if !cache.enable {
            return paths;
        }

        union(&mut paths, self.plugin_paths());
        if cache.theme {
            union(&mut paths, self.theme_paths());
        }
        if cache.wordpress {
            union(&mut paths, self.core_paths());
        }
        paths
    }

    /// Indexed files of the toggle's folders, regardless of settings.
    pub fn paths_of(&self, toggle: CacheToggle) -> PathMap {
        match toggle {
            CacheToggle::Plugins => self.all_plugin_paths(),
            CacheToggle::Theme => self.theme_paths(),
            CacheToggle::Core => self.core_paths(),
        }
    }

    /// Folders indexed for a toggle.
    pub fn folders(&self, toggle: CacheToggle) -> Vec<PathBuf> {
        let site = &self.settings.site;
        match toggle {
            CacheToggle::Plugins => self
                .settings
                .cache
                .plugins
                .iter()
                .filter(|p| p.enabled)
                .map(|p| site.plugins_dir().join(&p.dir))
                .collect(),
            CacheToggle::Theme => self
                .settings
                .cache
                .active_themes()
                .iter()
                .map(|t| site.themes_dir().join(&t.dir))
                .collect(),
            CacheToggle::Core => vec![site.admin_dir(), site.includes_dir()],
        }
    }

    /// Every enabled plugin folder, or only the selected files.
    fn plugin_paths(&self) -> PathMap {
        if self.settings.cache.all_plugins {
            self.all_plugin_paths()
        } else {
            self.selected_plugin_paths()
        }
    }

    fn all_plugin_paths(&self) -> PathMap {
        let site = &self.settings.site;
        let plugins_url = site.dir_url(&site.dirs.plugins);

        let mut paths = PathMap::new();
        for plugin in self.settings.cache.plugins.iter().filter(|p| p.enabled) {
            let folder = site.plugins_dir().join(&plugin.dir);
            let files = self.index.index(
                &folder,
                &plugin.version,
                |rel| join_url(&plugins_url, rel),
                StripMode::Parent,
            );
            union(&mut paths, files);
        }
        paths
    }

    /// Explicitly selected plugin files, tagged with their plugin's version.
    fn selected_plugin_paths(&self) -> PathMap {
        let site = &self.settings.site;
        let cache = &self.settings.cache;
        let plugins_url = site.dir_url(&site.dirs.plugins);
        let plugins_dir = site.plugins_dir();

        cache
            .selected
            .iter()
            .map(|rel| {
                let rel_text = forward_slashes(rel);
                let rel_text = rel_text.trim_start_matches('/');
                let version = rel_text
                    .split('/')
                    .next()
                    .and_then(|dir| cache.plugins.iter().find(|p| p.dir == Path::new(dir)))
                    .map(|p| p.version.clone())
                    .unwrap_or_default();
                let file = plugins_dir.join(rel_text);
                (
                    join_url(&plugins_url, rel_text),
                    VersionedPath::new(file.to_string_lossy(), version),
                )
            })
            .collect()
    }

    /// Active theme first, then its parent.
    fn theme_paths(&self) -> PathMap {
        let site = &self.settings.site;
        let mut paths = PathMap::new();
        for theme in self.settings.cache.active_themes() {
            let folder = site.themes_dir().join(&theme.dir);
            let theme_url = site.dir_url(&site.dirs.themes.join(&theme.dir));
            let files = self.index.index(
                &folder,
                &theme.version,
                |rel| join_url(&theme_url, rel),
                StripMode::Folder,
            );
            union(&mut paths, files);
        }
        paths
    }

    fn core_paths(&self) -> PathMap {
        let site = &self.settings.site;
        let mut paths = PathMap::new();
        for dir in [&site.dirs.admin, &site.dirs.includes] {
            let base_url = site.dir_url(dir);
            let files = self.index.index(
                &site.dir(dir),
                &site.version,
                |rel| join_url(&base_url, rel),
                StripMode::Folder,
            );
            union(&mut paths, files);
        }
        paths
    }
}

/// Insert entries of `other` that `paths` does not have yet.
fn union(paths: &mut PathMap, other: PathMap) {
    for (url, local) in other {
        paths.entry(url).or_insert(local);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ScanRules;
    use crate::config::test_parse_config;
    use crate::store::Store;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn site() -> (TempDir, Settings) {
        let dir = TempDir::new().unwrap();
        for rel in [
            "wp-content/plugins/akismet/a.js",
            "wp-content/plugins/akismet/b.php",
            "wp-content/plugins/hello/h.css",
            "wp-content/themes/child/style.css",
            "wp-content/themes/base/style.css",
            "wp-content/themes/base/base.js",
            "wp-admin/css/admin.css",
            "wp-includes/js/jquery.js",
        ] {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, rel).unwrap();
        }

        let mut settings = test_parse_config(
            r#"
[site]
url = "https://a.test"
version = "6.5"

[cache]
enable = true

[[cache.plugins]]
slug = "akismet"
dir = "akismet"
version = "5.3"

[[cache.plugins]]
slug = "hello"
dir = "hello"
version = "1.0"
enabled = false

[[cache.themes]]
dir = "child"
version = "1.0"

[[cache.themes]]
dir = "base"
version = "2.0"
"#,
        );
        settings.site.root = dir.path().to_path_buf();
        (dir, settings)
    }

    fn index() -> FolderIndex {
        FolderIndex::new(Arc::new(Store::in_memory()), ScanRules::default())
    }

    #[test]
    fn test_all_sources() {
        let (_dir, settings) = site();
        let index = index();
        let paths = PathSources::new(&settings, &index).all();

        let urls: Vec<_> = paths.keys().map(String::as_str).collect();
        assert_eq!(
            urls,
            vec![
                "https://a.test/wp-admin/css/admin.css",
                "https://a.test/wp-content/plugins/akismet/a.js",
                "https://a.test/wp-content/themes/base/base.js",
                "https://a.test/wp-content/themes/base/style.css",
                "https://a.test/wp-content/themes/child/style.css",
                "https://a.test/wp-includes/js/jquery.js",
            ]
        );
        assert_eq!(
            paths["https://a.test/wp-content/plugins/akismet/a.js"].version,
            "5.3"
        );
        assert_eq!(paths["https://a.test/wp-admin/css/admin.css"].version, "6.5");
    }

    #[test]
    fn test_first_plugin_entry_wins() {
        let (_dir, mut settings) = site();
        let mut duplicate = settings.cache.plugins[0].clone();
        duplicate.version = "9.9".into();
        settings.cache.plugins.push(duplicate);

        let index = index();
        let paths = PathSources::new(&settings, &index).all();
        assert_eq!(
            paths["https://a.test/wp-content/plugins/akismet/a.js"].version,
            "5.3"
        );
    }

    #[test]
    fn test_disabled_cache_is_empty() {
        let (_dir, mut settings) = site();
        settings.cache.enable = false;
        let index = index();
        assert!(PathSources::new(&settings, &index).all().is_empty());
        assert_eq!(index.scan_count(), 0);
    }

    #[test]
    fn test_toggles() {
        let (_dir, mut settings) = site();
        settings.cache.theme = false;
        settings.cache.wordpress = false;
        let index = index();
        let paths = PathSources::new(&settings, &index).all();
        assert_eq!(paths.len(), 1);
    }

    #[test]
    fn test_selected_plugin_files() {
        let (dir, mut settings) = site();
        settings.cache.all_plugins = false;
        settings.cache.theme = false;
        settings.cache.wordpress = false;
        settings.cache.selected = vec![PathBuf::from("akismet/a.js")];

        let index = index();
        let paths = PathSources::new(&settings, &index).all();
        let local = &paths["https://a.test/wp-content/plugins/akismet/a.js"];
        assert_eq!(local.version, "5.3");
        assert_eq!(
            Path::new(&local.path),
            dir.path().join("wp-content/plugins/akismet/a.js")
        );
        assert_eq!(index.scan_count(), 0);
    }

    #[test]
    fn test_folders() {
        let (dir, settings) = site();
        let index = index();
        let sources = PathSources::new(&settings, &index);
        assert_eq!(
            sources.folders(CacheToggle::Plugins),
            vec![dir.path().join("wp-content/plugins/akismet")]
        );
        assert_eq!(sources.folders(CacheToggle::Theme).len(), 2);
        assert_eq!(
            sources.folders(CacheToggle::Core),
            vec![dir.path().join("wp-admin"), dir.path().join("wp-includes")]
        );
    }
}
