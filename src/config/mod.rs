//! Site configuration management for `edgeshift.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # Configuration section definitions
//! │   ├── site       # [site] and [site.dirs]
//! │   ├── cache      # [cache], [[cache.plugins]], [[cache.themes]], [cache.scan]
//! │   ├── assets     # [assets], [[assets.paths]]
//! │   ├── remote     # [remote]
//! │   ├── store      # [store]
//! │   └── serve      # [serve]
//! ├── types/         # ConfigError, ConfigDiagnostics, FieldPath
//! ├── util.rs        # config file discovery
//! └── mod.rs         # Settings (this file)
//! ```
//!
//! The loaded [`Settings`] is an immutable snapshot handed to the engines
//! at the start of each pass.

pub mod section;
pub mod types;
mod util;

use util::find_config_file;

pub use section::{
    AssetPathEntry, AssetsSectionConfig, CacheSectionConfig, PluginEntry, RemoteSectionConfig,
    ServeConfig, SiteDirs, SiteSectionConfig, StoreSectionConfig, ThemeEntry,
};
pub use types::{ConfigDiagnostics, ConfigError, FieldPath};

use crate::log;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Default config file name
pub const CONFIG_FILE: &str = "edgeshift.toml";

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing `edgeshift.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub site: SiteSectionConfig,

    #[serde(default)]
    pub cache: CacheSectionConfig,

    #[serde(default)]
    pub assets: AssetsSectionConfig,

    #[serde(default)]
    pub remote: RemoteSectionConfig,

    #[serde(default)]
    pub store: StoreSectionConfig,

    #[serde(default)]
    pub serve: ServeConfig,
}

impl Settings {
    /// Load configuration, searching upward from cwd for `config_name`.
    ///
    /// Relative paths are resolved against the config file's directory.
    pub fn load(config_name: &Path) -> Result<Self> {
        let config_path = find_config_file(config_name).with_context(|| {
            format!(
                "Config file '{}' not found in this directory or any parent",
                config_name.display()
            )
        })?;

        let mut settings = Self::from_path(&config_path)?;
        settings.config_path = crate::utils::path::normalize_path(&config_path);

        let base = settings
            .config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        settings.normalize_paths(&base);
        settings.validate()?;
        Ok(settings)
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content)?;
        Ok(settings)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (settings, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }
        Ok(settings)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let settings = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((settings, ignored))
    }

    /// Print warning about unknown fields.
    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    /// Normalize all paths relative to the config directory.
    fn normalize_paths(&mut self, base: &Path) {
        self.site.normalize(base);
        self.remote.normalize(base);
        self.store.normalize(base);
    }

    /// Validate all sections, collecting every error at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut diag = ConfigDiagnostics::new();
        self.site.validate(&mut diag);
        self.cache.validate(&mut diag);
        self.assets.validate(&mut diag);
        self.remote.validate(&mut diag);
        self.serve.validate(&mut diag);
        diag.into_result().map_err(ConfigError::Diagnostics)
    }

    /// Apply serve-specific CLI overrides.
    pub fn apply_serve_options(&mut self, interface: Option<std::net::IpAddr>, port: Option<u16>) {
        Self::update_option(&mut self.serve.interface, interface.as_ref());
        Self::update_option(&mut self.serve.port, port.as_ref());
    }

    /// Update config option if CLI value is provided.
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }
}

// ============================================================================
// Test Helpers (available to all modules via `use crate::config::test_*`)
// ============================================================================

/// Parse config, panicking on unknown fields (to catch config typos in tests).
#[cfg(test)]
pub fn test_parse_config(content: &str) -> Settings {
    let (parsed, ignored) = Settings::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}

// ============================================================================
// tests
// ============================================================================
