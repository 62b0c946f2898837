//! Engine wiring shared across CLI commands.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::admin::Admin;
use crate::asset::{AssetLock, AssetRegistry, StoredRecords};
use crate::cache::{BackgroundRequest, SiteCache};
use crate::config::Settings;
use crate::remote::{LocalMirror, RemoteStore};
use crate::store::Store;

/// Every engine built from one settings snapshot.
pub struct Engines {
    pub settings: Arc<Settings>,
    pub store: Arc<Store>,
    pub remote: Arc<dyn RemoteStore>,
    pub cache: Arc<SiteCache>,
    pub registry: Arc<AssetRegistry>,
    pub admin: Arc<Admin>,
    pub background: Arc<dyn BackgroundRequest>,
}

impl Engines {
    /// Open the persisted store and build the engines on top of it.
    pub fn open(settings: Settings, background: Arc<dyn BackgroundRequest>) -> Result<Self> {
        let store = Store::open(&settings.store.dir)
            .with_context(|| format!("cannot open store in {}", settings.store.dir.display()))?;
        Ok(Self::with_store(settings, Arc::new(store), background))
    }

    pub fn with_store(
        settings: Settings,
        store: Arc<Store>,
        background: Arc<dyn BackgroundRequest>,
    ) -> Self {
        let settings = Arc::new(settings);
        let remote: Arc<dyn RemoteStore> = Arc::new(
            LocalMirror::new(&settings.remote.mirror, settings.remote.base_url.clone())
                .with_clock(store.clock().clone()),
        );
        let cache = Arc::new(SiteCache::new(
            settings.clone(),
            store.clone(),
            remote.clone(),
            background.clone(),
        ));
        let records = Arc::new(StoredRecords::new(store.clone()));
        let registry = Arc::new(AssetRegistry::new(
            settings.clone(),
            records,
            AssetLock::new(store.clone()),
        ));
        let admin = Arc::new(Admin::new(store.clone(), cache.clone(), registry.clone()));

        Self {
            settings,
            store,
            remote,
            cache,
            registry,
            admin,
            background,
        }
    }
}

/// Read a file, or stdin for `-`.
pub fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf).context("cannot read stdin")?;
        return Ok(buf);
    }
    fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))
}

/// Write to a file, or stdout without one.
pub fn write_output(path: Option<&Path>, content: &str) -> Result<()> {
    match path {
        Some(path) => {
            fs::write(path, content).with_context(|| format!("cannot write {}", path.display()))
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(content.as_bytes())?;
            stdout.flush()?;
            Ok(())
        }
    }
}
