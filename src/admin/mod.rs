//! Nonce-guarded admin actions and the cache report.
//!
//! Both actions answer with a [`Redirect`] back to the page the admin came
//! from; the server turns it into a `302`.

mod nonce;

pub use nonce::{Nonces, TICK_SECS};

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::asset::{AssetRegistry, RecordError};
use crate::cache::SiteCache;
use crate::log;
use crate::store::{Store, StoreError};
use crate::utils::plural::plural_count;

/// Action name of the clear-cache nonce
pub const CLEAR_ACTION: &str = "cache-clear";

/// Action name of the overlay nonce
pub const OVERLAY_ACTION: &str = "cache-overlay";

/// Store key of the overlay flag
pub const OVERLAY_KEY: &str = "_overlay";

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("invalid or expired nonce for `{0}`")]
    InvalidNonce(String),

    #[error("admin actions are disabled, set `serve.nonce_secret`")]
    Disabled,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Where to send the admin after an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub location: String,
}

/// Counts shown in the admin bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheReport {
    pub cached: usize,
    pub pending: usize,
    /// `on` when anything is cached.
    pub status: &'static str,
    pub overlay: &'static str,
    pub label: String,
}

pub struct Admin {
    nonces: Option<Nonces>,
    store: Arc<Store>,
    cache: Arc<SiteCache>,
    registry: Arc<AssetRegistry>,
}

impl Admin {
    pub fn new(store: Arc<Store>, cache: Arc<SiteCache>, registry: Arc<AssetRegistry>) -> Self {
        let secret = &cache.settings().serve.nonce_secret;
        let nonces = (!secret.is_empty()).then(|| Nonces::new(secret, store.clock().clone()));
        Self {
            nonces,
            store,
            cache,
            registry,
        }
    }

    /// Issue a nonce for `action`.
    pub fn nonce(&self, action: &str) -> Result<String, AdminError> {
        Ok(self.nonces()?.create(action))
    }

    /// Forget every remote copy: asset children lose their public id and
    /// the static upload buckets are dropped.
    pub fn clear_cache(&self, nonce: &str, referer: &str) -> Result<Redirect, AdminError> {
        self.verify(CLEAR_ACTION, nonce)?;

        let mut reset = 0;
        for mut child in self.registry.records().children() {
            if child.remote_public_id.take().is_some() {
                self.registry.records().update_child(&child)?;
                reset += 1;
            }
        }
        let buckets = self.cache.pipeline().clear()?;
        log!(
            "admin";
            "cache cleared: {} reset, {} dropped",
            plural_count(reset, "asset"),
            plural_count(buckets, "bucket")
        );
        Ok(redirect(referer))
    }

    /// Flip the front-end overlay flag.
    pub fn toggle_overlay(&self, nonce: &str, referer: &str) -> Result<Redirect, AdminError> {
        self.verify(OVERLAY_ACTION, nonce)?;
        let enabled = !self.overlay_enabled();
        self.store.set(OVERLAY_KEY, &enabled)?;
        log!("admin"; "overlay {}", on_off(enabled));
        Ok(redirect(referer))
    }

    /// Persisted overlay flag, initially `[assets].overlay`.
    pub fn overlay_enabled(&self) -> bool {
        self.store
            .get(OVERLAY_KEY)
            .unwrap_or(self.cache.settings().assets.overlay)
    }

    pub fn cache_report(&self) -> CacheReport {
        let assets = self
            .registry
            .records()
            .children()
            .iter()
            .filter(|c| c.remote_public_id.is_some())
            .count();
        let cached = assets + self.cache.pipeline().cached_count();
        CacheReport {
            cached,
            pending: self.cache.pending_count() + self.registry.pending_children().len(),
            status: on_off(cached > 0),
            overlay: on_off(self.overlay_enabled()),
            label: plural_count(cached, "cached item"),
        }
    }

    fn nonces(&self) -> Result<&Nonces, AdminError> {
        self.nonces.as_ref().ok_or(AdminError::Disabled)
    }

    fn verify(&self, action: &str, nonce: &str) -> Result<(), AdminError> {
        if self.nonces()?.verify(action, nonce) {
            Ok(())
        } else {
            Err(AdminError::InvalidNonce(action.to_string()))
        }
    }
}

/// Back to the referring page, or the site root without one.
fn redirect(referer: &str) -> Redirect {
    let location = if referer.is_empty() { "/" } else { referer };
    Redirect {
        location: location.to_string(),
    }
}

const fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}
