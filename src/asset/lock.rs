//! Advisory asset lock.
//!
//! A 10 second transient flag. While it is set, parents are neither
//! created nor activated, and discovery does not create children. It is
//! not a mutex: a crashed holder simply lets it expire.

use std::sync::Arc;
use std::time::Duration;

use crate::debug;
use crate::store::Store;

/// Store key of the lock flag
pub const LOCK_KEY: &str = "_asset_lock";

/// Lifetime of the lock flag
pub const LOCK_TTL: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct AssetLock {
    store: Arc<Store>,
}

impl AssetLock {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn is_locked(&self) -> bool {
        self.store.contains(LOCK_KEY)
    }

    /// Set (or extend) the flag. The returned guard clears it on drop.
    pub fn acquire(&self) -> AssetLockGuard<'_> {
        self.refresh();
        AssetLockGuard { lock: self }
    }

    /// Push the expiry another [`LOCK_TTL`] out.
    pub fn refresh(&self) {
        if let Err(e) = self.store.set_transient(LOCK_KEY, &true, LOCK_TTL) {
            debug!("assets"; "cannot set asset lock: {}", e);
        }
    }

    pub fn release(&self) {
        if let Err(e) = self.store.delete(LOCK_KEY) {
            debug!("assets"; "cannot clear asset lock: {}", e);
        }
    }
}

/// Clears the lock when dropped, including on early returns.
pub struct AssetLockGuard<'a> {
    lock: &'a AssetLock,
}

impl AssetLockGuard<'_> {
    pub fn refresh(&self) {
        self.lock.refresh();
    }
}

impl Drop for AssetLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
