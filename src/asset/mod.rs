//! Asset registry: externally hosted media below registered path prefixes.
//!
//! ```text
//! [[assets.paths]] ──run_pass──► parents (active set)
//!                                   │ classify
//! rendered document ──Discovery─────┴──► children ──upload_child──► RemoteStore
//! ```

mod discovery;
mod hooks;
mod kind;
mod lock;
mod path;
mod records;
mod registry;

pub use discovery::{Discovery, DiscoveryReport, Unusable, media_urls};
pub use hooks::{ASSET_SYNC, ChildSyncReport, SyncError, SyncStrategy};
pub use kind::{MediaKind, is_syncable};
pub use lock::{AssetLock, AssetLockGuard, LOCK_KEY, LOCK_TTL};
pub use path::clean_path;
pub use records::{
    AssetChild, AssetParent, AssetRecords, NewChild, RECORDS_KEY, RecordError, StoredRecords,
};
pub use registry::{AssetRegistry, PURGE_PAGE, PassReport};
