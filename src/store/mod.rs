//! Persisted key/value state.
//!
//! Two kinds of entries share one namespace:
//! - **options**: persist until deleted (folder indexes, upload buckets,
//!   error counters, asset records)
//! - **transients**: carry an absolute expiry and read as absent afterwards
//!   (rewrite results, the sweep flag, the asset lock)
//!
//! A persisted store keeps one JSON file per key, named after the
//! percent-encoded key. Reads always go to disk, so a store opened by
//! another process sees every write as soon as it lands. Writes go through
//! a temporary file and a rename, so readers never observe a half-written
//! entry. [`Store::update`] holds a `.lock` file next to the entry for the
//! whole read-modify-write cycle.
//!
//! A missing or malformed entry file reads as absent, and so does a value
//! that fails to decode into the requested type.

mod clock;

pub use clock::Clock;

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::debug;

/// Extension of entry files inside the store directory
pub const ENTRY_EXT: &str = "json";

/// Bytes escaped when a key becomes a file name.
const KEY_FILE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'_').remove(b'-');

/// A lock file older than this belongs to a crashed writer.
const LOCK_STALE: Duration = Duration::from_secs(5);
const LOCK_RETRY: Duration = Duration::from_millis(5);

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error on `{0}`")]
    Io(PathBuf, #[source] io::Error),

    #[error("failed to encode value for `{0}`")]
    Encode(String, #[source] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredValue {
    value: Value,
    /// Absolute expiry in milliseconds; `None` for options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<u64>,
}

#[derive(Debug)]
enum Backend {
    Memory(DashMap<String, StoredValue>),
    Dir(PathBuf),
}

/// Thread-safe key/value store, in memory or one file per key.
#[derive(Debug)]
pub struct Store {
    backend: Backend,
    clock: Clock,
    /// Serialises `update` cycles of this handle.
    write_lock: Mutex<()>,
}

impl Store {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(DashMap::new()),
            clock: Clock::System,
            write_lock: Mutex::new(()),
        }
    }

    /// Open (or create) the store persisted under `dir`.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir).map_err(|e| StoreError::Io(dir.to_path_buf(), e))?;
        Ok(Self {
            backend: Backend::Dir(dir.to_path_buf()),
            clock: Clock::System,
            write_lock: Mutex::new(()),
        })
    }

    /// Replace the time source (tests use a manual clock).
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Read and decode a live entry.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.live_value(key)?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                debug!("store"; "treating malformed `{}` as absent: {}", key, e);
                None
            }
        }
    }

    /// Read an entry, falling back to `T::default()` when absent or malformed.
    pub fn get_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        self.get(key).unwrap_or_default()
    }

    /// Check whether a live entry exists under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.live_value(key).is_some()
    }

    /// Store an option (no expiry).
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        self.insert(key, value, None)
    }

    /// Store a transient that expires after `ttl`.
    pub fn set_transient<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let expires_at = self.clock.now_ms() + ttl.as_millis() as u64;
        self.insert(key, value, Some(expires_at))
    }

    /// Read-modify-write of one option.
    ///
    /// The entry is reloaded under the key's lock, so concurrent updates
    /// from other handles or processes are merged instead of overwritten.
    /// Nothing is written when `f` fails.
    pub fn update<T, R, E>(
        &self,
        key: &str,
        f: impl FnOnce(&mut T) -> Result<R, E>,
    ) -> Result<R, E>
    where
        T: DeserializeOwned + Serialize + Default,
        E: From<StoreError>,
    {
        let _guard = self.write_lock.lock();
        let _file_lock = match &self.backend {
            Backend::Dir(dir) => Some(KeyLock::acquire(lock_path(dir, key))?),
            Backend::Memory(_) => None,
        };

        let mut value: T = self.get_or_default(key);
        let out = f(&mut value)?;
        self.set(key, &value)?;
        Ok(out)
    }

    /// Remove an entry. Returns whether a live entry was removed.
    pub fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let existed = self.contains(key);
        match &self.backend {
            Backend::Memory(entries) => {
                entries.remove(key);
            }
            Backend::Dir(dir) => {
                let path = entry_path(dir, key);
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(StoreError::Io(path, e)),
                }
            }
        }
        Ok(existed)
    }

    /// Remaining lifetime of a transient; `None` for options and absent keys.
    pub fn expires_in(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now_ms();
        let expires_at = self.load(key)?.expires_at?;
        (expires_at > now).then(|| Duration::from_millis(expires_at - now))
    }

    /// Keys of all live entries starting with `prefix`, sorted.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let now = self.clock.now_ms();
        let mut keys: Vec<String> = match &self.backend {
            Backend::Memory(entries) => entries
                .iter()
                .filter(|e| e.key().starts_with(prefix) && !is_expired(e.value(), now))
                .map(|e| e.key().clone())
                .collect(),
            Backend::Dir(dir) => {
                let Ok(read) = fs::read_dir(dir) else {
                    return Vec::new();
                };
                read.filter_map(|entry| entry.ok())
                    .filter_map(|entry| key_of(&entry.file_name().to_string_lossy()))
                    .filter(|key| key.starts_with(prefix) && self.contains(key))
                    .collect()
            }
        };
        keys.sort();
        keys
    }

    fn load(&self, key: &str) -> Option<StoredValue> {
        match &self.backend {
            Backend::Memory(entries) => entries.get(key).map(|e| e.value().clone()),
            Backend::Dir(dir) => {
                let path = entry_path(dir, key);
                let json = fs::read_to_string(&path).ok()?;
                match serde_json::from_str(&json) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        debug!("store"; "ignoring malformed {}: {}", path.display(), e);
                        None
                    }
                }
            }
        }
    }

    fn live_value(&self, key: &str) -> Option<Value> {
        let now = self.clock.now_ms();
        let entry = self.load(key)?;
        if is_expired(&entry, now) {
            // Expired files are left for the next write of the key
            if let Backend::Memory(entries) = &self.backend {
                entries.remove_if(key, |_, v| is_expired(v, now));
            }
            return None;
        }
        Some(entry.value)
    }

    fn insert<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        expires_at: Option<u64>,
    ) -> Result<(), StoreError> {
        let value =
            serde_json::to_value(value).map_err(|e| StoreError::Encode(key.to_string(), e))?;
        let entry = StoredValue { value, expires_at };

        match &self.backend {
            Backend::Memory(entries) => {
                entries.insert(key.to_string(), entry);
                Ok(())
            }
            Backend::Dir(dir) => {
                let json = serde_json::to_string(&entry)
                    .map_err(|e| StoreError::Encode(key.to_string(), e))?;
                write_atomic(dir, &entry_path(dir, key), &json)
            }
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Lock file held for one read-modify-write cycle, removed on drop.
struct KeyLock {
    path: PathBuf,
}

impl KeyLock {
    fn acquire(path: PathBuf) -> Result<Self, StoreError> {
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if is_stale(&path) {
                        debug!("store"; "removing stale lock {}", path.display());
                        let _ = fs::remove_file(&path);
                    } else {
                        thread::sleep(LOCK_RETRY);
                    }
                }
                Err(e) => return Err(StoreError::Io(path, e)),
            }
        }
    }
}

impl Drop for KeyLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age > LOCK_STALE)
}

fn file_stem(key: &str) -> String {
    utf8_percent_encode(key, KEY_FILE).to_string()
}

fn entry_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.{ENTRY_EXT}", file_stem(key)))
}

fn lock_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.lock", file_stem(key)))
}

/// Key stored in the entry file `name`; `None` for locks and temporaries.
fn key_of(name: &str) -> Option<String> {
    let stem = name.strip_suffix(ENTRY_EXT)?.strip_suffix('.')?;
    if stem.starts_with('.') {
        return None;
    }
    percent_decode_str(stem).decode_utf8().ok().map(|key| key.into_owned())
}

fn write_atomic(dir: &Path, path: &Path, contents: &str) -> Result<(), StoreError> {
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let name = path.file_name().unwrap_or_default().to_string_lossy();
    let tmp = dir.join(format!(".{name}.{}.{seq}.tmp", std::process::id()));
    fs::write(&tmp, contents).map_err(|e| StoreError::Io(tmp.clone(), e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        StoreError::Io(path.to_path_buf(), e)
    })
}

fn is_expired(entry: &StoredValue, now: u64) -> bool {
    entry.expires_at.is_some_and(|at| at <= now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_option_roundtrip() {
        let store = Store::in_memory();
        store.set("answer", &42u32).unwrap();
        assert_eq!(store.get::<u32>("answer"), Some(42));
        assert!(store.contains("answer"));
        assert_eq!(store.expires_in("answer"), None);
    }

    #[test]
    fn test_transient_expires() {
        let clock = Clock::manual(10_000);
        let store = Store::in_memory().with_clock(clock.clone());
        store
            .set_transient("flag", &true, Duration::from_secs(5))
            .unwrap();

        assert_eq!(store.expires_in("flag"), Some(Duration::from_secs(5)));
        clock.advance(Duration::from_secs(4));
        assert_eq!(store.get::<bool>("flag"), Some(true));
        clock.advance(Duration::from_secs(1));
        assert_eq!(store.get::<bool>("flag"), None);
        assert!(!store.contains("flag"));
    }

    #[test]
    fn test_transient_expires_on_disk() {
        let dir = TempDir::new().unwrap();
        let clock = Clock::manual(10_000);
        let store = Store::open(dir.path()).unwrap().with_clock(clock.clone());
        store
            .set_transient("_transient_flag", &true, Duration::from_secs(5))
            .unwrap();
        assert!(store.contains("_transient_flag"));
        clock.advance(Duration::from_secs(5));
        assert!(!store.contains("_transient_flag"));
        assert!(store.keys_with_prefix("_transient_").is_empty());
    }

    #[test]
    fn test_malformed_value_reads_as_absent() {
        let store = Store::in_memory();
        store.set("bucket", &"not a map").unwrap();
        let decoded: Option<BTreeMap<String, u32>> = store.get("bucket");
        assert!(decoded.is_none());
        let fallback: BTreeMap<String, u32> = store.get_or_default("bucket");
        assert!(fallback.is_empty());
    }

    #[test]
    fn test_delete() {
        let store = Store::in_memory();
        store.set("k", &1).unwrap();
        assert!(store.delete("k").unwrap());
        assert!(!store.delete("k").unwrap());

        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.set("k", &1).unwrap();
        assert!(store.delete("k").unwrap());
        assert!(!store.delete("k").unwrap());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = Store::open(dir.path()).unwrap();
            store.set("folder_abc", &vec!["a", "b"]).unwrap();
        }
        let reopened = Store::open(dir.path()).unwrap();
        assert_eq!(
            reopened.get::<Vec<String>>("folder_abc"),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_malformed_file_reads_as_absent() {
        let dir = TempDir::new().unwrap();
        fs::write(entry_path(dir.path(), "anything"), "{ not json").unwrap();
        let store = Store::open(dir.path()).unwrap();
        assert!(!store.contains("anything"));
        assert!(store.keys_with_prefix("any").is_empty());
    }

    #[test]
    fn test_keys_with_prefix() {
        let store = Store::in_memory();
        store.set("_cached_theme", &1).unwrap();
        store.set("_cached_akismet", &1).unwrap();
        store.set("other", &1).unwrap();
        assert_eq!(
            store.keys_with_prefix("_cached_"),
            vec!["_cached_akismet".to_string(), "_cached_theme".to_string()]
        );
    }

    #[test]
    fn test_keys_with_prefix_decodes_file_names() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.set("_cached_plugins/akismet", &1).unwrap();
        store.set("_cached_theme", &1).unwrap();
        store.set("other", &1).unwrap();
        fs::write(dir.path().join("stray.txt"), "x").unwrap();

        assert_eq!(
            store.keys_with_prefix("_cached_"),
            vec![
                "_cached_plugins/akismet".to_string(),
                "_cached_theme".to_string()
            ]
        );
    }

    #[test]
    fn test_handles_share_directory() {
        let dir = TempDir::new().unwrap();
        let a = Store::open(dir.path()).unwrap();
        let b = Store::open(dir.path()).unwrap();

        a.set("folder_a", &1).unwrap();
        b.set("folder_b", &2).unwrap();
        let reopened = Store::open(dir.path()).unwrap();
        assert_eq!(reopened.get::<u32>("folder_a"), Some(1));
        assert_eq!(reopened.get::<u32>("folder_b"), Some(2));

        a.set_transient("lock", &true, Duration::from_secs(60))
            .unwrap();
        assert!(b.contains("lock"));
        assert!(b.delete("lock").unwrap());
        assert!(!a.contains("lock"));
    }

    #[test]
    fn test_update_merges_concurrent_handles() {
        let dir = TempDir::new().unwrap();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::new(Store::open(dir.path()).unwrap());
                thread::spawn(move || {
                    for _ in 0..25 {
                        store
                            .update("counter", |n: &mut u32| {
                                *n += 1;
                                Ok::<_, StoreError>(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.get::<u32>("counter"), Some(100));
        assert!(!lock_path(dir.path(), "counter").exists());
    }

    #[test]
    fn test_update_failure_writes_nothing() {
        let store = Store::in_memory();
        store.set("n", &1u32).unwrap();
        let result: Result<(), StoreError> = store.update("n", |n: &mut u32| {
            *n = 7;
            Err(StoreError::Io(PathBuf::from("n"), io::Error::other("rejected")))
        });
        assert!(result.is_err());
        assert_eq!(store.get::<u32>("n"), Some(1));
    }

    #[test]
    fn test_stale_lock_is_broken() {
        let dir = TempDir::new().unwrap();
        let lock = lock_path(dir.path(), "k");
        let file = fs::File::create(&lock).unwrap();
        let old = std::time::SystemTime::now() - Duration::from_secs(60);
        file.set_modified(old).unwrap();
        drop(file);

        let store = Store::open(dir.path()).unwrap();
        store
            .update("k", |n: &mut u32| {
                *n = 3;
                Ok::<_, StoreError>(())
            })
            .unwrap();
        assert_eq!(store.get::<u32>("k"), Some(3));
    }
}
