//! Deterministic fingerprints for cache keys.
//!
//! Uses `rustc_hash::FxHasher`: fast, and stable across runs, so a key
//! computed today finds the entry persisted yesterday.
//!
//! ```ignore
//! use crate::utils::hash;
//!
//! let key = hash::fingerprint("/var/www/wp-content/themes/x"); // -> "1f0c9a..." (16 hex)
//! ```

use rustc_hash::FxHasher;
use std::hash::Hasher;
use std::path::Path;

/// Compute 64-bit hash from byte data.
#[inline]
pub fn compute<T: AsRef<[u8]> + ?Sized>(data: &T) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(data.as_ref());
    hasher.finish()
}

/// Compute hash and return it as a 16-char hex fingerprint.
#[inline]
pub fn fingerprint<T: AsRef<[u8]> + ?Sized>(value: &T) -> String {
    format!("{:016x}", compute(value))
}

/// Fingerprint of a filesystem path, independent of trailing separators.
pub fn fingerprint_path(path: &Path) -> String {
    let text = path.to_string_lossy();
    fingerprint(text.trim_end_matches(['/', '\\']))
}
