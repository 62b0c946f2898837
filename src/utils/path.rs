//! Filesystem path helpers.
//!
//! - `normalize_path` - absolute form (canonicalize + fallback)
//! - `forward_slashes` - path text with `/` separators, for URL building
//! - `strip_base` - remainder of a path below a base directory

use std::path::{Path, PathBuf};

/// Normalize a file system path to absolute form.
///
/// Tries `canonicalize()` first (resolves symlinks, `.`, `..`).
/// Falls back to:
/// - Return as-is if already absolute
/// - Join with current directory if relative
#[inline]
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
        }
    })
}

/// Path text with forward slashes regardless of platform.
#[inline]
pub fn forward_slashes(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Remainder of `path` below `base`, as a `/`-separated string without a
/// leading separator. `None` when `path` is not inside `base`.
pub fn strip_base(path: &Path, base: &Path) -> Option<String> {
    let rest = path.strip_prefix(base).ok()?;
    Some(forward_slashes(rest).trim_start_matches('/').to_string())
}
