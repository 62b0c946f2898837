//! Path normalization for registry keys.

use crate::utils::mime;
use crate::utils::url::clean_url;

/// Normalize a URL or path into a registry key.
///
/// Scheme, query and fragment are dropped, the site URL prefix is
/// stripped, and a trailing `/` is added unless the last segment has a
/// file extension.
///
/// ```ignore
/// clean_path("https://a.test", "https://a.test/wp-content/gallery") == "wp-content/gallery/"
/// clean_path("https://a.test", "http://a.test/g/x.png?v=2") == "g/x.png"
/// ```
pub fn clean_path(site_url: &str, path: &str) -> String {
    let home = format!("{}/", clean_url(site_url).trim_end_matches('/'));
    let cleaned = clean_url(path);
    let mut path = cleaned
        .strip_prefix(&home)
        .map_or(cleaned.clone(), str::to_string);
    if mime::extension(&path).is_none() && !path.ends_with('/') {
        path.push('/');
    }
    path
}

/// Registry key without surrounding separators, as used for lookups.
pub fn path_key(path: &str) -> &str {
    path.trim_matches('/')
}

/// Shorter candidate keys of a path, longest first.
///
/// `a/b/c.png` yields `a/b` then `a`.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    let key = path_key(path);
    key.match_indices('/')
        .rev()
        .map(move |(idx, _)| path_key(&key[..idx]))
        .filter(|candidate| !candidate.is_empty())
}
