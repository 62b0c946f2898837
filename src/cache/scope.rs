//! Scope buckets for upload cache entries.
//!
//! Every local file belongs to exactly one bucket, chosen by the longest
//! known root that contains it. Plugins and themes get one bucket each, so
//! a plugin's entries can be dropped without touching the rest.

use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Store key prefix of upload buckets
pub const BUCKET_PREFIX: &str = "_cached_";

/// Known roots on disk.
#[derive(Debug, Clone, Default)]
pub struct ScopeRoots {
    pub plugins: PathBuf,
    pub themes: PathBuf,
    pub admin: PathBuf,
    pub includes: PathBuf,
}

/// Partition an upload cache entry lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeBucket {
    Plugin(String),
    Theme(String),
    CoreAdmin,
    CoreIncludes,
    Custom,
}

impl ScopeBucket {
    /// Bucket of `file`, by longest matching root.
    pub fn for_file(file: &Path, roots: &ScopeRoots) -> Self {
        let candidates = [
            (&roots.plugins, Kind::Plugins),
            (&roots.themes, Kind::Themes),
            (&roots.admin, Kind::Admin),
            (&roots.includes, Kind::Includes),
        ];

        let best = candidates
            .into_iter()
            .filter(|(root, _)| !root.as_os_str().is_empty())
            .filter_map(|(root, kind)| {
                let rest = file.strip_prefix(root).ok()?;
                Some((root.components().count(), kind, rest))
            })
            .max_by_key(|(depth, _, _)| *depth);

        match best {
            Some((_, Kind::Plugins, rest)) => first_segment(rest).map_or(Self::Custom, Self::Plugin),
            Some((_, Kind::Themes, rest)) => first_segment(rest).map_or(Self::Custom, Self::Theme),
            Some((_, Kind::Admin, _)) => Self::CoreAdmin,
            Some((_, Kind::Includes, _)) => Self::CoreIncludes,
            None => Self::Custom,
        }
    }

    /// Store key of this bucket.
    pub fn key(&self) -> String {
        format!("{BUCKET_PREFIX}{self}")
    }
}

impl fmt::Display for ScopeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plugin(slug) => write!(f, "plugin_{slug}"),
            Self::Theme(name) => write!(f, "theme_{name}"),
            Self::CoreAdmin => f.write_str("wp_admin"),
            Self::CoreIncludes => f.write_str("wp_includes"),
            Self::Custom => f.write_str("custom"),
        }
    }
}

#[derive(Clone, Copy)]
enum Kind {
    Plugins,
    Themes,
    Admin,
    Includes,
}

/// First directory name below a root; files directly in the root have none.
fn first_segment(rest: &Path) -> Option<String> {
    let mut components = rest.components();
    let first = components.next()?;
    components.next()?;
    match first {
        Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
        _ => None,
    }
}
