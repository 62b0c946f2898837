//! Shared helpers: fingerprints, mime types, paths, URLs and plurals.

pub mod hash;
pub mod mime;
pub mod path;
pub mod plural;
pub mod url;
