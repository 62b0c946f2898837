//! MIME types of site files.
//!
//! Child asset records store the type, uploads pick their resource type from
//! it and the server labels its responses with it.

use std::path::Path;

pub mod types {
    pub const HTML: &str = "text/html; charset=utf-8";
    pub const PLAIN: &str = "text/plain; charset=utf-8";
    pub const JSON: &str = "application/json";
    pub const OCTET_STREAM: &str = "application/octet-stream";
}

/// Extension → type, checked in order.
const TABLE: &[(&[&str], &str)] = &[
    (&["css"], "text/css"),
    (&["js", "mjs"], "text/javascript"),
    (&["json", "map"], types::JSON),
    (&["html", "htm"], "text/html"),
    (&["txt"], "text/plain"),
    (&["svg"], "image/svg+xml"),
    (&["png"], "image/png"),
    (&["jpg", "jpeg", "jpe"], "image/jpeg"),
    (&["gif"], "image/gif"),
    (&["webp"], "image/webp"),
    (&["avif"], "image/avif"),
    (&["ico"], "image/x-icon"),
    (&["bmp"], "image/bmp"),
    (&["tif", "tiff"], "image/tiff"),
    (&["mp3", "m4b"], "audio/mpeg"),
    (&["wav"], "audio/wav"),
    (&["ogg", "oga"], "audio/ogg"),
    (&["flac"], "audio/flac"),
    (&["aac", "m4a"], "audio/aac"),
    (&["mp4", "m4v"], "video/mp4"),
    (&["webm"], "video/webm"),
    (&["ogv"], "video/ogg"),
    (&["avi"], "video/x-msvideo"),
    (&["mov"], "video/quicktime"),
    (&["woff"], "font/woff"),
    (&["woff2"], "font/woff2"),
    (&["ttf"], "font/ttf"),
    (&["eot"], "application/vnd.ms-fontobject"),
    (&["pdf"], "application/pdf"),
];

/// Lowercased extension of a path or URL path, if any.
///
/// Dotfiles and dots in directory names do not count.
pub fn extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub fn from_path(path: &Path) -> &'static str {
    from_extension(extension(&path.to_string_lossy()).as_deref())
}

pub fn from_extension(ext: Option<&str>) -> &'static str {
    let Some(ext) = ext else {
        return types::OCTET_STREAM;
    };
    TABLE
        .iter()
        .find(|(exts, _)| exts.contains(&ext))
        .map_or(types::OCTET_STREAM, |(_, mime)| mime)
}

fn top_level(mime: &str) -> &str {
    mime.split('/').next().unwrap_or_default()
}

pub fn is_image(mime: &str) -> bool {
    top_level(mime) == "image"
}

pub fn is_audio(mime: &str) -> bool {
    top_level(mime) == "audio"
}

pub fn is_video(mime: &str) -> bool {
    top_level(mime) == "video"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension() {
        assert_eq!(extension("/wp-content/uploads/logo.PNG").as_deref(), Some("png"));
        assert_eq!(extension("/wp-content/themes/v1.2/readme"), None);
        assert_eq!(extension(".htaccess"), None);
        assert_eq!(extension("bundle.min.js").as_deref(), Some("js"));
    }

    #[test]
    fn test_from_path() {
        assert_eq!(from_path(Path::new("style.css")), "text/css");
        assert_eq!(from_path(Path::new("photo.JPEG")), "image/jpeg");
        assert_eq!(from_path(Path::new("clip.m4v")), "video/mp4");
        assert_eq!(from_path(Path::new("font.woff2")), "font/woff2");
        assert_eq!(from_path(Path::new("data.xyz")), types::OCTET_STREAM);
        assert_eq!(from_path(Path::new("Makefile")), types::OCTET_STREAM);
    }

    #[test]
    fn test_families() {
        assert!(is_image("image/svg+xml"));
        assert!(is_audio("audio/mpeg"));
        assert!(is_video("video/quicktime"));
        assert!(!is_image("text/css"));
        assert!(!is_video(""));
    }
}
